//! Client-side sync and session layer for a flashcard study service.
//!
//! Server-backed collections are read through keyed TTL caches guarded by a
//! per-key circuit breaker ([`cache`], [`sync`]). Quizzes run through a state
//! machine that keeps accepting answers while offline and replays them on
//! reconnect ([`quiz`]), timed by a pausable countdown ([`timer`]).

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod logging;
pub mod platform;
pub mod quiz;
pub mod sync;
pub mod timer;

pub use error::SyncError;
