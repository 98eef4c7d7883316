//! Quiz session state machine with an offline answer queue.

mod machine;
mod quota;
mod session;

pub use machine::{spawn_platform_listener, AnswerOutcome, QuizSessionMachine, DEFAULT_TIMER};
pub use quota::{Tier, UsageInfo};
pub use session::{GenerationParams, PendingAnswer, QuestionRecord, QuizSession, QuizStatus, Score};
