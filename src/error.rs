//! Error taxonomy for the sync and quiz layers.

use thiserror::Error;

/// Errors surfaced by synchronizers and the quiz session machine.
///
/// `Clone` so that a single in-flight fetch can hand its outcome to every
/// caller that joined it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
  /// No response reached us (connection refused, DNS, timeout, offline).
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with a 4xx/5xx status other than 401.
  #[error("server error {status}: {message}")]
  Api { status: u16, message: String },

  /// The server rejected our credentials. Owned by the auth layer.
  #[error("session is no longer valid")]
  Unauthorized,

  /// Local precondition failed before anything touched the network.
  #[error("{0}")]
  Validation(String),

  /// A state-machine transition was refused; the message is user-facing.
  #[error("{0}")]
  Rejected(String),

  /// The response body could not be decoded.
  #[error("unexpected response: {0}")]
  Decode(String),
}

impl SyncError {
  /// Build the right variant from an HTTP status and message body.
  pub fn from_status(status: u16, message: impl Into<String>) -> Self {
    if status == 401 {
      Self::Unauthorized
    } else {
      Self::Api {
        status,
        message: message.into(),
      }
    }
  }

  pub fn is_unauthorized(&self) -> bool {
    matches!(self, Self::Unauthorized)
  }

  pub fn is_network(&self) -> bool {
    matches!(self, Self::Network(_))
  }

  /// Whether this error should be shown on a synchronizer's error state.
  pub fn is_user_facing(&self) -> bool {
    !self.is_unauthorized()
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(e: reqwest::Error) -> Self {
    if let Some(status) = e.status() {
      Self::from_status(status.as_u16(), e.to_string())
    } else if e.is_decode() {
      Self::Decode(e.to_string())
    } else {
      Self::Network(e.to_string())
    }
  }
}

impl From<serde_json::Error> for SyncError {
  fn from(e: serde_json::Error) -> Self {
    Self::Decode(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status_maps_401_to_unauthorized() {
    assert_eq!(SyncError::from_status(401, "nope"), SyncError::Unauthorized);
    assert!(SyncError::from_status(401, "").is_unauthorized());
  }

  #[test]
  fn test_from_status_keeps_message() {
    let err = SyncError::from_status(503, "maintenance");
    assert_eq!(
      err,
      SyncError::Api {
        status: 503,
        message: "maintenance".to_string()
      }
    );
    assert!(err.is_user_facing());
    assert_eq!(err.to_string(), "server error 503: maintenance");
  }

  #[test]
  fn test_unauthorized_is_not_user_facing() {
    assert!(!SyncError::Unauthorized.is_user_facing());
    assert!(SyncError::Network("down".into()).is_user_facing());
  }
}
