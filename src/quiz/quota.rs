use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Subscription tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
  #[default]
  Free,
  Pro,
}

impl Tier {
  /// Quizzes allowed per period. `None` means unlimited.
  pub fn quiz_limit(self) -> Option<u32> {
    match self {
      Tier::Free => Some(5),
      Tier::Pro => None,
    }
  }

  pub fn max_questions(self) -> u32 {
    match self {
      Tier::Free => 10,
      Tier::Pro => 50,
    }
  }
}

/// Usage counters supplied by whoever knows the account's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfo {
  pub tier: Tier,
  pub quizzes_used: u32,
  pub quiz_limit: Option<u32>,
  pub max_questions: u32,
}

impl UsageInfo {
  pub fn for_tier(tier: Tier, quizzes_used: u32) -> Self {
    Self {
      tier,
      quizzes_used,
      quiz_limit: tier.quiz_limit(),
      max_questions: tier.max_questions(),
    }
  }

  /// Refuse a quiz of `question_count` questions if it would exceed the plan.
  pub fn check(&self, question_count: u32) -> Result<(), SyncError> {
    if let Some(limit) = self.quiz_limit {
      if self.quizzes_used >= limit {
        return Err(SyncError::Rejected(format!(
          "You have used all {} quizzes on your plan. Upgrade to keep going.",
          limit
        )));
      }
    }
    if question_count > self.max_questions {
      return Err(SyncError::Rejected(format!(
        "Your plan allows at most {} questions per quiz.",
        self.max_questions
      )));
    }
    Ok(())
  }
}
