use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::types::{AnswerResult, AnswerSubmission, QuizRequest, QuizResult};
use crate::api::Backend;
use crate::clock::SharedClock;
use crate::error::SyncError;
use crate::guard::{CancelFlag, Generation};
use crate::platform::{EventBus, PlatformEvent, SharedPlatform};
use crate::timer::{CountdownTimer, TimerState};

use super::quota::UsageInfo;
use super::session::{GenerationParams, PendingAnswer, QuestionRecord, QuizSession, QuizStatus};

/// Per-question countdown used when the timer is on and the server sets none.
pub const DEFAULT_TIMER: Duration = Duration::from_secs(30);

/// Result of submitting an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
  /// Offline: recorded locally and queued for replay.
  Queued,
  /// Scored by the server.
  Scored(AnswerResult),
}

/// Time spent on the current question, excluding hidden periods.
#[derive(Debug, Default)]
struct QuestionClock {
  started: Option<Instant>,
  paused_since: Option<Instant>,
  paused_total: Duration,
}

impl QuestionClock {
  fn start(&mut self, now: Instant) {
    *self = Self {
      started: Some(now),
      ..Default::default()
    };
  }

  fn pause(&mut self, now: Instant) {
    if self.started.is_some() && self.paused_since.is_none() {
      self.paused_since = Some(now);
    }
  }

  fn resume(&mut self, now: Instant) {
    if let Some(since) = self.paused_since.take() {
      self.paused_total += now.saturating_duration_since(since);
    }
  }

  fn spent(&self, now: Instant) -> Duration {
    let Some(started) = self.started else {
      return Duration::ZERO;
    };
    let paused = self.paused_total
      + self
        .paused_since
        .map(|since| now.saturating_duration_since(since))
        .unwrap_or_default();
    now.saturating_duration_since(started).saturating_sub(paused)
  }
}

struct Inner {
  session: QuizSession,
  timer: CountdownTimer,
  question_clock: QuestionClock,
  usage: Option<UsageInfo>,
  generating: bool,
  completing: bool,
  /// Questions whose answer is on its way to the server
  answering: HashSet<String>,
}

/// Drives a quiz from setup to completion while tolerating a flaky network.
///
/// All state sits behind one lock that is never held across a network call.
/// Results of async calls are applied only if no `reset_quiz` happened in
/// between. Offline answers queue up and are replayed in order by a single
/// serial drain.
pub struct QuizSessionMachine {
  backend: Arc<dyn Backend>,
  platform: SharedPlatform,
  clock: SharedClock,
  bus: EventBus,
  default_timer: Duration,
  inner: Mutex<Inner>,
  drain: tokio::sync::Mutex<()>,
  generation: Generation,
  cancel: CancelFlag,
}

impl QuizSessionMachine {
  pub fn new(
    backend: Arc<dyn Backend>,
    platform: SharedPlatform,
    clock: SharedClock,
    bus: EventBus,
  ) -> Self {
    let timer = CountdownTimer::new(clock.clone());
    Self {
      backend,
      platform,
      clock,
      bus,
      default_timer: DEFAULT_TIMER,
      inner: Mutex::new(Inner {
        session: QuizSession::default(),
        timer,
        question_clock: QuestionClock::default(),
        usage: None,
        generating: false,
        completing: false,
        answering: HashSet::new(),
      }),
      drain: tokio::sync::Mutex::new(()),
      generation: Generation::new(),
      cancel: CancelFlag::new(),
    }
  }

  pub fn with_default_timer(mut self, timer: Duration) -> Self {
    self.default_timer = timer;
    self
  }

  fn inner(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Copy of the current session.
  pub fn session(&self) -> QuizSession {
    self.inner().session.clone()
  }

  pub fn timer_state(&self) -> TimerState {
    self.inner().timer.state()
  }

  pub fn set_usage(&self, usage: UsageInfo) {
    self.inner().usage = Some(usage);
  }

  pub fn usage(&self) -> Option<UsageInfo> {
    self.inner().usage
  }

  /// Ask the server for a quiz and start it.
  pub async fn generate_quiz(
    &self,
    deck_ids: Vec<u64>,
    question_count: u32,
    timer_enabled: bool,
  ) -> Result<(), SyncError> {
    if deck_ids.is_empty() {
      return Err(SyncError::Validation("Select at least one deck.".into()));
    }
    if question_count == 0 {
      return Err(SyncError::Validation("Choose at least one question.".into()));
    }

    let ticket = {
      let mut inner = self.inner();
      if inner.session.status != QuizStatus::Setup || inner.generating {
        return Err(SyncError::Rejected("A quiz is already in progress.".into()));
      }
      if let Some(usage) = inner.usage {
        if let Err(e) = usage.check(question_count) {
          info!(tier = ?usage.tier, quizzes_used = usage.quizzes_used, "quiz quota reached");
          self.bus.publish(PlatformEvent::OpenBilling);
          return Err(e);
        }
      }
      if !self.platform.is_online() {
        return Err(SyncError::Rejected(
          "You are offline. Connect to generate a quiz.".into(),
        ));
      }
      inner.generating = true;
      self.generation.ticket()
    };

    let request = QuizRequest {
      deck_ids: deck_ids.clone(),
      question_count,
      timer_enabled,
    };
    debug!(?deck_ids, question_count, "generating quiz");
    let response = self.backend.generate_quiz(&request).await;

    let mut inner = self.inner();
    if !ticket.is_current() || self.cancel.is_cancelled() {
      debug!("quiz generation result discarded");
      return Err(SyncError::Rejected("Quiz generation was abandoned.".into()));
    }
    inner.generating = false;
    let quiz = response?;

    let timer_per_question = timer_enabled.then(|| {
      quiz
        .time_limit_seconds
        .map(|s| Duration::from_secs(u64::from(s)))
        .unwrap_or(self.default_timer)
    });
    let now = self.clock.now();
    inner.session = QuizSession {
      id: Some(quiz.quiz_id.clone()),
      deck_ids,
      questions: quiz.questions.into_iter().map(QuestionRecord::from).collect(),
      current_index: 0,
      status: QuizStatus::Active,
      timer_per_question,
      generation_params: Some(GenerationParams {
        deck_ids: request.deck_ids,
        question_count,
        timer_enabled,
      }),
      ..Default::default()
    };
    if let Some(usage) = inner.usage.as_mut() {
      usage.quizzes_used += 1;
    }
    Self::start_question(&mut inner, now, self.platform.is_visible());

    info!(
      quiz_id = %quiz.quiz_id,
      questions = inner.session.questions.len(),
      "quiz started"
    );
    Ok(())
  }

  /// Record an answer locally, then score it if the network is up.
  ///
  /// The local answer is kept even if scoring fails. A request that never
  /// reached the server queues the answer for replay; any other failure
  /// leaves it unscored so it can be submitted again.
  pub async fn submit_answer(
    &self,
    question_id: &str,
    user_answer: &str,
  ) -> Result<AnswerOutcome, SyncError> {
    let (quiz_id, submission, ticket) = {
      let mut inner = self.inner();
      if inner.session.status != QuizStatus::Active {
        return Err(SyncError::Rejected("No quiz is in progress.".into()));
      }
      if inner.completing {
        return Err(SyncError::Rejected("The quiz is being finished.".into()));
      }
      if inner.answering.contains(question_id) {
        return Err(SyncError::Rejected("This answer is still being scored.".into()));
      }
      let now = self.clock.now();
      let time_spent = inner.question_clock.spent(now).as_secs() as u32;

      let question = inner
        .session
        .question_mut(question_id)
        .ok_or_else(|| SyncError::Validation(format!("Unknown question {}", question_id)))?;
      if question.is_scored() {
        return Err(SyncError::Rejected("This question was already answered.".into()));
      }
      question.user_answer = Some(user_answer.to_string());

      if inner.session.current_question().map(|q| q.id.as_str()) == Some(question_id) {
        inner.timer.stop();
      }

      if !self.platform.is_online() {
        inner.session.enqueue(PendingAnswer {
          answer_id: question_id.to_string(),
          user_answer: user_answer.to_string(),
          time_spent_seconds: time_spent,
          timestamp: Utc::now(),
        });
        info!(
          question_id,
          queued = inner.session.pending_answers.len(),
          "offline, answer queued"
        );
        return Ok(AnswerOutcome::Queued);
      }

      let quiz_id = inner.session.id.clone().unwrap_or_default();
      let submission = AnswerSubmission {
        answer_id: question_id.to_string(),
        user_answer: user_answer.to_string(),
        time_spent_seconds: time_spent,
      };
      inner.answering.insert(question_id.to_string());
      (quiz_id, submission, self.generation.ticket())
    };

    let response = self.backend.submit_answer(&quiz_id, &submission).await;

    let mut inner = self.inner();
    if !ticket.is_current() || self.cancel.is_cancelled() {
      debug!(question_id, "answer result discarded");
      return response.map(AnswerOutcome::Scored);
    }
    inner.answering.remove(question_id);
    let result = match response {
      Ok(result) => result,
      Err(e) if e.is_network() => {
        warn!(question_id, error = %e, "answer not delivered, queued for replay");
        inner.session.enqueue(PendingAnswer {
          answer_id: submission.answer_id,
          user_answer: submission.user_answer,
          time_spent_seconds: submission.time_spent_seconds,
          timestamp: Utc::now(),
        });
        return Ok(AnswerOutcome::Queued);
      }
      Err(e) => {
        warn!(question_id, error = %e, "answer submission failed");
        return Err(e);
      }
    };
    if inner.session.apply_result(question_id, &result) {
      debug!(question_id, is_correct = result.is_correct, "answer scored");
    }
    Ok(AnswerOutcome::Scored(result))
  }

  /// Move to the next question. Returns `false` on the last one.
  pub fn next_question(&self) -> Result<bool, SyncError> {
    let mut inner = self.inner();
    if inner.session.status != QuizStatus::Active {
      return Err(SyncError::Rejected("No quiz is in progress.".into()));
    }
    if !inner.session.has_next() {
      return Ok(false);
    }
    inner.session.current_index += 1;
    let now = self.clock.now();
    Self::start_question(&mut inner, now, self.platform.is_visible());
    debug!(index = inner.session.current_index, "next question");
    Ok(true)
  }

  /// Replay queued offline answers in order, one at a time.
  ///
  /// Stops at the first failure and leaves the rest queued. Returns how many
  /// answers were replayed.
  pub async fn reconcile(&self) -> Result<usize, SyncError> {
    let _drain = self.drain.lock().await;
    let mut replayed = 0;

    loop {
      let (quiz_id, pending, ticket) = {
        let mut inner = self.inner();
        let Some(pending) = inner.session.pending_answers.first().cloned() else {
          break;
        };
        if !self.platform.is_online() || self.cancel.is_cancelled() {
          break;
        }
        if !inner.answering.insert(pending.answer_id.clone()) {
          debug!(answer_id = %pending.answer_id, "answer already being scored, replay deferred");
          break;
        }
        let quiz_id = inner.session.id.clone().unwrap_or_default();
        (quiz_id, pending, self.generation.ticket())
      };

      let response = self.backend.submit_answer(&quiz_id, &pending.submission()).await;

      let mut inner = self.inner();
      if !ticket.is_current() {
        debug!("session reset during replay");
        break;
      }
      inner.answering.remove(&pending.answer_id);
      let result = match response {
        Ok(result) => result,
        Err(e) => {
          let remaining = inner.session.pending_answers.len();
          warn!(answer_id = %pending.answer_id, remaining, error = %e, "replay failed, keeping queue");
          return Err(e);
        }
      };

      // The entry cannot change while its replay is in flight
      inner.session.pending_answers.retain(|p| p.answer_id != pending.answer_id);
      inner.session.apply_result(&pending.answer_id, &result);
      replayed += 1;
    }

    if replayed > 0 {
      info!(replayed, "offline answers reconciled");
    }
    Ok(replayed)
  }

  /// Finish the quiz with the server's authoritative totals.
  pub async fn complete_quiz(&self) -> Result<QuizResult, SyncError> {
    let (quiz_id, ticket) = {
      let mut inner = self.inner();
      if inner.session.status != QuizStatus::Active || inner.completing {
        return Err(SyncError::Rejected("No quiz is in progress.".into()));
      }
      if !inner.session.pending_answers.is_empty() {
        return Err(SyncError::Rejected(format!(
          "{} answer(s) are still waiting to sync. Reconnect to finish the quiz.",
          inner.session.pending_answers.len()
        )));
      }
      if !self.platform.is_online() {
        return Err(SyncError::Rejected(
          "You are offline. Connect to finish the quiz.".into(),
        ));
      }
      inner.completing = true;
      (inner.session.id.clone().unwrap_or_default(), self.generation.ticket())
    };

    let response = self.backend.complete_quiz(&quiz_id).await;

    let mut inner = self.inner();
    if !ticket.is_current() || self.cancel.is_cancelled() {
      debug!("quiz completion result discarded");
      return Err(SyncError::Rejected("Quiz was reset.".into()));
    }
    inner.completing = false;
    let result = response?;

    inner.session.score.correct = result.correct_answers;
    inner.session.score.incorrect = result.total_questions.saturating_sub(result.correct_answers);
    inner.session.result = Some(result);
    inner.session.status = QuizStatus::Completed;
    inner.timer.stop();
    inner.question_clock = QuestionClock::default();

    info!(
      quiz_id = %quiz_id,
      correct = result.correct_answers,
      total = result.total_questions,
      "quiz completed"
    );
    Ok(result)
  }

  /// Drop the session, its timer and its queue, whatever state it is in.
  pub fn reset_quiz(&self) {
    self.generation.bump();
    let mut inner = self.inner();
    let dropped = inner.session.pending_answers.len();
    inner.session = QuizSession::default();
    inner.timer.reset();
    inner.question_clock = QuestionClock::default();
    inner.generating = false;
    inner.completing = false;
    inner.answering.clear();
    info!(dropped_pending = dropped, "quiz reset");
  }

  /// Advance the question timer. Returns `true` on the frame it expires.
  pub fn tick(&self) -> bool {
    let mut inner = self.inner();
    if inner.session.status != QuizStatus::Active {
      return false;
    }
    let expired = inner.timer.tick();
    if expired {
      info!(index = inner.session.current_index, "question timer expired");
    }
    expired
  }

  /// Pause time accounting while hidden, resume when visible again.
  pub fn handle_visibility(&self, visible: bool) {
    let now = self.clock.now();
    let mut inner = self.inner();
    if visible {
      inner.timer.resume();
      inner.question_clock.resume(now);
    } else {
      inner.timer.pause();
      inner.question_clock.pause(now);
    }
  }

  /// Stop applying async results and stop the timer.
  pub fn shutdown(&self) {
    self.cancel.cancel();
    self.inner().timer.stop();
  }

  pub fn is_shut_down(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Restart the question clock and the countdown for the current question.
  ///
  /// With the timer on, a question's own limit overrides the session-wide
  /// one. A zero limit means no countdown. A question shown while hidden
  /// starts paused.
  fn start_question(inner: &mut Inner, now: Instant, visible: bool) {
    inner.question_clock.start(now);
    let limit = inner.session.timer_per_question.map(|per_question| {
      inner
        .session
        .current_question()
        .and_then(|q| q.time_limit_seconds)
        .map(|s| Duration::from_secs(u64::from(s)))
        .unwrap_or(per_question)
    });
    match limit {
      Some(duration) if !duration.is_zero() => inner.timer.start(duration),
      _ => inner.timer.reset(),
    }
    if !visible {
      inner.timer.pause();
      inner.question_clock.pause(now);
    }
  }
}

/// Wire a machine to platform signals: replay on reconnect, pause while
/// hidden, reset when the session is revoked.
///
/// Events are handled one at a time, so reconnect drains never overlap.
pub fn spawn_platform_listener(machine: Arc<QuizSessionMachine>, bus: &EventBus) -> JoinHandle<()> {
  let mut rx = bus.subscribe();
  tokio::spawn(async move {
    loop {
      let event = match rx.recv().await {
        Ok(event) => event,
        Err(RecvError::Lagged(skipped)) => {
          warn!(skipped, "quiz listener lagged behind the event bus");
          continue;
        }
        Err(RecvError::Closed) => break,
      };
      if machine.is_shut_down() {
        break;
      }

      match event {
        PlatformEvent::Reconnected => {
          if let Err(e) = machine.reconcile().await {
            warn!(error = %e, "reconciliation after reconnect failed");
          }
        }
        PlatformEvent::VisibilityChanged(visible) => machine.handle_visibility(visible),
        PlatformEvent::SessionUnauthorized => machine.reset_quiz(),
        PlatformEvent::WentOffline | PlatformEvent::OpenBilling => {}
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::{MockBackend, CORRECT_ANSWER};
  use crate::clock::ManualClock;
  use crate::platform::MemoryPlatform;
  use crate::quiz::{Score, Tier};
  use crate::timer::TimerPhase;

  struct Harness {
    machine: Arc<QuizSessionMachine>,
    backend: Arc<MockBackend>,
    platform: Arc<MemoryPlatform>,
    clock: ManualClock,
    bus: EventBus,
  }

  fn harness() -> Harness {
    let bus = EventBus::new();
    let backend = Arc::new(MockBackend::new());
    let platform = MemoryPlatform::new(bus.clone()).into_shared();
    let clock = ManualClock::new();
    let machine = Arc::new(QuizSessionMachine::new(
      backend.clone(),
      platform.clone(),
      Arc::new(clock.clone()),
      bus.clone(),
    ));
    Harness {
      machine,
      backend,
      platform,
      clock,
      bus,
    }
  }

  async fn started(count: u32) -> Harness {
    let h = harness();
    h.machine
      .generate_quiz(vec![1, 2], count, true)
      .await
      .expect("generate");
    h
  }

  async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
      if check() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
  }

  #[tokio::test]
  async fn test_generate_quiz_starts_session() {
    let h = started(5).await;
    let session = h.machine.session();

    assert_eq!(session.questions.len(), 5);
    assert_eq!(session.current_index, 0);
    assert_eq!(session.status, QuizStatus::Active);
    assert_eq!(session.timer_per_question, Some(DEFAULT_TIMER));
    assert_eq!(session.deck_ids, vec![1, 2]);
    assert_eq!(h.machine.timer_state().phase, TimerPhase::Running);
  }

  #[tokio::test]
  async fn test_server_time_limit_wins_over_default() {
    let h = harness();
    h.backend.set_time_limit(Some(45));
    h.machine.generate_quiz(vec![1], 2, true).await.expect("generate");
    assert_eq!(h.machine.session().timer_per_question, Some(Duration::from_secs(45)));
  }

  #[tokio::test]
  async fn test_generate_validation_never_reaches_network() {
    let h = harness();
    assert!(matches!(
      h.machine.generate_quiz(Vec::new(), 5, false).await,
      Err(SyncError::Validation(_))
    ));
    assert!(matches!(
      h.machine.generate_quiz(vec![1], 0, false).await,
      Err(SyncError::Validation(_))
    ));
    assert_eq!(h.backend.calls("generate_quiz"), 0);
    assert_eq!(h.machine.session(), QuizSession::default());
  }

  #[tokio::test]
  async fn test_generate_rejected_offline() {
    let h = harness();
    h.platform.set_online(false);
    assert!(matches!(
      h.machine.generate_quiz(vec![1], 5, false).await,
      Err(SyncError::Rejected(_))
    ));
    assert_eq!(h.backend.calls("generate_quiz"), 0);
    assert_eq!(h.machine.session().status, QuizStatus::Setup);
  }

  #[tokio::test]
  async fn test_quota_rejects_and_opens_billing() {
    let h = harness();
    let mut rx = h.bus.subscribe();
    h.machine.set_usage(UsageInfo::for_tier(Tier::Free, 5));

    assert!(h.machine.generate_quiz(vec![1], 5, false).await.is_err());
    assert_eq!(h.backend.calls("generate_quiz"), 0);
    assert_eq!(rx.recv().await.ok(), Some(PlatformEvent::OpenBilling));
  }

  #[tokio::test]
  async fn test_successful_generation_counts_against_quota() {
    let h = harness();
    h.machine.set_usage(UsageInfo::for_tier(Tier::Free, 0));
    h.machine.generate_quiz(vec![1], 3, false).await.expect("generate");
    assert_eq!(h.machine.usage().map(|u| u.quizzes_used), Some(1));
  }

  #[tokio::test]
  async fn test_second_generate_rejected_while_active() {
    let h = started(2).await;
    assert!(h.machine.generate_quiz(vec![1], 2, false).await.is_err());
    assert_eq!(h.backend.calls("generate_quiz"), 1);
  }

  #[tokio::test]
  async fn test_online_answer_is_scored() {
    let h = started(3).await;
    let outcome = h.machine.submit_answer("q1", CORRECT_ANSWER).await.expect("submit");
    assert!(matches!(outcome, AnswerOutcome::Scored(ref r) if r.is_correct));

    let session = h.machine.session();
    assert_eq!(session.score, Score { correct: 1, incorrect: 0 });
    assert_eq!(session.questions[0].is_correct, Some(true));
    assert_eq!(session.questions[0].correct_answer.as_deref(), Some(CORRECT_ANSWER));
  }

  #[tokio::test]
  async fn test_offline_answer_is_queued() {
    let h = started(3).await;
    h.platform.set_online(false);

    let outcome = h.machine.submit_answer("q1", "Paris").await.expect("submit");
    assert_eq!(outcome, AnswerOutcome::Queued);

    let session = h.machine.session();
    assert_eq!(session.questions[0].user_answer.as_deref(), Some("Paris"));
    assert_eq!(session.questions[0].is_correct, None);
    assert_eq!(session.score, Score::default());
    assert_eq!(session.pending_answers.len(), 1);
    assert_eq!(h.backend.calls("submit_answer"), 0);
  }

  #[tokio::test]
  async fn test_reconnect_drains_queue() {
    let h = started(3).await;
    let listener = spawn_platform_listener(h.machine.clone(), &h.bus);
    h.platform.set_online(false);
    h.machine.submit_answer("q1", "Paris").await.expect("submit");

    h.platform.set_online(true);
    let machine = h.machine.clone();
    wait_until(move || machine.session().pending_answers.is_empty()).await;

    let session = h.machine.session();
    assert_eq!(session.questions[0].is_correct, Some(true));
    assert_eq!(session.score, Score { correct: 1, incorrect: 0 });
    assert_eq!(h.backend.calls("submit_answer"), 1);

    h.machine.shutdown();
    listener.abort();
  }

  #[tokio::test]
  async fn test_replay_after_online_scoring_counts_once() {
    let h = started(3).await;
    h.platform.set_online(false);
    h.machine.submit_answer("q1", "Paris").await.expect("queued");

    h.platform.set_online(true);
    h.machine.submit_answer("q1", "Paris").await.expect("scored online");
    assert_eq!(h.machine.session().score.correct, 1);

    // The stale queued copy is still replayed, but cannot score again
    assert_eq!(h.machine.reconcile().await, Ok(1));
    let session = h.machine.session();
    assert!(session.pending_answers.is_empty());
    assert_eq!(session.score, Score { correct: 1, incorrect: 0 });
    assert_eq!(h.backend.calls("submit_answer"), 2);
  }

  #[tokio::test]
  async fn test_scored_question_rejects_resubmission() {
    let h = started(2).await;
    h.machine.submit_answer("q1", "Rome").await.expect("submit");
    assert!(h.machine.submit_answer("q1", "Paris").await.is_err());
    assert_eq!(h.machine.session().score, Score { correct: 0, incorrect: 1 });
  }

  #[tokio::test]
  async fn test_failed_submission_keeps_local_answer() {
    let h = started(2).await;
    h.backend.fail_next("submit_answer", SyncError::from_status(500, "boom"));

    assert!(h.machine.submit_answer("q1", "Paris").await.is_err());
    let session = h.machine.session();
    assert_eq!(session.questions[0].user_answer.as_deref(), Some("Paris"));
    assert_eq!(session.questions[0].is_correct, None);

    h.machine.submit_answer("q1", "Paris").await.expect("resubmit");
    assert_eq!(h.machine.session().score.correct, 1);
  }

  #[tokio::test]
  async fn test_reconcile_is_ordered_and_stops_on_failure() {
    let h = started(3).await;
    h.platform.set_online(false);
    h.machine.submit_answer("q1", "Paris").await.expect("q1");
    h.machine.submit_answer("q2", "Rome").await.expect("q2");
    h.platform.set_online(true);

    h.backend.fail_next("submit_answer", SyncError::Network("reset".into()));
    assert!(h.machine.reconcile().await.is_err());
    assert_eq!(h.machine.session().pending_answers.len(), 2);

    assert_eq!(h.machine.reconcile().await, Ok(2));
    let order: Vec<String> = h.backend.submitted().into_iter().map(|s| s.answer_id).collect();
    assert_eq!(order, vec!["q1".to_string(), "q2".to_string()]);
    assert_eq!(h.machine.session().score, Score { correct: 1, incorrect: 1 });
  }

  #[tokio::test]
  async fn test_completion_guard() {
    let h = started(2).await;
    h.platform.set_online(false);
    h.machine.submit_answer("q1", "Paris").await.expect("queued");

    let before = h.machine.session();
    assert!(matches!(h.machine.complete_quiz().await, Err(SyncError::Rejected(_))));
    assert_eq!(h.machine.session(), before);

    h.platform.set_online(true);
    assert!(h.machine.complete_quiz().await.is_err());
    assert_eq!(h.backend.calls("complete_quiz"), 0);

    h.machine.reconcile().await.expect("drain");
    let result = h.machine.complete_quiz().await.expect("complete");
    assert_eq!(result.correct_answers, 1);

    let session = h.machine.session();
    assert_eq!(session.status, QuizStatus::Completed);
    assert_eq!(session.score, Score { correct: 1, incorrect: 1 });
    assert_eq!(session.result, Some(result));
  }

  #[tokio::test]
  async fn test_completion_rejected_offline_without_pending() {
    let h = started(1).await;
    h.platform.set_online(false);
    assert!(h.machine.complete_quiz().await.is_err());
    assert_eq!(h.machine.session().status, QuizStatus::Active);
  }

  #[tokio::test]
  async fn test_completed_quiz_cannot_regress() {
    let h = started(1).await;
    h.machine.complete_quiz().await.expect("complete");
    assert!(h.machine.complete_quiz().await.is_err());
    assert!(h.machine.submit_answer("q1", "Paris").await.is_err());
    assert!(h.machine.next_question().is_err());
    assert_eq!(h.machine.session().status, QuizStatus::Completed);
  }

  #[tokio::test]
  async fn test_next_question_restarts_timer() {
    let h = started(2).await;
    h.clock.advance(Duration::from_secs(10));
    assert!(!h.machine.tick());
    assert_eq!(h.machine.timer_state().remaining, Duration::from_secs(20));

    assert_eq!(h.machine.next_question(), Ok(true));
    assert_eq!(h.machine.session().current_index, 1);
    assert_eq!(h.machine.timer_state().remaining, DEFAULT_TIMER);
    assert_eq!(h.machine.next_question(), Ok(false));
  }

  #[tokio::test]
  async fn test_tick_reports_expiry_once() {
    let h = started(1).await;
    h.clock.advance(DEFAULT_TIMER);
    assert!(h.machine.tick());
    assert!(!h.machine.tick());
  }

  #[tokio::test]
  async fn test_hidden_time_is_not_counted() {
    let h = started(1).await;
    h.clock.advance(Duration::from_secs(5));
    h.machine.handle_visibility(false);
    h.clock.advance(Duration::from_secs(60));
    h.machine.handle_visibility(true);
    h.clock.advance(Duration::from_secs(2));

    assert!(!h.machine.tick());
    assert_eq!(h.machine.timer_state().remaining, Duration::from_secs(23));

    h.machine.submit_answer("q1", "Paris").await.expect("submit");
    assert_eq!(h.backend.submitted()[0].time_spent_seconds, 7);
  }

  #[tokio::test]
  async fn test_reset_discards_in_flight_generation() {
    let h = harness();
    h.backend.set_delay("generate_quiz", Duration::from_millis(30));

    let machine = h.machine.clone();
    let (generated, _) = tokio::join!(h.machine.generate_quiz(vec![1], 3, false), async move {
      tokio::time::sleep(Duration::from_millis(5)).await;
      machine.reset_quiz();
    });

    assert!(generated.is_err());
    assert_eq!(h.machine.session(), QuizSession::default());
  }

  #[tokio::test]
  async fn test_unauthorized_resets_session() {
    let h = started(2).await;
    let listener = spawn_platform_listener(h.machine.clone(), &h.bus);
    h.platform.set_online(false);
    h.machine.submit_answer("q1", "Paris").await.expect("queued");

    h.platform.set_credential(false);
    let machine = h.machine.clone();
    wait_until(move || machine.session().status == QuizStatus::Setup).await;
    assert!(h.machine.session().pending_answers.is_empty());

    listener.abort();
  }

  #[tokio::test]
  async fn test_answer_rejected_while_completing() {
    let h = started(2).await;
    h.machine.submit_answer("q1", CORRECT_ANSWER).await.expect("q1");
    h.backend.set_delay("complete_quiz", Duration::from_millis(30));

    let (completed, late) = tokio::join!(h.machine.complete_quiz(), async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      h.platform.set_online(false);
      h.machine.submit_answer("q2", CORRECT_ANSWER).await
    });

    assert!(matches!(late, Err(SyncError::Rejected(_))));
    assert_eq!(completed.map(|r| r.correct_answers), Ok(1));
    let session = h.machine.session();
    assert_eq!(session.status, QuizStatus::Completed);
    assert!(session.pending_answers.is_empty());
    assert_eq!(session.questions[1].user_answer, None);
  }

  #[tokio::test]
  async fn test_queued_answer_cannot_change_while_replaying() {
    let h = started(2).await;
    h.platform.set_online(false);
    h.machine.submit_answer("q1", "Rome").await.expect("queued");
    h.platform.set_online(true);
    h.backend.set_delay("submit_answer", Duration::from_millis(30));

    let (replayed, changed) = tokio::join!(h.machine.reconcile(), async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      h.platform.set_online(false);
      h.machine.submit_answer("q1", CORRECT_ANSWER).await
    });

    assert!(matches!(changed, Err(SyncError::Rejected(_))));
    assert_eq!(replayed, Ok(1));
    let session = h.machine.session();
    assert_eq!(session.questions[0].user_answer.as_deref(), Some("Rome"));
    assert_eq!(session.questions[0].is_correct, Some(false));
    assert!(session.pending_answers.is_empty());
    assert_eq!(session.score, Score { correct: 0, incorrect: 1 });
  }

  #[tokio::test]
  async fn test_answer_rejected_while_first_submission_in_flight() {
    let h = started(2).await;
    h.backend.set_delay("submit_answer", Duration::from_millis(30));

    let (first, second) = tokio::join!(h.machine.submit_answer("q1", "Rome"), async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      h.machine.submit_answer("q1", CORRECT_ANSWER).await
    });

    assert!(matches!(first, Ok(AnswerOutcome::Scored(ref r)) if !r.is_correct));
    assert!(matches!(second, Err(SyncError::Rejected(_))));
    let session = h.machine.session();
    assert_eq!(session.questions[0].user_answer.as_deref(), Some("Rome"));
    assert_eq!(h.backend.calls("submit_answer"), 1);
  }

  #[tokio::test]
  async fn test_undelivered_answer_is_queued() {
    let h = started(2).await;
    h.backend.fail_next("submit_answer", SyncError::Network("reset".into()));

    let outcome = h.machine.submit_answer("q1", CORRECT_ANSWER).await;
    assert_eq!(outcome, Ok(AnswerOutcome::Queued));
    assert_eq!(h.machine.session().pending_answers.len(), 1);
    assert!(matches!(h.machine.complete_quiz().await, Err(SyncError::Rejected(_))));

    assert_eq!(h.machine.reconcile().await, Ok(1));
    assert_eq!(h.machine.session().score, Score { correct: 1, incorrect: 0 });
  }

  #[tokio::test]
  async fn test_question_time_limit_overrides_session_limit() {
    let h = harness();
    h.backend.set_question_limits(vec![Some(10)]);
    h.machine.generate_quiz(vec![1], 2, true).await.expect("generate");

    assert_eq!(h.machine.session().timer_per_question, Some(DEFAULT_TIMER));
    assert_eq!(h.machine.timer_state().duration, Duration::from_secs(10));
    h.clock.advance(Duration::from_secs(10));
    assert!(h.machine.tick());

    assert_eq!(h.machine.next_question(), Ok(true));
    assert_eq!(h.machine.timer_state().duration, DEFAULT_TIMER);
  }

  #[tokio::test]
  async fn test_question_time_limit_ignored_without_timer() {
    let h = harness();
    h.backend.set_question_limits(vec![Some(10), Some(10)]);
    h.machine.generate_quiz(vec![1], 2, false).await.expect("generate");
    assert_eq!(h.machine.timer_state().phase, TimerPhase::Idle);

    h.clock.advance(Duration::from_secs(60));
    assert!(!h.machine.tick());
  }

  #[tokio::test]
  async fn test_zero_time_limit_means_no_countdown() {
    let h = harness();
    h.backend.set_time_limit(Some(0));
    h.machine.generate_quiz(vec![1], 1, true).await.expect("generate");

    assert_eq!(h.machine.session().timer_per_question, Some(Duration::ZERO));
    assert_eq!(h.machine.timer_state().phase, TimerPhase::Idle);
    h.clock.advance(Duration::from_secs(5));
    assert!(!h.machine.tick());
  }

  #[tokio::test]
  async fn test_question_shown_while_hidden_starts_paused() {
    let h = harness();
    h.platform.set_visible(false);
    h.machine.generate_quiz(vec![1], 1, true).await.expect("generate");
    assert_eq!(h.machine.timer_state().phase, TimerPhase::Paused);

    h.clock.advance(Duration::from_secs(60));
    h.machine.handle_visibility(true);
    h.clock.advance(Duration::from_secs(4));
    assert!(!h.machine.tick());
    assert_eq!(h.machine.timer_state().remaining, DEFAULT_TIMER - Duration::from_secs(4));

    h.machine.submit_answer("q1", CORRECT_ANSWER).await.expect("submit");
    assert_eq!(h.backend.submitted()[0].time_spent_seconds, 4);
  }
}
