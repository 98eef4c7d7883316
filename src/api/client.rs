use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::api::api_types::{ApiDeckList, ApiErrorBody, ApiQuizResponse, ApiReviewResponse};
use crate::api::backend::Backend;
use crate::api::types::{
  AnswerResult, AnswerSubmission, BillingStatus, Dashboard, Deck, DeckPage, DeckProgress,
  DeckQuery, GeneratedQuiz, NewDeck, QuizRequest, QuizResult, ReviewLog, ReviewOutcome,
};
use crate::config::Config;
use crate::error::SyncError;
use crate::platform::{EventBus, PlatformEvent};

/// HTTP client for the study API.
///
/// A 401 from any endpoint is broadcast as
/// [`PlatformEvent::SessionUnauthorized`] before being returned.
#[derive(Clone)]
pub struct HttpBackend {
  client: reqwest::Client,
  base: Url,
  token: Option<String>,
  bus: EventBus,
}

impl HttpBackend {
  pub fn new(config: &Config, token: Option<String>, bus: EventBus) -> Result<Self> {
    let mut url = config.api.url.clone();
    if !url.ends_with('/') {
      url.push('/');
    }
    let base = Url::parse(&url).map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token,
      bus,
    })
  }

  fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, SyncError> {
    let url = self
      .base
      .join(path)
      .map_err(|e| SyncError::Validation(format!("bad request path {}: {}", path, e)))?;
    let builder = self.client.request(method, url);
    Ok(match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    })
  }

  /// Send a request and map the status to the error taxonomy.
  async fn execute(&self, builder: RequestBuilder) -> Result<reqwest::Response, SyncError> {
    let response = builder
      .send()
      .await
      .map_err(|e| SyncError::Network(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
      warn!(url = %response.url(), "session rejected by server");
      self.bus.publish(PlatformEvent::SessionUnauthorized);
      return Err(SyncError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SyncError::from_status(
      status.as_u16(),
      ApiErrorBody::message_from(&body),
    ))
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
    debug!(path, "GET");
    let response = self.execute(self.request(Method::GET, path)?).await?;
    Ok(response.json::<T>().await?)
  }

  async fn send<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, SyncError>
  where
    B: Serialize + ?Sized + Sync,
    T: DeserializeOwned,
  {
    debug!(path, %method, "request");
    let response = self.execute(self.request(method, path)?.json(body)).await?;
    Ok(response.json::<T>().await?)
  }
}

#[async_trait]
impl Backend for HttpBackend {
  async fn list_decks(&self, query: Option<&DeckQuery>) -> Result<DeckPage, SyncError> {
    let mut builder = self.request(Method::GET, "decks")?;
    if let Some(q) = query {
      builder = builder.query(&[("page", q.page), ("perPage", q.per_page)]);
      if let Some(search) = &q.search {
        builder = builder.query(&[("search", search)]);
      }
    }
    let list: ApiDeckList = self.execute(builder).await?.json().await?;
    Ok(list.into())
  }

  async fn get_deck(&self, id: u64) -> Result<Deck, SyncError> {
    self.get(&format!("decks/{}", id)).await
  }

  async fn create_deck(&self, deck: &NewDeck) -> Result<Deck, SyncError> {
    self.send(Method::POST, "decks", deck).await
  }

  async fn update_deck(&self, id: u64, deck: &NewDeck) -> Result<Deck, SyncError> {
    self.send(Method::PUT, &format!("decks/{}", id), deck).await
  }

  async fn delete_deck(&self, id: u64) -> Result<(), SyncError> {
    self
      .execute(self.request(Method::DELETE, &format!("decks/{}", id))?)
      .await?;
    Ok(())
  }

  async fn progress_all(&self) -> Result<Vec<DeckProgress>, SyncError> {
    self.get("progress").await
  }

  async fn deck_progress(&self, deck_id: u64) -> Result<DeckProgress, SyncError> {
    self.get(&format!("progress/{}", deck_id)).await
  }

  async fn dashboard(&self) -> Result<Dashboard, SyncError> {
    self.get("dashboard").await
  }

  async fn log_review(&self, review: &ReviewLog) -> Result<ReviewOutcome, SyncError> {
    let response: ApiReviewResponse = self.send(Method::POST, "reviews", review).await?;
    Ok(response.into())
  }

  async fn generate_quiz(&self, request: &QuizRequest) -> Result<GeneratedQuiz, SyncError> {
    let response: ApiQuizResponse = self
      .send(Method::POST, "quizzes/generate", request)
      .await?;
    Ok(response.into())
  }

  async fn submit_answer(
    &self,
    quiz_id: &str,
    submission: &AnswerSubmission,
  ) -> Result<AnswerResult, SyncError> {
    self
      .send(
        Method::POST,
        &format!("quizzes/{}/answers", quiz_id),
        submission,
      )
      .await
  }

  async fn complete_quiz(&self, quiz_id: &str) -> Result<QuizResult, SyncError> {
    self
      .send(
        Method::POST,
        &format!("quizzes/{}/complete", quiz_id),
        &serde_json::json!({}),
      )
      .await
  }

  async fn billing_status(&self) -> Result<BillingStatus, SyncError> {
    self.get("billing/status").await
  }
}
