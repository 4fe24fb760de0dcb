//! HTTP-backed [`FlashcardStore`] adapter (§6.4).
//!
//! Same shape as [`crate::adapters::llm_http::HttpLlmAdapter`]: one
//! `reqwest::Client`, bearer auth, JSON bodies. Talks to a REST-ish
//! flashcard service fronting the learner's deck data (an Anki-Connect-style
//! backend in production, per `FlashcardAdapterKind::Anki`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::FlashcardPortConfig;
use crate::domain::card::{Card, Rating};
use crate::error::{Result, TutorError};
use crate::ports::{DeckSummary, FlashcardStore};

pub struct HttpFlashcardStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFlashcardStore {
    /// # Errors
    ///
    /// Returns [`TutorError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &FlashcardPortConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| TutorError::Config(format!("build flashcard http client: {e}")))?;
        Ok(Self { client, base_url: config.store_url.clone() })
    }
}

#[derive(Serialize)]
struct SubmitReviewBody<'a> {
    card_id: u64,
    session_id: &'a str,
    rating: u8,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[async_trait]
impl FlashcardStore for HttpFlashcardStore {
    async fn get_decks(&self) -> Result<Vec<DeckSummary>> {
        fetch_json(&self.client, format!("{}/decks", self.base_url)).await
    }

    async fn get_decks_with_card_counts(&self) -> Result<Vec<DeckSummary>> {
        fetch_json(&self.client, format!("{}/decks?with_counts=true", self.base_url)).await
    }

    async fn get_reviewable_cards(&self, deck: &str) -> Result<Vec<Card>> {
        let url = format!("{}/decks/{}/cards", self.base_url, urlencoding::encode(deck));
        fetch_json(&self.client, url).await
    }

    async fn submit_review(&self, card_id: u64, session_id: &str, rating: Rating) -> Result<()> {
        let body = SubmitReviewBody { card_id, session_id, rating: rating.as_u8() };
        let response = self
            .client
            .post(format!("{}/cards/{card_id}/review", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| TutorError::Store(store_error_message("submit_review", &e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(TutorError::Store(format!("submit_review returned {status}: {text}")));
        }
        Ok(())
    }

    async fn get_card_image(&self, filename: &str) -> Result<Vec<u8>> {
        let url = format!("{}/images/{}", self.base_url, urlencoding::encode(filename));
        let response: ImageResponse = fetch_json(&self.client, url).await?;
        Ok(response.data)
    }
}

async fn fetch_json<T: serde::de::DeserializeOwned>(client: &reqwest::Client, url: String) -> Result<T> {
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| TutorError::Store(store_error_message(&url, &e)))?;
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(TutorError::Store(format!("{url} returned {status}: {text}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| TutorError::Store(format!("{url} returned an unparseable body: {e}")))
}

/// Keeps network-vs-response failures distinguishable in the message text,
/// since [`crate::sync_orchestrator`] classifies transient-vs-permanent
/// failures by inspecting the message (§4.11, §7).
fn store_error_message(op: &str, err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("{op}: timeout")
    } else if err.is_connect() {
        format!("{op}: connection unavailable")
    } else {
        format!("{op}: {err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_reviewable_cards_deserializes_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/decks/Capitals/cards"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 1,
                "deck_name": "Capitals",
                "question": "Capital of France?",
                "answer": "Paris",
                "image_url": null,
                "queue_class": "review"
            }])))
            .mount(&server)
            .await;

        let store = HttpFlashcardStore::new(&FlashcardPortConfig {
            adapter: crate::config::FlashcardAdapterKind::Anki,
            store_url: server.uri(),
        })
        .unwrap();
        let cards = store.get_reviewable_cards("Capitals").await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].answer, "Paris");
    }

    #[tokio::test]
    async fn submit_review_surfaces_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cards/1/review"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = HttpFlashcardStore::new(&FlashcardPortConfig {
            adapter: crate::config::FlashcardAdapterKind::Anki,
            store_url: server.uri(),
        })
        .unwrap();
        let result = store.submit_review(1, "sess-1", Rating::Good).await;
        assert!(matches!(result, Err(TutorError::Store(_))));
    }
}
