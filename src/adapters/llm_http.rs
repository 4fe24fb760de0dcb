//! HTTP-backed [`LlmPort`] adapter.
//!
//! Grounded on the teacher's `fae_llm::providers::openai` adapter: a
//! `reqwest::Client` built once at startup, bearer auth, JSON request/
//! response bodies. Unlike the teacher's streaming chat-completions client,
//! this port's three calls (evaluate/hint/explain) are single-shot JSON
//! request/response — no SSE framing needed.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::LlmPortConfig;
use crate::error::{Result, TutorError};
use crate::ports::{EvaluateRequest, ExplanationResponse, HintResponse, LlmPort, RawEvaluation};

/// Talks to a Gemini-family (or compatible) evaluation endpoint over HTTP.
pub struct HttpLlmAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpLlmAdapter {
    /// Build the adapter from [`LlmPortConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`TutorError::Config`] if the underlying HTTP client cannot
    /// be constructed (bad TLS config, unparseable default headers).
    pub fn new(config: &LlmPortConfig, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TutorError::Config(format!("build LLM http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }
}

#[derive(Serialize)]
struct EvaluateBody<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a EvaluateRequest<'a>,
}

#[derive(Serialize)]
struct HintBody<'a> {
    model: &'a str,
    question: &'a str,
    answer: &'a str,
    level: u32,
    previous_hints: &'a [String],
    user_attempts: &'a [String],
    socratic_context: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    evaluation_gap: Option<&'a str>,
}

#[derive(Serialize)]
struct ExplainBody<'a> {
    model: &'a str,
    question: &'a str,
    answer: &'a str,
}

#[async_trait]
impl LlmPort for HttpLlmAdapter {
    async fn evaluate(&self, request: EvaluateRequest<'_>) -> Result<RawEvaluation> {
        let body = EvaluateBody { model: &self.model, request: &request };
        let response = self
            .authed(self.client.post(format!("{}/v1/evaluate", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| TutorError::Llm(format!("evaluate request failed: {e}")))?;
        parse_response(response, "evaluate").await
    }

    async fn generate_hint(
        &self,
        question: &str,
        answer: &str,
        level: u32,
        previous_hints: &[String],
        user_attempts: &[String],
        socratic_context: &[String],
        evaluation_gap: Option<&str>,
    ) -> Result<HintResponse> {
        let body = HintBody {
            model: &self.model,
            question,
            answer,
            level,
            previous_hints,
            user_attempts,
            socratic_context,
            evaluation_gap,
        };
        let response = self
            .authed(self.client.post(format!("{}/v1/hint", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| TutorError::Llm(format!("generate_hint request failed: {e}")))?;
        parse_response(response, "generate_hint").await
    }

    async fn explain_answer(&self, question: &str, answer: &str) -> Result<ExplanationResponse> {
        let body = ExplainBody { model: &self.model, question, answer };
        let response = self
            .authed(self.client.post(format!("{}/v1/explain", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| TutorError::Llm(format!("explain_answer request failed: {e}")))?;
        parse_response(response, "explain_answer").await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    op: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(TutorError::Llm(format!("{op} returned {status}: {text}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| TutorError::Llm(format!("{op} returned an unparseable body: {e}")))
}
