//! HTTP access to the kiosk Q&A backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kiosk::questions::PredefinedQuestion;

/// Answer payload from `POST {base}/question`.
///
/// The backend reports failures in-band: `success: false` plus an `error`
/// string, usually still with a 200 status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub success: bool,
    /// Answer text, or a fallback phrase on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Synthesized narration, a `data:` URL or a fetchable location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Knowledge-base hits backing the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<serde_json::Value>,
    /// Token accounting from the language model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnswerResponse {
    /// Narration audio, with empty placeholders filtered out.
    #[must_use]
    pub fn audio(&self) -> Option<&str> {
        self.audio_url.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    success: bool,
    #[serde(default)]
    questions: Vec<PredefinedQuestion>,
    #[serde(default)]
    error: Option<String>,
}

/// Q&A backend operations the kiosk controller depends on.
///
/// The production implementation is [`TotemApi`]; tests supply scripted
/// stand-ins so controller behavior is checked without a live backend.
#[async_trait]
pub trait QaBackend: Send + Sync {
    /// Submit one question, optionally scoped by a knowledge-base filter.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success HTTP status;
    /// in-band failures come back as `success: false`.
    async fn ask(&self, question: &str, filter: Option<&str>) -> Result<AnswerResponse>;

    /// Fetch the predefined question menu.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or when the backend reports the
    /// menu unavailable.
    async fn predefined_questions(&self) -> Result<Vec<PredefinedQuestion>>;

    /// Backend liveness check, JSON returned verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success HTTP status.
    async fn health(&self) -> Result<serde_json::Value>;

    /// Backend connectivity self-test, JSON returned verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success HTTP status.
    async fn probe(&self) -> Result<serde_json::Value>;
}

/// HTTP client for the totem Q&A endpoints.
#[derive(Debug, Clone)]
pub struct TotemApi {
    base_url: String,
    http: reqwest::Client,
}

impl TotemApi {
    /// Create a client rooted at the API base, e.g.
    /// `http://localhost:3000/api/totem`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!("{path} returned {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl QaBackend for TotemApi {
    async fn ask(&self, question: &str, filter: Option<&str>) -> Result<AnswerResponse> {
        let url = format!("{}/question", self.base_url);

        let mut body = serde_json::json!({ "question": question });
        if let Some(filter) = filter {
            body["filter"] = serde_json::Value::String(filter.to_string());
        }

        tracing::debug!(url = %url, "submitting kiosk question");
        let response = self.http.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "question endpoint returned {status}: {text}"
            )));
        }

        Ok(response.json().await?)
    }

    async fn predefined_questions(&self) -> Result<Vec<PredefinedQuestion>> {
        let parsed: QuestionsResponse =
            serde_json::from_value(self.get_json("/questions").await?)?;

        if !parsed.success {
            let reason = parsed.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(Error::Backend(format!("questions endpoint failed: {reason}")));
        }

        Ok(parsed.questions)
    }

    async fn health(&self) -> Result<serde_json::Value> {
        self.get_json("/health").await
    }

    async fn probe(&self) -> Result<serde_json::Value> {
        self.get_json("/test").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_successful_answer() {
        let json = r#"{
            "success": true,
            "text": "Hola, ¿en qué puedo ayudarte?",
            "audioUrl": "data:audio/wav;base64,AAAA",
            "searchResults": [{"score": 0.9}],
            "usage": {"totalTokens": 42}
        }"#;
        let answer: AnswerResponse = serde_json::from_str(json).unwrap();
        assert!(answer.success);
        assert_eq!(answer.text.as_deref(), Some("Hola, ¿en qué puedo ayudarte?"));
        assert_eq!(answer.audio(), Some("data:audio/wav;base64,AAAA"));
        assert!(answer.error.is_none());
    }

    #[test]
    fn parses_failed_answer() {
        let json = r#"{"success": false, "error": "timeout"}"#;
        let answer: AnswerResponse = serde_json::from_str(json).unwrap();
        assert!(!answer.success);
        assert_eq!(answer.error.as_deref(), Some("timeout"));
        assert!(answer.audio().is_none());
    }

    #[test]
    fn empty_audio_url_filtered() {
        let json = r#"{"success": true, "text": "hi", "audioUrl": ""}"#;
        let answer: AnswerResponse = serde_json::from_str(json).unwrap();
        assert!(answer.audio().is_none());
    }

    #[test]
    fn parses_questions_envelope() {
        let json = r#"{
            "success": true,
            "questions": [
                {"id": "intro", "text": "Intro", "question": "Tell me about it"}
            ]
        }"#;
        let parsed: QuestionsResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.questions.len(), 1);
        assert_eq!(parsed.questions[0].id, "intro");
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let api = TotemApi::new("http://localhost:3000/api/totem/");
        assert_eq!(api.base_url(), "http://localhost:3000/api/totem");
    }
}
