// src/utils/generator.rs

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::{config::GeneratorConfig, models::question::GeneratedQuestion};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*").expect("code fence pattern is valid"));

#[derive(Debug)]
pub enum GenerationError {
    Http(String),
    Malformed(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::Http(msg) => write!(f, "generation request failed: {}", msg),
            GenerationError::Malformed(msg) => write!(f, "malformed generation output: {}", msg),
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Http(err.to_string())
    }
}

/// External service that drafts multiple-choice questions for a syllabus point.
///
/// Best-effort: may return fewer drafts than requested, or none at all.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(
        &self,
        syllabus_point: &str,
        count: u32,
    ) -> Result<Vec<GeneratedQuestion>, GenerationError>;
}

/// Generator backed by the Gemini `generateContent` API.
pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl GeminiGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

fn build_prompt(syllabus_point: &str, count: u32) -> String {
    format!(
        r#"You are an expert teacher writing exam questions.
Generate exactly {count} multiple-choice questions for the following syllabus point:
"{syllabus_point}"

Rules:
- Each question must have exactly 4 options with ids a, b, c, d
- Exactly one correct answer
- Include a short explanation (1-2 sentences)
- Questions must be exam-style, clear and unambiguous

Return ONLY a valid JSON array in this exact format, no other text:
[
  {{
    "question": "...",
    "options": [
      {{"id": "a", "text": "..."}},
      {{"id": "b", "text": "..."}},
      {{"id": "c", "text": "..."}},
      {{"id": "d", "text": "..."}}
    ],
    "correct_option_id": "a",
    "explanation": "..."
  }}
]"#
    )
}

/// Parses the model's text answer, tolerating markdown code fences.
pub fn parse_drafts(text: &str, count: u32) -> Result<Vec<GeneratedQuestion>, GenerationError> {
    let cleaned = CODE_FENCE.replace_all(text, "");
    let mut drafts: Vec<GeneratedQuestion> = serde_json::from_str(cleaned.trim())
        .map_err(|e| GenerationError::Malformed(e.to_string()))?;
    drafts.truncate(count as usize);
    Ok(drafts)
}

#[async_trait]
impl QuestionGenerator for GeminiGenerator {
    async fn generate(
        &self,
        syllabus_point: &str,
        count: u32,
    ) -> Result<Vec<GeneratedQuestion>, GenerationError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            tracing::debug!("Question generation disabled: no API key configured");
            return Ok(Vec::new());
        };

        let mut url = self.config.endpoint.clone();
        url.query_pairs_mut().append_pair("key", api_key);

        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(syllabus_point, count) }] }]
        });

        let response: GenerateResponse = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
            .ok_or_else(|| GenerationError::Malformed("no candidates returned".to_string()))?;

        parse_drafts(&text, count)
    }
}
