use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::generator::{GenerationError, QuestionGenerator, build_prompt, parse_quiz_item};
use super::item::QuizItem;
use crate::config::GeneratorConfig;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize, Debug)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Question generator backed by Google's Generative Language API.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl GeminiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    #[tracing::instrument(skip(self, prompt), fields(
        model = %self.config.model,
        prompt.length = prompt.len()
    ))]
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error body".to_string());
            tracing::error!(
                http.status = %status,
                "Model request failed"
            );
            return Err(status_error(status, &error_body));
        }

        let envelope = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        envelope.into_text().ok_or_else(|| {
            GenerationError::Transport("model response contained no candidate text".to_string())
        })
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout(Duration::from_secs(self.config.timeout_secs))
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

/// Credential rejections are told apart from every other non-2xx answer.
fn status_error(status: reqwest::StatusCode, body: &str) -> GenerationError {
    let message = format!("HTTP {}: {}", status, body);
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        GenerationError::Auth(message)
    } else {
        GenerationError::Transport(message)
    }
}

impl QuestionGenerator for GeminiGenerator {
    async fn generate(
        &self,
        source_text: &str,
        asked_questions: &[String],
    ) -> Result<QuizItem, GenerationError> {
        if source_text.trim().is_empty() {
            return Err(GenerationError::EmptySource);
        }

        let prompt = build_prompt(source_text, asked_questions);
        let raw_output = self.complete(&prompt).await?;

        match parse_quiz_item(&raw_output) {
            Ok(item) => {
                tracing::debug!(
                    exhausted = item.is_exhausted(),
                    asked.count = asked_questions.len(),
                    "Generated quiz item"
                );
                Ok(item)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_output = %e.raw_output,
                    "Model output did not match the quiz item schema"
                );
                Err(e.into())
            }
        }
    }
}
