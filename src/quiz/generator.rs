use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::item::{NO_NEW_QUESTION, QuizItem, RawQuizItem, ValidationError};

/// Content problem: the model answered, but not with a usable quiz item.
#[derive(Debug, Clone, Error)]
#[error("could not parse model output: {reason}")]
pub struct ParseError {
    pub reason: String,
    pub raw_output: String,
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("source text is empty")]
    EmptySource,
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model rejected credentials: {0}")]
    Auth(String),
    #[error("model did not answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure classes the presentation layer tells apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Fetch,
    Generation,
    Parse,
    Validation,
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Parse(_) => ErrorKind::Parse,
            GenerationError::EmptySource => ErrorKind::Validation,
            GenerationError::Transport(_)
            | GenerationError::Auth(_)
            | GenerationError::Timeout(_) => ErrorKind::Generation,
        }
    }

    pub fn raw_output(&self) -> Option<&str> {
        match self {
            GenerationError::Parse(e) => Some(&e.raw_output),
            _ => None,
        }
    }
}

pub trait QuestionGenerator: Send + Sync {
    /// Produces one question about `source_text` that is not in `asked_questions`,
    /// or the sentinel item when the model reports nothing new is left.
    fn generate(
        &self,
        source_text: &str,
        asked_questions: &[String],
    ) -> impl Future<Output = Result<QuizItem, GenerationError>> + Send;
}

const EXHAUSTED_EXPLANATION: &str = "Could not generate a new unique question from the remaining text or based on the provided constraints.";

pub fn build_prompt(source_text: &str, asked_questions: &[String]) -> String {
    let asked = if asked_questions.is_empty() {
        "N/A (this is the first question)".to_string()
    } else {
        asked_questions
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let sentinel = serde_json::json!({
        "question": NO_NEW_QUESTION,
        "options": [],
        "answer": 0,
        "explanation": EXHAUSTED_EXPLANATION,
    });

    format!(
        r#"You are an expert quiz generator. Based on the following text, generate ONE new multiple-choice quiz question.
The question must be answerable SOLELY from the provided text.
The question should have exactly 4 distinct options.
Indicate the correct answer as a 0-indexed integer.
Provide a brief, factual explanation for why the correct answer is correct, directly derived from the text.
The explanation must NOT include phrases like 'the text states', 'according to the document' or 'as mentioned in the passage'. Just state the facts supporting the answer.

IMPORTANT: DO NOT generate any of the following questions, as they have already been asked:
--- PREVIOUSLY ASKED QUESTIONS ---
{asked}
--- END PREVIOUSLY ASKED QUESTIONS ---

If you ABSOLUTELY CANNOT generate a new, unique question (different from the list above) based on the provided text,
then and only then, respond with the following exact JSON structure:
{sentinel}

{schema}

Here is the text to base the quiz on:
--- TEXT ---
{source_text}
--- END TEXT ---

Your response must be a single JSON object matching the schema."#,
        schema = format_instructions(),
    )
}

fn format_instructions() -> String {
    let schema = serde_json::json!({
        "type": "object",
        "properties": {
            "question": { "type": "string", "description": "The quiz question." },
            "options": {
                "type": "array",
                "items": { "type": "string" },
                "description": "A list of 4 multiple choice options, or an empty list if no new question can be generated."
            },
            "answer": {
                "type": "integer",
                "description": "The 0-indexed integer of the correct option in 'options', or 0 if no new question can be generated."
            },
            "explanation": {
                "type": "string",
                "description": "A brief, factual explanation of why the correct answer is correct. If no new question, this explains why."
            }
        },
        "required": ["question", "options", "answer", "explanation"]
    });
    format!("The output must be a JSON instance conforming to this JSON schema:\n{schema}")
}

/// Parses raw model output into a validated item. A surrounding Markdown code
/// fence is tolerated, anything else that is not the schema is rejected.
pub fn parse_quiz_item(raw_output: &str) -> Result<QuizItem, ParseError> {
    let body = strip_code_fence(raw_output);

    let raw: RawQuizItem = serde_json::from_str(body).map_err(|e| ParseError {
        reason: format!("invalid JSON: {e}"),
        raw_output: raw_output.to_string(),
    })?;

    QuizItem::try_from(raw).map_err(|e: ValidationError| ParseError {
        reason: e.to_string(),
        raw_output: raw_output.to_string(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag such as ```json, with or without a newline after it
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
