//! In-memory collaborators for driving sessions in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::generator::{GenerationError, QuestionGenerator};
use super::item::{NO_NEW_QUESTION, QuizItem};
use crate::content::{ContentSource, FetchError, FetchedContent};

pub fn question(text: &str, answer: i64) -> QuizItem {
    QuizItem::new(
        text,
        vec![
            format!("{text} A"),
            format!("{text} B"),
            format!("{text} C"),
            format!("{text} D"),
        ],
        answer,
        format!("Because of {text}"),
    )
    .unwrap()
}

pub fn sentinel() -> QuizItem {
    QuizItem::new(NO_NEW_QUESTION, vec![], 0, "Nothing new").unwrap()
}

/// Replays queued results in order. Once the queue is empty it reports
/// exhaustion, like a model that ran out of material.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<QuizItem, GenerationError>>>,
    calls: Mutex<Vec<Vec<String>>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<QuizItem, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Each call waits for one `notify_one` on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// The asked-question lists received, one per call.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl QuestionGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        source_text: &str,
        asked_questions: &[String],
    ) -> Result<QuizItem, GenerationError> {
        if source_text.trim().is_empty() {
            return Err(GenerationError::EmptySource);
        }
        self.calls.lock().unwrap().push(asked_questions.to_vec());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(sentinel()))
    }
}

/// Always answers with the same page, or fails with 404 when built with `unreachable`.
pub struct StaticContentSource {
    text: Option<String>,
}

impl StaticContentSource {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub fn unreachable() -> Self {
        Self { text: None }
    }
}

impl ContentSource for StaticContentSource {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        match &self.text {
            Some(text) => Ok(FetchedContent::new(url, text, 100_000)),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
