use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Question text the model returns when it cannot come up with anything new.
pub const NO_NEW_QUESTION: &str = "NO_NEW_QUESTION";

pub const OPTION_COUNT: usize = 4;

/// Shown in place of the chosen option when the submitted index matches nothing.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("sentinel question must have empty options and answer 0")]
    SentinelShape,
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("options must have exactly 4 entries, found {found}")]
    OptionCount { found: usize },
    #[error("option {index} must not be empty")]
    EmptyOption { index: usize },
    #[error("option {index} duplicates an earlier option")]
    DuplicateOption { index: usize },
    #[error("answer index out of range: {answer} is not in 0..{len}")]
    AnswerOutOfRange { answer: i64, len: usize },
    #[error("explanation must not be empty")]
    EmptyExplanation,
}

/// Raw shape of a quiz item as the model emits it. Only ever turned into a
/// [`QuizItem`] through [`QuizItem::new`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuizItem {
    pub question: String,
    pub options: Vec<String>,
    pub answer: i64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizItem {
    question: String,
    options: Vec<String>,
    answer: usize,
    explanation: String,
}

impl QuizItem {
    /// Builds a validated item. The sentinel is checked before anything else
    /// since it relaxes the option and answer rules.
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        answer: i64,
        explanation: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let question = question.into().trim().to_string();
        let explanation = explanation.into().trim().to_string();

        if question == NO_NEW_QUESTION {
            if !options.is_empty() || answer != 0 {
                return Err(ValidationError::SentinelShape);
            }
            if explanation.is_empty() {
                return Err(ValidationError::EmptyExplanation);
            }
            return Ok(Self {
                question,
                options,
                answer: 0,
                explanation,
            });
        }

        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }

        if options.len() != OPTION_COUNT {
            return Err(ValidationError::OptionCount {
                found: options.len(),
            });
        }

        let options: Vec<String> = options.into_iter().map(|o| o.trim().to_string()).collect();
        let mut seen = HashSet::new();
        for (index, option) in options.iter().enumerate() {
            if option.is_empty() {
                return Err(ValidationError::EmptyOption { index });
            }
            if !seen.insert(option.as_str()) {
                return Err(ValidationError::DuplicateOption { index });
            }
        }

        let answer = usize::try_from(answer)
            .ok()
            .filter(|idx| *idx < options.len())
            .ok_or(ValidationError::AnswerOutOfRange {
                answer,
                len: options.len(),
            })?;

        if explanation.is_empty() {
            return Err(ValidationError::EmptyExplanation);
        }

        Ok(Self {
            question,
            options,
            answer,
            explanation,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.question == NO_NEW_QUESTION
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn answer(&self) -> usize {
        self.answer
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.answer).map(String::as_str)
    }
}

impl TryFrom<RawQuizItem> for QuizItem {
    type Error = ValidationError;

    fn try_from(raw: RawQuizItem) -> Result<Self, Self::Error> {
        QuizItem::new(raw.question, raw.options, raw.answer, raw.explanation)
    }
}

impl<'de> Deserialize<'de> for QuizItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let raw = RawQuizItem::deserialize(deserializer)?;
        QuizItem::try_from(raw).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub question: String,
    pub options: Vec<String>,
    pub user_answer_text: String,
    pub correct_answer_text: String,
    pub correct_answer_index: usize,
    pub is_correct: bool,
    pub explanation: String,
    pub answered_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn record(item: &QuizItem, chosen_index: usize) -> Self {
        let user_answer_text = item
            .options()
            .get(chosen_index)
            .cloned()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let correct_answer_text = item
            .correct_option()
            .unwrap_or(NOT_AVAILABLE)
            .to_string();

        Self {
            question: item.question().to_string(),
            options: item.options().to_vec(),
            user_answer_text,
            correct_answer_text,
            correct_answer_index: item.answer(),
            is_correct: chosen_index == item.answer(),
            explanation: item.explanation().to_string(),
            answered_at: Utc::now(),
        }
    }
}
