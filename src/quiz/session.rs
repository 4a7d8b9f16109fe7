use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::generator::{ErrorKind, GenerationError};
use super::item::{HistoryEntry, QuizItem};
use crate::content::{ContentInfo, FetchError, FetchedContent};

/// Identifies one outstanding fetch/generation request. Results carrying a
/// token other than the pending one are dropped.
pub type RequestToken = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    UserStopped,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", content = "reason")]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Active,
    Answered,
    Stopped(StopReason),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Loading => write!(f, "loading"),
            SessionState::Active => write!(f, "active"),
            SessionState::Answered => write!(f, "answered"),
            SessionState::Stopped(StopReason::UserStopped) => write!(f, "stopped"),
            SessionState::Stopped(StopReason::Exhausted) => write!(f, "exhausted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {operation} while the session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },
    #[error("no question is waiting for an answer")]
    NoCurrentQuestion,
    #[error("option {index} does not exist, the question has {len} options")]
    OptionOutOfRange { index: usize, len: usize },
    #[error("another request for this session is still in flight")]
    Busy,
    #[error("request was cancelled by a stop or reset")]
    Cancelled,
    #[error("{}", .0.message)]
    Failed(SessionFailure),
    #[error("session is no longer running")]
    Unavailable,
}

/// Most recent failure, kept for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl From<&GenerationError> for SessionFailure {
    fn from(err: &GenerationError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            raw_output: err.raw_output().map(str::to_string),
        }
    }
}

impl From<&FetchError> for SessionFailure {
    fn from(err: &FetchError) -> Self {
        Self {
            kind: ErrorKind::Fetch,
            message: err.to_string(),
            raw_output: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Score {
    NoAnswers,
    Ratio { correct: usize, total: usize },
}

impl Score {
    pub fn percent(&self) -> Option<f64> {
        match self {
            Score::NoAnswers => None,
            Score::Ratio { correct, total } => Some(*correct as f64 / *total as f64 * 100.0),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::NoAnswers => write!(f, "no questions answered"),
            Score::Ratio { correct, total } => write!(
                f,
                "{}/{} ({:.1}%)",
                correct,
                total,
                self.percent().unwrap_or_default()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub token: RequestToken,
    pub source_text: Arc<str>,
    pub asked_questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Ready(GenerationRequest),
    Failed,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Question,
    Exhausted,
    Failed,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    pub entry: HistoryEntry,
    /// False when the answer repeated the last recorded question and was not stored again.
    pub recorded: bool,
}

/// The question as shown to the user, without its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub number: usize,
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub active: bool,
    pub busy: bool,
    pub current_question: Option<QuestionView>,
    /// Result of the answer just submitted, while the session is `Answered`.
    pub last_answer: Option<HistoryEntry>,
    pub history: Vec<HistoryEntry>,
    pub asked_count: usize,
    pub score: Score,
    pub score_percent: Option<f64>,
    pub score_summary: String,
    pub content: Option<ContentInfo>,
    pub last_error: Option<SessionFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Load,
    Next,
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    token: RequestToken,
    kind: PendingKind,
}

/// Quiz state for one user: the loaded text, what has been asked, the answer
/// history and the question currently on screen.
#[derive(Debug, Default)]
pub struct QuizSession {
    state: SessionState,
    source_text: Option<Arc<str>>,
    content: Option<ContentInfo>,
    asked_questions: Vec<String>,
    history: Vec<HistoryEntry>,
    current_item: Option<QuizItem>,
    last_error: Option<SessionFailure>,
    generation_token: RequestToken,
    pending: Option<PendingRequest>,
}

impl QuizSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session still expects questions to be asked.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Loading | SessionState::Active | SessionState::Answered
        )
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn asked_questions(&self) -> &[String] {
        &self.asked_questions
    }

    pub fn current_item(&self) -> Option<&QuizItem> {
        self.current_item.as_ref()
    }

    pub fn source_text(&self) -> Option<&str> {
        self.source_text.as_deref()
    }

    pub fn content(&self) -> Option<&ContentInfo> {
        self.content.as_ref()
    }

    pub fn last_error(&self) -> Option<&SessionFailure> {
        self.last_error.as_ref()
    }

    pub fn score(&self) -> Score {
        let total = self.history.len();
        if total == 0 {
            return Score::NoAnswers;
        }
        let correct = self.history.iter().filter(|h| h.is_correct).count();
        Score::Ratio { correct, total }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let score = self.score();
        let current_question = self.current_item.as_ref().map(|item| QuestionView {
            number: match self.state {
                SessionState::Answered => self.history.len(),
                _ => self.history.len() + 1,
            },
            question: item.question().to_string(),
            options: item.options().to_vec(),
        });
        let last_answer = match self.state {
            SessionState::Answered => self.history.last().cloned(),
            _ => None,
        };

        SessionSnapshot {
            state: self.state,
            active: self.is_active(),
            busy: self.is_busy(),
            current_question,
            last_answer,
            history: self.history.clone(),
            asked_count: self.asked_questions.len(),
            score,
            score_percent: score.percent(),
            score_summary: score.to_string(),
            content: self.content.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Starts loading new content. Any previous quiz data is dropped.
    pub fn begin_load(&mut self) -> Result<RequestToken, SessionError> {
        self.ensure_not_busy()?;
        match self.state() {
            SessionState::Idle | SessionState::Stopped(_) => {}
            state => {
                return Err(SessionError::InvalidTransition {
                    operation: "load content",
                    state,
                });
            }
        }

        self.clear_quiz_data();
        self.last_error = None;
        let token = self.start_request(PendingKind::Load);
        self.set_state(SessionState::Loading);
        Ok(token)
    }

    pub fn content_fetched(
        &mut self,
        token: RequestToken,
        result: Result<FetchedContent, FetchError>,
    ) -> FetchOutcome {
        if !self.is_pending(token, PendingKind::Load) {
            tracing::debug!(request.token = token, "Discarding stale content fetch result");
            return FetchOutcome::Discarded;
        }

        match result {
            Ok(content) => {
                let source_text: Arc<str> = Arc::from(content.text.as_str());
                self.content = Some(content.info());
                self.source_text = Some(Arc::clone(&source_text));
                FetchOutcome::Ready(GenerationRequest {
                    token,
                    source_text,
                    asked_questions: self.asked_questions.clone(),
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "Content fetch failed");
                self.last_error = Some(SessionFailure::from(&err));
                self.pending = None;
                self.clear_quiz_data();
                self.set_state(SessionState::Idle);
                FetchOutcome::Failed
            }
        }
    }

    /// Asks for the question after the one just answered.
    pub fn begin_next(&mut self) -> Result<GenerationRequest, SessionError> {
        self.ensure_not_busy()?;
        let state = self.state();
        if state != SessionState::Answered {
            return Err(SessionError::InvalidTransition {
                operation: "request the next question",
                state,
            });
        }
        let Some(source_text) = self.source_text.clone() else {
            return Err(SessionError::InvalidTransition {
                operation: "request the next question",
                state,
            });
        };

        // The question on screen is only committed to `asked_questions` once
        // its successor arrives, but the model must already avoid it.
        let mut asked_questions = self.asked_questions.clone();
        if let Some(item) = &self.current_item
            && !item.is_exhausted()
            && !asked_questions.iter().any(|q| q == item.question())
        {
            asked_questions.push(item.question().to_string());
        }

        let token = self.start_request(PendingKind::Next);
        Ok(GenerationRequest {
            token,
            source_text,
            asked_questions,
        })
    }

    pub fn apply_generation(
        &mut self,
        token: RequestToken,
        result: Result<QuizItem, GenerationError>,
    ) -> GenerationOutcome {
        let Some(pending) = self.pending.filter(|p| p.token == token) else {
            tracing::debug!(request.token = token, "Discarding stale generation result");
            return GenerationOutcome::Discarded;
        };
        self.pending = None;

        match result {
            Ok(item) if item.is_exhausted() => {
                tracing::info!(
                    history.len = self.history.len(),
                    "Generator has no new questions, quiz ended"
                );
                if let Some(previous) = self.current_item.take() {
                    self.remember_asked(previous.question());
                }
                self.last_error = None;
                self.set_state(SessionState::Stopped(StopReason::Exhausted));
                GenerationOutcome::Exhausted
            }
            Ok(item) => {
                if pending.kind == PendingKind::Next
                    && let Some(previous) = self.current_item.take()
                {
                    self.remember_asked(previous.question());
                }
                self.current_item = Some(item);
                self.last_error = None;
                self.set_state(SessionState::Active);
                GenerationOutcome::Question
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    error.kind = ?err.kind(),
                    "Question generation failed"
                );
                self.last_error = Some(SessionFailure::from(&err));
                if pending.kind == PendingKind::Load {
                    self.clear_quiz_data();
                    self.set_state(SessionState::Idle);
                }
                GenerationOutcome::Failed
            }
        }
    }

    pub fn submit_answer(&mut self, option_index: usize) -> Result<AnswerOutcome, SessionError> {
        self.ensure_not_busy()?;
        let state = self.state();
        if !matches!(state, SessionState::Active | SessionState::Answered) {
            return Err(SessionError::InvalidTransition {
                operation: "submit an answer",
                state,
            });
        }
        let item = self
            .current_item
            .as_ref()
            .ok_or(SessionError::NoCurrentQuestion)?;
        if option_index >= item.options().len() {
            return Err(SessionError::OptionOutOfRange {
                index: option_index,
                len: item.options().len(),
            });
        }

        // Same tie-break as the quiz has always used: a submission whose
        // question text equals the last recorded one is not stored again.
        let already_recorded = self
            .history
            .last()
            .is_some_and(|last| last.question == item.question());

        let outcome = if already_recorded {
            AnswerOutcome {
                entry: self.history[self.history.len() - 1].clone(),
                recorded: false,
            }
        } else {
            let entry = HistoryEntry::record(item, option_index);
            tracing::debug!(
                answer.index = option_index,
                answer.correct = entry.is_correct,
                history.len = self.history.len() + 1,
                "Recorded answer"
            );
            self.history.push(entry.clone());
            AnswerOutcome {
                entry,
                recorded: true,
            }
        };

        self.set_state(SessionState::Answered);
        Ok(outcome)
    }

    pub fn stop(&mut self) -> Result<(), SessionError> {
        let state = self.state();
        if !matches!(state, SessionState::Active | SessionState::Answered) {
            return Err(SessionError::InvalidTransition {
                operation: "stop",
                state,
            });
        }
        self.cancel_pending();
        self.current_item = None;
        self.set_state(SessionState::Stopped(StopReason::UserStopped));
        Ok(())
    }

    pub fn reset(&mut self) {
        self.cancel_pending();
        self.clear_quiz_data();
        self.last_error = None;
        self.set_state(SessionState::Idle);
    }

    fn ensure_not_busy(&self) -> Result<(), SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    fn start_request(&mut self, kind: PendingKind) -> RequestToken {
        self.generation_token = self.generation_token.wrapping_add(1);
        self.pending = Some(PendingRequest {
            token: self.generation_token,
            kind,
        });
        self.generation_token
    }

    fn is_pending(&self, token: RequestToken, kind: PendingKind) -> bool {
        self.pending
            .is_some_and(|p| p.token == token && p.kind == kind)
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!(request.token = pending.token, "Invalidated in-flight request");
        }
        // Bump even with nothing pending so no earlier token can ever match again.
        self.generation_token = self.generation_token.wrapping_add(1);
    }

    fn remember_asked(&mut self, question: &str) {
        if !self.asked_questions.iter().any(|q| q == question) {
            self.asked_questions.push(question.to_string());
        }
    }

    fn clear_quiz_data(&mut self) {
        self.source_text = None;
        self.content = None;
        self.asked_questions.clear();
        self.history.clear();
        self.current_item = None;
    }

    fn set_state(&mut self, next: SessionState) {
        let previous = self.state;
        if previous != next {
            tracing::debug!(
                session.from = %previous,
                session.to = %next,
                "Quiz session transition"
            );
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::generator::ParseError;
    use crate::quiz::testing::{question, sentinel};

    fn content() -> FetchedContent {
        FetchedContent::new("https://example.com", "Some article text.", 100_000)
    }

    /// Drives a fresh session to `Active` with `first` on screen.
    fn active_session(first: QuizItem) -> QuizSession {
        let mut session = QuizSession::new();
        let token = session.begin_load().unwrap();
        let FetchOutcome::Ready(request) = session.content_fetched(token, Ok(content())) else {
            panic!("content should be accepted");
        };
        assert!(request.asked_questions.is_empty());
        assert_eq!(
            session.apply_generation(request.token, Ok(first)),
            GenerationOutcome::Question
        );
        session
    }

    fn parse_failure() -> GenerationError {
        GenerationError::Parse(ParseError {
            reason: "invalid JSON".to_string(),
            raw_output: "not json".to_string(),
        })
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = QuizSession::new();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_active());
        assert!(session.current_item().is_none());
        assert_eq!(session.score(), Score::NoAnswers);
    }

    #[test]
    fn test_score_without_answers_is_undefined() {
        let session = active_session(question("Q1", 0));
        let score = session.score();
        assert_eq!(score, Score::NoAnswers);
        assert_eq!(score.percent(), None);
        assert_eq!(score.to_string(), "no questions answered");
    }

    #[test]
    fn test_load_reaches_active_with_first_question() {
        let session = active_session(question("Q1", 2));
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.is_active());
        assert_eq!(session.current_item().unwrap().question(), "Q1");
        assert_eq!(session.source_text(), Some("Some article text."));
        assert!(!session.content().unwrap().truncated);
    }

    #[test]
    fn test_two_rounds_record_two_entries_in_order() {
        let mut session = active_session(question("Q1", 0));

        let first = session.submit_answer(0).unwrap();
        assert!(first.recorded);
        assert!(first.entry.is_correct);
        assert_eq!(session.state(), SessionState::Answered);

        let request = session.begin_next().unwrap();
        assert_eq!(request.asked_questions, vec!["Q1".to_string()]);
        assert_eq!(
            session.apply_generation(request.token, Ok(question("Q2", 3))),
            GenerationOutcome::Question
        );
        assert_eq!(session.asked_questions(), &["Q1".to_string()]);

        let second = session.submit_answer(1).unwrap();
        assert!(!second.entry.is_correct);

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "Q1");
        assert_eq!(history[0].user_answer_text, "Q1 A");
        assert_eq!(history[1].question, "Q2");
        assert_eq!(history[1].user_answer_text, "Q2 B");
        assert_eq!(history[1].correct_answer_text, "Q2 D");
        assert_eq!(session.score(), Score::Ratio { correct: 1, total: 2 });
    }

    #[test]
    fn test_resubmitting_same_question_does_not_duplicate() {
        let mut session = active_session(question("Q1", 1));

        let first = session.submit_answer(1).unwrap();
        let second = session.submit_answer(2).unwrap();

        assert!(first.recorded);
        assert!(!second.recorded);
        assert_eq!(second.entry, first.entry);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.state(), SessionState::Answered);
    }

    #[test]
    fn test_consecutive_question_with_same_text_is_not_recorded_twice() {
        let mut session = active_session(question("Same?", 0));
        session.submit_answer(0).unwrap();

        let request = session.begin_next().unwrap();
        session.apply_generation(request.token, Ok(question("Same?", 1)));
        let outcome = session.submit_answer(1).unwrap();

        assert!(!outcome.recorded);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_answer_validation() {
        let mut session = QuizSession::new();
        assert_eq!(
            session.submit_answer(0),
            Err(SessionError::InvalidTransition {
                operation: "submit an answer",
                state: SessionState::Idle,
            })
        );

        let mut session_active = active_session(question("Q1", 0));
        assert_eq!(
            session_active.submit_answer(4),
            Err(SessionError::OptionOutOfRange { index: 4, len: 4 })
        );
        assert!(session_active.history().is_empty());
        assert_eq!(session_active.state(), SessionState::Active);
    }

    #[test]
    fn test_next_requires_answered_state() {
        let mut session = active_session(question("Q1", 0));
        assert!(matches!(
            session.begin_next(),
            Err(SessionError::InvalidTransition {
                state: SessionState::Active,
                ..
            })
        ));
    }

    #[test]
    fn test_sentinel_after_answer_stops_session() {
        let mut session = active_session(question("Q1", 0));
        session.submit_answer(0).unwrap();

        let request = session.begin_next().unwrap();
        assert_eq!(
            session.apply_generation(request.token, Ok(sentinel())),
            GenerationOutcome::Exhausted
        );
        assert_eq!(
            session.state(),
            SessionState::Stopped(StopReason::Exhausted)
        );
        assert!(session.last_error().is_none());
        assert_eq!(session.history().len(), 1);
        assert!(session.current_item().is_none());
        assert_eq!(session.asked_questions(), &["Q1".to_string()]);
        assert_eq!(session.snapshot().asked_count, 1);
    }

    #[test]
    fn test_sentinel_while_loading_stops_session() {
        let mut session = QuizSession::new();
        let token = session.begin_load().unwrap();
        let FetchOutcome::Ready(request) = session.content_fetched(token, Ok(content())) else {
            panic!("content should be accepted");
        };
        assert_eq!(
            session.apply_generation(request.token, Ok(sentinel())),
            GenerationOutcome::Exhausted
        );
        assert_eq!(
            session.state(),
            SessionState::Stopped(StopReason::Exhausted)
        );
        assert!(session.current_item().is_none());
        assert_eq!(session.score(), Score::NoAnswers);
    }

    #[test]
    fn test_source_with_two_questions_ends_after_third_request() {
        let mut session = active_session(question("Q1", 0));
        session.submit_answer(0).unwrap();

        let request = session.begin_next().unwrap();
        session.apply_generation(request.token, Ok(question("Q2", 0)));
        session.submit_answer(3).unwrap();

        let request = session.begin_next().unwrap();
        assert_eq!(
            request.asked_questions,
            vec!["Q1".to_string(), "Q2".to_string()]
        );
        session.apply_generation(request.token, Ok(sentinel()));

        assert_eq!(
            session.state(),
            SessionState::Stopped(StopReason::Exhausted)
        );
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.snapshot().asked_count, 2);
        let score = session.score();
        assert_eq!(score, Score::Ratio { correct: 1, total: 2 });
        assert_eq!(score.percent(), Some(50.0));
        assert_eq!(score.to_string(), "1/2 (50.0%)");
    }

    #[test]
    fn test_parse_error_on_next_stays_answered() {
        let mut session = active_session(question("Q1", 0));
        session.submit_answer(2).unwrap();
        let before = session.history().to_vec();

        let request = session.begin_next().unwrap();
        assert_eq!(
            session.apply_generation(request.token, Err(parse_failure())),
            GenerationOutcome::Failed
        );

        assert_eq!(session.state(), SessionState::Answered);
        assert_eq!(session.history(), before.as_slice());
        assert_eq!(session.current_item().unwrap().question(), "Q1");
        let failure = session.last_error().unwrap();
        assert_eq!(failure.kind, ErrorKind::Parse);
        assert_eq!(failure.raw_output.as_deref(), Some("not json"));

        // The caller may retry.
        assert!(session.begin_next().is_ok());
    }

    #[test]
    fn test_unreachable_content_returns_to_idle() {
        let mut session = QuizSession::new();
        let token = session.begin_load().unwrap();
        let outcome = session.content_fetched(
            token,
            Err(FetchError::Status {
                url: "https://example.com".to_string(),
                status: 404,
            }),
        );

        assert_eq!(outcome, FetchOutcome::Failed);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.current_item().is_none());
        assert!(!session.is_busy());
        assert_eq!(session.last_error().unwrap().kind, ErrorKind::Fetch);
    }

    #[test]
    fn test_generation_failure_while_loading_returns_to_idle() {
        let mut session = QuizSession::new();
        let token = session.begin_load().unwrap();
        let FetchOutcome::Ready(request) = session.content_fetched(token, Ok(content())) else {
            panic!("content should be accepted");
        };
        session.apply_generation(
            request.token,
            Err(GenerationError::Timeout(std::time::Duration::from_secs(30))),
        );

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.source_text().is_none());
        assert_eq!(session.last_error().unwrap().kind, ErrorKind::Generation);
    }

    #[test]
    fn test_requests_are_not_interleaved() {
        let mut session = active_session(question("Q1", 0));
        session.submit_answer(0).unwrap();
        session.begin_next().unwrap();

        assert_eq!(session.begin_next(), Err(SessionError::Busy));
        assert_eq!(session.submit_answer(0), Err(SessionError::Busy));
        assert_eq!(session.begin_load(), Err(SessionError::Busy));
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_reset_discards_in_flight_result() {
        let mut session = active_session(question("Q1", 0));
        session.submit_answer(0).unwrap();
        let request = session.begin_next().unwrap();

        session.reset();
        assert_eq!(
            session.apply_generation(request.token, Ok(question("Q2", 0))),
            GenerationOutcome::Discarded
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.current_item().is_none());
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_stop_discards_in_flight_result_and_keeps_history() {
        let mut session = active_session(question("Q1", 0));
        session.submit_answer(0).unwrap();
        let request = session.begin_next().unwrap();

        session.stop().unwrap();
        assert_eq!(
            session.apply_generation(request.token, Ok(question("Q2", 0))),
            GenerationOutcome::Discarded
        );
        assert_eq!(
            session.state(),
            SessionState::Stopped(StopReason::UserStopped)
        );
        assert_eq!(session.history().len(), 1);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_stop_is_only_valid_while_quizzing() {
        let mut session = QuizSession::new();
        assert!(session.stop().is_err());

        let mut session = active_session(question("Q1", 0));
        session.stop().unwrap();
        assert!(session.stop().is_err());
        assert_eq!(session.score(), Score::NoAnswers);
    }

    #[test]
    fn test_reset_from_every_state() {
        let mut idle = QuizSession::new();
        idle.reset();

        let mut loading = QuizSession::new();
        loading.begin_load().unwrap();

        let active = active_session(question("Q1", 0));

        let mut answered = active_session(question("Q1", 0));
        answered.submit_answer(0).unwrap();

        let mut stopped = active_session(question("Q1", 0));
        stopped.submit_answer(1).unwrap();
        stopped.stop().unwrap();

        for mut session in [idle, loading, active, answered, stopped] {
            session.reset();
            assert_eq!(session.state(), SessionState::Idle);
            assert!(session.history().is_empty());
            assert!(session.asked_questions().is_empty());
            assert!(session.current_item().is_none());
            assert!(session.source_text().is_none());
            assert!(!session.is_busy());
        }
    }

    #[test]
    fn test_reload_after_stop_starts_fresh() {
        let mut session = active_session(question("Q1", 0));
        session.submit_answer(0).unwrap();
        session.stop().unwrap();

        let token = session.begin_load().unwrap();
        assert!(session.history().is_empty());
        assert_eq!(session.state(), SessionState::Loading);
        assert!(matches!(
            session.content_fetched(token, Ok(content())),
            FetchOutcome::Ready(_)
        ));
    }

    #[test]
    fn test_snapshot_hides_the_answer() {
        let mut session = active_session(question("Q1", 2));
        let snapshot = session.snapshot();
        let view = snapshot.current_question.unwrap();
        assert_eq!(view.number, 1);
        assert_eq!(view.options.len(), 4);
        assert!(snapshot.last_answer.is_none());
        assert_eq!(snapshot.score_summary, "no questions answered");

        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert!(json["current_question"].get("answer").is_none());

        session.submit_answer(2).unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.current_question.unwrap().number, 1);
        assert!(snapshot.last_answer.unwrap().is_correct);
        assert_eq!(snapshot.score_percent, Some(100.0));
    }

    #[test]
    fn test_stale_fetch_result_is_discarded() {
        let mut session = QuizSession::new();
        let token = session.begin_load().unwrap();
        session.reset();
        assert_eq!(
            session.content_fetched(token, Ok(content())),
            FetchOutcome::Discarded
        );
        assert!(session.source_text().is_none());
    }
}
