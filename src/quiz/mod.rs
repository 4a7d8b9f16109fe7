pub mod gemini;
pub mod generator;
pub mod item;
pub mod session;

#[cfg(test)]
pub mod testing;

pub use gemini::GeminiGenerator;
pub use generator::{GenerationError, QuestionGenerator};
pub use item::QuizItem;
pub use session::{AnswerOutcome, SessionError, SessionSnapshot};
