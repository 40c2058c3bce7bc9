pub mod classify;
pub mod context;

pub use classify::QuestionClassifier;
pub use context::{AssembledContext, ContextAssembler};
