//! The analysis engine: parses Python source text and either infers a
//! type-stub description or checks the source against a reference stub.
//!
//! The engine is deliberately modest: it reads top-level constructs
//! (functions, classes with one body level of methods and attributes,
//! annotated or literal assignments) from logical source lines, and types
//! them from annotations, literal defaults, and (under deep analysis)
//! literal `return` expressions. It never executes or imports anything.
//!
//! Parse failures are data, not panics: [`EngineError::Compile`] carries
//! the offending line so callers can turn it into a diagnostic.

mod check;
mod infer;
mod parse;
mod unknowns;

pub use check::{check, load_reference, CheckFlags};
pub use infer::{infer, InferFlags};

/// Class nesting beyond this depth aborts analysis.
pub const MAX_CLASS_NESTING: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The source does not parse. Expected and common; callers convert
    /// this into a single diagnostic instead of failing the file.
    #[error("{message} (line {line})")]
    Compile { line: u32, message: String },

    /// Anything else that goes wrong inside the engine.
    #[error("analysis failed: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn compile(line: u32, message: impl Into<String>) -> Self {
        EngineError::Compile {
            line,
            message: message.into(),
        }
    }
}
