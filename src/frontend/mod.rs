//! Source frontend: lexer, parser, constant evaluator, extraction.
//!
//! Turns module-script source text into the restricted module
//! description the rest of the pipeline consumes. Parse failures are
//! fatal and carry a source position; everything extraction can
//! recover from becomes a [`Warning`].

pub mod ast;
pub mod eval;
pub mod extract;
pub mod lexer;
pub mod parser;

use thiserror::Error;

pub use ast::{SourceFile, Span};
pub use eval::{eval_const, Const};
pub use extract::{extract, ApiCall, CommandDef, Extraction, FunctionDef, ModuleInfo};
pub use parser::parse_source;

/// Syntactic failure in the input, with a 1-based source position.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{line}:{col}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

/// A non-fatal diagnostic. Warnings never abort compilation.
#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
    pub span: Option<Span>,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.span {
            Some(span) => write!(f, "{span}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
