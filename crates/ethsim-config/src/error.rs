use std::path::PathBuf;

use thiserror::Error;

use crate::ParamKind;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors produced while loading a simulator configuration file.
///
/// Every variant that comes from the text itself carries the 1-based line number it was found on.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: unterminated comment")]
    UnterminatedComment { line: usize },

    #[error("section `{name}` opened on line {line} is missing `end`")]
    UnterminatedSection { name: String, line: usize },

    #[error("line {line}: unknown parameter `{name}` in section `{section}`")]
    UnknownParam {
        line: usize,
        section: &'static str,
        name: String,
    },

    #[error("line {line}: parameter `{name}` expects {expected}")]
    WrongKind {
        line: usize,
        name: String,
        expected: ParamKind,
    },

    #[error("line {line}: invalid value for `{name}`: {reason}")]
    InvalidValue {
        line: usize,
        name: String,
        reason: String,
    },
}
