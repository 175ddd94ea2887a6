use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CommonError {
    #[error("Unable to load parameter file: {path}")]
    TomlReadError { path: String },

    #[error("Unable to parse toml: {msg}")]
    TomlParseError { msg: String },

    #[error("Line {line}: {msg}")]
    TextParseError { line: usize, msg: String },

    #[error("Invalid pattern: {0}")]
    PatternError(String),

    #[error("Invalid parameter `{name}`: {msg}")]
    InvalidParameter { name: &'static str, msg: String },
}

impl CommonError {
    pub(crate) fn invalid(name: &'static str, msg: impl Into<String>) -> Self {
        CommonError::InvalidParameter {
            name,
            msg: msg.into(),
        }
    }
}
