use thiserror::Error;

/// Errors raised while building, parsing, validating or applying a clause.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    /// A required argument is absent or structurally invalid.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// The clause text does not conform to the grammar.
    #[error("syntax error at position {position}: {message}")]
    ClauseSyntax { position: usize, message: String },

    /// A service scope is present but lacks a required registration.
    #[error("no service of type `{type_name}` is registered in the scope")]
    MissingRegistration { type_name: &'static str },

    /// The clause uses something the default query settings disallow.
    #[error("validation error: {0}")]
    Validation(String),

    /// An aggregation method that is not registered.
    #[error("unknown aggregation method `{0}`")]
    UnknownFunction(String),

    /// Failure while executing a composed query.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

impl ApplyError {
    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        ApplyError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ApplyError::ClauseSyntax {
            position,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApplyError>;
