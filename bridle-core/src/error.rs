use thiserror::Error;

use crate::types::TokenId;

/// Regex constructs the automaton engine cannot execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedFeature {
    Backreference,
    LookAround,
    WordBoundary,
}

impl std::fmt::Display for UnsupportedFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UnsupportedFeature::Backreference => "backreferences are unsupported",
            UnsupportedFeature::LookAround => "look-around assertions are unsupported",
            UnsupportedFeature::WordBoundary => "word boundary assertions are unsupported",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificationError {
    #[error("{feature}: `{construct}`")]
    UnsupportedFeature {
        feature: UnsupportedFeature,
        construct: String,
    },

    #[error("anchored universal start state doesn't exist for this regex: `{construct}` precedes any consumed character")]
    AnchoredPattern { construct: String },

    #[error("invalid regex syntax: {0}")]
    InvalidSyntax(String),
}

#[derive(Error, Debug)]
pub enum BridleError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Grammar specification error: {0}")]
    GrammarSpecification(String),

    #[error("Regex certification failed: {0}")]
    Certification(#[from] CertificationError),

    #[error("Automaton compilation error: {0}")]
    Compile(String),

    #[error("Cannot roll back {requested} tokens, only {available} retained")]
    RollbackExceeded { requested: usize, available: usize },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token {token_id} rejected by grammar after {consumed} accepted tokens")]
    TokenRejected { token_id: TokenId, consumed: usize },
}

pub type Result<T> = std::result::Result<T, BridleError>;
