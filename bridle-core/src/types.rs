use serde::{Deserialize, Serialize};

use crate::error::{BridleError, Result};

pub type TokenId = u32;
pub type StateId = u32;

/// Kind of structured output a request asks for, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Json,
    JsonObject,
    Regex,
    Choice,
    Grammar,
}

/// A grammar the decoded output must conform to.
#[derive(Debug, Clone, PartialEq)]
pub enum GrammarSpec {
    Regex(String),
    JsonSchema {
        schema: serde_json::Value,
        /// Regex fragment allowed between JSON tokens. `None` uses the
        /// translator's default.
        whitespace: Option<String>,
    },
    Choice(Vec<String>),
    /// Context-free grammar text. Rejected by this backend.
    Grammar(String),
}

impl GrammarSpec {
    /// Build a grammar spec from the `(type, text)` pair a request carries.
    ///
    /// JSON schema text must parse as JSON; choice text must be a JSON array.
    /// Non-string choices are rendered with their JSON representation.
    pub fn from_request(request_type: RequestType, text: &str) -> Result<Self> {
        match request_type {
            RequestType::Json => {
                let schema: serde_json::Value = serde_json::from_str(text).map_err(|e| {
                    BridleError::GrammarSpecification(format!(
                        "invalid JSON grammar specification: {e}"
                    ))
                })?;
                Ok(GrammarSpec::JsonSchema {
                    schema,
                    whitespace: None,
                })
            }
            RequestType::JsonObject => Ok(GrammarSpec::JsonSchema {
                schema: serde_json::json!({ "type": "object" }),
                whitespace: None,
            }),
            RequestType::Regex => Ok(GrammarSpec::Regex(text.to_string())),
            RequestType::Choice => {
                let values: Vec<serde_json::Value> = serde_json::from_str(text).map_err(|e| {
                    BridleError::GrammarSpecification(format!(
                        "choice specification must be a JSON array: {e}"
                    ))
                })?;
                let choices = values
                    .into_iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect();
                Ok(GrammarSpec::Choice(choices))
            }
            RequestType::Grammar => Ok(GrammarSpec::Grammar(text.to_string())),
        }
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            GrammarSpec::Regex(_) => RequestType::Regex,
            GrammarSpec::JsonSchema { .. } => RequestType::Json,
            GrammarSpec::Choice(_) => RequestType::Choice,
            GrammarSpec::Grammar(_) => RequestType::Grammar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_request_json() {
        let spec = GrammarSpec::from_request(RequestType::Json, r#"{"type": "integer"}"#).unwrap();
        match spec {
            GrammarSpec::JsonSchema { schema, whitespace } => {
                assert_eq!(schema["type"], "integer");
                assert!(whitespace.is_none());
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_from_request_bad_json() {
        let err = GrammarSpec::from_request(RequestType::Json, "{not json").unwrap_err();
        assert!(matches!(err, BridleError::GrammarSpecification(_)));
    }

    #[test]
    fn test_from_request_choice_mixed() {
        let spec = GrammarSpec::from_request(RequestType::Choice, r#"["a", 1, true]"#).unwrap();
        assert_eq!(
            spec,
            GrammarSpec::Choice(vec!["a".into(), "1".into(), "true".into()])
        );
    }

    #[test]
    fn test_request_type_round_trip() {
        let spec = GrammarSpec::from_request(RequestType::Grammar, "root ::= \"a\"").unwrap();
        assert_eq!(spec.request_type(), RequestType::Grammar);
    }
}
