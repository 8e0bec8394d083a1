use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use validator::Validate;

use crate::error::GatewayError;

pub const MAX_QUERY_CHARS: u64 = 1500;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static ANGLE_BRACKETS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[<>]").unwrap());

#[derive(Debug, Validate)]
struct QueryInput<'a> {
    #[validate(length(max = MAX_QUERY_CHARS))]
    query: &'a str,
}

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Checks the raw `query` member of an `/ask` body and returns the
    /// sanitised query.
    pub fn validate_query(raw: Option<&Value>) -> Result<String, GatewayError> {
        let query = match raw {
            None | Some(Value::Null) => {
                return Err(GatewayError::InvalidInput("Query is required".to_string()))
            }
            Some(Value::String(query)) => query.as_str(),
            Some(_) => {
                return Err(GatewayError::InvalidInput(
                    "Query must be a string".to_string(),
                ))
            }
        };

        if query.trim().is_empty() {
            return Err(GatewayError::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }

        QueryInput { query }.validate().map_err(|_| {
            GatewayError::InvalidInput(format!(
                "Query exceeds maximum length of {} characters",
                MAX_QUERY_CHARS
            ))
        })?;

        // Brackets alone sanitise to nothing.
        let query = Self::sanitize(query);
        if query.is_empty() {
            return Err(GatewayError::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }

        Ok(query)
    }

    /// Strip angle brackets, collapse whitespace runs, then trim
    pub fn sanitize(query: &str) -> String {
        let stripped = ANGLE_BRACKETS.replace_all(query, "");
        WHITESPACE.replace_all(&stripped, " ").trim().to_string()
    }
}
