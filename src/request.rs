//! Inbound chat request model and validation
//!
//! Validation reports every offending field at once, each with its location,
//! a message and a machine-readable constraint type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptObject {
    pub content: String,
    pub id: String,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: PromptObject,
    pub thread_id: String,
    pub response_id: String,
}

/// One violated constraint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    fn missing(loc: &[&str]) -> Self {
        Self::new(loc, "Field required", "missing")
    }

    fn not_string(loc: &[&str]) -> Self {
        Self::new(loc, "Input should be a valid string", "string_type")
    }

    fn not_object(loc: &[&str]) -> Self {
        Self::new(loc, "Input should be a valid dictionary", "dict_type")
    }

    fn new(loc: &[&str], msg: &str, kind: &str) -> Self {
        let mut path = vec!["body".to_string()];
        path.extend(loc.iter().map(|s| s.to_string()));
        Self {
            loc: path,
            msg: msg.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// Why a request body was refused.
#[derive(Debug, PartialEq)]
pub enum RequestRejection {
    /// Body is not JSON at all (400).
    MalformedJson(String),
    /// JSON that does not match the request shape (422).
    Validation(Vec<FieldError>),
}

impl IntoResponse for RequestRejection {
    fn into_response(self) -> Response {
        match self {
            RequestRejection::MalformedJson(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": format!("JSON decode error: {reason}")})),
            )
                .into_response(),
            RequestRejection::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": errors})),
            )
                .into_response(),
        }
    }
}

fn string_field(
    object: &Map<String, Value>,
    key: &str,
    loc: &[&str],
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match object.get(key) {
        None => {
            errors.push(FieldError::missing(loc));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::not_string(loc));
            None
        }
    }
}

impl ChatRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, RequestRejection> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| RequestRejection::MalformedJson(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, RequestRejection> {
        let Some(root) = value.as_object() else {
            return Err(RequestRejection::Validation(vec![FieldError::not_object(&[])]));
        };

        let mut errors = Vec::new();

        let prompt = match root.get("prompt") {
            None => {
                errors.push(FieldError::missing(&["prompt"]));
                None
            }
            Some(Value::Object(prompt)) => {
                let content = string_field(prompt, "content", &["prompt", "content"], &mut errors);
                let id = string_field(prompt, "id", &["prompt", "id"], &mut errors);
                let role = string_field(prompt, "role", &["prompt", "role"], &mut errors);
                match (content, id, role) {
                    (Some(content), Some(id), Some(role)) => Some(PromptObject { content, id, role }),
                    _ => None,
                }
            }
            Some(_) => {
                errors.push(FieldError::not_object(&["prompt"]));
                None
            }
        };
        let thread_id = string_field(root, "threadId", &["threadId"], &mut errors);
        let response_id = string_field(root, "responseId", &["responseId"], &mut errors);

        match (prompt, thread_id, response_id) {
            (Some(prompt), Some(thread_id), Some(response_id)) if errors.is_empty() => Ok(Self {
                prompt,
                thread_id,
                response_id,
            }),
            _ => Err(RequestRejection::Validation(errors)),
        }
    }
}
