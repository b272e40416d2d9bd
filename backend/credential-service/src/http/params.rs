/// Flat request parameters merged from query string and body
use crate::services::Envelope;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Query, Request},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Query parameters first, then body fields (body wins on conflict)
#[derive(Debug, Default, Clone)]
pub struct RequestParams {
    values: HashMap<String, String>,
    bearer: Option<String>,
}

impl RequestParams {
    pub fn new(values: HashMap<String, String>, bearer: Option<String>) -> Self {
        Self { values, bearer }
    }

    /// Value for `key`, or "" when absent
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn get_opt(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// 400 naming every missing or empty parameter
    pub fn require(&self, keys: &[&str]) -> Result<(), Response> {
        let missing: Vec<String> = keys
            .iter()
            .filter(|key| self.get(key).trim().is_empty())
            .map(|key| format!("\"{}\"", key))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        Err(bad_request(format!(
            "POST parameters required: {}",
            missing.join(", ")
        )))
    }
}

fn bad_request(msg: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(Envelope::failed(msg))).into_response()
}

/// `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[async_trait]
impl<S> FromRequest<S> for RequestParams
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bearer = bearer_token(req.headers());

        let mut values: HashMap<String, String> = Query::try_from_uri(req.uri())
            .map(|Query(q)| q)
            .unwrap_or_default();

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let body = Bytes::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            if !body.is_empty() {
                let fields: Map<String, Value> = serde_json::from_slice(&body)
                    .map_err(|_| bad_request("Invalid JSON body".to_string()))?;
                for (key, value) in fields {
                    if let Some(value) = scalar_to_string(value) {
                        values.insert(key, value);
                    }
                }
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|_| bad_request("Invalid form body".to_string()))?;
            values.extend(fields);
        }

        Ok(Self { values, bearer })
    }
}
