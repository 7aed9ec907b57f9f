use anyhow::Error as AnyError;
use hyper::{header, header::HeaderValue, Body, Error as HttpError, Response, StatusCode};
use serde_json::{json, Error as JsonError, Value as JsonValue};
use thiserror::Error;

use super::CONTENT_JSON;
use crate::engine::RequestError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("error in http stream")]
    Http(#[from] HttpError),
    #[error("invalid json")]
    Json(#[from] JsonError),
    #[error("invalid http method, expected POST")]
    InvalidMethod,
    #[error("not found")]
    NotFound,
    #[error("invalid content type, expecting \"application/json\"")]
    InvalidContentType,
    #[error("no configured settings for chain {0}")]
    UnknownChainId(u64),
    #[error("the 0x-chain-id header is required when serving multiple chains")]
    MissingChainId,
    #[error("request refused")]
    Request(#[from] RequestError),
}

impl Error {
    /// Create the `{code, reason, validationErrors}` error response
    pub fn into_response(self) -> Response<Body> {
        let (code, status_code) = match &self {
            Self::InvalidMethod => (405, StatusCode::METHOD_NOT_ALLOWED),
            Self::NotFound => (404, StatusCode::NOT_FOUND),
            Self::Json(_) => (101, StatusCode::BAD_REQUEST),
            Self::Request(error) if !error.is_client_error() => {
                (500, StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Request(_) => (100, StatusCode::BAD_REQUEST),
            _ => (400, StatusCode::BAD_REQUEST),
        };
        let validation = if let Self::Request(error) = &self {
            if error.is_client_error() {
                json!([{
                    "code": error.error_code(),
                    "reason": format!("{}", error),
                    "field": error.field(),
                }])
            } else {
                json!([])
            }
        } else {
            json!([])
        };
        let reason = format!("{:?}", AnyError::from(self));
        let json = json!({
            "code": code,
            "reason": reason,
            "validationErrors": validation
        });
        let json_str = serde_json::to_string_pretty(&json).unwrap_or_default();
        let mut response = Response::new(Body::from(json_str));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_JSON));
        *response.status_mut() = status_code;
        response
    }
}

/// 200 response with a JSON body.
pub fn json_response(value: &JsonValue) -> Response<Body> {
    let json_str = serde_json::to_string_pretty(value).unwrap_or_default();
    let mut response = Response::new(Body::from(json_str));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_JSON));
    *response.status_mut() = StatusCode::OK;
    response
}
