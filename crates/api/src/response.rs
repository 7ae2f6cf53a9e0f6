//! API response envelope.
//!
//! Successful responses look like `{ "success": true, "message"?: ..., <payload fields> }`.
//! Errors use the same `success` flag; see `AppError`'s `IntoResponse`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Standard API response wrapper. The payload's fields are flattened into
/// the envelope, so it must serialize as a map.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    message: Option<String>,
    payload: T,
}

/// Payload for responses that only carry a message.
#[derive(Debug, Serialize)]
pub struct Empty {}

#[derive(Serialize)]
struct Envelope<'a, T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(flatten)]
    payload: &'a T,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 with a payload.
    pub const fn ok(payload: T) -> Self {
        Self {
            status: StatusCode::OK,
            message: None,
            payload,
        }
    }

    /// 201 with a payload.
    pub const fn created(payload: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            message: None,
            payload,
        }
    }

    /// Attach a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<Empty> {
    /// 200 carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::ok(Empty {}).with_message(message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            success: true,
            message: self.message.as_deref(),
            payload: &self.payload,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Payload {
        unread_count: u64,
    }

    fn render<T: Serialize>(response: &ApiResponse<T>) -> serde_json::Value {
        serde_json::to_value(Envelope {
            success: true,
            message: response.message.as_deref(),
            payload: &response.payload,
        })
        .unwrap()
    }

    #[test]
    fn test_payload_is_flattened() {
        let response = ApiResponse::ok(Payload { unread_count: 3 });
        assert_eq!(render(&response), json!({"success": true, "unreadCount": 3}));
    }

    #[test]
    fn test_message_only() {
        let response = ApiResponse::message("Done");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(render(&response), json!({"success": true, "message": "Done"}));
    }

    #[test]
    fn test_created_status() {
        let response = ApiResponse::created(Payload { unread_count: 0 }).with_message("Created");
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(render(&response)["message"], "Created");
    }
}
