//! REST operation results: a status code, a short detail message and,
//! for POST, the created id.

use arbor_core::ObjectId;
use http::StatusCode;

/// Outcome of a REST verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResult {
    status: StatusCode,
    detail: String,
    created_id: Option<ObjectId>,
}

impl RestResult {
    /// 200 OK.
    #[must_use]
    pub fn ok() -> Self {
        Self::from_status(StatusCode::OK)
    }

    /// 201 Created, carrying the new element's id.
    #[must_use]
    pub fn created(id: ObjectId) -> Self {
        Self {
            status: StatusCode::CREATED,
            detail: String::new(),
            created_id: Some(id),
        }
    }

    /// Result with `status` and no detail.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status,
            detail: String::new(),
            created_id: None,
        }
    }

    /// Result with `status` and a human-readable detail message.
    #[must_use]
    pub fn with_detail(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            created_id: None,
        }
    }

    /// 400 Bad Request with a message.
    #[must_use]
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::with_detail(StatusCode::BAD_REQUEST, detail)
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden() -> Self {
        Self::from_status(StatusCode::FORBIDDEN)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found() -> Self {
        Self::from_status(StatusCode::NOT_FOUND)
    }

    /// 405 Method Not Allowed, with a message.
    #[must_use]
    pub fn method_not_allowed(detail: impl Into<String>) -> Self {
        Self::with_detail(StatusCode::METHOD_NOT_ALLOWED, detail)
    }

    /// 500 Internal Server Error with a message.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::with_detail(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }

    /// The status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// True for 2xx statuses.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Detail message; empty on success.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Id of the element created by a POST.
    #[must_use]
    pub fn created_id(&self) -> Option<ObjectId> {
        self.created_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_2xx() {
        assert!(RestResult::ok().is_ok());
        assert!(RestResult::created(9).is_ok());
        assert!(!RestResult::not_found().is_ok());
        assert!(!RestResult::internal("x").is_ok());
    }

    #[test]
    fn created_carries_the_id() {
        let result = RestResult::created(42);
        assert_eq!(result.status(), StatusCode::CREATED);
        assert_eq!(result.created_id(), Some(42));
        assert_eq!(RestResult::ok().created_id(), None);
    }

    #[test]
    fn detail_is_kept() {
        let result = RestResult::bad_request("expected numeric value");
        assert_eq!(result.status(), StatusCode::BAD_REQUEST);
        assert_eq!(result.detail(), "expected numeric value");
    }
}
