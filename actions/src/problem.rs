//! Problem details rendered for failed requests.
//!
//! Every error an action can produce is a [`Problem`]. Problems are carried
//! in the request context's error slot and rendered as
//! `application/problem+json` (or as an in-band stream error once a stream
//! has started).

use serde::Serialize;

/// Media type used for rendered problems.
pub const MIME_PROBLEM: &str = "application/problem+json";

/// Classification of a problem. Each kind maps to one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    /// A request parameter is malformed or out of range.
    BadRequest,
    /// The referenced resource does not exist.
    NotFound,
    /// The requested position is older than the retained history.
    BeforeHistory,
    /// The history backing the request is too far behind to serve it.
    StaleHistory,
    /// A collaborator failed while serving the request.
    ServerError,
    /// No representation acceptable to the client is supported by the action.
    NotAcceptable,
}

impl ProblemKind {
    pub fn status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::NotAcceptable => 406,
            Self::BeforeHistory => 410,
            Self::ServerError => 500,
            Self::StaleHistory => 503,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Resource Missing",
            Self::BeforeHistory => "Data Requested Is Before Recorded History",
            Self::StaleHistory => "Historical DB Is Too Stale",
            Self::ServerError => "Internal Server Error",
            Self::NotAcceptable => "An acceptable response content-type could not be provided",
        }
    }
}

/// Extra fields attached to validation problems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemExtras {
    pub invalid_field: String,
    pub reason: String,
}

/// A renderable request failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{title}: {detail}")]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: ProblemKind,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<ProblemExtras>,
}

impl Problem {
    pub fn new(kind: ProblemKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            status: kind.status(),
            detail: detail.into(),
            extras: None,
        }
    }

    /// A validation failure for a single request parameter.
    pub fn bad_request(field: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut problem = Self::new(
            ProblemKind::BadRequest,
            format!("The request has an invalid parameter `{field}`."),
        );
        problem.extras = Some(ProblemExtras {
            invalid_field: field.to_string(),
            reason,
        });
        problem
    }

    pub fn not_found() -> Self {
        Self::new(
            ProblemKind::NotFound,
            "The resource at the url requested was not found.",
        )
    }

    pub fn before_history() -> Self {
        Self::new(
            ProblemKind::BeforeHistory,
            "The data requested is older than the oldest ledger retained in history.",
        )
    }

    pub fn stale_history() -> Self {
        Self::new(
            ProblemKind::StaleHistory,
            "The history backing this server has fallen behind and cannot serve this request.",
        )
    }

    pub fn server_error(detail: impl Into<String>) -> Self {
        Self::new(ProblemKind::ServerError, detail)
    }

    pub fn not_acceptable() -> Self {
        Self::new(
            ProblemKind::NotAcceptable,
            "None of the media types in the Accept header are supported by this resource.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(Problem::bad_request("limit", "too big").status, 400);
        assert_eq!(Problem::not_found().status, 404);
        assert_eq!(Problem::not_acceptable().status, 406);
        assert_eq!(Problem::before_history().status, 410);
        assert_eq!(Problem::server_error("boom").status, 500);
        assert_eq!(Problem::stale_history().status, 503);
    }

    #[test]
    fn serializes_type_slug_and_extras() {
        let json = serde_json::to_value(Problem::bad_request("order", "must be asc or desc"))
            .expect("serialize");
        assert_eq!(json["type"], "bad_request");
        assert_eq!(json["status"], 400);
        assert_eq!(json["extras"]["invalid_field"], "order");
        assert_eq!(json["extras"]["reason"], "must be asc or desc");
    }

    #[test]
    fn type_field_is_the_snake_case_kind() {
        for (problem, kind) in [
            (Problem::before_history(), "before_history"),
            (Problem::stale_history(), "stale_history"),
            (Problem::not_acceptable(), "not_acceptable"),
            (Problem::server_error("boom"), "server_error"),
        ] {
            let json = serde_json::to_value(&problem).expect("serialize");
            assert_eq!(json["type"], kind);
        }
    }

    #[test]
    fn omits_missing_extras() {
        let json = serde_json::to_value(Problem::not_found()).expect("serialize");
        assert!(json.get("extras").is_none());
    }
}
