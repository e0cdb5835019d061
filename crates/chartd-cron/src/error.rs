//! Failure taxonomy shared by the job and task services.
//!
//! Callers receive one of four shapes: validation (422, with every violation
//! reported together), not-found (404), scheduling failure (400, the cron
//! expression could not be registered), or storage failure (500, with the
//! driver detail kept out of the user-visible rendering).

use serde::Serialize;

use chartd_store::StoreError;

/// A single validation violation. Requests with several problems carry one
/// entry per problem, never just the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub resource: &'static str,
    pub field: &'static str,
    pub code: &'static str,
}

impl Violation {
    pub fn missing_field(resource: &'static str, field: &'static str) -> Self {
        Self {
            resource,
            field,
            code: "missing_field",
        }
    }

    pub fn invalid(resource: &'static str, field: &'static str) -> Self {
        Self {
            resource,
            field,
            code: "invalid",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed input: bad id shape, missing required fields, or an
    /// unsupported state value. Never mutates persisted or scheduled state.
    #[error("validation failed: {}", describe_violations(.0))]
    Validation(Vec<Violation>),
    /// Well-formed id with no matching record.
    #[error("{resource} {id} not found")]
    NotFound {
        resource: &'static str,
        id: String,
    },
    /// The cron expression could not be registered. Distinct from validation:
    /// the expression is a string, it just does not parse as a schedule.
    #[error("cannot schedule: {0}")]
    Schedule(String),
    /// Storage unreachable or an operation rejected outside input validity.
    #[error("storage unavailable")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// Shorthand for the malformed-id rejection every lookup starts with.
    pub fn invalid_id(resource: &'static str) -> Self {
        ServiceError::Validation(vec![Violation::invalid(resource, "id")])
    }

    /// HTTP-style status code for this failure.
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 422,
            ServiceError::NotFound { .. } => 404,
            ServiceError::Schedule(_) => 400,
            ServiceError::Store(_) => 500,
        }
    }

    /// Structured failure body: `{status, errors}` for validation,
    /// `{status, customMessage}` for everything else.
    pub fn to_body(&self) -> serde_json::Value {
        match self {
            ServiceError::Validation(violations) => serde_json::json!({
                "status": self.status(),
                "errors": violations,
            }),
            other => serde_json::json!({
                "status": other.status(),
                "customMessage": other.to_string(),
            }),
        }
    }
}

fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}.{}: {}", v.resource, v.field, v.code))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let validation = ServiceError::Validation(vec![Violation::missing_field("job", "name")]);
        assert_eq!(validation.status(), 422);

        let not_found = ServiceError::NotFound {
            resource: "job",
            id: "x".into(),
        };
        assert_eq!(not_found.status(), 404);

        assert_eq!(ServiceError::Schedule("bad".into()).status(), 400);
    }

    #[test]
    fn test_validation_body_lists_all_violations() {
        let err = ServiceError::Validation(vec![
            Violation::missing_field("job", "name"),
            Violation::missing_field("job", "expression"),
            Violation::missing_field("job", "command"),
        ]);
        let body = err.to_body();
        assert_eq!(body["status"], 422);
        let errors = body["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0]["field"], "name");
        assert_eq!(errors[0]["code"], "missing_field");
    }

    #[test]
    fn test_store_body_hides_driver_detail() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err = ServiceError::Store(StoreError::Snapshot(json_err));
        let body = err.to_body();
        assert_eq!(body["status"], 500);
        assert_eq!(body["customMessage"], "storage unavailable");
    }
}
