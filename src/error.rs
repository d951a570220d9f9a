use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation failed on field `{field}`: {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound {
        kind: crate::store::EntityKind,
        id: String,
    },

    #[error("Version conflict on {kind} {id}: expected {expected}, found {actual}")]
    VersionConflict {
        kind: crate::store::EntityKind,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Dependency from {from} to {to} would create a cycle")]
    CycleDetected {
        from: crate::core::task::TaskId,
        to: crate::core::task::TaskId,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Invalid trigger transition from {from} to {to}")]
    InvalidTriggerTransition { from: String, to: String },

    #[error("Trigger {0} has already been dispatched and cannot be cancelled")]
    TriggerNotCancellable(crate::trigger::TriggerId),
}

impl Error {
    /// Shorthand for a `ValidationFailed` on a named field.
    pub fn validation(field: &str, reason: &str) -> Self {
        Self::ValidationFailed {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", Error::NoHomeDir), "No home directory");
        assert_eq!(
            format!("{}", Error::validation("title", "must not be empty")),
            "Validation failed on field `title`: must not be empty"
        );
    }

    #[test]
    fn test_version_conflict_display() {
        let err = Error::VersionConflict {
            kind: crate::store::EntityKind::Task,
            id: "abc".to_string(),
            expected: 2,
            actual: 3,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("task"));
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("found 3"));
    }
}
