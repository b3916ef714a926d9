use thiserror::Error;

/// Result type used throughout the synchronization core.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the state model, the registry and the wire codec.
///
/// Variants fall into two groups. Contract violations mean that continuing
/// would silently corrupt replicated state, so the current operation must be
/// aborted. Lookup failures only concern the single update or request that
/// referenced something missing; callers log them and move on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A sync property was declared after the component finished its init
    #[error("sync property '{property}' declared on {component} after init")]
    DeclaredAfterInit {
        component: &'static str,
        property: String,
    },

    /// Two states that must line up position by position differ in length
    #[error("state length mismatch: expected {expected} values, found {found}")]
    StateLengthMismatch { expected: usize, found: usize },

    /// A flat value and a nested list met at the same state position
    #[error("state shape mismatch at position {position}: {left} vs {right}")]
    StateShapeMismatch {
        position: usize,
        left: &'static str,
        right: &'static str,
    },

    /// Incoming state carries fewer values than the component declares
    #[error("state for {component} too short: {expected} properties declared, {found} values received")]
    StateTooShort {
        component: &'static str,
        expected: usize,
        found: usize,
    },

    /// A custom sync property received something other than a nested list
    #[error("custom sync property #{position} on {component} expects a nested state, found {found}")]
    ShapeMismatch {
        component: &'static str,
        position: usize,
        found: &'static str,
    },

    /// A property produced a value that cannot travel over the wire
    #[error("{component}.{property} is not serializable: {reason}")]
    NotSerializable {
        component: &'static str,
        property: String,
        reason: String,
    },

    /// A named sync property does not exist on the component
    #[error("{component} has no sync property named '{property}'")]
    PropertyNotFound {
        component: &'static str,
        property: String,
    },

    /// A named field received a value of a different kind than it holds
    #[error("{component}.{property} expects a {expected} value, found {found}")]
    FieldType {
        component: &'static str,
        property: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Gradient time step was zero, negative or not finite
    #[error("invalid interpolation interval {interval}")]
    InvalidInterval { interval: String },

    /// Packet referenced a component row this registry never declared
    #[error("unknown component row {row}")]
    UnknownRow { row: usize },

    /// Component type was never registered with the registry
    #[error("component type {component} is not registered")]
    UnregisteredComponent { component: &'static str },

    /// Entity id is not present in the registry
    #[error("entity '{id}' does not exist")]
    UnknownEntity { id: String },

    /// Entity exists but has no component in the given row
    #[error("entity '{id}' has no component in row {row}")]
    MissingComponent { id: String, row: usize },

    /// Input channel id is not present in the registry
    #[error("input channel '{id}' does not exist")]
    UnknownChannel { id: String },

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("failed to decode message: {0}")]
    Decode(String),
}

impl SyncError {
    /// Returns true for errors that must abort the running operation.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            SyncError::DeclaredAfterInit { .. }
                | SyncError::StateLengthMismatch { .. }
                | SyncError::StateShapeMismatch { .. }
                | SyncError::StateTooShort { .. }
                | SyncError::ShapeMismatch { .. }
                | SyncError::NotSerializable { .. }
                | SyncError::PropertyNotFound { .. }
                | SyncError::FieldType { .. }
                | SyncError::InvalidInterval { .. }
        )
    }

    /// Returns true for errors that only affect a single update or request.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            SyncError::UnknownRow { .. }
                | SyncError::UnregisteredComponent { .. }
                | SyncError::UnknownEntity { .. }
                | SyncError::MissingComponent { .. }
                | SyncError::UnknownChannel { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violations_are_classified() {
        let err = SyncError::StateLengthMismatch {
            expected: 2,
            found: 3,
        };
        assert!(err.is_contract_violation());
        assert!(!err.is_lookup_failure());
    }

    #[test]
    fn test_lookup_failures_are_classified() {
        let err = SyncError::UnknownRow { row: 9 };
        assert!(err.is_lookup_failure());
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_transport_errors_are_neither() {
        let err = SyncError::Decode("truncated".to_string());
        assert!(!err.is_lookup_failure());
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_error_message_formatting() {
        let err = SyncError::StateTooShort {
            component: "Mover",
            expected: 4,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "state for Mover too short: 4 properties declared, 2 values received"
        );
    }
}
