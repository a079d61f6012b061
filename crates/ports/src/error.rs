//! Errors crossing the boundary to external collaborators.

use thiserror::Error;

/// Errors raised by a `SchemaProbe`, `LLMClient`, or repository
/// implementation. `ontology_domain::DomainError` implements `From<PortError>`
/// for the subset that maps onto `TransientIo` so engine components can
/// propagate a single error type through a phase.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("database error: {0}")]
    Database(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unique-constraint conflict on an upsert-with-conflict-then-update
    /// operation (e.g. `RelationshipRepository::upsert_relationship`).
    #[error("conflict on {entity}(id={id})")]
    Conflict { entity: &'static str, id: String },

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<PortError> for ontology_domain::DomainError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Database(msg) => Self::TransientIo(msg),
            PortError::Network(msg) => Self::TransientIo(msg),
            PortError::Serialization(err) => Self::ParseFailure(err.to_string()),
            PortError::Conflict { entity, id } => Self::Conflict(format!("{entity}(id={id})")),
            PortError::Unexpected(msg) => Self::TransientIo(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontology_domain::DomainError;

    #[test]
    fn database_error_maps_to_transient_io() {
        let domain_err: DomainError = PortError::Database("connection reset".into()).into();
        assert!(domain_err.is_retryable());
    }

    #[test]
    fn conflict_maps_to_domain_conflict() {
        let domain_err: DomainError =
            PortError::Conflict { entity: "SchemaRelationship", id: "abc".into() }.into();
        assert!(matches!(domain_err, DomainError::Conflict(_)));
    }
}
