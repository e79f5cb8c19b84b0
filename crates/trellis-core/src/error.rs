use thiserror::Error;

use crate::object::EntityId;

/// Errors raised while mapping an object graph onto the store.
///
/// All of these are fatal for the compilation that raised them: partial
/// output is discarded, nothing is retried.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("no mapping metadata registered for type `{0}`")]
    UnknownType(String),

    #[error("field `{field}` on `{entity}` is not declared as a property or relationship")]
    UnclassifiedField { entity: String, field: String },

    #[error("cannot convert field `{field}` on `{entity}`")]
    Conversion {
        entity: String,
        field: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("entity is already mapped to identifier {existing}; refusing to assign {attempted}")]
    IdentityConflict {
        existing: EntityId,
        attempted: EntityId,
    },

    #[error("relationship entity `{entity}` is missing its {endpoint} endpoint")]
    MissingEndpoint {
        entity: String,
        endpoint: &'static str,
    },

    #[error("entity is not tracked by this session")]
    NotTracked,

    #[error("reference to an object that is not part of this graph")]
    DanglingReference,

    #[error("execution did not return an identifier for a create operation")]
    MissingCreatedId,
}
