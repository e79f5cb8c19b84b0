//! The metadata provider: a static registry of entity schemas.

use std::collections::HashMap;

use trellis_core::{DomainObject, MappingError, TypeKey, Value};

use crate::descriptor::{EndpointFields, EntitySchema, FieldDescriptor, RelationshipDescriptor};

/// What the mapping core asks of its metadata source.
///
/// Implemented by [`SchemaRegistry`]; hosts with their own metadata store
/// can implement it directly.
pub trait MetadataProvider {
    /// The persisted label (or relationship type) for a domain type.
    fn class_name(&self, type_key: &TypeKey) -> Result<&str, MappingError>;

    /// Property field descriptors in declared order.
    fn property_fields(&self, type_key: &TypeKey) -> Result<&[FieldDescriptor], MappingError>;

    /// Relationship field descriptors.
    fn relationship_fields(
        &self,
        type_key: &TypeKey,
    ) -> Result<&[RelationshipDescriptor], MappingError>;

    /// Whether the type represents an edge with its own properties.
    fn is_relationship_entity(&self, type_key: &TypeKey) -> bool;

    /// Endpoint slots of a relationship-entity type; `None` for node types.
    fn endpoint_fields(&self, type_key: &TypeKey) -> Result<Option<&EndpointFields>, MappingError>;

    /// Raw runtime value of a property field on an object.
    fn field_value<'a>(
        &self,
        descriptor: &FieldDescriptor,
        object: &'a DomainObject,
    ) -> Option<&'a Value>;
}

/// Statically built table of entity schemas, populated once at startup.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<TypeKey, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, chained builder-style at startup.
    pub fn with(mut self, type_key: impl Into<TypeKey>, schema: EntitySchema) -> Self {
        self.register(type_key, schema);
        self
    }

    pub fn register(&mut self, type_key: impl Into<TypeKey>, schema: EntitySchema) {
        self.schemas.insert(type_key.into(), schema);
    }

    pub fn schema(&self, type_key: &TypeKey) -> Result<&EntitySchema, MappingError> {
        self.schemas
            .get(type_key)
            .ok_or_else(|| MappingError::UnknownType(type_key.to_string()))
    }
}

impl MetadataProvider for SchemaRegistry {
    fn class_name(&self, type_key: &TypeKey) -> Result<&str, MappingError> {
        Ok(&self.schema(type_key)?.label)
    }

    fn property_fields(&self, type_key: &TypeKey) -> Result<&[FieldDescriptor], MappingError> {
        Ok(&self.schema(type_key)?.properties)
    }

    fn relationship_fields(
        &self,
        type_key: &TypeKey,
    ) -> Result<&[RelationshipDescriptor], MappingError> {
        Ok(&self.schema(type_key)?.relationships)
    }

    fn is_relationship_entity(&self, type_key: &TypeKey) -> bool {
        self.schemas
            .get(type_key)
            .map(EntitySchema::is_relationship_entity)
            .unwrap_or(false)
    }

    fn endpoint_fields(&self, type_key: &TypeKey) -> Result<Option<&EndpointFields>, MappingError> {
        Ok(self.schema(type_key)?.endpoints.as_ref())
    }

    fn field_value<'a>(
        &self,
        descriptor: &FieldDescriptor,
        object: &'a DomainObject,
    ) -> Option<&'a Value> {
        object.property(&descriptor.field)
    }
}
