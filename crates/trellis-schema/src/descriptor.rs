//! Field descriptor tables describing how a domain type maps to the graph.
//!
//! Descriptors are plain data built once at startup. Nothing here inspects
//! objects at runtime; the registry's accessor methods do the lookups.

use serde::{Deserialize, Serialize};

use trellis_core::Direction;

/// A scalar property field: runtime field name plus persisted property name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub field: String,
    pub property: String,
}

impl FieldDescriptor {
    /// Descriptor whose persisted property name equals the field name.
    pub fn new(field: impl Into<String>) -> Self {
        let field = field.into();
        let property = field.clone();
        Self { field, property }
    }

    pub fn with_property(field: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            property: property.into(),
        }
    }
}

/// A reference field holding edges to other entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub field: String,
    pub rel_type: String,
    pub direction: Direction,
    /// Targets of this field are relationship-entity objects rather than
    /// plain nodes; the edge is created from the target's own endpoints.
    pub relationship_entity: bool,
}

/// Endpoint slots of a relationship-entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointFields {
    pub start: String,
    pub end: String,
}

/// Everything the mapper knows about one domain type.
///
/// `label` is the node label, or the relationship type for relationship
/// entities. Property declaration order is significant: it defines the
/// fingerprint fold order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySchema {
    pub label: String,
    pub properties: Vec<FieldDescriptor>,
    pub relationships: Vec<RelationshipDescriptor>,
    /// `Some` marks this type as a relationship entity.
    pub endpoints: Option<EndpointFields>,
}

impl EntitySchema {
    /// Schema for a node type.
    pub fn node(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            properties: Vec::new(),
            relationships: Vec::new(),
            endpoints: None,
        }
    }

    /// Schema for a relationship-entity type: an edge of type `rel_type`
    /// with its own properties, anchored by two endpoint slots.
    pub fn relationship(
        rel_type: impl Into<String>,
        start_field: impl Into<String>,
        end_field: impl Into<String>,
    ) -> Self {
        Self {
            label: rel_type.into(),
            properties: Vec::new(),
            relationships: Vec::new(),
            endpoints: Some(EndpointFields {
                start: start_field.into(),
                end: end_field.into(),
            }),
        }
    }

    pub fn property(mut self, field: impl Into<String>) -> Self {
        self.properties.push(FieldDescriptor::new(field));
        self
    }

    pub fn property_as(mut self, field: impl Into<String>, property: impl Into<String>) -> Self {
        self.properties
            .push(FieldDescriptor::with_property(field, property));
        self
    }

    /// Declare a plain reference field.
    pub fn reference(
        mut self,
        field: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        self.relationships.push(RelationshipDescriptor {
            field: field.into(),
            rel_type: rel_type.into(),
            direction,
            relationship_entity: false,
        });
        self
    }

    /// Declare a reference field whose targets are relationship entities.
    pub fn entity_reference(
        mut self,
        field: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        self.relationships.push(RelationshipDescriptor {
            field: field.into(),
            rel_type: rel_type.into(),
            direction,
            relationship_entity: true,
        });
        self
    }

    pub fn is_relationship_entity(&self) -> bool {
        self.endpoints.is_some()
    }

    pub fn property_field(&self, field: &str) -> Option<&FieldDescriptor> {
        self.properties.iter().find(|d| d.field == field)
    }

    pub fn relationship_field(&self, field: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|d| d.field == field)
    }
}
