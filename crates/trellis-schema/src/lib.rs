//! trellis-schema: static mapping metadata for the trellis object-graph
//! mapper.
//!
//! Domain types are described by explicit field-descriptor tables built once
//! at startup, and attribute converters come from an explicit registration
//! table. The mapping core consumes both through the [`MetadataProvider`]
//! trait and [`ConverterRegistry`]; there is no runtime introspection.

pub mod convert;
pub mod descriptor;
pub mod project;
pub mod registry;

pub use convert::{
    AttributeConverter, ConverterRegistry, DateTimeEpochMillis, DateTimeIso8601, NumberString,
    UuidString,
};
pub use descriptor::{EndpointFields, EntitySchema, FieldDescriptor, RelationshipDescriptor};
pub use project::persistable_properties;
pub use registry::{MetadataProvider, SchemaRegistry};
