//! trellis-core: shared domain types for the trellis object-graph mapper.
//!
//! This crate provides the foundational types used across all trellis
//! components:
//! - Scalar [`Value`]s carried by entity property fields
//! - The [`ObjectGraph`] arena of domain objects and its handle/identifier
//!   types
//! - The [`MappingError`] taxonomy shared by every mapping stage

pub mod error;
pub mod object;
pub mod value;

pub use error::MappingError;
pub use object::{Direction, DomainObject, EntityHandle, EntityId, ObjectGraph, TypeKey};
pub use value::Value;
