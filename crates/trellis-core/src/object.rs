//! The in-memory object graph: a per-session arena of domain objects.
//!
//! The arena assigns every object a stable `EntityHandle` on insertion.
//! Session tables (fingerprints, identifiers, visited-sets) key objects by
//! handle, so two objects with identical field values are always tracked
//! independently.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Key identifying a registered domain type by its schema name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeKey(pub String);

impl TypeKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl From<&str> for TypeKey {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable handle to an object in an [`ObjectGraph`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityHandle(u32);

impl EntityHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Persisted surrogate identifier, assigned by the store on first save.
/// Immutable for the lifetime of the entity; never reused or reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a relationship field relative to its owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A domain object: typed property values plus named relationship slots.
///
/// Property fields hold runtime [`Value`]s; relationship slots hold handles
/// to other objects in the same graph. Which names are valid for either is
/// declared by the object's schema, not by the object itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainObject {
    type_key: TypeKey,
    properties: BTreeMap<String, Value>,
    related: BTreeMap<String, Vec<EntityHandle>>,
}

impl DomainObject {
    pub fn new(type_key: impl Into<TypeKey>) -> Self {
        Self {
            type_key: type_key.into(),
            properties: BTreeMap::new(),
            related: BTreeMap::new(),
        }
    }

    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    pub fn set_property(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(field.into(), value.into());
    }

    pub fn property(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Append a target to a relationship slot, creating the slot if needed.
    pub fn add_related(&mut self, field: impl Into<String>, target: EntityHandle) {
        self.related.entry(field.into()).or_default().push(target);
    }

    pub fn set_related(&mut self, field: impl Into<String>, targets: Vec<EntityHandle>) {
        self.related.insert(field.into(), targets);
    }

    /// Drop one target from a slot. The slot itself stays declared so a
    /// later save still reconciles it against the recorded state.
    pub fn remove_related(&mut self, field: &str, target: EntityHandle) {
        if let Some(targets) = self.related.get_mut(field) {
            targets.retain(|t| *t != target);
        }
    }

    pub fn related(&self, field: &str) -> &[EntityHandle] {
        self.related.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn related_fields(&self) -> impl Iterator<Item = &str> {
        self.related.keys().map(String::as_str)
    }
}

/// Arena owning every domain object of one logical session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectGraph {
    objects: Vec<DomainObject>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: DomainObject) -> EntityHandle {
        let handle = EntityHandle(self.objects.len() as u32);
        self.objects.push(object);
        handle
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&DomainObject> {
        self.objects.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut DomainObject> {
        self.objects.get_mut(handle.index())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        (0..self.objects.len() as u32).map(EntityHandle)
    }
}
