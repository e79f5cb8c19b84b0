//! Session-scoped registry of tracked entities.
//!
//! One `MappingContext` per logical session. Not safe for concurrent
//! mutation: callers running concurrent saves use one context per session,
//! which ownership already enforces since every write takes `&mut self`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use trellis_core::{EntityHandle, EntityId, MappingError};

use crate::memo::ChangeMemo;

/// An edge known to exist in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub start: EntityId,
    pub rel_type: String,
    pub end: EntityId,
    /// Identifier of the owning relationship entity, if the edge has one.
    pub entity: Option<EntityId>,
}

/// Registry mapping tracked objects to their persisted identifiers and
/// recorded state. Owns the session's [`ChangeMemo`]; both share the same
/// lifetime and are reset together by [`clear`](MappingContext::clear).
#[derive(Debug, Default)]
pub struct MappingContext {
    identifiers: HashMap<EntityHandle, EntityId>,
    visited: HashSet<EntityHandle>,
    relationships: HashSet<RelationshipRecord>,
    memo: ChangeMemo,
}

impl MappingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff the entity has been registered in this session, through an
    /// identifier or a remembered fingerprint.
    pub fn is_tracked(&self, entity: EntityHandle) -> bool {
        self.identifiers.contains_key(&entity) || self.memo.contains(entity)
    }

    /// Associate a persisted identifier with an entity. Re-registering the
    /// same identifier is a no-op; a different one is an invariant
    /// violation upstream.
    pub fn register_identifier(
        &mut self,
        entity: EntityHandle,
        id: EntityId,
    ) -> Result<(), MappingError> {
        match self.identifiers.get(&entity) {
            Some(&existing) if existing != id => Err(MappingError::IdentityConflict {
                existing,
                attempted: id,
            }),
            _ => {
                self.identifiers.insert(entity, id);
                Ok(())
            }
        }
    }

    pub fn identifier_of(&self, entity: EntityHandle) -> Option<EntityId> {
        self.identifiers.get(&entity).copied()
    }

    /// Reverse lookup: the handle currently bound to an identifier.
    pub fn handle_for(&self, id: EntityId) -> Option<EntityHandle> {
        self.identifiers
            .iter()
            .find_map(|(handle, bound)| (*bound == id).then_some(*handle))
    }

    // ── Traversal support ────────────────────────────────────────

    /// Clear the visited-set at the start of a compilation pass.
    pub fn begin_pass(&mut self) {
        self.visited.clear();
    }

    pub fn visited(&self, entity: EntityHandle) -> bool {
        self.visited.contains(&entity)
    }

    pub fn mark_visited(&mut self, entity: EntityHandle) {
        self.visited.insert(entity);
    }

    // ── Recorded relationship state ──────────────────────────────

    pub fn register_relationship(&mut self, record: RelationshipRecord) {
        self.relationships.insert(record);
    }

    pub fn remove_relationship(&mut self, record: &RelationshipRecord) -> bool {
        self.relationships.remove(record)
    }

    pub fn has_relationship(&self, record: &RelationshipRecord) -> bool {
        self.relationships.contains(record)
    }

    pub fn relationship_records(&self) -> impl Iterator<Item = &RelationshipRecord> {
        self.relationships.iter()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub fn memo(&self) -> &ChangeMemo {
        &self.memo
    }

    pub fn memo_mut(&mut self) -> &mut ChangeMemo {
        &mut self.memo
    }

    /// Drop the identifier and fingerprint of one entity (delete support).
    /// Relationship records are removed separately by the caller, which
    /// knows which edges died with the entity.
    pub fn forget(&mut self, entity: EntityHandle) {
        self.identifiers.remove(&entity);
        self.memo.forget(entity);
    }

    /// Reset everything, including the owned memo. Domain objects are not
    /// touched. Used at the boundary of independent units of work so stale
    /// identifiers never leak between them.
    pub fn clear(&mut self) {
        self.identifiers.clear();
        self.visited.clear();
        self.relationships.clear();
        self.memo.clear();
        tracing::debug!("mapping context cleared");
    }
}
