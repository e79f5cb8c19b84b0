//! Change detection: a 64-bit content fingerprint per tracked object.
//!
//! The fingerprint covers property values only. Two objects that differ
//! only in relationship fields hash identically; relationship changes are
//! detected structurally by the compiler.

use std::collections::HashMap;

use trellis_core::{EntityHandle, Value};

/// Objects with no persistable properties always hash to this value.
const SEED: u64 = 0xDEAD_BEEF / (11 * 257);

/// Initial value of the rolling string hash (a large prime).
const STRING_SEED: u64 = 1_125_899_906_842_597;

/// Fold the converted property values, in declared field order, into a
/// 64-bit fingerprint. Null values do not contribute.
pub fn fingerprint<'a>(properties: impl IntoIterator<Item = &'a (String, Value)>) -> u64 {
    let mut acc = SEED;
    for (_, value) in properties {
        if value.is_null() {
            continue;
        }
        acc = acc
            .wrapping_mul(31)
            .wrapping_add(string_hash(&value.to_string()));
    }
    acc
}

fn string_hash(s: &str) -> u64 {
    let mut h = STRING_SEED;
    for c in s.chars() {
        h = h.wrapping_mul(31).wrapping_add(u64::from(u32::from(c)));
    }
    h
}

/// Fingerprint table keyed by object handle.
#[derive(Debug, Default)]
pub struct ChangeMemo {
    fingerprints: HashMap<EntityHandle, u64>,
}

impl ChangeMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the fingerprint of the entity's current property values.
    pub fn remember(&mut self, entity: EntityHandle, properties: &[(String, Value)]) {
        self.fingerprints.insert(entity, fingerprint(properties));
    }

    /// Install a precomputed fingerprint. Used when applying a commit
    /// journal, so the recorded state matches what was actually compiled.
    pub fn record(&mut self, entity: EntityHandle, fingerprint: u64) {
        self.fingerprints.insert(entity, fingerprint);
    }

    /// True iff the entity was recorded and its properties are unchanged.
    /// Pure read: recomputes the hash, mutates nothing.
    pub fn remembered(&self, entity: EntityHandle, properties: &[(String, Value)]) -> bool {
        match self.fingerprints.get(&entity) {
            Some(&expected) => fingerprint(properties) == expected,
            None => false,
        }
    }

    /// True iff the entity has ever been recorded, changed or not.
    pub fn contains(&self, entity: EntityHandle) -> bool {
        self.fingerprints.contains_key(&entity)
    }

    pub fn forget(&mut self, entity: EntityHandle) {
        self.fingerprints.remove(&entity);
    }

    pub fn clear(&mut self) {
        self.fingerprints.clear();
    }
}
