//! The compiler's output: an ordered sequence of parameterized statements.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use trellis_core::{EntityId, Value};

/// Placeholder for an identifier the store will assign while executing
/// this bundle. Resolved by the execution layer: a statement whose
/// [`Statement::creates`] is set binds the returned identifier to its
/// placeholder, and later statements may reference it as a parameter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PendingId(pub u32);

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending:{}", self.0)
    }
}

/// A named statement parameter. Never a raw domain object: only converted
/// scalar values and identifiers, real or deferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Param {
    /// A converted scalar value.
    Value(Value),
    /// An identifier assigned in a previous save.
    Id(EntityId),
    /// An identifier assigned earlier in this bundle.
    Pending(PendingId),
}

/// One write operation: Cypher text plus named parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
    pub params: BTreeMap<String, Param>,
    /// Set when executing this statement returns a newly assigned
    /// identifier (`RETURN id(..) AS id`) to bind to the placeholder.
    pub creates: Option<PendingId>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
            creates: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, param: Param) -> Self {
        self.params.insert(name.into(), param);
        self
    }

    pub fn creates(mut self, pending: PendingId) -> Self {
        self.creates = Some(pending);
        self
    }
}

/// The ordered write operations produced by one compilation.
///
/// Empty exactly when the reachable graph is already fully reflected in
/// the store. Node operations always precede the relationship operations
/// that reference them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementBundle {
    statements: Vec<Statement>,
}

impl StatementBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn extend(&mut self, statements: impl IntoIterator<Item = Statement>) {
        self.statements.extend(statements);
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl<'a> IntoIterator for &'a StatementBundle {
    type Item = &'a Statement;
    type IntoIter = std::slice::Iter<'a, Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}
