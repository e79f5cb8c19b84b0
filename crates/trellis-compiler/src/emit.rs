//! Cypher text builders for the operations the compiler emits.
//!
//! Labels, relationship types, and property names come from the schema
//! registry (startup configuration), so they are formatted inline; values
//! are always bound as named parameters.

use trellis_core::{EntityId, Value};

use crate::bundle::{Param, PendingId, Statement};

/// `n.name = $name, n.age = $age` over the given properties.
fn set_clause<'a>(var: &str, props: impl Iterator<Item = &'a (String, Value)>) -> String {
    props
        .map(|(property, _)| format!("{var}.{property} = ${property}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind<'a>(
    mut statement: Statement,
    props: impl Iterator<Item = &'a (String, Value)>,
) -> Statement {
    for (property, value) in props {
        statement = statement.param(property.clone(), Param::Value(value.clone()));
    }
    statement
}

/// Create a node. Null properties are omitted: a property that was never
/// set has nothing to clear.
pub(crate) fn create_node(
    label: &str,
    props: &[(String, Value)],
    pending: PendingId,
) -> Statement {
    let present = || props.iter().filter(|(_, v)| !v.is_null());
    let assignments = set_clause("n", present());
    let text = if assignments.is_empty() {
        format!("CREATE (n:{label}) RETURN id(n) AS id")
    } else {
        format!("CREATE (n:{label}) SET {assignments} RETURN id(n) AS id")
    };
    bind(Statement::new(text).creates(pending), present())
}

/// Update a node with its full property set. Nulls are included so a
/// cleared field is also cleared in the store.
pub(crate) fn update_node(id: EntityId, props: &[(String, Value)]) -> Statement {
    let assignments = set_clause("n", props.iter());
    let text = format!("MATCH (n) WHERE id(n) = $id SET {assignments}");
    bind(Statement::new(text), props.iter()).param("id", Param::Id(id))
}

/// Create a plain relationship between two endpoints. `MERGE` keeps
/// re-execution harmless for set-valued reference fields.
pub(crate) fn create_relationship(rel_type: &str, start: Param, end: Param) -> Statement {
    let text = format!(
        "MATCH (a) WHERE id(a) = $start \
         MATCH (b) WHERE id(b) = $end \
         MERGE (a)-[r:{rel_type}]->(b)"
    );
    Statement::new(text).param("start", start).param("end", end)
}

/// Create a relationship-entity edge carrying its own properties. `CREATE`
/// rather than `MERGE`: each instance has its own identity, so two
/// instances between the same endpoints are two edges.
pub(crate) fn create_relationship_entity(
    rel_type: &str,
    start: Param,
    end: Param,
    props: &[(String, Value)],
    pending: PendingId,
) -> Statement {
    let present = || props.iter().filter(|(_, v)| !v.is_null());
    let assignments = set_clause("r", present());
    let text = if assignments.is_empty() {
        format!(
            "MATCH (a) WHERE id(a) = $start \
             MATCH (b) WHERE id(b) = $end \
             CREATE (a)-[r:{rel_type}]->(b) RETURN id(r) AS id"
        )
    } else {
        format!(
            "MATCH (a) WHERE id(a) = $start \
             MATCH (b) WHERE id(b) = $end \
             CREATE (a)-[r:{rel_type}]->(b) SET {assignments} RETURN id(r) AS id"
        )
    };
    bind(Statement::new(text).creates(pending), present())
        .param("start", start)
        .param("end", end)
}

/// Update a relationship-entity's own properties, full set.
pub(crate) fn update_relationship_entity(id: EntityId, props: &[(String, Value)]) -> Statement {
    let assignments = set_clause("r", props.iter());
    let text = format!("MATCH ()-[r]->() WHERE id(r) = $id SET {assignments}");
    bind(Statement::new(text), props.iter()).param("id", Param::Id(id))
}

/// Delete a plain relationship between two persisted endpoints.
pub(crate) fn delete_relationship(rel_type: &str, start: EntityId, end: EntityId) -> Statement {
    let text = format!(
        "MATCH (a)-[r:{rel_type}]->(b) \
         WHERE id(a) = $start AND id(b) = $end DELETE r"
    );
    Statement::new(text)
        .param("start", Param::Id(start))
        .param("end", Param::Id(end))
}

/// Delete a relationship-entity edge by its own identifier.
pub(crate) fn delete_relationship_entity(id: EntityId) -> Statement {
    Statement::new("MATCH ()-[r]->() WHERE id(r) = $id DELETE r").param("id", Param::Id(id))
}

/// Delete a node; `detach` also removes its remaining relationships.
pub(crate) fn delete_node(id: EntityId, detach: bool) -> Statement {
    let text = if detach {
        "MATCH (n) WHERE id(n) = $id DETACH DELETE n"
    } else {
        "MATCH (n) WHERE id(n) = $id DELETE n"
    };
    Statement::new(text).param("id", Param::Id(id))
}
