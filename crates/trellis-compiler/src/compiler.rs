//! The graph statement compiler.
//!
//! Walks the object graph reachable from the save roots, decides per
//! entity whether it is new, changed, or untouched, reconciles reference
//! fields against the state recorded in the mapping context, and emits the
//! resulting diff as an ordered statement bundle.
//!
//! Compilation performs no I/O and, apart from the per-pass visited-set,
//! does not mutate the session. Durable effects are described by a commit
//! journal inside the compiled result and applied via `commit` once the
//! caller has executed the bundle, so a failed compile or a failed
//! execution leaves the session exactly as it was.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use trellis_core::{Direction, DomainObject, EntityHandle, EntityId, MappingError, ObjectGraph};
use trellis_schema::{persistable_properties, ConverterRegistry, MetadataProvider};
use trellis_session::{fingerprint, MappingContext, RelationshipRecord};

use crate::bundle::{Param, PendingId, StatementBundle};
use crate::emit;

/// Compiler behaviour toggles, embeddable in a host's config file.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerOptions {
    /// Delete nodes together with their remaining relationships. When
    /// false, deleting a node that still has edges fails at execution.
    #[serde(default = "default_true")]
    pub detach_delete: bool,

    /// On explicit deletes, also drop recorded relationship-entity edges
    /// touching the deleted node. Off by default: an edge may still be
    /// referenced from its other endpoint.
    #[serde(default)]
    pub cascade_orphaned_relationship_entities: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            detach_delete: true,
            cascade_orphaned_relationship_entities: false,
        }
    }
}

/// Reference to an endpoint that may or may not be persisted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EndpointRef {
    Id(EntityId),
    Pending(PendingId),
}

impl EndpointRef {
    fn param(self) -> Param {
        match self {
            Self::Id(id) => Param::Id(id),
            Self::Pending(pending) => Param::Pending(pending),
        }
    }

    fn resolve(self, created: &HashMap<PendingId, EntityId>) -> Result<EntityId, MappingError> {
        match self {
            Self::Id(id) => Ok(id),
            Self::Pending(pending) => created
                .get(&pending)
                .copied()
                .ok_or(MappingError::MissingCreatedId),
        }
    }
}

/// A relationship the store will contain after this save, with endpoints
/// that may still be placeholders at compile time.
#[derive(Debug, Clone)]
struct PendingRelationship {
    start: EndpointRef,
    rel_type: String,
    end: EndpointRef,
    entity: Option<EndpointRef>,
}

/// A compiled save: the statement bundle plus the journal of session
/// effects to apply once the bundle has executed.
#[derive(Debug, Default)]
pub struct CompiledSave {
    pub bundle: StatementBundle,
    created_nodes: Vec<(PendingId, EntityHandle)>,
    created_relationship_entities: Vec<(PendingId, EntityHandle)>,
    remembered: Vec<(EntityHandle, u64)>,
    added: Vec<PendingRelationship>,
    removed: Vec<RelationshipRecord>,
}

impl CompiledSave {
    /// Bind store-assigned identifiers and fold the journal into the
    /// context. Call after the bundle executed successfully; `created`
    /// maps each create statement's placeholder to the identifier the
    /// store returned for it.
    pub fn commit(
        &self,
        context: &mut MappingContext,
        created: &HashMap<PendingId, EntityId>,
    ) -> Result<(), MappingError> {
        for (pending, handle) in self
            .created_nodes
            .iter()
            .chain(&self.created_relationship_entities)
        {
            let id = created
                .get(pending)
                .copied()
                .ok_or(MappingError::MissingCreatedId)?;
            context.register_identifier(*handle, id)?;
        }
        for (handle, fingerprint) in &self.remembered {
            context.memo_mut().record(*handle, *fingerprint);
        }
        for record in &self.removed {
            context.remove_relationship(record);
        }
        for pending in &self.added {
            context.register_relationship(RelationshipRecord {
                start: pending.start.resolve(created)?,
                rel_type: pending.rel_type.clone(),
                end: pending.end.resolve(created)?,
                entity: pending.entity.map(|e| e.resolve(created)).transpose()?,
            });
        }
        Ok(())
    }
}

/// A compiled delete: statements plus the tracking state to drop.
#[derive(Debug)]
pub struct CompiledDelete {
    pub bundle: StatementBundle,
    forgotten: Vec<EntityHandle>,
    removed: Vec<RelationshipRecord>,
}

impl CompiledDelete {
    /// Drop identifiers and records for everything the delete removed.
    pub fn commit(&self, context: &mut MappingContext) {
        for record in &self.removed {
            context.remove_relationship(record);
        }
        for &handle in &self.forgotten {
            context.forget(handle);
        }
    }
}

/// Compiles object graphs into statement bundles.
pub struct GraphCompiler<'a> {
    provider: &'a dyn MetadataProvider,
    converters: &'a ConverterRegistry,
    options: CompilerOptions,
}

impl<'a> GraphCompiler<'a> {
    pub fn new(provider: &'a dyn MetadataProvider, converters: &'a ConverterRegistry) -> Self {
        Self::with_options(provider, converters, CompilerOptions::default())
    }

    pub fn with_options(
        provider: &'a dyn MetadataProvider,
        converters: &'a ConverterRegistry,
        options: CompilerOptions,
    ) -> Self {
        Self {
            provider,
            converters,
            options,
        }
    }

    /// Compile the minimal diff that brings the persisted graph into
    /// agreement with the in-memory graph reachable from `roots`.
    pub fn compile_save(
        &self,
        graph: &ObjectGraph,
        context: &mut MappingContext,
        roots: &[EntityHandle],
    ) -> Result<CompiledSave, MappingError> {
        context.begin_pass();

        // Phase 1: cycle-safe depth-first traversal, splitting plain nodes
        // from relationship entities. Visit order is preserved so creates
        // come out root-first.
        let mut nodes = Vec::new();
        let mut relationship_entities = Vec::new();
        let mut stack: Vec<EntityHandle> = roots.iter().rev().copied().collect();
        while let Some(handle) = stack.pop() {
            if context.visited(handle) {
                continue;
            }
            context.mark_visited(handle);

            let object = self.object(graph, handle)?;
            if self.provider.is_relationship_entity(object.type_key()) {
                let (start, end) = self.endpoints(graph, object)?;
                relationship_entities.push(handle);
                stack.push(end);
                stack.push(start);
            } else {
                self.check_relationship_slots(graph, object)?;
                nodes.push(handle);
                for descriptor in self.provider.relationship_fields(object.type_key())? {
                    for &target in object.related(&descriptor.field) {
                        stack.push(target);
                    }
                }
            }
        }

        // Phase 2: per-entity decision. New entities get a create and a
        // placeholder; tracked-but-changed entities get a full-set update;
        // unchanged entities emit nothing.
        let mut save = CompiledSave::default();
        let mut next_pending = 0u32;
        let mut refs: HashMap<EntityHandle, EndpointRef> = HashMap::new();
        let mut node_statements = Vec::new();
        for &handle in &nodes {
            let object = self.object(graph, handle)?;
            let label = self.provider.class_name(object.type_key())?.to_string();
            let props = persistable_properties(self.provider, self.converters, object)?;
            match context.identifier_of(handle) {
                None => {
                    let pending = PendingId(next_pending);
                    next_pending += 1;
                    refs.insert(handle, EndpointRef::Pending(pending));
                    node_statements.push(emit::create_node(&label, &props, pending));
                    save.created_nodes.push((pending, handle));
                    save.remembered.push((handle, fingerprint(&props)));
                }
                Some(id) => {
                    refs.insert(handle, EndpointRef::Id(id));
                    if !context.memo().remembered(handle, &props) {
                        node_statements.push(emit::update_node(id, &props));
                        save.remembered.push((handle, fingerprint(&props)));
                    }
                }
            }
        }

        // Phase 3a: desired edges from plain reference fields, deduplicated
        // so a diamond-shaped graph wants each edge once.
        let mut desired_plain: Vec<(EndpointRef, String, EndpointRef)> = Vec::new();
        let mut seen_edges: HashSet<(EndpointRef, String, EndpointRef)> = HashSet::new();
        for &handle in &nodes {
            let object = self.object(graph, handle)?;
            let self_ref = *refs.get(&handle).ok_or(MappingError::DanglingReference)?;
            for descriptor in self.provider.relationship_fields(object.type_key())? {
                if descriptor.relationship_entity {
                    continue; // the edge comes from the entity itself below
                }
                for &target in object.related(&descriptor.field) {
                    let target_ref = *refs.get(&target).ok_or(MappingError::DanglingReference)?;
                    let (start, end) = match descriptor.direction {
                        Direction::Outgoing => (self_ref, target_ref),
                        Direction::Incoming => (target_ref, self_ref),
                    };
                    let edge = (start, descriptor.rel_type.clone(), end);
                    if seen_edges.insert(edge.clone()) {
                        desired_plain.push(edge);
                    }
                }
            }
        }

        // Phase 3b: relationship entities. Each distinct instance produces
        // at most one edge operation, however many endpoints reference it.
        let mut relationship_statements = Vec::new();
        for &handle in &relationship_entities {
            let object = self.object(graph, handle)?;
            let rel_type = self.provider.class_name(object.type_key())?.to_string();
            let props = persistable_properties(self.provider, self.converters, object)?;
            let (start_handle, end_handle) = self.endpoints(graph, object)?;
            let start = *refs
                .get(&start_handle)
                .ok_or(MappingError::DanglingReference)?;
            let end = *refs
                .get(&end_handle)
                .ok_or(MappingError::DanglingReference)?;
            match context.identifier_of(handle) {
                None => {
                    let pending = PendingId(next_pending);
                    next_pending += 1;
                    relationship_statements.push(emit::create_relationship_entity(
                        &rel_type,
                        start.param(),
                        end.param(),
                        &props,
                        pending,
                    ));
                    save.created_relationship_entities.push((pending, handle));
                    save.remembered.push((handle, fingerprint(&props)));
                    save.added.push(PendingRelationship {
                        start,
                        rel_type,
                        end,
                        entity: Some(EndpointRef::Pending(pending)),
                    });
                }
                Some(id) => {
                    if !context.memo().remembered(handle, &props) {
                        relationship_statements.push(emit::update_relationship_entity(id, &props));
                        save.remembered.push((handle, fingerprint(&props)));
                    }
                }
            }
        }

        // Phase 4: reconcile plain reference fields against recorded state.
        // An edge recorded before but desired by no traversed endpoint is
        // deleted. Relationship-entity edges are exempt: the instance may
        // still be referenced from an endpoint outside this traversal, so
        // those edges only die through an explicit delete.
        let visited_ids: HashMap<EntityId, EntityHandle> = nodes
            .iter()
            .filter_map(|&handle| context.identifier_of(handle).map(|id| (id, handle)))
            .collect();
        let desired_triples: HashSet<(EntityId, &str, EntityId)> = desired_plain
            .iter()
            .filter_map(|(start, rel_type, end)| match (start, end) {
                (EndpointRef::Id(s), EndpointRef::Id(e)) => Some((*s, rel_type.as_str(), *e)),
                _ => None,
            })
            .collect();

        let mut removals = Vec::new();
        for record in context.relationship_records() {
            if record.entity.is_some() {
                continue;
            }
            if !self.reconciles(graph, &visited_ids, record)? {
                continue;
            }
            if !desired_triples.contains(&(record.start, record.rel_type.as_str(), record.end)) {
                removals.push(record.clone());
            }
        }

        // Phase 5: assemble. Node operations first, so every endpoint a
        // relationship operation references already has an identifier or a
        // placeholder; then deletions, then creations.
        save.bundle.extend(node_statements);
        for record in &removals {
            save.bundle
                .push(emit::delete_relationship(&record.rel_type, record.start, record.end));
        }
        save.removed = removals;
        for (start, rel_type, end) in &desired_plain {
            if let (EndpointRef::Id(s), EndpointRef::Id(e)) = (start, end) {
                let existing = RelationshipRecord {
                    start: *s,
                    rel_type: rel_type.clone(),
                    end: *e,
                    entity: None,
                };
                if context.has_relationship(&existing) {
                    continue;
                }
            }
            save.bundle
                .push(emit::create_relationship(rel_type, start.param(), end.param()));
            save.added.push(PendingRelationship {
                start: *start,
                rel_type: rel_type.clone(),
                end: *end,
                entity: None,
            });
        }
        save.bundle.extend(relationship_statements);

        tracing::debug!(
            entities = nodes.len() + relationship_entities.len(),
            statements = save.bundle.len(),
            "compiled save"
        );
        Ok(save)
    }

    /// Compile an explicit delete of a tracked entity. Traversal never
    /// deletes entities; this is the only way an entity or a
    /// relationship-entity edge leaves the store.
    pub fn compile_delete(
        &self,
        graph: &ObjectGraph,
        context: &mut MappingContext,
        root: EntityHandle,
    ) -> Result<CompiledDelete, MappingError> {
        let object = self.object(graph, root)?;
        let id = context.identifier_of(root).ok_or(MappingError::NotTracked)?;

        let mut bundle = StatementBundle::new();
        let mut forgotten = vec![root];
        let mut removed = Vec::new();

        if self.provider.is_relationship_entity(object.type_key()) {
            bundle.push(emit::delete_relationship_entity(id));
            for record in context.relationship_records() {
                if record.entity == Some(id) {
                    removed.push(record.clone());
                }
            }
        } else {
            if self.options.cascade_orphaned_relationship_entities {
                for record in context.relationship_records() {
                    if record.start != id && record.end != id {
                        continue;
                    }
                    if let Some(edge_id) = record.entity {
                        bundle.push(emit::delete_relationship_entity(edge_id));
                        if let Some(handle) = context.handle_for(edge_id) {
                            forgotten.push(handle);
                        }
                    }
                }
            }
            bundle.push(emit::delete_node(id, self.options.detach_delete));
            for record in context.relationship_records() {
                if record.start == id || record.end == id {
                    removed.push(record.clone());
                }
            }
        }

        tracing::debug!(statements = bundle.len(), %id, "compiled delete");
        Ok(CompiledDelete {
            bundle,
            forgotten,
            removed,
        })
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn object<'g>(
        &self,
        graph: &'g ObjectGraph,
        handle: EntityHandle,
    ) -> Result<&'g DomainObject, MappingError> {
        graph.get(handle).ok_or(MappingError::DanglingReference)
    }

    /// Every slot on a node object must be a declared relationship field,
    /// and each target's kind must match the field's declaration.
    fn check_relationship_slots(
        &self,
        graph: &ObjectGraph,
        object: &DomainObject,
    ) -> Result<(), MappingError> {
        let entity = self.provider.class_name(object.type_key())?.to_string();
        let fields = self.provider.relationship_fields(object.type_key())?;
        for slot in object.related_fields() {
            if !fields.iter().any(|d| d.field == slot) {
                return Err(MappingError::UnclassifiedField {
                    entity,
                    field: slot.to_string(),
                });
            }
        }
        for descriptor in fields {
            for &target in object.related(&descriptor.field) {
                let target_object = self.object(graph, target)?;
                let target_is_entity = self
                    .provider
                    .is_relationship_entity(target_object.type_key());
                if target_is_entity != descriptor.relationship_entity {
                    return Err(MappingError::UnclassifiedField {
                        entity,
                        field: descriptor.field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve and validate a relationship entity's two endpoint slots.
    fn endpoints(
        &self,
        graph: &ObjectGraph,
        object: &DomainObject,
    ) -> Result<(EntityHandle, EntityHandle), MappingError> {
        let entity = self.provider.class_name(object.type_key())?.to_string();
        let endpoints = self
            .provider
            .endpoint_fields(object.type_key())?
            .ok_or_else(|| MappingError::MissingEndpoint {
                entity: entity.clone(),
                endpoint: "start",
            })?;

        for slot in object.related_fields() {
            if slot != endpoints.start && slot != endpoints.end {
                return Err(MappingError::UnclassifiedField {
                    entity,
                    field: slot.to_string(),
                });
            }
        }

        let start = object.related(&endpoints.start).first().copied().ok_or_else(|| {
            MappingError::MissingEndpoint {
                entity: entity.clone(),
                endpoint: "start",
            }
        })?;
        let end = object.related(&endpoints.end).first().copied().ok_or_else(|| {
            MappingError::MissingEndpoint {
                entity: entity.clone(),
                endpoint: "end",
            }
        })?;

        // Endpoints anchor the edge, so both must be node types.
        for handle in [start, end] {
            let endpoint_object = self.object(graph, handle)?;
            if self
                .provider
                .is_relationship_entity(endpoint_object.type_key())
            {
                return Err(MappingError::UnclassifiedField {
                    entity: entity.clone(),
                    field: endpoints.start.clone(),
                });
            }
        }
        Ok((start, end))
    }

    /// Whether a recorded edge is subject to reconciliation in this pass:
    /// a traversed endpoint must declare a matching plain reference field.
    fn reconciles(
        &self,
        graph: &ObjectGraph,
        visited_ids: &HashMap<EntityId, EntityHandle>,
        record: &RelationshipRecord,
    ) -> Result<bool, MappingError> {
        if let Some(&handle) = visited_ids.get(&record.start) {
            if self.declares_reference(graph, handle, &record.rel_type, Direction::Outgoing)? {
                return Ok(true);
            }
        }
        if let Some(&handle) = visited_ids.get(&record.end) {
            if self.declares_reference(graph, handle, &record.rel_type, Direction::Incoming)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn declares_reference(
        &self,
        graph: &ObjectGraph,
        handle: EntityHandle,
        rel_type: &str,
        direction: Direction,
    ) -> Result<bool, MappingError> {
        let object = self.object(graph, handle)?;
        Ok(self
            .provider
            .relationship_fields(object.type_key())?
            .iter()
            .any(|d| !d.relationship_entity && d.rel_type == rel_type && d.direction == direction))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use trellis_core::{Direction, DomainObject, ObjectGraph, Value};
    use trellis_schema::{AttributeConverter, ConverterRegistry, EntitySchema, SchemaRegistry};
    use trellis_session::MappingContext;

    use super::*;

    fn provider() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                "Person",
                EntitySchema::node("Person")
                    .property("name")
                    .reference("works_on", "WORKS_ON", Direction::Outgoing)
                    .reference("knows", "KNOWS", Direction::Outgoing)
                    .entity_reference("contributions", "CONTRIBUTED", Direction::Outgoing),
            )
            .with(
                "Project",
                EntitySchema::node("Project")
                    .property("title")
                    .reference("staff", "WORKS_ON", Direction::Incoming)
                    .entity_reference("contributions", "CONTRIBUTED", Direction::Incoming),
            )
            .with(
                "Contribution",
                EntitySchema::relationship("CONTRIBUTED", "contributor", "project")
                    .property("role"),
            )
    }

    fn person(graph: &mut ObjectGraph, name: &str) -> EntityHandle {
        let mut object = DomainObject::new("Person");
        object.set_property("name", name);
        graph.add(object)
    }

    fn project(graph: &mut ObjectGraph, title: &str) -> EntityHandle {
        let mut object = DomainObject::new("Project");
        object.set_property("title", title);
        graph.add(object)
    }

    fn contribution(
        graph: &mut ObjectGraph,
        role: &str,
        contributor: EntityHandle,
        project: EntityHandle,
    ) -> EntityHandle {
        let mut object = DomainObject::new("Contribution");
        object.set_property("role", role);
        object.add_related("contributor", contributor);
        object.add_related("project", project);
        graph.add(object)
    }

    /// Compile, pretend to execute, and commit: every `creates`
    /// placeholder gets the next identifier from the counter.
    fn save(
        compiler: &GraphCompiler<'_>,
        graph: &ObjectGraph,
        context: &mut MappingContext,
        roots: &[EntityHandle],
        next_id: &mut i64,
    ) -> CompiledSave {
        let compiled = compiler.compile_save(graph, context, roots).unwrap();
        let mut created = HashMap::new();
        for statement in &compiled.bundle {
            if let Some(pending) = statement.creates {
                created.insert(pending, EntityId(*next_id));
                *next_id += 1;
            }
        }
        compiled.commit(context, &created).unwrap();
        compiled
    }

    #[test]
    fn new_root_and_target_created_before_their_relationship() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let engine = project(&mut graph, "Engine");
        graph.get_mut(ada).unwrap().add_related("works_on", engine);

        let mut context = MappingContext::new();
        let compiled = compiler.compile_save(&graph, &mut context, &[ada]).unwrap();
        let statements = compiled.bundle.statements();

        assert_eq!(statements.len(), 3);
        assert!(statements[0].text.starts_with("CREATE (n:Person)"));
        assert!(statements[1].text.starts_with("CREATE (n:Project)"));
        assert!(statements[2].text.contains("MERGE (a)-[r:WORKS_ON]->(b)"));
        assert_eq!(
            statements[2].params.get("start"),
            Some(&Param::Pending(PendingId(0)))
        );
        assert_eq!(
            statements[2].params.get("end"),
            Some(&Param::Pending(PendingId(1)))
        );
        assert_eq!(
            statements[0].params.get("name"),
            Some(&Param::Value(Value::from("Ada")))
        );
    }

    #[test]
    fn committed_graph_recompiles_to_empty_bundle() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let engine = project(&mut graph, "Engine");
        graph.get_mut(ada).unwrap().add_related("works_on", engine);

        let mut context = MappingContext::new();
        let mut next_id = 1;
        save(&compiler, &graph, &mut context, &[ada], &mut next_id);

        let again = compiler.compile_save(&graph, &mut context, &[ada]).unwrap();
        assert!(again.bundle.is_empty());
    }

    #[test]
    fn property_change_emits_one_full_set_update() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let mut context = MappingContext::new();
        let mut next_id = 1;
        save(&compiler, &graph, &mut context, &[ada], &mut next_id);

        graph.get_mut(ada).unwrap().set_property("name", "Lovelace");
        let compiled = compiler.compile_save(&graph, &mut context, &[ada]).unwrap();
        let statements = compiled.bundle.statements();

        assert_eq!(statements.len(), 1);
        assert!(statements[0].text.starts_with("MATCH (n) WHERE id(n) = $id SET"));
        assert_eq!(statements[0].params.get("id"), Some(&Param::Id(EntityId(1))));
        assert_eq!(
            statements[0].params.get("name"),
            Some(&Param::Value(Value::from("Lovelace")))
        );
    }

    #[test]
    fn reference_cycle_compiles_finitely_visiting_each_entity_once() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let grace = person(&mut graph, "Grace");
        graph.get_mut(ada).unwrap().add_related("knows", grace);
        graph.get_mut(grace).unwrap().add_related("knows", ada);

        let mut context = MappingContext::new();
        let compiled = compiler.compile_save(&graph, &mut context, &[ada]).unwrap();

        // Two creates, two relationship creates, nothing else.
        assert_eq!(compiled.bundle.len(), 4);
        let creates = compiled
            .bundle
            .statements()
            .iter()
            .filter(|s| s.creates.is_some())
            .count();
        assert_eq!(creates, 2);
    }

    #[test]
    fn diamond_reachable_entity_is_compiled_once() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let root = person(&mut graph, "root");
        let left = person(&mut graph, "left");
        let right = person(&mut graph, "right");
        let shared = person(&mut graph, "shared");
        graph.get_mut(root).unwrap().add_related("knows", left);
        graph.get_mut(root).unwrap().add_related("knows", right);
        graph.get_mut(left).unwrap().add_related("knows", shared);
        graph.get_mut(right).unwrap().add_related("knows", shared);

        let mut context = MappingContext::new();
        let compiled = compiler.compile_save(&graph, &mut context, &[root]).unwrap();

        let creates = compiled
            .bundle
            .statements()
            .iter()
            .filter(|s| s.text.starts_with("CREATE (n:"))
            .count();
        assert_eq!(creates, 4); // `shared` exactly once
        assert_eq!(compiled.bundle.len(), 8); // plus the four edges
    }

    #[test]
    fn partially_mapped_relationship_entity_emits_one_edge_with_properties() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let engine = project(&mut graph, "Engine");
        // Referenced from the contributor side only.
        let lead = contribution(&mut graph, "Lead", ada, engine);
        graph.get_mut(ada).unwrap().add_related("contributions", lead);

        let mut context = MappingContext::new();
        let compiled = compiler.compile_save(&graph, &mut context, &[ada]).unwrap();
        let statements = compiled.bundle.statements();

        assert_eq!(statements.len(), 3);
        assert!(statements[0].text.starts_with("CREATE (n:Person)"));
        assert!(statements[1].text.starts_with("CREATE (n:Project)"));
        assert!(statements[2].text.contains("CREATE (a)-[r:CONTRIBUTED]->(b)"));
        assert!(statements[2].text.contains("SET r.role = $role"));
        assert_eq!(
            statements[2].params.get("role"),
            Some(&Param::Value(Value::from("Lead")))
        );
        assert!(statements[2].creates.is_some());
    }

    #[test]
    fn relationship_entity_referenced_from_both_ends_stays_deduplicated() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let engine = project(&mut graph, "Engine");
        let lead = contribution(&mut graph, "Lead", ada, engine);
        graph.get_mut(ada).unwrap().add_related("contributions", lead);

        let mut context = MappingContext::new();
        let mut next_id = 1;
        save(&compiler, &graph, &mut context, &[ada], &mut next_id);

        // A later edit wires the other endpoint to the same instance.
        graph.get_mut(engine).unwrap().add_related("contributions", lead);
        let compiled = compiler
            .compile_save(&graph, &mut context, &[ada, engine])
            .unwrap();
        assert!(compiled.bundle.is_empty());
    }

    #[test]
    fn relationship_entity_missing_an_endpoint_fails_cleanly() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let mut dangling = DomainObject::new("Contribution");
        dangling.set_property("role", "Lead");
        dangling.add_related("contributor", ada);
        // no `project` endpoint
        let dangling = graph.add(dangling);
        graph
            .get_mut(ada)
            .unwrap()
            .add_related("contributions", dangling);

        let mut context = MappingContext::new();
        let err = compiler
            .compile_save(&graph, &mut context, &[ada])
            .unwrap_err();
        assert!(matches!(
            err,
            MappingError::MissingEndpoint { entity, endpoint }
                if entity == "CONTRIBUTED" && endpoint == "end"
        ));
        // The failed compile left no tracking residue.
        assert!(!context.is_tracked(ada));
    }

    #[test]
    fn removed_reference_compiles_to_a_single_relationship_delete() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let engine = project(&mut graph, "Engine");
        graph.get_mut(ada).unwrap().add_related("works_on", engine);

        let mut context = MappingContext::new();
        let mut next_id = 1;
        save(&compiler, &graph, &mut context, &[ada], &mut next_id);

        graph.get_mut(ada).unwrap().remove_related("works_on", engine);
        let compiled = compiler.compile_save(&graph, &mut context, &[ada]).unwrap();
        let statements = compiled.bundle.statements();

        assert_eq!(statements.len(), 1);
        assert!(statements[0].text.contains("MATCH (a)-[r:WORKS_ON]->(b)"));
        assert!(statements[0].text.ends_with("DELETE r"));
        // The endpoints themselves survive.
        assert!(!statements[0].text.contains("DELETE n"));

        compiled.commit(&mut context, &HashMap::new()).unwrap();
        let again = compiler.compile_save(&graph, &mut context, &[ada]).unwrap();
        assert!(again.bundle.is_empty());
    }

    #[test]
    fn dropped_relationship_entity_reference_does_not_delete_the_edge() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let engine = project(&mut graph, "Engine");
        let lead = contribution(&mut graph, "Lead", ada, engine);
        graph.get_mut(ada).unwrap().add_related("contributions", lead);

        let mut context = MappingContext::new();
        let mut next_id = 1;
        save(&compiler, &graph, &mut context, &[ada], &mut next_id);

        // The edge may still be reachable from the project side, so
        // dropping one reference must not delete it.
        graph
            .get_mut(ada)
            .unwrap()
            .remove_related("contributions", lead);
        let compiled = compiler.compile_save(&graph, &mut context, &[ada]).unwrap();
        assert!(compiled.bundle.is_empty());
    }

    #[test]
    fn explicit_delete_detaches_the_node_and_forgets_it() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let mut context = MappingContext::new();
        let mut next_id = 1;
        save(&compiler, &graph, &mut context, &[ada], &mut next_id);

        let compiled = compiler.compile_delete(&graph, &mut context, ada).unwrap();
        let statements = compiled.bundle.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].text,
            "MATCH (n) WHERE id(n) = $id DETACH DELETE n"
        );

        compiled.commit(&mut context);
        assert!(!context.is_tracked(ada));
    }

    #[test]
    fn delete_of_untracked_entity_is_rejected() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let mut context = MappingContext::new();

        let err = compiler
            .compile_delete(&graph, &mut context, ada)
            .unwrap_err();
        assert!(matches!(err, MappingError::NotTracked));
    }

    #[test]
    fn cascade_option_extends_delete_to_relationship_entity_edges() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let options = CompilerOptions {
            cascade_orphaned_relationship_entities: true,
            ..CompilerOptions::default()
        };
        let compiler = GraphCompiler::with_options(&provider, &converters, options);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let engine = project(&mut graph, "Engine");
        let lead = contribution(&mut graph, "Lead", ada, engine);
        graph.get_mut(ada).unwrap().add_related("contributions", lead);

        let mut context = MappingContext::new();
        let mut next_id = 1;
        save(&compiler, &graph, &mut context, &[ada], &mut next_id);

        let compiled = compiler.compile_delete(&graph, &mut context, ada).unwrap();
        let statements = compiled.bundle.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].text, "MATCH ()-[r]->() WHERE id(r) = $id DELETE r");
        assert!(statements[1].text.ends_with("DETACH DELETE n"));

        compiled.commit(&mut context);
        assert!(!context.is_tracked(ada));
        assert!(!context.is_tracked(lead));
        assert_eq!(context.relationship_records().count(), 0);
    }

    #[test]
    fn deleting_a_relationship_entity_deletes_only_its_edge() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let engine = project(&mut graph, "Engine");
        let lead = contribution(&mut graph, "Lead", ada, engine);
        graph.get_mut(ada).unwrap().add_related("contributions", lead);

        let mut context = MappingContext::new();
        let mut next_id = 1;
        save(&compiler, &graph, &mut context, &[ada], &mut next_id);

        let compiled = compiler.compile_delete(&graph, &mut context, lead).unwrap();
        let statements = compiled.bundle.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].text, "MATCH ()-[r]->() WHERE id(r) = $id DELETE r");

        compiled.commit(&mut context);
        assert!(!context.is_tracked(lead));
        assert!(context.is_tracked(ada));
        assert_eq!(context.relationship_records().count(), 0);
    }

    #[test]
    fn incoming_reference_orients_the_edge_toward_its_owner() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let engine = project(&mut graph, "Engine");
        let ada = person(&mut graph, "Ada");
        graph.get_mut(engine).unwrap().add_related("staff", ada);

        let mut context = MappingContext::new();
        let compiled = compiler.compile_save(&graph, &mut context, &[engine]).unwrap();
        let statements = compiled.bundle.statements();

        assert_eq!(statements.len(), 3);
        // Project was visited first (pending 0), but the edge starts at
        // the person: (ada)-[:WORKS_ON]->(engine).
        assert_eq!(
            statements[2].params.get("start"),
            Some(&Param::Pending(PendingId(1)))
        );
        assert_eq!(
            statements[2].params.get("end"),
            Some(&Param::Pending(PendingId(0)))
        );
    }

    #[test]
    fn failed_conversion_names_the_entity_and_field_and_leaves_no_residue() {
        struct Boom;
        impl AttributeConverter for Boom {
            fn to_persisted(&self, _: &Value) -> anyhow::Result<Value> {
                anyhow::bail!("boom")
            }
            fn from_persisted(&self, _: &Value) -> anyhow::Result<Value> {
                anyhow::bail!("boom")
            }
        }

        let provider = provider();
        let converters = ConverterRegistry::new().with("Person", "name", Arc::new(Boom));
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let mut context = MappingContext::new();

        let err = compiler
            .compile_save(&graph, &mut context, &[ada])
            .unwrap_err();
        assert!(matches!(
            err,
            MappingError::Conversion { entity, field, .. }
                if entity == "Person" && field == "name"
        ));
        assert!(!context.is_tracked(ada));
    }

    #[test]
    fn undeclared_relationship_slot_fails_classification() {
        let provider = provider();
        let converters = ConverterRegistry::new();
        let compiler = GraphCompiler::new(&provider, &converters);

        let mut graph = ObjectGraph::new();
        let ada = person(&mut graph, "Ada");
        let engine = project(&mut graph, "Engine");
        graph.get_mut(ada).unwrap().add_related("sponsors", engine);

        let mut context = MappingContext::new();
        let err = compiler
            .compile_save(&graph, &mut context, &[ada])
            .unwrap_err();
        assert!(matches!(
            err,
            MappingError::UnclassifiedField { entity, field }
                if entity == "Person" && field == "sponsors"
        ));
    }
}
