//! The [`World`] holds everything a [`Manager`](crate::manager::Manager)
//! owns besides its systems: the entity registry, the primary component map,
//! and the secondary component indices.
//!
//! Systems receive `&World` in lifecycle hooks and `&mut World` during
//! updates. Through either they can read everything and write component state
//! and entity metadata, but only the manager can add or delete entities and
//! components, because only the manager fires lifecycle hooks.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentKind, ComponentMut, ComponentType};
use crate::entity::{EntityRecord, EntityRegistry};
use crate::identifier::Identifier;
use crate::index::Index;

// ---------------------------------------------------------------------------
// RegistryId
// ---------------------------------------------------------------------------

/// Process-unique identity of a registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryId(u64);

impl RegistryId {
    /// Allocate a fresh id. Ids are never reused within a process.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegistryId({})", self.0)
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Entity and component storage of one registry.
///
/// Invariants, upheld by the crate-private mutators:
///
/// - every component in `components` is listed in exactly one `by_type`
///   bucket, keyed by its entity, and in `by_entity` under its entity;
/// - every entity referenced by a component is live;
/// - no `by_type` bucket is empty.
#[derive(Debug)]
pub struct World {
    id: RegistryId,
    entities: EntityRegistry,
    /// Component id -> component.
    components: HashMap<Identifier, Component>,
    /// Kind -> (entity -> component id).
    by_type: HashMap<ComponentType, HashMap<Identifier, Identifier>>,
    /// Entity -> component ids.
    by_entity: Index<Identifier, Identifier>,
}

impl World {
    pub(crate) fn new(id: RegistryId, default_entity_name: &str) -> Self {
        Self {
            id,
            entities: EntityRegistry::new(default_entity_name),
            components: HashMap::new(),
            by_type: HashMap::new(),
            by_entity: Index::new(),
        }
    }

    /// The identity components must carry to be inserted here.
    pub fn id(&self) -> RegistryId {
        self.id
    }

    // -- entities -----------------------------------------------------------

    /// Entity records and their name/tag indices.
    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Mutable access to entity metadata (names and tags).
    pub fn entities_mut(&mut self) -> &mut EntityRegistry {
        &mut self.entities
    }

    /// Whether `entity` is live.
    pub fn has_entity(&self, entity: &str) -> bool {
        self.entities.contains(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn insert_entity(&mut self, entity: Identifier) -> bool {
        self.entities.insert(entity)
    }

    /// Drop an entity record. Its components must already be gone.
    pub(crate) fn remove_entity(&mut self, entity: &str) -> Option<EntityRecord> {
        debug_assert!(
            !self.by_entity.contains_key(entity),
            "entity '{entity}' removed while it still owns components"
        );
        self.entities.remove(entity)
    }

    // -- components ---------------------------------------------------------

    /// Number of live components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Whether a component with this identifier is live.
    pub fn has_component(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    /// Component by identifier.
    pub fn component(&self, component: &str) -> Option<&Component> {
        self.components.get(component)
    }

    /// State write access to a component by identifier.
    pub fn component_mut(&mut self, component: &str) -> Option<ComponentMut<'_>> {
        self.components.get_mut(component).map(ComponentMut::new)
    }

    /// Identifier of the `kind` component on `entity`.
    pub fn component_id_of(&self, entity: &str, kind: ComponentType) -> Option<&Identifier> {
        self.by_type.get(&kind)?.get(entity)
    }

    /// Whether `entity` has a component of `kind`.
    pub fn has_component_of_type(&self, entity: &str, kind: ComponentType) -> bool {
        self.component_id_of(entity, kind).is_some()
    }

    /// The `kind` component on `entity`.
    pub fn component_of_type(&self, entity: &str, kind: ComponentType) -> Option<&Component> {
        let id = self.component_id_of(entity, kind)?;
        self.components.get(id)
    }

    /// State write access to the `kind` component on `entity`.
    pub fn component_of_type_mut(
        &mut self,
        entity: &str,
        kind: ComponentType,
    ) -> Option<ComponentMut<'_>> {
        let id = self.by_type.get(&kind)?.get(entity)?;
        self.components.get_mut(id).map(ComponentMut::new)
    }

    /// The `K` component on `entity`.
    pub fn component_of<K: ComponentKind>(&self, entity: &str) -> Option<&Component> {
        self.component_of_type(entity, ComponentType::of::<K>())
    }

    /// State write access to the `K` component on `entity`.
    pub fn component_of_mut<K: ComponentKind>(&mut self, entity: &str) -> Option<ComponentMut<'_>> {
        self.component_of_type_mut(entity, ComponentType::of::<K>())
    }

    /// State of the `K` component on `entity`.
    pub fn state_of<K: ComponentKind>(&self, entity: &str) -> Option<&K::State> {
        self.component_of::<K>(entity)?.state::<K>()
    }

    /// Every component attached to `entity`.
    pub fn components_of<'a>(&'a self, entity: &str) -> impl Iterator<Item = &'a Component> + 'a {
        self.by_entity
            .values(entity)
            .filter_map(|id| self.components.get(id.as_str()))
    }

    /// Every live component of `kind`, in no particular order.
    pub fn components_of_type(&self, kind: ComponentType) -> impl Iterator<Item = &Component> + '_ {
        self.by_type
            .get(&kind)
            .into_iter()
            .flat_map(|bucket| bucket.values())
            .filter_map(|id| self.components.get(id))
    }

    /// Kinds with at least one live component.
    pub fn component_types(&self) -> impl Iterator<Item = ComponentType> + '_ {
        self.by_type.keys().copied()
    }

    /// Insert a validated component. The caller has checked ownership, id
    /// uniqueness, entity liveness, and evicted any same-kind component.
    pub(crate) fn insert_component(&mut self, component: Component) {
        let id = component.id().clone();
        let entity = component.entity().clone();
        let previous = self
            .by_type
            .entry(component.kind())
            .or_default()
            .insert(entity.clone(), id.clone());
        debug_assert!(previous.is_none(), "same-kind component was not evicted");
        self.by_entity.add(entity, id.clone());
        self.components.insert(id, component);
    }

    /// Remove a component from the primary map and both indices.
    pub(crate) fn remove_component(&mut self, component: &str) -> Option<Component> {
        let removed = self.components.remove(component)?;
        let kind = removed.kind();
        if let Some(bucket) = self.by_type.get_mut(&kind) {
            bucket.remove(removed.entity().as_str());
            if bucket.is_empty() {
                self.by_type.remove(&kind);
            }
        }
        self.by_entity.delete(removed.entity().as_str(), component);
        Some(removed)
    }

    /// Identifiers of every component on `entity`, detached from the borrow.
    pub(crate) fn component_ids_of(&self, entity: &str) -> Vec<Identifier> {
        self.by_entity.values(entity).cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::DEFAULT_ENTITY_NAME;

    struct Mesh;

    impl ComponentKind for Mesh {
        type State = String;
        const NAME: &'static str = "mesh";

        fn initialize() -> String {
            "cube".to_owned()
        }
    }

    struct Light;

    impl ComponentKind for Light {
        type State = f32;
        const NAME: &'static str = "light";

        fn initialize() -> f32 {
            1.0
        }
    }

    fn world_with_entity() -> World {
        let mut world = World::new(RegistryId::next(), DEFAULT_ENTITY_NAME);
        assert!(world.insert_entity(Identifier::from("e1")));
        world
    }

    #[test]
    fn registry_ids_are_unique() {
        let a = RegistryId::next();
        let b = RegistryId::next();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), format!("registry#{}", a.get()));
    }

    #[test]
    fn insert_component_updates_all_indices() {
        let mut world = world_with_entity();
        let owner = world.id();
        world.insert_component(Component::new::<Mesh>(owner, "e1", "c1"));
        world.insert_component(Component::new::<Light>(owner, "e1", "c2"));

        assert_eq!(world.component_count(), 2);
        assert_eq!(world.component_of::<Mesh>("e1").unwrap().id().as_str(), "c1");
        assert_eq!(world.state_of::<Light>("e1"), Some(&1.0));
        assert_eq!(world.components_of("e1").count(), 2);
        assert_eq!(world.components_of_type(ComponentType::of::<Mesh>()).count(), 1);
    }

    #[test]
    fn remove_component_prunes_buckets() {
        let mut world = world_with_entity();
        let owner = world.id();
        world.insert_component(Component::new::<Mesh>(owner, "e1", "c1"));

        let removed = world.remove_component("c1").unwrap();
        assert_eq!(removed.kind(), ComponentType::of::<Mesh>());
        assert!(world.by_type.is_empty());
        assert!(world.by_entity.is_empty());
        assert_eq!(world.component_types().count(), 0);
        assert!(world.remove_component("c1").is_none());
    }

    #[test]
    fn typed_mutation_through_world() {
        let mut world = world_with_entity();
        let owner = world.id();
        world.insert_component(Component::new::<Mesh>(owner, "e1", "c1"));

        let mut mesh = world.component_of_mut::<Mesh>("e1").unwrap();
        mesh.set_state::<Mesh>("sphere".to_owned()).unwrap();

        assert_eq!(world.state_of::<Mesh>("e1").map(String::as_str), Some("sphere"));
        assert_eq!(world.component("c1").unwrap().version(), 1);
    }

    #[test]
    fn lookups_on_unknown_keys_are_none() {
        let world = world_with_entity();
        assert!(world.component("missing").is_none());
        assert!(world.component_of::<Mesh>("e1").is_none());
        assert!(world.component_of::<Mesh>("ghost").is_none());
        assert_eq!(world.components_of("ghost").count(), 0);
    }
}
