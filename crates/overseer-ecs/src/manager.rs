//! The [`Manager`]: the registry that owns entities, components and systems.
//!
//! Every structural mutation goes through the manager. It validates the
//! mutation against the registry's integrity rules, notifies every system with
//! a `will` hook, applies the change to the [`World`], and notifies every
//! system again with a `did` hook.
//!
//! # Example
//!
//! ```
//! use overseer_ecs::prelude::*;
//!
//! const CLOCK: ServiceKey<f64> = ServiceKey::new("clock");
//!
//! #[derive(Default)]
//! struct Clock {
//!     elapsed: f64,
//! }
//!
//! impl System for Clock {
//!     fn name(&self) -> &str {
//!         "clock"
//!     }
//!
//!     fn services(&self) -> Vec<ServiceId> {
//!         vec![CLOCK.id()]
//!     }
//!
//!     fn service(&self, service: ServiceId) -> Option<ServiceValue> {
//!         (service == CLOCK.id()).then(|| CLOCK.provide(self.elapsed))
//!     }
//!
//!     fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), EcsError> {
//!         self.elapsed += ctx.delta();
//!         Ok(())
//!     }
//! }
//!
//! let mut manager = Manager::new();
//! manager.add_system(Clock::default()).unwrap();
//! manager.update(0.5).unwrap();
//! manager.update(0.5).unwrap();
//! assert_eq!(*manager.service(&CLOCK).unwrap(), 1.0);
//! ```

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::{Command, CommandKind, Commands};
use crate::component::{Component, ComponentKind, ComponentMut, ComponentType};
use crate::entity::DEFAULT_ENTITY_NAME;
use crate::identifier::{IdGenerator, Identifier, RandomIdGenerator};
use crate::schedule::{PassDiagnostics, Systems};
use crate::system::{ServiceKey, System, SystemId};
use crate::world::{RegistryId, World};
use crate::EcsError;

// ---------------------------------------------------------------------------
// ManagerConfig
// ---------------------------------------------------------------------------

/// Construction-time settings of a [`Manager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Name given to entities that were never named.
    pub default_entity_name: String,
    /// How many generated identifiers to try before giving up on a collision
    /// streak. Must be positive.
    pub max_id_attempts: u32,
    /// Seed for the default identifier generator. `None` seeds from OS
    /// entropy.
    pub id_seed: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_entity_name: DEFAULT_ENTITY_NAME.to_owned(),
            max_id_attempts: 8,
            id_seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Entity/component registry with an attached system scheduler.
pub struct Manager {
    world: World,
    systems: Systems,
    commands: Commands,
    generator: Box<dyn IdGenerator>,
    config: ManagerConfig,
}

impl Manager {
    /// A manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// A manager using the default identifier generator, seeded from
    /// `config.id_seed` when set.
    ///
    /// # Panics
    ///
    /// If `config.max_id_attempts` is zero.
    pub fn with_config(config: ManagerConfig) -> Self {
        let generator = match config.id_seed {
            Some(seed) => RandomIdGenerator::seeded(seed),
            None => RandomIdGenerator::from_entropy(),
        };
        Self::from_parts(config, Box::new(generator))
    }

    /// A manager drawing identifiers from `generator`.
    ///
    /// # Panics
    ///
    /// If `config.max_id_attempts` is zero.
    pub fn with_generator(config: ManagerConfig, generator: impl IdGenerator + 'static) -> Self {
        Self::from_parts(config, Box::new(generator))
    }

    fn from_parts(config: ManagerConfig, generator: Box<dyn IdGenerator>) -> Self {
        assert!(config.max_id_attempts > 0, "max_id_attempts must be positive");
        let id = RegistryId::next();
        debug!(manager = %id, "manager created");
        Self {
            world: World::new(id, &config.default_entity_name),
            systems: Systems::new(),
            commands: Commands::new(),
            generator,
            config,
        }
    }

    /// This registry's identity. Components must be built with it.
    pub fn id(&self) -> RegistryId {
        self.world.id()
    }

    /// Read access to entities and components.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Write access to component state and entity metadata.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The attached systems.
    pub fn systems(&self) -> &Systems {
        &self.systems
    }

    /// Structural changes to apply after the next update pass.
    pub fn commands(&mut self) -> &mut Commands {
        &mut self.commands
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Diagnostics of the last update pass.
    pub fn last_diagnostics(&self) -> &PassDiagnostics {
        self.systems.last_diagnostics()
    }

    // -- entities -----------------------------------------------------------

    /// Insert an entity with default metadata.
    pub fn add_entity(&mut self, entity: impl Into<Identifier>) -> Result<(), EcsError> {
        self.insert_entity(entity.into(), None, Vec::new())
    }

    /// Insert an entity under a freshly generated identifier.
    pub fn create_entity(&mut self) -> Result<Identifier, EcsError> {
        let id = self.fresh_id(|world, id| world.has_entity(id))?;
        self.insert_entity(id.clone(), None, Vec::new())?;
        Ok(id)
    }

    pub fn has_entity(&self, entity: &str) -> bool {
        self.world.has_entity(entity)
    }

    /// Delete an entity and every component attached to it. Returns `false`
    /// if the entity is not live.
    pub fn delete_entity(&mut self, entity: &str) -> bool {
        let Some(id) = self.world.entities().record(entity).map(|r| r.id().clone()) else {
            return false;
        };

        self.systems
            .notify(|s| s.manager_will_delete_entity(&self.world, &id));
        let components = self.world.component_ids_of(&id);
        for component in &components {
            self.delete_component(component);
        }
        self.world.remove_entity(&id);
        self.systems
            .notify(|s| s.manager_did_delete_entity(&self.world, &id));

        debug!(
            manager = %self.world.id(),
            entity = %id,
            components = components.len(),
            "entity deleted"
        );
        true
    }

    fn insert_entity(
        &mut self,
        entity: Identifier,
        name: Option<String>,
        tags: Vec<String>,
    ) -> Result<(), EcsError> {
        if self.world.has_entity(&entity) {
            return Err(EcsError::DuplicatedEntity {
                manager: self.world.id(),
                entity,
            });
        }

        self.systems
            .notify(|s| s.manager_will_add_entity(&self.world, &entity));
        self.world.insert_entity(entity.clone());
        let entities = self.world.entities_mut();
        if let Some(name) = name {
            entities.set_name_of(&entity, name)?;
        }
        if !tags.is_empty() {
            entities.add_tags_to(&entity, tags)?;
        }
        self.systems
            .notify(|s| s.manager_did_add_entity(&self.world, &entity));

        debug!(manager = %self.world.id(), entity = %entity, "entity added");
        Ok(())
    }

    // -- components ---------------------------------------------------------

    /// Insert a component built for this manager.
    ///
    /// An existing component of the same kind on the same entity is deleted
    /// first, with the usual delete hooks.
    pub fn add_component(&mut self, component: Component) -> Result<(), EcsError> {
        let manager = self.world.id();
        if component.owner() != manager {
            return Err(EcsError::InvalidComponentManager {
                expected: manager,
                found: component.owner(),
                component: component.id().clone(),
            });
        }
        if self.world.has_component(component.id()) {
            return Err(EcsError::DuplicatedComponent {
                manager,
                component: component.id().clone(),
            });
        }
        if !self.world.has_entity(component.entity()) {
            return Err(EcsError::InvalidComponentEntity {
                manager,
                entity: component.entity().clone(),
                component: component.id().clone(),
            });
        }

        let existing = self
            .world
            .component_id_of(component.entity(), component.kind())
            .cloned();
        if let Some(existing) = existing {
            warn!(
                manager = %manager,
                entity = %component.entity(),
                kind = %component.kind(),
                evicted = %existing,
                replacement = %component.id(),
                "entity already has a component of this kind; evicting it"
            );
            self.delete_component(&existing);
        }

        self.systems
            .notify(|s| s.manager_will_add_component(&self.world, &component));
        let id = component.id().clone();
        debug!(
            manager = %manager,
            component = %id,
            kind = %component.kind(),
            entity = %component.entity(),
            "component added"
        );
        self.world.insert_component(component);
        if let Some(added) = self.world.component(&id) {
            self.systems
                .notify(|s| s.manager_did_add_component(&self.world, added));
        }
        Ok(())
    }

    /// Build a `K` component with its initial state on `entity`. Returns the
    /// new component's identifier.
    pub fn create_component<K: ComponentKind>(&mut self, entity: &str) -> Result<Identifier, EcsError> {
        self.insert_component::<K>(entity, K::initialize())
    }

    /// Build a `K` component with an explicit state on `entity`.
    pub fn insert_component<K: ComponentKind>(
        &mut self,
        entity: &str,
        state: K::State,
    ) -> Result<Identifier, EcsError> {
        self.insert_boxed(Identifier::from(entity), ComponentType::of::<K>(), Box::new(state))
    }

    fn insert_boxed(
        &mut self,
        entity: Identifier,
        kind: ComponentType,
        state: Box<dyn Any>,
    ) -> Result<Identifier, EcsError> {
        let id = self.fresh_id(|world, id| world.has_component(id))?;
        let component = Component::from_boxed(self.world.id(), entity, id.clone(), kind, state);
        self.add_component(component)?;
        Ok(id)
    }

    pub fn get_component(&self, component: &str) -> Option<&Component> {
        self.world.component(component)
    }

    /// State write access to a component. Identity fields stay read-only.
    pub fn get_component_mut(&mut self, component: &str) -> Option<ComponentMut<'_>> {
        self.world.component_mut(component)
    }

    /// The `K` component on `entity`.
    pub fn get_component_of<K: ComponentKind>(&self, entity: &str) -> Option<&Component> {
        self.world.component_of::<K>(entity)
    }

    /// The `kind` component on `entity`.
    pub fn get_component_by_type(&self, entity: &str, kind: ComponentType) -> Option<&Component> {
        self.world.component_of_type(entity, kind)
    }

    pub fn has_component(&self, component: &str) -> bool {
        self.world.has_component(component)
    }

    pub fn has_component_of<K: ComponentKind>(&self, entity: &str) -> bool {
        self.world.has_component_of_type(entity, ComponentType::of::<K>())
    }

    pub fn has_component_by_type(&self, entity: &str, kind: ComponentType) -> bool {
        self.world.has_component_of_type(entity, kind)
    }

    /// Delete a component by identifier. Returns `None` if it is not live.
    pub fn delete_component(&mut self, component: &str) -> Option<Component> {
        let target = self.world.component(component)?;
        self.systems
            .notify(|s| s.manager_will_delete_component(&self.world, target));
        let removed = self.world.remove_component(component)?;
        self.systems
            .notify(|s| s.manager_did_delete_component(&self.world, &removed));

        debug!(
            manager = %self.world.id(),
            component = %removed.id(),
            kind = %removed.kind(),
            entity = %removed.entity(),
            "component deleted"
        );
        Some(removed)
    }

    /// Delete the `K` component on `entity`.
    pub fn delete_component_of<K: ComponentKind>(&mut self, entity: &str) -> Option<Component> {
        self.delete_component_by_type(entity, ComponentType::of::<K>())
    }

    /// Delete the `kind` component on `entity`.
    pub fn delete_component_by_type(&mut self, entity: &str, kind: ComponentType) -> Option<Component> {
        let id = self.world.component_id_of(entity, kind)?.clone();
        self.delete_component(&id)
    }

    // -- systems ------------------------------------------------------------

    /// Attach a system after every system already attached.
    pub fn add_system<S: System>(&mut self, system: S) -> Result<SystemId, EcsError> {
        self.systems.add(Box::new(system), &self.world)
    }

    /// Detach a system and hand it back.
    pub fn delete_system(&mut self, id: SystemId) -> Result<Option<Box<dyn System>>, EcsError> {
        self.systems.remove(id, &self.world)
    }

    pub fn has_system(&self, id: SystemId) -> bool {
        self.systems.contains(id)
    }

    /// Current value of a service, read from its provider outside of a pass.
    pub fn service<T: Any>(&mut self, key: &ServiceKey<T>) -> Result<Rc<T>, EcsError> {
        let value = self.systems.current_service(key.id())?;
        key.downcast(value)
    }

    // -- update -------------------------------------------------------------

    /// Run one update pass.
    ///
    /// Fires `manager_will_update`, updates every system once, applies the
    /// commands queued during the pass, then fires `manager_did_update`. If
    /// the pass fails the queued commands are discarded and
    /// `manager_did_update` is not fired.
    pub fn update(&mut self, delta: f64) -> Result<(), EcsError> {
        self.systems
            .notify(|s| s.manager_will_update(&self.world, delta));

        if let Err(e) = self
            .systems
            .run_pass(&mut self.world, &mut self.commands, delta)
        {
            let discarded = self.commands.len();
            self.commands.clear();
            if discarded > 0 {
                warn!(discarded, error = %e, "update pass failed; discarding deferred commands");
            }
            return Err(e);
        }

        self.apply_commands()?;
        self.systems
            .notify(|s| s.manager_did_update(&self.world, delta));
        Ok(())
    }

    fn apply_commands(&mut self) -> Result<(), EcsError> {
        let queued = self.commands.take();
        let total = queued.len();
        for (applied, command) in queued.into_iter().enumerate() {
            let Command {
                kind,
                issued_by,
                index,
            } = command;
            if let Err(e) = self.apply_command(kind) {
                warn!(
                    command_index = index,
                    issued_by = ?issued_by,
                    discarded = total - applied - 1,
                    error = %e,
                    "deferred command failed; discarding the rest"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    fn apply_command(&mut self, kind: CommandKind) -> Result<(), EcsError> {
        match kind {
            CommandKind::AddEntity { entity, name, tags } => self.insert_entity(entity, name, tags),
            CommandKind::DeleteEntity { entity } => {
                self.delete_entity(&entity);
                Ok(())
            }
            CommandKind::CreateComponent {
                entity,
                kind,
                state,
            } => self.insert_boxed(entity, kind, state).map(drop),
            CommandKind::DeleteComponent { component } => {
                self.delete_component(&component);
                Ok(())
            }
            CommandKind::DeleteComponentOf { entity, kind } => {
                self.delete_component_by_type(&entity, kind);
                Ok(())
            }
        }
    }

    // -- internal helpers ---------------------------------------------------

    /// Draw identifiers until one is not `taken`.
    fn fresh_id(&mut self, taken: impl Fn(&World, &str) -> bool) -> Result<Identifier, EcsError> {
        let attempts = self.config.max_id_attempts;
        for _ in 0..attempts {
            let id = self.generator.next_id();
            if !taken(&self.world, id.as_str()) {
                return Ok(id);
            }
        }
        Err(EcsError::IdentifierExhausted { attempts })
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("id", &self.world.id())
            .field("entities", &self.world.entity_count())
            .field("components", &self.world.component_count())
            .field("systems", &self.systems)
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
