//! The system scheduler: ordered registration, update passes, and on-demand
//! service evaluation.
//!
//! Each [`Manager::update`](crate::manager::Manager::update) runs one pass:
//!
//! 1. Every system is marked [`SystemState::Dirty`] and service caches are
//!    cleared.
//! 2. Systems are visited in registration order. A dirty system becomes
//!    [`SystemState::Updating`], runs its `update`, then becomes
//!    [`SystemState::Updated`].
//! 3. While updating, a system may pull a service through
//!    [`UpdateContext::service`]. A dirty provider is updated first, right
//!    there on the call stack; an updated provider answers from its memoized
//!    value; a provider that is itself updating means the pull chain has come
//!    back around, and the pass aborts with
//!    [`EcsError::CircularServiceDependency`].
//!
//! The result is a lazy topological evaluation: registration order is only
//! the default traversal order, and each system still runs exactly once per
//! pass no matter how many times it is pulled.
//!
//! A system that is updating is lent out of its slot for the duration of its
//! `update`. The slot state carries the system box itself, so "updating" and
//! "not available" are the same fact.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::command::Commands;
use crate::system::{ServiceId, ServiceKey, ServiceValue, System, SystemId};
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// SystemState
// ---------------------------------------------------------------------------

/// Where a system is in the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemState {
    /// Not yet updated in this pass.
    Dirty,
    /// Its `update` is on the call stack.
    Updating,
    /// Done for this pass.
    Updated,
}

enum Slot {
    Dirty(Box<dyn System>),
    /// The system is lent to the running update.
    Updating,
    Updated(Box<dyn System>),
}

impl Slot {
    fn state(&self) -> SystemState {
        match self {
            Slot::Dirty(_) => SystemState::Dirty,
            Slot::Updating => SystemState::Updating,
            Slot::Updated(_) => SystemState::Updated,
        }
    }

    fn system(&self) -> Option<&dyn System> {
        match self {
            Slot::Dirty(system) | Slot::Updated(system) => Some(&**system),
            Slot::Updating => None,
        }
    }

    fn system_mut(&mut self) -> Option<&mut dyn System> {
        match self {
            Slot::Dirty(system) | Slot::Updated(system) => Some(&mut **system),
            Slot::Updating => None,
        }
    }

    fn into_system(self) -> Option<Box<dyn System>> {
        match self {
            Slot::Dirty(system) | Slot::Updated(system) => Some(system),
            Slot::Updating => None,
        }
    }
}

/// Registration record of one system.
struct Registered {
    id: SystemId,
    name: String,
    slot: Slot,
    services: Vec<ServiceId>,
    /// Service values handed out during the current pass.
    resolved: HashMap<ServiceId, ServiceValue>,
}

// ---------------------------------------------------------------------------
// PassDiagnostics
// ---------------------------------------------------------------------------

/// What happened during the last update pass.
#[derive(Debug, Clone, Default)]
pub struct PassDiagnostics {
    /// The pass delta.
    pub delta: f64,
    /// System names in the order their updates completed. Providers complete
    /// before the systems that pulled them.
    pub order: Vec<String>,
    /// Wall-clock time per system, in completion order. Includes the time
    /// spent updating providers it pulled.
    pub system_times: Vec<(String, Duration)>,
    /// Total time for the pass.
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Ordered set of systems plus the service provider table.
pub struct Systems {
    registered: Vec<Registered>,
    providers: HashMap<ServiceId, SystemId>,
    next_id: u32,
    updating: bool,
    delta: f64,
    /// Indices of the systems whose `update` is on the call stack, outermost
    /// first.
    stack: Vec<usize>,
    last_diagnostics: PassDiagnostics,
}

impl Systems {
    /// An empty scheduler.
    pub fn new() -> Self {
        Self {
            registered: Vec::new(),
            providers: HashMap::new(),
            next_id: 0,
            updating: false,
            delta: 0.0,
            stack: Vec::new(),
            last_diagnostics: PassDiagnostics::default(),
        }
    }

    /// Attach `system` after every already registered system and call its
    /// `initialize` hook.
    ///
    /// Fails if a pass is in progress or if one of its services already has a
    /// provider. Names may repeat. Nothing is registered on failure.
    pub fn add(&mut self, mut system: Box<dyn System>, world: &World) -> Result<SystemId, EcsError> {
        let name = system.name().to_owned();
        if self.updating {
            return Err(EcsError::MutationDuringPass {
                action: "add",
                system: name,
            });
        }

        let mut services = system.services();
        services.sort_unstable();
        services.dedup();
        for service in &services {
            if let Some(provider) = self.providers.get(service) {
                return Err(EcsError::DuplicatedService {
                    service: service.name(),
                    system: name,
                    provider: self.name(*provider).unwrap_or_default().to_owned(),
                });
            }
        }

        let id = SystemId(self.next_id);
        self.next_id += 1;
        for service in &services {
            self.providers.insert(*service, id);
        }
        system.initialize(world);
        debug!(system = %name, id = %id, services = ?services, "system added");
        self.registered.push(Registered {
            id,
            name,
            slot: Slot::Dirty(system),
            services,
            resolved: HashMap::new(),
        });
        Ok(id)
    }

    /// Detach a system, calling its `destroy` hook. Returns `None` if `id` is
    /// not registered.
    pub fn remove(&mut self, id: SystemId, world: &World) -> Result<Option<Box<dyn System>>, EcsError> {
        if self.updating {
            return Err(EcsError::MutationDuringPass {
                action: "delete",
                system: self.name(id).map_or_else(|| id.to_string(), str::to_owned),
            });
        }
        let Some(index) = self.index_of(id) else {
            return Ok(None);
        };

        let registered = self.registered.remove(index);
        self.providers.retain(|_, provider| *provider != id);
        let mut system = registered.slot.into_system();
        if let Some(system) = system.as_mut() {
            system.destroy(world);
        }
        debug!(system = %registered.name, id = %id, "system removed");
        Ok(system)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: SystemId) -> bool {
        self.index_of(id).is_some()
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// Whether no system is registered.
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Whether an update pass is in progress.
    pub fn is_updating(&self) -> bool {
        self.updating
    }

    /// Registered ids, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.registered.iter().map(|r| r.id)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.registered.iter().map(|r| r.name.as_str()).collect()
    }

    /// Name of `id`.
    pub fn name(&self, id: SystemId) -> Option<&str> {
        self.index_of(id).map(|i| self.registered[i].name.as_str())
    }

    /// Pass state of `id`.
    pub fn state(&self, id: SystemId) -> Option<SystemState> {
        self.index_of(id).map(|i| self.registered[i].slot.state())
    }

    /// Services declared by `id`.
    pub fn services_of(&self, id: SystemId) -> Option<&[ServiceId]> {
        self.index_of(id).map(|i| self.registered[i].services.as_slice())
    }

    /// The system providing `service`.
    pub fn provider(&self, service: ServiceId) -> Option<SystemId> {
        self.providers.get(&service).copied()
    }

    /// Diagnostics of the last pass.
    pub fn last_diagnostics(&self) -> &PassDiagnostics {
        &self.last_diagnostics
    }

    /// Deliver a lifecycle hook to every system, in registration order.
    pub(crate) fn notify(&mut self, mut hook: impl FnMut(&mut dyn System)) {
        for registered in &mut self.registered {
            if let Some(system) = registered.slot.system_mut() {
                hook(system);
            }
        }
    }

    /// Current value of `service` outside of a pass. Answers from the last
    /// pass's memoized value when there is one.
    pub(crate) fn current_service(&mut self, service: ServiceId) -> Result<ServiceValue, EcsError> {
        let index = self.provider_index(service)?;
        self.resolve(index, service)
    }

    // -- update pass ----------------------------------------------------------

    /// Run one pass. See the module docs for the evaluation order.
    pub(crate) fn run_pass(
        &mut self,
        world: &mut World,
        commands: &mut Commands,
        delta: f64,
    ) -> Result<(), EcsError> {
        let started = Instant::now();
        self.discard_lost_systems();

        self.updating = true;
        self.delta = delta;
        self.stack.clear();
        commands.set_issuer(None);
        self.last_diagnostics = PassDiagnostics {
            delta,
            ..PassDiagnostics::default()
        };
        for registered in &mut self.registered {
            registered.resolved.clear();
            let slot = std::mem::replace(&mut registered.slot, Slot::Updating);
            registered.slot = match slot {
                Slot::Updated(system) => Slot::Dirty(system),
                other => other,
            };
        }

        let result = (0..self.registered.len())
            .try_for_each(|index| self.ensure_updated(index, world, commands).map(drop));

        self.stack.clear();
        self.updating = false;
        self.last_diagnostics.total_time = started.elapsed();
        debug!(
            delta,
            systems = self.last_diagnostics.order.len(),
            elapsed = ?self.last_diagnostics.total_time,
            ok = result.is_ok(),
            "update pass finished"
        );
        result
    }

    /// Update the system at `index` if it is dirty.
    ///
    /// Returns `Ok(false)` if it is already updating, i.e. it is on the pull
    /// stack.
    fn ensure_updated(
        &mut self,
        index: usize,
        world: &mut World,
        commands: &mut Commands,
    ) -> Result<bool, EcsError> {
        let mut system = match std::mem::replace(&mut self.registered[index].slot, Slot::Updating) {
            Slot::Dirty(system) => system,
            Slot::Updating => return Ok(false),
            updated @ Slot::Updated(_) => {
                self.registered[index].slot = updated;
                return Ok(true);
            }
        };

        trace!(system = %self.registered[index].name, depth = self.stack.len(), "updating system");
        self.stack.push(index);
        let issuer = commands.set_issuer(Some(self.registered[index].id));
        let started = Instant::now();
        let result = {
            let mut ctx = UpdateContext {
                scheduler: &mut *self,
                world: &mut *world,
                commands: &mut *commands,
                current: index,
            };
            system.update(&mut ctx)
        };
        let elapsed = started.elapsed();
        commands.set_issuer(issuer);
        self.stack.pop();

        let registered = &mut self.registered[index];
        match result {
            Ok(()) => {
                registered.slot = Slot::Updated(system);
                self.last_diagnostics.order.push(registered.name.clone());
                self.last_diagnostics
                    .system_times
                    .push((registered.name.clone(), elapsed));
                Ok(true)
            }
            Err(e) => {
                registered.slot = Slot::Dirty(system);
                Err(e)
            }
        }
    }

    /// Resolve `service` for the running system, updating its provider first
    /// if needed.
    fn pull(
        &mut self,
        service: ServiceId,
        world: &mut World,
        commands: &mut Commands,
    ) -> Result<ServiceValue, EcsError> {
        let index = self.provider_index(service)?;
        if !self.ensure_updated(index, world, commands)? {
            let start = self.stack.iter().position(|&i| i == index).unwrap_or(0);
            let chain = self.stack[start..]
                .iter()
                .chain(std::iter::once(&index))
                .map(|&i| self.registered[i].name.clone())
                .collect();
            return Err(EcsError::CircularServiceDependency {
                service: service.name(),
                chain,
            });
        }
        self.resolve(index, service)
    }

    /// Memoized service value of the system at `index`.
    fn resolve(&mut self, index: usize, service: ServiceId) -> Result<ServiceValue, EcsError> {
        let registered = &mut self.registered[index];
        if let Some(value) = registered.resolved.get(&service) {
            return Ok(Rc::clone(value));
        }
        let value = registered
            .slot
            .system()
            .and_then(|system| system.service(service))
            .ok_or_else(|| EcsError::ServiceUnavailable {
                service: service.name(),
                provider: registered.name.clone(),
            })?;
        registered.resolved.insert(service, Rc::clone(&value));
        Ok(value)
    }

    fn provider_index(&self, service: ServiceId) -> Result<usize, EcsError> {
        self.providers
            .get(&service)
            .and_then(|&id| self.index_of(id))
            .ok_or(EcsError::UnknownService {
                service: service.name(),
            })
    }

    fn index_of(&self, id: SystemId) -> Option<usize> {
        self.registered.iter().position(|r| r.id == id)
    }

    /// Drop systems that were lent to an update that unwound. Their box went
    /// down with the panic.
    fn discard_lost_systems(&mut self) {
        let before = self.registered.len();
        self.registered.retain(|r| {
            let lost = matches!(r.slot, Slot::Updating);
            if lost {
                error!(system = %r.name, id = %r.id, "system lost to a panicking update; unregistering");
            }
            !lost
        });
        if self.registered.len() != before {
            let registered = &self.registered;
            self.providers
                .retain(|_, id| registered.iter().any(|r| r.id == *id));
        }
    }
}

impl Default for Systems {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Systems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Systems")
            .field(
                "registered",
                &self
                    .registered
                    .iter()
                    .map(|r| (r.id, r.name.as_str(), r.slot.state()))
                    .collect::<Vec<_>>(),
            )
            .field("providers", &self.providers)
            .field("updating", &self.updating)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// UpdateContext
// ---------------------------------------------------------------------------

/// What a system sees while it updates.
pub struct UpdateContext<'a> {
    scheduler: &'a mut Systems,
    world: &'a mut World,
    commands: &'a mut Commands,
    current: usize,
}

impl UpdateContext<'_> {
    /// The pass delta.
    pub fn delta(&self) -> f64 {
        self.scheduler.delta
    }

    /// Name of the system being updated.
    pub fn system_name(&self) -> &str {
        &self.scheduler.registered[self.current].name
    }

    /// Read access to entities and components.
    pub fn world(&self) -> &World {
        &*self.world
    }

    /// Write access to component state and entity metadata.
    pub fn world_mut(&mut self) -> &mut World {
        &mut *self.world
    }

    /// Queue structural changes, applied after the pass.
    pub fn commands(&mut self) -> &mut Commands {
        &mut *self.commands
    }

    /// Whether some system provides `service`.
    pub fn has_service(&self, service: ServiceId) -> bool {
        self.scheduler.providers.contains_key(&service)
    }

    /// Pull a typed service, updating its provider first if needed.
    pub fn service<T: Any>(&mut self, key: &ServiceKey<T>) -> Result<Rc<T>, EcsError> {
        let value = self.service_value(key.id())?;
        key.downcast(value)
    }

    /// Pull an untyped service, updating its provider first if needed.
    pub fn service_value(&mut self, service: ServiceId) -> Result<ServiceValue, EcsError> {
        self.scheduler.pull(service, &mut *self.world, &mut *self.commands)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
