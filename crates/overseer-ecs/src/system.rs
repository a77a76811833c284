//! The system contract and service keys.
//!
//! A [`System`] is a unit of behaviour attached to a
//! [`Manager`](crate::manager::Manager). It observes every structural
//! mutation through `will`/`did` hooks, runs once per update pass, and may
//! provide named services that other systems pull while they update.
//!
//! Every hook has a no-op default, so a system only implements what it
//! reacts to.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::identifier::Identifier;
use crate::schedule::UpdateContext;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// SystemId
// ---------------------------------------------------------------------------

/// Handle of a system registered with a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(pub u32);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// A service value as handed out by its provider.
pub type ServiceValue = Rc<dyn Any>;

/// Untyped name of a service.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(&'static str);

impl ServiceId {
    /// A service id named `name`.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The service name.
    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({})", self.0)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A service name paired with the type of value it resolves to.
///
/// Keys are usually declared as constants next to the providing system:
///
/// ```
/// use overseer_ecs::system::ServiceKey;
///
/// pub struct Clock {
///     pub elapsed: f64,
/// }
///
/// pub const CLOCK: ServiceKey<Clock> = ServiceKey::new("clock");
/// assert_eq!(CLOCK.id().name(), "clock");
/// ```
pub struct ServiceKey<T> {
    id: ServiceId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ServiceKey<T> {
    /// A key named `name` resolving to `T`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            id: ServiceId::new(name),
            _marker: PhantomData,
        }
    }

    /// The untyped id, as returned from [`System::services`].
    pub const fn id(&self) -> ServiceId {
        self.id
    }

    /// Wrap a value for return from [`System::service`].
    pub fn provide(&self, value: T) -> ServiceValue {
        Rc::new(value)
    }

    /// Recover the typed value from a resolved service.
    pub fn downcast(&self, value: ServiceValue) -> Result<Rc<T>, EcsError> {
        value
            .downcast::<T>()
            .map_err(|_| EcsError::ServiceTypeMismatch {
                service: self.id.name(),
                expected: type_name::<T>(),
            })
    }
}

impl<T> Clone for ServiceKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ServiceKey<T> {}

impl<T> fmt::Debug for ServiceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey<{}>({})", type_name::<T>(), self.id.0)
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Behaviour attached to a manager.
///
/// Lifecycle hooks are delivered synchronously, in registration order. For a
/// given mutation every system sees the `will` hook before any system sees the
/// `did` hook. Hooks receive a read-only [`World`]; structural changes from
/// inside a pass go through [`UpdateContext::commands`].
#[allow(unused_variables)]
pub trait System: 'static {
    /// Name used in logs, diagnostics, and errors. Identity is the
    /// [`SystemId`], so several systems may share a name.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Services this system provides. Read once, at registration.
    fn services(&self) -> Vec<ServiceId> {
        Vec::new()
    }

    /// Current value of one of [`services`](System::services). Called after
    /// this system's update in a pass; the value is memoized for the rest of
    /// the pass.
    fn service(&self, service: ServiceId) -> Option<ServiceValue> {
        None
    }

    /// Called once when the system is attached.
    fn initialize(&mut self, world: &World) {}

    /// Called once when the system is detached.
    fn destroy(&mut self, world: &World) {}

    /// Before `entity` is inserted.
    fn manager_will_add_entity(&mut self, world: &World, entity: &Identifier) {}

    /// After `entity` is inserted.
    fn manager_did_add_entity(&mut self, world: &World, entity: &Identifier) {}

    /// Before `entity` and its components are deleted.
    fn manager_will_delete_entity(&mut self, world: &World, entity: &Identifier) {}

    /// After `entity` is gone.
    fn manager_did_delete_entity(&mut self, world: &World, entity: &Identifier) {}

    /// Before `component` is inserted. It is not yet in `world`.
    fn manager_will_add_component(&mut self, world: &World, component: &Component) {}

    /// After `component` is inserted.
    fn manager_did_add_component(&mut self, world: &World, component: &Component) {}

    /// Before `component` is removed. Its entity is still live.
    fn manager_will_delete_component(&mut self, world: &World, component: &Component) {}

    /// After `component` is removed.
    fn manager_did_delete_component(&mut self, world: &World, component: &Component) {}

    /// Before the update pass.
    fn manager_will_update(&mut self, world: &World, delta: f64) {}

    /// After the update pass and its deferred commands.
    fn manager_did_update(&mut self, world: &World, delta: f64) {}

    /// Per-tick work. Runs exactly once per pass.
    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), EcsError> {
        Ok(())
    }
}

impl fmt::Debug for dyn System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System").field("name", &self.name()).finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const COUNT: ServiceKey<u32> = ServiceKey::new("count");

    #[test]
    fn keys_round_trip_their_type() {
        let value = COUNT.provide(7);
        assert_eq!(*COUNT.downcast(value).unwrap(), 7);
    }

    #[test]
    fn wrong_type_is_a_mismatch() {
        let value: ServiceValue = Rc::new("seven");
        let err = COUNT.downcast(value).unwrap_err();
        assert_eq!(
            err,
            EcsError::ServiceTypeMismatch {
                service: "count",
                expected: "u32",
            }
        );
    }

    #[test]
    fn default_name_is_type_name() {
        struct Idle;
        impl System for Idle {}
        assert!(Idle.name().ends_with("Idle"));
        assert!(Idle.services().is_empty());
    }
}
