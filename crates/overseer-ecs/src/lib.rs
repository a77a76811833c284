//! Overseer ECS -- entity registry and pull-based system scheduler.
//!
//! This crate is the core of the Overseer scene editor. A [`Manager`] owns the
//! live entities, their components, and an ordered set of systems. Every
//! structural mutation is checked for referential integrity and broadcast to
//! the systems as `will`/`did` lifecycle hooks. Once per frame the editor calls
//! [`Manager::update`], which runs every system exactly once; a system that
//! needs a service from another system pulls it, and the provider is updated
//! on demand first.
//!
//! # Quick Start
//!
//! ```
//! use overseer_ecs::prelude::*;
//!
//! struct Position;
//!
//! impl ComponentKind for Position {
//!     type State = [f32; 3];
//!     const NAME: &'static str = "position";
//!
//!     fn initialize() -> [f32; 3] {
//!         [0.0; 3]
//!     }
//! }
//!
//! let mut manager = Manager::new();
//! manager.add_entity("e1").unwrap();
//! let first = manager.create_component::<Position>("e1").unwrap();
//! let second = manager.create_component::<Position>("e1").unwrap();
//!
//! // One component per kind per entity: the second one evicted the first.
//! assert!(!manager.has_component(&first));
//! assert_eq!(manager.get_component_of::<Position>("e1").unwrap().id(), &second);
//! ```

#![deny(unsafe_code)]

pub mod command;
pub mod component;
pub mod entity;
pub mod identifier;
pub mod index;
pub mod manager;
pub mod schedule;
pub mod system;
pub mod world;

use identifier::Identifier;
use world::RegistryId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by registry and scheduler operations.
///
/// Every variant is a broken structural invariant at the call site. Read
/// accessors never produce these; they return `None` or an empty sequence.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EcsError {
    /// An entity with this identifier is already live.
    #[error("entity '{entity}' already exists in {manager}")]
    DuplicatedEntity {
        manager: RegistryId,
        entity: Identifier,
    },

    /// A component with this identifier is already live.
    #[error("component '{component}' already exists in {manager}")]
    DuplicatedComponent {
        manager: RegistryId,
        component: Identifier,
    },

    /// The component was built for a different registry.
    #[error("component '{component}' belongs to {found}, not {expected}")]
    InvalidComponentManager {
        expected: RegistryId,
        found: RegistryId,
        component: Identifier,
    },

    /// The component's entity is not live in the target registry.
    #[error("component '{component}' references entity '{entity}', which is not live in {manager}")]
    InvalidComponentEntity {
        manager: RegistryId,
        entity: Identifier,
        component: Identifier,
    },

    /// Metadata write on an entity that is not live.
    #[error("entity '{entity}' does not exist")]
    UnknownEntity { entity: Identifier },

    /// Typed state write with a kind other than the component's own.
    #[error("component '{component}' is a '{found}', not a '{expected}'")]
    ComponentTypeMismatch {
        component: Identifier,
        expected: &'static str,
        found: &'static str,
    },

    /// The identifier generator kept returning live identifiers.
    #[error("no free identifier after {attempts} attempts")]
    IdentifierExhausted { attempts: u32 },

    /// Two systems declare the same service.
    #[error("service '{service}' declared by '{system}' is already provided by '{provider}'")]
    DuplicatedService {
        service: &'static str,
        system: String,
        provider: String,
    },

    /// No registered system declares the service.
    #[error("no system provides service '{service}'")]
    UnknownService { service: &'static str },

    /// The provider declared the service but returned no value for it.
    #[error("system '{provider}' declares service '{service}' but did not provide it")]
    ServiceUnavailable {
        service: &'static str,
        provider: String,
    },

    /// The provider's value is not of the type the service key declares.
    #[error("service '{service}' is not a {expected}")]
    ServiceTypeMismatch {
        service: &'static str,
        expected: &'static str,
    },

    /// A service pull reached a system that is still updating.
    #[error("circular service dependency on '{service}': {}", .chain.join(" -> "))]
    CircularServiceDependency {
        service: &'static str,
        /// Systems on the pull stack, outermost first, ending with the
        /// provider that was already updating.
        chain: Vec<String>,
    },

    /// A system was added or removed while an update pass is running.
    #[error("cannot {action} system '{system}' while an update pass is running")]
    MutationDuringPass {
        action: &'static str,
        system: String,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::command::Commands;
    pub use crate::component::{Component, ComponentKind, ComponentMut, ComponentType};
    pub use crate::entity::{EntityRecord, EntityRegistry, DEFAULT_ENTITY_NAME};
    pub use crate::identifier::{IdGenerator, Identifier, RandomIdGenerator};
    pub use crate::index::Index;
    pub use crate::manager::{Manager, ManagerConfig};
    pub use crate::schedule::{PassDiagnostics, SystemState, Systems, UpdateContext};
    pub use crate::system::{ServiceId, ServiceKey, ServiceValue, System, SystemId};
    pub use crate::world::{RegistryId, World};
    pub use crate::EcsError;
}

pub use manager::Manager;
