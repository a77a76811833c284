//! Deferred structural mutations.
//!
//! During an update pass systems only get non-structural access to the
//! [`World`](crate::world::World): they may write component state and entity
//! metadata, but adding or deleting entities and components has to fire
//! lifecycle hooks on every system, including the ones that are lent out to
//! the running pass. Such changes are queued on [`Commands`] instead and
//! applied by the [`Manager`](crate::manager::Manager) in strict FIFO order
//! after the pass, before `manager_did_update`.
//!
//! Each queued command remembers which system issued it, so a failure can be
//! traced back to its source in the logs.

use std::any::Any;
use std::fmt;

use crate::component::{ComponentKind, ComponentType};
use crate::identifier::Identifier;
use crate::system::SystemId;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// What mutation to perform.
pub(crate) enum CommandKind {
    AddEntity {
        entity: Identifier,
        name: Option<String>,
        tags: Vec<String>,
    },
    DeleteEntity {
        entity: Identifier,
    },
    CreateComponent {
        entity: Identifier,
        kind: ComponentType,
        /// Holds `kind`'s `State`.
        state: Box<dyn Any>,
    },
    DeleteComponent {
        component: Identifier,
    },
    DeleteComponentOf {
        entity: Identifier,
        kind: ComponentType,
    },
}

impl CommandKind {
    fn label(&self) -> &'static str {
        match self {
            CommandKind::AddEntity { .. } => "add_entity",
            CommandKind::DeleteEntity { .. } => "delete_entity",
            CommandKind::CreateComponent { .. } => "create_component",
            CommandKind::DeleteComponent { .. } => "delete_component",
            CommandKind::DeleteComponentOf { .. } => "delete_component_of",
        }
    }
}

/// A queued mutation and where it came from.
pub(crate) struct Command {
    pub(crate) kind: CommandKind,
    /// The system whose update queued it. `None` when queued from outside a
    /// pass.
    pub(crate) issued_by: Option<SystemId>,
    /// Position in the buffer.
    pub(crate) index: u32,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind.label())
            .field("issued_by", &self.issued_by)
            .field("index", &self.index)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// FIFO buffer of structural mutations.
///
/// ```
/// use overseer_ecs::prelude::*;
///
/// struct Health;
///
/// impl ComponentKind for Health {
///     type State = u32;
///     const NAME: &'static str = "health";
///
///     fn initialize() -> u32 {
///         100
///     }
/// }
///
/// struct Spawner;
///
/// impl System for Spawner {
///     fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), EcsError> {
///         if !ctx.world().has_entity("player") {
///             ctx.commands().add_entity("player");
///             ctx.commands().create_component::<Health>("player");
///         }
///         Ok(())
///     }
/// }
///
/// let mut manager = Manager::new();
/// manager.add_system(Spawner).unwrap();
/// manager.update(0.016).unwrap();
/// assert_eq!(manager.world().state_of::<Health>("player"), Some(&100));
/// ```
#[derive(Default)]
pub struct Commands {
    queue: Vec<Command>,
    next_index: u32,
    issuer: Option<SystemId>,
}

impl Commands {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every queued command without applying it.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.next_index = 0;
    }

    /// Queue the insertion of `entity` with default metadata.
    pub fn add_entity(&mut self, entity: impl Into<Identifier>) -> &mut Self {
        self.push(CommandKind::AddEntity {
            entity: entity.into(),
            name: None,
            tags: Vec::new(),
        })
    }

    /// Queue the insertion of `entity` with a name and tags. The metadata is
    /// in place before `manager_did_add_entity` fires.
    pub fn add_entity_with<I, T>(
        &mut self,
        entity: impl Into<Identifier>,
        name: impl Into<String>,
        tags: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.push(CommandKind::AddEntity {
            entity: entity.into(),
            name: Some(name.into()),
            tags: tags.into_iter().map(Into::into).collect(),
        })
    }

    /// Queue the deletion of `entity` and all its components.
    pub fn delete_entity(&mut self, entity: impl Into<Identifier>) -> &mut Self {
        self.push(CommandKind::DeleteEntity {
            entity: entity.into(),
        })
    }

    /// Queue a fresh `K` component with its initial state on `entity`.
    pub fn create_component<K: ComponentKind>(&mut self, entity: impl Into<Identifier>) -> &mut Self {
        self.insert_component::<K>(entity, K::initialize())
    }

    /// Queue a fresh `K` component with an explicit state on `entity`.
    pub fn insert_component<K: ComponentKind>(
        &mut self,
        entity: impl Into<Identifier>,
        state: K::State,
    ) -> &mut Self {
        self.push(CommandKind::CreateComponent {
            entity: entity.into(),
            kind: ComponentType::of::<K>(),
            state: Box::new(state),
        })
    }

    /// Queue the deletion of a component by identifier.
    pub fn delete_component(&mut self, component: impl Into<Identifier>) -> &mut Self {
        self.push(CommandKind::DeleteComponent {
            component: component.into(),
        })
    }

    /// Queue the deletion of the `K` component on `entity`.
    pub fn delete_component_of<K: ComponentKind>(&mut self, entity: impl Into<Identifier>) -> &mut Self {
        self.push(CommandKind::DeleteComponentOf {
            entity: entity.into(),
            kind: ComponentType::of::<K>(),
        })
    }

    /// Set the system that subsequent commands are attributed to. Returns
    /// the previous issuer so nested updates can restore it.
    pub(crate) fn set_issuer(&mut self, issuer: Option<SystemId>) -> Option<SystemId> {
        std::mem::replace(&mut self.issuer, issuer)
    }

    /// Take every queued command, oldest first, leaving the buffer empty.
    pub(crate) fn take(&mut self) -> Vec<Command> {
        self.next_index = 0;
        std::mem::take(&mut self.queue)
    }

    fn push(&mut self, kind: CommandKind) -> &mut Self {
        let index = self.next_index;
        self.next_index += 1;
        self.queue.push(Command {
            kind,
            issued_by: self.issuer,
            index,
        });
        self
    }
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commands")
            .field("queue", &self.queue)
            .field("issuer", &self.issuer)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
