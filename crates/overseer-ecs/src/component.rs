//! Component kinds and versioned component instances.
//!
//! A [`ComponentKind`] declares a kind of component: its name, the type of its
//! state, and how to build the initial state. A [`Component`] is one instance
//! of a kind, bound to exactly one entity and to the registry it was built for.
//!
//! Every state write bumps the component's version. Consumers that cache data
//! derived from a component (a renderer's GPU buffers, an inspector panel)
//! compare versions instead of comparing state.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use crate::identifier::Identifier;
use crate::world::RegistryId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Declaration of a component kind.
///
/// ```
/// use overseer_ecs::component::ComponentKind;
///
/// struct Position;
///
/// impl ComponentKind for Position {
///     type State = [f32; 3];
///     const NAME: &'static str = "position";
///
///     fn initialize() -> [f32; 3] {
///         [0.0; 3]
///     }
/// }
/// ```
pub trait ComponentKind: 'static {
    /// Payload carried by components of this kind.
    type State: 'static;

    /// Human-readable kind name, used in logs and errors.
    const NAME: &'static str;

    /// Initial state of a freshly created component.
    fn initialize() -> Self::State;
}

// ---------------------------------------------------------------------------
// ComponentType
// ---------------------------------------------------------------------------

/// Runtime tag of a [`ComponentKind`].
#[derive(Clone, Copy)]
pub struct ComponentType {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentType {
    /// The tag of kind `K`.
    pub fn of<K: ComponentKind>() -> Self {
        Self {
            type_id: TypeId::of::<K>(),
            name: K::NAME,
        }
    }

    /// The kind's declared name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

// Identity is the Rust type alone; the name is informational.
impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentType {}

impl Hash for ComponentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({})", self.name)
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A versioned state container bound to one entity.
///
/// The owning registry is fixed at construction;
/// [`Manager::add_component`](crate::manager::Manager::add_component) rejects a
/// component built for a different registry.
pub struct Component {
    id: Identifier,
    kind: ComponentType,
    entity: Identifier,
    owner: RegistryId,
    state: Box<dyn Any>,
    version: u64,
}

impl Component {
    /// Build a component of kind `K` with its initial state.
    pub fn new<K: ComponentKind>(
        owner: RegistryId,
        entity: impl Into<Identifier>,
        id: impl Into<Identifier>,
    ) -> Self {
        Self::with_state::<K>(owner, entity, id, K::initialize())
    }

    /// Build a component of kind `K` with an explicit state.
    pub fn with_state<K: ComponentKind>(
        owner: RegistryId,
        entity: impl Into<Identifier>,
        id: impl Into<Identifier>,
        state: K::State,
    ) -> Self {
        Self::from_boxed(
            owner,
            entity.into(),
            id.into(),
            ComponentType::of::<K>(),
            Box::new(state),
        )
    }

    /// Build from an already type-erased state. The caller guarantees that
    /// `state` holds the `State` type of `kind`.
    pub(crate) fn from_boxed(
        owner: RegistryId,
        entity: Identifier,
        id: Identifier,
        kind: ComponentType,
        state: Box<dyn Any>,
    ) -> Self {
        Self {
            id,
            kind,
            entity,
            owner,
            state,
            version: 0,
        }
    }

    /// This component's identifier.
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// This component's kind.
    pub fn kind(&self) -> ComponentType {
        self.kind
    }

    /// The entity this component is attached to.
    pub fn entity(&self) -> &Identifier {
        &self.entity
    }

    /// The registry this component was built for.
    pub fn owner(&self) -> RegistryId {
        self.owner
    }

    /// Number of state writes so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the state was written since `seen` was observed.
    pub fn changed_since(&self, seen: u64) -> bool {
        self.version != seen
    }

    /// Whether this component is of kind `K`.
    pub fn is<K: ComponentKind>(&self) -> bool {
        self.kind == ComponentType::of::<K>()
    }

    /// Typed read of the state. `None` if this component is not a `K`.
    pub fn state<K: ComponentKind>(&self) -> Option<&K::State> {
        if !self.is::<K>() {
            return None;
        }
        self.state.downcast_ref()
    }

    /// Replace the state wholesale. Returns the new version.
    pub fn set_state<K: ComponentKind>(&mut self, state: K::State) -> Result<u64, EcsError> {
        self.expect_kind::<K>()?;
        self.state = Box::new(state);
        self.version += 1;
        Ok(self.version)
    }

    /// Mutate the state in place and bump the version.
    pub fn update_state<K, R>(&mut self, f: impl FnOnce(&mut K::State) -> R) -> Result<R, EcsError>
    where
        K: ComponentKind,
    {
        self.expect_kind::<K>()?;
        let Some(state) = self.state.downcast_mut::<K::State>() else {
            return Err(self.mismatch::<K>());
        };
        let result = f(state);
        self.version += 1;
        Ok(result)
    }

    fn expect_kind<K: ComponentKind>(&self) -> Result<(), EcsError> {
        if self.is::<K>() {
            Ok(())
        } else {
            Err(self.mismatch::<K>())
        }
    }

    fn mismatch<K: ComponentKind>(&self) -> EcsError {
        EcsError::ComponentTypeMismatch {
            component: self.id.clone(),
            expected: K::NAME,
            found: self.kind.name(),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("entity", &self.entity)
            .field("owner", &self.owner)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ComponentMut
// ---------------------------------------------------------------------------

/// Write access to the state of a registered component.
///
/// Reads go through [`Deref`] to the [`Component`]. Only the state can be
/// written: id, kind, entity and owner are what the registry indexes by, so
/// the component itself is never handed out mutably.
pub struct ComponentMut<'a> {
    inner: &'a mut Component,
}

impl<'a> ComponentMut<'a> {
    pub(crate) fn new(inner: &'a mut Component) -> Self {
        Self { inner }
    }

    /// Replace the state wholesale. Returns the new version.
    pub fn set_state<K: ComponentKind>(&mut self, state: K::State) -> Result<u64, EcsError> {
        self.inner.set_state::<K>(state)
    }

    /// Mutate the state in place and bump the version.
    pub fn update_state<K, R>(&mut self, f: impl FnOnce(&mut K::State) -> R) -> Result<R, EcsError>
    where
        K: ComponentKind,
    {
        self.inner.update_state::<K, R>(f)
    }
}

impl Deref for ComponentMut<'_> {
    type Target = Component;

    fn deref(&self) -> &Component {
        self.inner
    }
}

impl fmt::Debug for ComponentMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.inner, f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
