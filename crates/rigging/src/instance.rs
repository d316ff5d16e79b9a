// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::extension::ErasedExtension;
use crate::{ContainerId, ExtensionDescriptor};

/// Index of an extension instance within a [`BuildTree`][crate::BuildTree].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtensionId(pub(crate) usize);

/// Lifecycle state of an extension instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExtensionState {
    /// The user constructor is running.
    Constructing,
    /// The instance accepts configuration.
    Configurable,
    /// The instance has completed and rejects configuration.
    Sealed,
}

/// Typed reference to the instance of extension `E` in one container.
pub struct ExtensionHandle<E> {
    id: ExtensionId,
    container: ContainerId,
    _extension: PhantomData<fn() -> E>,
}

impl<E> ExtensionHandle<E> {
    pub(crate) fn new(id: ExtensionId, container: ContainerId) -> Self {
        Self {
            id,
            container,
            _extension: PhantomData,
        }
    }

    /// The untyped instance id.
    #[must_use]
    pub fn id(&self) -> ExtensionId {
        self.id
    }

    /// The container owning the instance.
    #[must_use]
    pub fn container(&self) -> ContainerId {
        self.container
    }
}

impl<E> Clone for ExtensionHandle<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for ExtensionHandle<E> {}

impl<E> PartialEq for ExtensionHandle<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for ExtensionHandle<E> {}

impl<E> fmt::Debug for ExtensionHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("id", &self.id)
            .field("container", &self.container)
            .finish()
    }
}

/// Where the user object of an instance currently is.
enum Slot {
    /// Not constructed yet.
    Vacant,
    Present(Box<dyn ErasedExtension>),
    /// Lent out to a running callback.
    Lent,
}

/// The live instance of one extension type in one container.
pub(crate) struct ExtensionInstance {
    container: ContainerId,
    descriptor: Arc<ExtensionDescriptor>,
    state: ExtensionState,
    slot: Slot,
    ancestor: Option<ExtensionId>,
}

impl ExtensionInstance {
    pub(crate) fn constructing(container: ContainerId, descriptor: Arc<ExtensionDescriptor>) -> Self {
        Self {
            container,
            descriptor,
            state: ExtensionState::Constructing,
            slot: Slot::Vacant,
            ancestor: None,
        }
    }

    pub(crate) fn container(&self) -> ContainerId {
        self.container
    }

    pub(crate) fn descriptor(&self) -> &Arc<ExtensionDescriptor> {
        &self.descriptor
    }

    pub(crate) fn name(&self) -> &'static str {
        self.descriptor.name()
    }

    pub(crate) fn state(&self) -> ExtensionState {
        self.state
    }

    pub(crate) fn ancestor(&self) -> Option<ExtensionId> {
        self.ancestor
    }

    pub(crate) fn set_ancestor(&mut self, ancestor: ExtensionId) {
        self.ancestor = Some(ancestor);
    }

    /// Stores the freshly constructed object and makes the instance configurable.
    pub(crate) fn constructed(&mut self, object: Box<dyn ErasedExtension>) {
        debug_assert!(matches!(self.slot, Slot::Vacant));
        self.slot = Slot::Present(object);
        self.state = ExtensionState::Configurable;
    }

    pub(crate) fn seal(&mut self) {
        self.state = ExtensionState::Sealed;
    }

    #[cfg(test)]
    pub(crate) fn is_available(&self) -> bool {
        matches!(self.slot, Slot::Present(_))
    }

    /// Takes the object out for the duration of a callback. `None` while constructing or lent.
    pub(crate) fn lend(&mut self) -> Option<Box<dyn ErasedExtension>> {
        match std::mem::replace(&mut self.slot, Slot::Lent) {
            Slot::Present(object) => Some(object),
            other => {
                self.slot = other;
                None
            }
        }
    }

    pub(crate) fn restore(&mut self, object: Box<dyn ErasedExtension>) {
        debug_assert!(matches!(self.slot, Slot::Lent));
        self.slot = Slot::Present(object);
    }

    pub(crate) fn object(&self) -> Option<&dyn ErasedExtension> {
        match &self.slot {
            Slot::Present(object) => Some(object.as_ref()),
            Slot::Vacant | Slot::Lent => None,
        }
    }

    pub(crate) fn object_mut(&mut self) -> Option<&mut (dyn ErasedExtension + 'static)> {
        match &mut self.slot {
            Slot::Present(object) => Some(object.as_mut()),
            Slot::Vacant | Slot::Lent => None,
        }
    }
}

impl fmt::Debug for ExtensionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = match self.slot {
            Slot::Vacant => "vacant",
            Slot::Present(_) => "present",
            Slot::Lent => "lent",
        };

        f.debug_struct("ExtensionInstance")
            .field("extension", &self.name())
            .field("container", &self.container)
            .field("state", &self.state)
            .field("slot", &slot)
            .field("ancestor", &self.ancestor)
            .finish()
    }
}
