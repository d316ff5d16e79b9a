// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::TypeId;
use std::fmt;

use crate::ContainerPath;

/// Identifies a service that components provide or require.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// The key for services of type `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Full type name of the service.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A component declared into a container.
///
/// The build only tracks what a component provides and requires; instantiating it is up to the
/// [`Runtime`][crate::Runtime] that consumes the finished [`Assembly`][crate::Assembly].
///
/// # Examples
///
/// ```
/// use rigging::Component;
///
/// struct Database;
/// struct Repository;
///
/// let component = Component::new("repository")
///     .provides::<Repository>()
///     .requires::<Database>();
///
/// assert_eq!(component.name(), "repository");
/// assert_eq!(component.required().len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Component {
    name: String,
    provides: Vec<ServiceKey>,
    requires: Vec<ServiceKey>,
}

impl Component {
    /// Creates a component that neither provides nor requires anything.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provides: Vec::new(),
            requires: Vec::new(),
        }
    }

    /// Adds a service of type `T` this component provides.
    #[must_use]
    pub fn provides<T: ?Sized + 'static>(mut self) -> Self {
        self.provides.push(ServiceKey::of::<T>());
        self
    }

    /// Adds a service of type `T` this component needs injected.
    #[must_use]
    pub fn requires<T: ?Sized + 'static>(mut self) -> Self {
        self.requires.push(ServiceKey::of::<T>());
        self
    }

    /// Name of the component, unique within its container.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Services provided by the component.
    #[must_use]
    pub fn provided(&self) -> &[ServiceKey] {
        &self.provides
    }

    /// Services the component requires.
    #[must_use]
    pub fn required(&self) -> &[ServiceKey] {
        &self.requires
    }
}

/// An injection point waiting for resolution when its container completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependant {
    container: ContainerPath,
    component: String,
    key: ServiceKey,
}

impl Dependant {
    pub(crate) fn new(container: &ContainerPath, component: &str, key: ServiceKey) -> Self {
        Self {
            container: container.clone(),
            component: component.to_owned(),
            key,
        }
    }

    /// The container the component is installed in.
    #[must_use]
    pub fn container(&self) -> &ContainerPath {
        &self.container
    }

    /// The component that needs the service.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The service needed.
    #[must_use]
    pub fn key(&self) -> ServiceKey {
        self.key
    }
}

impl fmt::Display for Dependant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {}", self.component, self.key)
    }
}
