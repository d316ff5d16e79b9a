// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::{
    BuildTree, Bundle, Component, ContainerId, ContainerPath, ContainerPhase, Error, Extension, ExtensionDescriptor, ExtensionHandle,
    ExtensionId, ExtensionState, Result, Wirelet,
};

/// What a [`Bundle`] can do with the container it configures.
#[derive(Debug)]
pub struct BundleContext<'a> {
    tree: &'a mut BuildTree,
    container: ContainerId,
}

impl<'a> BundleContext<'a> {
    pub(crate) fn new(tree: &'a mut BuildTree, container: ContainerId) -> Self {
        Self { tree, container }
    }

    /// The container being configured.
    #[must_use]
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// Path of the container being configured.
    #[must_use]
    pub fn path(&self) -> &ContainerPath {
        self.tree.path(self.container)
    }

    /// Current phase of the container being configured.
    #[must_use]
    pub fn phase(&self) -> ContainerPhase {
        self.tree.phase(self.container)
    }

    /// Read access to the whole build.
    #[must_use]
    pub fn tree(&self) -> &BuildTree {
        self.tree
    }

    /// Returns the instance of `E` in this container, creating it on first use.
    ///
    /// # Errors
    ///
    /// See [`BuildTree::get_or_create`].
    pub fn use_extension<E: Extension>(&mut self) -> Result<ExtensionHandle<E>> {
        self.tree.get_or_create(self.container, None)
    }

    /// Configures the instance of `E` in this container, creating it on first use.
    ///
    /// # Errors
    ///
    /// - [`Error::ExtensionNoLongerConfigurable`] if the instance is sealed.
    /// - [`Error::ExtensionInUse`] if the instance is running one of its own callbacks.
    /// - See [`BuildTree::get_or_create`].
    pub fn with_extension<E, R>(&mut self, f: impl FnOnce(&mut E, &mut ExtensionContext<'_>) -> R) -> Result<R>
    where
        E: Extension,
    {
        let handle = self.use_extension::<E>()?;
        self.tree.with_extension(handle.id(), f)
    }

    /// Installs a component into this container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateComponent`] if a component with the same name is installed.
    pub fn install(&mut self, component: Component) -> Result<()> {
        self.tree.install(self.container, component)
    }

    /// Links a child container configured by `bundle`.
    ///
    /// # Errors
    ///
    /// See [`BuildTree::link`].
    pub fn link<B: Bundle>(&mut self, bundle: B) -> Result<ContainerId> {
        self.link_with(bundle, Vec::new())
    }

    /// Links a child container configured by `bundle`, passing `wirelets` to it.
    ///
    /// # Errors
    ///
    /// See [`BuildTree::link`].
    pub fn link_with<B: Bundle>(&mut self, mut bundle: B, wirelets: Vec<Wirelet>) -> Result<ContainerId> {
        self.tree.link(self.container, &mut bundle, wirelets)
    }

    /// Container-wide wirelet values of type `T`, inherited ones first.
    pub fn wirelets<T: Any>(&self) -> impl Iterator<Item = &T> {
        self.tree.wirelets(self.container).values()
    }

    /// The innermost container-wide wirelet value of type `T`.
    #[must_use]
    pub fn wirelet<T: Any>(&self) -> Option<&T> {
        self.wirelets().last()
    }
}

/// What an [`Extension`] can do from its constructor and callbacks.
#[derive(Debug)]
pub struct ExtensionContext<'a> {
    tree: &'a mut BuildTree,
    extension: ExtensionId,
}

impl<'a> ExtensionContext<'a> {
    pub(crate) fn new(tree: &'a mut BuildTree, extension: ExtensionId) -> Self {
        Self { tree, extension }
    }

    /// The instance this context belongs to.
    #[must_use]
    pub fn id(&self) -> ExtensionId {
        self.extension
    }

    /// The container owning the instance.
    #[must_use]
    pub fn container(&self) -> ContainerId {
        self.tree.container_of(self.extension)
    }

    /// Path of the container owning the instance.
    #[must_use]
    pub fn path(&self) -> &ContainerPath {
        self.tree.path(self.container())
    }

    /// Current phase of the container owning the instance.
    #[must_use]
    pub fn phase(&self) -> ContainerPhase {
        self.tree.phase(self.container())
    }

    /// Lifecycle state of the instance.
    #[must_use]
    pub fn state(&self) -> ExtensionState {
        self.tree.extension_state(self.extension)
    }

    /// Descriptor of the instance's extension type.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<ExtensionDescriptor> {
        self.tree.descriptor(self.extension)
    }

    /// The instance of the same type in an ancestor container this one was linked to.
    #[must_use]
    pub fn ancestor(&self) -> Option<ExtensionId> {
        self.tree.ancestor_of(self.extension)
    }

    /// Read access to the whole build.
    #[must_use]
    pub fn tree(&self) -> &BuildTree {
        self.tree
    }

    /// Returns the instance of `E` in the same container, creating it on first use.
    ///
    /// `E` must be a declared dependency of this extension, or this extension itself.
    ///
    /// # Errors
    ///
    /// - [`Error::UndeclaredExtensionDependency`] if `E` was not declared.
    /// - [`Error::ExtensionNoLongerConfigurable`] if `E` has to be created but this instance is
    ///   sealed.
    /// - See [`BuildTree::get_or_create`].
    pub fn use_extension<E: Extension>(&mut self) -> Result<ExtensionHandle<E>> {
        let descriptor = self.descriptor();
        let requested = TypeId::of::<E>();

        if requested == descriptor.extension().id() {
            return Ok(ExtensionHandle::new(self.extension, self.container()));
        }

        if !descriptor.depends_on(requested) {
            return Err(Error::UndeclaredExtensionDependency {
                extension: descriptor.name(),
                requested: E::NAME,
                declared: descriptor.dependency_names(),
            });
        }

        self.tree.get_or_create(self.container(), Some(self.extension))
    }

    /// Configures the instance of dependency `E`, creating it on first use.
    ///
    /// # Errors
    ///
    /// See [`use_extension`][Self::use_extension]. Also fails with [`Error::ExtensionInUse`] if
    /// `E` is this extension or is running one of its own callbacks.
    pub fn with_dependency<E, R>(&mut self, f: impl FnOnce(&mut E, &mut ExtensionContext<'_>) -> R) -> Result<R>
    where
        E: Extension,
    {
        let handle = self.use_extension::<E>()?;
        self.tree.with_extension(handle.id(), f)
    }

    /// Borrows the instance of dependency `E` if it exists and is not busy.
    #[must_use]
    pub fn dependency<E: Extension>(&self) -> Option<&E> {
        let handle = self.tree.extension_of::<E>(self.container())?;
        self.tree.extension(handle)
    }

    /// Installs a component into the container on behalf of the extension.
    ///
    /// # Errors
    ///
    /// - [`Error::ExtensionNoLongerConfigurable`] if this instance is sealed.
    /// - [`Error::DuplicateComponent`] if a component with the same name is installed.
    pub fn install(&mut self, component: Component) -> Result<()> {
        self.tree.ensure_configurable(self.extension)?;
        self.tree.install(self.container(), component)
    }

    /// Requests a child container configured by `bundle`.
    ///
    /// The link is carried out once the container has notified all of its extensions ahead of
    /// child linking, and in any case before its declaration ends.
    ///
    /// # Errors
    ///
    /// - [`Error::ExtensionNoLongerConfigurable`] if this instance is sealed.
    /// - [`Error::ContainerNoLongerAcceptsChildren`] if the container is closed to children.
    pub fn link<B: Bundle>(&mut self, bundle: B) -> Result<()> {
        self.link_with(bundle, Vec::new())
    }

    /// Requests a child container configured by `bundle`, passing `wirelets` to it.
    ///
    /// # Errors
    ///
    /// See [`link`][Self::link].
    pub fn link_with<B: Bundle>(&mut self, bundle: B, wirelets: Vec<Wirelet>) -> Result<()> {
        self.tree.ensure_configurable(self.extension)?;
        self.tree.defer_link(self.container(), Box::new(bundle), wirelets)
    }

    /// Wirelet values of type `T` visible to this extension, inherited ones first.
    ///
    /// Wirelets addressed to this extension are marked consumed.
    pub fn wirelets<T: Any>(&mut self) -> impl Iterator<Item = &T> {
        let extension = self.descriptor().extension().id();
        let container = self.container();
        self.tree.wirelets_mut(container).consume(extension)
    }

    /// The innermost wirelet value of type `T` visible to this extension.
    pub fn wirelet<T: Any>(&mut self) -> Option<&T> {
        self.wirelets().last()
    }
}
