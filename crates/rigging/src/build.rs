// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::TypeId;
use std::sync::Arc;

use tracing::{Level, event};

use crate::container::{ContainerBuildNode, DeferredLink};
use crate::instance::ExtensionInstance;
use crate::wirelet::WireletSet;
use crate::{
    AncestorScope, BoxError, Bundle, BundleContext, Callback, Component, ContainerId, ContainerPath, ContainerPhase, Dependant,
    DependencyResolver, Error, Extension, ExtensionContext, ExtensionDescriptor, ExtensionHandle, ExtensionId, ExtensionRegistry,
    ExtensionState, ExtensionType, ResolutionScope, Result, ServiceKey, Wirelet,
};

/// The callbacks delivered to a constructed extension through [`BuildTree::notify`].
#[derive(Clone, Copy, Debug)]
enum Notification {
    New,
    PreChildren,
    Complete,
}

impl Notification {
    const fn callback(self) -> Callback {
        match self {
            Self::New => Callback::New,
            Self::PreChildren => Callback::PreChildren,
            Self::Complete => Callback::Complete,
        }
    }
}

/// The containers and extension instances of one build.
///
/// The tree drives every container through its phases:
///
/// 1. [`Declaring`][ContainerPhase::Declaring] while its bundle runs.
/// 2. [`ChildLinking`][ContainerPhase::ChildLinking] once it links its first child or its
///    declaration ends. Entering this phase notifies every extension in the container
///    (including the ones created by that notification) and then fixes the set of extension types.
/// 3. [`Completing`][ContainerPhase::Completing] once its subtree is done. Extensions complete
///    in descending dependency order and are sealed one by one.
/// 4. [`Done`][ContainerPhase::Done] once its dependants are resolved. Dependants nothing in
///    the container or its subtree provides are handed up to the parent, which resolves them
///    against its own components once it completes.
///
/// [`Assembler`][crate::Assembler] runs all of this for a root bundle. The individual steps are
/// public for callers that need to drive a build by hand.
///
/// # Panics
///
/// Ids and handles are only meaningful for the tree that issued them. The accessors taking a
/// [`ContainerId`] or [`ExtensionId`] panic when given an id this tree never issued;
/// [`extension`][Self::extension] returns `None` instead.
#[derive(Debug)]
pub struct BuildTree {
    registry: Arc<ExtensionRegistry>,
    containers: Vec<ContainerBuildNode>,
    extensions: Vec<ExtensionInstance>,
}

impl BuildTree {
    /// Creates a tree holding only the root container.
    ///
    /// The root is named after the [`Wirelet::name`] among `wirelets`, or else `root_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerName`] if the name is empty or contains a `/`.
    pub fn new(registry: Arc<ExtensionRegistry>, root_name: &str, wirelets: Vec<Wirelet>) -> Result<Self> {
        let wirelets = WireletSet::new(None, wirelets);
        let name = check_name(wirelets.container_name().unwrap_or(root_name))?.to_owned();
        let root = ContainerBuildNode::new(name.clone(), ContainerPath::root(&name), None, wirelets);

        Ok(Self {
            registry,
            containers: vec![root],
            extensions: Vec::new(),
        })
    }

    /// The root container.
    #[must_use]
    pub fn root(&self) -> ContainerId {
        ContainerId(0)
    }

    /// The registry descriptors are taken from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Number of containers in the tree.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Current phase of `container`.
    #[must_use]
    pub fn phase(&self, container: ContainerId) -> ContainerPhase {
        self.node(container).phase
    }

    /// Name of `container`, unique among its siblings.
    #[must_use]
    pub fn name(&self, container: ContainerId) -> &str {
        &self.node(container).name
    }

    /// Path of `container` from the root.
    #[must_use]
    pub fn path(&self, container: ContainerId) -> &ContainerPath {
        &self.node(container).path
    }

    /// Parent of `container`; `None` for the root.
    #[must_use]
    pub fn parent(&self, container: ContainerId) -> Option<ContainerId> {
        self.node(container).parent
    }

    /// Children of `container` in link order.
    #[must_use]
    pub fn children(&self, container: ContainerId) -> &[ContainerId] {
        &self.node(container).children
    }

    /// Components installed into `container`.
    #[must_use]
    pub fn components(&self, container: ContainerId) -> &[Component] {
        &self.node(container).components
    }

    /// Unresolved injection points recorded in `container`.
    #[must_use]
    pub fn dependants(&self, container: ContainerId) -> &[Dependant] {
        &self.node(container).dependants
    }

    /// Extension names of `container` in the order they completed.
    #[must_use]
    pub fn completion_order(&self, container: ContainerId) -> &[&'static str] {
        &self.node(container).completed
    }

    /// Extensions used by `container`, in ascending dependency order.
    #[must_use]
    pub fn extensions(&self, container: ContainerId) -> Vec<ExtensionId> {
        self.ordered_extensions(container)
    }

    /// The instance of `E` in `container`, if the container uses `E`.
    #[must_use]
    pub fn extension_of<E: Extension>(&self, container: ContainerId) -> Option<ExtensionHandle<E>> {
        self.node(container)
            .extensions
            .get(&TypeId::of::<E>())
            .map(|id| ExtensionHandle::new(*id, container))
    }

    /// Borrows the user object behind `handle`.
    ///
    /// Returns `None` while the instance is constructing or running one of its callbacks.
    #[must_use]
    pub fn extension<E: Extension>(&self, handle: ExtensionHandle<E>) -> Option<&E> {
        self.extensions.get(handle.id().0)?.object()?.as_any().downcast_ref()
    }

    /// Lifecycle state of an extension instance.
    #[must_use]
    pub fn extension_state(&self, id: ExtensionId) -> ExtensionState {
        self.instance(id).state()
    }

    /// Descriptor of an extension instance.
    #[must_use]
    pub fn descriptor(&self, id: ExtensionId) -> &Arc<ExtensionDescriptor> {
        self.instance(id).descriptor()
    }

    /// The instance of the same type this instance was linked to as a descendant.
    #[must_use]
    pub fn ancestor_of(&self, id: ExtensionId) -> Option<ExtensionId> {
        self.instance(id).ancestor()
    }

    /// Container owning an extension instance.
    #[must_use]
    pub fn container_of(&self, id: ExtensionId) -> ContainerId {
        self.instance(id).container()
    }

    /// Returns the instance of `E` in `container`, creating it on first use.
    ///
    /// Creating an instance resolves the descriptor of `E`, runs [`Extension::new`], links the
    /// instance to a matching ancestor instance when `E` asks for it, and finally runs
    /// [`Extension::on_new`]. If the container is in its pre-child pass the new instance is
    /// notified as part of that pass.
    ///
    /// `requester` is the extension asking, if any. It must still be configurable for a new
    /// instance to be created on its behalf.
    ///
    /// # Errors
    ///
    /// - [`Error::ContainerNoLongerAcceptsExtensions`] if `E` is new to a container whose
    ///   extension set is fixed.
    /// - [`Error::ExtensionNoLongerConfigurable`] if `requester` is sealed.
    /// - Any error resolving the descriptor of `E` or raised by its callbacks.
    pub fn get_or_create<E: Extension>(&mut self, container: ContainerId, requester: Option<ExtensionId>) -> Result<ExtensionHandle<E>> {
        if let Some(handle) = self.extension_of::<E>(container) {
            return Ok(handle);
        }

        let node = self.node(container);
        if !node.accepts_extensions() {
            return Err(Error::ContainerNoLongerAcceptsExtensions {
                container: node.path.clone(),
                extension: E::NAME,
                phase: node.phase,
            });
        }

        if let Some(requester) = requester {
            self.ensure_configurable(requester)?;
        }

        let descriptor = self.registry.resolve(ExtensionType::of::<E>())?;
        let id = ExtensionId(self.extensions.len());
        self.extensions.push(ExtensionInstance::constructing(container, descriptor));

        // Registered before construction so that dependencies created by the constructor see it.
        let node = self.node_mut(container);
        node.extensions.insert(TypeId::of::<E>(), id);
        if node.pre_child_pass {
            node.pre_child_queue.push_back(id);
        }

        event!(Level::DEBUG, container = %self.path(container), extension = E::NAME, "creating extension");

        let constructed = E::new(&mut ExtensionContext::new(self, id));
        let object = constructed.map_err(|source| self.callback_error(id, Callback::Construct, source))?;
        self.instance_mut(id).constructed(Box::new(object));

        self.link_ancestor(id)?;
        self.notify(id, Notification::New)?;

        Ok(ExtensionHandle::new(id, container))
    }

    /// Runs `bundle` against `container`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bundle`] wrapping whatever the bundle returned, unless that already is an
    /// [`Error`], which is returned unchanged.
    pub fn configure(&mut self, container: ContainerId, bundle: &mut dyn Bundle) -> Result<()> {
        event!(Level::TRACE, container = %self.path(container), "configuring container");

        let result = bundle.configure(&mut BundleContext::new(self, container));
        result.map_err(|source| {
            Error::from_user(source, |source| Error::Bundle {
                container: self.path(container).clone(),
                source,
            })
        })
    }

    /// Adds a child container to `parent` and configures it with `bundle`.
    ///
    /// The parent first enters [`ChildLinking`][ContainerPhase::ChildLinking] if it has not yet.
    /// The child is named after the [`Wirelet::name`] among `wirelets`, or after the bundle, with
    /// a numeric suffix if a sibling already has that name.
    ///
    /// # Errors
    ///
    /// - [`Error::ContainerNoLongerAcceptsChildren`] if the declaration of `parent` is over.
    /// - [`Error::InvalidContainerName`] if the requested name is empty or contains a `/`.
    /// - Any error raised while entering child linking or configuring the child.
    pub fn link(&mut self, parent: ContainerId, bundle: &mut dyn Bundle, wirelets: Vec<Wirelet>) -> Result<ContainerId> {
        self.ensure_accepts_children(parent)?;
        self.enter_child_linking(parent)?;
        self.ensure_accepts_children(parent)?;

        let wirelets = WireletSet::new(Some(&self.node(parent).wirelets), wirelets);
        let requested = wirelets.container_name().map_or_else(|| bundle.name(), ToOwned::to_owned);
        let name = self.unique_child_name(parent, check_name(&requested)?);
        let path = self.path(parent).child(&name);

        let child = ContainerId(self.containers.len());
        self.containers.push(ContainerBuildNode::new(name, path, Some(parent), wirelets));
        self.node_mut(parent).children.push(child);

        event!(Level::DEBUG, container = %self.path(child), "linked container");

        self.configure(child, bundle)?;
        Ok(child)
    }

    /// Moves `container` from [`Declaring`][ContainerPhase::Declaring] to
    /// [`ChildLinking`][ContainerPhase::ChildLinking]. Does nothing in any later phase.
    ///
    /// Every extension of the container receives [`Extension::on_pre_children`], including those
    /// created by another extension during this pass. Afterwards the extension set is fixed and
    /// child links requested by extensions are carried out.
    ///
    /// # Errors
    ///
    /// Any error raised by an extension callback or a deferred link.
    pub fn enter_child_linking(&mut self, container: ContainerId) -> Result<()> {
        if self.phase(container) != ContainerPhase::Declaring {
            return Ok(());
        }

        let pending = self.ordered_extensions(container);
        let node = self.node_mut(container);
        node.phase = ContainerPhase::ChildLinking;
        node.pre_child_pass = true;
        node.pre_child_queue.extend(pending);

        event!(Level::DEBUG, container = %self.path(container), "container entered child linking");

        while let Some(next) = self.node_mut(container).pre_child_queue.pop_front() {
            self.notify(next, Notification::PreChildren)?;
        }

        let node = self.node_mut(container);
        node.pre_child_pass = false;
        node.extensions_fixed = true;

        self.drain_deferred_links(container)
    }

    /// Ends the declaration of `container` and then of its subtree, parents before children.
    ///
    /// # Errors
    ///
    /// Any error raised by an extension callback or a deferred link.
    pub fn finish_declaration(&mut self, container: ContainerId) -> Result<()> {
        self.enter_child_linking(container)?;
        self.drain_deferred_links(container)?;
        self.node_mut(container).children_closed = true;

        event!(Level::TRACE, container = %self.path(container), "container declaration finished");

        let children = self.children(container).to_vec();
        for child in children {
            self.finish_declaration(child)?;
        }

        Ok(())
    }

    /// Completes the subtree of `container`, children before parents.
    ///
    /// Within a container, extensions complete in descending dependency order so that an
    /// extension always completes before the extensions it depends on. Each is sealed as soon as
    /// its own completion returns. The container's dependants are then checked with `resolver`;
    /// whatever it rejects is handed up to the parent, whose own completion may still install a
    /// provider.
    ///
    /// # Errors
    ///
    /// - [`Error::ContainerNotReady`] if the declaration of `container` is not finished.
    /// - [`Error::MissingDependency`] if `resolver` rejects dependants of the root, including
    ///   those handed up by its descendants.
    /// - [`Error::UnconsumedWirelet`] if a wirelet addressed to an extension was never consumed.
    /// - Any error raised by an extension callback.
    pub fn complete(&mut self, container: ContainerId, resolver: &dyn DependencyResolver) -> Result<()> {
        let node = self.node(container);
        if node.phase != ContainerPhase::ChildLinking || !node.children_closed {
            return Err(Error::ContainerNotReady {
                container: node.path.clone(),
                phase: node.phase,
            });
        }

        let children = node.children.clone();
        for child in children {
            self.complete(child, resolver)?;
        }

        self.node_mut(container).phase = ContainerPhase::Completing;

        let mut order = self.ordered_extensions(container);
        order.reverse();

        for id in order {
            self.notify(id, Notification::Complete)?;
            self.instance_mut(id).seal();

            let name = self.instance(id).name();
            self.node_mut(container).completed.push(name);
            event!(Level::TRACE, container = %self.path(container), extension = name, "extension sealed");
        }

        if let Err(missing) = resolver.resolve(&ResolutionScope::new(self, container)) {
            let Some(parent) = self.parent(container) else {
                return Err(missing.into());
            };

            event!(
                Level::DEBUG,
                container = %self.path(container),
                unresolved = missing.missing().len(),
                "handing unresolved dependants to the parent"
            );
            self.node_mut(parent).unresolved.extend_from_slice(missing.missing());
        }

        let node = self.node(container);
        if let Some(wirelet) = node.wirelets.unconsumed() {
            return Err(Error::UnconsumedWirelet {
                container: node.path.clone(),
                wirelet: wirelet.type_name(),
                extension: wirelet.target().map_or("<container>", |target| target.name()),
            });
        }

        self.node_mut(container).phase = ContainerPhase::Done;
        event!(Level::DEBUG, container = %self.path(container), "container done");

        Ok(())
    }

    pub(crate) fn install(&mut self, container: ContainerId, component: Component) -> Result<()> {
        let node = self.node(container);
        if !node.accepts_components() {
            return Err(Error::ContainerNoLongerConfigurable {
                container: node.path.clone(),
                phase: node.phase,
            });
        }

        if node.components.iter().any(|installed| installed.name() == component.name()) {
            return Err(Error::DuplicateComponent {
                container: node.path.clone(),
                component: component.name().to_owned(),
            });
        }

        event!(
            Level::TRACE,
            container = %node.path,
            component = component.name(),
            requires = component.required().len(),
            "installing component"
        );

        let path = node.path.clone();
        let node = self.node_mut(container);
        for key in component.required() {
            let dependant = Dependant::new(&path, component.name(), *key);
            node.unresolved.push(dependant.clone());
            node.dependants.push(dependant);
        }
        node.components.push(component);

        Ok(())
    }

    /// Queues a child link requested by an extension.
    pub(crate) fn defer_link(&mut self, container: ContainerId, bundle: Box<dyn Bundle>, wirelets: Vec<Wirelet>) -> Result<()> {
        self.ensure_accepts_children(container)?;
        self.node_mut(container).deferred_links.push_back(DeferredLink { bundle, wirelets });
        Ok(())
    }

    /// Lends the object of `id` to `f` together with a context for it.
    pub(crate) fn with_extension<E: Extension, R>(&mut self, id: ExtensionId, f: impl FnOnce(&mut E, &mut ExtensionContext<'_>) -> R) -> Result<R> {
        self.ensure_configurable(id)?;

        let Some(mut object) = self.instance_mut(id).lend() else {
            return Err(self.in_use(id));
        };

        let result = {
            let extension = object.as_any_mut().downcast_mut::<E>().expect("extension handle points at a different type");
            f(extension, &mut ExtensionContext::new(self, id))
        };

        self.instance_mut(id).restore(object);
        Ok(result)
    }

    pub(crate) fn ensure_configurable(&self, id: ExtensionId) -> Result<()> {
        let instance = self.instance(id);
        if instance.state() == ExtensionState::Sealed {
            return Err(Error::ExtensionNoLongerConfigurable {
                container: self.path(instance.container()).clone(),
                extension: instance.name(),
                state: instance.state(),
            });
        }

        Ok(())
    }

    /// The closest container providing `key` within the subtree of `container`: the container
    /// itself, then its descendants depth-first.
    pub(crate) fn provider_in_subtree(&self, container: ContainerId, key: ServiceKey) -> Option<ContainerId> {
        if self.node(container).provides(key) {
            return Some(container);
        }

        let mut pending: Vec<_> = self.children(container).iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            if self.node(next).provides(key) {
                return Some(next);
            }
            pending.extend(self.children(next).iter().rev());
        }

        None
    }

    pub(crate) fn unresolved(&self, container: ContainerId) -> &[Dependant] {
        &self.node(container).unresolved
    }

    pub(crate) fn provides(&self, container: ContainerId, key: ServiceKey) -> bool {
        self.node(container).provides(key)
    }

    pub(crate) fn wirelets_mut(&mut self, container: ContainerId) -> &mut WireletSet {
        &mut self.node_mut(container).wirelets
    }

    pub(crate) fn wirelets(&self, container: ContainerId) -> &WireletSet {
        &self.node(container).wirelets
    }

    fn drain_deferred_links(&mut self, container: ContainerId) -> Result<()> {
        while let Some(DeferredLink { mut bundle, wirelets }) = self.node_mut(container).deferred_links.pop_front() {
            self.link(container, bundle.as_mut(), wirelets)?;
        }

        Ok(())
    }

    fn ensure_accepts_children(&self, container: ContainerId) -> Result<()> {
        let node = self.node(container);
        if node.accepts_children() {
            Ok(())
        } else {
            Err(Error::ContainerNoLongerAcceptsChildren {
                container: node.path.clone(),
                phase: node.phase,
            })
        }
    }

    fn unique_child_name(&self, parent: ContainerId, requested: &str) -> String {
        let taken = |candidate: &str| self.children(parent).iter().any(|child| self.name(*child) == candidate);

        if !taken(requested) {
            return requested.to_owned();
        }

        (1_usize..)
            .map(|suffix| format!("{requested}{suffix}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| requested.to_owned())
    }

    fn ordered_extensions(&self, container: ContainerId) -> Vec<ExtensionId> {
        let mut ids: Vec<_> = self.node(container).extensions.values().copied().collect();
        ids.sort_by(|a, b| self.instance(*a).descriptor().cmp(self.instance(*b).descriptor()));
        ids
    }

    /// Runs one lifecycle callback of a constructed extension.
    fn notify(&mut self, id: ExtensionId, notification: Notification) -> Result<()> {
        let Some(mut object) = self.instance_mut(id).lend() else {
            return Err(self.in_use(id));
        };

        let result = {
            let mut cx = ExtensionContext::new(self, id);
            match notification {
                Notification::New => object.on_new(&mut cx),
                Notification::PreChildren => object.on_pre_children(&mut cx),
                Notification::Complete => object.on_complete(&mut cx),
            }
        };

        self.instance_mut(id).restore(object);
        result.map_err(|source| self.callback_error(id, notification.callback(), source))
    }

    /// Links a freshly constructed instance to the matching ancestor instance, if its type asks
    /// for ancestor links, and runs [`Extension::on_descendant`] on the ancestor.
    fn link_ancestor(&mut self, id: ExtensionId) -> Result<()> {
        let Some(ancestor) = self.find_ancestor(id) else {
            return Ok(());
        };
        self.instance_mut(id).set_ancestor(ancestor);

        // Children are only ever linked while no extension of their ancestors is running, so
        // both objects are at hand.
        let Some(mut descendant) = self.instance_mut(id).lend() else {
            return Err(self.in_use(id));
        };
        let result = self
            .instance_mut(ancestor)
            .object_mut()
            .map(|object| object.on_descendant(descendant.as_mut()));
        self.instance_mut(id).restore(descendant);

        let Some(result) = result else {
            return Err(self.in_use(ancestor));
        };
        result.map_err(|source| self.callback_error(ancestor, Callback::Descendant, source))?;

        event!(
            Level::TRACE,
            extension = self.instance(ancestor).name(),
            ancestor = %self.path(self.container_of(ancestor)),
            descendant = %self.path(self.container_of(id)),
            "linked extension to its ancestor"
        );
        Ok(())
    }

    fn find_ancestor(&self, id: ExtensionId) -> Option<ExtensionId> {
        let instance = self.instance(id);
        let scope = instance.descriptor().ancestors()?;
        let extension = instance.descriptor().extension().id();
        let mut current = self.parent(instance.container());

        while let Some(container) = current {
            if let Some(&ancestor) = self.node(container).extensions.get(&extension) {
                return Some(ancestor);
            }

            if scope == AncestorScope::Parent {
                return None;
            }
            current = self.parent(container);
        }

        None
    }

    fn callback_error(&self, id: ExtensionId, callback: Callback, source: BoxError) -> Error {
        let instance = self.instance(id);
        Error::from_user(source, |source| Error::Callback {
            container: self.path(instance.container()).clone(),
            extension: instance.name(),
            callback,
            source,
        })
    }

    fn in_use(&self, id: ExtensionId) -> Error {
        let instance = self.instance(id);
        Error::ExtensionInUse {
            container: self.path(instance.container()).clone(),
            extension: instance.name(),
        }
    }

    fn node(&self, container: ContainerId) -> &ContainerBuildNode {
        &self.containers[container.0]
    }

    fn node_mut(&mut self, container: ContainerId) -> &mut ContainerBuildNode {
        &mut self.containers[container.0]
    }

    fn instance(&self, id: ExtensionId) -> &ExtensionInstance {
        &self.extensions[id.0]
    }

    fn instance_mut(&mut self, id: ExtensionId) -> &mut ExtensionInstance {
        &mut self.extensions[id.0]
    }
}

/// Container names become path segments, so they must be non-empty and free of `/`.
fn check_name(name: &str) -> Result<&str> {
    if name.is_empty() || name.contains('/') {
        return Err(Error::InvalidContainerName { name: name.to_owned() });
    }

    Ok(name)
}
