// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{BoxError, BuildTree, Component, ContainerId, ContainerPath, Dependant};

/// The kind of artifact an assembly is meant to become.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A runnable application.
    #[default]
    Application,
    /// A service injector without a run loop.
    Injector,
    /// A description of the assembled tree, used for inspection and tooling.
    Descriptor,
}

/// One container of a finished [`Assembly`].
#[derive(Clone, Debug)]
pub struct AssembledContainer {
    id: ContainerId,
    name: String,
    path: ContainerPath,
    parent: Option<ContainerId>,
    children: Vec<ContainerId>,
    extensions: Vec<&'static str>,
    components: Vec<Component>,
    dependants: Vec<Dependant>,
}

impl AssembledContainer {
    /// Id of the container; also its index in [`Assembly::containers`].
    #[must_use]
    pub fn id(&self) -> ContainerId {
        self.id
    }

    /// Name of the container.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the container.
    #[must_use]
    pub fn path(&self) -> &ContainerPath {
        &self.path
    }

    /// Parent of the container; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<ContainerId> {
        self.parent
    }

    /// Children of the container in link order.
    #[must_use]
    pub fn children(&self) -> &[ContainerId] {
        &self.children
    }

    /// Extensions of the container in the order they completed.
    #[must_use]
    pub fn extensions(&self) -> &[&'static str] {
        &self.extensions
    }

    /// Components installed into the container.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// The resolved injection points of the container.
    #[must_use]
    pub fn dependants(&self) -> &[Dependant] {
        &self.dependants
    }
}

/// The closed, fully resolved result of assembling a root bundle.
///
/// Every container in an assembly is done and every extension in it is sealed.
#[derive(Clone, Debug)]
pub struct Assembly {
    kind: ArtifactKind,
    containers: Vec<AssembledContainer>,
}

impl Assembly {
    pub(crate) fn capture(tree: &BuildTree, kind: ArtifactKind) -> Self {
        let containers = (0..tree.container_count())
            .map(ContainerId)
            .map(|id| AssembledContainer {
                id,
                name: tree.name(id).to_owned(),
                path: tree.path(id).clone(),
                parent: tree.parent(id),
                children: tree.children(id).to_vec(),
                extensions: tree.completion_order(id).to_vec(),
                components: tree.components(id).to_vec(),
                dependants: tree.dependants(id).to_vec(),
            })
            .collect();

        Self { kind, containers }
    }

    /// The kind of artifact requested.
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// The root container.
    #[must_use]
    pub fn root(&self) -> &AssembledContainer {
        &self.containers[0]
    }

    /// All containers, parents before their children.
    #[must_use]
    pub fn containers(&self) -> &[AssembledContainer] {
        &self.containers
    }

    /// The container with the given id.
    #[must_use]
    pub fn container(&self, id: ContainerId) -> Option<&AssembledContainer> {
        self.containers.get(id.0)
    }

    /// Looks up a container by path, such as `/app/jobs`.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&AssembledContainer> {
        self.containers.iter().find(|container| container.path.as_str() == path)
    }
}

/// Turns an [`Assembly`] into a runnable artifact.
pub trait Runtime {
    /// What the runtime produces.
    type Artifact;

    /// Creates the artifact.
    ///
    /// # Errors
    ///
    /// Any error is reported as [`Error::Runtime`][crate::Error::Runtime].
    fn launch(&self, assembly: Assembly) -> Result<Self::Artifact, BoxError>;
}
