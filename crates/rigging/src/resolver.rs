// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use thiserror::Error;

use crate::{BuildTree, ContainerId, ContainerPath, Dependant};

/// Resolves the dependants of a container once it completes.
///
/// Called exactly once per container, after all of its extensions completed. The scope only
/// offers providers that can no longer change at that point: the container itself and its
/// descendants, which are all done. Dependants a container rejects are handed up to its parent,
/// where they are offered again once the parent completes, against the parent's own components.
/// Only a rejection by the root fails the build.
pub trait DependencyResolver: fmt::Debug + Send + Sync {
    /// Checks the dependants in `scope`.
    ///
    /// # Errors
    ///
    /// Returns the dependants that cannot be satisfied.
    fn resolve(&self, scope: &ResolutionScope<'_>) -> Result<(), MissingDependency>;
}

/// What a [`DependencyResolver`] sees of a completing container.
#[derive(Debug)]
pub struct ResolutionScope<'a> {
    tree: &'a BuildTree,
    container: ContainerId,
}

impl<'a> ResolutionScope<'a> {
    pub(crate) fn new(tree: &'a BuildTree, container: ContainerId) -> Self {
        Self { tree, container }
    }

    /// The completing container.
    #[must_use]
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// Path of the completing container.
    #[must_use]
    pub fn path(&self) -> &'a ContainerPath {
        self.tree.path(self.container)
    }

    /// Returns `true` for the root, where rejected dependants fail the build.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.tree.parent(self.container).is_none()
    }

    /// The dependants to resolve: those recorded in the container, followed by those its
    /// children handed up.
    #[must_use]
    pub fn dependants(&self) -> &'a [Dependant] {
        self.tree.unresolved(self.container)
    }

    /// The container satisfying `dependant`, if any.
    ///
    /// A dependant recorded in this container looks at the container itself, then at its
    /// descendants depth-first. A dependant handed up by a child has already been offered to that
    /// child's subtree and only looks at this container.
    #[must_use]
    pub fn provider(&self, dependant: &Dependant) -> Option<&'a ContainerPath> {
        let path = self.path();
        let key = dependant.key();

        let provider = if dependant.container() == path {
            self.tree.provider_in_subtree(self.container, key)
        } else {
            self.tree.provides(self.container, key).then_some(self.container)
        };

        provider.map(|provider| self.tree.path(provider))
    }
}

/// Satisfies a dependant when any container in the scope of [`ResolutionScope::provider`]
/// provides the service.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScopedResolver;

impl DependencyResolver for ScopedResolver {
    fn resolve(&self, scope: &ResolutionScope<'_>) -> Result<(), MissingDependency> {
        let missing: Vec<_> = scope
            .dependants()
            .iter()
            .filter(|dependant| scope.provider(dependant).is_none())
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MissingDependency::new(scope.path().clone(), missing))
        }
    }
}

/// Dependants of a container that no provider satisfies.
#[derive(Clone, Debug, Error)]
#[error("missing dependencies in {container}: {}", display_list(.container, .missing))]
pub struct MissingDependency {
    container: ContainerPath,
    missing: Vec<Dependant>,
}

impl MissingDependency {
    /// Creates a report for `container`.
    #[must_use]
    pub fn new(container: ContainerPath, missing: Vec<Dependant>) -> Self {
        Self { container, missing }
    }

    /// The container that rejected the dependants; each names its own origin.
    #[must_use]
    pub fn container(&self) -> &ContainerPath {
        &self.container
    }

    /// The unsatisfied dependants.
    #[must_use]
    pub fn missing(&self) -> &[Dependant] {
        &self.missing
    }
}

fn display_list(container: &ContainerPath, missing: &[Dependant]) -> String {
    missing
        .iter()
        .map(|dependant| {
            if dependant.container() == container {
                dependant.to_string()
            } else {
                format!("{dependant} (in {})", dependant.container())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
