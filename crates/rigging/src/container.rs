// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::TypeId;
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::wirelet::WireletSet;
use crate::{Bundle, Component, Dependant, ExtensionId, Wirelet};

/// Index of a container within a [`BuildTree`][crate::BuildTree].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub(crate) usize);

/// Slash-separated path of a container from the root, such as `/app/jobs`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerPath(String);

impl ContainerPath {
    pub(crate) fn root(name: &str) -> Self {
        Self(format!("/{name}"))
    }

    pub(crate) fn child(&self, name: &str) -> Self {
        Self(format!("{}/{name}", self.0))
    }

    /// Number of ancestors; `0` for the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.matches('/').count().saturating_sub(1)
    }

    /// The path as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build phase of a container. Phases only ever move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContainerPhase {
    /// The bundle is adding components, extensions and children.
    Declaring,
    /// Extensions have been notified ahead of child linking; children are being linked.
    ChildLinking,
    /// Children are done; extensions are completing and dependants are being resolved.
    Completing,
    /// Terminal.
    Done,
}

/// A child link requested by an extension, performed once the pre-child pass is over.
pub(crate) struct DeferredLink {
    pub(crate) bundle: Box<dyn Bundle>,
    pub(crate) wirelets: Vec<Wirelet>,
}

impl fmt::Debug for DeferredLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredLink")
            .field("bundle", &self.bundle.name())
            .field("wirelets", &self.wirelets)
            .finish()
    }
}

/// Build-time state of one container.
#[derive(Debug)]
pub(crate) struct ContainerBuildNode {
    pub(crate) name: String,
    pub(crate) path: ContainerPath,
    pub(crate) parent: Option<ContainerId>,
    pub(crate) children: Vec<ContainerId>,
    pub(crate) phase: ContainerPhase,
    /// Set once the pre-child pass is over; no new extension types from then on.
    pub(crate) extensions_fixed: bool,
    /// Set once the declaration of the container is over; no new children from then on.
    pub(crate) children_closed: bool,
    pub(crate) extensions: HashMap<TypeId, ExtensionId>,
    /// Extensions still waiting for their pre-child notification.
    pub(crate) pre_child_queue: VecDeque<ExtensionId>,
    pub(crate) pre_child_pass: bool,
    pub(crate) deferred_links: VecDeque<DeferredLink>,
    pub(crate) components: Vec<Component>,
    pub(crate) dependants: Vec<Dependant>,
    /// Dependants to resolve on completion: the container's own, then those handed up by children.
    pub(crate) unresolved: Vec<Dependant>,
    pub(crate) wirelets: WireletSet,
    /// Extension names in the order they completed.
    pub(crate) completed: Vec<&'static str>,
}

impl ContainerBuildNode {
    pub(crate) fn new(name: String, path: ContainerPath, parent: Option<ContainerId>, wirelets: WireletSet) -> Self {
        Self {
            name,
            path,
            parent,
            children: Vec::new(),
            phase: ContainerPhase::Declaring,
            extensions_fixed: false,
            children_closed: false,
            extensions: HashMap::new(),
            pre_child_queue: VecDeque::new(),
            pre_child_pass: false,
            deferred_links: VecDeque::new(),
            components: Vec::new(),
            dependants: Vec::new(),
            unresolved: Vec::new(),
            wirelets,
            completed: Vec::new(),
        }
    }

    /// Whether a new extension type may still be registered.
    pub(crate) fn accepts_extensions(&self) -> bool {
        !self.extensions_fixed && self.phase < ContainerPhase::Completing
    }

    /// Whether a child container may still be linked.
    pub(crate) fn accepts_children(&self) -> bool {
        !self.children_closed && self.phase < ContainerPhase::Completing
    }

    /// Whether components may still be installed.
    pub(crate) fn accepts_components(&self) -> bool {
        self.phase < ContainerPhase::Done
    }

    pub(crate) fn provides(&self, key: crate::ServiceKey) -> bool {
        self.components.iter().any(|component| component.provided().contains(&key))
    }
}
