// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::TypeId;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::{AncestorScope, ExtensionType};

/// Immutable metadata about an extension type, built once per registry.
///
/// Descriptors are totally ordered by dependency depth, then by name, then by type id. An
/// extension always orders after every extension it depends on.
#[derive(Debug)]
pub struct ExtensionDescriptor {
    extension: ExtensionType,
    dependencies: Vec<Arc<Self>>,
    depth: usize,
    ancestors: Option<AncestorScope>,
}

impl ExtensionDescriptor {
    pub(crate) fn new(extension: ExtensionType, dependencies: Vec<Arc<Self>>, ancestors: Option<AncestorScope>) -> Self {
        let depth = dependencies.iter().map(|dependency| dependency.depth + 1).max().unwrap_or(0);

        Self {
            extension,
            dependencies,
            depth,
            ancestors,
        }
    }

    /// The extension this descriptor describes.
    #[must_use]
    pub fn extension(&self) -> ExtensionType {
        self.extension
    }

    /// Shorthand for the extension name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.extension.name()
    }

    /// Resolved dependencies, direct ones first, then optional ones that were available.
    #[must_use]
    pub fn dependencies(&self) -> &[Arc<Self>] {
        &self.dependencies
    }

    /// Returns `true` if the extension may use `id`.
    #[must_use]
    pub fn depends_on(&self, id: TypeId) -> bool {
        self.dependencies.iter().any(|dependency| dependency.extension.id() == id)
    }

    /// `0` without dependencies, otherwise one more than the deepest dependency.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Which ancestor instance, if any, is linked to new instances of this extension.
    #[must_use]
    pub fn ancestors(&self) -> Option<AncestorScope> {
        self.ancestors
    }

    /// Names of the resolved dependencies, for diagnostics.
    #[must_use]
    pub fn dependency_names(&self) -> Vec<&'static str> {
        self.dependencies.iter().map(|dependency| dependency.name()).collect()
    }

    fn sort_key(&self) -> (usize, &'static str, TypeId) {
        (self.depth, self.extension.name(), self.extension.id())
    }
}

impl PartialEq for ExtensionDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.extension == other.extension
    }
}

impl Eq for ExtensionDescriptor {}

impl PartialOrd for ExtensionDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExtensionDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
