// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{Level, event};

use crate::{DeclarationError, Error, Extension, ExtensionDescriptor, ExtensionType, Result};

/// Builds and caches [`ExtensionDescriptor`]s.
///
/// The registry is explicitly owned: create one, wrap it in an [`Arc`] and hand it to every
/// [`Assembler`][crate::Assembler] that should share descriptors. Entries are never invalidated,
/// so a warm registry answers lookups under a read lock only.
///
/// Building descriptors that are not cached yet is serialized under a single lock, which keeps
/// cycle detection reliable when several threads resolve connected extension graphs at once.
/// Declaration failures are cached too, so resolving a broken extension again fails fast with
/// the original cause.
///
/// # Examples
///
/// ```
/// use rigging::{BoxError, Extension, ExtensionContext, ExtensionRegistry};
///
/// struct Logging;
///
/// impl Extension for Logging {
///     const NAME: &'static str = "logging";
///
///     fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
///         Ok(Self)
///     }
/// }
///
/// let registry = ExtensionRegistry::new();
/// let descriptor = registry.resolve_type::<Logging>().unwrap();
/// assert_eq!(descriptor.depth(), 0);
/// ```
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    cache: RwLock<HashMap<TypeId, Entry>>,
    catalog: RwLock<HashMap<&'static str, ExtensionType>>,
    build_lock: Mutex<()>,
}

#[derive(Clone, Debug)]
enum Entry {
    Ready(Arc<ExtensionDescriptor>),
    /// The declaration of `extension` is invalid; also cached for every extension depending on it.
    Failed {
        extension: &'static str,
        source: Arc<DeclarationError>,
    },
}

impl Entry {
    fn into_result(self) -> Result<Arc<ExtensionDescriptor>> {
        match self {
            Self::Ready(descriptor) => Ok(descriptor),
            Self::Failed { extension, source } => Err(Error::ExtensionDeclarationInvalid { extension, source }),
        }
    }
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `E` discoverable by name, so that optional dependencies naming it resolve to it.
    ///
    /// Returns `false` if an extension with the same name was already available.
    pub fn make_available<E: Extension>(&self) -> bool {
        let mut catalog = self.catalog.write();
        if catalog.contains_key(E::NAME) {
            return false;
        }

        catalog.insert(E::NAME, ExtensionType::of::<E>());
        true
    }

    /// Returns the descriptor of `E`, building it on first use.
    ///
    /// # Errors
    ///
    /// See [`resolve`][Self::resolve].
    pub fn resolve_type<E: Extension>(&self) -> Result<Arc<ExtensionDescriptor>> {
        self.resolve(ExtensionType::of::<E>())
    }

    /// Returns the descriptor of `extension`, building it (and its dependencies) on first use.
    ///
    /// # Errors
    ///
    /// - [`Error::CyclicExtensionDependency`] if the dependencies of `extension` form a cycle.
    ///   Nothing on the cycle is cached.
    /// - [`Error::ExtensionDeclarationInvalid`] if the declaration of `extension` or of one of its
    ///   dependencies is malformed.
    pub fn resolve(&self, extension: ExtensionType) -> Result<Arc<ExtensionDescriptor>> {
        if let Some(entry) = self.lookup(extension.id()) {
            return entry.into_result();
        }

        let _guard = self.build_lock.lock();
        DescriptorBuild::new(self).resolve(extension)
    }

    /// Returns the descriptor of an extension if it was already built successfully.
    #[must_use]
    pub fn get(&self, id: TypeId) -> Option<Arc<ExtensionDescriptor>> {
        match self.lookup(id)? {
            Entry::Ready(descriptor) => Some(descriptor),
            Entry::Failed { .. } => None,
        }
    }

    /// Number of cached entries, failures included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Returns `true` if nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    fn lookup(&self, id: TypeId) -> Option<Entry> {
        self.cache.read().get(&id).cloned()
    }

    fn available(&self, name: &str) -> Option<ExtensionType> {
        self.catalog.read().get(name).copied()
    }

    fn insert(&self, id: TypeId, entry: Entry) {
        self.cache.write().insert(id, entry);
    }
}

/// One connected descriptor build, run while holding the registry build lock.
struct DescriptorBuild<'a> {
    registry: &'a ExtensionRegistry,
    in_progress: Vec<ExtensionType>,
}

impl<'a> DescriptorBuild<'a> {
    fn new(registry: &'a ExtensionRegistry) -> Self {
        Self {
            registry,
            in_progress: Vec::new(),
        }
    }

    fn resolve(&mut self, extension: ExtensionType) -> Result<Arc<ExtensionDescriptor>> {
        // Another thread may have finished this one while we waited for the lock.
        if let Some(entry) = self.registry.lookup(extension.id()) {
            return entry.into_result();
        }

        if let Some(start) = self.in_progress.iter().position(|pending| *pending == extension) {
            let mut chain: Vec<_> = self.in_progress[start..].iter().map(ExtensionType::name).collect();
            chain.push(extension.name());

            event!(Level::DEBUG, chain = ?chain, "extension dependency cycle detected");
            return Err(Error::CyclicExtensionDependency { chain });
        }

        let declaration = match extension.declaration() {
            Ok(declaration) => declaration,
            Err(cause) => {
                let source = Arc::new(cause);
                self.registry.insert(
                    extension.id(),
                    Entry::Failed {
                        extension: extension.name(),
                        source: Arc::clone(&source),
                    },
                );

                event!(Level::DEBUG, extension = extension.name(), error = %source, "extension declaration rejected");
                return Err(Error::ExtensionDeclarationInvalid {
                    extension: extension.name(),
                    source,
                });
            }
        };

        self.in_progress.push(extension);
        let dependencies = self.resolve_dependencies(declaration.dependencies(), declaration.optional());
        self.in_progress.pop();

        // An invalid dependency makes the dependant invalid for good; cycles are not cached.
        let dependencies = dependencies.inspect_err(|error| {
            if let Error::ExtensionDeclarationInvalid { extension: invalid, source } = error {
                self.registry.insert(
                    extension.id(),
                    Entry::Failed {
                        extension: *invalid,
                        source: Arc::clone(source),
                    },
                );
            }
        })?;

        let descriptor = Arc::new(ExtensionDescriptor::new(extension, dependencies, declaration.ancestors()));
        self.registry.insert(extension.id(), Entry::Ready(Arc::clone(&descriptor)));

        event!(
            Level::DEBUG,
            extension = descriptor.name(),
            depth = descriptor.depth(),
            "extension descriptor resolved"
        );
        Ok(descriptor)
    }

    fn resolve_dependencies(&mut self, direct: &[ExtensionType], optional: &[&'static str]) -> Result<Vec<Arc<ExtensionDescriptor>>> {
        let mut resolved = Vec::with_capacity(direct.len() + optional.len());

        for dependency in direct {
            resolved.push(self.resolve(*dependency)?);
        }

        for name in optional {
            let Some(dependency) = self.registry.available(name) else {
                continue;
            };

            if direct.contains(&dependency) {
                continue;
            }

            resolved.push(self.resolve(dependency)?);
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxError, Declaration, ExtensionContext};
    use std::result::Result;

    static_assertions::assert_impl_all!(ExtensionRegistry: Send, Sync);

    struct Base;

    impl Extension for Base {
        const NAME: &'static str = "base";

        fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
            Ok(Self)
        }
    }

    struct Metrics;

    impl Extension for Metrics {
        const NAME: &'static str = "metrics";

        fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
            declaration.depends_on::<Base>()
        }

        fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
            Ok(Self)
        }
    }

    struct Web;

    impl Extension for Web {
        const NAME: &'static str = "web";

        fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
            declaration.depends_on::<Base>()?;
            declaration.depends_on_optional("metrics")?;
            declaration.depends_on_optional("tracing")
        }

        fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
            Ok(Self)
        }
    }

    #[test]
    fn resolve_caches_descriptor() {
        let registry = ExtensionRegistry::new();
        assert!(registry.is_empty());

        let first = registry.resolve_type::<Base>().unwrap();
        let second = registry.resolve_type::<Base>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(TypeId::of::<Base>()).is_some());
    }

    #[test]
    fn optional_dependency_ignored_when_unavailable() {
        let registry = ExtensionRegistry::new();
        let web = registry.resolve_type::<Web>().unwrap();

        assert_eq!(web.dependency_names(), vec!["base"]);
        assert_eq!(web.depth(), 1);
        assert!(registry.get(TypeId::of::<Metrics>()).is_none());
    }

    #[test]
    fn optional_dependency_used_when_available() {
        let registry = ExtensionRegistry::new();
        assert!(registry.make_available::<Metrics>());
        assert!(!registry.make_available::<Metrics>());

        let web = registry.resolve_type::<Web>().unwrap();

        assert_eq!(web.dependency_names(), vec!["base", "metrics"]);
        assert_eq!(web.depth(), 2);
        assert!(web.depends_on(TypeId::of::<Metrics>()));
    }
}
