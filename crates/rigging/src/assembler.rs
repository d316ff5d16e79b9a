// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use tracing::{Level, event};

use crate::{ArtifactKind, Assembly, BuildTree, Bundle, DependencyResolver, Error, ExtensionRegistry, Result, Runtime, ScopedResolver, Wirelet};

/// Collects what is needed to assemble a root bundle and runs the build.
///
/// An assembly runs in three passes over the container tree:
///
/// 1. The root bundle configures the root container, linking children as it goes. Each linked
///    child is configured before the call returns.
/// 2. Declaration is finished top-down, which notifies every extension ahead of child linking
///    in containers that never linked a child and carries out child links requested by
///    extensions.
/// 3. Containers complete bottom-up.
///
/// Any error aborts the build and nothing is produced.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use rigging::{Assembler, Component, ExtensionRegistry, from_fn};
///
/// let assembly = Assembler::new(Arc::new(ExtensionRegistry::new()))
///     .with_root_name("app")
///     .assemble(from_fn(|cx| {
///         cx.install(Component::new("clock"))?;
///         Ok(())
///     }))
///     .unwrap();
///
/// assert_eq!(assembly.root().path().as_str(), "/app");
/// ```
#[derive(Debug)]
pub struct Assembler {
    registry: Arc<ExtensionRegistry>,
    resolver: Arc<dyn DependencyResolver>,
    root_name: Option<String>,
    wirelets: Vec<Wirelet>,
    kind: ArtifactKind,
}

impl Assembler {
    /// Creates an assembler taking extension descriptors from `registry`.
    ///
    /// Assemblers sharing a registry share its descriptor cache.
    #[must_use]
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            registry,
            resolver: Arc::new(ScopedResolver),
            root_name: None,
            wirelets: Vec::new(),
            kind: ArtifactKind::default(),
        }
    }

    /// Names the root container. Defaults to the name of the root bundle.
    #[must_use]
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = Some(name.into());
        self
    }

    /// Passes a wirelet to the root container.
    #[must_use]
    pub fn with_wirelet(mut self, wirelet: Wirelet) -> Self {
        self.wirelets.push(wirelet);
        self
    }

    /// Sets the kind of artifact to produce. Defaults to [`ArtifactKind::Application`].
    #[must_use]
    pub const fn with_kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = kind;
        self
    }

    /// Replaces the [`ScopedResolver`] used to check dependants.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl DependencyResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// The registry descriptors are taken from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Assembles `bundle` and returns the finished tree with its extension objects.
    ///
    /// # Errors
    ///
    /// Any error raised during the build.
    pub fn build_tree<B: Bundle>(&self, mut bundle: B) -> Result<BuildTree> {
        let root_name = self.root_name.clone().unwrap_or_else(|| bundle.name());
        let span = tracing::debug_span!("assemble", root = %root_name, kind = ?self.kind);
        let _entered = span.enter();

        let result = BuildTree::new(Arc::clone(&self.registry), &root_name, self.wirelets.clone()).and_then(|mut tree| {
            let root = tree.root();
            tree.configure(root, &mut bundle)?;
            tree.finish_declaration(root)?;
            tree.complete(root, self.resolver.as_ref())?;
            Ok(tree)
        });

        match result {
            Ok(tree) => {
                event!(Level::DEBUG, containers = tree.container_count(), "assembly finished");
                Ok(tree)
            }
            Err(error) => {
                event!(Level::DEBUG, %error, "assembly failed");
                Err(error)
            }
        }
    }

    /// Assembles `bundle`.
    ///
    /// # Errors
    ///
    /// Any error raised during the build.
    pub fn assemble<B: Bundle>(&self, bundle: B) -> Result<Assembly> {
        let tree = self.build_tree(bundle)?;
        Ok(Assembly::capture(&tree, self.kind))
    }

    /// Assembles `bundle` and hands the result to `runtime`.
    ///
    /// # Errors
    ///
    /// Any error raised during the build, or [`Error::Runtime`] if the runtime fails.
    pub fn build<B: Bundle, R: Runtime>(&self, bundle: B, runtime: &R) -> Result<R::Artifact> {
        let assembly = self.assemble(bundle)?;

        runtime.launch(assembly).map_err(|source| {
            event!(Level::ERROR, error = %source, "runtime failed to create the artifact");
            Error::from_user(source, |source| Error::Runtime { source })
        })
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(Arc::new(ExtensionRegistry::new()))
    }
}
