// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::{Any, TypeId};
use std::fmt;

use crate::{BoxError, DeclarationError, ExtensionContext};

/// A pluggable unit of container behavior.
///
/// An extension is instantiated at most once per container, the first time the container (or
/// another extension of the same container) asks for it. It then moves through a fixed sequence
/// of callbacks:
///
/// 1. [`new`][Self::new] constructs the instance; it may already use declared dependencies.
/// 2. [`on_descendant`][Self::on_descendant] runs on the nearest same-type ancestor, if the
///    extension asked for ancestor links in its declaration.
/// 3. [`on_new`][Self::on_new] runs right after construction.
/// 4. [`on_pre_children`][Self::on_pre_children] runs exactly once, before any child container of
///    the owning container proceeds with its own linking.
/// 5. [`on_complete`][Self::on_complete] runs once all child containers have completed. Within a
///    container, extensions complete in decreasing dependency depth, so an extension completes
///    before the extensions it depends on. The instance is sealed afterwards.
///
/// # Examples
///
/// ```
/// use rigging::{Declaration, DeclarationError, Extension, ExtensionContext, BoxError};
///
/// struct Config;
///
/// impl Extension for Config {
///     const NAME: &'static str = "config";
///
///     fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
///         Ok(Self)
///     }
/// }
///
/// struct Web;
///
/// impl Extension for Web {
///     const NAME: &'static str = "web";
///
///     fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
///         declaration.depends_on::<Config>()
///     }
///
///     fn new(cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
///         cx.use_extension::<Config>()?;
///         Ok(Self)
///     }
/// }
/// ```
pub trait Extension: Sized + 'static {
    /// Stable, human-readable name. Used for ordering ties, diagnostics and to match optional
    /// dependencies.
    const NAME: &'static str;

    /// Declares dependencies and other static properties of the extension.
    ///
    /// Called once per registry. Returning an error marks the extension as permanently invalid
    /// for that registry.
    ///
    /// # Errors
    ///
    /// Returns a [`DeclarationError`] if the declaration is malformed.
    fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
        let _ = declaration;
        Ok(())
    }

    /// Constructs the extension for the container behind `cx`.
    ///
    /// # Errors
    ///
    /// Any error aborts the build.
    fn new(cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError>;

    /// Called right after construction.
    ///
    /// # Errors
    ///
    /// Any error aborts the build.
    fn on_new(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        let _ = cx;
        Ok(())
    }

    /// Called before child containers of the owning container are linked.
    ///
    /// # Errors
    ///
    /// Any error aborts the build.
    fn on_pre_children(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        let _ = cx;
        Ok(())
    }

    /// Called once every child container has completed.
    ///
    /// # Errors
    ///
    /// Any error aborts the build.
    fn on_complete(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        let _ = cx;
        Ok(())
    }

    /// Called on an ancestor instance when a same-type instance is created further down the
    /// container tree. Only invoked when the declaration asked for it via
    /// [`Declaration::link_ancestors`].
    ///
    /// # Errors
    ///
    /// Any error aborts the build.
    fn on_descendant(&mut self, descendant: &mut Self) -> Result<(), BoxError> {
        let _ = descendant;
        Ok(())
    }
}

/// Identity of an extension type, usable without naming the type statically.
#[derive(Clone, Copy)]
pub struct ExtensionType {
    id: TypeId,
    name: &'static str,
    declare: fn(&mut Declaration) -> Result<(), DeclarationError>,
}

impl ExtensionType {
    /// Returns the identity of `E`.
    #[must_use]
    pub fn of<E: Extension>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: E::NAME,
            declare: E::declare,
        }
    }

    /// The [`TypeId`] of the extension.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The [`Extension::NAME`] of the extension.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn declaration(&self) -> Result<Declaration, DeclarationError> {
        let mut declaration = Declaration::default();
        (self.declare)(&mut declaration)?;
        Ok(declaration)
    }
}

impl PartialEq for ExtensionType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ExtensionType {}

impl fmt::Debug for ExtensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Which ancestor instance is linked to a newly created extension instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AncestorScope {
    /// Only an instance in the direct parent container is considered.
    Parent,
    /// The closest ancestor container holding an instance of the same type is used.
    Nearest,
}

/// Static properties an extension declares about itself.
#[derive(Debug, Default)]
pub struct Declaration {
    dependencies: Vec<ExtensionType>,
    optional: Vec<&'static str>,
    ancestors: Option<AncestorScope>,
}

impl Declaration {
    /// Declares a direct dependency on `E`.
    ///
    /// # Errors
    ///
    /// Fails if `E` was already declared.
    pub fn depends_on<E: Extension>(&mut self) -> Result<(), DeclarationError> {
        let dependency = ExtensionType::of::<E>();
        if self.dependencies.contains(&dependency) {
            return Err(DeclarationError::DuplicateDependency { dependency: E::NAME });
        }

        self.dependencies.push(dependency);
        Ok(())
    }

    /// Declares a dependency on the extension named `name`, if one with that name was made
    /// available in the registry. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Fails if `name` is empty or was already declared.
    pub fn depends_on_optional(&mut self, name: &'static str) -> Result<(), DeclarationError> {
        if name.is_empty() {
            return Err(DeclarationError::EmptyOptionalName);
        }

        if self.optional.contains(&name) {
            return Err(DeclarationError::DuplicateDependency { dependency: name });
        }

        self.optional.push(name);
        Ok(())
    }

    /// Asks for [`Extension::on_descendant`] to be called on an ancestor instance whenever a new
    /// instance is created.
    pub fn link_ancestors(&mut self, scope: AncestorScope) {
        self.ancestors = Some(scope);
    }

    pub(crate) fn dependencies(&self) -> &[ExtensionType] {
        &self.dependencies
    }

    pub(crate) fn optional(&self) -> &[&'static str] {
        &self.optional
    }

    pub(crate) fn ancestors(&self) -> Option<AncestorScope> {
        self.ancestors
    }
}

/// The lifecycle callbacks of an extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callback {
    /// [`Extension::new`].
    Construct,
    /// [`Extension::on_new`].
    New,
    /// [`Extension::on_pre_children`].
    PreChildren,
    /// [`Extension::on_complete`].
    Complete,
    /// [`Extension::on_descendant`].
    Descendant,
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Construct => "construction",
            Self::New => "on_new",
            Self::PreChildren => "on_pre_children",
            Self::Complete => "on_complete",
            Self::Descendant => "on_descendant",
        })
    }
}

/// Object-safe view of an [`Extension`], used to drive callbacks without knowing the type.
pub(crate) trait ErasedExtension: Any {
    fn on_new(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError>;

    fn on_pre_children(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError>;

    fn on_complete(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError>;

    fn on_descendant(&mut self, descendant: &mut dyn ErasedExtension) -> Result<(), BoxError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: Extension> ErasedExtension for E {
    fn on_new(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        Extension::on_new(self, cx)
    }

    fn on_pre_children(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        Extension::on_pre_children(self, cx)
    }

    fn on_complete(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        Extension::on_complete(self, cx)
    }

    fn on_descendant(&mut self, descendant: &mut dyn ErasedExtension) -> Result<(), BoxError> {
        // Ancestor links only ever connect instances of the same type.
        let descendant = descendant
            .as_any_mut()
            .downcast_mut::<E>()
            .ok_or("ancestor link between different extension types")?;
        Extension::on_descendant(self, descendant)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
