// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Assembles applications from bundles and extensions through a phased container build.
//!
//! An application is described by a root [`Bundle`]. The bundle configures the root container:
//! it installs [`Component`]s, asks for [`Extension`]s and links child containers, each
//! configured by its own bundle. Extensions add framework behavior to a container and may depend
//! on other extensions, which the [`ExtensionRegistry`] resolves into cached
//! [`ExtensionDescriptor`]s.
//!
//! The [`Assembler`] drives every container of the tree through the same phases (see
//! [`ContainerPhase`]) and produces an [`Assembly`], which a [`Runtime`] can turn into an
//! artifact. The guarantees an extension can rely on:
//!
//! - It is created at most once per container and only on demand.
//! - It is notified before any child of its container proceeds with linking.
//! - It completes only after every child container is done, and before the extensions it
//!   depends on.
//! - After completing it is sealed and rejects further configuration.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use rigging::{Assembler, BoxError, Bundle, BundleContext, Extension, ExtensionContext, ExtensionRegistry};
//!
//! #[derive(Default)]
//! struct Jobs {
//!     scheduled: Vec<String>,
//! }
//!
//! impl Extension for Jobs {
//!     const NAME: &'static str = "jobs";
//!
//!     fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
//!         Ok(Self::default())
//!     }
//! }
//!
//! struct App;
//!
//! impl Bundle for App {
//!     fn configure(&mut self, cx: &mut BundleContext<'_>) -> Result<(), BoxError> {
//!         cx.with_extension::<Jobs, _>(|jobs, _| jobs.scheduled.push("cleanup".to_owned()))?;
//!         Ok(())
//!     }
//! }
//!
//! let tree = Assembler::new(Arc::new(ExtensionRegistry::new())).build_tree(App).unwrap();
//! let jobs = tree.extension_of::<Jobs>(tree.root()).unwrap();
//! assert_eq!(tree.extension(jobs).unwrap().scheduled, ["cleanup"]);
//! ```

mod artifact;
mod assembler;
mod build;
mod bundle;
mod component;
mod container;
mod context;
mod descriptor;
mod error;
mod extension;
mod instance;
mod registry;
mod resolver;
mod wirelet;

pub use artifact::{ArtifactKind, AssembledContainer, Assembly, Runtime};
pub use assembler::Assembler;
pub use build::BuildTree;
pub use bundle::{Bundle, FnBundle, from_fn};
pub use component::{Component, Dependant, ServiceKey};
pub use container::{ContainerId, ContainerPath, ContainerPhase};
pub use context::{BundleContext, ExtensionContext};
pub use descriptor::ExtensionDescriptor;
pub use error::{BoxError, DeclarationError, Error, Result};
pub use extension::{AncestorScope, Callback, Declaration, Extension, ExtensionType};
pub use instance::{ExtensionHandle, ExtensionId, ExtensionState};
pub use registry::ExtensionRegistry;
pub use resolver::{DependencyResolver, MissingDependency, ResolutionScope, ScopedResolver};
pub use wirelet::Wirelet;
