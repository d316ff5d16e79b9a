// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(dead_code, reason = "not every test file uses every helper")]

//! Shared extensions and bundles for the integration tests.

use std::sync::Arc;

use rigging::{Assembler, BoxError, Bundle, BundleContext, ExtensionContext, ExtensionRegistry, Wirelet};
use testing_aids::Journal;

/// The journal handed down to every container of a build, or a detached one outside of a build
/// that was given none.
pub fn journal(cx: &mut ExtensionContext<'_>) -> Journal {
    cx.wirelet::<Journal>().cloned().unwrap_or_default()
}

/// An assembler for a root named `app` whose containers all see `journal`.
pub fn assembler(journal: &Journal) -> Assembler {
    Assembler::new(Arc::new(ExtensionRegistry::new()))
        .with_root_name("app")
        .with_wirelet(Wirelet::new(journal.clone()).propagating())
}

/// Defines an extension that records its lifecycle into the build journal and uses each of its
/// dependencies from its constructor.
macro_rules! recording_extension {
    ($ty:ident, $name:literal $(, $dependency:ident)*) => {
        struct $ty {
            journal: ::testing_aids::Journal,
        }

        impl ::rigging::Extension for $ty {
            const NAME: &'static str = $name;

            fn declare(declaration: &mut ::rigging::Declaration) -> Result<(), ::rigging::DeclarationError> {
                $(declaration.depends_on::<$dependency>()?;)*
                let _ = declaration;
                Ok(())
            }

            fn new(cx: &mut ::rigging::ExtensionContext<'_>) -> Result<Self, ::rigging::BoxError> {
                let journal = crate::util::journal(cx);
                journal.record(format!("new {} {}", $name, cx.path()));
                $(cx.use_extension::<$dependency>()?;)*
                Ok(Self { journal })
            }

            fn on_pre_children(&mut self, cx: &mut ::rigging::ExtensionContext<'_>) -> Result<(), ::rigging::BoxError> {
                self.journal.record(format!("pre-children {} {}", $name, cx.path()));
                Ok(())
            }

            fn on_complete(&mut self, cx: &mut ::rigging::ExtensionContext<'_>) -> Result<(), ::rigging::BoxError> {
                self.journal.record(format!("complete {} {}", $name, cx.path()));
                Ok(())
            }
        }
    };
}

/// A bundle that uses extension `E` and nothing else.
pub struct Uses<E>(std::marker::PhantomData<fn() -> E>);

impl<E> Uses<E> {
    pub fn new() -> Self {
        Self(std::marker::PhantomData)
    }
}

impl<E: rigging::Extension> Bundle for Uses<E> {
    fn configure(&mut self, cx: &mut BundleContext<'_>) -> Result<(), BoxError> {
        cx.use_extension::<E>()?;
        Ok(())
    }

    fn name(&self) -> String {
        E::NAME.to_owned()
    }
}

/// A bundle that does nothing.
pub struct Empty;

impl Bundle for Empty {
    fn configure(&mut self, _cx: &mut BundleContext<'_>) -> Result<(), BoxError> {
        Ok(())
    }
}
