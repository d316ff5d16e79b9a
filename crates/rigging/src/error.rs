// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use thiserror::Error;

use crate::{Callback, ContainerPath, ContainerPhase, ExtensionState, MissingDependency};

/// A boxed error returned by user code (bundles, extensions, runtimes).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for assembly operations that return a rigging
/// [`Error`][enum@Error] on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that aborted an assembly.
///
/// Every variant is fatal to the build it was raised in. The build is never retried and no partial
/// artifact is produced; the caller is expected to discard the build and start over.
#[derive(Debug, Error)]
#[non_exhaustive]
#[expect(missing_docs, reason = "variant fields are covered by the variant docs")]
pub enum Error {
    /// Extension dependencies form a cycle. The chain starts and ends with the same extension.
    #[error("cyclic extension dependency: {}", .chain.join(" -> "))]
    CyclicExtensionDependency { chain: Vec<&'static str> },

    /// The declaration of an extension is malformed.
    ///
    /// The failure is remembered by the registry, so resolving the same extension again fails
    /// with the same cause.
    #[error("invalid declaration of extension {extension}")]
    ExtensionDeclarationInvalid {
        extension: &'static str,
        #[source]
        source: Arc<DeclarationError>,
    },

    /// An extension asked for another extension it did not declare as a dependency.
    #[error("extension {extension} cannot use {requested}, declared dependencies are [{}]", .declared.join(", "))]
    UndeclaredExtensionDependency {
        extension: &'static str,
        requested: &'static str,
        declared: Vec<&'static str>,
    },

    /// A new extension type was requested after the container stopped accepting them.
    #[error("container {container} no longer accepts new extensions ({extension} requested in phase {phase:?})")]
    ContainerNoLongerAcceptsExtensions {
        container: ContainerPath,
        extension: &'static str,
        phase: ContainerPhase,
    },

    /// A child container was linked after the container closed its child list.
    #[error("container {container} no longer accepts child containers (phase {phase:?})")]
    ContainerNoLongerAcceptsChildren { container: ContainerPath, phase: ContainerPhase },

    /// A container name is empty or contains a `/`, so it cannot be a path segment.
    #[error("invalid container name {name:?}: names must be non-empty and must not contain '/'")]
    InvalidContainerName { name: String },

    /// The container is done and rejects any further mutation.
    #[error("container {container} no longer accepts configuration (phase {phase:?})")]
    ContainerNoLongerConfigurable { container: ContainerPath, phase: ContainerPhase },

    /// A phase transition was requested before its preconditions held.
    #[error("container {container} is not ready for completion (phase {phase:?})")]
    ContainerNotReady { container: ContainerPath, phase: ContainerPhase },

    /// A configuration call reached an extension that no longer accepts configuration.
    #[error("extension {extension} in {container} is no longer configurable (state {state:?})")]
    ExtensionNoLongerConfigurable {
        container: ContainerPath,
        extension: &'static str,
        state: ExtensionState,
    },

    /// The extension is currently executing one of its own callbacks (or is still under
    /// construction) and cannot be borrowed a second time.
    #[error("extension {extension} in {container} is in use")]
    ExtensionInUse { container: ContainerPath, extension: &'static str },

    /// Dependants of a container could not be satisfied.
    #[error(transparent)]
    MissingDependency(#[from] MissingDependency),

    /// A wirelet addressed to an extension was never picked up by it.
    #[error("wirelet {wirelet} for extension {extension} was not consumed in {container}")]
    UnconsumedWirelet {
        container: ContainerPath,
        wirelet: &'static str,
        extension: &'static str,
    },

    /// Two components with the same name were installed into one container.
    #[error("component {component} is already installed in {container}")]
    DuplicateComponent { container: ContainerPath, component: String },

    /// User extension code failed.
    #[error("extension {extension} in {container} failed during {callback}")]
    Callback {
        container: ContainerPath,
        extension: &'static str,
        callback: Callback,
        #[source]
        source: BoxError,
    },

    /// User bundle code failed.
    #[error("bundle configuring {container} failed")]
    Bundle {
        container: ContainerPath,
        #[source]
        source: BoxError,
    },

    /// The runtime consuming the assembly failed to produce the artifact.
    #[error("runtime failed to create the artifact")]
    Runtime {
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Wraps an error returned by user code, unless it is already a rigging error raised further
    /// down, which then surfaces unchanged.
    pub(crate) fn from_user(source: BoxError, wrap: impl FnOnce(BoxError) -> Self) -> Self {
        match source.downcast::<Self>() {
            Ok(error) => *error,
            Err(other) => wrap(other),
        }
    }
}

/// Why the declaration of an extension was rejected.
#[derive(Debug, Error)]
#[non_exhaustive]
#[expect(missing_docs, reason = "variant fields are covered by the variant docs")]
pub enum DeclarationError {
    /// The same dependency was declared twice.
    #[error("dependency {dependency} is declared more than once")]
    DuplicateDependency { dependency: &'static str },

    /// An optional dependency was declared with an empty name.
    #[error("optional dependency names must not be empty")]
    EmptyOptionalName,

    /// The extension rejected its own declaration.
    #[error("{reason}")]
    Rejected { reason: String },
}

impl DeclarationError {
    /// Creates a rejection with a human-readable reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn cycle_message_lists_chain() {
        let error = Error::CyclicExtensionDependency { chain: vec!["a", "b", "a"] };
        assert_eq!(error.to_string(), "cyclic extension dependency: a -> b -> a");
    }

    #[test]
    fn declaration_invalid_exposes_cause() {
        let error = Error::ExtensionDeclarationInvalid {
            extension: "jobs",
            source: Arc::new(DeclarationError::rejected("no cron support")),
        };

        let source = error.source().expect("cause should be attached");
        assert_eq!(source.to_string(), "no cron support");
    }

    #[test]
    fn from_user_passes_rigging_errors_through() {
        let inner: BoxError = Box::new(Error::CyclicExtensionDependency { chain: vec!["x", "x"] });
        let error = Error::from_user(inner, |source| Error::Runtime { source });
        assert!(matches!(error, Error::CyclicExtensionDependency { .. }));
    }

    #[test]
    fn from_user_wraps_foreign_errors() {
        let error = Error::from_user("boom".into(), |source| Error::Runtime { source });
        let Error::Runtime { source } = error else {
            panic!("expected a runtime error, got {error:?}");
        };
        assert_eq!(source.to_string(), "boom");
    }
}
