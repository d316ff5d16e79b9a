// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use crate::{BoxError, BundleContext};

/// A user-authored unit of configuration for one container.
///
/// # Examples
///
/// ```
/// use rigging::{BoxError, Bundle, BundleContext, Component};
///
/// struct Jobs;
///
/// impl Bundle for Jobs {
///     fn configure(&mut self, cx: &mut BundleContext<'_>) -> Result<(), BoxError> {
///         cx.install(Component::new("scheduler"))?;
///         Ok(())
///     }
/// }
///
/// assert_eq!(Jobs.name(), "Jobs");
/// ```
pub trait Bundle: 'static {
    /// Declares the content of the container behind `cx`.
    ///
    /// # Errors
    ///
    /// Any error aborts the build.
    fn configure(&mut self, cx: &mut BundleContext<'_>) -> Result<(), BoxError>;

    /// Name given to the container unless a [`Wirelet::name`][crate::Wirelet::name] overrides it.
    ///
    /// Defaults to the type name without its module path and without a trailing `Bundle`.
    fn name(&self) -> String {
        default_name(std::any::type_name::<Self>())
    }
}

fn default_name(type_name: &str) -> String {
    let plain = type_name.split('<').next().unwrap_or(type_name);
    let short = plain.rsplit("::").next().unwrap_or(plain);

    match short.strip_suffix("Bundle") {
        Some(stem) if !stem.is_empty() => stem.to_owned(),
        _ => short.to_owned(),
    }
}

/// A bundle backed by a closure, see [`from_fn`].
pub struct FnBundle<F> {
    configure: F,
}

/// Creates a [`Bundle`] from a closure.
///
/// # Examples
///
/// ```
/// use rigging::{Bundle, from_fn};
///
/// let bundle = from_fn(|_cx| Ok(()));
/// assert_eq!(bundle.name(), "bundle");
/// ```
pub fn from_fn<F>(configure: F) -> FnBundle<F>
where
    F: FnMut(&mut BundleContext<'_>) -> Result<(), BoxError> + 'static,
{
    FnBundle { configure }
}

impl<F> Bundle for FnBundle<F>
where
    F: FnMut(&mut BundleContext<'_>) -> Result<(), BoxError> + 'static,
{
    fn configure(&mut self, cx: &mut BundleContext<'_>) -> Result<(), BoxError> {
        (self.configure)(cx)
    }

    fn name(&self) -> String {
        "bundle".to_owned()
    }
}

impl<F> fmt::Debug for FnBundle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBundle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_strips_path_and_suffix() {
        assert_eq!(default_name("app::jobs::JobsBundle"), "Jobs");
        assert_eq!(default_name("app::Bundle"), "Bundle");
        assert_eq!(default_name("app::Wrapper<app::Inner>"), "Wrapper");
        assert_eq!(default_name("Plain"), "Plain");
    }
}
