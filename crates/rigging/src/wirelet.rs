// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::{Extension, ExtensionType};

/// A configuration value attached to a container when it is linked.
///
/// Wirelets are visible to the bundle configuring the container and to its extensions. A
/// wirelet either targets the container as a whole or a single extension type; the latter must be
/// picked up by that extension before the container completes. Propagating wirelets are also
/// handed down to every descendant container, where they are visible but not required to be
/// consumed.
///
/// Values from outer containers are listed before values attached directly, so the last match is
/// the most specific one.
///
/// # Examples
///
/// ```
/// use rigging::Wirelet;
///
/// struct Threads(usize);
///
/// let wirelet = Wirelet::new(Threads(4)).propagating();
/// assert!(wirelet.is_propagating());
/// ```
#[derive(Clone)]
pub struct Wirelet {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    target: Option<ExtensionType>,
    propagate: bool,
}

/// Overrides the name of the container a wirelet is attached to.
#[derive(Debug)]
struct ContainerName(String);

impl Wirelet {
    /// A wirelet for the container as a whole.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            target: None,
            propagate: false,
        }
    }

    /// A wirelet only visible to extension `E`, which must consume it.
    #[must_use]
    pub fn for_extension<E: Extension, T: Any + Send + Sync>(value: T) -> Self {
        Self {
            target: Some(ExtensionType::of::<E>()),
            ..Self::new(value)
        }
    }

    /// Names the linked container instead of deriving the name from the bundle.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::new(ContainerName(name.into()))
    }

    /// Hands the wirelet down to every descendant of the container it is attached to.
    #[must_use]
    pub fn propagating(mut self) -> Self {
        self.propagate = true;
        self
    }

    /// Returns `true` if the wirelet is handed down to descendants.
    #[must_use]
    pub fn is_propagating(&self) -> bool {
        self.propagate
    }

    /// The extension this wirelet is addressed to, if any.
    #[must_use]
    pub fn target(&self) -> Option<ExtensionType> {
        self.target
    }

    /// Type name of the carried value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn downcast<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for Wirelet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wirelet")
            .field("type_name", &self.type_name)
            .field("target", &self.target)
            .field("propagate", &self.propagate)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Slot {
    wirelet: Wirelet,
    inherited: bool,
    consumed: bool,
}

/// The wirelets of one container.
#[derive(Debug, Default)]
pub(crate) struct WireletSet {
    slots: Vec<Slot>,
}

impl WireletSet {
    pub(crate) fn new(parent: Option<&Self>, own: Vec<Wirelet>) -> Self {
        let inherited = parent
            .into_iter()
            .flat_map(|parent| parent.slots.iter())
            .filter(|slot| slot.wirelet.propagate)
            .map(|slot| Slot {
                wirelet: slot.wirelet.clone(),
                inherited: true,
                consumed: false,
            });

        let own = own.into_iter().map(|wirelet| Slot {
            // The name only ever applies where it was attached.
            consumed: wirelet.downcast::<ContainerName>().is_some(),
            wirelet,
            inherited: false,
        });

        Self {
            slots: inherited.chain(own).collect(),
        }
    }

    /// The name requested through [`Wirelet::name`], if any.
    pub(crate) fn container_name(&self) -> Option<&str> {
        self.slots
            .iter()
            .filter(|slot| !slot.inherited)
            .find_map(|slot| slot.wirelet.downcast::<ContainerName>())
            .map(|name| name.0.as_str())
    }

    /// Container-wide values of type `T`.
    pub(crate) fn values<T: Any>(&self) -> impl Iterator<Item = &T> {
        self.slots
            .iter()
            .filter(|slot| slot.wirelet.target.is_none())
            .filter_map(|slot| slot.wirelet.downcast::<T>())
    }

    /// Values of type `T` visible to `extension`, marking the ones addressed to it as consumed.
    pub(crate) fn consume<T: Any>(&mut self, extension: TypeId) -> impl Iterator<Item = &T> {
        for slot in &mut self.slots {
            if slot.wirelet.target.is_some_and(|target| target.id() == extension) && slot.wirelet.downcast::<T>().is_some() {
                slot.consumed = true;
            }
        }

        self.slots
            .iter()
            .filter(move |slot| slot.wirelet.target.is_none_or(|target| target.id() == extension))
            .filter_map(|slot| slot.wirelet.downcast::<T>())
    }

    /// The first wirelet addressed to an extension that never picked it up.
    pub(crate) fn unconsumed(&self) -> Option<&Wirelet> {
        self.slots
            .iter()
            .find(|slot| !slot.inherited && !slot.consumed && slot.wirelet.target.is_some())
            .map(|slot| &slot.wirelet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxError, ExtensionContext};

    #[derive(Debug, PartialEq)]
    struct Threads(usize);

    struct Pool;

    impl Extension for Pool {
        const NAME: &'static str = "pool";

        fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
            Ok(Self)
        }
    }

    #[test]
    fn only_propagating_wirelets_are_inherited() {
        let parent = WireletSet::new(None, vec![Wirelet::new(Threads(1)), Wirelet::new(Threads(2)).propagating()]);
        let child = WireletSet::new(Some(&parent), vec![Wirelet::new(Threads(3))]);

        let values: Vec<_> = child.values::<Threads>().collect();
        assert_eq!(values, vec![&Threads(2), &Threads(3)]);
    }

    #[test]
    fn targeted_wirelets_must_be_consumed() {
        let pool = TypeId::of::<Pool>();
        let mut set = WireletSet::new(None, vec![Wirelet::for_extension::<Pool, _>(Threads(8))]);

        assert_eq!(set.values::<Threads>().count(), 0);
        assert_eq!(set.unconsumed().map(Wirelet::type_name), Some(std::any::type_name::<Threads>()));

        let seen: Vec<_> = set.consume::<Threads>(pool).collect();
        assert_eq!(seen, vec![&Threads(8)]);
        assert!(set.unconsumed().is_none());
    }

    #[test]
    fn inherited_targeted_wirelets_are_optional() {
        let parent = WireletSet::new(None, vec![Wirelet::for_extension::<Pool, _>(Threads(8)).propagating()]);
        let child = WireletSet::new(Some(&parent), Vec::new());

        assert!(child.unconsumed().is_none());
    }

    #[test]
    fn name_applies_to_own_container_only() {
        let parent = WireletSet::new(None, vec![Wirelet::name("jobs").propagating()]);
        let child = WireletSet::new(Some(&parent), Vec::new());

        assert_eq!(parent.container_name(), Some("jobs"));
        assert_eq!(child.container_name(), None);
    }
}
