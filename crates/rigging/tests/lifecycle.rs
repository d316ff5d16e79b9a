// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "test code")]

//! Extension lifecycle across the container tree.

#[macro_use]
mod util;

use rigging::{
    AncestorScope, BoxError, Bundle, BundleContext, Callback, ContainerPhase, Declaration, DeclarationError, Error, Extension,
    ExtensionContext, ExtensionState, Wirelet, from_fn,
};
use testing_aids::Journal;
use util::{Empty, Uses, assembler};

recording_extension!(Base, "base");
recording_extension!(Middle, "middle", Base);
recording_extension!(Top, "top", Middle);
recording_extension!(Echo, "echo");

#[test]
fn extensions_complete_before_their_dependencies() {
    let journal = Journal::new();
    let tree = assembler(&journal).build_tree(Uses::<Top>::new()).unwrap();

    assert_eq!(tree.completion_order(tree.root()), ["top", "middle", "base"]);
    journal.assert_before("complete top /app", "complete middle /app");
    journal.assert_before("complete middle /app", "complete base /app");
}

#[test]
fn extension_is_created_once_per_container() {
    let journal = Journal::new();
    let bundle = from_fn(|cx| {
        let top = cx.use_extension::<Top>()?;
        let base = cx.use_extension::<Base>()?;

        assert_eq!(cx.use_extension::<Top>()?, top);
        assert_eq!(cx.use_extension::<Base>()?, base);
        assert_eq!(cx.tree().extensions(cx.container()).len(), 3);
        Ok(())
    });

    assembler(&journal).build_tree(bundle).unwrap();

    // Base was first requested from the constructor of Middle.
    assert_eq!(journal.count("new base /app"), 1);
    assert_eq!(journal.count("new middle /app"), 1);
    assert_eq!(journal.count("new top /app"), 1);
    journal.assert_before("new middle /app", "new base /app");
}

#[test]
fn every_extension_is_sealed_after_assembly() {
    let journal = Journal::new();
    let tree = assembler(&journal).build_tree(Uses::<Top>::new()).unwrap();
    let root = tree.root();

    assert_eq!(tree.phase(root), ContainerPhase::Done);
    for id in tree.extensions(root) {
        assert_eq!(tree.extension_state(id), ExtensionState::Sealed);
    }
}

#[test]
fn done_container_rejects_new_extensions() {
    let journal = Journal::new();
    let mut tree = assembler(&journal).build_tree(Empty).unwrap();
    let root = tree.root();

    let error = tree.get_or_create::<Echo>(root, None).unwrap_err();
    assert!(matches!(
        error,
        Error::ContainerNoLongerAcceptsExtensions {
            extension: "echo",
            phase: ContainerPhase::Done,
            ..
        }
    ));
}

#[test]
fn linking_a_child_fixes_the_extension_set() {
    let journal = Journal::new();
    let bundle = from_fn(|cx| {
        cx.use_extension::<Base>()?;
        cx.link(Empty)?;

        // Already present, so still available.
        cx.use_extension::<Base>()?;
        cx.use_extension::<Echo>()?;
        Ok(())
    });

    let error = assembler(&journal).assemble(bundle).unwrap_err();
    let Error::ContainerNoLongerAcceptsExtensions { container, extension, phase } = error else {
        panic!("expected a rejected extension, got {error:?}");
    };
    assert_eq!(container.as_str(), "/app");
    assert_eq!(extension, "echo");
    assert_eq!(phase, ContainerPhase::ChildLinking);
}

struct Nosy;

impl Extension for Nosy {
    const NAME: &'static str = "nosy";

    fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
        declaration.depends_on::<Base>()
    }

    fn new(cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        let own = cx.use_extension::<Self>()?;
        util::journal(cx).record(format!("self-use {}", own.id() == cx.id()));

        cx.use_extension::<Echo>()?;
        Ok(Self)
    }
}

#[test]
fn undeclared_extension_is_rejected_and_self_use_allowed() {
    let journal = Journal::new();
    let error = assembler(&journal).assemble(Uses::<Nosy>::new()).unwrap_err();

    let Error::UndeclaredExtensionDependency {
        extension,
        requested,
        declared,
    } = error
    else {
        panic!("expected an undeclared dependency, got {error:?}");
    };
    assert_eq!(extension, "nosy");
    assert_eq!(requested, "echo");
    assert_eq!(declared, ["base"]);
    assert_eq!(journal.entries(), ["self-use true"]);
}

struct ChildWithEcho;

impl Bundle for ChildWithEcho {
    fn configure(&mut self, cx: &mut BundleContext<'_>) -> Result<(), BoxError> {
        cx.use_extension::<Echo>()?;
        Ok(())
    }

    fn name(&self) -> String {
        "child".to_owned()
    }
}

#[test]
fn parent_and_child_extensions_interleave_top_down_then_bottom_up() {
    let journal = Journal::new();
    let bundle = from_fn(|cx| {
        cx.use_extension::<Echo>()?;
        cx.link(ChildWithEcho)?;
        Ok(())
    });

    let tree = assembler(&journal).build_tree(bundle).unwrap();
    let root = tree.root();
    let child = tree.children(root)[0];

    let in_root = tree.extension_of::<Echo>(root).unwrap();
    let in_child = tree.extension_of::<Echo>(child).unwrap();
    assert_ne!(in_root.id(), in_child.id());
    assert_eq!(tree.path(child).as_str(), "/app/child");

    // The root is notified before its child is even configured.
    journal.assert_before("pre-children echo /app", "new echo /app/child");
    journal.assert_before("pre-children echo /app", "pre-children echo /app/child");
    journal.assert_before("complete echo /app/child", "complete echo /app");
    assert_eq!(journal.count("pre-children echo /app"), 1);
    assert_eq!(journal.count("pre-children echo /app/child"), 1);
}

/// Creates [`Echo`] while its container notifies extensions ahead of child linking.
struct Trigger;

impl Extension for Trigger {
    const NAME: &'static str = "trigger";

    fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
        declaration.depends_on::<Echo>()
    }

    fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        Ok(Self)
    }

    fn on_pre_children(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        util::journal(cx).record("pre-children trigger");
        cx.use_extension::<Echo>()?;
        Ok(())
    }
}

#[test]
fn extensions_created_during_notification_are_notified_too() {
    let journal = Journal::new();
    let bundle = from_fn(|cx| {
        cx.use_extension::<Trigger>()?;
        cx.link_with(ChildWithEcho, vec![Wirelet::name("leaf")])?;
        Ok(())
    });

    assembler(&journal).assemble(bundle).unwrap();

    journal.assert_before("pre-children trigger", "new echo /app");
    journal.assert_before("new echo /app", "pre-children echo /app");
    journal.assert_before("pre-children echo /app", "new echo /app/leaf");
    assert_eq!(journal.count("pre-children echo /app"), 1);
}

/// Requests a child container from its pre-child notification.
struct Spawner;

impl Extension for Spawner {
    const NAME: &'static str = "spawner";

    fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        Ok(Self)
    }

    fn on_pre_children(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        cx.link_with(ChildWithEcho, vec![Wirelet::name("spawned")])?;
        util::journal(cx).record("link requested");
        Ok(())
    }
}

#[test]
fn extension_links_run_after_notification() {
    let journal = Journal::new();
    let assembly = assembler(&journal).assemble(Uses::<Spawner>::new()).unwrap();

    let spawned = assembly.find("/app/spawned").unwrap();
    assert_eq!(spawned.extensions(), ["echo"]);
    assert_eq!(assembly.root().children(), [spawned.id()]);
    journal.assert_before("link requested", "new echo /app/spawned");
}

/// Tries to link a child container while completing.
struct LateSpawner;

impl Extension for LateSpawner {
    const NAME: &'static str = "late-spawner";

    fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        Ok(Self)
    }

    fn on_complete(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        cx.link(Empty)?;
        Ok(())
    }
}

#[test]
fn completing_extension_cannot_link_children() {
    let journal = Journal::new();
    let error = assembler(&journal).assemble(Uses::<LateSpawner>::new()).unwrap_err();

    assert!(matches!(error, Error::ContainerNoLongerAcceptsChildren { phase: ContainerPhase::Completing, .. }));
}

/// Counts how many same-type ancestors it is linked below.
struct Level<const NEAREST: bool> {
    level: usize,
    journal: Journal,
}

impl<const NEAREST: bool> Extension for Level<NEAREST> {
    const NAME: &'static str = if NEAREST { "nearest-level" } else { "parent-level" };

    fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
        declaration.link_ancestors(if NEAREST { AncestorScope::Nearest } else { AncestorScope::Parent });
        Ok(())
    }

    fn new(cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        Ok(Self {
            level: 0,
            journal: util::journal(cx),
        })
    }

    fn on_new(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        self.journal.record(format!("{} {} level {}", Self::NAME, cx.path(), self.level));
        Ok(())
    }

    fn on_descendant(&mut self, descendant: &mut Self) -> Result<(), BoxError> {
        descendant.level = self.level + 1;
        Ok(())
    }
}

/// Root and grandchild use `E`, the child in between does not.
fn skip_generation<E: Extension>() -> impl Bundle {
    from_fn(|cx| {
        cx.use_extension::<E>()?;
        cx.link_with(
            from_fn(|cx| {
                cx.link_with(Uses::<E>::new(), vec![Wirelet::name("grandchild")])?;
                Ok(())
            }),
            vec![Wirelet::name("child")],
        )?;
        Ok(())
    })
}

#[test]
fn nearest_ancestor_link_skips_generations() {
    let journal = Journal::new();
    let tree = assembler(&journal).build_tree(skip_generation::<Level<true>>()).unwrap();

    let root = tree.root();
    let grandchild = tree.children(tree.children(root)[0])[0];
    let ancestor = tree.extension_of::<Level<true>>(root).unwrap();
    let descendant = tree.extension_of::<Level<true>>(grandchild).unwrap();

    assert_eq!(tree.ancestor_of(descendant.id()), Some(ancestor.id()));
    assert_eq!(tree.extension(descendant).unwrap().level, 1);
    assert!(journal.entries().contains(&"nearest-level /app/child/grandchild level 1".to_owned()));
}

#[test]
fn parent_ancestor_link_checks_only_the_parent() {
    let journal = Journal::new();
    let tree = assembler(&journal).build_tree(skip_generation::<Level<false>>()).unwrap();

    let root = tree.root();
    let grandchild = tree.children(tree.children(root)[0])[0];
    let descendant = tree.extension_of::<Level<false>>(grandchild).unwrap();

    assert_eq!(tree.ancestor_of(descendant.id()), None);
    assert_eq!(tree.extension(descendant).unwrap().level, 0);
}

#[test]
fn parent_ancestor_link_reaches_direct_child() {
    let journal = Journal::new();
    let bundle = from_fn(|cx| {
        cx.use_extension::<Level<false>>()?;
        cx.link(Uses::<Level<false>>::new())?;
        Ok(())
    });

    let tree = assembler(&journal).build_tree(bundle).unwrap();
    let child = tree.children(tree.root())[0];
    let descendant = tree.extension_of::<Level<false>>(child).unwrap();

    assert_eq!(tree.extension(descendant).unwrap().level, 1);
}

/// Configures [`Base`] from its own completion, which runs before that of [`Base`].
struct Finisher;

impl Extension for Finisher {
    const NAME: &'static str = "finisher";

    fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
        declaration.depends_on::<Base>()
    }

    fn new(cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        cx.use_extension::<Base>()?;
        Ok(Self)
    }

    fn on_complete(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        let state = cx.with_dependency::<Base, _>(|base, cx| {
            base.journal.record("base configured by finisher");
            cx.state()
        })?;
        assert_eq!(state, ExtensionState::Configurable);
        Ok(())
    }
}

#[test]
fn dependency_is_configurable_while_dependant_completes() {
    let journal = Journal::new();
    assembler(&journal).assemble(Uses::<Finisher>::new()).unwrap();

    journal.assert_before("base configured by finisher", "complete base /app");
}

/// Fails from the callback named by its wirelet.
struct Faulty {
    fail_in: Callback,
}

impl Extension for Faulty {
    const NAME: &'static str = "faulty";

    fn new(cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        let fail_in = cx.wirelet::<Callback>().copied().unwrap_or(Callback::Complete);
        if fail_in == Callback::Construct {
            return Err("cannot construct".into());
        }
        Ok(Self { fail_in })
    }

    fn on_pre_children(&mut self, _cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        if self.fail_in == Callback::PreChildren {
            return Err("cannot notify".into());
        }
        Ok(())
    }

    fn on_complete(&mut self, _cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        Err("cannot complete".into())
    }
}

#[test]
fn callback_failures_name_the_callback() {
    for (callback, message) in [
        (Callback::Construct, "cannot construct"),
        (Callback::PreChildren, "cannot notify"),
        (Callback::Complete, "cannot complete"),
    ] {
        let journal = Journal::new();
        let error = assembler(&journal)
            .with_wirelet(Wirelet::for_extension::<Faulty, _>(callback))
            .assemble(Uses::<Faulty>::new())
            .unwrap_err();

        let Error::Callback {
            container,
            extension,
            callback: failed_in,
            source,
        } = error
        else {
            panic!("expected a callback failure, got {error:?}");
        };
        assert_eq!(container.as_str(), "/app");
        assert_eq!(extension, "faulty");
        assert_eq!(failed_in, callback);
        assert_eq!(source.to_string(), message);
    }
}

/// Reaches for itself while one of its own callbacks is running.
struct Reentrant;

impl Extension for Reentrant {
    const NAME: &'static str = "reentrant";

    fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        Ok(Self)
    }

    fn on_pre_children(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        cx.with_dependency::<Self, _>(|_, _| ())?;
        Ok(())
    }
}

#[test]
fn running_extension_cannot_be_borrowed_again() {
    let journal = Journal::new();
    let error = assembler(&journal).assemble(Uses::<Reentrant>::new()).unwrap_err();

    let Error::ExtensionInUse { container, extension } = error else {
        panic!("expected the extension to be in use, got {error:?}");
    };
    assert_eq!(container.as_str(), "/app");
    assert_eq!(extension, "reentrant");
}

/// Refuses every descendant instance.
struct Exclusive;

impl Extension for Exclusive {
    const NAME: &'static str = "exclusive";

    fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
        declaration.link_ancestors(AncestorScope::Nearest);
        Ok(())
    }

    fn new(_cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        Ok(Self)
    }

    fn on_descendant(&mut self, _descendant: &mut Self) -> Result<(), BoxError> {
        Err("only one exclusive per tree".into())
    }
}

#[test]
fn ancestor_link_failure_names_the_ancestor() {
    let journal = Journal::new();
    let error = assembler(&journal).assemble(skip_generation::<Exclusive>()).unwrap_err();

    let Error::Callback {
        container,
        extension,
        callback,
        source,
    } = error
    else {
        panic!("expected a callback failure, got {error:?}");
    };
    assert_eq!(container.as_str(), "/app");
    assert_eq!(extension, "exclusive");
    assert_eq!(callback, Callback::Descendant);
    assert_eq!(source.to_string(), "only one exclusive per tree");
}
