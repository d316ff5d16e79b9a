// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An unpublished crate containing testing utilities for use within this repo.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

mod journal;
mod log;

pub use journal::*;
pub use log::*;

/// If something (whatever) does not happen in a test within this time, the test will fail.
///
/// Only meant to break out of deadlocks, not for any situation that is actually expected.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes a thread-safe function on a background thread and abandons it if it does not complete
/// before [`TEST_TIMEOUT`].
///
/// Returns `None` if the function panicked or timed out.
#[must_use]
pub fn execute_or_abandon<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (sender, receiver) = mpsc::channel();

    // A panic drops the sender, which the receiver observes as a disconnect.
    thread::spawn(move || {
        _ = sender.send(f());
    });

    receiver.recv_timeout(TEST_TIMEOUT).ok()
}
