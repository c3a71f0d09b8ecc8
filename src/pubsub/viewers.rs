// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts the connected stream viewers.
#[derive(Clone, Debug, Default)]
pub(crate) struct ViewerCount(Arc<AtomicUsize>);

impl ViewerCount {
    /// Register a new viewer. The viewer is counted until the token is dropped.
    pub(crate) fn token(&self) -> ViewerToken {
        self.0.fetch_add(1, Ordering::SeqCst);
        ViewerToken(Arc::clone(&self.0))
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Held by a stream for as long as a viewer is connected.
#[derive(Debug)]
pub(crate) struct ViewerToken(Arc<AtomicUsize>);

impl Drop for ViewerToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
