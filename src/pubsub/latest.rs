// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::trace;

/// An encoded frame, as handed out to viewers.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PublishedFrame {
    /// The encoded JPEG image.
    pub(crate) data: Bytes,

    /// Increases by one with every publish, starting from 1.
    pub(crate) version: u64,

    /// Whether this frame was generated while the camera was unreachable.
    pub(crate) synthetic: bool,
}

/// A single slot holding the most recent frame.
///
/// Publishing replaces the whole frame; readers get a cheap clone of whichever complete frame was
/// current when they looked. Readers never hold the slot's lock for longer than a reference count
/// bump, so a stalled viewer can't hold up the writer.
#[derive(Clone, Debug)]
pub(crate) struct FramePublisher {
    slot: Arc<watch::Sender<Option<PublishedFrame>>>,
}

impl FramePublisher {
    pub(crate) fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Replace the current frame, returning the new version.
    pub(crate) fn publish(&self, data: Bytes, synthetic: bool) -> u64 {
        let mut version = 0;
        self.slot.send_modify(|slot| {
            version = slot.as_ref().map_or(0, |frame| frame.version) + 1;
            *slot = Some(PublishedFrame {
                data,
                version,
                synthetic,
            });
        });
        trace!(version, synthetic, "published frame");
        version
    }

    /// The most recently published frame, if there has been one.
    pub(crate) fn latest(&self) -> Option<PublishedFrame> {
        self.slot.borrow().clone()
    }

    pub(crate) fn has_frame(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl Default for FramePublisher {
    fn default() -> Self {
        Self::new()
    }
}
