// SPDX-License-Identifier: GPL-3.0-or-later
use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// What kind of data a message from the camera carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FrameKind {
    /// A base64 encoded, 16-bit radiometric image.
    Radiometric,

    /// Status replies, acknowledgements, and anything else.
    Other,
}

/// An undecoded message from the camera.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RawFrame {
    pub(crate) kind: FrameKind,
    pub(crate) payload: Bytes,
}

impl RawFrame {
    pub(crate) fn radiometric<B: Into<Bytes>>(payload: B) -> Self {
        Self {
            kind: FrameKind::Radiometric,
            payload: payload.into(),
        }
    }

    pub(crate) fn other<B: Into<Bytes>>(payload: B) -> Self {
        Self {
            kind: FrameKind::Other,
            payload: payload.into(),
        }
    }
}

/// The result of a connection attempt that didn't fail outright.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ConnectStatus {
    Connected,

    /// The camera was reachable, but the session couldn't be established.
    Refused(String),
}

/// The primitives the acquisition loop needs from a camera.
///
/// Every call is fallible, and the acquisition loop bounds each one with a timeout.
#[async_trait]
pub(crate) trait Transport: Send {
    /// Open a session with the camera at `host:port`.
    async fn connect(&mut self, host: &str, port: u16) -> Result<ConnectStatus, TransportError>;

    /// Ask the camera to start pushing frames continuously.
    async fn start_stream(&mut self) -> Result<(), TransportError>;

    /// Retrieve the next streamed frame, or `None` if nothing is ready yet.
    async fn get_frame(&mut self) -> Result<Option<RawFrame>, TransportError>;

    /// Request a single image outside of streaming mode.
    async fn get_image(&mut self) -> Result<Option<RawFrame>, TransportError>;

    /// Release the session. Safe to call when no session is open.
    async fn shutdown(&mut self) -> Result<(), TransportError>;
}
