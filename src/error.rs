// SPDX-License-Identifier: GPL-3.0-or-later
use std::io;

use thiserror::Error;

/// Errors from the device transport. Any of these tears down the current device session.
#[derive(Debug, Error)]
pub(crate) enum TransportError {
    #[error("I/O error talking to the camera: {0}")]
    Io(#[from] io::Error),

    #[error("camera did not respond within {0:?}")]
    Timeout(std::time::Duration),

    #[error("camera closed the connection")]
    Closed,

    #[error("no open camera session")]
    NotConnected,

    #[error("camera message exceeds {limit} bytes without an end marker")]
    Oversized { limit: usize },

    #[error("unable to parse camera message: {0}")]
    Protocol(#[from] serde_json::Error),
}

/// A frame payload that could not be turned into a
/// [`ThermalGrid`][crate::image_buffer::ThermalGrid].
#[derive(Debug, Error)]
pub(crate) enum DecodeError {
    #[error("frame does not carry radiometric data")]
    NotRadiometric,

    #[error("radiometric payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("radiometric payload has an odd number of bytes ({0})")]
    OddLength(usize),

    #[error("expected {expected} samples, found {actual}")]
    WrongSize { expected: usize, actual: usize },
}

/// The requested palette name isn't one of the built-in palettes.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("unknown palette '{0}'")]
pub(crate) struct PaletteNotFound(pub(crate) String);

#[derive(Debug, Error)]
pub(crate) enum EncodeError {
    #[error("image buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("cannot encode an empty image")]
    Empty,

    #[error("JPEG encoder failure: {0}")]
    Codec(String),
}

impl From<image::ImageError> for EncodeError {
    fn from(err: image::ImageError) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Failures while processing a single frame. These drop the frame, but leave the connection up.
#[derive(Debug, Error)]
pub(crate) enum FrameError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}
