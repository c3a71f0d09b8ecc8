// SPDX-License-Identifier: GPL-3.0-or-later
use crate::error::DecodeError;
use crate::image_buffer::{ThermalGrid, FRAME_HEIGHT, FRAME_PIXELS, FRAME_WIDTH};

use super::transport::{FrameKind, RawFrame};

/// Decode a radiometric frame into a grid of raw sensor values.
///
/// The payload is base64 text wrapping little-endian `u16` samples in row-major order.
pub(crate) fn decode(frame: RawFrame) -> Result<ThermalGrid, DecodeError> {
    if frame.kind != FrameKind::Radiometric {
        return Err(DecodeError::NotRadiometric);
    }
    let bytes = base64::decode(&frame.payload)?;
    decode_samples(&bytes)
}

fn decode_samples(bytes: &[u8]) -> Result<ThermalGrid, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    let sample_count = bytes.len() / 2;
    if sample_count != FRAME_PIXELS {
        return Err(DecodeError::WrongSize {
            expected: FRAME_PIXELS,
            actual: sample_count,
        });
    }
    let samples: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    ThermalGrid::from_raw(FRAME_WIDTH, FRAME_HEIGHT, samples).ok_or(DecodeError::WrongSize {
        expected: FRAME_PIXELS,
        actual: sample_count,
    })
}

/// Encode a grid the same way the camera does. The inverse of [`decode`].
#[cfg(test)]
pub(crate) fn encode_payload(grid: &ThermalGrid) -> String {
    let bytes: Vec<u8> = grid
        .as_raw()
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect();
    base64::encode(bytes)
}
