// SPDX-License-Identifier: GPL-3.0-or-later
use image::{GrayImage, ImageBuffer, Luma, RgbImage};

/// Width of a radiometric frame, in pixels.
pub(crate) const FRAME_WIDTH: u32 = 160;

/// Height of a radiometric frame, in pixels.
pub(crate) const FRAME_HEIGHT: u32 = 120;

/// Number of samples in a radiometric frame.
pub(crate) const FRAME_PIXELS: usize = (FRAME_WIDTH * FRAME_HEIGHT) as usize;

/// Images where each point is a raw 16-bit sensor reading.
pub(crate) type ThermalGrid = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Tone mapped 8-bit intensities, same dimensions as the source [`ThermalGrid`].
pub(crate) type IntensityGrid = GrayImage;

/// An image ready to be encoded.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RenderedImage {
    /// Single channel, straight from the tone mapper.
    Gray(GrayImage),

    /// Three channel false-color image.
    Rgb(RgbImage),
}

impl RenderedImage {
    pub(crate) fn width(&self) -> u32 {
        match self {
            Self::Gray(image) => image.width(),
            Self::Rgb(image) => image.width(),
        }
    }

    pub(crate) fn height(&self) -> u32 {
        match self {
            Self::Gray(image) => image.height(),
            Self::Rgb(image) => image.height(),
        }
    }

    /// The number of channels per pixel.
    pub(crate) fn channels(&self) -> u8 {
        match self {
            Self::Gray(_) => 1,
            Self::Rgb(_) => 3,
        }
    }

    /// The raw, row-major sample data.
    pub(crate) fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Gray(image) => image.as_raw(),
            Self::Rgb(image) => image.as_raw(),
        }
    }
}
