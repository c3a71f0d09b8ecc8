// SPDX-License-Identifier: GPL-3.0-or-later
use bytes::Bytes;
use tracing::trace;

use crate::camera::{self, RawFrame};
use crate::error::{EncodeError, FrameError};
use crate::image_buffer::{RenderedImage, ThermalGrid};
use crate::stream::encode_jpeg;

pub(crate) mod palette;
mod settings;
mod tone_map;

pub(crate) use palette::PaletteSelection;
pub(crate) use settings::{Quality, RenderSettings};
use tone_map::ToneMapper;

/// Runs a frame through tone mapping, the selected palette and the JPEG encoder.
///
/// The palette is looked up for every frame, so changes made through the [`PaletteSelection`]
/// apply to the next frame rendered.
#[derive(Clone, Debug)]
pub(crate) struct FrameRenderer {
    mapper: ToneMapper,
    quality: Quality,
    palettes: PaletteSelection,
}

impl FrameRenderer {
    pub(crate) fn new(settings: &RenderSettings, palettes: PaletteSelection) -> Self {
        Self {
            mapper: ToneMapper::new(settings.tone_map),
            quality: settings.quality,
            palettes,
        }
    }

    pub(crate) fn render_image(&self, grid: &ThermalGrid) -> RenderedImage {
        let intensities = self.mapper.map(grid);
        let palette = self.palettes.current();
        trace!(palette = palette.name(), "rendering frame");
        palette.render(&intensities)
    }

    pub(crate) fn render(&self, grid: &ThermalGrid) -> Result<Bytes, EncodeError> {
        encode_jpeg(&self.render_image(grid), self.quality)
    }

    /// Decode and render a frame from the camera.
    pub(crate) fn render_frame(&self, frame: RawFrame) -> Result<Bytes, FrameError> {
        let grid = camera::decode(frame)?;
        Ok(self.render(&grid)?)
    }
}
