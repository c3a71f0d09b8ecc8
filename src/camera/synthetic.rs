// SPDX-License-Identifier: GPL-3.0-or-later
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::image_buffer::{ThermalGrid, FRAME_HEIGHT, FRAME_WIDTH};

/// Radiometric samples are in hundredths of a kelvin. This is 20 °C.
pub(crate) const SYNTHETIC_MIN: u16 = 29_315;

/// 40 °C.
pub(crate) const SYNTHETIC_MAX: u16 = 31_315;

/// Generates plausible looking frames for when the camera is unreachable: a room temperature
/// background with a little sensor noise and one warm spot.
#[derive(Debug)]
pub(crate) struct SyntheticFrames<R = StdRng> {
    rng: R,
}

impl SyntheticFrames<StdRng> {
    pub(crate) fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub(crate) fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SyntheticFrames<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> SyntheticFrames<R> {
    pub(crate) fn next_grid(&mut self) -> ThermalGrid {
        let background: i32 = self.rng.gen_range(29_600..=30_000);
        let center_x = self.rng.gen_range(0.0..FRAME_WIDTH as f32);
        let center_y = self.rng.gen_range(0.0..FRAME_HEIGHT as f32);
        let radius: f32 = self.rng.gen_range(10.0..30.0);
        let peak: f32 = self.rng.gen_range(500.0..1_000.0);
        let rng = &mut self.rng;
        ThermalGrid::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            let dx = x as f32 - center_x;
            let dy = y as f32 - center_y;
            let falloff = (1.0 - (dx * dx + dy * dy) / (radius * radius)).max(0.0);
            let noise: i32 = rng.gen_range(-25..=25);
            let value = background + noise + (peak * falloff) as i32;
            image::Luma([value.clamp(SYNTHETIC_MIN as i32, SYNTHETIC_MAX as i32) as u16])
        })
    }
}
