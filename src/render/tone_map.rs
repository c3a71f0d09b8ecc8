// SPDX-License-Identifier: GPL-3.0-or-later
use image::Luma;
use tracing::trace;

use crate::image_buffer::{IntensityGrid, ThermalGrid};

use super::settings::{RangeMode, ToneMapSettings};

/// Binomial approximation of a Gaussian with a radius of one pixel.
const SMOOTHING_KERNEL: [[u32; 3]; 3] = [[1, 2, 1], [2, 4, 2], [1, 2, 1]];
const SMOOTHING_KERNEL_SUM: u32 = 16;

/// Converts raw 16-bit sensor values into displayable 8-bit intensities.
///
/// Mapping is a pure function of the input grid and the settings.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct ToneMapper {
    settings: ToneMapSettings,
}

impl ToneMapper {
    pub(crate) fn new(settings: ToneMapSettings) -> Self {
        Self { settings }
    }

    pub(crate) fn map(&self, grid: &ThermalGrid) -> IntensityGrid {
        let smoothed;
        let source = if self.settings.smoothing {
            smoothed = smooth(grid);
            &smoothed
        } else {
            grid
        };
        let (low, high) = self.effective_range(source);
        trace!(low, high, "tone mapping range");
        let mut intensities = rescale(source, low, high);
        if self.settings.equalize {
            equalize(&mut intensities);
        }
        intensities
    }

    /// The range of raw values stretched over [0, 255]. `high` is always greater than `low`.
    fn effective_range(&self, grid: &ThermalGrid) -> (u16, u32) {
        let (low, high) = match self.settings.range {
            RangeMode::Absolute => {
                let low = grid.as_raw().iter().copied().min().unwrap_or(0);
                let high = grid.as_raw().iter().copied().max().unwrap_or(0);
                (low, high)
            }
            RangeMode::Percentile => {
                let mut sorted = grid.as_raw().clone();
                sorted.sort_unstable();
                let clip = self.settings.clip_percentile;
                (
                    percentile(&sorted, clip.low()),
                    percentile(&sorted, clip.high()),
                )
            }
        };
        // Widen degenerate ranges upwards so the rescale never divides by zero.
        if high > low {
            (low, high as u32)
        } else {
            (low, low as u32 + 1)
        }
    }
}

/// Nearest-rank percentile of an already sorted slice.
fn percentile(sorted: &[u16], percent: f32) -> u16 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (percent / 100.0 * (sorted.len() - 1) as f32).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Smooth a grid with a 3x3 binomial kernel, clamping at the edges.
fn smooth(grid: &ThermalGrid) -> ThermalGrid {
    let (width, height) = grid.dimensions();
    if width == 0 || height == 0 {
        return grid.clone();
    }
    ThermalGrid::from_fn(width, height, |x, y| {
        let mut total = 0u32;
        for (row, weights) in SMOOTHING_KERNEL.iter().enumerate() {
            let sample_y = (y + row as u32).saturating_sub(1).min(height - 1);
            for (column, weight) in weights.iter().enumerate() {
                let sample_x = (x + column as u32).saturating_sub(1).min(width - 1);
                total += weight * grid.get_pixel(sample_x, sample_y)[0] as u32;
            }
        }
        Luma([((total + SMOOTHING_KERNEL_SUM / 2) / SMOOTHING_KERNEL_SUM) as u16])
    })
}

/// Linearly map `[low, high]` onto `[0, 255]`, clamping values outside the range.
fn rescale(grid: &ThermalGrid, low: u16, high: u32) -> IntensityGrid {
    let span = high - low as u32;
    let (width, height) = grid.dimensions();
    let samples = grid
        .as_raw()
        .iter()
        .map(|&value| {
            let offset = (value.max(low) as u32).min(high) - low as u32;
            (offset * u8::MAX as u32 / span) as u8
        })
        .collect();
    // The sample count is taken from the source grid, so the dimensions always match.
    IntensityGrid::from_raw(width, height, samples)
        .unwrap_or_else(|| IntensityGrid::new(width, height))
}

/// Histogram equalization, in place.
///
/// If only one intensity is present the grid is left untouched, as there is no contrast to
/// stretch.
fn equalize(intensities: &mut IntensityGrid) {
    let mut histogram = [0u64; 256];
    for pixel in intensities.as_raw().iter() {
        histogram[*pixel as usize] += 1;
    }
    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (bin, count) in histogram.iter().enumerate() {
        running += count;
        cdf[bin] = running;
    }
    let total = running;
    let cdf_min = cdf.iter().copied().find(|&count| count > 0).unwrap_or(0);
    if total == cdf_min {
        return;
    }
    let denominator = total - cdf_min;
    let mut lookup = [0u8; 256];
    for (value, cumulative) in lookup.iter_mut().zip(cdf.iter()) {
        let numerator = cumulative.saturating_sub(cdf_min) * u8::MAX as u64;
        *value = ((numerator + denominator / 2) / denominator) as u8;
    }
    for pixel in intensities.pixels_mut() {
        pixel[0] = lookup[pixel[0] as usize];
    }
}

#[cfg(test)]
mod tone_map_test {
    use std::convert::TryFrom;

    use image::Luma;

    use super::{smooth, ToneMapper};
    use crate::image_buffer::{ThermalGrid, FRAME_HEIGHT, FRAME_WIDTH};
    use crate::render::settings::{ClipPercentile, RangeMode, ToneMapSettings};

    fn constant_grid(value: u16) -> ThermalGrid {
        ThermalGrid::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Luma([value]))
    }

    fn gradient_grid() -> ThermalGrid {
        ThermalGrid::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            Luma([20_000 + (x * 7 + y * 13) as u16])
        })
    }

    fn all_settings() -> Vec<ToneMapSettings> {
        let mut settings = Vec::new();
        for &smoothing in [false, true].iter() {
            for &equalize in [false, true].iter() {
                for &range in [RangeMode::Absolute, RangeMode::Percentile].iter() {
                    settings.push(ToneMapSettings {
                        smoothing,
                        equalize,
                        range,
                        clip_percentile: ClipPercentile::default(),
                    });
                }
            }
        }
        settings
    }

    #[test]
    fn constant_grid_is_uniform() {
        for &value in [0u16, 25_000, u16::MAX].iter() {
            for settings in all_settings() {
                let mapped = ToneMapper::new(settings).map(&constant_grid(value));
                let first = mapped.get_pixel(0, 0)[0];
                assert!(
                    mapped.pixels().all(|p| p[0] == first),
                    "constant {} was not mapped uniformly with {:?}",
                    value,
                    settings
                );
            }
        }
    }

    #[test]
    fn constant_grid_is_zero() {
        for &value in [0u16, 25_000, u16::MAX - 1, u16::MAX].iter() {
            for settings in all_settings() {
                let mapped = ToneMapper::new(settings).map(&constant_grid(value));
                assert!(
                    mapped.pixels().all(|p| p[0] == 0),
                    "constant {} was not mapped to zero with {:?}",
                    value,
                    settings
                );
            }
        }
    }

    #[test]
    fn deterministic() {
        let grid = gradient_grid();
        for settings in all_settings() {
            let mapper = ToneMapper::new(settings);
            assert_eq!(mapper.map(&grid), mapper.map(&grid));
        }
    }

    #[test]
    fn minimal_spans_full_range() {
        let mapped = ToneMapper::default().map(&gradient_grid());
        let min = mapped.pixels().map(|p| p[0]).min().unwrap();
        let max = mapped.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn minimal_truncates() {
        // Two values 3 apart: the midpoint-ish values truncate rather than round.
        let mut grid = constant_grid(100);
        grid.put_pixel(1, 0, Luma([101]));
        grid.put_pixel(2, 0, Luma([103]));
        let mapped = ToneMapper::default().map(&grid);
        assert_eq!(mapped.get_pixel(0, 0)[0], 0);
        assert_eq!(mapped.get_pixel(1, 0)[0], 85);
        assert_eq!(mapped.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn percentile_ignores_hot_pixel() {
        let mut grid = gradient_grid();
        grid.put_pixel(80, 60, Luma([u16::MAX]));
        let absolute = ToneMapper::default().map(&grid);
        let clipped = ToneMapper::new(ToneMapSettings {
            range: RangeMode::Percentile,
            ..ToneMapSettings::default()
        })
        .map(&grid);
        // With the hot pixel setting the scale, everything else is squashed into the bottom bins.
        let absolute_max = absolute
            .enumerate_pixels()
            .filter(|(x, y, _)| (*x, *y) != (80, 60))
            .map(|(_, _, p)| p[0])
            .max()
            .unwrap();
        assert!(absolute_max <= 15, "absolute max was {}", absolute_max);
        let clipped_max = clipped.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(clipped_max, 255);
        // The hot pixel is clamped to the top of the clipped range
        assert_eq!(clipped.get_pixel(80, 60)[0], 255);
    }

    #[test]
    fn enhanced_ignores_hot_pixel() {
        let mut grid = gradient_grid();
        grid.put_pixel(80, 60, Luma([u16::MAX]));
        let mapped = ToneMapper::new(ToneMapSettings::enhanced()).map(&grid);
        assert_eq!(mapped.pixels().map(|p| p[0]).min(), Some(0));
        assert_eq!(mapped.get_pixel(80, 60)[0], 255);
        // Without clipping, nearly everything would share the bottom bins.
        let bright = mapped.pixels().filter(|p| p[0] >= 128).count();
        assert!(bright > mapped.len() / 4, "only {} bright pixels", bright);
    }

    #[test]
    fn narrow_percentiles() {
        let settings = ToneMapSettings {
            range: RangeMode::Percentile,
            clip_percentile: ClipPercentile::try_from((49.0, 51.0)).unwrap(),
            ..ToneMapSettings::default()
        };
        let mapped = ToneMapper::new(settings).map(&gradient_grid());
        let zeros = mapped.pixels().filter(|p| p[0] == 0).count();
        let saturated = mapped.pixels().filter(|p| p[0] == 255).count();
        assert!(zeros > mapped.len() / 3);
        assert!(saturated > mapped.len() / 3);
    }

    #[test]
    fn equalization_preserves_order() {
        let grid = ThermalGrid::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            // Heavily skewed: most pixels are packed at the bottom of the range.
            let value = if x < 150 { 1_000 + (x + y) as u16 } else { 30_000 + y as u16 };
            Luma([value])
        });
        let settings = ToneMapSettings {
            equalize: true,
            ..ToneMapSettings::default()
        };
        let mapped = ToneMapper::new(settings).map(&grid);
        let mut pairs: Vec<(u16, u8)> = grid
            .pixels()
            .zip(mapped.pixels())
            .map(|(raw, intensity)| (raw[0], intensity[0]))
            .collect();
        pairs.sort_unstable();
        for window in pairs.windows(2) {
            assert!(window[0].1 <= window[1].1, "{:?} out of order", window);
        }
        assert_eq!(pairs.first().unwrap().1, 0);
        assert_eq!(pairs.last().unwrap().1, 255);
    }

    #[test]
    fn equalization_spreads_clustered_values() {
        let grid = ThermalGrid::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, _| {
            let value = if x < 150 { 1_000 + x as u16 * 10 } else { 60_000 };
            Luma([value])
        });
        let plain = ToneMapper::default().map(&grid);
        let equalized = ToneMapper::new(ToneMapSettings {
            equalize: true,
            ..ToneMapSettings::default()
        })
        .map(&grid);
        let distinct = |image: &image::GrayImage| {
            let mut seen = [false; 256];
            for p in image.pixels() {
                seen[p[0] as usize] = true;
            }
            seen.iter().filter(|s| **s).count()
        };
        let plain_max = plain.get_pixel(149, 0)[0];
        let equalized_max = equalized.get_pixel(149, 0)[0];
        assert!(plain_max < 10);
        assert!(equalized_max > 200);
        assert!(distinct(&equalized) >= distinct(&plain));
    }

    #[test]
    fn smoothing_dampens_spike() {
        let mut grid = constant_grid(1_000);
        grid.put_pixel(10, 10, Luma([2_000]));
        let smoothed = smooth(&grid);
        assert_eq!(smoothed.get_pixel(10, 10)[0], 1_250);
        assert_eq!(smoothed.get_pixel(11, 10)[0], 1_125);
        assert_eq!(smoothed.get_pixel(11, 11)[0], 1_063);
        assert_eq!(smoothed.get_pixel(0, 0)[0], 1_000);
    }

    #[test]
    fn smoothing_keeps_constant_edges() {
        let smoothed = smooth(&constant_grid(4_321));
        assert!(smoothed.pixels().all(|p| p[0] == 4_321));
    }
}
