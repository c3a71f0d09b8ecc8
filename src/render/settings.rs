// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::TryFrom;

use serde::Deserialize;

/// How the range of values mapped onto [0, 255] is chosen.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RangeMode {
    /// Use the smallest and largest values in the frame.
    Absolute,

    /// Clip the range to the configured percentiles. More robust against hot or dead pixels.
    Percentile,
}

impl Default for RangeMode {
    fn default() -> Self {
        Self::Absolute
    }
}

/// The lower and upper percentiles used by [`RangeMode::Percentile`].
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(try_from = "(f32, f32)")]
pub(crate) struct ClipPercentile {
    low: f32,
    high: f32,
}

impl ClipPercentile {
    pub(crate) fn low(&self) -> f32 {
        self.low
    }

    pub(crate) fn high(&self) -> f32 {
        self.high
    }
}

impl TryFrom<(f32, f32)> for ClipPercentile {
    type Error = &'static str;

    fn try_from((low, high): (f32, f32)) -> Result<Self, Self::Error> {
        if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) {
            Err("percentiles must be between 0 and 100")
        } else if low >= high {
            Err("the low percentile must be less than the high percentile")
        } else {
            Ok(Self { low, high })
        }
    }
}

impl Default for ClipPercentile {
    fn default() -> Self {
        Self {
            low: 2.0,
            high: 98.0,
        }
    }
}

/// Tone mapping options.
///
/// The defaults are the minimal mapping: a plain min-max rescale with no smoothing or
/// equalization.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct ToneMapSettings {
    /// Blur the raw values slightly before mapping to suppress single pixel noise.
    #[serde(default)]
    pub(crate) smoothing: bool,

    /// Apply histogram equalization after rescaling.
    #[serde(default)]
    pub(crate) equalize: bool,

    #[serde(default)]
    pub(crate) range: RangeMode,

    #[serde(default)]
    pub(crate) clip_percentile: ClipPercentile,
}

impl ToneMapSettings {
    /// The noise-robust mapping: smoothing, percentile clipping and histogram equalization.
    #[cfg(test)]
    pub(crate) fn enhanced() -> Self {
        Self {
            smoothing: true,
            equalize: true,
            range: RangeMode::Percentile,
            clip_percentile: ClipPercentile::default(),
        }
    }
}

/// JPEG quality, from 1 to 100.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(try_from = "u8")]
pub(crate) struct Quality(u8);

impl Quality {
    pub(crate) fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Quality {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1..=100 => Ok(Self(value)),
            _ => Err("JPEG quality must be between 1 and 100"),
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

fn default_palette() -> String {
    crate::render::palette::GRAY.to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub(crate) struct RenderSettings {
    /// The palette used until one is selected over HTTP.
    #[serde(default = "default_palette")]
    pub(crate) palette: String,

    #[serde(default)]
    pub(crate) quality: Quality,

    #[serde(default, flatten)]
    pub(crate) tone_map: ToneMapSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            palette: default_palette(),
            quality: Quality::default(),
            tone_map: ToneMapSettings::default(),
        }
    }
}
