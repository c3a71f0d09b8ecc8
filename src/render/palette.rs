// SPDX-License-Identifier: GPL-3.0-or-later
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use image::RgbImage;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::PaletteNotFound;
use crate::image_buffer::{IntensityGrid, RenderedImage};

/// Name of the pass-through grayscale palette.
pub(crate) const GRAY: &str = "gray";

type ColorTable = [[u8; 3]; 256];

/// A mapping from 8-bit intensities to display colors.
#[derive(Clone, PartialEq)]
pub(crate) enum Palette {
    /// Leave the image as single channel grayscale.
    Gray,

    /// Replace every intensity with the color at that index.
    Lookup {
        name: &'static str,
        table: Box<ColorTable>,
    },
}

impl Palette {
    /// Sample a [`colorous`] gradient at 256 evenly spaced points.
    fn from_gradient(name: &'static str, gradient: colorous::Gradient) -> Self {
        let mut table = Box::new([[0u8; 3]; 256]);
        for (index, entry) in table.iter_mut().enumerate() {
            *entry = gradient.eval_rational(index, 256).as_array();
        }
        Self::Lookup { name, table }
    }

    /// Linearly interpolate between evenly spaced color stops.
    fn from_stops(name: &'static str, stops: &[[u8; 3]]) -> Self {
        let mut table = Box::new([[0u8; 3]; 256]);
        let segments = stops.len().saturating_sub(1).max(1);
        for (index, entry) in table.iter_mut().enumerate() {
            // Position along the stops, in units of 1/255 of a segment.
            let position = index * segments;
            let segment = (position / 255).min(segments - 1);
            let offset = (position - segment * 255) as u32;
            let start = stops[segment.min(stops.len() - 1)];
            let end = stops[(segment + 1).min(stops.len() - 1)];
            for channel in 0..3 {
                let from = start[channel] as u32;
                let to = end[channel] as u32;
                entry[channel] = ((from * (255 - offset) + to * offset + 127) / 255) as u8;
            }
        }
        Self::Lookup { name, table }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Gray => GRAY,
            Self::Lookup { name, .. } => *name,
        }
    }

    /// The color an intensity is displayed as.
    pub(crate) fn color(&self, intensity: u8) -> [u8; 3] {
        match self {
            Self::Gray => [intensity; 3],
            Self::Lookup { table, .. } => table[intensity as usize],
        }
    }

    pub(crate) fn render(&self, intensities: &IntensityGrid) -> RenderedImage {
        let (width, height) = intensities.dimensions();
        match self {
            Self::Gray => RenderedImage::Gray(intensities.clone()),
            Self::Lookup { .. } => {
                let mut samples = Vec::with_capacity(intensities.len() * 3);
                for &intensity in intensities.as_raw().iter() {
                    samples.extend_from_slice(&self.color(intensity));
                }
                // Three samples are pushed for every intensity, so the buffer is always the right
                // size.
                let image = RgbImage::from_raw(width, height, samples)
                    .unwrap_or_else(|| RgbImage::new(width, height));
                RenderedImage::Rgb(image)
            }
        }
    }
}

impl fmt::Debug for Palette {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // The table itself is just noise in logs.
        f.debug_tuple("Palette").field(&self.name()).finish()
    }
}

const ARCTIC: &[[u8; 3]] = &[
    [0, 0, 32],
    [0, 32, 128],
    [0, 128, 200],
    [96, 208, 255],
    [255, 208, 64],
    [255, 112, 0],
    [255, 255, 255],
];

const FUSION: &[[u8; 3]] = &[
    [0, 0, 0],
    [48, 0, 96],
    [128, 0, 160],
    [200, 0, 100],
    [255, 64, 0],
    [255, 176, 0],
    [255, 255, 128],
    [255, 255, 255],
];

const GLOWBOW: &[[u8; 3]] = &[
    [0, 0, 0],
    [128, 0, 0],
    [255, 0, 0],
    [255, 128, 0],
    [255, 255, 0],
    [255, 255, 255],
];

const IRONBOW: &[[u8; 3]] = &[
    [0, 0, 0],
    [32, 0, 140],
    [204, 0, 119],
    [255, 165, 0],
    [255, 255, 0],
    [255, 255, 255],
];

const RAINBOW: &[[u8; 3]] = &[
    [0, 0, 64],
    [0, 0, 255],
    [0, 255, 255],
    [0, 255, 0],
    [255, 255, 0],
    [255, 128, 0],
    [255, 0, 0],
];

lazy_static! {
    static ref BUILT_IN: BTreeMap<&'static str, Arc<Palette>> = {
        let palettes = vec![
            Palette::Gray,
            Palette::from_stops("arctic", ARCTIC),
            Palette::from_stops("fusion", FUSION),
            Palette::from_stops("glowbow", GLOWBOW),
            Palette::from_stops("ironbow", IRONBOW),
            Palette::from_stops("rainbow", RAINBOW),
            Palette::from_gradient("cividis", colorous::CIVIDIS),
            Palette::from_gradient("inferno", colorous::INFERNO),
            Palette::from_gradient("magma", colorous::MAGMA),
            Palette::from_gradient("plasma", colorous::PLASMA),
            Palette::from_gradient("turbo", colorous::TURBO),
            Palette::from_gradient("viridis", colorous::VIRIDIS),
        ];
        palettes
            .into_iter()
            .map(|palette| (palette.name(), Arc::new(palette)))
            .collect()
    };
}

/// The names of all built-in palettes, sorted.
pub(crate) fn names() -> Vec<&'static str> {
    BUILT_IN.keys().copied().collect()
}

/// Look up a built-in palette.
///
/// Names are case-insensitive, and spaces or dashes are treated as underscores.
pub(crate) fn find(name: &str) -> Result<Arc<Palette>, PaletteNotFound> {
    let normalized = name.trim().to_lowercase().replace(&[' ', '-'][..], "_");
    BUILT_IN
        .get(normalized.as_str())
        .map(Arc::clone)
        .ok_or_else(|| PaletteNotFound(name.to_string()))
}

/// The palette currently used to render frames, shared between the acquisition loop and the
/// HTTP handlers.
#[derive(Clone, Debug)]
pub(crate) struct PaletteSelection {
    current: Arc<RwLock<Arc<Palette>>>,
}

impl PaletteSelection {
    pub(crate) fn new(initial: &str) -> Result<Self, PaletteNotFound> {
        Ok(Self {
            current: Arc::new(RwLock::new(find(initial)?)),
        })
    }

    pub(crate) fn current(&self) -> Arc<Palette> {
        Arc::clone(&*self.current.read())
    }

    /// Switch to a different palette. An unknown name leaves the current palette in place.
    pub(crate) fn select(&self, name: &str) -> Result<Arc<Palette>, PaletteNotFound> {
        let palette = find(name)?;
        let previous = std::mem::replace(&mut *self.current.write(), Arc::clone(&palette));
        debug!(from = previous.name(), to = palette.name(), "palette changed");
        Ok(palette)
    }
}

impl Default for PaletteSelection {
    fn default() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(Palette::Gray))),
        }
    }
}
