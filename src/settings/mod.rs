// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Context as _;
use serde::Deserialize;
use tracing::warn;

use std::fs;
use std::io;
use std::path::Path;

mod cli;

use crate::camera::CameraSettings;
use crate::render::RenderSettings;
use crate::stream::StreamSettings;
pub(crate) use cli::Args;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct Settings {
    /// Where the camera is, and how to talk to it.
    #[serde(default)]
    pub(crate) camera: CameraSettings,

    /// Settings related to the HTTP server for the video stream.
    #[serde(default)]
    pub(crate) streams: StreamSettings,

    /// Settings related to how frames are rendered.
    #[serde(default)]
    pub(crate) render: RenderSettings,
}

impl Settings {
    /// Load the settings from a TOML file. A missing file means every default is used.
    pub(crate) fn from_path(path: &Path) -> anyhow::Result<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Unable to read config file {}", path.display()))
            }
        };
        toml::from_str(&data)
            .with_context(|| format!("Unable to parse config file {}", path.display()))
    }
}
