// SPDX-License-Identifier: GPL-3.0-or-later
use serde::Deserialize;

use std::net;
use std::num::NonZeroU32;

#[derive(Debug, Deserialize, PartialEq)]
pub(crate) struct StreamSettings {
    /// The address to bind the server to. Defaults to `0.0.0.0`.
    #[serde(default = "StreamSettings::default_address")]
    address: net::IpAddr,

    /// The port to bind the server to. Default to `8080`.
    #[serde(default = "StreamSettings::default_port")]
    port: u16,

    /// The most frames per second sent to each viewer. Defaults to 8.
    #[serde(default = "StreamSettings::default_frame_rate")]
    pub(crate) frame_rate: NonZeroU32,

    /// MJPEG-specific settings.
    #[serde(default)]
    pub(crate) mjpeg: MjpegSettings,
}

impl StreamSettings {
    fn default_address() -> net::IpAddr {
        net::IpAddr::from([0u8, 0u8, 0u8, 0u8])
    }

    fn default_port() -> u16 {
        8080u16
    }

    fn default_frame_rate() -> NonZeroU32 {
        NonZeroU32::new(8).unwrap_or(NonZeroU32::MIN)
    }
}

impl From<&StreamSettings> for net::SocketAddr {
    fn from(settings: &StreamSettings) -> Self {
        net::SocketAddr::new(settings.address, settings.port)
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            port: Self::default_port(),
            frame_rate: Self::default_frame_rate(),
            mjpeg: MjpegSettings::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub(crate) struct MjpegSettings {
    /// Whether or not the MJPEG video stream should be enabled.
    #[serde(default = "MjpegSettings::default_enabled")]
    pub(crate) enabled: bool,
}

impl MjpegSettings {
    fn default_enabled() -> bool {
        true
    }
}

impl Default for MjpegSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
        }
    }
}
