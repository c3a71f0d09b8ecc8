// SPDX-License-Identifier: GPL-3.0-or-later
use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};

/// How frames are pulled from the camera.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CaptureMode {
    /// Ask the camera to push a continuous stream of frames.
    Stream,

    /// Request one image at a time, waiting `single_interval` between requests.
    Single,
}

impl Default for CaptureMode {
    fn default() -> Self {
        Self::Stream
    }
}

/// Connection settings for a tCam camera.
///
/// All durations are given in (possibly fractional) seconds.
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct CameraSettings {
    #[serde(default = "CameraSettings::default_host")]
    pub(crate) host: String,

    #[serde(default = "CameraSettings::default_port")]
    pub(crate) port: u16,

    #[serde(default)]
    pub(crate) mode: CaptureMode,

    /// How long to wait for the camera to accept a connection.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "CameraSettings::default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// The longest any single request to the camera may take.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "CameraSettings::default_response_timeout")]
    pub(crate) response_timeout: Duration,

    /// How long to wait after a failed connection attempt before trying again.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "CameraSettings::default_backoff")]
    pub(crate) backoff: Duration,

    /// How long to wait before reconnecting after an established session is lost.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "CameraSettings::default_reconnect_delay")]
    pub(crate) reconnect_delay: Duration,

    /// How long to sleep when the camera had no frame ready.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "CameraSettings::default_idle_delay")]
    pub(crate) idle_delay: Duration,

    /// How long a single frame request waits for data before reporting that no frame is ready.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "CameraSettings::default_frame_poll")]
    pub(crate) frame_poll: Duration,

    /// The delay between image requests in single image mode.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "CameraSettings::default_single_interval")]
    pub(crate) single_interval: Duration,
}

impl CameraSettings {
    fn default_host() -> String {
        "10.19.243.3".to_string()
    }

    fn default_port() -> u16 {
        5001
    }

    fn default_connect_timeout() -> Duration {
        Duration::from_secs(5)
    }

    fn default_response_timeout() -> Duration {
        Duration::from_secs(10)
    }

    fn default_backoff() -> Duration {
        Duration::from_secs(5)
    }

    fn default_reconnect_delay() -> Duration {
        Duration::from_secs(1)
    }

    fn default_idle_delay() -> Duration {
        Duration::from_millis(5)
    }

    fn default_frame_poll() -> Duration {
        Duration::from_millis(50)
    }

    fn default_single_interval() -> Duration {
        Duration::from_millis(500)
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            mode: CaptureMode::default(),
            connect_timeout: Self::default_connect_timeout(),
            response_timeout: Self::default_response_timeout(),
            backoff: Self::default_backoff(),
            reconnect_delay: Self::default_reconnect_delay(),
            idle_delay: Self::default_idle_delay(),
            frame_poll: Self::default_frame_poll(),
            single_interval: Self::default_single_interval(),
        }
    }
}
