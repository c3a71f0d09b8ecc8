// SPDX-License-Identifier: GPL-3.0-or-later
mod acquisition;
mod decode;
mod settings;
mod synthetic;
mod tcam;
mod transport;

pub(crate) use acquisition::{Acquisition, AcquisitionState};
pub(crate) use decode::decode;
#[cfg(test)]
pub(crate) use decode::encode_payload;
pub(crate) use settings::CameraSettings;
#[cfg(test)]
pub(crate) use settings::CaptureMode;
pub(crate) use tcam::TcamClient;
pub(crate) use transport::RawFrame;
