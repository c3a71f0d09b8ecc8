// SPDX-License-Identifier: GPL-3.0-or-later
mod jpeg;
mod mjpeg;
mod routes;
mod settings;

pub(crate) use jpeg::encode_jpeg;
pub(crate) use routes::{routes, HttpContext};
pub(crate) use settings::StreamSettings;
