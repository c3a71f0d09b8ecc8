// SPDX-License-Identifier: GPL-3.0-or-later
mod latest;
mod viewers;

pub(crate) use latest::FramePublisher;
pub(crate) use viewers::{ViewerCount, ViewerToken};
