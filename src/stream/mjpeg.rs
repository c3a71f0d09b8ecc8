// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::Infallible;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{BufMut, Bytes, BytesMut};
use futures::future;
use futures::stream::{Stream, StreamExt as _};
use hyper::Body;
use pin_project::pin_project;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tracing::debug;

use crate::pubsub::{FramePublisher, ViewerCount, ViewerToken};
use crate::util::StreamExt as _;

const BOUNDARY_LENGTH: usize = 24;

/// Hands out multipart JPEG streams of the published frames.
#[derive(Clone, Debug)]
pub(crate) struct MjpegStream {
    publisher: FramePublisher,
    viewers: ViewerCount,
    poll_period: Duration,
}

impl MjpegStream {
    pub(crate) fn new(
        publisher: FramePublisher,
        viewers: ViewerCount,
        frame_rate: NonZeroU32,
    ) -> Self {
        Self {
            publisher,
            viewers,
            poll_period: Duration::from_secs(1) / frame_rate.get(),
        }
    }

    /// Start a new viewer connection, with its own boundary token.
    pub(crate) fn connect(&self) -> MjpegConnection {
        let boundary = random_boundary();
        let parts = self.parts(boundary.clone());
        debug!(%boundary, viewers = self.viewers.count(), "MJPEG viewer connected");
        MjpegConnection { boundary, parts }
    }

    fn parts(&self, boundary: String) -> ViewerStream {
        let mut interval = time::interval(self.poll_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let publisher = self.publisher.clone();
        let parts = IntervalStream::new(interval)
            .filter_map(move |_| future::ready(publisher.latest()))
            .filter_repeated_by(|frame| frame.version)
            .map(move |frame| part(&boundary, &frame.data))
            .boxed();
        ViewerStream {
            parts,
            _token: self.viewers.token(),
        }
    }
}

/// A single viewer's stream.
pub(crate) struct MjpegConnection {
    boundary: String,
    parts: ViewerStream,
}

impl MjpegConnection {
    pub(crate) fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", self.boundary)
    }

    pub(crate) fn body(self) -> Body {
        Body::wrap_stream(self.parts.never_error::<Infallible>())
    }
}

/// The parts sent to a viewer. The viewer stays counted until this is dropped.
#[pin_project]
struct ViewerStream {
    #[pin]
    parts: futures::stream::BoxStream<'static, Bytes>,
    _token: ViewerToken,
}

impl Stream for ViewerStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().parts.poll_next(cx)
    }
}

fn random_boundary() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LENGTH)
        .map(char::from)
        .collect()
}

/// Frame a JPEG image as one part of a multipart stream.
fn part(boundary: &str, jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", boundary);
    let mut buf = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}
