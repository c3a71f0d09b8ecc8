// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Context as _;
use futures::future::{BoxFuture, Future, FutureExt};
use futures::ready;
use futures::stream::{FuturesUnordered, Stream};
use pin_project::pin_project;
use tokio::sync::watch;
use tracing::{debug, info, info_span};
use tracing_futures::Instrument;

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::camera::{Acquisition, TcamClient};
use crate::pubsub::{FramePublisher, ViewerCount};
use crate::render::{FrameRenderer, PaletteSelection};
use crate::settings::Settings;
use crate::stream::{self, HttpContext};
use crate::util::flatten_join_result;

type InnerTask = BoxFuture<'static, anyhow::Result<()>>;
type TaskList = FuturesUnordered<InnerTask>;

/// The acquisition loop and the HTTP server, run together until one of them finishes.
///
/// The acquisition loop finishes once shutdown is requested (and the camera session has been
/// released), which also drops the HTTP server along with any connected viewers.
#[pin_project]
pub(crate) struct Pipeline {
    bound_address: SocketAddr,
    #[pin]
    tasks: TaskList,
}

impl Pipeline {
    pub(crate) fn new(config: Settings, shutdown: watch::Receiver<bool>) -> anyhow::Result<Self> {
        let publisher = FramePublisher::new();
        let palettes = PaletteSelection::new(&config.render.palette)
            .context("Invalid initial palette in the render settings")?;
        let renderer = FrameRenderer::new(&config.render, palettes.clone());
        let transport = TcamClient::new(config.camera.frame_poll);
        let acquisition = Acquisition::new(
            transport,
            config.camera,
            renderer,
            publisher.clone(),
            shutdown,
        );
        let context = HttpContext {
            publisher,
            palettes,
            state: acquisition.state(),
            viewers: ViewerCount::default(),
        };
        let (bound_address, server_task) =
            create_server(&context, &config.streams).context("Error creating HTTP server")?;
        let acquisition_task = tokio::spawn(acquisition.run().instrument(info_span!("acquisition")))
            .map(flatten_join_result)
            .boxed();
        let tasks: TaskList = vec![acquisition_task, server_task].into_iter().collect();
        Ok(Self {
            bound_address,
            tasks,
        })
    }

    /// The address the HTTP server is listening on.
    pub(crate) fn bound_address(&self) -> SocketAddr {
        self.bound_address
    }
}

fn create_server(
    context: &HttpContext,
    settings: &stream::StreamSettings,
) -> anyhow::Result<(SocketAddr, InnerTask)> {
    let routes = stream::routes(context, settings);
    let bind_address = SocketAddr::from(settings);
    debug!(address = %bind_address, "creating warp server");
    let (bound_address, server) = warp::serve(routes)
        .try_bind_ephemeral(bind_address)
        .with_context(|| format!("Unable to bind to {}", bind_address))?;
    info!(address = %bound_address, "HTTP server listening");
    let task = server
        .instrument(info_span!("warp_server"))
        .map(Ok::<(), anyhow::Error>)
        .boxed();
    Ok((bound_address, task))
}

impl Future for Pipeline {
    type Output = anyhow::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        let res = ready!(this.tasks.as_mut().poll_next(cx)).unwrap_or(Ok(()));
        debug!(result = ?res, "Pipeline terminating");
        Poll::Ready(res)
    }
}
