// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Context as _;
use structopt::StructOpt;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[macro_use]
extern crate lazy_static;

mod camera;
mod error;
mod image_buffer;
mod pipeline;
mod pubsub;
mod render;
mod settings;
mod stream;
mod util;

use crate::pipeline::Pipeline;
use crate::settings::{Args, Settings};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::from_args();
    debug!(config_path = %args.config_path.display(), "loading configuration");
    let config = Settings::from_path(&args.config_path)?;
    let (shutdown, shutdown_rx) = watch::channel(false);
    let app = Pipeline::new(config, shutdown_rx).context("Error creating pipeline")?;
    tokio::pin!(app);
    tokio::select! {
        res = &mut app => return res,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Unable to listen for Ctrl-C")?;
            info!("Received shutdown signal");
        }
    }
    // The acquisition loop releases the camera session before the pipeline finishes.
    shutdown.send_replace(true);
    app.await
}
