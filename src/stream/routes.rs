// SPDX-License-Identifier: GPL-3.0-or-later
use http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{Response, StatusCode};
use hyper::Body;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};
use warp::filters::BoxedFilter;
use warp::reply::{self, Reply};
use warp::{Filter, Rejection};

use super::mjpeg::MjpegStream;
use super::settings::StreamSettings;
use crate::camera::AcquisitionState;
use crate::pubsub::{FramePublisher, ViewerCount};
use crate::render::{palette, PaletteSelection};

type Route = BoxedFilter<(reply::Response,)>;

const INDEX: &str = "<html><body>\
<h3>tCam Bridge</h3>\
<ul>\
<li><a href='/health'>/health</a></li>\
<li><a href='/palettes'>/palettes</a></li>\
<li><a href='/mjpeg'>/mjpeg</a></li>\
<li><a href='/capture'>/capture</a></li>\
</ul>\
</body></html>";

/// The shared state the HTTP handlers read from (and, for the palette, write to).
#[derive(Clone, Debug)]
pub(crate) struct HttpContext {
    pub(crate) publisher: FramePublisher,
    pub(crate) palettes: PaletteSelection,
    pub(crate) state: watch::Receiver<AcquisitionState>,
    pub(crate) viewers: ViewerCount,
}

#[derive(Debug, Serialize)]
struct Health {
    ok: bool,
    have_frame: bool,
    current_palette: &'static str,
    state: AcquisitionState,
    viewers: usize,
}

#[derive(Debug, Serialize)]
struct PaletteList {
    palettes: Vec<&'static str>,
    current: &'static str,
}

#[derive(Debug, Deserialize)]
struct PaletteRequest {
    palette: String,
}

#[derive(Debug, Default, Serialize)]
struct PaletteResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    palette: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
}

fn index() -> Route {
    warp::path::end()
        .and(warp::get())
        .map(|| reply::html(INDEX).into_response())
        .boxed()
}

fn health(context: &HttpContext) -> Route {
    let context = context.clone();
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            let health = Health {
                ok: true,
                have_frame: context.publisher.has_frame(),
                current_palette: context.palettes.current().name(),
                state: *context.state.borrow(),
                viewers: context.viewers.count(),
            };
            reply::json(&health).into_response()
        })
        .boxed()
}

fn list_palettes(context: &HttpContext) -> Route {
    let palettes = context.palettes.clone();
    warp::path("palettes")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            let list = PaletteList {
                palettes: palette::names(),
                current: palettes.current().name(),
            };
            reply::json(&list).into_response()
        })
        .boxed()
}

fn select_palette(context: &HttpContext) -> Route {
    let palettes = context.palettes.clone();
    warp::path("palette")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(4 * 1024))
        .and(warp::body::json())
        .map(move |request: PaletteRequest| match palettes.select(&request.palette) {
            Ok(selected) => {
                info!(palette = selected.name(), "palette selected");
                let response = PaletteResponse {
                    success: true,
                    palette: Some(selected.name()),
                    ..PaletteResponse::default()
                };
                reply::json(&response).into_response()
            }
            Err(err) => {
                debug!(error = %err, "rejected palette selection");
                let response = PaletteResponse {
                    error: Some(err.to_string()),
                    ..PaletteResponse::default()
                };
                reply::with_status(reply::json(&response), StatusCode::BAD_REQUEST).into_response()
            }
        })
        .boxed()
}

fn capture(context: &HttpContext) -> Route {
    let publisher = context.publisher.clone();
    warp::path("capture")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || match publisher.latest() {
            Some(frame) => {
                let disposition = format!(
                    "attachment; filename=\"thermal-{}.jpg\"",
                    frame.version
                );
                let response = Response::new(Body::from(frame.data));
                let response = reply::with_header(response, CONTENT_TYPE, "image/jpeg");
                let response = reply::with_header(response, CACHE_CONTROL, "no-store");
                reply::with_header(response, CONTENT_DISPOSITION, disposition).into_response()
            }
            None => {
                let response = ErrorResponse {
                    error: "no frame has been captured yet",
                };
                reply::with_status(reply::json(&response), StatusCode::NOT_FOUND).into_response()
            }
        })
        .boxed()
}

fn mjpeg(context: &HttpContext, settings: &StreamSettings) -> Route {
    let mjpeg = MjpegStream::new(
        context.publisher.clone(),
        context.viewers.clone(),
        settings.frame_rate,
    );
    warp::path("mjpeg")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            let connection = mjpeg.connect();
            let content_type = connection.content_type();
            let response = Response::new(connection.body());
            let response = reply::with_header(response, CACHE_CONTROL, "no-cache");
            reply::with_header(response, CONTENT_TYPE, content_type).into_response()
        })
        .boxed()
}

/// All of the HTTP endpoints, with CORS headers for requests from any origin.
pub(crate) fn routes(
    context: &HttpContext,
    settings: &StreamSettings,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone + Send + Sync + 'static {
    let mut routes = vec![
        index(),
        health(context),
        list_palettes(context),
        select_palette(context),
        capture(context),
    ];
    if settings.mjpeg.enabled {
        routes.push(mjpeg(context, settings));
    } else {
        info!("MJPEG stream disabled");
    }
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_header("content-type");
    let mut routes = routes.into_iter();
    // The list always starts with the index route.
    let first = routes.next().unwrap_or_else(index);
    routes
        .fold(first, |combined, next| combined.or(next).unify().boxed())
        .with(cors)
}
