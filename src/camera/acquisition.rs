// SPDX-License-Identifier: GPL-3.0-or-later
use std::fmt;
use std::future::Future;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, Duration};
use tracing::{debug, info, trace, warn};

use super::settings::{CameraSettings, CaptureMode};
use super::synthetic::SyntheticFrames;
use super::transport::{ConnectStatus, FrameKind, RawFrame, Transport};
use crate::error::TransportError;
use crate::pubsub::FramePublisher;
use crate::render::FrameRenderer;

/// Where the acquisition loop is in its connection lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AcquisitionState {
    /// No session is open. The next step starts a connection attempt.
    Disconnected,

    /// The next step tries to open a session.
    Connecting,

    /// A session is open and frames are being pulled from the camera.
    Streaming,

    /// The camera is unreachable. Synthetic frames are published until it comes back.
    Degraded,

    /// The loop has shut down and released the camera.
    Stopped,
}

impl AcquisitionState {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Await `call` for at most `limit`. Returns `None` if shutdown was requested first.
async fn bounded<T, F>(
    shutdown: &mut watch::Receiver<bool>,
    limit: Duration,
    call: F,
) -> Option<Result<T, TransportError>>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::select! {
        result = time::timeout(limit, call) => {
            Some(result.unwrap_or_else(|_| Err(TransportError::Timeout(limit))))
        }
        _ = shutdown.changed() => None,
    }
}

/// Owns the camera session and drives frames through the renderer to the publisher.
///
/// The loop is a state machine advanced by [`Acquisition::step`]. Every path that retries sleeps
/// for a configured interval first, and every camera call is bounded by a timeout.
///
/// Shutdown is requested by sending on (or dropping the sender of) the shutdown channel. Pending
/// sleeps and camera calls are abandoned, and the session is released.
pub(crate) struct Acquisition<T> {
    transport: T,
    settings: CameraSettings,
    renderer: FrameRenderer,
    publisher: FramePublisher,
    synthetic: SyntheticFrames,
    state: AcquisitionState,
    /// Set when an established session was lost, so reconnecting waits `reconnect_delay` first.
    session_lost: bool,
    state_sender: watch::Sender<AcquisitionState>,
    shutdown: watch::Receiver<bool>,
}

impl<T: Transport> Acquisition<T> {
    pub(crate) fn new(
        transport: T,
        settings: CameraSettings,
        renderer: FrameRenderer,
        publisher: FramePublisher,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (state_sender, _) = watch::channel(AcquisitionState::Disconnected);
        Self {
            transport,
            settings,
            renderer,
            publisher,
            synthetic: SyntheticFrames::new(),
            state: AcquisitionState::Disconnected,
            session_lost: false,
            state_sender,
            shutdown,
        }
    }

    /// A receiver that always holds the current state.
    pub(crate) fn state(&self) -> watch::Receiver<AcquisitionState> {
        self.state_sender.subscribe()
    }

    /// Run until shutdown is requested.
    pub(crate) async fn run(mut self) -> anyhow::Result<()> {
        info!(
            host = %self.settings.host,
            port = self.settings.port,
            mode = ?self.settings.mode,
            "starting acquisition"
        );
        while self.step().await != AcquisitionState::Stopped {}
        info!("acquisition stopped");
        Ok(())
    }

    /// Do the work for the current state, and move to the next one.
    pub(crate) async fn step(&mut self) -> AcquisitionState {
        let next = if *self.shutdown.borrow() {
            AcquisitionState::Stopped
        } else {
            match self.state {
                AcquisitionState::Disconnected => self.disconnected().await,
                AcquisitionState::Connecting => self.connecting().await,
                AcquisitionState::Streaming => self.streaming().await,
                AcquisitionState::Degraded => self.degraded().await,
                AcquisitionState::Stopped => AcquisitionState::Stopped,
            }
        };
        if next == AcquisitionState::Stopped && self.state != AcquisitionState::Stopped {
            self.release().await;
        }
        self.set_state(next);
        next
    }

    fn set_state(&mut self, next: AcquisitionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "acquisition state change");
            self.state = next;
            self.state_sender.send_replace(next);
        }
    }

    /// Sleep for `duration`, returning `false` if shutdown was requested first.
    async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = time::sleep(duration) => true,
            _ = self.shutdown.changed() => false,
        }
    }

    async fn disconnected(&mut self) -> AcquisitionState {
        if self.session_lost {
            if !self.sleep(self.settings.reconnect_delay).await {
                return AcquisitionState::Stopped;
            }
            self.session_lost = false;
        }
        AcquisitionState::Connecting
    }

    async fn connecting(&mut self) -> AcquisitionState {
        let connected = bounded(
            &mut self.shutdown,
            self.settings.connect_timeout,
            self.transport
                .connect(&self.settings.host, self.settings.port),
        )
        .await;
        match connected {
            None => AcquisitionState::Stopped,
            Some(Ok(ConnectStatus::Connected)) => {
                info!(
                    host = %self.settings.host,
                    port = self.settings.port,
                    "connected to camera"
                );
                self.start_capture().await
            }
            Some(Ok(ConnectStatus::Refused(reason))) => {
                warn!(%reason, "camera refused the connection");
                self.release().await;
                AcquisitionState::Degraded
            }
            Some(Err(err)) => {
                warn!(error = %err, "unable to connect to camera");
                self.release().await;
                AcquisitionState::Degraded
            }
        }
    }

    async fn start_capture(&mut self) -> AcquisitionState {
        if self.settings.mode == CaptureMode::Single {
            return AcquisitionState::Streaming;
        }
        let started = bounded(
            &mut self.shutdown,
            self.settings.response_timeout,
            self.transport.start_stream(),
        )
        .await;
        match started {
            None => AcquisitionState::Stopped,
            Some(Ok(())) => AcquisitionState::Streaming,
            Some(Err(err)) => self.lose_session(err).await,
        }
    }

    async fn streaming(&mut self) -> AcquisitionState {
        let received = match self.settings.mode {
            CaptureMode::Stream => {
                bounded(
                    &mut self.shutdown,
                    self.settings.response_timeout,
                    self.transport.get_frame(),
                )
                .await
            }
            CaptureMode::Single => {
                bounded(
                    &mut self.shutdown,
                    self.settings.response_timeout,
                    self.transport.get_image(),
                )
                .await
            }
        };
        let got_image = match received {
            None => return AcquisitionState::Stopped,
            Some(Err(err)) => return self.lose_session(err).await,
            Some(Ok(Some(frame))) if frame.kind == FrameKind::Radiometric => {
                self.process(frame);
                true
            }
            Some(Ok(Some(_))) => {
                trace!("ignoring non-image message from camera");
                false
            }
            Some(Ok(None)) => false,
        };
        let delay = match self.settings.mode {
            CaptureMode::Single => Some(self.settings.single_interval),
            CaptureMode::Stream if !got_image => Some(self.settings.idle_delay),
            CaptureMode::Stream => None,
        };
        match delay {
            Some(delay) if !self.sleep(delay).await => AcquisitionState::Stopped,
            _ => AcquisitionState::Streaming,
        }
    }

    /// Publish a synthetic frame, then wait out the backoff before trying to connect again.
    async fn degraded(&mut self) -> AcquisitionState {
        let grid = self.synthetic.next_grid();
        match self.renderer.render(&grid) {
            Ok(jpeg) => {
                let version = self.publisher.publish(jpeg, true);
                debug!(version, "published synthetic frame");
            }
            Err(err) => warn!(error = %err, "unable to render synthetic frame"),
        }
        if self.sleep(self.settings.backoff).await {
            AcquisitionState::Connecting
        } else {
            AcquisitionState::Stopped
        }
    }

    /// Render and publish a frame. Failures only drop this frame.
    fn process(&mut self, frame: RawFrame) {
        match self.renderer.render_frame(frame) {
            Ok(jpeg) => {
                let version = self.publisher.publish(jpeg, false);
                trace!(version, "published frame");
            }
            Err(err) => warn!(error = %err, "dropping frame"),
        }
    }

    async fn lose_session(&mut self, err: TransportError) -> AcquisitionState {
        warn!(error = %err, "lost camera session");
        self.release().await;
        self.session_lost = true;
        AcquisitionState::Disconnected
    }

    /// Close the camera session, if there is one.
    async fn release(&mut self) {
        let limit = self.settings.response_timeout;
        match time::timeout(limit, self.transport.shutdown()).await {
            Ok(Ok(())) => (),
            Ok(Err(err)) => debug!(error = %err, "error while closing camera session"),
            Err(_) => debug!(?limit, "timed out closing camera session"),
        }
    }
}

#[cfg(test)]
impl<T: Transport> Acquisition<T> {
    fn with_synthetic(mut self, synthetic: SyntheticFrames) -> Self {
        self.synthetic = synthetic;
        self
    }
}

#[cfg(test)]
mod acquisition_test {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;

    use async_trait::async_trait;
    use image::Luma;
    use parking_lot::Mutex;
    use tokio::sync::watch;
    use tokio::time::{Duration, Instant};

    use super::{Acquisition, AcquisitionState};
    use crate::camera::decode::encode_payload;
    use crate::camera::settings::{CameraSettings, CaptureMode};
    use crate::camera::synthetic::SyntheticFrames;
    use crate::camera::transport::{ConnectStatus, RawFrame, Transport};
    use crate::error::TransportError;
    use crate::image_buffer::{ThermalGrid, FRAME_HEIGHT, FRAME_WIDTH};
    use crate::pubsub::FramePublisher;
    use crate::render::{FrameRenderer, PaletteSelection, RenderSettings};

    enum Connect {
        Accept,
        Refuse,
        Fail,
        Hang,
    }

    enum Reply {
        Frame(RawFrame),
        Empty,
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct Script {
        connects: VecDeque<Connect>,
        replies: VecDeque<Reply>,
        calls: Vec<&'static str>,
    }

    /// A camera that follows a script. Once the script runs out, connections are refused and
    /// frame requests come back empty.
    #[derive(Clone, Default)]
    struct ScriptedTransport(Arc<Mutex<Script>>);

    impl ScriptedTransport {
        fn new<C, R>(connects: C, replies: R) -> Self
        where
            C: IntoIterator<Item = Connect>,
            R: IntoIterator<Item = Reply>,
        {
            Self(Arc::new(Mutex::new(Script {
                connects: connects.into_iter().collect(),
                replies: replies.into_iter().collect(),
                calls: Vec::new(),
            })))
        }

        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().calls.clone()
        }

        async fn reply(&mut self, call: &'static str) -> Result<Option<RawFrame>, TransportError> {
            let reply = {
                let mut script = self.0.lock();
                script.calls.push(call);
                script.replies.pop_front()
            };
            match reply {
                Some(Reply::Frame(frame)) => Ok(Some(frame)),
                Some(Reply::Empty) | None => Ok(None),
                Some(Reply::Fail) => Err(TransportError::Closed),
                Some(Reply::Hang) => futures::future::pending().await,
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&mut self, _: &str, _: u16) -> Result<ConnectStatus, TransportError> {
            let connect = {
                let mut script = self.0.lock();
                script.calls.push("connect");
                script.connects.pop_front()
            };
            match connect {
                Some(Connect::Accept) => Ok(ConnectStatus::Connected),
                Some(Connect::Refuse) | None => Ok(ConnectStatus::Refused("scripted".to_string())),
                Some(Connect::Fail) => Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "scripted",
                ))),
                Some(Connect::Hang) => futures::future::pending().await,
            }
        }

        async fn start_stream(&mut self) -> Result<(), TransportError> {
            self.0.lock().calls.push("start_stream");
            Ok(())
        }

        async fn get_frame(&mut self) -> Result<Option<RawFrame>, TransportError> {
            self.reply("get_frame").await
        }

        async fn get_image(&mut self) -> Result<Option<RawFrame>, TransportError> {
            self.reply("get_image").await
        }

        async fn shutdown(&mut self) -> Result<(), TransportError> {
            self.0.lock().calls.push("shutdown");
            Ok(())
        }
    }

    fn valid_frame() -> RawFrame {
        let grid = ThermalGrid::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            Luma([29_500 + (x * 3 + y) as u16])
        });
        RawFrame::radiometric(encode_payload(&grid))
    }

    struct Harness {
        acquisition: Acquisition<ScriptedTransport>,
        transport: ScriptedTransport,
        publisher: FramePublisher,
        shutdown: watch::Sender<bool>,
    }

    fn harness(transport: ScriptedTransport, settings: CameraSettings) -> Harness {
        let publisher = FramePublisher::new();
        let renderer = FrameRenderer::new(&RenderSettings::default(), PaletteSelection::default());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let acquisition = Acquisition::new(
            transport.clone(),
            settings,
            renderer,
            publisher.clone(),
            shutdown_rx,
        )
        .with_synthetic(SyntheticFrames::seeded(1));
        Harness {
            acquisition,
            transport,
            publisher,
            shutdown,
        }
    }

    fn assert_elapsed(since: Instant, expected: Duration) {
        let elapsed = since.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "expected {:?} to pass, but {:?} did",
            expected,
            elapsed
        );
    }

    /// Three failed connection attempts give three synthetic frames, each followed by a backoff.
    #[tokio::test(start_paused = true)]
    async fn degraded_after_failed_connects() {
        let transport = ScriptedTransport::new(
            vec![Connect::Fail, Connect::Refuse, Connect::Fail, Connect::Accept],
            vec![],
        );
        let settings = CameraSettings::default();
        let backoff = settings.backoff;
        let mut h = harness(transport, settings);
        let start = Instant::now();
        assert_eq!(h.acquisition.step().await, AcquisitionState::Connecting);
        for attempt in 1..=3u64 {
            assert_eq!(h.acquisition.step().await, AcquisitionState::Degraded);
            let before = Instant::now();
            assert_eq!(h.acquisition.step().await, AcquisitionState::Connecting);
            assert_elapsed(before, backoff);
            let frame = h.publisher.latest().unwrap();
            assert_eq!(frame.version, attempt);
            assert!(frame.synthetic);
        }
        assert_elapsed(start, backoff * 3);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
        assert_eq!(
            h.transport.calls(),
            vec![
                "connect",
                "shutdown",
                "connect",
                "shutdown",
                "connect",
                "shutdown",
                "connect",
                "start_stream"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn streams_frames() {
        let transport = ScriptedTransport::new(
            vec![Connect::Accept],
            vec![
                Reply::Frame(valid_frame()),
                Reply::Empty,
                Reply::Frame(RawFrame::radiometric("AAAA")),
                Reply::Frame(RawFrame::other("{\"status\":\"ok\"}")),
                Reply::Frame(valid_frame()),
                Reply::Fail,
            ],
        );
        let settings = CameraSettings::default();
        let idle_delay = settings.idle_delay;
        let reconnect_delay = settings.reconnect_delay;
        let mut h = harness(transport, settings);
        let mut state = h.acquisition.state();
        assert_eq!(*state.borrow(), AcquisitionState::Disconnected);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Connecting);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
        assert!(state.has_changed().unwrap());
        assert_eq!(*state.borrow_and_update(), AcquisitionState::Streaming);

        // A good frame is published straight away.
        let before = Instant::now();
        assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
        assert_elapsed(before, Duration::ZERO);
        let frame = h.publisher.latest().unwrap();
        assert_eq!(frame.version, 1);
        assert!(!frame.synthetic);

        // Nothing ready, so wait a bit.
        let before = Instant::now();
        assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
        assert_elapsed(before, idle_delay);

        // A broken frame is dropped, and so is a status message.
        assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
        assert_eq!(h.publisher.latest().unwrap().version, 1);

        assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
        assert_eq!(h.publisher.latest().unwrap().version, 2);

        // A transport error releases the session, then reconnects after a delay.
        assert_eq!(h.acquisition.step().await, AcquisitionState::Disconnected);
        assert_eq!(h.transport.calls().last(), Some(&"shutdown"));
        let before = Instant::now();
        assert_eq!(h.acquisition.step().await, AcquisitionState::Connecting);
        assert_elapsed(before, reconnect_delay);
        // The previously published frame is still there.
        assert_eq!(h.publisher.latest().unwrap().version, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_image_mode() {
        let transport = ScriptedTransport::new(
            vec![Connect::Accept],
            vec![Reply::Frame(valid_frame()), Reply::Empty],
        );
        let settings = CameraSettings {
            mode: CaptureMode::Single,
            ..CameraSettings::default()
        };
        let interval = settings.single_interval;
        let mut h = harness(transport, settings);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Connecting);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
        for _ in 0..2 {
            let before = Instant::now();
            assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
            assert_elapsed(before, interval);
        }
        assert_eq!(h.publisher.latest().unwrap().version, 1);
        assert_eq!(
            h.transport.calls(),
            vec!["connect", "get_image", "get_image"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout() {
        let transport = ScriptedTransport::new(vec![Connect::Hang], vec![]);
        let settings = CameraSettings::default();
        let connect_timeout = settings.connect_timeout;
        let mut h = harness(transport, settings);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Connecting);
        let before = Instant::now();
        assert_eq!(h.acquisition.step().await, AcquisitionState::Degraded);
        assert_elapsed(before, connect_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_timeout() {
        let transport = ScriptedTransport::new(vec![Connect::Accept], vec![Reply::Hang]);
        let settings = CameraSettings::default();
        let response_timeout = settings.response_timeout;
        let mut h = harness(transport, settings);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Connecting);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Streaming);
        let before = Instant::now();
        assert_eq!(h.acquisition.step().await, AcquisitionState::Disconnected);
        assert_elapsed(before, response_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_backoff() {
        let transport = ScriptedTransport::new(vec![Connect::Refuse], vec![]);
        let h = harness(transport, CameraSettings::default());
        let mut state = h.acquisition.state();
        let task = tokio::spawn(h.acquisition.run());
        // Wait until the loop is in the backoff sleep.
        while *state.borrow_and_update() != AcquisitionState::Degraded {
            state.changed().await.unwrap();
        }
        let before = Instant::now();
        h.shutdown.send(true).unwrap();
        task.await.unwrap().unwrap();
        assert!(before.elapsed() < Duration::from_secs(1));
        assert_eq!(*state.borrow(), AcquisitionState::Stopped);
        assert_eq!(h.transport.calls().last(), Some(&"shutdown"));
        assert!(h.publisher.latest().unwrap().synthetic);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_streaming() {
        let transport = ScriptedTransport::new(vec![Connect::Accept], vec![Reply::Hang]);
        let h = harness(transport, CameraSettings::default());
        let mut state = h.acquisition.state();
        let task = tokio::spawn(h.acquisition.run());
        while *state.borrow_and_update() != AcquisitionState::Streaming {
            state.changed().await.unwrap();
        }
        h.shutdown.send(true).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(
            h.transport.calls(),
            vec!["connect", "start_stream", "get_frame", "shutdown"]
        );
    }

    #[tokio::test]
    async fn stopped_is_final() {
        let transport = ScriptedTransport::new(vec![], vec![]);
        let mut h = harness(transport, CameraSettings::default());
        h.shutdown.send(true).unwrap();
        assert_eq!(h.acquisition.step().await, AcquisitionState::Stopped);
        assert_eq!(h.acquisition.step().await, AcquisitionState::Stopped);
        // Only released once.
        assert_eq!(h.transport.calls(), vec!["shutdown"]);
    }

    #[test]
    fn state_names() {
        assert_eq!(AcquisitionState::Degraded.to_string(), "degraded");
        assert_eq!(
            serde_json::to_string(&AcquisitionState::Streaming).unwrap(),
            "\"streaming\""
        );
    }
}
