// SPDX-License-Identifier: GPL-3.0-or-later
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, trace, warn};

use super::transport::{ConnectStatus, FrameKind, RawFrame, Transport};
use crate::error::TransportError;

/// Start of text, marks the beginning of every message.
const STX: u8 = 0x02;
/// End of text, marks the end of every message.
const ETX: u8 = 0x03;

const READ_CHUNK: usize = 16 * 1024;

/// The longest partial message kept while waiting for its end marker. A radiometric message is
/// around 52 KiB.
const MAX_MESSAGE: usize = 256 * 1024;

#[derive(Clone, Copy, Debug, Default, Serialize)]
struct StreamArgs {
    /// Delay between frames, 0 for as fast as possible.
    delay_msec: u32,

    /// Number of frames to send, 0 for no limit.
    num_frames: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Command {
    StreamOn { args: StreamArgs },
    StreamOff,
    GetImage,
}

impl Command {
    fn framed(&self) -> Result<Bytes, TransportError> {
        let body = serde_json::to_vec(self)?;
        let mut framed = BytesMut::with_capacity(body.len() + 2);
        framed.put_u8(STX);
        framed.put_slice(&body);
        framed.put_u8(ETX);
        Ok(framed.freeze())
    }
}

/// The only part of a camera message we care about.
#[derive(Deserialize)]
struct Message {
    radiometric: Option<String>,
}

/// Classify a complete message from the camera.
fn parse_message(message: Bytes) -> Result<RawFrame, TransportError> {
    let parsed: Message = serde_json::from_slice(&message)?;
    Ok(match parsed.radiometric {
        Some(radiometric) => RawFrame::radiometric(radiometric),
        None => RawFrame::other(message),
    })
}

/// Pull the first complete message out of `buffer`, without the framing bytes.
///
/// Anything before a message's start marker is discarded. A partial message longer than
/// [`MAX_MESSAGE`] is an error.
fn take_message(buffer: &mut BytesMut) -> Result<Option<Bytes>, TransportError> {
    loop {
        let end = match buffer.iter().position(|b| *b == ETX) {
            Some(end) => end,
            None => {
                // Keep only a possible partial message.
                match buffer.iter().rposition(|b| *b == STX) {
                    Some(start) => buffer.advance(start),
                    None => buffer.clear(),
                }
                if buffer.len() > MAX_MESSAGE {
                    buffer.clear();
                    return Err(TransportError::Oversized { limit: MAX_MESSAGE });
                }
                return Ok(None);
            }
        };
        match buffer[..end].iter().rposition(|b| *b == STX) {
            Some(start) => {
                let mut message = buffer.split_to(end + 1);
                message.advance(start + 1);
                message.truncate(end - start - 1);
                return Ok(Some(message.freeze()));
            }
            None => {
                warn!(discarded = end + 1, "unframed data from camera");
                buffer.advance(end + 1);
            }
        }
    }
}

#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    streaming: bool,
}

/// A [`Transport`] for tCam cameras, speaking the tCam JSON protocol over TCP.
#[derive(Debug)]
pub(crate) struct TcamClient {
    connection: Option<Connection>,
    frame_poll: Duration,
}

impl TcamClient {
    /// Create a disconnected client. `frame_poll` bounds how long [`Transport::get_frame`] waits
    /// for data before reporting that no frame is ready.
    pub(crate) fn new(frame_poll: Duration) -> Self {
        Self {
            connection: None,
            frame_poll,
        }
    }

    fn connection(&mut self) -> Result<&mut Connection, TransportError> {
        self.connection.as_mut().ok_or(TransportError::NotConnected)
    }

    async fn send(&mut self, command: Command) -> Result<(), TransportError> {
        let framed = command.framed()?;
        trace!(?command, "sending command to camera");
        let connection = self.connection()?;
        connection.stream.write_all(&framed).await?;
        Ok(())
    }

    /// Wait until `deadline` for a complete message. Returns `None` if the deadline passes first.
    async fn read_message(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<Option<Bytes>, TransportError> {
        let connection = self.connection()?;
        loop {
            if let Some(message) = take_message(&mut connection.buffer)? {
                return Ok(Some(message));
            }
            connection.buffer.reserve(READ_CHUNK);
            let read = connection.stream.read_buf(&mut connection.buffer);
            let count = match deadline {
                Some(deadline) => match time::timeout_at(deadline, read).await {
                    Ok(count) => count?,
                    Err(_) => return Ok(None),
                },
                None => read.await?,
            };
            if count == 0 {
                return Err(TransportError::Closed);
            }
        }
    }
}

#[async_trait]
impl Transport for TcamClient {
    async fn connect(&mut self, host: &str, port: u16) -> Result<ConnectStatus, TransportError> {
        if self.connection.is_some() {
            self.shutdown().await?;
        }
        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!(host, port, "connected to camera");
                self.connection = Some(Connection {
                    stream,
                    buffer: BytesMut::with_capacity(READ_CHUNK),
                    streaming: false,
                });
                Ok(ConnectStatus::Connected)
            }
            Err(err) => Ok(ConnectStatus::Refused(err.to_string())),
        }
    }

    async fn start_stream(&mut self) -> Result<(), TransportError> {
        self.send(Command::StreamOn {
            args: StreamArgs::default(),
        })
        .await?;
        self.connection()?.streaming = true;
        Ok(())
    }

    async fn get_frame(&mut self) -> Result<Option<RawFrame>, TransportError> {
        let deadline = Instant::now() + self.frame_poll;
        match self.read_message(Some(deadline)).await? {
            Some(message) => parse_message(message).map(Some),
            None => Ok(None),
        }
    }

    /// Request one image and wait for it. Replies that aren't images are skipped.
    async fn get_image(&mut self) -> Result<Option<RawFrame>, TransportError> {
        self.send(Command::GetImage).await?;
        loop {
            if let Some(message) = self.read_message(None).await? {
                let frame = parse_message(message)?;
                if frame.kind == FrameKind::Radiometric {
                    return Ok(Some(frame));
                }
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => return Ok(()),
        };
        if connection.streaming {
            let framed = Command::StreamOff.framed()?;
            connection.stream.write_all(&framed).await?;
        }
        connection.stream.shutdown().await?;
        debug!("camera session closed");
        Ok(())
    }
}
