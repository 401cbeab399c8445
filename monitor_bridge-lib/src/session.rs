//! Reconnecting TCP session with one monitor.
//!
//! Each connection runs two activities: the read loop, which owns the frame
//! buffer and the vital-sign cache, and a heartbeat writer bound to the
//! socket's write half. They share nothing but the cancellation token.

use std::io;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::SessionError;
use crate::frame::{extract_frames, wrap};
use crate::hl7;
use crate::merger::VitalMerger;
use crate::message::{Message, VitalSign};
use crate::payload::{render_vital, render_wave};

/// Data port the monitor listens on.
pub const DEFAULT_PORT: u16 = 4601;

const ACK_PAYLOAD: &str = "MSH|^~\\&|||||||ORU^R01|106|P|2.3.1|";
const MIN_BUFFER_SIZE: usize = 1024;
/// How long a cancelled heartbeat writer may take to close its half.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Connection settings for a [`Session`].
///
/// # Default Values
/// - `port`: 4601
/// - `reconnect_delay`: 3 seconds
/// - `heartbeat_interval`: 1 second
/// - `buffer_size`: 64 KiB
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Fixed pause after a failed connect attempt or a dropped connection.
    pub reconnect_delay: Duration,
    pub heartbeat_interval: Duration,
    /// Capacity of the read buffer; a frame larger than this is discarded.
    pub buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            reconnect_delay: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(1),
            buffer_size: 64 * 1024,
        }
    }
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Self::default() }
    }

    /// Clamp durations to at least 1 ms and the buffer to at least 1 KiB.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.reconnect_delay = self.reconnect_delay.max(Duration::from_millis(1));
        self.heartbeat_interval = self.heartbeat_interval.max(Duration::from_millis(1));
        self.buffer_size = self.buffer_size.max(MIN_BUFFER_SIZE);
        self
    }
}

/// The fixed acknowledgment frame sent on every heartbeat.
pub fn ack_frame() -> Vec<u8> {
    wrap(ACK_PAYLOAD.as_bytes())
}

/// The wave-data query frame, stamped with `now` as `MMddHHmmssSSS`.
pub fn query_frame(now: DateTime<Local>) -> Vec<u8> {
    let ts = now.format("%m%d%H%M%S%3f");
    let payload = format!(
        "MSH|^~\\&|||||||QRY^R02|1203|P|2.3.1\rQRD|{ts}|R|I|Q{ts}|||||RES\rQRF|MON||||0&0^1^1^1^\r"
    );
    wrap(payload.as_bytes())
}

/// One monitor connection with reconnect, heartbeat and decode state.
pub struct Session {
    config: SessionConfig,
    ctx: Context,
    shutdown: CancellationToken,
    merger: VitalMerger,
}

impl Session {
    pub fn new(config: SessionConfig, ctx: Context, shutdown: CancellationToken) -> Self {
        Self {
            config: config.normalized(),
            ctx,
            shutdown,
            merger: VitalMerger::new(),
        }
    }

    /// Connect, read and reconnect until the shutdown token is cancelled.
    /// A vital sign still pending at shutdown is published on the way out.
    pub async fn run(mut self) {
        let (host, port) = (self.config.host.clone(), self.config.port);
        info!("session for monitor {}:{} starting", host, port);

        while !self.shutdown.is_cancelled() {
            let connected = tokio::select! {
                () = self.shutdown.cancelled() => break,
                res = TcpStream::connect((host.as_str(), port)) => res,
            };

            match connected {
                Ok(stream) => {
                    info!("connected to monitor {}:{}", host, port);
                    match self.serve(stream).await {
                        Ok(()) => break,
                        Err(e) => warn!(
                            "connection to {}:{} ended: {}; reconnecting in {:?}",
                            host, port, e, self.config.reconnect_delay
                        ),
                    }
                }
                Err(e) => {
                    warn!(
                        "connect to {}:{} failed: {}; retrying in {:?}",
                        host, port, e, self.config.reconnect_delay
                    );
                }
            }

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = sleep(self.config.reconnect_delay) => {}
            }
        }

        if let Some(vs) = self.merger.flush() {
            self.publish_vital(&vs);
        }
        info!("session for monitor {}:{} stopped", host, port);
    }

    async fn serve(&mut self, stream: TcpStream) -> Result<(), SessionError> {
        let (reader, writer) = stream.into_split();
        let connection = self.shutdown.child_token();
        let mut beat = tokio::spawn(heartbeat(
            writer,
            self.config.heartbeat_interval,
            connection.clone(),
        ));

        let result = self.read_loop(reader).await;

        connection.cancel();
        match timeout(WRITER_GRACE, &mut beat).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("heartbeat task failed: {}", e),
            Err(_) => {
                warn!("heartbeat writer did not stop within {:?}, aborting", WRITER_GRACE);
                beat.abort();
            }
        }
        result
    }

    /// Read into the tail of the buffer, emit every complete frame and carry
    /// the unterminated remainder into the next read. Returns `Ok` only when
    /// shut down.
    async fn read_loop<R>(&mut self, mut reader: R) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.config.buffer_size];
        let mut leftover = 0;

        loop {
            if leftover == buf.len() {
                warn!("read buffer full without a complete frame, discarding {} bytes", leftover);
                leftover = 0;
            }

            let read = tokio::select! {
                () = self.shutdown.cancelled() => return Ok(()),
                res = reader.read(&mut buf[leftover..]) => res?,
            };
            if read == 0 {
                return Err(SessionError::Closed);
            }

            let count = leftover + read;
            let consumed = extract_frames(&buf, count, |payload| self.handle_frame(payload));
            buf.copy_within(consumed..count, 0);
            leftover = count - consumed;
        }
    }

    fn handle_frame(&mut self, payload: &[u8]) {
        match hl7::decode(payload) {
            Some(Message::Vital(vs)) => {
                if let Some(flushed) = self.merger.offer(vs) {
                    self.publish_vital(&flushed);
                }
            }
            Some(Message::Wave(wave)) if !wave.is_empty() => {
                if let Some(payload) = render_wave(&wave) {
                    self.ctx.publish(payload);
                }
            }
            Some(Message::Wave(_)) => debug!("dropping wave frame without samples"),
            Some(Message::Connect(ci)) => {
                debug!("ignoring admission message on data link (ip {:?})", ci.ip);
            }
            None => {}
        }
    }

    fn publish_vital(&self, vs: &VitalSign) {
        match render_vital(vs) {
            Some(payload) => self.ctx.publish(payload),
            None => debug!("vital sign at {} has nothing to publish", vs.timestamp),
        }
    }
}

/// Write the ack and query frames every `period` until `stop` is cancelled,
/// then shut the write half down. Cancellation also interrupts a write that
/// is stuck on a peer that stopped reading. Write failures are only logged;
/// the read side decides when the connection is lost.
async fn heartbeat<W>(mut writer: W, period: Duration, stop: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    () = stop.cancelled() => break,
                    res = send_heartbeat(&mut writer) => {
                        if let Err(e) = res {
                            error!("heartbeat write failed: {}", e);
                        }
                    }
                }
            }
        }
    }
    match timeout(WRITER_GRACE, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("closing write half: {}", e),
        Err(_) => debug!("closing write half timed out"),
    }
}

async fn send_heartbeat<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&ack_frame()).await?;
    writer.write_all(&query_frame(Local::now())).await?;
    writer.flush().await
}
