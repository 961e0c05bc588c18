//! Relay Session
//!
//! One direction of a connection pair: reads messages from the source stream,
//! dispatches each one and writes the result to the destination stream.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Instant, SystemTime};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dispatcher::{DispatchOutcome, MessageDispatcher, Route};
use super::frame::FrameReader;
use crate::error::RelayError;
use crate::log_sink::{LogLine, LogSink};

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

/// Live counters, updated by the worker and read by anyone holding the session.
#[derive(Debug)]
struct SessionCounters {
    started: Instant,
    start_time: SystemTime,
    forwarded: AtomicU64,
    decoded: AtomicU64,
    raw: AtomicU64,
    blocked: AtomicU64,
    decode_failed: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl SessionCounters {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            start_time: SystemTime::now(),
            forwarded: AtomicU64::new(0),
            decoded: AtomicU64::new(0),
            raw: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            decode_failed: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        }
    }

    fn record(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Forwarded { route, .. } => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
                match route {
                    Route::Decoded => self.decoded.fetch_add(1, Ordering::Relaxed),
                    Route::Raw => self.raw.fetch_add(1, Ordering::Relaxed),
                };
            }
            DispatchOutcome::Dropped { .. } => {
                self.blocked.fetch_add(1, Ordering::Relaxed);
            }
            DispatchOutcome::DecodeFailed { .. } => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
                self.decode_failed.fetch_add(1, Ordering::Relaxed);
            }
            DispatchOutcome::ConnectionClosed => {}
        }
    }

    fn snapshot(&self, session: &str) -> SessionStats {
        SessionStats {
            session: session.to_string(),
            start_time: self.start_time,
            duration_ms: self.started.elapsed().as_millis() as u64,
            messages_forwarded: self.forwarded.load(Ordering::Relaxed),
            messages_decoded: self.decoded.load(Ordering::Relaxed),
            messages_raw: self.raw.load(Ordering::Relaxed),
            messages_blocked: self.blocked.load(Ordering::Relaxed),
            decode_failures: self.decode_failed.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub session: String,
    pub start_time: SystemTime,
    pub duration_ms: u64,
    /// Messages that reached the destination, decoded or raw.
    pub messages_forwarded: u64,
    pub messages_decoded: u64,
    pub messages_raw: u64,
    pub messages_blocked: u64,
    pub decode_failures: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl SessionStats {
    pub fn log_stats(&self) {
        info!(
            session = %self.session,
            duration_ms = self.duration_ms,
            forwarded = self.messages_forwarded,
            decoded = self.messages_decoded,
            raw = self.messages_raw,
            blocked = self.messages_blocked,
            decode_failures = self.decode_failures,
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out,
            "Relay session completed"
        );
    }
}

/// Publishes `Stopped` when the worker finishes, including when it is aborted.
struct StoppedOnDrop(Arc<watch::Sender<SessionState>>);

impl Drop for StoppedOnDrop {
    fn drop(&mut self) {
        self.0.send_replace(SessionState::Stopped);
    }
}

/// Counts bytes written through to the inner writer.
struct CountingWriter<W> {
    inner: W,
    counters: Arc<SessionCounters>,
}

impl<W: AsyncWrite + Unpin> AsyncWrite for CountingWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            self.counters.bytes_out.fetch_add(*n as u64, Ordering::Relaxed);
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// One relay direction.
///
/// Created `Idle` with both stream halves bound. [`start`](Self::start) spawns
/// exactly one worker task; the session becomes `Stopped` when the worker
/// exits for any reason.
pub struct RelaySession<R, W> {
    name: String,
    dispatcher: MessageDispatcher,
    sink: Arc<LogSink>,
    streams: Option<(R, W)>,
    state: Arc<watch::Sender<SessionState>>,
    stop: watch::Sender<bool>,
    counters: Arc<SessionCounters>,
    task: Option<JoinHandle<()>>,
}

impl<R, W> RelaySession<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        source: R,
        destination: W,
        dispatcher: MessageDispatcher,
        sink: Arc<LogSink>,
    ) -> Self {
        let name = name.into();
        debug!("Creating relay session: {}", name);

        let (state, _) = watch::channel(SessionState::Idle);
        let (stop, _) = watch::channel(false);
        Self {
            name,
            dispatcher,
            sink,
            streams: Some((source, destination)),
            state: Arc::new(state),
            stop,
            counters: Arc::new(SessionCounters::new()),
            task: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Spawn the worker. A session runs at most once.
    pub fn start(&mut self) -> Result<(), RelayError> {
        match self.state() {
            SessionState::Running => return Err(RelayError::AlreadyRunning),
            SessionState::Stopped => return Err(RelayError::AlreadyStopped),
            SessionState::Idle => {}
        }
        let (source, destination) = self.streams.take().ok_or(RelayError::AlreadyStopped)?;

        self.state.send_replace(SessionState::Running);
        let worker = Worker {
            name: self.name.clone(),
            dispatcher: self.dispatcher.clone(),
            sink: Arc::clone(&self.sink),
            stop: self.stop.subscribe(),
            counters: Arc::clone(&self.counters),
            _stopped: StoppedOnDrop(Arc::clone(&self.state)),
        };
        self.task = Some(tokio::spawn(worker.run(source, destination)));

        info!("Started relay session {}", self.name);
        Ok(())
    }

    /// Ask the worker to exit at its next message boundary.
    pub fn stop(&self) {
        debug!("Stop requested for session {}", self.name);
        self.stop.send_replace(true);
        if self.state() == SessionState::Idle {
            self.state.send_replace(SessionState::Stopped);
        }
    }

    /// Resolve once the session is `Stopped`.
    pub async fn wait_stopped(&self) {
        let mut state = self.state.subscribe();
        while *state.borrow_and_update() != SessionState::Stopped {
            if state.changed().await.is_err() {
                return;
            }
        }
    }

    /// Cancel the worker outright, dropping and closing both stream halves.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Wait for the worker to finish and return its statistics.
    /// `None` if the session was never started.
    pub async fn join(&mut self) -> Option<SessionStats> {
        let task = self.task.take()?;
        if let Err(e) = task.await {
            if e.is_panic() {
                error!("Relay session {} worker panicked", self.name);
            } else {
                debug!("Relay session {} worker cancelled", self.name);
            }
        }
        Some(self.stats())
    }

    /// Current statistics.
    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot(&self.name)
    }
}

impl<R, W> Drop for RelaySession<R, W> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// State moved into the spawned worker task.
struct Worker {
    name: String,
    dispatcher: MessageDispatcher,
    sink: Arc<LogSink>,
    stop: watch::Receiver<bool>,
    counters: Arc<SessionCounters>,
    _stopped: StoppedOnDrop,
}

impl Worker {
    async fn run<R, W>(mut self, source: R, destination: W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut source = FrameReader::new(source);
        let mut destination = CountingWriter {
            inner: destination,
            counters: Arc::clone(&self.counters),
        };

        loop {
            let header = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => {
                    info!("Session {} stopped on request", self.name);
                    break;
                }
                header = source.read_header() => header,
            };

            let header = match header {
                Ok(header) => header,
                Err(RelayError::ConnectionClosed) => {
                    info!("Session {}: source closed the connection", self.name);
                    break;
                }
                Err(e @ RelayError::SizeError { .. }) => {
                    error!("Session {}: {}", self.name, e);
                    break;
                }
                Err(e) => {
                    error!("Session {}: header read failed: {}", self.name, e);
                    break;
                }
            };
            let received = SystemTime::now();
            self.counters
                .bytes_in
                .store(source.bytes_read(), Ordering::Relaxed);

            let outcome = match self
                .dispatcher
                .dispatch(&header, &mut source, &mut destination)
                .await
            {
                Ok(DispatchOutcome::ConnectionClosed) => {
                    warn!(
                        "Session {}: source closed inside a {} body ({} bytes declared)",
                        self.name,
                        header.device_type(),
                        header.body_size()
                    );
                    break;
                }
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Session {}: {}", self.name, e);
                    break;
                }
            };

            self.counters.record(&outcome);
            self.counters
                .bytes_in
                .store(source.bytes_read(), Ordering::Relaxed);
            self.sink.record(&LogLine::new(
                &self.name,
                received,
                &header,
                outcome.log_fields(&header),
            ));
        }

        self.counters
            .bytes_in
            .store(source.bytes_read(), Ordering::Relaxed);
        if let Err(e) = destination.shutdown().await {
            debug!("Session {}: destination shutdown: {}", self.name, e);
        }
        debug!("Session {} worker exiting after {} bytes", self.name, source.bytes_read());
    }
}

/// Resolve once a stop has been requested or the session handle is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}
