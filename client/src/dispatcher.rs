//! Query dispatcher.
//!
//! One dispatcher owns one UDP socket aimed at one remote server. The socket,
//! the reassembler, the table of requests waiting for a response and the
//! session state all live in a single driver task. [`Dispatcher`] handles
//! only talk to that task over a channel, so none of this state is shared.
//!
//! A request is matched to its response by marker byte: the first waiting
//! request whose expected marker equals the first byte of a complete message
//! takes it, and messages nobody is waiting for are dropped. Each request
//! carries its own timeout and there are no retries.
//!
//! The session counts requests in flight. Closing with nothing in flight
//! closes the socket at once; otherwise the session drains and the socket is
//! closed as soon as the count reaches zero.

use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::reassembler::{deadline_after, Message, Reassembler};
use log::{debug, trace, warn};
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

/// How long the driver sleeps when no timer is armed.
const IDLE_WAKE: Duration = Duration::from_secs(60);
/// Pause after a failed receive before the socket is polled again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// A matched response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub marker: u8,
    /// Message bytes after the marker, ready for decoding.
    pub body: Vec<u8>,
    /// The message came from a compressed split response and `body` is
    /// still compressed.
    pub compressed: bool,
}

/// Lifecycle of a dispatcher's socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// Close requested while queries were in flight.
    Draining,
    Closed,
}

/// Snapshot of a dispatcher's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,
    pub in_flight: usize,
}

type Reply<T> = oneshot::Sender<Result<T, QueryError>>;

enum Command {
    Send {
        request: Vec<u8>,
        marker: u8,
        timeout: Duration,
        reply: Reply<Response>,
    },
    Hold,
    Release,
    Close {
        done: Reply<()>,
    },
}

/// Handle to a dispatcher. Clones share the same socket and session; once
/// every handle is gone the socket closes after its last query.
#[derive(Clone)]
pub struct Dispatcher {
    commands: mpsc::UnboundedSender<Command>,
    session: watch::Receiver<Session>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    timeout: Duration,
}

impl Dispatcher {
    /// Resolves `host` and opens a dispatcher for the first address found.
    pub async fn open(host: &str, port: u16, config: QueryConfig) -> Result<Self, QueryError> {
        let remote_addr = lookup_host((host, port))
            .await
            .map_err(|source| QueryError::Resolve {
                host: host.to_string(),
                source,
            })?
            .next()
            .ok_or_else(|| QueryError::NoAddress(host.to_string()))?;

        Self::open_addr(remote_addr, config).await
    }

    /// Binds an ephemeral local socket and starts the driver task.
    pub async fn open_addr(remote_addr: SocketAddr, config: QueryConfig) -> Result<Self, QueryError> {
        let bind_addr: SocketAddr = if remote_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(QueryError::Bind)?;
        let local_addr = socket.local_addr().map_err(QueryError::Bind)?;
        debug!("Opened query socket {} for {}", local_addr, remote_addr);

        let initial = Session {
            state: SessionState::Open,
            in_flight: 0,
        };
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = watch::channel(initial);

        let driver = Driver {
            socket,
            remote_addr,
            reassembler: Reassembler::new(config.reassembly_expiry),
            waiting: Vec::new(),
            in_flight: 0,
            state: SessionState::Open,
            deferred_close: None,
            commands: command_rx,
            session: session_tx,
            recv_buffer_size: config.recv_buffer_size,
        };
        tokio::spawn(driver.run());

        Ok(Self {
            commands: command_tx,
            session: session_rx,
            local_addr,
            remote_addr,
            timeout: config.timeout,
        })
    }

    /// Address the local socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Server every request is sent to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Default per-request timeout from the config.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Latest session state published by the driver.
    pub fn session(&self) -> Session {
        *self.session.borrow()
    }

    /// Sends `request` and waits for the first message whose marker is
    /// `marker`.
    ///
    /// The request is queued before this returns, so its place relative to
    /// a later `close()` is fixed even if the future is polled late.
    pub fn send(
        &self,
        request: Vec<u8>,
        marker: u8,
        timeout: Duration,
    ) -> impl Future<Output = Result<Response, QueryError>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        let queued = self
            .commands
            .send(Command::Send {
                request,
                marker,
                timeout,
                reply,
            })
            .is_ok();

        async move {
            if !queued {
                return Err(QueryError::Closed);
            }
            response.await.unwrap_or(Err(QueryError::Closed))
        }
    }

    /// Keeps the session open until the returned guard is dropped, counting
    /// as one query in flight. Used to span multi-step queries.
    pub fn hold(&self) -> SessionHold {
        let _ = self.commands.send(Command::Hold);
        SessionHold {
            commands: self.commands.clone(),
        }
    }

    /// Closes the socket once no queries are in flight.
    ///
    /// Only one deferred close is kept; a second call while one is pending
    /// fails with [`QueryError::ClosePending`].
    pub fn close(&self) -> impl Future<Output = Result<(), QueryError>> + Send + 'static {
        let (done, closed) = oneshot::channel();
        let queued = self.commands.send(Command::Close { done }).is_ok();

        async move {
            if !queued {
                return Err(QueryError::Closed);
            }
            closed.await.unwrap_or(Err(QueryError::Closed))
        }
    }
}

/// Guard returned by [`Dispatcher::hold`].
pub struct SessionHold {
    commands: mpsc::UnboundedSender<Command>,
}

impl Drop for SessionHold {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Release);
    }
}

struct PendingRequest {
    marker: u8,
    timeout: Duration,
    deadline: Instant,
    reply: Reply<Response>,
}

/// Sole owner of the socket and all per-session state.
struct Driver {
    socket: UdpSocket,
    remote_addr: SocketAddr,
    reassembler: Reassembler,
    /// In registration order; the first match wins.
    waiting: Vec<PendingRequest>,
    in_flight: usize,
    state: SessionState,
    deferred_close: Option<Reply<()>>,
    commands: mpsc::UnboundedReceiver<Command>,
    session: watch::Sender<Session>,
    recv_buffer_size: usize,
}

impl Driver {
    async fn run(mut self) {
        let mut buffer = vec![0u8; self.recv_buffer_size];
        let mut handles_alive = true;

        while self.state != SessionState::Closed {
            let wake = self
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + IDLE_WAKE);

            tokio::select! {
                command = self.commands.recv(), if handles_alive => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        handles_alive = false;
                        self.request_close(None);
                    }
                },

                result = self.socket.recv_from(&mut buffer) => match result {
                    Ok((len, from)) => self.handle_datagram(&buffer[..len], from),
                    Err(e) => receive_failed(self.remote_addr, &e).await,
                },

                _ = sleep_until(wake) => self.expire(Instant::now()),
            }
        }

        let Driver {
            socket,
            remote_addr,
            deferred_close,
            ..
        } = self;
        drop(socket);
        debug!("Closed query socket for {}", remote_addr);

        if let Some(done) = deferred_close {
            let _ = done.send(Ok(()));
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send {
                request,
                marker,
                timeout,
                reply,
            } => self.send(request, marker, timeout, reply).await,
            Command::Hold => {
                self.in_flight += 1;
                self.publish();
            }
            Command::Release => self.query_ended(),
            Command::Close { done } => self.request_close(Some(done)),
        }
    }

    async fn send(&mut self, request: Vec<u8>, marker: u8, timeout: Duration, reply: Reply<Response>) {
        self.in_flight += 1;
        self.publish();

        if let Err(e) = self.socket.send_to(&request, self.remote_addr).await {
            debug!("Failed to send {} bytes to {}: {}", request.len(), self.remote_addr, e);
            let _ = reply.send(Err(QueryError::Send(e)));
            self.query_ended();
            return;
        }

        trace!(
            "Sent {} bytes to {}, waiting {:?} for marker {:#04x}",
            request.len(),
            self.remote_addr,
            timeout,
            marker
        );
        self.waiting.push(PendingRequest {
            marker,
            timeout,
            deadline: deadline_after(Instant::now(), timeout),
            reply,
        });
    }

    fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) {
        trace!("Received {} bytes from {}", datagram.len(), from);
        if let Some(message) = self.reassembler.push(datagram, Instant::now()) {
            self.route(message);
        }
    }

    fn route(&mut self, message: Message) {
        let Some(&marker) = message.payload.first() else {
            return;
        };

        let Some(position) = self.waiting.iter().position(|w| w.marker == marker) else {
            debug!(
                "Dropping unclaimed message with marker {:#04x} ({} bytes) from {}",
                marker,
                message.payload.len(),
                self.remote_addr
            );
            return;
        };

        let request = self.waiting.remove(position);
        let response = Response {
            marker,
            body: message.payload[1..].to_vec(),
            compressed: message.compressed,
        };
        let _ = request.reply.send(Ok(response));
        self.query_ended();
    }

    fn expire(&mut self, now: Instant) {
        self.reassembler.expire(now);

        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiting)
            .into_iter()
            .partition(|w| w.deadline <= now);
        self.waiting = waiting;

        for request in expired {
            debug!(
                "No response with marker {:#04x} from {} within {:?}",
                request.marker, self.remote_addr, request.timeout
            );
            let _ = request.reply.send(Err(QueryError::Timeout {
                marker: request.marker,
                after: request.timeout,
            }));
            self.query_ended();
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.waiting
            .iter()
            .map(|w| w.deadline)
            .chain(self.reassembler.next_expiry())
            .min()
    }

    fn query_ended(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 && self.state == SessionState::Draining {
            self.set_state(SessionState::Closed);
        } else {
            self.publish();
        }
    }

    /// `done` is `None` when the last handle went away.
    fn request_close(&mut self, done: Option<Reply<()>>) {
        if self.deferred_close.is_some() {
            if let Some(done) = done {
                let _ = done.send(Err(QueryError::ClosePending));
            }
            return;
        }

        self.deferred_close = done;
        if self.in_flight == 0 {
            self.set_state(SessionState::Closed);
        } else {
            debug!(
                "Closing query socket for {} after {} queries finish",
                self.remote_addr, self.in_flight
            );
            self.set_state(SessionState::Draining);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.session.send_replace(Session {
            state: self.state,
            in_flight: self.in_flight,
        });
    }
}

async fn receive_failed(remote_addr: SocketAddr, error: &io::Error) {
    warn!("Error receiving on query socket for {}: {}", remote_addr, error);
    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
}
