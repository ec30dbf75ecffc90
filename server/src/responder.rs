//! UDP query responder.
//!
//! Answers info, challenge, player and rules requests from a
//! [`ServerProfile`](crate::config::ServerProfile). Messages too long for one
//! datagram are split, and the configured [`Delivery`] decides how the
//! fragments go out.

use crate::config::{Delivery, ResponderConfig};
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::framing::encode_fragment;
use shared::{
    rules, single_packet, split_packet, ChallengeKey, FramingError, PlayerEntry, QueryKind,
    Request, COMPRESSED_FLAG, NO_CHALLENGE,
};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Filler carried by injected out-of-range fragments.
const INVALID_FRAGMENT_BODY: &[u8] = b"not part of any answer";

/// Handle to a running responder task. Dropping it stops the task.
pub struct Responder {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Responder {
    /// Binds `config.bind_addr` and starts answering in a spawned task.
    pub async fn bind(config: ResponderConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(&config.bind_addr).await?;
        let local_addr = socket.local_addr()?;
        info!(
            "Responder listening on {} ({:?}, max payload {})",
            local_addr, config.delivery, config.max_payload
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let state = ResponderState::new(socket, config);
        let task = tokio::spawn(state.run(shutdown_rx));

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Address the responder socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the task and waits for it to release the socket.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!("Responder task failed: {}", e);
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

struct ResponderState {
    socket: UdpSocket,
    config: ResponderConfig,
    challenge: ChallengeKey,
    next_response_id: u32,
}

impl ResponderState {
    fn new(socket: UdpSocket, config: ResponderConfig) -> Self {
        let mut rng = rand::thread_rng();
        // Never hand out the placeholder value
        let challenge = loop {
            let candidate: i32 = rng.gen();
            if candidate != NO_CHALLENGE {
                break ChallengeKey(candidate);
            }
        };

        Self {
            socket,
            config,
            challenge,
            next_response_id: rng.gen(),
        }
    }

    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut buffer = [0u8; 2048];

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Responder on {:?} shutting down", self.socket.local_addr().ok());
                    break;
                },

                result = self.socket.recv_from(&mut buffer) => match result {
                    Ok((len, addr)) => self.handle_datagram(&buffer[..len], addr).await,
                    Err(e) => {
                        error!("Error receiving request: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }
    }

    async fn handle_datagram(&mut self, datagram: &[u8], addr: SocketAddr) {
        let request = match Request::decode(datagram) {
            Ok(request) => request,
            Err(e) => {
                warn!("Ignoring malformed request from {}: {}", addr, e);
                return;
            }
        };

        if self.config.delivery == Delivery::Silent {
            debug!("Staying silent on {:?} from {}", request, addr);
            return;
        }

        let message = self.respond(&request);
        let datagrams = match self.frame(&message) {
            Ok(datagrams) => datagrams,
            Err(e) => {
                error!("Cannot frame {}-byte answer to {:?}: {}", message.len(), request, e);
                return;
            }
        };

        debug!(
            "Answering {:?} from {} with {} bytes in {} datagrams",
            request,
            addr,
            message.len(),
            datagrams.len()
        );
        for datagram in datagrams {
            if let Err(e) = self.socket.send_to(&datagram, addr).await {
                error!("Failed to send response to {}: {}", addr, e);
                return;
            }
        }
    }

    /// Builds the logical message that answers `request`.
    fn respond(&self, request: &Request) -> Vec<u8> {
        let stale = matches!(
            request,
            Request::Players(key) | Request::Rules(key) if *key != self.challenge
        );
        if request.wants_challenge() || stale {
            return self.challenge.encode_response();
        }

        let profile = &self.config.profile;
        match request.kind() {
            QueryKind::Info => profile.info.encode_response(),
            QueryKind::Challenge => self.challenge.encode_response(),
            QueryKind::Players => PlayerEntry::encode_list_response(&profile.players),
            QueryKind::Rules => rules::encode_response(
                profile
                    .rules
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str())),
            ),
        }
    }

    fn frame(&mut self, message: &[u8]) -> Result<Vec<Vec<u8>>, FramingError> {
        let max_payload = self.config.max_payload;
        if message.len() + 4 <= max_payload {
            return Ok(vec![single_packet(message)]);
        }

        let response_id = self.next_response_id();
        let fragments = split_packet(message, response_id, max_payload)?;
        Ok(self.arrange(fragments, response_id))
    }

    fn next_response_id(&mut self) -> u32 {
        self.next_response_id = self.next_response_id.wrapping_add(1);
        let id = self.next_response_id & !COMPRESSED_FLAG;
        if self.config.compressed {
            id | COMPRESSED_FLAG
        } else {
            id
        }
    }

    /// Applies the delivery mode to fragments given in index order.
    fn arrange(&self, mut fragments: Vec<Vec<u8>>, response_id: u32) -> Vec<Vec<u8>> {
        match self.config.delivery {
            Delivery::InOrder | Delivery::Silent => {}
            Delivery::Shuffled => fragments.shuffle(&mut rand::thread_rng()),
            Delivery::Reversed => fragments.reverse(),
            Delivery::WithInvalidFragment => {
                let total = fragments.len() as u8;
                let size = self.config.max_payload.min(u16::MAX as usize) as u16;
                let invalid =
                    encode_fragment(response_id, total, total, size, INVALID_FRAGMENT_BODY);
                fragments.insert(0, invalid);
            }
            Delivery::DropLastFragment => {
                fragments.pop();
            }
        }
        fragments
    }
}
