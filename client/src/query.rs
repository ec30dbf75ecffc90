//! The four query operations.
//!
//! Each operation encodes a request with `shared`, sends it through the
//! dispatcher and decodes the matched response. Player and rules queries
//! fetch a challenge first and only send the real request once it has
//! decoded; a failed challenge ends the query there.

use crate::config::QueryConfig;
use crate::dispatcher::{Dispatcher, Response};
use crate::error::QueryError;
use log::debug;
use shared::{rules, ChallengeKey, PlayerEntry, QueryKind, Rules, ServerInfo};
use std::net::SocketAddr;

/// Queries against one server over one dispatcher.
#[derive(Clone)]
pub struct ServerQuery {
    dispatcher: Dispatcher,
}

impl ServerQuery {
    /// Resolves `host` and opens a client for it.
    pub async fn open(host: &str, port: u16, config: QueryConfig) -> Result<Self, QueryError> {
        Ok(Self::new(Dispatcher::open(host, port, config).await?))
    }

    /// Opens a client for an already resolved address.
    pub async fn open_addr(addr: SocketAddr, config: QueryConfig) -> Result<Self, QueryError> {
        Ok(Self::new(Dispatcher::open_addr(addr, config).await?))
    }

    /// Wraps an existing dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// The dispatcher carrying this client's requests.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Fetches a challenge on behalf of `selector`.
    pub async fn challenge_key(&self, selector: QueryKind) -> Result<ChallengeKey, QueryError> {
        let response = self
            .request(ChallengeKey::encode_request(selector), QueryKind::Challenge)
            .await?;
        Ok(ChallengeKey::decode(&response.body)?)
    }

    /// Fetches the server info.
    pub async fn info(&self) -> Result<ServerInfo, QueryError> {
        let response = self
            .request(ServerInfo::encode_request(), QueryKind::Info)
            .await?;
        Ok(ServerInfo::decode(&response.body)?)
    }

    /// Fetches the player list, obtaining a challenge first.
    pub async fn players(&self) -> Result<Vec<PlayerEntry>, QueryError> {
        let _hold = self.dispatcher.hold();
        let challenge = self.challenge_key(QueryKind::Players).await?;
        let response = self
            .request(PlayerEntry::encode_request(challenge), QueryKind::Players)
            .await?;
        Ok(PlayerEntry::decode_list(&response.body)?)
    }

    /// Fetches the server rules, obtaining a challenge first.
    pub async fn rules(&self) -> Result<Rules, QueryError> {
        let _hold = self.dispatcher.hold();
        let challenge = self.challenge_key(QueryKind::Rules).await?;
        let response = self
            .request(rules::encode_request(challenge), QueryKind::Rules)
            .await?;
        Ok(rules::decode(&response.body)?)
    }

    /// Closes the underlying dispatcher once queries finish.
    pub async fn close(&self) -> Result<(), QueryError> {
        self.dispatcher.close().await
    }

    async fn request(&self, request: Vec<u8>, kind: QueryKind) -> Result<Response, QueryError> {
        let response = self
            .dispatcher
            .send(request, kind.response_marker(), self.dispatcher.timeout())
            .await?;

        if response.compressed {
            debug!(
                "Decoding {:?} response from {} that is still compressed",
                kind,
                self.dispatcher.remote_addr()
            );
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{single_packet, Request};
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio_test::{assert_err, assert_ok};

    async fn fake_server() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn query_for(addr: SocketAddr) -> ServerQuery {
        let config = QueryConfig::default().with_timeout(Duration::from_millis(100));
        ServerQuery::open_addr(addr, config).await.unwrap()
    }

    async fn next_request(server: &UdpSocket) -> (Request, SocketAddr) {
        let mut buf = [0u8; 1400];
        let (len, peer) = server.recv_from(&mut buf).await.unwrap();
        (Request::decode(&buf[..len]).unwrap(), peer)
    }

    #[tokio::test]
    async fn test_rules_fetches_challenge_first() {
        let (server, addr) = fake_server().await;
        let query = query_for(addr).await;

        let responder = tokio::spawn(async move {
            let (request, peer) = next_request(&server).await;
            assert_eq!(request, Request::Rules(ChallengeKey(-1)));
            let challenge = ChallengeKey(0x1234).encode_response();
            server.send_to(&single_packet(&challenge), peer).await.unwrap();

            let (request, peer) = next_request(&server).await;
            assert_eq!(request, Request::Rules(ChallengeKey(0x1234)));
            let body = rules::encode_response([("mp_timelimit", "30"), ("sv_gravity", "800")]);
            server.send_to(&single_packet(&body), peer).await.unwrap();
        });

        let rules = assert_ok!(query.rules().await);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules["mp_timelimit"], "30");
        assert_eq!(rules["sv_gravity"], "800");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_challenge_skips_dependent_request() {
        let (server, addr) = fake_server().await;
        let query = query_for(addr).await;

        let err = assert_err!(query.players().await);
        assert!(err.is_timeout());

        // Only the challenge request was ever sent
        let (request, _) = next_request(&server).await;
        assert_eq!(request, Request::Players(ChallengeKey(-1)));
        let mut buf = [0u8; 64];
        let nothing = tokio::time::timeout(Duration::from_millis(50), server.recv_from(&mut buf)).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_decode_error() {
        let (server, addr) = fake_server().await;
        let query = query_for(addr).await;

        let responder = tokio::spawn(async move {
            let (_, peer) = next_request(&server).await;
            // Challenge marker with two bytes where four are needed
            server.send_to(&single_packet(b"A\x01\x02"), peer).await.unwrap();
        });

        let err = assert_err!(query.challenge_key(QueryKind::Challenge).await);
        assert!(matches!(err, QueryError::Decode(_)));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_mid_query_waits_for_dependent_request() {
        let (server, addr) = fake_server().await;
        let query = query_for(addr).await;
        let dispatcher = query.dispatcher().clone();

        let responder = tokio::spawn(async move {
            let (_, peer) = next_request(&server).await;
            server
                .send_to(&single_packet(&ChallengeKey(7).encode_response()), peer)
                .await
                .unwrap();

            let (request, peer) = next_request(&server).await;
            assert_eq!(request, Request::Players(ChallengeKey(7)));
            let players = [PlayerEntry {
                index: 0,
                name: "alice".into(),
                score: 3,
                duration: 12.0,
            }];
            let body = PlayerEntry::encode_list_response(&players);
            server.send_to(&single_packet(&body), peer).await.unwrap();
        });

        let players = tokio::spawn({
            let query = query.clone();
            async move { query.players().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let close = tokio::spawn(dispatcher.close());

        let players = assert_ok!(players.await.unwrap());
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].name, "alice");
        assert_ok!(close.await.unwrap());
        responder.await.unwrap();
    }
}
