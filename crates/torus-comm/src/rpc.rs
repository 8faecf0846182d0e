//! Client side of a dialed peer connection.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::frame::{read_frame, write_frame};
use crate::CommError;

/// A dialed TCP connection carrying serialized request/response pairs.
///
/// Calls lock the stream for their full round trip, so concurrent callers
/// are queued rather than interleaved. Dropping the connection closes it;
/// the peer observes EOF on its next read.
pub struct RpcConnection {
    stream: Mutex<TcpStream>,
    peer: String,
}

impl RpcConnection {
    /// Dial a peer.
    pub async fn dial(addr: &str) -> Result<Self, CommError> {
        let stream = TcpStream::connect(addr).await?;
        debug!(peer = addr, "dialed");
        Ok(Self {
            stream: Mutex::new(stream),
            peer: addr.to_string(),
        })
    }

    /// Address this connection was dialed with.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one request and await its response.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp, CommError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, request).await?;
        read_frame(&mut *stream).await
    }
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection").field("peer", &self.peer).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tokio::net::TcpListener;

    #[derive(Debug, Serialize, Deserialize)]
    struct EchoRequest(u64);

    #[derive(Debug, Serialize, Deserialize)]
    struct EchoResponse(u64);

    #[tokio::test]
    async fn calls_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            loop {
                let request: EchoRequest = match read_frame(&mut stream).await {
                    Ok(req) => req,
                    Err(_) => return,
                };
                write_frame(&mut stream, &EchoResponse(request.0 * 2))
                    .await
                    .unwrap();
            }
        });

        let conn = RpcConnection::dial(&addr.to_string()).await.unwrap();
        for i in 0..5u64 {
            let response: EchoResponse = conn.call(&EchoRequest(i)).await.unwrap();
            assert_eq!(response.0, i * 2);
        }
    }

    #[tokio::test]
    async fn call_against_a_closed_peer_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let conn = RpcConnection::dial(&addr.to_string()).await.unwrap();
        // Accept and immediately drop the server side.
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
        drop(listener);

        let result: Result<EchoResponse, _> = conn.call(&EchoRequest(1)).await;
        assert!(result.is_err());
    }
}
