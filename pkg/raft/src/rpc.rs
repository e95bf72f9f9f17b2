//! Wire messages and transport.
//!
//! The source dialed a fresh connection per call; kept here since every RPC
//! is idempotent at the protocol layer and the cluster is small. The
//! source's own transport module was not part of the retrieval pack, so
//! framing is enriched from the corpus convention of
//! `tokio_util::codec::LengthDelimitedCodec` over a raw `TcpStream`, carrying
//! `rmp_serde`-encoded frames the same way the source's `protos.rs` did.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::warn;

use crate::entry::Entry;
use crate::errors::{Error, ErrorKind, Result};
use crate::state::Snapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteReq {
    pub term: u64,
    pub candidate_id: usize,
    pub last_log_index: usize,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRep {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesReq {
    pub term: u64,
    pub leader_id: usize,
    pub prev_log_index: usize,
    pub prev_log_term: u64,
    /// The sentinel entry means "no payload, heartbeat only".
    pub entry: Entry,
    pub leader_commit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRep {
    pub term: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntryReq {
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    RequestVote(RequestVoteReq),
    AppendEntries(AppendEntriesReq),
    Reset,
    NetworkChange,
    LogEntry(LogEntryReq),
    ReportState(Snapshot),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    RequestVote(RequestVoteRep),
    AppendEntries(AppendEntriesRep),
    Ack,
    /// Protocol-level rejection from the callee (e.g. `PeerUnavailable`
    /// because the replica is disconnected). Distinct from a transport
    /// error: the call completed, the callee just declined.
    Err(String),
}

/// Dials a fresh connection to `addr`, sends one request frame, and reads
/// back one response frame.
pub async fn call(addr: SocketAddr, req: &Request) -> Result<Response> {
    let socket = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::from(ErrorKind::TransportFailure(e.to_string())))?;
    let mut framed = Framed::new(socket, LengthDelimitedCodec::new());

    let encoded = rmp_serde::to_vec(req)?;
    framed
        .send(Bytes::from(encoded))
        .await
        .map_err(|e| Error::from(ErrorKind::TransportFailure(e.to_string())))?;

    let frame = framed
        .next()
        .await
        .ok_or_else(|| Error::from(ErrorKind::ConnectionClosed))??;
    let rep: Response = rmp_serde::from_slice(&frame)?;
    Ok(rep)
}

/// A boxed async dispatch callback: decoded request in, response out. Never
/// fails — protocol-level rejections (e.g. disconnected replica) are
/// expressed as ordinary `Response` variants the caller interprets.
pub type Handler =
    Arc<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

/// Accepts connections forever, dispatching each request frame on a
/// connection through `handler` and writing back the response frame.
pub async fn serve(listen_addr: SocketAddr, handler: Handler) -> Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    loop {
        let (socket, peer) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_one(socket, handler).await {
                warn!(%peer, error = %e, "rpc connection dropped");
            }
        });
    }
}

async fn serve_one(socket: TcpStream, handler: Handler) -> Result<()> {
    let mut framed = Framed::new(socket, LengthDelimitedCodec::new());
    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let req: Request = rmp_serde::from_slice(&frame)?;
        let rep = handler(req).await;
        let encoded = rmp_serde::to_vec(&rep)?;
        framed.send(Bytes::from(encoded)).await?;
    }
    Ok(())
}
