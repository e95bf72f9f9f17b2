//! A small Raft replica: leader election and log replication across a
//! fixed cluster of three or five peers, driven by an external controller
//! over RPC.

pub mod admin;
pub mod config;
pub mod driver;
pub mod entry;
pub mod errors;
pub mod monitor;
pub mod peer_rpc;
pub mod replication;
pub mod rpc;
pub mod state;
pub mod timer;

pub use config::Config;
pub use state::Replica;

use std::sync::Arc;

use rpc::{Request, Response};

/// Decodes a wire `Request` into the right handler, returning the `Response`
/// to frame back to the caller. The peer and admin handlers are synchronous
/// (they only ever take the state lock), so this itself never needs to hold
/// the lock across an await.
pub async fn dispatch(replica: Arc<Replica>, req: Request) -> Response {
    match req {
        Request::RequestVote(r) => peer_rpc::request_vote(&replica, r),
        Request::AppendEntries(r) => peer_rpc::append_entries(&replica, r),
        Request::Reset => admin::reset(&replica),
        Request::NetworkChange => admin::network_change(&replica),
        Request::LogEntry(r) => admin::log_entry(&replica, r),
        Request::ReportState(_) => Response::Ack,
    }
}
