//! External monitor adapter.
//!
//! Pushes are fire-and-forget: a `watch` channel naturally implements a
//! bounded outbound queue with coalescing — a burst of state changes
//! between two pushes collapses into the latest snapshot rather than
//! queuing every intermediate one. A push failure is logged and otherwise
//! ignored (the source treats an unreachable controller as fatal; this
//! port downgrades it to a warning).

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::warn;

use crate::rpc::{self, Request};
use crate::state::Snapshot;

pub async fn run(monitor_addr: SocketAddr, mut updates: watch::Receiver<Snapshot>) {
    loop {
        if updates.changed().await.is_err() {
            return;
        }
        let snapshot = updates.borrow().clone();
        if let Err(e) = rpc::call(monitor_addr, &Request::ReportState(snapshot)).await {
            warn!(error = %e, "monitor push failed, continuing");
        }
    }
}
