//! Immutable per-process configuration.
//!
//! Replaces the source's module-level `N` / `monitorAddr` / `clusterAddr`
//! globals. Built once from CLI arguments and never mutated afterwards, so
//! it is simply moved (or cheaply cloned) into every task the replica
//! spawns instead of being locked.

use std::net::SocketAddr;
use std::time::Duration;

/// Fixed 2s short timer: leader heartbeat interval, candidate
/// vote-retry interval.
pub const SHORT_TIMER: Duration = Duration::from_secs(2);

/// Long timer bounds, uniform in `[LONG_TIMER_MIN, LONG_TIMER_MAX)`:
/// follower election timeout, candidate election-term timeout.
pub const LONG_TIMER_MIN: Duration = Duration::from_secs(5);
pub const LONG_TIMER_MAX: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Config {
    /// This replica's id, in `[0, peers.len())`.
    pub id: usize,

    /// Listen address for this replica's own RPC endpoint.
    pub listen_addr: SocketAddr,

    /// Addresses of every replica in the cluster, indexed by id (including
    /// `self.id`, which is never dialed).
    pub peers: Vec<SocketAddr>,

    /// Address of the external controller, for `ReportState` pushes.
    pub monitor_addr: SocketAddr,
}

impl Config {
    pub fn new(
        id: usize,
        peers: Vec<SocketAddr>,
        monitor_addr: SocketAddr,
    ) -> crate::errors::Result<Config> {
        if peers.len() != 3 && peers.len() != 5 {
            return Err(crate::errors::ErrorKind::InvalidArgument(format!(
                "cluster size must be 3 or 5, got {}",
                peers.len()
            ))
            .into());
        }
        if id >= peers.len() {
            return Err(crate::errors::ErrorKind::InvalidArgument(format!(
                "replica id {} out of range for {} peers",
                id,
                peers.len()
            ))
            .into());
        }

        let listen_addr = peers[id];
        Ok(Config {
            id,
            listen_addr,
            peers,
            monitor_addr,
        })
    }

    pub fn cluster_size(&self) -> usize {
        self.peers.len()
    }

    /// Operator-facing single-character label for this replica: `z` for id
    /// 0, then `a`, `b`, `c`, `d`.
    pub fn label(id: usize) -> char {
        if id == 0 {
            'z'
        } else {
            (b'a' + (id as u8 - 1)) as char
        }
    }
}
