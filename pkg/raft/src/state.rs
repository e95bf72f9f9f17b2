//! Replica state store and the single owning object.
//!
//! `Replica` is shared as `Arc<Replica>` across the role-driver task, the
//! RPC dispatch tasks, the per-peer replication workers, and the monitor
//! pusher. Every mutable field lives inside `Mutex<ReplicaState>`; the
//! driver's wake signal lives alongside it per the "single process-wide
//! mutex guards all mutable state and the driver's signal channels" rule.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tracing::info;

use crate::config::Config;
use crate::entry::{Entry, Log};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// The three single-slot wakes the role-driver selects on.
/// Stored as `Option<Signal>` guarded by the state mutex: asserting a
/// signal overwrites whatever was pending, which is the "drain before
/// assert" rule expressed as an overwrite instead of an explicit clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    StayFollower,
    BecomeLeader,
    PropagateNow,
}

pub struct ReplicaState {
    pub connected: bool,
    pub role: Role,
    pub current_term: u64,
    pub voted_by: HashSet<usize>,
    pub log: Log,
    pub commit_index: usize,
    /// Leader-only; valid only while `role == Leader`, but kept allocated
    /// at cluster size so role transitions never reallocate.
    pub next_index: Vec<usize>,
    pub match_index: Vec<usize>,
    pub call_in_progress: Vec<bool>,
    pending_signal: Option<Signal>,
}

impl ReplicaState {
    fn new(n: usize) -> Self {
        ReplicaState {
            connected: true,
            role: Role::Follower,
            current_term: 0,
            voted_by: HashSet::new(),
            log: Log::new(),
            commit_index: 0,
            next_index: vec![1; n],
            match_index: vec![0; n],
            call_in_progress: vec![false; n],
            pending_signal: None,
        }
    }
}

/// A value-copied, wire-serializable view of a replica's observable state,
/// pushed to the controller on every state-visible mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: usize,
    pub connected: bool,
    pub role: Role,
    pub current_term: u64,
    pub voted_by: Vec<usize>,
    pub log: Vec<Entry>,
    pub commit_index: usize,
    pub next_index: Vec<usize>,
    pub match_index: Vec<usize>,
}

pub struct Replica {
    pub config: Config,
    state: Mutex<ReplicaState>,
    wake: Notify,
    monitor_tx: watch::Sender<Snapshot>,
}

impl Replica {
    pub fn new(config: Config) -> (std::sync::Arc<Replica>, watch::Receiver<Snapshot>) {
        let n = config.cluster_size();
        let state = ReplicaState::new(n);
        let initial = snapshot_of(config.id, &state);
        let (monitor_tx, monitor_rx) = watch::channel(initial);

        let replica = std::sync::Arc::new(Replica {
            config,
            state: Mutex::new(state),
            wake: Notify::new(),
            monitor_tx,
        });
        (replica, monitor_rx)
    }

    pub fn id(&self) -> usize {
        self.config.id
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, ReplicaState> {
        self.state.lock().unwrap()
    }

    /// Asserts `signal`, overwriting any other pending signal, and wakes the driver.
    pub fn signal(&self, signal: Signal) {
        {
            let mut st = self.lock();
            st.pending_signal = Some(signal);
        }
        self.wake.notify_one();
    }

    /// Waits until a pending signal in `wants` is asserted, consuming it.
    /// Uses the standard notify-before-check pattern so a signal raised
    /// between the check and the await is never missed.
    pub async fn wait_for_signal(&self, wants: &[Signal]) -> Signal {
        loop {
            let notified = self.wake.notified();
            {
                let mut st = self.lock();
                if let Some(sig) = st.pending_signal {
                    if wants.contains(&sig) {
                        st.pending_signal = None;
                        return sig;
                    }
                }
            }
            notified.await;
        }
    }

    /// Value-copies the current state under the lock and pushes it to the
    /// monitor channel, coalescing with any update not yet observed by the
    /// pusher task.
    pub fn publish_snapshot(&self) {
        let snap = {
            let st = self.lock();
            snapshot_of(self.id(), &st)
        };
        // `watch::Sender::send` only errors when every receiver has been
        // dropped, which never happens while the monitor task is alive.
        let _ = self.monitor_tx.send(snap);
    }

    /// Reinitializes the replica to its startup state:
    /// Follower, term 0, sentinel-only log, connectivity untouched.
    pub fn reset(&self) {
        let n = self.config.cluster_size();
        {
            let mut st = self.lock();
            let connected = st.connected;
            *st = ReplicaState::new(n);
            st.connected = connected;
        }
        info!(replica = self.id(), "reset to initial state");
        self.signal(Signal::StayFollower);
        self.publish_snapshot();
    }
}

fn snapshot_of(id: usize, st: &ReplicaState) -> Snapshot {
    Snapshot {
        id,
        connected: st.connected,
        role: st.role,
        current_term: st.current_term,
        voted_by: {
            let mut v: Vec<usize> = st.voted_by.iter().copied().collect();
            v.sort_unstable();
            v
        },
        log: st.log.as_slice().to_vec(),
        commit_index: st.commit_index,
        next_index: st.next_index.clone(),
        match_index: st.match_index.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn test_config() -> Config {
        let peers: Vec<SocketAddr> = vec![
            "127.0.0.1:1235".parse().unwrap(),
            "127.0.0.1:1236".parse().unwrap(),
            "127.0.0.1:1237".parse().unwrap(),
        ];
        Config::new(0, peers, "127.0.0.1:1234".parse().unwrap()).unwrap()
    }

    #[test]
    fn new_replica_starts_follower_term_zero() {
        let (replica, _rx) = Replica::new(test_config());
        let st = replica.lock();
        assert_eq!(st.role, Role::Follower);
        assert_eq!(st.current_term, 0);
        assert_eq!(st.log.len(), 1);
        assert_eq!(st.commit_index, 0);
    }

    #[test]
    fn reset_preserves_connectivity_flag() {
        let (replica, _rx) = Replica::new(test_config());
        {
            let mut st = replica.lock();
            st.connected = false;
            st.current_term = 5;
            st.role = Role::Leader;
        }
        replica.reset();
        let st = replica.lock();
        assert!(!st.connected);
        assert_eq!(st.current_term, 0);
        assert_eq!(st.role, Role::Follower);
    }

    #[tokio::test]
    async fn signal_wakes_matching_waiter_only() {
        let (replica, _rx) = Replica::new(test_config());
        replica.signal(Signal::PropagateNow);
        let got = replica.wait_for_signal(&[Signal::PropagateNow, Signal::StayFollower]).await;
        assert_eq!(got, Signal::PropagateNow);
    }
}
