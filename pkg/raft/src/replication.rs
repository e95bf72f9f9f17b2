//! Leader-side replication engine.
//!
//! One task per peer, gated by `callInProgress` so at most one worker talks
//! to a given peer at a time. A round just spawns a worker for every peer
//! whose flag is currently clear; multiple rounds naturally coalesce since
//! a peer already being serviced is skipped.

use std::sync::Arc;

use tracing::{debug, info};

use crate::entry::Entry;
use crate::rpc::{self, AppendEntriesReq, Request, Response};
use crate::state::{Replica, ReplicaState, Role, Signal};

pub fn start_replication_round(replica: &Arc<Replica>) {
    let n = replica.config.cluster_size();
    for peer in 0..n {
        if peer == replica.id() {
            continue;
        }
        {
            let mut st = replica.lock();
            if st.role != Role::Leader || st.call_in_progress[peer] {
                continue;
            }
            st.call_in_progress[peer] = true;
        }

        let replica = replica.clone();
        tokio::spawn(async move {
            replicate_to_peer(&replica, peer).await;
            replica.lock().call_in_progress[peer] = false;
        });
    }
}

/// Runs to completion: either the peer is caught up, a transport error
/// occurs (the next round retries), or a higher term is observed and this
/// replica steps down.
async fn replicate_to_peer(replica: &Arc<Replica>, peer: usize) {
    loop {
        let (addr, req) = {
            let st = replica.lock();
            if st.role != Role::Leader || !st.connected {
                return;
            }
            let prev_log_index = st.next_index[peer] - 1;
            let prev_log_term = st
                .log
                .get(prev_log_index)
                .expect("next_index is always >= 1, so prev_log_index is in range")
                .term;
            let entry = st.log.get(st.next_index[peer]).unwrap_or(Entry::SENTINEL);
            let req = AppendEntriesReq {
                term: st.current_term,
                leader_id: replica.id(),
                prev_log_index,
                prev_log_term,
                entry,
                leader_commit: st.commit_index,
            };
            (replica.config.peers[peer], req)
        };

        let rep = match rpc::call(addr, &Request::AppendEntries(req.clone())).await {
            Ok(Response::AppendEntries(rep)) => rep,
            Ok(Response::Err(_)) | Err(_) => {
                debug!(replica = replica.id(), peer, "replication: peer unreachable this round");
                return;
            }
            Ok(_) => return,
        };

        let mut st = replica.lock();
        if rep.term > st.current_term {
            st.current_term = rep.term;
            st.role = Role::Follower;
            st.voted_by.clear();
            drop(st);
            info!(replica = replica.id(), term = rep.term, peer, "stepping down: higher term from peer");
            replica.signal(Signal::StayFollower);
            replica.publish_snapshot();
            return;
        }

        if rep.success {
            st.match_index[peer] = req.prev_log_index;
            advance_commit_index(&mut st);
            let caught_up = st.next_index[peer] == st.log.len();
            if !caught_up {
                st.next_index[peer] += 1;
            }
            drop(st);
            replica.publish_snapshot();
            if caught_up {
                return;
            }
        } else {
            if st.next_index[peer] > 1 {
                st.next_index[peer] -= 1;
            }
            drop(st);
        }
    }
}

/// Advances `commitIndex` to the median `matchIndex` (the majority floor
/// for odd cluster sizes) if that is larger than the current value.
/// Intentionally does not gate on `log[matchIndex].term == currentTerm`,
/// preserving the source's deviation from canonical Raft.
fn advance_commit_index(st: &mut ReplicaState) {
    let mut sorted = st.match_index.clone();
    sorted.sort_unstable();
    let median = sorted[sorted.len() / 2];
    if median > st.commit_index {
        st.commit_index = median;
    }
}
