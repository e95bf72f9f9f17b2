//! Peer RPC handlers: `RequestVote` and `AppendEntries`.
//!
//! Both run under the replica's single lock and never await while holding
//! it: the lock is taken, the decision made, the lock dropped, then
//! the signal (if any) and the log line are emitted.

use std::sync::Arc;

use tracing::debug;

use crate::entry::Entry;
use crate::rpc::{AppendEntriesRep, AppendEntriesReq, RequestVoteRep, RequestVoteReq, Response};
use crate::state::{Replica, Signal};

pub fn request_vote(replica: &Arc<Replica>, req: RequestVoteReq) -> Response {
    let mut st = replica.lock();
    if !st.connected {
        return Response::Err(format!("peer {} is unavailable", replica.id()));
    }

    let local_last_index = st.log.last_index();
    let local_last_term = st.log.last_term();
    let candidate_up_to_date = req.last_log_term > local_last_term
        || (req.last_log_term == local_last_term && req.last_log_index >= local_last_index);

    if req.term > st.current_term && candidate_up_to_date {
        st.current_term = req.term;
        let term = st.current_term;
        drop(st);
        debug!(replica = replica.id(), term, candidate = req.candidate_id, "vote granted");
        replica.signal(Signal::StayFollower);
        replica.publish_snapshot();
        Response::RequestVote(RequestVoteRep {
            term,
            vote_granted: true,
        })
    } else {
        let term = st.current_term;
        drop(st);
        debug!(replica = replica.id(), term, candidate = req.candidate_id, "vote withheld");
        Response::RequestVote(RequestVoteRep {
            term,
            vote_granted: false,
        })
    }
}

pub fn append_entries(replica: &Arc<Replica>, req: AppendEntriesReq) -> Response {
    let mut st = replica.lock();
    if !st.connected {
        return Response::Err(format!("peer {} is unavailable", replica.id()));
    }

    if req.term < st.current_term {
        let term = st.current_term;
        drop(st);
        debug!(replica = replica.id(), term, leader = req.leader_id, "append entries: stale term");
        return Response::AppendEntries(AppendEntriesRep {
            term,
            success: false,
        });
    }

    st.current_term = req.term;
    let consistent = st.log.len() > req.prev_log_index
        && st.log.get(req.prev_log_index).map(|e| e.term) == Some(req.prev_log_term);

    if !consistent {
        let term = st.current_term;
        drop(st);
        debug!(
            replica = replica.id(),
            term,
            prev_index = req.prev_log_index,
            "append entries: consistency check failed"
        );
        replica.signal(Signal::StayFollower);
        replica.publish_snapshot();
        return Response::AppendEntries(AppendEntriesRep {
            term,
            success: false,
        });
    }

    if req.entry != Entry::SENTINEL {
        st.log.set_and_truncate(req.prev_log_index + 1, req.entry);
    }
    st.commit_index = req.leader_commit.min(st.log.last_index());
    let term = st.current_term;
    drop(st);

    debug!(replica = replica.id(), term, leader = req.leader_id, "append entries: accepted");
    replica.signal(Signal::StayFollower);
    replica.publish_snapshot();
    Response::AppendEntries(AppendEntriesRep {
        term,
        success: true,
    })
}
