//! Role state machine driver.
//!
//! One task per replica, running forever, dispatching on role. Each loop
//! obtains its own timer handles on every iteration so a stale handle from
//! a prior role can never fire into the next one.

use std::sync::Arc;

use tracing::info;

use crate::replication::start_replication_round;
use crate::rpc::{self, Request, RequestVoteReq, Response};
use crate::state::{Replica, Role, Signal};
use crate::timer::{long_timer, short_timer};

pub async fn run(replica: Arc<Replica>) {
    loop {
        let role = replica.lock().role;
        match role {
            Role::Follower => follower_loop(&replica).await,
            Role::Candidate => candidate_loop(&replica).await,
            Role::Leader => leader_loop(&replica).await,
        }
    }
}

async fn follower_loop(replica: &Arc<Replica>) {
    loop {
        tokio::select! {
            _ = long_timer() => {
                become_candidate(replica);
                return;
            }
            _ = replica.wait_for_signal(&[Signal::StayFollower]) => {
                // stay-follower resets the waiting horizon; loop again and
                // obtain a fresh long timer.
            }
        }
    }
}

async fn candidate_loop(replica: &Arc<Replica>) {
    let deadline = long_timer();
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = short_timer() => {
                start_vote_round(replica);
            }
            _ = &mut deadline => {
                become_candidate(replica);
                return;
            }
            sig = replica.wait_for_signal(&[Signal::StayFollower, Signal::BecomeLeader]) => {
                match sig {
                    Signal::StayFollower => {
                        become_follower(replica);
                        return;
                    }
                    Signal::BecomeLeader => {
                        become_leader(replica);
                        return;
                    }
                    Signal::PropagateNow => unreachable!("candidate loop never waits on PropagateNow"),
                }
            }
        }
    }
}

async fn leader_loop(replica: &Arc<Replica>) {
    loop {
        tokio::select! {
            _ = short_timer() => {
                start_replication_round(replica);
            }
            sig = replica.wait_for_signal(&[Signal::PropagateNow, Signal::StayFollower]) => {
                match sig {
                    Signal::PropagateNow => start_replication_round(replica),
                    Signal::StayFollower => {
                        become_follower(replica);
                        return;
                    }
                    Signal::BecomeLeader => unreachable!("leader loop never waits on BecomeLeader"),
                }
            }
        }
    }
}

fn become_candidate(replica: &Arc<Replica>) {
    let term = {
        let mut st = replica.lock();
        st.role = Role::Candidate;
        st.voted_by.clear();
        st.voted_by.insert(replica.id());
        st.current_term += 1;
        st.current_term
    };
    info!(replica = replica.id(), term, "follower -> candidate");
    replica.publish_snapshot();
}

fn become_leader(replica: &Arc<Replica>) {
    let term = {
        let mut st = replica.lock();
        st.role = Role::Leader;
        let last = st.log.last_index();
        let len = st.log.len();
        let n = replica.config.cluster_size();
        for peer in 0..n {
            st.next_index[peer] = len;
            st.match_index[peer] = 0;
        }
        st.match_index[replica.id()] = last;
        st.current_term
    };
    info!(replica = replica.id(), term, "candidate -> leader");
    replica.publish_snapshot();
}

fn become_follower(replica: &Arc<Replica>) {
    let term = {
        let mut st = replica.lock();
        st.role = Role::Follower;
        st.voted_by.clear();
        st.current_term
    };
    info!(replica = replica.id(), term, "-> follower");
    replica.publish_snapshot();
}

/// Broadcasts a fresh `RequestVote` to every peer, each in its own task, and
/// folds the reply into `votedBy` as it arrives. A majority triggers the
/// become-leader signal exactly once; later replies are no-ops against an
/// already-Leader role.
fn start_vote_round(replica: &Arc<Replica>) {
    let n = replica.config.cluster_size();
    for peer in 0..n {
        if peer == replica.id() {
            continue;
        }
        let replica = replica.clone();
        tokio::spawn(async move {
            request_vote_from(&replica, peer).await;
        });
    }
}

async fn request_vote_from(replica: &Arc<Replica>, peer: usize) {
    let (addr, req) = {
        let st = replica.lock();
        if st.role != Role::Candidate || !st.connected {
            return;
        }
        let req = RequestVoteReq {
            term: st.current_term,
            candidate_id: replica.id(),
            last_log_index: st.log.last_index(),
            last_log_term: st.log.last_term(),
        };
        (replica.config.peers[peer], req)
    };

    let rep = match rpc::call(addr, &Request::RequestVote(req)).await {
        Ok(Response::RequestVote(rep)) => rep,
        Ok(Response::Err(_)) | Err(_) => return,
        Ok(_) => return,
    };

    let mut st = replica.lock();
    if rep.term > st.current_term {
        st.current_term = rep.term;
        st.role = Role::Follower;
        st.voted_by.clear();
        drop(st);
        replica.signal(Signal::StayFollower);
        replica.publish_snapshot();
        return;
    }

    if st.role != Role::Candidate {
        return;
    }
    if rep.vote_granted {
        st.voted_by.insert(peer);
    }
    let votes = st.voted_by.len();
    let n = replica.config.cluster_size();
    drop(st);

    if votes > n / 2 {
        replica.signal(Signal::BecomeLeader);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_replica() -> Arc<Replica> {
        let peers: Vec<std::net::SocketAddr> = vec![
            "127.0.0.1:1235".parse().unwrap(),
            "127.0.0.1:1236".parse().unwrap(),
            "127.0.0.1:1237".parse().unwrap(),
        ];
        let config = crate::config::Config::new(0, peers, "127.0.0.1:1234".parse().unwrap()).unwrap();
        Replica::new(config).0
    }

    #[test]
    fn become_candidate_increments_term_and_votes_self() {
        let replica = test_replica();
        become_candidate(&replica);
        let st = replica.lock();
        assert_eq!(st.role, Role::Candidate);
        assert_eq!(st.current_term, 1);
        assert!(st.voted_by.contains(&replica.id()));
    }

    #[test]
    fn become_leader_initializes_next_and_match_index() {
        let replica = test_replica();
        {
            let mut st = replica.lock();
            st.log.append(crate::entry::Entry { term: 1, value: 1 });
            st.role = Role::Candidate;
        }
        become_leader(&replica);
        let st = replica.lock();
        assert_eq!(st.role, Role::Leader);
        assert_eq!(st.next_index[1], 2);
        assert_eq!(st.match_index[replica.id()], 1);
    }

    #[test]
    fn become_follower_clears_votes() {
        let replica = test_replica();
        {
            let mut st = replica.lock();
            st.role = Role::Candidate;
            st.voted_by.insert(replica.id());
        }
        become_follower(&replica);
        let st = replica.lock();
        assert_eq!(st.role, Role::Follower);
        assert!(st.voted_by.is_empty());
    }
}
