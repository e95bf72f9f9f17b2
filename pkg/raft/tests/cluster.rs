//! End-to-end cluster scenarios. Timers are driven via `tokio::time::pause`
//! and `advance` so elections and heartbeats happen on simulated time
//! instead of real sleeps; actual loopback RPCs still complete on their own
//! since the paused clock only affects timer futures, not socket I/O.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use raft::entry::Entry;
use raft::rpc::{self, Handler, LogEntryReq, Request, Response};
use raft::state::Role;
use raft::{admin, dispatch, driver, monitor, Config, Replica};

struct Cluster {
    replicas: Vec<Arc<Replica>>,
}

impl Cluster {
    fn find_leader(&self) -> Option<&Arc<Replica>> {
        self.replicas.iter().find(|r| r.lock().role == Role::Leader)
    }

    fn leaders(&self) -> Vec<&Arc<Replica>> {
        self.replicas.iter().filter(|r| r.lock().role == Role::Leader).collect()
    }
}

async fn spawn_stub_controller(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut framed = Framed::new(socket, LengthDelimitedCodec::new());
                while let Some(Ok(frame)) = framed.next().await {
                    let _: std::result::Result<Request, _> = rmp_serde::from_slice(&frame);
                    let ack = rmp_serde::to_vec(&Response::Ack).unwrap();
                    if framed.send(Bytes::from(ack)).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
}

async fn spawn_cluster(base_port: u16, n: usize) -> Cluster {
    let peers: Vec<SocketAddr> = (0..n)
        .map(|i| format!("127.0.0.1:{}", base_port + i as u16).parse().unwrap())
        .collect();
    let monitor_addr: SocketAddr = format!("127.0.0.1:{}", base_port - 1).parse().unwrap();
    spawn_stub_controller(monitor_addr).await;

    let mut replicas = Vec::with_capacity(n);
    for id in 0..n {
        let config = Config::new(id, peers.clone(), monitor_addr).unwrap();
        let listen_addr = config.listen_addr;
        let (replica, monitor_rx) = Replica::new(config);

        let handler: Handler = {
            let replica = replica.clone();
            Arc::new(move |req| {
                let replica = replica.clone();
                Box::pin(async move { dispatch(replica, req).await })
            })
        };
        tokio::spawn(rpc::serve(listen_addr, handler));
        tokio::spawn(driver::run(replica.clone()));
        tokio::spawn(monitor::run(monitor_addr, monitor_rx));
        replicas.push(replica);
    }
    Cluster { replicas }
}

/// Advances the simulated clock and yields repeatedly so spawned tasks
/// (RPC round trips, replication workers) get to run to quiescence.
async fn advance_and_settle(dur: Duration) {
    tokio::time::advance(dur).await;
    for _ in 0..200 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cold_start_elects_a_single_leader() {
    let cluster = spawn_cluster(21100, 3).await;

    advance_and_settle(Duration::from_secs(11)).await;
    advance_and_settle(Duration::from_secs(2)).await;

    let leaders = cluster.leaders();
    assert_eq!(leaders.len(), 1, "exactly one replica should hold leadership");
    let term = leaders[0].lock().current_term;
    assert!(term >= 1);

    advance_and_settle(Duration::from_secs(3)).await;
    for r in &cluster.replicas {
        assert_eq!(r.lock().current_term, term, "all replicas converge on the leader's term");
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn submit_value_on_leader_replicates_and_commits() {
    let cluster = spawn_cluster(21110, 3).await;
    advance_and_settle(Duration::from_secs(11)).await;
    advance_and_settle(Duration::from_secs(2)).await;

    let leader = cluster.find_leader().expect("cold start produces a leader");
    let term = leader.lock().current_term;

    admin::log_entry(leader, LogEntryReq { value: 7 });
    advance_and_settle(Duration::from_secs(3)).await;

    for r in &cluster.replicas {
        let st = r.lock();
        assert_eq!(st.log.get(1), Some(Entry { term, value: 7 }));
        assert_eq!(st.commit_index, 1);
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn leader_partition_elects_a_successor_and_rejoins() {
    let cluster = spawn_cluster(21120, 3).await;
    advance_and_settle(Duration::from_secs(11)).await;
    advance_and_settle(Duration::from_secs(2)).await;

    let old_leader_id = cluster.find_leader().expect("cold start produces a leader").id();
    let old_term = cluster.replicas[old_leader_id].lock().current_term;
    admin::network_change(&cluster.replicas[old_leader_id]);

    advance_and_settle(Duration::from_secs(11)).await;
    advance_and_settle(Duration::from_secs(3)).await;

    let new_leaders: Vec<_> = cluster
        .replicas
        .iter()
        .enumerate()
        .filter(|(id, r)| *id != old_leader_id && r.lock().role == Role::Leader)
        .collect();
    assert_eq!(new_leaders.len(), 1, "the remaining majority elects a successor");
    let new_term = new_leaders[0].1.lock().current_term;
    assert!(new_term > old_term);

    admin::network_change(&cluster.replicas[old_leader_id]);
    advance_and_settle(Duration::from_secs(3)).await;

    let st = cluster.replicas[old_leader_id].lock();
    assert_eq!(st.role, Role::Follower);
    assert_eq!(st.current_term, new_term);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn reset_during_leadership_forces_a_fresh_election() {
    let cluster = spawn_cluster(21130, 3).await;
    advance_and_settle(Duration::from_secs(11)).await;
    advance_and_settle(Duration::from_secs(2)).await;

    let leader_id = cluster.find_leader().expect("cold start produces a leader").id();
    let old_term = cluster.replicas[leader_id].lock().current_term;

    admin::reset(&cluster.replicas[leader_id]);
    assert_eq!(cluster.replicas[leader_id].lock().current_term, 0);
    assert_eq!(cluster.replicas[leader_id].lock().role, Role::Follower);

    advance_and_settle(Duration::from_secs(11)).await;
    advance_and_settle(Duration::from_secs(2)).await;

    let leaders = cluster.leaders();
    assert_eq!(leaders.len(), 1);
    assert!(leaders[0].lock().current_term > old_term);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn stale_candidate_does_not_win_votes_from_up_to_date_peers() {
    let cluster = spawn_cluster(21140, 5).await;
    advance_and_settle(Duration::from_secs(11)).await;
    advance_and_settle(Duration::from_secs(2)).await;

    let leader_id = cluster.find_leader().expect("cold start produces a leader").id();
    let term = cluster.replicas[leader_id].lock().current_term;

    // Disconnect one follower before the log grows, so it genuinely falls
    // behind: its inbound AppendEntries checks reject while it's down.
    let lagging_id = cluster
        .replicas
        .iter()
        .find(|r| r.id() != leader_id)
        .unwrap()
        .id();
    admin::network_change(&cluster.replicas[lagging_id]);

    admin::log_entry(&cluster.replicas[leader_id], LogEntryReq { value: 1 });
    advance_and_settle(Duration::from_secs(3)).await;
    admin::log_entry(&cluster.replicas[leader_id], LogEntryReq { value: 2 });
    advance_and_settle(Duration::from_secs(3)).await;

    assert!(
        cluster.replicas[lagging_id].lock().log.last_index() < 2,
        "the disconnected follower must not have received the replicated entries"
    );

    let up_to_date_id = cluster
        .replicas
        .iter()
        .find(|r| r.id() != leader_id && r.id() != lagging_id)
        .unwrap()
        .id();

    let resp = rpc::call(
        cluster.replicas[up_to_date_id].config.listen_addr,
        &Request::RequestVote(rpc::RequestVoteReq {
            term: term + 1,
            candidate_id: lagging_id,
            last_log_index: 0,
            last_log_term: 0,
        }),
    )
    .await
    .unwrap();

    match resp {
        Response::RequestVote(rep) => {
            assert!(!rep.vote_granted, "an up-to-date peer must not vote for a stale log")
        }
        other => panic!("unexpected response: {:?}", other),
    }
}
