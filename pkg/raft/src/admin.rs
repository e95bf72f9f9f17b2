//! Administrative RPC handlers issued by the controller.

use std::sync::Arc;

use tracing::info;

use crate::entry::Entry;
use crate::rpc::{LogEntryReq, Response};
use crate::state::{Replica, Role, Signal};

/// Reinitializes `replica` to its startup state. A reset in flight does not
/// wait for outstanding replication workers; they observe the new state on
/// their next locked section.
pub fn reset(replica: &Arc<Replica>) -> Response {
    replica.reset();
    Response::Ack
}

/// Toggles `connected`. Timers keep running regardless: a disconnected
/// follower still times out into Candidate, it just can't collect votes.
pub fn network_change(replica: &Arc<Replica>) -> Response {
    let now_connected = {
        let mut st = replica.lock();
        st.connected = !st.connected;
        st.connected
    };
    info!(replica = replica.id(), connected = now_connected, "network connectivity toggled");
    replica.publish_snapshot();
    Response::Ack
}

/// Appends `value` to the log if this replica is currently Leader, then
/// raises the propagate signal so the next replication round goes out
/// immediately rather than waiting for the short timer.
pub fn log_entry(replica: &Arc<Replica>, req: LogEntryReq) -> Response {
    let appended = {
        let mut st = replica.lock();
        if st.role != Role::Leader {
            false
        } else {
            let term = st.current_term;
            st.log.append(Entry {
                term,
                value: req.value,
            });
            let last = st.log.last_index();
            st.next_index[replica.id()] = st.log.len();
            st.match_index[replica.id()] = last;
            true
        }
    };
    if appended {
        info!(replica = replica.id(), value = req.value, "value submitted to leader");
        replica.signal(Signal::PropagateNow);
        replica.publish_snapshot();
    }
    Response::Ack
}
