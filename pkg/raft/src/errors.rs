//! Error taxonomy for the replica process.
//!
//! Mirrors the source's `error_chain!`-based convention: a single chained
//! error type threaded through the RPC transport and handlers via `?`,
//! rather than ad-hoc `String`s or panics.

use error_chain::error_chain;

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Encode(::rmp_serde::encode::Error);
        Decode(::rmp_serde::decode::Error);
    }

    errors {
        /// Returned by a disconnected replica for any inbound peer RPC.
        /// The caller treats this as transient and retries on the next round.
        PeerUnavailable(id: usize) {
            description("peer is unavailable")
            display("peer {} is unavailable", id)
        }

        /// Network-level send/decode failure on an outbound RPC distinct from
        /// a clean `PeerUnavailable` rejection.
        TransportFailure(detail: String) {
            description("transport failure")
            display("transport failure: {}", detail)
        }

        /// Cluster size outside {3,5}; fatal at startup.
        InvalidArgument(detail: String) {
            description("invalid argument")
            display("invalid argument: {}", detail)
        }

        /// The peer closed or reset the connection mid-RPC.
        ConnectionClosed {
            description("connection closed before a full message was read")
        }
    }
}
