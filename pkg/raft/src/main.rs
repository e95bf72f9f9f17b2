//! Replica process entry point. The thing the controller spawns:
//! parses its `Config` from the command line, builds the shared state,
//! starts the RPC listener, the role-driver, and the monitor pusher, then
//! blocks forever.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use raft::rpc::{self, Handler};
use raft::{dispatch, Config, Replica};

/// A single node of a Raft replica cluster.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// This replica's index into `--peer`, in `[0, N)`.
    #[arg(long)]
    id: usize,

    /// Address of one cluster member, given once per member in id order.
    /// Must appear exactly 3 or 5 times.
    #[arg(long = "peer", required = true, num_args = 1)]
    peers: Vec<SocketAddr>,

    /// Address of the controller's ReportState listener.
    #[arg(long)]
    monitor: SocketAddr,
}

#[tokio::main]
async fn main() -> raft::errors::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::new(args.id, args.peers, args.monitor)?;
    let listen_addr = config.listen_addr;
    let monitor_addr = config.monitor_addr;

    info!(
        replica = config.id,
        listen = %listen_addr,
        label = %Config::label(config.id),
        "starting replica"
    );

    let (replica, monitor_rx) = Replica::new(config);

    let handler: Handler = {
        let replica = replica.clone();
        Arc::new(move |req| {
            let replica = replica.clone();
            Box::pin(async move { dispatch(replica, req).await })
        })
    };

    let server = tokio::spawn(rpc::serve(listen_addr, handler));
    let driver = tokio::spawn(raft::driver::run(replica.clone()));
    let monitor = tokio::spawn(raft::monitor::run(monitor_addr, monitor_rx));

    tokio::select! {
        res = server => { res.expect("rpc server task panicked")?; }
        res = driver => { res.expect("driver task panicked"); }
        res = monitor => { res.expect("monitor task panicked"); }
    }

    Ok(())
}
