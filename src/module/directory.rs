//! Hosts the authoritative directory and serves it to remote parties

use crate::domain::directory::{DirectoryServer, LocalDirectory};
use crate::domain::node::{ConnectorFactory, ExecutionNode};
use crate::library::communication::events::{LogEventListener, SystemEventListener};
use crate::library::communication::transport::{Acceptor, SessionOptions};
use crate::library::helpers::{parse_seconds, split_into_two};
use anyhow::{anyhow, Result};
use log::info;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tokio::signal::ctrl_c;
use tokio::signal::unix::{signal, SignalKind};

/// Options for the directory module
#[derive(Debug, StructOpt)]
pub struct Options {
    /// Address to accept connections on
    #[structopt(
        long,
        env = "EXECGRID_LISTEN",
        default_value = "0.0.0.0:47100",
        value_name = "host:port"
    )]
    pub listen: String,

    /// Execution node known to the directory, may be repeated
    #[structopt(long = "node", value_name = "id=host:port")]
    pub nodes: Vec<String>,

    /// Seconds without traffic after which a session is reported as idle
    #[structopt(long, env, default_value = "10", parse(try_from_str = parse_seconds), value_name = "seconds")]
    pub idle_timeout: Duration,
}

fn parse_node(input: &str) -> Result<ExecutionNode> {
    let (id, address) = split_into_two(input, "=")
        .ok_or_else(|| anyhow!("expected <id>=<host>:<port>, got {:?}", input))?;

    Ok(ExecutionNode::new(id, address))
}

async fn termination_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = ctrl_c() => result?,
        _ = terminate.recv() => {},
    }

    Ok(())
}

/// Runs a directory node until the process is asked to terminate
pub async fn run(options: Options) -> Result<()> {
    let listener: Arc<dyn SystemEventListener> = Arc::new(LogEventListener::with_context("directory"));
    let directory = Arc::new(LocalDirectory::new(ConnectorFactory::new(listener.clone())));

    for node in &options.nodes {
        directory.add_node(parse_node(node)?).await;
    }

    let session_options = SessionOptions {
        idle_timeout: Some(options.idle_timeout),
        ..SessionOptions::accepting()
    };

    let acceptor = Acceptor::bind(
        &options.listen,
        Arc::new(DirectoryServer::new(directory)),
        listener,
        session_options,
    )
    .await?;

    info!("Directory node listening on {}", acceptor.local_addr());

    termination_signal().await?;

    info!(
        "Shutting down, closing {} open sessions",
        acceptor.current_sessions()
    );
    acceptor.stop().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_node_descriptors() {
        assert_eq!(
            parse_node("node-A=10.0.0.1:8000").unwrap(),
            ExecutionNode::new("node-A", "10.0.0.1:8000")
        );
        assert!(parse_node("node-A").is_err());
    }
}
