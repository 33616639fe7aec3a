//! Drives a remote directory node from the command line

use crate::domain::directory::{DirectoryMap, DirectoryService, DistributedDirectory};
use crate::domain::node::{ConnectorFactory, ExecutionNode};
use crate::library::communication::events::{LogEventListener, SystemEventListener};
use crate::library::helpers::parse_seconds;
use crate::module::options::DirectoryNodeOptions;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tokio::time::timeout;

/// Options for the client module
#[derive(Debug, StructOpt)]
pub struct Options {
    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub directory: DirectoryNodeOptions,

    /// Seconds to wait for the directory node before giving up
    #[structopt(long, default_value = "10", parse(try_from_str = parse_seconds), value_name = "seconds")]
    pub timeout: Duration,

    #[allow(missing_docs)]
    #[structopt(subcommand)]
    pub command: ClientCommand,
}

/// Directory operations available from the command line
#[derive(Debug, StructOpt)]
pub enum ClientCommand {
    /// Maps an executor to an execution node
    Register {
        /// Logical id of the executor
        executor_id: String,
        /// Location id of the execution node
        location_id: String,
    },
    /// Removes the mapping of an executor
    Unregister {
        /// Logical id of the executor
        executor_id: String,
    },
    /// Prints the location id an executor is mapped to
    LookupId {
        /// Logical id of the executor
        executor_id: String,
    },
    /// Prints the name and address of the node hosting an executor
    Lookup {
        /// Logical id of the executor
        executor_id: String,
    },
    /// Maps a knowledge base to an execution node
    RegisterKbase {
        /// Logical id of the knowledge base
        kbase_id: String,
        /// Location id of the execution node
        location_id: String,
    },
    /// Fetches a knowledge base from its node and prints it
    LookupKbase {
        /// Logical id of the knowledge base
        kbase_id: String,
    },
    /// Prints all executor mappings
    Executors,
    /// Prints all knowledge base mappings
    Kbases,
}

fn print_map(map: DirectoryMap) {
    let mut entries: Vec<_> = map.into_iter().collect();
    entries.sort();

    for (id, location) in entries {
        println!("{}\t{}", id, location);
    }
}

async fn execute(directory: &dyn DirectoryService, command: ClientCommand) -> Result<()> {
    match command {
        ClientCommand::Register {
            executor_id,
            location_id,
        } => directory.register(&executor_id, &location_id).await?,
        ClientCommand::Unregister { executor_id } => directory.unregister(&executor_id).await?,
        ClientCommand::LookupId { executor_id } => match directory.lookup_id(&executor_id).await? {
            Some(location_id) => println!("{}", location_id),
            None => return Err(anyhow!("{} is not registered", executor_id)),
        },
        ClientCommand::Lookup { executor_id } => {
            let connector = directory.lookup(&executor_id).await?;
            println!("{}\t{}", connector.name(), connector.address());
        }
        ClientCommand::RegisterKbase {
            kbase_id,
            location_id,
        } => directory.register_kbase(&kbase_id, &location_id).await?,
        ClientCommand::LookupKbase { kbase_id } => match directory.lookup_kbase(&kbase_id).await? {
            Some(kbase) => println!("{}", serde_json::to_string_pretty(&kbase)?),
            None => return Err(anyhow!("knowledge base {} is not available", kbase_id)),
        },
        ClientCommand::Executors => print_map(directory.executors_map().await?),
        ClientCommand::Kbases => print_map(directory.kbases_map().await?),
    }

    Ok(())
}

/// Executes a single directory operation against the configured directory node
pub async fn run(options: Options) -> Result<()> {
    let listener: Arc<dyn SystemEventListener> = Arc::new(LogEventListener::with_context("client"));
    let factory = ConnectorFactory::new(listener);
    let node = ExecutionNode::new("directory", options.directory.address.as_str());

    let directory = DistributedDirectory::new(factory.connector_for(&node)?, factory);
    directory.init();

    let limit = options.timeout;
    let outcome = timeout(limit, execute(&directory, options.command))
        .await
        .map_err(|_| anyhow!("directory node did not answer within {:?}", limit))?;

    directory.dispose().await?;

    outcome
}
