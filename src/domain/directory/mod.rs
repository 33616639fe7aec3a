//! Resolution of logical ids to the execution nodes hosting them
//!
//! The directory keeps two maps: executors (sessions, executor ids) and knowledge bases, each
//! mapping a logical id to the location id of an [`ExecutionNode`](super::node::ExecutionNode).
//! Registrations are last-writer-wins and never expire, entries of a node that went away stay
//! around until somebody unregisters them.
//!
//! There are three interchangeable implementations of [`DirectoryService`]:
//!
//! - [`LocalDirectory`] is the authoritative in-memory store
//! - [`RemoteDirectory`] forwards every call to a directory node over a [`NodeConnector`]
//! - [`DistributedDirectory`] resolves its directory from a small capability registry which
//!   is populated with a [`RemoteDirectory`] on [`init`](DistributedDirectory::init)
//!
//! A directory node serves a [`LocalDirectory`] to remote parties through a [`DirectoryServer`].

use super::node::KnowledgeBase;
use crate::library::communication::node::{ConnectorError, NodeConnector};
use crate::library::communication::{DecodeError, RemoteError, RemoteErrorKind};
use crate::library::BoxedError;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

mod distributed;
mod local;
mod protocol;
mod remote;
mod server;

pub use distributed::DistributedDirectory;
pub use local::LocalDirectory;
pub use protocol::{DirectoryCommand, DirectoryReply};
pub use remote::{DirectoryClient, RemoteDirectory};
pub use server::DirectoryServer;

/// Failure of a directory operation
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The directory implementation does not offer this operation
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
    /// No mapping exists for the logical id
    #[error("no location registered for {0}")]
    UnknownId(String),
    /// The location id does not belong to any known execution node
    #[error("execution node {0} is not known")]
    UnknownNode(String),
    /// The distributed directory has not been initialized yet
    #[error("directory has not been initialized")]
    NotInitialized,
    /// Reaching the directory (or a node) failed
    #[error("connector failure")]
    Connector(#[from] ConnectorError),
    /// The remote directory answered with an error
    #[error(transparent)]
    Remote(RemoteError),
    /// Looking up a knowledge base at its node failed
    #[error("unable to look up knowledge base {id}")]
    LookupFailed {
        /// Id of the knowledge base
        id: String,
        /// Original cause
        #[source]
        source: BoxedError,
    },
    /// A payload could not be encoded
    #[error("unable to encode payload")]
    Encode(#[from] bincode::Error),
    /// A reply could not be decoded
    #[error("unable to decode reply")]
    Decode(#[from] DecodeError),
    /// The remote party answered with a reply that does not fit the operation
    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

impl DirectoryError {
    /// Whether the operation is a documented capability gap (locally or at the remote directory)
    pub fn is_unsupported(&self) -> bool {
        match self {
            Self::Unsupported(_) => true,
            Self::Remote(e) => e.kind() == RemoteErrorKind::Unsupported,
            Self::Connector(ConnectorError::Remote(e)) => e.kind() == RemoteErrorKind::Unsupported,
            _ => false,
        }
    }

    /// Whether the requested entry does not exist (locally or at the remote directory)
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::UnknownId(_) | Self::UnknownNode(_) => true,
            Self::Remote(e) => e.kind() == RemoteErrorKind::NotFound,
            Self::Connector(ConnectorError::Remote(e)) => e.kind() == RemoteErrorKind::NotFound,
            _ => false,
        }
    }

    /// Serializable form for sending the error to a remote party
    pub fn into_remote(self) -> RemoteError {
        match self {
            Self::Unsupported(operation) => RemoteError::unsupported(operation),
            Self::UnknownId(_) | Self::UnknownNode(_) => {
                RemoteError::message(RemoteErrorKind::NotFound, self.to_string())
            }
            Self::Remote(e) => e,
            other => RemoteError::new(other),
        }
    }
}

/// Mapping of logical ids to location ids
pub type DirectoryMap = HashMap<String, String>;

/// Logical id to node location resolution
///
/// Every operation may fail with a connector level failure in implementations that talk to a
/// remote directory.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Maps an executor id to the location id of a node, replacing any previous mapping
    async fn register(&self, executor_id: &str, location_id: &str) -> Result<(), DirectoryError>;

    /// Maps an executor id to the node the connector points at
    async fn register_connector(
        &self,
        executor_id: &str,
        connector: &NodeConnector,
    ) -> Result<(), DirectoryError>;

    /// Removes the mapping of an executor id, if any
    async fn unregister(&self, executor_id: &str) -> Result<(), DirectoryError>;

    /// Resolves an executor id into an unconnected connector for the hosting node
    async fn lookup(&self, executor_id: &str) -> Result<NodeConnector, DirectoryError>;

    /// Resolves an executor id into the location id of the hosting node
    async fn lookup_id(&self, executor_id: &str) -> Result<Option<String>, DirectoryError>;

    /// Maps a knowledge base id to the location id of a node
    async fn register_kbase(&self, kbase_id: &str, location_id: &str)
        -> Result<(), DirectoryError>;

    /// Stores a knowledge base object under its id
    async fn register_kbase_instance(
        &self,
        kbase_id: &str,
        kbase: KnowledgeBase,
    ) -> Result<(), DirectoryError>;

    /// Removes the mapping of a knowledge base id
    async fn unregister_kbase(&self, kbase_id: &str) -> Result<(), DirectoryError>;

    /// Fetches a knowledge base from the node it is registered at
    async fn lookup_kbase(&self, kbase_id: &str) -> Result<Option<KnowledgeBase>, DirectoryError>;

    /// Snapshot of all executor mappings
    async fn executors_map(&self) -> Result<DirectoryMap, DirectoryError>;

    /// Snapshot of all knowledge base mappings
    async fn kbases_map(&self) -> Result<DirectoryMap, DirectoryError>;

    /// Releases whatever the implementation holds on to
    async fn dispose(&self) -> Result<(), DirectoryError>;
}
