//! Execution nodes, the commands they answer and the factory for connectors to them

use crate::library::communication::events::SystemEventListener;
use crate::library::communication::node::{ConnectorError, NodeConnector};
use serde::{Deserialize, Serialize};
use std::num::ParseIntError;
use std::sync::Arc;
use thiserror::Error;

/// Transport prefix of connector strings describing a TCP connection
pub const TCP_CONNECTOR_PREFIX: &str = "Tcp";

/// Transport prefix of connector strings describing an in-process node
pub const LOCAL_CONNECTOR_PREFIX: &str = "Local";

/// Execution node reachable over the network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionNode {
    /// Location id the directory maps logical ids to
    pub id: String,
    /// `host:port` the node accepts connections on
    pub address: String,
}

impl ExecutionNode {
    /// Creates a new descriptor
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

/// Knowledge base hosted by an execution node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Logical id of the knowledge base
    pub id: String,
    /// Location id of the hosting node
    pub node_id: String,
    /// Names of the rule packages the knowledge base consists of
    pub packages: Vec<String>,
}

/// Commands understood by execution nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeCommand {
    /// Asks for the knowledge base with the given id
    LookupKnowledgeBase {
        /// Logical id of the knowledge base
        kbase_id: String,
    },
}

/// Replies of execution nodes to a [`NodeCommand`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeReply {
    /// The requested knowledge base
    KnowledgeBase(KnowledgeBase),
    /// The node does not host the requested object
    Missing,
}

/// Failure to turn a connector string into a connector
#[derive(Error, Debug)]
pub enum ConnectorStringError {
    /// The string does not follow the `<transport>:<name>:<host>:<port>` layout
    #[error("malformed connector string {0:?}")]
    Malformed(String),
    /// The transport prefix is not known
    #[error("unknown connector transport {0:?}")]
    UnknownTransport(String),
    /// The port is not a number
    #[error("invalid port in connector string {0:?}")]
    InvalidPort(String, #[source] ParseIntError),
    /// The connector could not be created
    #[error("unable to create connector")]
    Connector(#[from] ConnectorError),
}

/// Creates unconnected [`NodeConnectors`](NodeConnector) for execution nodes
#[derive(Clone)]
pub struct ConnectorFactory {
    listener: Arc<dyn SystemEventListener>,
}

impl ConnectorFactory {
    /// Creates a factory whose connectors report to `listener`
    pub fn new(listener: Arc<dyn SystemEventListener>) -> Self {
        Self { listener }
    }

    /// Listener handed to every connector
    pub fn listener(&self) -> &Arc<dyn SystemEventListener> {
        &self.listener
    }

    /// Connector named after the node, pointing at its address
    pub fn connector_for(&self, node: &ExecutionNode) -> Result<NodeConnector, ConnectorError> {
        NodeConnector::new(node.id.as_str(), node.address.as_str(), self.listener.clone())
    }

    /// Parses a connector string like `Tcp:node-A:10.0.0.1:8000`
    ///
    /// Empty strings and the `Local` transport describe nodes without a network connector,
    /// for those `None` is returned.
    pub fn from_connector_string(
        &self,
        connector_string: &str,
    ) -> Result<Option<NodeConnector>, ConnectorStringError> {
        let trimmed = connector_string.trim();

        if trimmed.is_empty() {
            return Ok(None);
        }

        let parts: Vec<&str> = trimmed.splitn(4, ':').collect();

        match parts.as_slice() {
            [transport, ..] if *transport == LOCAL_CONNECTOR_PREFIX => Ok(None),
            [transport, name, host, port] if *transport == TCP_CONNECTOR_PREFIX => {
                if name.is_empty() || host.is_empty() {
                    return Err(ConnectorStringError::Malformed(connector_string.to_owned()));
                }

                let port: u16 = port
                    .parse()
                    .map_err(|e| ConnectorStringError::InvalidPort(connector_string.to_owned(), e))?;
                let node = ExecutionNode::new(*name, format!("{}:{}", host, port));

                Ok(Some(self.connector_for(&node)?))
            }
            [transport, ..] if *transport != TCP_CONNECTOR_PREFIX => Err(
                ConnectorStringError::UnknownTransport((*transport).to_owned()),
            ),
            _ => Err(ConnectorStringError::Malformed(connector_string.to_owned())),
        }
    }
}
