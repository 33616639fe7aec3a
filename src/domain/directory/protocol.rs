use super::DirectoryMap;
use crate::domain::node::{ExecutionNode, KnowledgeBase};
use serde::{Deserialize, Serialize};

/// Operations a remote party may ask a directory node to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DirectoryCommand {
    /// See [`DirectoryService::register`](super::DirectoryService::register)
    Register {
        /// Logical id
        executor_id: String,
        /// Location id of the hosting node
        location_id: String,
    },
    /// See [`DirectoryService::unregister`](super::DirectoryService::unregister)
    Unregister {
        /// Logical id
        executor_id: String,
    },
    /// See [`DirectoryService::lookup`](super::DirectoryService::lookup)
    Lookup {
        /// Logical id
        executor_id: String,
    },
    /// See [`DirectoryService::lookup_id`](super::DirectoryService::lookup_id)
    LookupId {
        /// Logical id
        executor_id: String,
    },
    /// See [`DirectoryService::register_kbase`](super::DirectoryService::register_kbase)
    RegisterKBase {
        /// Knowledge base id
        kbase_id: String,
        /// Location id of the hosting node
        location_id: String,
    },
    /// See [`DirectoryService::unregister_kbase`](super::DirectoryService::unregister_kbase)
    UnregisterKBase {
        /// Knowledge base id
        kbase_id: String,
    },
    /// See [`DirectoryService::lookup_kbase`](super::DirectoryService::lookup_kbase)
    LookupKBase {
        /// Knowledge base id
        kbase_id: String,
    },
    /// See [`DirectoryService::executors_map`](super::DirectoryService::executors_map)
    ExecutorsMap,
    /// See [`DirectoryService::kbases_map`](super::DirectoryService::kbases_map)
    KBasesMap,
}

impl DirectoryCommand {
    /// Name of the operation, used in diagnostics
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Unregister { .. } => "unregister",
            Self::Lookup { .. } => "lookup",
            Self::LookupId { .. } => "lookup_id",
            Self::RegisterKBase { .. } => "register_kbase",
            Self::UnregisterKBase { .. } => "unregister_kbase",
            Self::LookupKBase { .. } => "lookup_kbase",
            Self::ExecutorsMap => "executors_map",
            Self::KBasesMap => "kbases_map",
        }
    }
}

/// Successful outcomes of a [`DirectoryCommand`]
///
/// Failures travel as error bodies instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DirectoryReply {
    /// The command has been carried out and has nothing to report
    Done,
    /// Node hosting the looked up executor
    Node(ExecutionNode),
    /// Location id of the looked up executor
    LocationId(Option<String>),
    /// Looked up knowledge base
    KnowledgeBase(Option<KnowledgeBase>),
    /// Snapshot of a directory map
    Map(DirectoryMap),
}
