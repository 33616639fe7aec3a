use super::{DirectoryError, DirectoryMap, DirectoryService, RemoteDirectory};
use crate::domain::node::{ConnectorFactory, KnowledgeBase};
use crate::library::communication::node::NodeConnector;
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Capability used to reach the directory of a [`DistributedDirectory`]
pub type DirectoryCapability = Arc<dyn DirectoryService>;

/// Directory resolved from a capability registry, backed by a remote directory node
///
/// Nothing is reachable before [`init`](Self::init) has installed the [`RemoteDirectory`].
pub struct DistributedDirectory {
    services: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    pending: Mutex<Option<(NodeConnector, ConnectorFactory)>>,
}

impl DistributedDirectory {
    /// Creates an uninitialized directory for the directory node `connector` points at
    pub fn new(connector: NodeConnector, factory: ConnectorFactory) -> Self {
        Self {
            services: RwLock::default(),
            pending: Mutex::new(Some((connector, factory))),
        }
    }

    /// Installs the remote directory, later calls have no effect
    pub fn init(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some((connector, factory)) = pending {
            let directory: DirectoryCapability = Arc::new(RemoteDirectory::new(connector, factory));
            self.install(directory);
        }
    }

    /// Registers a capability, replacing one of the same type
    pub fn install<T: Any + Send + Sync>(&self, service: T) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), Box::new(service));
    }

    /// Fetches a copy of the capability of the given type
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .and_then(|service| service.downcast_ref::<T>())
            .cloned()
    }

    /// The installed directory
    pub fn directory(&self) -> Result<DirectoryCapability, DirectoryError> {
        self.get::<DirectoryCapability>()
            .ok_or(DirectoryError::NotInitialized)
    }
}

#[async_trait]
impl DirectoryService for DistributedDirectory {
    async fn register(&self, executor_id: &str, location_id: &str) -> Result<(), DirectoryError> {
        self.directory()?.register(executor_id, location_id).await
    }

    async fn register_connector(
        &self,
        executor_id: &str,
        connector: &NodeConnector,
    ) -> Result<(), DirectoryError> {
        self.directory()?
            .register_connector(executor_id, connector)
            .await
    }

    async fn unregister(&self, executor_id: &str) -> Result<(), DirectoryError> {
        self.directory()?.unregister(executor_id).await
    }

    async fn lookup(&self, executor_id: &str) -> Result<NodeConnector, DirectoryError> {
        self.directory()?.lookup(executor_id).await
    }

    async fn lookup_id(&self, executor_id: &str) -> Result<Option<String>, DirectoryError> {
        self.directory()?.lookup_id(executor_id).await
    }

    async fn register_kbase(
        &self,
        kbase_id: &str,
        location_id: &str,
    ) -> Result<(), DirectoryError> {
        self.directory()?.register_kbase(kbase_id, location_id).await
    }

    async fn register_kbase_instance(
        &self,
        kbase_id: &str,
        kbase: KnowledgeBase,
    ) -> Result<(), DirectoryError> {
        self.directory()?
            .register_kbase_instance(kbase_id, kbase)
            .await
    }

    async fn unregister_kbase(&self, kbase_id: &str) -> Result<(), DirectoryError> {
        self.directory()?.unregister_kbase(kbase_id).await
    }

    async fn lookup_kbase(&self, kbase_id: &str) -> Result<Option<KnowledgeBase>, DirectoryError> {
        self.directory()?.lookup_kbase(kbase_id).await
    }

    async fn executors_map(&self) -> Result<DirectoryMap, DirectoryError> {
        self.directory()?.executors_map().await
    }

    async fn kbases_map(&self) -> Result<DirectoryMap, DirectoryError> {
        self.directory()?.kbases_map().await
    }

    async fn dispose(&self) -> Result<(), DirectoryError> {
        self.directory()?.dispose().await
    }
}
