//! # Descriptor Store
//!
//! A process-scoped cache of resolved service schemas. Remotely resolved entries are
//! keyed by `(endpoint authority, fully-qualified service name)`; locally registered
//! descriptor pools are unkeyed and looked up by service name alone.
//!
//! Entries are immutable once resolved and are never invalidated: schemas are assumed
//! static for the life of the connected service. The store is read-mostly; reads take a
//! shared lock, and population inserts under a short exclusive lock after the network
//! round trip has already completed.
//!
//! Concurrent first-time resolutions of the same uncached key proceed independently;
//! the first insert wins and later ones are discarded, which is observable only as
//! extra reflection traffic, never as a different descriptor.
use crate::BoxError;
use crate::reflection::client::{ReflectionClient, ResolveError};
use http_body::Body as HttpBody;
use prost_reflect::{DescriptorPool, ServiceDescriptor};
use std::collections::HashMap;
use std::sync::RwLock;
use tonic::client::GrpcService;

/// Cache key for remotely resolved schemas.
type StoreKey = (String, String);

/// A process-scoped descriptor cache, passed explicitly to the resolver, the endpoint
/// mounter and the generic client. Never a global.
#[derive(Debug, Default)]
pub struct DescriptorStore {
    remote: RwLock<HashMap<StoreKey, ServiceDescriptor>>,
    local: RwLock<Vec<DescriptorPool>>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a locally compiled descriptor pool, e.g. one decoded from a
    /// `FileDescriptorSet` embedded at build time.
    pub fn register_local_pool(&self, pool: DescriptorPool) {
        self.local
            .write()
            .expect("descriptor store lock poisoned")
            .push(pool);
    }

    /// Decodes an encoded `FileDescriptorSet` and registers it as a local pool.
    pub fn register_local_encoded(&self, bytes: &[u8]) -> Result<(), ResolveError> {
        let pool = DescriptorPool::decode(bytes)?;
        self.register_local_pool(pool);
        Ok(())
    }

    /// Looks a service up among the locally registered pools.
    pub fn local_service(&self, service_name: &str) -> Option<ServiceDescriptor> {
        self.local
            .read()
            .expect("descriptor store lock poisoned")
            .iter()
            .find_map(|pool| pool.get_service_by_name(service_name))
    }

    /// Returns the cached descriptor for a remotely resolved service, if present.
    pub fn get(&self, authority: &str, service_name: &str) -> Option<ServiceDescriptor> {
        self.remote
            .read()
            .expect("descriptor store lock poisoned")
            .get(&(authority.to_string(), service_name.to_string()))
            .cloned()
    }

    /// Resolves a service through the given reflection client, populating the cache.
    ///
    /// Idempotent: a second call for the same `(authority, service_name)` pair is a
    /// cache hit and performs no network exchange.
    pub async fn resolve<S>(
        &self,
        authority: &str,
        service_name: &str,
        reflection: &mut ReflectionClient<S>,
    ) -> Result<ServiceDescriptor, ResolveError>
    where
        S: GrpcService<tonic::body::Body>,
        S::Error: Into<BoxError>,
        S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
        <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    {
        if let Some(descriptor) = self.get(authority, service_name) {
            tracing::debug!(authority, service_name, "descriptor cache hit");
            return Ok(descriptor);
        }

        tracing::debug!(authority, service_name, "resolving service via reflection");
        let fd_set = reflection.file_descriptor_set_by_symbol(service_name).await?;
        let pool = DescriptorPool::from_file_descriptor_set(fd_set)?;
        let descriptor = pool
            .get_service_by_name(service_name)
            .ok_or_else(|| ResolveError::ServiceNotFound(service_name.to_string()))?;

        let mut remote = self.remote.write().expect("descriptor store lock poisoned");
        let entry = remote
            .entry((authority.to_string(), service_name.to_string()))
            .or_insert(descriptor);
        Ok(entry.clone())
    }
}
