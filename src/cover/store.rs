//! Registry of live instrumented instances.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{info, warn};

/// Service name to the addresses registered under it, in arrival order.
pub type ServiceMap = BTreeMap<String, Vec<String>>;

/// Error mutating the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("service already registered")]
    AlreadyRegistered,

    #[error("no service found: {0}")]
    NotFound(String),
}

/// An instance announcing itself to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnderTest {
    pub name: String,
    pub address: String,
}

/// Storage behind the registry server.
///
/// Readers get copies; nothing returned aliases internal state.
pub trait Store: Send + Sync {
    /// Register `service`, keeping every address already known for its name.
    fn add(&self, service: &ServiceUnderTest) -> Result<(), StoreError>;

    /// Addresses registered under `name`.
    fn get(&self, name: &str) -> Vec<String>;

    /// Every registered service.
    fn get_all(&self) -> ServiceMap;

    /// Discard all registrations.
    fn init(&self);

    /// Replace all registrations.
    fn set(&self, services: ServiceMap);

    /// Deregister `address` from every name, dropping names left empty.
    fn remove(&self, address: &str) -> Result<(), StoreError>;
}

/// [`Store`] held in memory behind one reader/writer lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    services: RwLock<ServiceMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, ServiceMap> {
        self.services.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ServiceMap> {
        self.services.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn add(&self, service: &ServiceUnderTest) -> Result<(), StoreError> {
        let mut services = self.write();
        let addrs = services.entry(service.name.clone()).or_default();
        if addrs.contains(&service.address) {
            warn!(
                "service registered already, name: {}, address: {}",
                service.name, service.address
            );
            return Err(StoreError::AlreadyRegistered);
        }
        addrs.push(service.address.clone());
        info!("registered service {} at {}", service.name, service.address);
        Ok(())
    }

    fn get(&self, name: &str) -> Vec<String> {
        self.read().get(name).cloned().unwrap_or_default()
    }

    fn get_all(&self) -> ServiceMap {
        self.read().clone()
    }

    fn init(&self) {
        self.write().clear();
    }

    fn set(&self, services: ServiceMap) {
        *self.write() = services;
    }

    fn remove(&self, address: &str) -> Result<(), StoreError> {
        let mut services = self.write();
        let mut found = false;
        services.retain(|_, addrs| {
            let before = addrs.len();
            addrs.retain(|a| a != address);
            found |= addrs.len() != before;
            !addrs.is_empty()
        });

        if !found {
            return Err(StoreError::NotFound(address.to_string()));
        }
        info!("removed service at {}", address);
        Ok(())
    }
}
