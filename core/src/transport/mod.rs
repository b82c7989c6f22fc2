//! Transport abstraction: the capability set every backend exposes and the
//! registry the client resolves backends from.
//!
//! # Design
//! A backend implements `AjaxImpl` and hands back an `Exchange`, one object
//! that can be aborted and later queried for the outcome. Completion is a
//! one-shot callback invoked from the backend's worker thread with the
//! exchange as its argument; every backend guarantees it fires exactly once
//! per issued request, including after an abort.
//!
//! Three backends ship with the crate:
//! - `XhrIo`: event-style single request object.
//! - `RawRequest`: ready-state machine driven by a change listener.
//! - `XhrManager`: pooled, prioritized, id-deduplicated requests with retry.

mod manager;
mod raw;
mod wire;
mod xhr;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::http::{HttpRequest, ResponseBody};

pub use manager::{ManagedRequest, ManagerConfig, XhrManager};
pub use raw::{RawRequest, ReadyState};
pub use xhr::{ErrorCode, XhrIo};

/// Registry name of the `XhrIo` backend.
pub const XHRIO: &str = "xhrio";
/// Registry name of the `RawRequest` backend.
pub const XMLHTTPREQUEST: &str = "xmlhttprequest";

/// An exchange that can be cancelled.
pub trait AjaxRequest: Send + Sync {
    /// Cancel the exchange. A no-op once it has completed.
    fn abort(&self);
}

/// The observable outcome of an exchange.
///
/// `status` is -1 when no HTTP exchange took place (aborted or timed out);
/// `was_aborted` tells the two apart.
pub trait AjaxResponse: Send + Sync {
    fn status(&self) -> Result<i32, Error>;
    fn status_text(&self) -> String;
    fn body(&self) -> ResponseBody;
    fn response_header(&self, name: &str) -> Option<String>;
    fn was_aborted(&self) -> bool;
}

/// The handle returned for an issued request.
pub trait Exchange: AjaxRequest + AjaxResponse {}

impl<T: AjaxRequest + AjaxResponse + ?Sized> Exchange for T {}

/// Invoked once when the exchange finishes, successfully or not.
pub type Completion = Box<dyn FnOnce(&dyn AjaxResponse) + Send + 'static>;

/// Per-request transport options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Milliseconds before the exchange is abandoned; 0 disables the timeout.
    pub timeout_ms: u64,
    pub with_credentials: bool,
    /// Managed backend only: deduplication key. Generated when absent.
    pub id: Option<String>,
    /// Managed backend only: lower values are dispatched first.
    pub priority: Option<u32>,
    /// Managed backend only: total attempts allowed.
    pub max_retries: Option<u32>,
}

/// A transport backend.
pub trait AjaxImpl: Send + Sync {
    /// Start an exchange. `on_complete` fires exactly once, from another
    /// thread, after the returned handle exists.
    fn issue_request(
        &self,
        request: HttpRequest,
        on_complete: Completion,
        options: &RequestOptions,
    ) -> Result<Arc<dyn Exchange>, Error>;
}

/// Cancel an in-flight exchange.
pub fn abort(handle: &dyn AjaxRequest) {
    handle.abort();
}

/// Which backend a request goes through.
#[derive(Clone, Default)]
pub enum Api {
    /// The backend named by the client configuration.
    #[default]
    Default,
    /// A backend registered under this name.
    Named(String),
    /// A caller-supplied backend instance.
    Instance(Arc<dyn AjaxImpl>),
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Api::Default => write!(f, "Default"),
            Api::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Api::Instance(_) => write!(f, "Instance(..)"),
        }
    }
}

type Factory = Arc<dyn Fn() -> Arc<dyn AjaxImpl> + Send + Sync>;

/// Backends by name. The default registry knows `xhrio` and
/// `xmlhttprequest`, each producing a fresh request object per lookup.
#[derive(Clone)]
pub struct TransportRegistry {
    factories: HashMap<String, Factory>,
}

impl TransportRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory called once per request.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn AjaxImpl> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Register a shared instance, e.g. an `XhrManager`.
    pub fn register_instance(&mut self, name: &str, transport: Arc<dyn AjaxImpl>) {
        self.register(name, move || transport.clone());
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn AjaxImpl>, Error> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::MissingCapability(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(XHRIO, || Arc::new(XhrIo::new()));
        registry.register(XMLHTTPREQUEST, || Arc::new(RawRequest::new()));
        registry
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_both_builtins() {
        let registry = TransportRegistry::default();
        assert_eq!(registry.names(), vec![XHRIO, XMLHTTPREQUEST]);
        assert!(registry.resolve(XHRIO).is_ok());
        assert!(registry.resolve(XMLHTTPREQUEST).is_ok());
    }

    #[test]
    fn unknown_backend_is_missing_capability() {
        let err = TransportRegistry::empty().resolve(XHRIO).err().unwrap();
        assert!(matches!(err, Error::MissingCapability(name) if name == XHRIO));
    }

    #[test]
    fn registered_instance_is_shared() {
        let manager: Arc<dyn AjaxImpl> = Arc::new(XhrManager::new(ManagerConfig::default()));
        let mut registry = TransportRegistry::empty();
        registry.register_instance("pool", manager.clone());
        let a = registry.resolve("pool").unwrap();
        let b = registry.resolve("pool").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
