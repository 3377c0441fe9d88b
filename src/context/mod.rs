//! What a middleware layer sees of a request.
//!
//! Middleware use the [`Extensions`] map to hand request-scoped services to
//! handlers (the conditional-caching orchestrator is provided this way), and
//! [`ConnectionInfo`] is how the caching layer learns the client's address.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    net::IpAddr,
};

use crate::Request;

/// Request-scoped values keyed by type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value`, replacing any earlier value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// Supplies the remote address of the client behind a request.
///
/// Only the IP is exposed; validators bound to a client must survive the
/// client reconnecting from a new source port.
pub trait ConnectionInfo {
    fn remote_address(&self) -> Option<IpAddr>;
}

impl ConnectionInfo for Request {
    fn remote_address(&self) -> Option<IpAddr> {
        self.remote_addr().map(|addr| addr.ip())
    }
}

/// Per-request context handed through the middleware chain.
#[derive(Debug)]
pub struct Context {
    request: Request,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

impl ConnectionInfo for Context {
    fn remote_address(&self) -> Option<IpAddr> {
        self.request.remote_address()
    }
}
