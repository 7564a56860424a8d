//! Route table, groups and middleware.
//!
//! Routes are registered before the accept loop starts and the table is
//! shared immutably afterwards. Middlewares are applied at registration
//! time, so the table stores fully composed handlers and matching is the
//! only per-request work.

use crate::{
    http::{request::Request, response::Writer},
    router::pattern::{leading_literals, match_params, wildcard_matches, Pattern},
};
use std::{future::Future, pin::Pin, sync::Arc};

/// Boxed future returned by handlers.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A request handler.
///
/// Plain functions of the right shape implement this automatically:
///
/// ```
/// use lattice_web::{HandlerFuture, Request, Writer};
///
/// fn hello<'a>(_req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
///     Box::pin(async move {
///         let _ = w.write(b"hello").await;
///     })
/// }
/// ```
pub trait Handler: Send + Sync {
    fn handle<'a>(&'a self, req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Writer) -> HandlerFuture<'a> + Send + Sync,
{
    fn handle<'a>(&'a self, req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
        self(req, w)
    }
}

/// A handler stored in the route table.
pub type DynHandler = Arc<dyn Handler>;

/// A middleware transforms a handler into a handler. Applied once, at
/// registration.
pub type Middleware = Arc<dyn Fn(DynHandler) -> DynHandler + Send + Sync>;

struct Route {
    raw: String,
    pattern: Pattern,
    handler: DynHandler,
}

/// Documentation metadata recorded per route for an external
/// documentation UI. Never consulted while serving.
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub description: String,
    pub parameters: Vec<ParamInfo>,
}

/// Describes one path parameter of a documented route.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub ty: String,
    pub description: String,
}

impl RouteInfo {
    pub fn set_description(&mut self, description: &str) -> &mut Self {
        self.description = description.to_string();
        self
    }

    pub fn set_param(&mut self, name: &str, ty: &str, description: &str) -> &mut Self {
        for param in &mut self.parameters {
            if param.name == name {
                param.ty = ty.to_string();
                param.description = description.to_string();
            }
        }
        self
    }
}

/// Registers routes and finds the handler for a request path.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    middlewares: Vec<Middleware>,
    docs: Vec<RouteInfo>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `path`, documented as `GET`. Registering
    /// the same pattern twice warns and is a no-op (`None`).
    pub fn route(&mut self, path: &str, handler: impl Handler + 'static) -> Option<&mut RouteInfo> {
        self.register(path, Arc::new(handler), None, &[])
    }

    /// Like [`route`](Router::route), with an explicit method for the
    /// documentation entry.
    pub fn route_method(
        &mut self,
        path: &str,
        handler: impl Handler + 'static,
        method: &str,
    ) -> Option<&mut RouteInfo> {
        self.register(path, Arc::new(handler), Some(method), &[])
    }

    /// Appends a middleware applied to every subsequently registered
    /// route; the last added wraps outermost.
    pub fn use_middleware(
        &mut self,
        middleware: impl Fn(DynHandler) -> DynHandler + Send + Sync + 'static,
    ) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Registers a set of routes under a shared prefix.
    pub fn group(&mut self, prefix: &str, register: impl FnOnce(&mut Group)) {
        let mut group = Group {
            router: self,
            prefix: prefix.to_string(),
            middlewares: Vec::new(),
        };
        register(&mut group);
    }

    /// Read-only view of the recorded route metadata.
    pub fn docs(&self) -> &[RouteInfo] {
        &self.docs
    }

    fn register(
        &mut self,
        path: &str,
        handler: DynHandler,
        method: Option<&str>,
        group_middlewares: &[Middleware],
    ) -> Option<&mut RouteInfo> {
        if self.routes.iter().any(|route| route.raw == path) {
            log::warn!("route {path:?} is already registered");
            return None;
        }

        // group middlewares wrap first, then router middlewares
        let mut handler = handler;
        for middleware in group_middlewares.iter().chain(&self.middlewares) {
            handler = (**middleware)(handler);
        }

        let pattern = Pattern::parse(path);
        let parameters = pattern
            .param_names()
            .into_iter()
            .map(|name| ParamInfo {
                name: name.to_string(),
                ty: String::new(),
                description: String::new(),
            })
            .collect();

        self.routes.push(Route {
            raw: path.to_string(),
            pattern,
            handler,
        });
        self.docs.push(RouteInfo {
            method: method.unwrap_or("GET").to_string(),
            path: path.to_string(),
            description: String::new(),
            parameters,
        });
        self.docs.last_mut()
    }

    /// Finds the handler for a request path.
    ///
    /// Precedence: exact match, then wildcard suffix, then parameterized
    /// patterns (most leading literal segments first, registration order
    /// on ties). Captures are returned only for the winning pattern.
    pub(crate) fn find(&self, path: &str) -> Option<(DynHandler, Vec<(String, String)>)> {
        for route in &self.routes {
            if let Pattern::Exact(exact) = &route.pattern {
                if exact == path {
                    return Some((route.handler.clone(), Vec::new()));
                }
            }
        }

        for route in &self.routes {
            if let Pattern::WildcardSuffix(prefix) = &route.pattern {
                if wildcard_matches(prefix, path) {
                    return Some((route.handler.clone(), Vec::new()));
                }
            }
        }

        let mut best: Option<(usize, usize, Vec<(String, String)>)> = None;
        for (index, route) in self.routes.iter().enumerate() {
            let Pattern::Params(segments) = &route.pattern else {
                continue;
            };
            let Some(captures) = match_params(segments, path) else {
                continue;
            };
            let literals = leading_literals(segments);
            if best.as_ref().is_none_or(|(b, ..)| literals > *b) {
                best = Some((literals, index, captures));
            }
        }

        best.map(|(_, index, captures)| (self.routes[index].handler.clone(), captures))
    }
}

/// Routes registered under a shared prefix, with their own middleware
/// chain applied before the router's.
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    middlewares: Vec<Middleware>,
}

impl Group<'_> {
    pub fn route(&mut self, path: &str, handler: impl Handler + 'static) -> Option<&mut RouteInfo> {
        let full = format!("{}{}", self.prefix, path);
        self.router
            .register(&full, Arc::new(handler), None, &self.middlewares)
    }

    pub fn route_method(
        &mut self,
        path: &str,
        handler: impl Handler + 'static,
        method: &str,
    ) -> Option<&mut RouteInfo> {
        let full = format!("{}{}", self.prefix, path);
        self.router
            .register(&full, Arc::new(handler), Some(method), &self.middlewares)
    }

    pub fn use_middleware(
        &mut self,
        middleware: impl Fn(DynHandler) -> DynHandler + Send + Sync + 'static,
    ) {
        self.middlewares.push(Arc::new(middleware));
    }
}
