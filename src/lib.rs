//! lattice_web - HTTP/1.1 server framework with its own wire path
//!
//! A small framework that does not delegate to an HTTP stack: it parses
//! request lines, headers and bodies (fixed-length and chunked) itself,
//! routes with path parameters and wildcard suffixes, writes raw
//! responses, and speaks RFC 6455 WebSocket after its own upgrade
//! handshake. Connections are TCP (or any established byte stream, TLS
//! included) and each one serves exactly one request before closing.
//!
//! # Features
//!
//! - **Own HTTP/1.1 parser** - slab reads, strict CRLF, hard caps on
//!   header and body bytes, wall-clock budgets on every read.
//! - **Routing** - exact paths, `:name` parameters and `/*` suffixes,
//!   with groups and registration-time middleware composition.
//! - **Explicit response states** - buffered by default, streaming after
//!   `flush_headers()`, automatic `content-length` for buffered bodies.
//! - **WebSocket** - handshake validation, masked-frame decoding,
//!   ping/pong handling, per-operation deadlines.
//!
//! # Quick Start
//!
//! ```no_run
//! use lattice_web::{HandlerFuture, Request, Router, Server, Writer};
//! use tokio::net::TcpListener;
//!
//! fn hello<'a>(_req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
//!     Box::pin(async move {
//!         let _ = w.write(b"Hello World!").await;
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::new();
//!     router.route("/", hello);
//!
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .router(router)
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
//!
//! Handlers are plain functions (or anything implementing [`Handler`])
//! receiving the parsed [`Request`] and a [`Writer`]; middlewares wrap
//! handlers at registration time via [`Router::use_middleware`]. For
//! WebSocket endpoints, register [`ws_route`] and exchange messages on
//! the [`WebSocket`] session it hands you.

pub(crate) mod http {
    pub(crate) mod body;
    pub(crate) mod headers;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod router {
    pub(crate) mod pattern;
    pub(crate) mod router;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
    pub(crate) mod stream;
}
pub(crate) mod ws {
    pub(crate) mod frame;
    pub(crate) mod handshake;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    errors::Error,
    http::{
        body::Body,
        headers::{Headers, Params},
        request::Request,
        response::Writer,
    },
    router::router::{
        DynHandler, Group, Handler, HandlerFuture, Middleware, ParamInfo, RouteInfo, Router,
    },
    server::{
        connection::serve_connection,
        server_impl::{Server, ServerBuilder},
    },
    ws::handshake::{upgrade, ws_route, WebSocket, WsConfig, WsRoute},
};
