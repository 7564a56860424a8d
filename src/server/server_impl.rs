//! TCP accept loop and server builder.
//!
//! One task per accepted connection, bounded by a permit pool: when all
//! permits are out, new connections get an immediate `503` and close
//! instead of queueing unboundedly. TLS termination and anything else
//! that produces an established stream stays outside the core; such
//! collaborators call [`serve_connection`] directly.

use crate::{
    errors::Error,
    limits::{ConnLimits, Limits, ReqLimits, RespLimits, ServerLimits},
    router::router::Router,
    server::{connection::serve_connection, stream::split},
};
use crossbeam::queue::ArrayQueue;
use std::sync::Arc;
use tokio::{net::TcpListener, time::Instant};

/// An HTTP server bound to a listener and a route table.
///
/// # Examples
///
/// ```no_run
/// use lattice_web::{HandlerFuture, Request, Router, Server, Writer};
/// use tokio::net::TcpListener;
///
/// fn hello<'a>(_req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
///     Box::pin(async move {
///         let _ = w.write(b"Hello World!").await;
///     })
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let mut router = Router::new();
///     router.route("/", hello);
///
///     Server::builder()
///         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
///         .router(router)
///         .build()
///         .launch()
///         .await;
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
    limits: Arc<Limits>,
    permits: Arc<ArrayQueue<()>>,
}

impl Server {
    /// Creates a builder for configuring the server.
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            listener: None,
            router: None,
            limits: Limits::default(),
        }
    }

    /// Accepts connections forever, spawning one task per connection.
    pub async fn launch(self) {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    log::error!("accept failed: {err}");
                    continue;
                }
            };

            match self.permits.pop() {
                Some(()) => {
                    let router = self.router.clone();
                    let limits = self.limits.clone();
                    let permits = self.permits.clone();

                    tokio::spawn(async move {
                        serve_connection(stream, addr.to_string(), router, limits).await;
                        let _ = permits.push(());
                    });
                }
                None => {
                    log::warn!("connection limit reached, rejecting {addr}");
                    let write_timeout = self.limits.conn.socket_write_timeout;

                    tokio::spawn(async move {
                        let (_reader, mut writer) = split(stream);
                        writer.set_deadline(Some(Instant::now() + write_timeout));
                        if let Some(bytes) = Error::ServiceUnavailable.response_bytes() {
                            let _ = writer.write_all(bytes).await;
                        }
                    });
                }
            }
        }
    }
}

/// Builder for [`Server`] instances.
pub struct ServerBuilder {
    listener: Option<TcpListener>,
    router: Option<Router>,
    limits: Limits,
}

impl ServerBuilder {
    /// Sets the TCP listener. **Required.**
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the route table. **Required.** Registration is done before
    /// serving starts; the table is shared immutably afterwards.
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.limits.server = limits;
        self
    }

    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.limits.conn = limits;
        self
    }

    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.limits.req = limits;
        self
    }

    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.limits.resp = limits;
        self
    }

    /// Finalizes the builder.
    ///
    /// # Panics
    ///
    /// Panics when [`listener`](ServerBuilder::listener) or
    /// [`router`](ServerBuilder::router) was not called.
    #[track_caller]
    pub fn build(self) -> Server {
        let listener = self
            .listener
            .expect("The `listener` method must be called to create");
        let router = self
            .router
            .expect("The `router` method must be called to create");

        let permits = ArrayQueue::new(self.limits.server.max_connections.max(1));
        while permits.push(()).is_ok() {}

        Server {
            listener,
            router: Arc::new(router),
            limits: Arc::new(self.limits),
            permits: Arc::new(permits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::request::Request, http::response::Writer, router::router::HandlerFuture};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
    };

    fn hello<'a>(_req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
        Box::pin(async move {
            let _ = w.write(b"hello").await;
        })
    }

    #[tokio::test]
    async fn serves_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut router = Router::new();
        router.route("/", hello);

        let server = Server::builder().listener(listener).router(router).build();
        tokio::spawn(server.launch());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out:?}");
        assert!(out.ends_with("\r\n\r\nhello"), "{out:?}");
    }

    #[test]
    #[should_panic(expected = "The `listener` method must be called to create")]
    fn build_requires_listener() {
        Server::builder().router(Router::new()).build();
    }
}
