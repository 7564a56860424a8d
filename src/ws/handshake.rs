//! WebSocket upgrade handshake and session.

use crate::{
    errors::Error,
    http::{body::TailReader, headers::Headers, request::Request, response::Writer},
    limits::WsLimits,
    router::router::{Handler, HandlerFuture},
    server::stream::StreamWriter,
    ws::frame::{read_frame, write_frame, Frame, OP_PONG, OP_TEXT},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha1::{Digest, Sha1};
use tokio::time::Instant;

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upgrade policy: an optional origin check plus session limits.
pub struct WsConfig {
    /// Called before the 101 is written; returning `false` rejects the
    /// handshake.
    pub check_origin: Option<Box<dyn Fn(&Request) -> bool + Send + Sync>>,
    pub limits: WsLimits,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            check_origin: None,
            limits: WsLimits::default(),
        }
    }
}

/// An upgraded connection.
///
/// Owns both stream halves after the 101; the original request headers
/// stay available for the handler. Lives until the first close frame, an
/// I/O error, or the handler returns.
pub struct WebSocket {
    reader: TailReader,
    writer: StreamWriter,
    headers: Headers,
    limits: WsLimits,
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket").finish_non_exhaustive()
    }
}

impl WebSocket {
    /// Headers of the request that initiated the handshake.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Reads the next data message.
    ///
    /// Pings are answered with a pong carrying the same payload and
    /// pongs are skipped; a close frame surfaces as
    /// [`Error::ConnectionClosed`]. Each read runs under the configured
    /// per-operation deadline.
    pub async fn read_message(&mut self) -> Result<Vec<u8>, Error> {
        loop {
            self.reader
                .set_deadline(Some(Instant::now() + self.limits.read_timeout));

            match read_frame(&mut self.reader, self.limits.max_frame_bytes).await? {
                Frame::Data(payload) => return Ok(payload),
                Frame::Ping(payload) => {
                    self.writer
                        .set_deadline(Some(Instant::now() + self.limits.write_timeout));
                    write_frame(&mut self.writer, OP_PONG, &payload).await?;
                }
                Frame::Pong => {}
                Frame::Close => return Err(Error::ConnectionClosed),
            }
        }
    }

    /// Writes one unmasked text message.
    pub async fn write_message(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.writer
            .set_deadline(Some(Instant::now() + self.limits.write_timeout));
        write_frame(&mut self.writer, OP_TEXT, payload).await
    }

    /// Drops both halves, closing the connection.
    pub fn close(self) {}
}

/// Validates the upgrade preconditions and performs the handshake.
///
/// On success the 101 response has been written, the stream belongs to
/// the returned session and the response writer is closed for this
/// connection. Failing a precondition returns
/// [`Error::NotAWebSocketHandshake`] without touching the stream.
pub async fn upgrade(
    req: &mut Request,
    w: &mut Writer,
    config: &WsConfig,
) -> Result<WebSocket, Error> {
    let upgrade_ok = req
        .header("upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let connection_ok = req
        .header("connection")
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    let Some(client_key) = req.header("sec-websocket-key") else {
        return Err(Error::NotAWebSocketHandshake);
    };
    if !upgrade_ok || !connection_ok {
        return Err(Error::NotAWebSocketHandshake);
    }
    if let Some(check) = &config.check_origin {
        if !check(req) {
            return Err(Error::NotAWebSocketHandshake);
        }
    }

    let accept = derive_accept_key(client_key.as_bytes());
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );

    let Some(mut stream) = w.detach_stream() else {
        return Err(Error::ConnectionClosed);
    };
    stream.set_deadline(Some(Instant::now() + config.limits.write_timeout));
    stream.write_all(response.as_bytes()).await?;

    Ok(WebSocket {
        reader: req.body.take_source(),
        writer: stream,
        headers: req.headers.clone(),
        limits: config.limits.clone(),
    })
}

/// Derive `Sec-WebSocket-Accept` from the client key.
fn derive_accept_key(client_key: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(client_key);
    sha1.update(GUID);
    BASE64.encode(sha1.finalize())
}

/// Wraps a WebSocket handler into a route handler: a failed handshake
/// answers `400`, a successful one hands the session to `handler`.
pub fn ws_route<F>(handler: F, config: WsConfig) -> WsRoute<F>
where
    F: for<'a> Fn(WebSocket, &'a mut Request) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    WsRoute { handler, config }
}

/// Route handler produced by [`ws_route`].
pub struct WsRoute<F> {
    handler: F,
    config: WsConfig,
}

impl<F> Handler for WsRoute<F>
where
    F: for<'a> Fn(WebSocket, &'a mut Request) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
        Box::pin(async move {
            match upgrade(req, w, &self.config).await {
                Ok(session) => (self.handler)(session, req).await,
                Err(Error::NotAWebSocketHandshake) => {
                    log::debug!("rejected non-websocket request to {}", req.path());
                    w.write_status(400);
                }
                Err(err) => log::error!("websocket handshake failed: {err}"),
            }
        })
    }
}
