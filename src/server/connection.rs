//! Per-connection orchestration.
//!
//! Each accepted connection is one task: parse one request, route it,
//! run the handler, send whatever is pending, close. Protocol errors are
//! answered with status-only responses; deadline expiry and stream
//! failures close the connection with nothing further on the wire.

use crate::{
    http::{headers::Params, request::parse_request, response::Writer},
    limits::Limits,
    router::router::Router,
    server::stream::split,
};
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::Instant,
};

/// Serves exactly one request/response exchange on an established byte
/// stream, then closes it.
///
/// This is the core entry point for accept loops: anything that yields a
/// connected stream (plain TCP, an already-handshaken TLS stream, an
/// in-memory pipe in tests) calls in here with the shared route table.
pub async fn serve_connection<S>(
    stream: S,
    remote_addr: String,
    router: Arc<Router>,
    limits: Arc<Limits>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer_half) = split(stream);

    let deadline = Instant::now() + limits.conn.connection_deadline;
    reader.set_deadline(Some(deadline));
    writer_half.set_deadline(Some(deadline));

    let mut req = match parse_request(
        reader,
        remote_addr,
        &limits.req,
        limits.conn.header_read_timeout,
    )
    .await
    {
        Ok(req) => req,
        Err(err) => {
            log::debug!("failed to parse request: {err}");
            if let Some(bytes) = err.response_bytes() {
                if let Err(err) = writer_half.write_all(bytes).await {
                    log::debug!("failed to write error response: {err}");
                }
            }
            return;
        }
    };

    log::debug!("{} {} from {}", req.method(), req.path(), req.remote_addr());

    let mut writer = Writer::new(writer_half, &limits.resp);

    match router.find(req.path()) {
        Some((handler, captures)) => {
            req.params = Params::from_captures(captures);
            handler.handle(&mut req, &mut writer).await;
        }
        None => {
            log::debug!("no route matched {}", req.path());
            writer.write_status(404);
        }
    }

    if let Err(err) = writer.finalize().await {
        log::error!("failed to write response: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http::{request::Request, response::Writer},
        limits::ReqLimits,
        router::router::HandlerFuture,
        ws::handshake::{ws_route, WebSocket, WsConfig},
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn exchange(router: Router, raw: &[u8]) -> String {
        exchange_with(router, raw, Limits::default()).await
    }

    async fn exchange_with(router: Router, raw: &[u8], limits: Limits) -> String {
        let (mut client, server) = tokio::io::duplex(1 << 21);
        client.write_all(raw).await.unwrap();

        let task = tokio::spawn(serve_connection(
            server,
            "127.0.0.1:40000".to_string(),
            Arc::new(router),
            Arc::new(limits),
        ));

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap();
        String::from_utf8(out).unwrap()
    }

    fn echo<'a>(req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
        Box::pin(async move {
            let body = match req.read_body().await {
                Ok(body) => body,
                Err(err) => {
                    let _ = w.error(400, &err.to_string()).await;
                    return;
                }
            };
            let _ = w.write(&body).await;
        })
    }

    fn show_params<'a>(req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
        Box::pin(async move {
            let id = req.param("id").unwrap_or("-").to_string();
            let pid = req.param("pid").unwrap_or("-").to_string();
            let _ = w.write(format!("id={id} pid={pid}").as_bytes()).await;
        })
    }

    fn name_file<'a>(req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
        let path = req.path().to_string();
        Box::pin(async move {
            let _ = w.write(format!("wild:{path}").as_bytes()).await;
        })
    }

    fn readme<'a>(_req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
        Box::pin(async move {
            let _ = w.write(b"exact:readme").await;
        })
    }

    #[tokio::test]
    async fn exact_route_echoes_body() {
        let mut router = Router::new();
        router.route_method("/echo", echo, "POST");

        let out = exchange(
            router,
            b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello",
        )
        .await;

        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out:?}");
        assert!(out.contains("content-length: 5\r\n"), "{out:?}");
        assert!(out.ends_with("\r\n\r\nhello"), "{out:?}");
    }

    #[tokio::test]
    async fn parameters_are_captured() {
        let mut router = Router::new();
        router.route("/user/:id/posts/:pid", show_params);

        let out = exchange(router, b"GET /user/42/posts/7 HTTP/1.1\r\n\r\n").await;

        assert!(out.ends_with("id=42 pid=7"), "{out:?}");
    }

    #[tokio::test]
    async fn exact_beats_wildcard() {
        let mut router = Router::new();
        router.route("/files/*", name_file);
        router.route("/files/readme", readme);

        let readme_out = exchange(router, b"GET /files/readme HTTP/1.1\r\n\r\n").await;
        assert!(readme_out.ends_with("exact:readme"), "{readme_out:?}");

        let mut router = Router::new();
        router.route("/files/*", name_file);
        router.route("/files/readme", readme);

        let wild_out = exchange(router, b"GET /files/a/b.txt HTTP/1.1\r\n\r\n").await;
        assert!(wild_out.ends_with("wild:/files/a/b.txt"), "{wild_out:?}");
    }

    #[tokio::test]
    async fn chunked_body_end_to_end() {
        let mut router = Router::new();
        router.route_method("/x", echo, "POST");

        let out = exchange(
            router,
            b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .await;

        assert!(out.contains("content-length: 11\r\n"), "{out:?}");
        assert!(out.ends_with("hello world"), "{out:?}");
    }

    #[tokio::test]
    async fn oversized_headers_get_413() {
        let limits = Limits {
            req: ReqLimits {
                max_header_bytes: 256,
                initial_read_size: 64,
                ..ReqLimits::default()
            },
            ..Limits::default()
        };

        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        raw.extend_from_slice("x-filler: aaaaaaaaaaaaaaaaaaaaaaaa\r\n".repeat(32).as_bytes());

        let out = exchange_with(Router::new(), &raw, limits).await;
        assert_eq!(out, "HTTP/1.1 413 Payload Too Large\r\n\r\n");
    }

    #[tokio::test]
    async fn unmatched_route_gets_404() {
        let out = exchange(Router::new(), b"GET /nowhere HTTP/1.1\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 404 Not Found\r\n\r\n");
    }

    #[tokio::test]
    async fn malformed_request_line_gets_400() {
        let out = exchange(Router::new(), b"BROKEN\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 400 Bad Request\r\n\r\n");
    }

    #[tokio::test]
    async fn handler_without_writes_defaults_to_200() {
        fn silent<'a>(_req: &'a mut Request, _w: &'a mut Writer) -> HandlerFuture<'a> {
            Box::pin(async move {})
        }

        let mut router = Router::new();
        router.route("/quiet", silent);

        let out = exchange(router, b"GET /quiet HTTP/1.1\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 200 OK\r\n\r\n");
    }

    #[tokio::test]
    async fn streaming_handler_writes_through() {
        fn stream_out<'a>(_req: &'a mut Request, w: &'a mut Writer) -> HandlerFuture<'a> {
            Box::pin(async move {
                w.set_header("content-type", "text/plain");
                let _ = w.flush_headers().await;
                let _ = w.write(b"first ").await;
                let _ = w.write(b"second").await;
            })
        }

        let mut router = Router::new();
        router.route("/stream", stream_out);

        let out = exchange(router, b"GET /stream HTTP/1.1\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out:?}");
        assert!(out.ends_with("\r\n\r\nfirst second"), "{out:?}");
        assert!(!out.contains("content-length"), "{out:?}");
    }

    fn ws_echo<'a>(mut session: WebSocket, _req: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            while let Ok(message) = session.read_message().await {
                let reply = if message == b"ping" { b"pong".to_vec() } else { message };
                if session.write_message(&reply).await.is_err() {
                    return;
                }
            }
        })
    }

    #[tokio::test]
    async fn websocket_handshake_and_echo() {
        let mut router = Router::new();
        router.route("/ws", ws_route(ws_echo, WsConfig::default()));

        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(serve_connection(
            server,
            "t".to_string(),
            Arc::new(router),
            Arc::new(Limits::default()),
        ));

        client
            .write_all(
                b"GET /ws HTTP/1.1\r\n\
                  Host: localhost\r\n\
                  Upgrade: websocket\r\n\
                  Connection: Upgrade\r\n\
                  Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            )
            .await
            .unwrap();

        // 101 + accept key
        let mut buf = vec![0u8; 1024];
        let mut head = Vec::new();
        while !head.ends_with(b"\r\n\r\n") {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before handshake completed");
            head.extend_from_slice(&buf[..n]);
        }
        let head = String::from_utf8(head).unwrap();
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"), "{head:?}");
        assert!(
            head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"),
            "{head:?}"
        );

        // masked text frame "ping"
        let key = [0x11u8, 0x22, 0x33, 0x44];
        let mut frame = vec![0x81, 0x80 | 4];
        frame.extend_from_slice(&key);
        frame.extend(b"ping".iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        client.write_all(&frame).await.unwrap();

        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x81, 4, b'p', b'o', b'n', b'g']);

        // close frame ends the session and the connection task
        let close = [0x88u8, 0x80, 1, 2, 3, 4];
        client.write_all(&close).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn non_websocket_request_to_ws_route_gets_400() {
        let mut router = Router::new();
        router.route("/ws", ws_route(ws_echo, WsConfig::default()));

        let out = exchange(router, b"GET /ws HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 400 Bad Request\r\n\r\n");
    }
}
