//! Request record and connection parser.

use crate::{
    errors::Error,
    http::{
        body::Body,
        headers::{Headers, Params},
    },
    limits::ReqLimits,
    server::stream::StreamReader,
};
use memchr::memmem;
use std::{io, time::Duration};
use tokio::time::Instant;

/// A parsed HTTP request.
///
/// Immutable after parsing except for the lazy [`Body`]; `params` is
/// filled in by the route matcher before the handler runs.
pub struct Request {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) version: String,
    pub(crate) headers: Headers,
    pub(crate) params: Params,
    pub(crate) body: Body,
    pub(crate) remote_addr: String,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("version", &self.version)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Request method token, exactly as sent (e.g. `GET`).
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Raw request-target. Trimmed of surrounding whitespace but never
    /// percent-decoded.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Protocol version token (e.g. `HTTP/1.1`).
    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Convenience lookup returning `None` for missing or empty headers.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).ok()
    }

    #[inline]
    pub fn params(&self) -> &Params {
        &self.params
    }

    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// The lazy body source.
    #[inline]
    pub fn body(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Reads the whole body into memory, bounded by
    /// [`ReqLimits::max_body_bytes`].
    pub async fn read_body(&mut self) -> Result<Vec<u8>, Error> {
        self.body.read_to_end().await
    }

    /// Textual peer address.
    #[inline]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    #[cfg(test)]
    pub(crate) fn test_request(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: Headers::new(),
            params: Params::new(),
            body: Body::empty(),
            remote_addr: "test".to_string(),
        }
    }
}

/// Reads and parses one request off the stream.
///
/// Accumulates slab-sized reads until `\r\n\r\n` appears, subject to
/// `max_header_bytes` and the header wall-clock budget, then parses the
/// request line and header block. Bytes read past the terminator are
/// retained and become the head of the body source.
pub(crate) async fn parse_request(
    mut reader: StreamReader,
    remote_addr: String,
    limits: &ReqLimits,
    header_timeout: Duration,
) -> Result<Request, Error> {
    let conn_deadline = reader.deadline();
    let header_deadline = Instant::now() + header_timeout;
    reader.set_deadline(Some(match conn_deadline {
        Some(deadline) => deadline.min(header_deadline),
        None => header_deadline,
    }));

    let mut buf: Vec<u8> = Vec::with_capacity(limits.initial_read_size);
    let mut slab = vec![0u8; limits.initial_read_size];
    let mut scan_from = 0;

    let head_end = loop {
        if let Some(idx) = memmem::find(&buf[scan_from..], b"\r\n\r\n") {
            break scan_from + idx;
        }
        scan_from = buf.len().saturating_sub(3);

        if buf.len() >= limits.max_header_bytes {
            return Err(Error::HeadersTooLarge);
        }

        let n = reader.read(&mut slab).await?;
        if n == 0 {
            return Err(Error::Stream(io::ErrorKind::UnexpectedEof.into()));
        }
        buf.extend_from_slice(&slab[..n]);
    };

    // header budget no longer applies; body reads run under the
    // connection deadline
    reader.set_deadline(conn_deadline);

    let tail = buf[head_end + 4..].to_vec();
    let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| Error::InvalidHeader)?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("");

    let tokens: Vec<&str> = request_line.split(' ').collect();
    let &[method, raw_path, version] = tokens.as_slice() else {
        return Err(Error::BadRequestLine);
    };

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some(colon) = line.find(':') else {
            return Err(Error::InvalidHeader);
        };
        let name = line[..colon].trim_ascii();
        let value = line[colon + 1..].trim_ascii();
        if name.is_empty() {
            return Err(Error::InvalidHeader);
        }
        if headers.add(name, value).is_err() {
            // first value wins on repeated names
            log::debug!("duplicate header {name:?} ignored");
        }
    }

    let body = Body::select(&headers, tail, Some(reader), limits);

    Ok(Request {
        method: method.to_string(),
        path: raw_path.trim_ascii().to_string(),
        version: version.to_string(),
        headers,
        params: Params::new(),
        body,
        remote_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::stream::split;
    use tokio::io::AsyncWriteExt;

    async fn parse(raw: &[u8], limits: &ReqLimits) -> Result<Request, Error> {
        let (mut client, server) = tokio::io::duplex(16 * 1024);
        client.write_all(raw).await.unwrap();
        drop(client);

        let (reader, _writer) = split(server);
        parse_request(
            reader,
            "127.0.0.1:9999".to_string(),
            limits,
            Duration::from_secs(5),
        )
        .await
    }

    #[tokio::test]
    async fn round_trip() {
        let req = parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n", &ReqLimits::default())
            .await
            .unwrap();

        assert_eq!(req.method(), "GET");
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), "HTTP/1.1");
        assert_eq!(req.header("host"), Some("x"));
        assert_eq!(req.remote_addr(), "127.0.0.1:9999");
    }

    #[tokio::test]
    async fn header_names_fold_and_values_trim() {
        let mut req = parse(
            b"POST /up HTTP/1.1\r\nContent-Type:  application/json \r\nX-ID: 7\r\n\r\n",
            &ReqLimits::default(),
        )
        .await
        .unwrap();

        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header("x-id"), Some("7"));
        assert_eq!(req.read_body().await.unwrap(), b"");
    }

    #[tokio::test]
    async fn request_line_errors() {
        #[rustfmt::skip]
        let cases = [
            (&b"GET /\r\nHost: x\r\n\r\n"[..], Error::BadRequestLine),
            (&b"GET / HTTP/1.1 extra\r\n\r\n"[..], Error::BadRequestLine),
            (&b"GET  / HTTP/1.1\r\n\r\n"[..], Error::BadRequestLine),
            (&b"\r\nHost: x\r\n\r\n"[..], Error::BadRequestLine),
        ];

        for (raw, expected) in cases {
            let err = parse(raw, &ReqLimits::default()).await.unwrap_err();
            assert_eq!(err, expected, "raw {:?}", std::str::from_utf8(raw));
        }
    }

    #[tokio::test]
    async fn header_line_without_colon() {
        let err = parse(
            b"GET / HTTP/1.1\r\nHost: x\r\nbroken-line\r\n\r\n",
            &ReqLimits::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err, Error::InvalidHeader);
    }

    #[tokio::test]
    async fn early_terminator_ends_the_header_block() {
        let mut req = parse(
            b"GET / HTTP/1.1\r\n\r\nHost: x\r\n\r\n",
            &ReqLimits::default(),
        )
        .await
        .unwrap();

        // the first empty line terminates the block; the rest is body tail
        assert_eq!(req.header("host"), None);
        assert_eq!(req.read_body().await.unwrap(), b"Host: x\r\n\r\n");
    }

    #[tokio::test]
    async fn duplicate_headers_first_wins() {
        let req = parse(
            b"GET / HTTP/1.1\r\nX-Tag: first\r\nX-Tag: second\r\n\r\n",
            &ReqLimits::default(),
        )
        .await
        .unwrap();

        assert_eq!(req.header("x-tag"), Some("first"));
    }

    #[tokio::test]
    async fn path_is_trimmed_but_not_decoded() {
        let req = parse(
            b"GET /a%20b?q=1 HTTP/1.1\r\n\r\n",
            &ReqLimits::default(),
        )
        .await
        .unwrap();

        assert_eq!(req.path(), "/a%20b?q=1");
    }

    #[tokio::test]
    async fn headers_too_large() {
        let limits = ReqLimits {
            max_header_bytes: 128,
            initial_read_size: 32,
            ..ReqLimits::default()
        };
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        raw.extend_from_slice("x-filler: aaaaaaaaaaaaaaaa\r\n".repeat(16).as_bytes());

        let err = parse(&raw, &limits).await.unwrap_err();
        assert_eq!(err, Error::HeadersTooLarge);
    }

    #[tokio::test]
    async fn initial_body_tail_is_retained() {
        let mut req = parse(
            b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello",
            &ReqLimits::default(),
        )
        .await
        .unwrap();

        assert_eq!(req.read_body().await.unwrap(), b"hello");
    }

    #[tokio::test(start_paused = true)]
    async fn header_collection_times_out() {
        let (mut client, server) = tokio::io::duplex(1024);
        // half a request, then silence
        client.write_all(b"GET / HTTP/1.1\r\nHost").await.unwrap();

        let (reader, _writer) = split(server);
        let err = parse_request(
            reader,
            "t".to_string(),
            &ReqLimits::default(),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

        assert_eq!(err, Error::Timeout);
    }

    #[tokio::test]
    async fn eof_before_terminator() {
        let err = parse(b"GET / HTTP/1.1\r\n", &ReqLimits::default())
            .await
            .unwrap_err();

        assert_eq!(err, Error::Stream(io::ErrorKind::UnexpectedEof.into()));
    }
}
