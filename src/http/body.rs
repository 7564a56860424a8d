//! Request body readers.
//!
//! After the header block is parsed, one of three readers is installed:
//! a length-limited reader for `Content-Length` bodies, a streaming
//! RFC 7230 §4.1 decoder for `Transfer-Encoding: chunked`, or a reader
//! over the already-buffered tail when neither header is usable. All of
//! them draw from the bytes read past the header terminator first, then
//! from the stream.

use crate::{errors::Error, http::headers::Headers, limits::ReqLimits, server::stream::StreamReader};
use memchr::memchr;
use std::io;
use tokio::time::Instant;

// Guards the scan for a chunk-size or trailer line.
const MAX_CHUNK_LINE: usize = 8192;

/// Byte source over the retained initial-body tail plus the remaining
/// stream. `stream: None` makes the source finite.
pub(crate) struct TailReader {
    buf: Vec<u8>,
    pos: usize,
    stream: Option<StreamReader>,
    slab: usize,
}

impl TailReader {
    pub(crate) fn new(tail: Vec<u8>, stream: Option<StreamReader>, slab: usize) -> Self {
        Self {
            buf: tail,
            pos: 0,
            stream,
            slab: slab.max(1),
        }
    }

    pub(crate) fn set_deadline(&mut self, deadline: Option<Instant>) {
        if let Some(stream) = &mut self.stream {
            stream.set_deadline(deadline);
        }
    }

    fn buffered(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    async fn fill(&mut self) -> Result<usize, Error> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }

        let Some(stream) = &mut self.stream else {
            return Ok(0);
        };

        let old = self.buf.len();
        self.buf.resize(old + self.slab, 0);
        let result = stream.read(&mut self.buf[old..]).await;
        self.buf.truncate(old + *result.as_ref().unwrap_or(&0));
        result
    }

    pub(crate) async fn read(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        if self.buffered().is_empty() && self.fill().await? == 0 {
            return Ok(0);
        }
        Ok(self.read_buffered(out))
    }

    // Reads from the retained tail only, never the stream.
    fn read_buffered(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buffered().len());
        out[..n].copy_from_slice(&self.buffered()[..n]);
        self.pos += n;
        n
    }

    pub(crate) async fn read_exact(&mut self, out: &mut [u8]) -> Result<(), Error> {
        let mut filled = 0;
        while filled < out.len() {
            let n = self.read(&mut out[filled..]).await?;
            if n == 0 {
                return Err(Error::Stream(io::ErrorKind::UnexpectedEof.into()));
            }
            filled += n;
        }
        Ok(())
    }

    // Reads one CRLF-terminated line, returned without the terminator.
    // Bare LF is rejected; only CRLF ends a line.
    async fn read_line(&mut self) -> Result<Vec<u8>, Error> {
        loop {
            if let Some(i) = memchr(b'\n', self.buffered()) {
                if i == 0 || self.buffered()[i - 1] != b'\r' {
                    return Err(Error::MalformedChunkSize);
                }
                let line = self.buffered()[..i - 1].to_vec();
                self.pos += i + 1;
                return Ok(line);
            }
            if self.buffered().len() > MAX_CHUNK_LINE {
                return Err(Error::MalformedChunkSize);
            }
            if self.fill().await? == 0 {
                return Err(Error::Stream(io::ErrorKind::UnexpectedEof.into()));
            }
        }
    }
}

enum BodyKind {
    Empty,
    Fixed { length: u64, consumed: u64 },
    Chunked(ChunkState),
}

enum ChunkState {
    Size,
    Data { remaining: u64 },
    Done,
}

/// Lazy request body.
///
/// A finite sequence of octets drawn from the stream on demand. Reads may
/// return fewer bytes than requested; `Ok(0)` is end-of-body. Reading
/// past [`ReqLimits::max_body_bytes`] fails with [`Error::BodyTooLarge`].
pub struct Body {
    kind: BodyKind,
    source: TailReader,
    max_body_bytes: u64,
    declared: u64,
}

impl Body {
    /// Installs the reader for a parsed header block: chunked wins over
    /// `Content-Length` (RFC 7230 §3.3.3); an unparsable length falls
    /// back to the buffered tail alone.
    pub(crate) fn select(
        headers: &Headers,
        tail: Vec<u8>,
        stream: Option<StreamReader>,
        limits: &ReqLimits,
    ) -> Self {
        let slab = limits.initial_read_size;
        let max = limits.max_body_bytes as u64;

        if let Ok(te) = headers.get("transfer-encoding") {
            if te.eq_ignore_ascii_case("chunked") {
                return Self {
                    kind: BodyKind::Chunked(ChunkState::Size),
                    source: TailReader::new(tail, stream, slab),
                    max_body_bytes: max,
                    declared: 0,
                };
            }
        }

        if let Some(length) = headers
            .get("content-length")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            return Self {
                kind: BodyKind::Fixed {
                    length,
                    consumed: 0,
                },
                source: TailReader::new(tail, stream, slab),
                max_body_bytes: max,
                declared: 0,
            };
        }

        // No usable body headers: the body is the buffered tail alone,
        // but the stream stays owned so an upgrade can take it over.
        Self {
            kind: BodyKind::Empty,
            source: TailReader::new(tail, stream, slab),
            max_body_bytes: max,
            declared: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self {
            kind: BodyKind::Empty,
            source: TailReader::new(Vec::new(), None, 4096),
            max_body_bytes: ReqLimits::default().max_body_bytes as u64,
            declared: 0,
        }
    }

    // The WebSocket session takes over the read half; whatever was
    // buffered past the handshake belongs to it.
    pub(crate) fn take_source(&mut self) -> TailReader {
        self.kind = BodyKind::Empty;
        std::mem::replace(&mut self.source, TailReader::new(Vec::new(), None, 4096))
    }

    /// Reads some body bytes into `out`, returning `Ok(0)` at end of body.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        match &mut self.kind {
            BodyKind::Empty => Ok(self.source.read_buffered(out)),

            BodyKind::Fixed { length, consumed } => {
                let cap = (*length).min(self.max_body_bytes);
                if *consumed >= cap {
                    if *length > self.max_body_bytes {
                        return Err(Error::BodyTooLarge);
                    }
                    return Ok(0);
                }

                let want = out.len().min((cap - *consumed) as usize);
                let n = self.source.read(&mut out[..want]).await?;
                *consumed += n as u64;
                Ok(n)
            }

            BodyKind::Chunked(_) => self.read_chunked(out).await,
        }
    }

    /// Reads the remaining body into a single buffer.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; 4096];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    async fn read_chunked(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        loop {
            let BodyKind::Chunked(state) = &mut self.kind else {
                return Ok(0);
            };

            match state {
                ChunkState::Size => {
                    let line = self.source.read_line().await?;
                    let size = parse_chunk_size(&line)?;

                    self.declared += size;
                    if self.declared > self.max_body_bytes {
                        return Err(Error::BodyTooLarge);
                    }

                    if size == 0 {
                        // drain and discard trailers up to the empty line
                        loop {
                            let trailer = self.source.read_line().await?;
                            if trailer.is_empty() {
                                break;
                            }
                        }
                        *state = ChunkState::Done;
                        return Ok(0);
                    }

                    *state = ChunkState::Data { remaining: size };
                }

                ChunkState::Data { remaining } => {
                    if out.is_empty() {
                        return Ok(0);
                    }

                    let want = out.len().min(*remaining as usize);
                    let n = self.source.read(&mut out[..want]).await?;
                    if n == 0 {
                        return Err(Error::Stream(io::ErrorKind::UnexpectedEof.into()));
                    }
                    *remaining -= n as u64;

                    if *remaining == 0 {
                        let mut crlf = [0u8; 2];
                        self.source.read_exact(&mut crlf).await?;
                        if &crlf != b"\r\n" {
                            return Err(Error::MalformedChunkTerminator);
                        }
                        *state = ChunkState::Size;
                    }

                    return Ok(n);
                }

                ChunkState::Done => return Ok(0),
            }
        }
    }
}

// Everything before the first ';' is the hex size token; chunk extension
// parameters are tolerated and ignored. Sizes must fit in 63 bits.
fn parse_chunk_size(line: &[u8]) -> Result<u64, Error> {
    let token = match memchr(b';', line) {
        Some(i) => &line[..i],
        None => line,
    };
    let token = std::str::from_utf8(token)
        .map_err(|_| Error::MalformedChunkSize)?
        .trim_ascii();

    let size = u64::from_str_radix(token, 16).map_err(|_| Error::MalformedChunkSize)?;
    if size > i64::MAX as u64 {
        return Err(Error::MalformedChunkSize);
    }
    Ok(size)
}
