//! Response writer state machine.
//!
//! The writer moves through `Composing -> HeadersSent -> Closed`. While
//! composing, status and headers may change and body bytes accumulate in
//! a buffer; once the head is on the wire nothing about it can change and
//! writes pass straight through to the stream. Operations in the wrong
//! state warn and do nothing.

use crate::{
    errors::Error, http::headers::Headers, http::types::reason_phrase, limits::RespLimits,
    server::stream::StreamWriter,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Composing,
    HeadersSent,
    Closed,
}

/// HTTP response writer handed to handlers.
///
/// Buffered by default: status, headers and body are assembled and sent
/// as one write when the handler returns. Calling
/// [`flush_headers`](Writer::flush_headers) switches to streaming mode,
/// after which [`write`](Writer::write) goes directly to the stream.
pub struct Writer {
    status: Option<u16>,
    headers: Headers,
    body_buf: Vec<u8>,
    state: State,
    stream: Option<StreamWriter>,
    json_pretty: bool,
}

impl Writer {
    pub(crate) fn new(stream: StreamWriter, limits: &RespLimits) -> Self {
        Self {
            status: None,
            headers: Headers::new(),
            body_buf: Vec::new(),
            state: State::Composing,
            stream: Some(stream),
            json_pretty: limits.json_pretty,
        }
    }

    /// Sets the status code. Unset means `200` at send time. A second
    /// call is a no-op.
    pub fn write_status(&mut self, code: u16) {
        if self.state != State::Composing {
            log::warn!("write_status called after headers were sent");
            return;
        }
        if self.status.is_some() {
            log::warn!("write_status called multiple times");
            return;
        }
        self.status = Some(code);
    }

    /// Adds a response header; fails with [`Error::AlreadyExists`] if
    /// present. No effect once headers are sent.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        if self.state != State::Composing {
            log::warn!("header change ignored after headers were sent");
            return Ok(());
        }
        self.headers.add(name, value)
    }

    /// Sets a response header, replacing any existing value. No effect
    /// once headers are sent.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if self.state != State::Composing {
            log::warn!("header change ignored after headers were sent");
            return;
        }
        self.headers.set(name, value);
    }

    /// Removes a response header. No effect once headers are sent.
    pub fn delete_header(&mut self, name: &str) -> Option<String> {
        if self.state != State::Composing {
            log::warn!("header change ignored after headers were sent");
            return None;
        }
        self.headers.delete(name)
    }

    /// Looks up a header set on this response.
    pub fn header(&self, name: &str) -> Result<&str, Error> {
        self.headers.get(name)
    }

    /// Writes body bytes: buffered while composing, straight to the
    /// stream once headers are sent.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        match self.state {
            State::Composing => {
                self.body_buf.extend_from_slice(bytes);
                Ok(())
            }
            State::HeadersSent => self.write_stream_owned(bytes).await,
            State::Closed => {
                log::warn!("write ignored on a closed response");
                Ok(())
            }
        }
    }

    /// Serializes `value` to JSON and writes it, setting
    /// `content-type: application/json` if absent. Serialization
    /// failures are returned to the handler.
    pub async fn write_json<T: serde::Serialize>(&mut self, value: &T) -> Result<(), Error> {
        let bytes = if self.json_pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };

        if self.state == State::Composing && !self.headers.contains("content-type") {
            self.headers.set("content-type", "application/json");
        }
        self.write(&bytes).await
    }

    /// Sets the status and writes a short message body.
    pub async fn error(&mut self, code: u16, message: &str) -> Result<(), Error> {
        self.write_status(code);
        self.write(message.as_bytes()).await
    }

    /// Starts streaming: emits the status line, headers and blank line
    /// now. Subsequent [`write`](Writer::write) calls go directly to the
    /// stream and no `content-length` is inserted.
    pub async fn flush_headers(&mut self) -> Result<(), Error> {
        if self.state != State::Composing {
            log::warn!("flush_headers called after headers were sent");
            return Ok(());
        }
        let head = self.head_bytes();
        self.state = State::HeadersSent;
        self.write_stream_owned(&head).await
    }

    /// Sends whatever is pending and closes the response. Called by the
    /// connection task when the handler returns; inserts
    /// `content-length` for buffered non-empty bodies unless the handler
    /// set it or chose a transfer encoding.
    pub(crate) async fn finalize(&mut self) -> Result<(), Error> {
        match self.state {
            State::Composing => {
                if !self.body_buf.is_empty()
                    && !self.headers.contains("content-length")
                    && !self.headers.contains("transfer-encoding")
                {
                    let length = self.body_buf.len().to_string();
                    self.headers.set("content-length", &length);
                }

                let mut out = self.head_bytes();
                out.extend_from_slice(&self.body_buf);
                self.state = State::Closed;
                self.write_stream_owned(&out).await
            }
            State::HeadersSent => {
                self.state = State::Closed;
                Ok(())
            }
            State::Closed => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_composing(&self) -> bool {
        self.state == State::Composing
    }

    // The WebSocket upgrade takes the stream; the writer is done on this
    // connection afterwards.
    pub(crate) fn detach_stream(&mut self) -> Option<StreamWriter> {
        self.state = State::Closed;
        self.stream.take()
    }

    fn head_bytes(&self) -> Vec<u8> {
        let code = self.status.unwrap_or(200);
        let mut head = Vec::with_capacity(64 + self.headers.len() * 32);

        head.extend_from_slice(format!("HTTP/1.1 {code} {}\r\n", reason_phrase(code)).as_bytes());
        for (name, value) in self.headers.iter() {
            head.extend_from_slice(name.as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");
        head
    }

    async fn write_stream_owned(&mut self, bytes: &[u8]) -> Result<(), Error> {
        match &mut self.stream {
            Some(stream) => stream.write_all(bytes).await,
            None => Ok(()),
        }
    }
}
