//! Deadline-aware adapter over an established byte stream.
//!
//! The accept loop hands the core any `AsyncRead + AsyncWrite` stream
//! (plain TCP or an already-handshaken TLS stream); it is boxed and split
//! into halves so the body reader and the response writer can own their
//! direction independently. Every operation races an absolute deadline,
//! and expiry surfaces as [`Error::Timeout`] with no further bytes.

use crate::errors::Error;
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf},
    time::{timeout_at, Instant},
};

pub(crate) trait RawStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> RawStream for T {}

// Type-erased stream. Trait objects do not inherit their supertrait
// impls, so the poll methods are forwarded by hand.
pub(crate) struct BoxStream {
    inner: Pin<Box<dyn RawStream>>,
}

impl BoxStream {
    fn new(stream: impl RawStream + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl AsyncRead for BoxStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().inner.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for BoxStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().inner.as_mut().poll_shutdown(cx)
    }
}

pub(crate) fn split(stream: impl RawStream + 'static) -> (StreamReader, StreamWriter) {
    let (reader, writer) = tokio::io::split(BoxStream::new(stream));
    (
        StreamReader {
            inner: reader,
            deadline: None,
        },
        StreamWriter {
            inner: writer,
            deadline: None,
        },
    )
}

pub(crate) struct StreamReader {
    inner: ReadHalf<BoxStream>,
    deadline: Option<Instant>,
}

impl StreamReader {
    #[inline]
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.deadline {
            Some(deadline) => match timeout_at(deadline, self.inner.read(buf)).await {
                Ok(result) => result.map_err(Error::from),
                Err(_) => Err(Error::Timeout),
            },
            None => self.inner.read(buf).await.map_err(Error::from),
        }
    }
}

pub(crate) struct StreamWriter {
    inner: WriteHalf<BoxStream>,
    deadline: Option<Instant>,
}

impl StreamWriter {
    pub(crate) fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    pub(crate) async fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        match self.deadline {
            Some(deadline) => match timeout_at(deadline, self.inner.write_all(buf)).await {
                Ok(result) => result.map_err(Error::from),
                Err(_) => Err(Error::Timeout),
            },
            None => self.inner.write_all(buf).await.map_err(Error::from),
        }
    }
}
