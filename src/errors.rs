use std::{error, fmt, io};

/// Errors produced by the protocol core.
///
/// Parser and decoder failures abort the request and map to a status-only
/// response; handler-visible failures (`Serialization`, body read errors)
/// are returned to the handler, which decides what to emit.
#[derive(Debug)]
pub enum Error {
    BadRequestLine,
    InvalidHeader,
    MalformedChunkSize,
    MalformedChunkTerminator,

    HeadersTooLarge,
    BodyTooLarge,

    Timeout,
    NotFound,

    AlreadyExists,
    NotExist,

    Serialization(serde_json::Error),
    Stream(io::Error),

    NotAWebSocketHandshake,
    ConnectionClosed,
    UnsupportedFrame,

    ServiceUnavailable,
}

macro_rules! status_responses {
    ($($name:ident => $line:literal;)*) => {
        impl Error {
            // Wire bytes for errors the connection task answers itself.
            // Status-only, empty body, connection closes right after.
            pub(crate) const fn response_bytes(&self) -> Option<&'static [u8]> {
                match self {
                    $(Self::$name { .. } => Some(concat!($line, "\r\n\r\n").as_bytes()),)*
                    _ => None,
                }
            }
        }
    };
}

status_responses! {
    BadRequestLine => "HTTP/1.1 400 Bad Request";
    InvalidHeader => "HTTP/1.1 400 Bad Request";
    MalformedChunkSize => "HTTP/1.1 400 Bad Request";
    MalformedChunkTerminator => "HTTP/1.1 400 Bad Request";
    NotAWebSocketHandshake => "HTTP/1.1 400 Bad Request";
    HeadersTooLarge => "HTTP/1.1 413 Payload Too Large";
    BodyTooLarge => "HTTP/1.1 413 Payload Too Large";
    NotFound => "HTTP/1.1 404 Not Found";
    ServiceUnavailable => "HTTP/1.1 503 Service Unavailable";
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Stream(err) => write!(f, "stream error: {err}"),
            Error::Serialization(err) => write!(f, "serialization error: {err}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Stream(a), Error::Stream(b)) => a.kind() == b.kind(),
            (Error::Serialization(_), Error::Serialization(_)) => true,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Stream(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}
