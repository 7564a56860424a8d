//! Server configuration limits and timeouts.
//!
//! Defaults are intentionally conservative: they bound every byte the
//! parser accumulates and every wait the connection task performs, so a
//! slow or hostile peer costs a bounded amount of memory and time.
//!
//! # Examples
//!
//! ```no_run
//! use lattice_web::{Router, Server};
//! use lattice_web::limits::{ConnLimits, ReqLimits};
//! use tokio::net::TcpListener;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .router(Router::new())
//!         .request_limits(ReqLimits {
//!             max_body_bytes: 4 * 1024 * 1024, // larger uploads
//!             ..ReqLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             header_read_timeout: Duration::from_secs(2),
//!             ..ConnLimits::default()
//!         })
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```

use std::time::Duration;

/// Request parsing and body limits.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum accumulated bytes while searching for the header terminator
    /// (default: `1 MiB`). Exceeding it answers `413` and closes.
    pub max_header_bytes: usize,

    /// Read slab size for the parser and body readers (default: `8192 B`,
    /// commonly lowered to `4096`).
    pub initial_read_size: usize,

    /// Hard cap on the decoded request body in either mode
    /// (default: `1 MiB`). A `Content-Length` beyond the cap fails the
    /// read that crosses it; a chunked body fails as soon as the declared
    /// sizes exceed it.
    pub max_body_bytes: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: 1 << 20,
            initial_read_size: 8192,
            max_body_bytes: 1 << 20,

            _priv: (),
        }
    }
}

/// Connection-level deadlines.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Deadline covering the whole request/response exchange
    /// (default: `10 seconds`). Expiry closes the stream with no further
    /// bytes. A successful WebSocket upgrade replaces it with the per-op
    /// deadlines in [`WsLimits`].
    pub connection_deadline: Duration,

    /// Wall-clock budget for collecting the header block
    /// (default: `5 seconds`).
    pub header_read_timeout: Duration,

    /// Deadline for overload (`503`) responses written outside a
    /// connection task (default: `10 seconds`).
    pub socket_write_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    fn default() -> Self {
        Self {
            connection_deadline: Duration::from_secs(10),
            header_read_timeout: Duration::from_secs(5),
            socket_write_timeout: Duration::from_secs(10),

            _priv: (),
        }
    }
}

/// Response writer behavior.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Serialize [`write_json`](crate::Writer::write_json) bodies with
    /// indentation (default: `false`, compact).
    pub json_pretty: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            json_pretty: false,

            _priv: (),
        }
    }
}

/// WebSocket session deadlines and frame limits.
#[derive(Debug, Clone)]
pub struct WsLimits {
    /// Per-operation read deadline (default: `15 seconds`).
    pub read_timeout: Duration,

    /// Per-operation write deadline (default: `15 seconds`).
    pub write_timeout: Duration,

    /// Maximum accepted frame payload (default: `1 MiB`).
    pub max_frame_bytes: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for WsLimits {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            max_frame_bytes: 1 << 20,

            _priv: (),
        }
    }
}

/// Accept-loop limits.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Maximum concurrent connection tasks (default: `1024`). Connections
    /// accepted beyond the limit receive an immediate `503` and close.
    pub max_connections: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 1024,

            _priv: (),
        }
    }
}

/// Aggregated limits handed to the connection orchestrator.
#[derive(Debug, Clone, Default)]
pub struct Limits {
    pub server: ServerLimits,
    pub conn: ConnLimits,
    pub req: ReqLimits,
    pub resp: RespLimits,
}
