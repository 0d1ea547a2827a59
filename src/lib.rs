//! Multi-listener process harness for hyper services.
//!
//! A process runs one [`ManagedServer`] per configuration unit, all sharing
//! one lifetime. Termination signals drive shutdown: SIGINT drains
//! already-accepted connections under a hard grace period, SIGTERM and
//! SIGQUIT exit immediately. The harness moves no application payloads —
//! the services behind each listener are supplied by the caller and opaque
//! to it.
//!
//! ```rust,no_run
//! use std::convert::Infallible;
//! use std::net::SocketAddr;
//!
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use hyper::body::Incoming;
//! use hyper::{Request, Response};
//! use hyper_util::service::TowerToHyperService;
//!
//! async fn hello(_: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
//!     Ok(Response::new(Full::new(Bytes::from("Hello, World!"))))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), roost::Error> {
//!     roost::run_servers(
//!         "/etc/roost",
//!         |_unit| {
//!             let service = TowerToHyperService::new(tower::service_fn(hello));
//!             Ok((SocketAddr::from(([0, 0, 0, 0], 8080)), service))
//!         },
//!         roost::GracePolicy::default(),
//!     )
//!     .await
//! }
//! ```

mod config;
mod error;
mod group;
mod handle;
mod server;
mod shutdown;
mod signal;
mod tcp;

pub use config::resolve_config_units;
pub use error::Error;
pub use group::ServerGroup;
pub use server::ManagedServer;
pub use shutdown::{shutdown, GracePolicy};
pub use signal::{wait_for_signal, Protocol, SignalEvent};

use http::{Request, Response};
use http_body::Body;
use hyper::body::Incoming;
use hyper::service::Service;
use std::net::SocketAddr;
use std::path::Path;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Runs every configured server until a termination signal arrives, then
/// drives the matching shutdown protocol.
///
/// `config_path` is resolved into configuration units by
/// [`resolve_config_units`]; the factory maps each unit to a bind address
/// and the service to run there. Returns only on startup failure — every
/// post-startup path ends in `process::exit(0)`.
pub async fn run_servers<S, B, F>(
    config_path: impl AsRef<Path>,
    factory: F,
    policy: GracePolicy,
) -> Result<(), Error>
where
    F: FnMut(&Path) -> Result<(SocketAddr, S), Error>,
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError> + Send + Sync,
{
    let units = resolve_config_units(config_path.as_ref());
    let group = ServerGroup::build(&units, factory).await?;
    let event = wait_for_signal().await?;

    shutdown(&group, event, policy).await
}
