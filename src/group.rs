use crate::error::Error;
use crate::server::ManagedServer;
use crate::BoxError;
use http::{Request, Response};
use http_body::Body;
use hyper::body::Incoming;
use hyper::service::Service;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::info;

/// The fixed set of servers sharing this process, one per configuration
/// unit. Membership never changes after construction.
pub struct ServerGroup {
    servers: Vec<ManagedServer>,
}

impl ServerGroup {
    /// Binds one listener per configuration unit, in order, and starts a
    /// [`ManagedServer`] on each.
    ///
    /// The factory maps a configuration unit to the address to bind and the
    /// service to run there; it is entirely opaque to the harness. Any
    /// factory or bind failure fails the whole build — a partially
    /// initialized group is never returned, and the spawned accept loops die
    /// with the process when the caller exits on the error.
    pub async fn build<S, B, F>(units: &[PathBuf], mut factory: F) -> Result<Self, Error>
    where
        F: FnMut(&Path) -> Result<(SocketAddr, S), Error>,
        S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<BoxError> + Send,
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<BoxError> + Send + Sync,
    {
        let mut servers = Vec::with_capacity(units.len());

        for unit in units {
            let (addr, service) = factory(unit)?;
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| Error::bind(addr, e))?;
            let server =
                ManagedServer::start(listener, service).map_err(|e| Error::bind(addr, e))?;

            info!(addr = %server.local_addr(), unit = %unit.display(), "listener bound");
            servers.push(server);
        }

        Ok(Self { servers })
    }

    /// All servers, in configuration order.
    pub fn servers(&self) -> &[ManagedServer] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;
    use hyper_util::service::TowerToHyperService;
    use std::convert::Infallible;

    async fn echo(_req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        Ok(Response::new(Full::new(Bytes::from("ok"))))
    }

    #[tokio::test]
    async fn builds_one_server_per_unit() {
        let units = vec![PathBuf::from("a.conf"), PathBuf::from("b.conf")];

        let group = ServerGroup::build(&units, |_unit| {
            Ok((
                SocketAddr::from(([127, 0, 0, 1], 0)),
                TowerToHyperService::new(tower::service_fn(echo)),
            ))
        })
        .await
        .unwrap();

        assert_eq!(group.len(), 2);
        // Ephemeral ports: every server got its own socket.
        assert_ne!(
            group.servers()[0].local_addr(),
            group.servers()[1].local_addr()
        );
    }

    #[tokio::test]
    async fn bind_failure_fails_the_whole_build() {
        // Take a port, then ask the group to bind it again.
        let taken = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = taken.local_addr().unwrap();

        let units = vec![PathBuf::from("a.conf")];
        let result = ServerGroup::build(&units, |_unit| {
            Ok((addr, TowerToHyperService::new(tower::service_fn(echo))))
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn factory_failure_fails_the_whole_build() {
        let units = vec![PathBuf::from("a.conf"), PathBuf::from("bad.conf")];

        let result = ServerGroup::build(&units, |unit| {
            if unit.ends_with("bad.conf") {
                Err(Error::factory(
                    unit.display().to_string(),
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "unparseable"),
                ))
            } else {
                Ok((
                    SocketAddr::from(([127, 0, 0, 1], 0)),
                    TowerToHyperService::new(tower::service_fn(echo)),
                ))
            }
        })
        .await;

        assert!(result.is_err());
    }
}
