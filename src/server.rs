use crate::handle::ServerHandle;
use crate::tcp;
use crate::BoxError;
use http::{Request, Response};
use http_body::Body;
use hyper::body::Incoming;
use hyper::service::Service;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnectionBuilder;
use std::io;
use std::net::SocketAddr;
use std::pin::pin;
use tokio::net::TcpListener;
use tokio_stream::{wrappers::TcpListenerStream, StreamExt};
use tracing::{debug, trace};

/// One listening socket, the opaque service behind it, and the drain state of
/// every connection accepted from it.
///
/// The accept loop runs as an independent task for the life of the process.
/// Shutdown is a one-way transition: [`begin_shutdown`](Self::begin_shutdown)
/// stops intake, [`wait`](Self::wait) observes the drain. There is no way to
/// re-arm a server.
pub struct ManagedServer {
    addr: SocketAddr,
    handle: ServerHandle,
}

impl ManagedServer {
    /// Spawns the accept loop for `listener`, serving each accepted
    /// connection with a clone of `service` on its own task.
    ///
    /// Connections are served through hyper's auto builder, so both HTTP/1
    /// and HTTP/2 are negotiated per connection. The only fallible step is
    /// reading the listener's local address. Must be called from within a
    /// Tokio runtime.
    pub fn start<S, B>(listener: TcpListener, service: S) -> io::Result<Self>
    where
        S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<BoxError> + Send,
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<BoxError> + Send + Sync,
    {
        let addr = listener.local_addr()?;
        let handle = ServerHandle::new();

        let loop_handle = handle.clone();
        tokio::spawn(async move {
            accept_loop(listener, service, loop_handle.clone()).await;
            // The loop owned the socket; returning dropped it, so the OS now
            // refuses new connections and the count can only go down.
            loop_handle.notify_listener_closed();
        });

        Ok(Self { addr, handle })
    }

    /// The address this server is accepting connections on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The number of connections currently accounted as live.
    pub fn connection_count(&self) -> usize {
        self.handle.connection_count()
    }

    /// Stops this server accepting new connections and disables keep-alive
    /// reuse on the connections it is still serving, so each closes after
    /// its in-flight exchange instead of going idle.
    ///
    /// Expected to be called at most once; there is no way back to serving.
    pub fn begin_shutdown(&self) {
        self.handle.begin_shutdown();
    }

    /// Resolves once the listener is closed and every accepted connection
    /// has fully closed.
    ///
    /// Call only after [`begin_shutdown`](Self::begin_shutdown): while the
    /// listener is still open a zero count is transient, so this waits for
    /// the listener to close before it starts watching the count.
    pub async fn wait(&self) {
        self.handle.listener_closed().await;
        self.handle.connections_end().await;
    }
}

/// Accepts until shutdown is flagged or a fatal accept error ends the
/// stream. Owns the listener; dropping it on return is what closes the
/// socket.
async fn accept_loop<S, B>(listener: TcpListener, service: S, handle: ServerHandle)
where
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError> + Send + Sync,
{
    let incoming = tcp::incoming_stream(TcpListenerStream::new(listener));
    let mut incoming = pin!(incoming);
    let builder = HttpConnectionBuilder::new(TokioExecutor::new());

    loop {
        let io = tokio::select! {
            biased;
            _ = handle.draining() => return,
            io = incoming.next() => match io {
                Some(Ok(io)) => io,
                Some(Err(e)) => {
                    debug!(error = %e, "fatal accept error, closing listener");
                    return;
                }
                None => return,
            },
        };

        trace!("connection accepted");

        let guard = handle.guard();
        let service = service.clone();
        let builder = builder.clone();

        tokio::spawn(async move {
            let hyper_io = TokioIo::new(io);
            let mut conn = pin!(builder.serve_connection_with_upgrades(hyper_io, service));

            tokio::select! {
                biased;
                _ = guard.draining() => {
                    // Stop keep-alive reuse; the connection ends after its
                    // in-flight exchange instead of going idle.
                    conn.as_mut().graceful_shutdown();
                    if let Err(e) = conn.await {
                        debug!("error serving connection during drain: {:#}", e);
                    }
                }
                rv = conn.as_mut() => {
                    if let Err(e) = rv {
                        debug!("error serving connection: {:#}", e);
                    }
                }
            }

            drop(guard);
            trace!("connection closed");
        });
    }
}
