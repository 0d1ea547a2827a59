use crate::BoxError;
use std::{io, ops::ControlFlow};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Decides whether an accept-stage error tears the loop down.
///
/// Transient per-connection failures keep the loop alive; anything else is
/// fatal for the listener and ends its accept loop.
fn handle_accept_error(e: impl Into<BoxError>) -> ControlFlow<BoxError> {
    let e = e.into();

    debug!(error = %e, "accept loop error");

    if let Some(e) = e.downcast_ref::<io::Error>() {
        if matches!(
            e.kind(),
            io::ErrorKind::ConnectionAborted // peer went away mid-handshake
                | io::ErrorKind::Interrupted
                | io::ErrorKind::InvalidData
                | io::ErrorKind::WouldBlock
        ) {
            return ControlFlow::Continue(());
        }
    }

    ControlFlow::Break(e)
}

/// Wraps a raw listener stream, skipping transient accept errors and
/// terminating the stream on a fatal one.
pub(crate) fn incoming_stream<IO, IE>(
    incoming: impl Stream<Item = Result<IO, IE>> + Send + 'static,
) -> impl Stream<Item = Result<IO, BoxError>>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    IE: Into<BoxError> + Send + 'static,
{
    async_stream::stream! {
        let mut incoming = Box::pin(incoming);

        while let Some(item) = incoming.next().await {
            match item {
                Ok(io) => yield Ok(io),
                Err(e) => match handle_accept_error(e.into()) {
                    ControlFlow::Continue(()) => continue,
                    ControlFlow::Break(e) => yield Err(e),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio_stream::iter;

    fn accepted() -> Result<DuplexStream, io::Error> {
        let (a, _b) = tokio::io::duplex(8);
        Ok(a)
    }

    #[tokio::test]
    async fn transient_errors_are_skipped() {
        let transient = [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::Interrupted,
            io::ErrorKind::InvalidData,
            io::ErrorKind::WouldBlock,
        ];

        for kind in transient {
            let error = io::Error::new(kind, "transient");
            assert!(matches!(
                handle_accept_error(error),
                ControlFlow::Continue(())
            ));
        }
    }

    #[tokio::test]
    async fn other_errors_are_fatal() {
        let error = io::Error::new(io::ErrorKind::PermissionDenied, "fatal");
        assert!(matches!(handle_accept_error(error), ControlFlow::Break(_)));
    }

    #[tokio::test]
    async fn stream_survives_transient_and_stops_on_fatal() {
        let incoming = iter(vec![
            accepted(),
            Err(io::Error::new(io::ErrorKind::WouldBlock, "again")),
            accepted(),
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
        ]);
        let mut stream = Box::pin(incoming_stream(incoming));

        assert!(stream.next().await.unwrap().is_ok());
        // The WouldBlock item is swallowed.
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_stream_ends() {
        let incoming = iter(Vec::<Result<DuplexStream, io::Error>>::new());
        let mut stream = Box::pin(incoming_stream(incoming));

        assert!(stream.next().await.is_none());
    }
}
