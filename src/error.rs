use std::net::SocketAddr;
use std::{error::Error as StdError, fmt};

/// Boxed source error, type-erased so callers see one error surface.
type Source = Box<dyn StdError + Send + Sync + 'static>;

/// Errors produced while bringing the harness up.
///
/// Everything after startup is absorbed by policy (transient accept errors
/// are skipped, stuck drains are bounded by the watchdog), so the only
/// errors that surface to callers are startup errors.
pub struct Error {
    inner: ErrorImpl,
}

struct ErrorImpl {
    kind: Kind,
    source: Option<Source>,
}

#[derive(Debug)]
enum Kind {
    /// Binding or inspecting a listening socket failed. Fatal for the whole
    /// group: a partially initialized server set has no recovery story.
    Bind(SocketAddr),
    /// Installing a signal handler failed.
    Signal,
    /// The caller-supplied server factory rejected a configuration unit.
    Factory(String),
}

impl Error {
    pub(crate) fn bind(addr: SocketAddr, source: impl Into<Source>) -> Self {
        Self {
            inner: ErrorImpl {
                kind: Kind::Bind(addr),
                source: Some(source.into()),
            },
        }
    }

    pub(crate) fn signal(source: impl Into<Source>) -> Self {
        Self {
            inner: ErrorImpl {
                kind: Kind::Signal,
                source: Some(source.into()),
            },
        }
    }

    /// Constructs the error a server factory should return when it cannot
    /// produce a binding for a configuration unit.
    pub fn factory(unit: impl Into<String>, source: impl Into<Source>) -> Self {
        Self {
            inner: ErrorImpl {
                kind: Kind::Factory(unit.into()),
                source: Some(source.into()),
            },
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("roost::Error");

        f.field(&self.inner.kind);

        if let Some(source) = &self.inner.source {
            f.field(source);
        }

        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            Kind::Bind(addr) => write!(f, "failed to bind listener on {addr}"),
            Kind::Signal => f.write_str("failed to install signal handler"),
            Kind::Factory(unit) => write!(f, "server factory failed for {unit}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}
