use crate::error::Error;
use tracing::info;

/// The termination signals the harness subscribes to.
///
/// SIGHUP is documented as "graceful restart" in the deployment model this
/// harness comes from, but no restart protocol is wired here, so it is
/// deliberately not subscribed and keeps its default disposition — as does
/// every other signal not listed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGINT: drain connections, then exit.
    Interrupt,
    /// SIGTERM: exit immediately.
    Terminate,
    /// SIGQUIT: exit immediately.
    Quit,
}

/// Which shutdown protocol a signal selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// Stop intake, drain connections under the watchdog, then exit.
    Graceful,
    /// Exit on the spot, draining nothing.
    Immediate,
}

impl SignalEvent {
    pub fn protocol(self) -> Protocol {
        match self {
            SignalEvent::Interrupt => Protocol::Graceful,
            SignalEvent::Terminate | SignalEvent::Quit => Protocol::Immediate,
        }
    }
}

/// Blocks until one of SIGINT, SIGTERM or SIGQUIT arrives and reports which,
/// as an explicit value rather than ambient process state.
///
/// Meant to be consumed exactly once per process lifetime; the harness is
/// not designed for repeated signal handling.
#[cfg(unix)]
pub async fn wait_for_signal() -> Result<SignalEvent, Error> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).map_err(Error::signal)?;
    let mut terminate = signal(SignalKind::terminate()).map_err(Error::signal)?;
    let mut quit = signal(SignalKind::quit()).map_err(Error::signal)?;

    let event = tokio::select! {
        _ = interrupt.recv() => SignalEvent::Interrupt,
        _ = terminate.recv() => SignalEvent::Terminate,
        _ = quit.recv() => SignalEvent::Quit,
    };

    info!(signal = ?event, "termination signal received");
    Ok(event)
}

/// Non-Unix platforms only have Ctrl-C, which maps to the graceful path.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> Result<SignalEvent, Error> {
    tokio::signal::ctrl_c().await.map_err(Error::signal)?;

    info!("Ctrl-C received");
    Ok(SignalEvent::Interrupt)
}
