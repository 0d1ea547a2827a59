use crate::group::ServerGroup;
use crate::signal::{Protocol, SignalEvent};
use std::process;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Timing policy for the graceful protocol.
#[derive(Clone, Copy, Debug)]
pub struct GracePolicy {
    /// Hard deadline on the whole drain; the watchdog exits the process when
    /// it elapses, whatever state the drain is in.
    pub grace_period: Duration,
    /// Pause between successive per-server drain waits, staggering teardown
    /// work (log flushes, downstream cleanup) instead of letting every
    /// server finish at once.
    pub inter_server_pause: Duration,
}

impl Default for GracePolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5 * 60),
            inter_server_pause: Duration::from_secs(5),
        }
    }
}

/// Drives the process out of the running state in response to `event`.
///
/// An interrupt runs the graceful protocol: every listener stops accepting
/// before the first drain wait starts, then servers drain one at a time
/// under the watchdog's hard deadline. Terminate and quit exit on the spot
/// with no drain. Every path ends in `process::exit(0)`; this never returns.
pub async fn shutdown(group: &ServerGroup, event: SignalEvent, policy: GracePolicy) -> ! {
    if let Protocol::Graceful = event.protocol() {
        graceful_shutdown(group, policy).await;
    }

    process::exit(0)
}

async fn graceful_shutdown(group: &ServerGroup, policy: GracePolicy) {
    info!(servers = group.len(), "graceful shutdown started");

    // Close every listener before the first drain wait so no server keeps
    // accepting work while another is already draining.
    for server in group.servers() {
        server.begin_shutdown();
    }

    // The watchdog is never cancelled. If the drain finishes first, the
    // process exits before the timer fires; if a connection never closes,
    // this exit is the one that happens. Whichever calls exit first wins,
    // and the watchdog winning is a normal outcome, not an error.
    let grace_period = policy.grace_period;
    tokio::spawn(async move {
        sleep(grace_period).await;
        warn!(?grace_period, "grace period expired with connections still open, exiting");
        process::exit(0);
    });

    drain_group(group, policy.inter_server_pause).await;
    info!("all servers drained");
}

/// Waits for each server, in group order, to drain to zero connections,
/// pausing between successive waits.
pub(crate) async fn drain_group(group: &ServerGroup, pause: Duration) {
    for (i, server) in group.servers().iter().enumerate() {
        if i > 0 {
            sleep(pause).await;
        }

        server.wait().await;
        debug!(addr = %server.local_addr(), "server drained");
    }
}
