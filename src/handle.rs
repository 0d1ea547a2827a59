use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::Notify;

/// One-shot notification: once fired it stays fired, so late waiters
/// resolve immediately instead of hanging on an event they missed.
#[derive(Debug, Default)]
struct NotifyOnce {
    fired: AtomicBool,
    notify: Notify,
}

impl NotifyOnce {
    fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        // Register before checking the flag so a fire() racing with this
        // call cannot slip between the check and the await.
        let notified = self.notify.notified();

        if !self.fired.load(Ordering::SeqCst) {
            notified.await;
        }
    }
}

/// Shared drain state for one managed server.
///
/// Cloned into the accept loop and every connection task; the server keeps
/// one clone to drive and observe shutdown. The connection count is the only
/// mutable shared state and is reachable solely through [`ConnectionGuard`].
#[derive(Clone, Debug, Default)]
pub(crate) struct ServerHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug, Default)]
struct HandleInner {
    conn_count: AtomicUsize,
    /// `begin_shutdown` has been called.
    draining: NotifyOnce,
    /// The accept loop has dropped its socket; from here a zero count is permanent.
    listener_closed: NotifyOnce,
    /// The count reached zero while draining.
    conn_end: NotifyOnce,
}

impl ServerHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.inner.conn_count.load(Ordering::SeqCst)
    }

    /// Flag the server as draining. The accept loop observes this and closes
    /// its listener; live connections observe it and stop keep-alive reuse.
    pub(crate) fn begin_shutdown(&self) {
        self.inner.draining.fire();
    }

    pub(crate) async fn draining(&self) {
        self.inner.draining.wait().await;
    }

    pub(crate) fn notify_listener_closed(&self) {
        self.inner.listener_closed.fire();
    }

    pub(crate) async fn listener_closed(&self) {
        self.inner.listener_closed.wait().await;
    }

    /// Resolves once every accepted connection has fully closed.
    ///
    /// Only meaningful after the listener is closed: before that the count
    /// can bounce between zero and nonzero as connections arrive, and a zero
    /// observed here would not be a stable termination condition.
    pub(crate) async fn connections_end(&self) {
        if self.inner.conn_count.load(Ordering::SeqCst) == 0 {
            return;
        }

        self.inner.conn_end.wait().await;
    }

    pub(crate) fn guard(&self) -> ConnectionGuard {
        ConnectionGuard::new(self.clone())
    }
}

/// RAII accounting for one accepted connection.
///
/// Increments the live-connection count on creation and decrements it on
/// drop, so every decrement is structurally matched to a prior increment and
/// the count can never go negative under any task interleaving.
#[derive(Debug)]
pub(crate) struct ConnectionGuard {
    handle: ServerHandle,
}

impl ConnectionGuard {
    fn new(handle: ServerHandle) -> Self {
        handle.inner.conn_count.fetch_add(1, Ordering::SeqCst);
        Self { handle }
    }

    /// Resolves once the owning server starts draining.
    pub(crate) async fn draining(&self) {
        self.handle.draining().await;
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self.handle.inner.conn_count.fetch_sub(1, Ordering::SeqCst) - 1;

        if count == 0 && self.handle.inner.draining.is_fired() {
            self.handle.inner.conn_end.fire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn count_settles_at_zero_under_concurrency() {
        let handle = ServerHandle::new();

        let mut tasks = Vec::new();
        for _ in 0..64 {
            let guard = handle.guard();
            tasks.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                drop(guard);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(handle.connection_count(), 0);
    }

    #[tokio::test]
    async fn connections_end_waits_for_last_guard() {
        let handle = ServerHandle::new();
        let guard = handle.guard();
        handle.begin_shutdown();

        // Still one live connection: must not resolve yet.
        let pending = timeout(Duration::from_millis(50), handle.connections_end()).await;
        assert!(pending.is_err());

        drop(guard);

        timeout(Duration::from_secs(1), handle.connections_end())
            .await
            .expect("connections_end should resolve once the count hits zero");
    }

    #[tokio::test]
    async fn connections_end_resolves_immediately_when_idle() {
        let handle = ServerHandle::new();
        handle.begin_shutdown();

        timeout(Duration::from_millis(50), handle.connections_end())
            .await
            .expect("no connections were ever accepted");
    }

    #[tokio::test]
    async fn draining_is_sticky() {
        let handle = ServerHandle::new();
        handle.begin_shutdown();

        // A waiter arriving after the fact must still resolve.
        timeout(Duration::from_millis(50), handle.draining())
            .await
            .expect("draining notification is one-shot but sticky");
    }

    #[tokio::test]
    async fn conn_end_does_not_fire_on_pre_shutdown_zero_crossing() {
        let handle = ServerHandle::new();

        // Count crosses zero before shutdown; conn_end must not fire early.
        drop(handle.guard());
        let guard = handle.guard();
        handle.begin_shutdown();

        let pending = timeout(Duration::from_millis(50), handle.connections_end()).await;
        assert!(pending.is_err());

        drop(guard);
        timeout(Duration::from_secs(1), handle.connections_end())
            .await
            .unwrap();
    }
}
