//! The execution gate: a binary idle/busy signal over a watch channel.

use tokio::sync::watch;

/// Gates command delivery to the hosted process.
///
/// Starts idle. `wait_idle` suspends the caller on the watch channel rather
/// than polling; every pending waiter is released on the busy-to-idle
/// transition, with no ordering guarantee between them.
pub struct ExecutionGate {
    tx: watch::Sender<bool>,
}

impl ExecutionGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self { tx }
    }

    pub fn set_busy(&self) {
        self.tx.send_replace(false);
    }

    pub fn set_idle(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_idle(&self) -> bool {
        *self.tx.borrow()
    }

    /// Suspend until the gate reports idle. Returns immediately if idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // The gate owns the sender, so wait_for cannot observe a closed
        // channel while `self` is alive.
        let _ = rx.wait_for(|idle| *idle).await;
    }
}

impl Default for ExecutionGate {
    fn default() -> Self {
        Self::new()
    }
}
