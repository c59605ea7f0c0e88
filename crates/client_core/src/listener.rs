use tokio::task::JoinHandle;
use tracing::debug;

/// Keeps the session subscribed to wallet events. Disposing (or dropping)
/// stops event handling; release happens at most once.
#[derive(Debug)]
pub struct WalletListener {
    task: Option<JoinHandle<()>>,
}

impl WalletListener {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("session: wallet listeners removed");
        }
    }
}

impl Drop for WalletListener {
    fn drop(&mut self) {
        self.release();
    }
}
