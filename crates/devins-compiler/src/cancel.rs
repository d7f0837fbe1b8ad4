//! Cancellation token shared by a compile call and its capability calls

use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation flag
///
/// Clones observe the same flag. The compiler checks it before every node
/// and passes it to each capability call, which should abort promptly once
/// [`cancelled`](Self::cancelled) resolves.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // Only fails once the sender is dropped, and `self` holds it.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}
