//! Grouped teardown for the listeners a session attaches.

use crate::renderer::Subscription;

/// Collects listener subscriptions and releases them together, exactly once.
#[derive(Default)]
pub struct Disposer {
    subscriptions: Vec<Subscription>,
    disposed: bool,
}

impl Disposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `subscription` attached until disposal.
    pub fn add_subscription(&mut self, subscription: Subscription) {
        if self.disposed {
            // Dropping detaches immediately.
            return;
        }
        self.subscriptions.push(subscription);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release everything. Returns `false` if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        for subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
        true
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        self.dispose();
    }
}
