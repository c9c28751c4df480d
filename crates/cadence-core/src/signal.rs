//! Process-wide boolean signals observed by the sync engine.
//!
//! The platform adapter owns the writes (`set_online`, `set_foreground`); the
//! store and the orchestrator only read and subscribe. Clones share state.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
struct Flag {
    tx: Arc<watch::Sender<bool>>,
}

impl Flag {
    fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    fn get(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns true when the value changed and subscribers were notified.
    fn set(&self, value: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Online/offline state of the network connection
#[derive(Debug, Clone)]
pub struct Connectivity(Flag);

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self(Flag::new(online))
    }

    pub fn is_online(&self) -> bool {
        self.0.get()
    }

    /// Record a connectivity change; repeated values do not notify
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.0.set(online);
        if changed {
            tracing::debug!(online, "Connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

/// Whether the host application is in the foreground
#[derive(Debug, Clone)]
pub struct Visibility(Flag);

impl Visibility {
    pub fn new(foreground: bool) -> Self {
        Self(Flag::new(foreground))
    }

    pub fn is_foreground(&self) -> bool {
        self.0.get()
    }

    pub fn set_foreground(&self, foreground: bool) -> bool {
        self.0.set(foreground)
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let connectivity = Connectivity::new(false);
        let observer = connectivity.clone();

        assert!(connectivity.set_online(true));
        assert!(observer.is_online());
    }

    #[test]
    fn repeated_values_do_not_notify() {
        let visibility = Visibility::default();
        assert!(!visibility.set_foreground(true));
        assert!(visibility.set_foreground(false));
        assert!(!visibility.is_foreground());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_observe_transitions() {
        let connectivity = Connectivity::new(false);
        let mut rx = connectivity.subscribe();

        connectivity.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
