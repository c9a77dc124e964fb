//! Single-shot reconnect scheduling
//!
//! At most one reconnect is pending at any time. Once disposed, nothing is
//! scheduled again and a pending attempt never fires.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default delay before reconnecting
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(60);

type FireFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ReconnectState {
    pending: Option<JoinHandle<()>>,
    disposed: bool,
}

/// Timer that triggers a reconnect after a fixed delay
pub struct Reconnector {
    delay: Duration,
    state: Arc<Mutex<ReconnectState>>,
    on_fire: FireFn,
}

impl Reconnector {
    pub fn new(delay: Duration, on_fire: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(ReconnectState::default())),
            on_fire: Arc::new(on_fire),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule a reconnect. Returns false when one is already pending or
    /// the reconnector has been disposed.
    pub fn schedule(&self) -> bool {
        let mut state = self.state.lock();
        if state.disposed || state.pending.is_some() {
            return false;
        }

        let delay = self.delay;
        let shared = self.state.clone();
        let on_fire = self.on_fire.clone();
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = shared.lock();
                if state.disposed {
                    return;
                }
                state.pending = None;
            }
            on_fire();
        }));
        debug!("Reconnect scheduled in {:?}", delay);
        true
    }

    /// Drop a pending reconnect, if any
    pub fn cancel(&self) {
        if let Some(handle) = self.state.lock().pending.take() {
            handle.abort();
            debug!("Pending reconnect cancelled");
        }
    }

    /// Cancel and refuse all future scheduling
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        state.disposed = true;
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl Drop for Reconnector {
    fn drop(&mut self) {
        self.dispose();
    }
}
