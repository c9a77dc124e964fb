//! Keepalive pings and the inactivity watchdog
//!
//! Appliances silently drop clients at times without closing the TCP
//! connection. We ping periodically and force a disconnect once nothing at
//! all (data, ping or pong) has been received for the configured timeout,
//! which lets the owner reconnect.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::transport::TransportConfig;

/// Time of the last frame received on a connection
#[derive(Debug)]
pub struct Liveness {
    last_received: Mutex<Instant>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            last_received: Mutex::new(Instant::now()),
        }
    }

    /// Record that a frame of any kind arrived
    pub fn touch(&self) {
        *self.last_received.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_received.lock().elapsed()
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// The connection the checks act upon
pub trait KeepaliveTarget: Send + Sync + 'static {
    fn send_ping(&self);
    fn is_open(&self) -> bool;
    fn force_disconnect(&self);
}

/// Running ping and watchdog tasks of one connection
///
/// Both tasks stop together on [`ConnectionChecks::stop`], when the token
/// passed to [`ConnectionChecks::start`] is cancelled, or on drop.
pub struct ConnectionChecks {
    cancel: CancellationToken,
}

impl ConnectionChecks {
    pub fn start<T: KeepaliveTarget>(
        config: &TransportConfig,
        liveness: Arc<Liveness>,
        target: Arc<T>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();

        let mut ping = interval_at(now + config.ping_initial_delay, config.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ping_target = target.clone();
        let ping_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ping_cancel.cancelled() => break,
                    _ = ping.tick() => {
                        if ping_target.is_open() {
                            trace!("Sending keepalive ping");
                            ping_target.send_ping();
                        }
                    }
                }
            }
        });

        let mut check = interval_at(
            now + config.inactivity_check_delay,
            config.inactivity_check_interval,
        );
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let timeout = config.inactivity_timeout;
        let check_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = check_cancel.cancelled() => break,
                    _ = check.tick() => {
                        let idle = liveness.idle_for();
                        if target.is_open() && idle > timeout {
                            warn!("No frame received for {:?}, forcing disconnect", idle);
                            target.force_disconnect();
                            break;
                        }
                    }
                }
            }
        });

        Self { cancel }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ConnectionChecks {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Probe {
        pings: AtomicUsize,
        forced: AtomicUsize,
        closed: AtomicBool,
    }

    impl KeepaliveTarget for Probe {
        fn send_ping(&self) {
            self.pings.fetch_add(1, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        fn force_disconnect(&self) {
            self.forced.fetch_add(1, Ordering::SeqCst);
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_on_schedule() {
        let probe = Arc::new(Probe::default());
        let liveness = Arc::new(Liveness::new());
        let _checks = ConnectionChecks::start(
            &TransportConfig::default(),
            liveness.clone(),
            probe.clone(),
            CancellationToken::new(),
        );

        tokio::time::sleep(secs(4)).await;
        assert_eq!(probe.pings.load(Ordering::SeqCst), 0);

        tokio::time::sleep(secs(2)).await;
        assert_eq!(probe.pings.load(Ordering::SeqCst), 1);

        // keep the watchdog quiet
        liveness.touch();
        tokio::time::sleep(secs(30)).await;
        assert_eq!(probe.pings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_forces_disconnect_when_silent() {
        let probe = Arc::new(Probe::default());
        let _checks = ConnectionChecks::start(
            &TransportConfig::default(),
            Arc::new(Liveness::new()),
            probe.clone(),
            CancellationToken::new(),
        );

        tokio::time::sleep(secs(59)).await;
        assert_eq!(probe.forced.load(Ordering::SeqCst), 0);

        tokio::time::sleep(secs(11)).await;
        assert_eq!(probe.forced.load(Ordering::SeqCst), 1);

        // no repeated disconnects once closed
        tokio::time::sleep(secs(120)).await;
        assert_eq!(probe.forced.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_traffic_keeps_connection_alive() {
        let probe = Arc::new(Probe::default());
        let liveness = Arc::new(Liveness::new());
        let _checks = ConnectionChecks::start(
            &TransportConfig::default(),
            liveness.clone(),
            probe.clone(),
            CancellationToken::new(),
        );

        for _ in 0..10 {
            tokio::time::sleep(secs(20)).await;
            liveness.touch();
        }
        assert_eq!(probe.forced.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_both_tasks() {
        let probe = Arc::new(Probe::default());
        let checks = ConnectionChecks::start(
            &TransportConfig::default(),
            Arc::new(Liveness::new()),
            probe.clone(),
            CancellationToken::new(),
        );
        checks.stop();

        tokio::time::sleep(secs(300)).await;
        assert_eq!(probe.pings.load(Ordering::SeqCst), 0);
        assert_eq!(probe.forced.load(Ordering::SeqCst), 0);
    }
}
