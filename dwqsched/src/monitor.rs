use std::time::Duration;

use tokio::sync::{
    mpsc,
    watch,
};
use tokio::time::{
    self,
    Instant,
};

use dwqcore::constraint::{NetworkState, Signals};

/// Minimum hold between published signal changes; transient flaps
/// inside the window collapse to their final value.
const DEBOUNCE_HOLD: Duration = Duration::from_secs(1);

/// Observes host-reported device signals and publishes debounced
/// transitions to the scheduler.
pub struct SignalMonitor {
    watch_tx: watch::Sender<Signals>,
    raw_rx: mpsc::UnboundedReceiver<Signals>,
    hold: Duration,
}

/// Host-held handle reporting raw signal transitions.
pub struct SignalSource {
    raw_tx: mpsc::UnboundedSender<Signals>,
    last: Signals,
}

impl SignalMonitor {
    pub fn new(initial: Signals) -> (Self, SignalSource) {
        let (watch_tx, _) = watch::channel(initial);
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        (
            Self {
                watch_tx,
                raw_rx,
                hold: DEBOUNCE_HOLD,
            },
            SignalSource {
                raw_tx,
                last: initial,
            },
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<Signals> {
        self.watch_tx.subscribe()
    }

    /// Consume raw reports until every source is dropped.
    pub async fn run(mut self) {
        log::debug!("signal monitor starting");
        // the first report goes through immediately
        let mut last_publish: Option<Instant> = None;
        while let Some(mut next) = self.raw_rx.recv().await {
            if let Some(eligible) = last_publish.map(|t| t + self.hold) {
                if Instant::now() < eligible {
                    // hold the flap; newer reports supersede the pending one
                    loop {
                        tokio::select! {
                            _ = time::sleep_until(eligible) => break,
                            more = self.raw_rx.recv() => match more {
                                Some(signals) => next = signals,
                                None => break,
                            },
                        }
                    }
                }
            }
            if next != *self.watch_tx.borrow() {
                log::debug!("signals transitioned: {next:?}");
                self.watch_tx.send_replace(next);
                last_publish = Some(Instant::now());
            }
        }
        log::debug!("signal monitor stopping");
    }
}

impl SignalSource {
    /// Replace the whole snapshot.
    pub fn report(&mut self, signals: Signals) {
        self.last = signals;
        self.send();
    }

    pub fn set_network(&mut self, network: NetworkState) {
        self.last.network = network;
        self.send();
    }

    pub fn set_charging(&mut self, charging: bool) {
        self.last.charging = charging;
        self.send();
    }

    pub fn set_battery_low(&mut self, battery_low: bool) {
        self.last.battery_low = battery_low;
        self.send();
    }

    pub fn set_storage_low(&mut self, storage_low: bool) {
        self.last.storage_low = storage_low;
        self.send();
    }

    pub fn set_device_idle(&mut self, device_idle: bool) {
        self.last.device_idle = device_idle;
        self.send();
    }

    fn send(&self) {
        if self.raw_tx.send(self.last).is_err() {
            log::debug!("signal report dropped; monitor is no longer listening");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_report_publishes_immediately() {
        let (monitor, mut source) = SignalMonitor::new(Signals::default());
        let mut watch_rx = monitor.subscribe();
        tokio::spawn(monitor.run());

        source.set_network(NetworkState::Unmetered);
        tokio::time::timeout(Duration::from_millis(100), watch_rx.changed())
            .await
            .expect("published within the window")
            .expect("monitor alive");
        assert_eq!(watch_rx.borrow().network, NetworkState::Unmetered);
    }

    #[tokio::test(start_paused = true)]
    async fn flaps_collapse_to_final_value() {
        let (monitor, mut source) = SignalMonitor::new(Signals::default());
        let mut watch_rx = monitor.subscribe();
        tokio::spawn(monitor.run());

        source.set_network(NetworkState::Unmetered);
        watch_rx.changed().await.expect("monitor alive");

        // flap within the hold window
        source.set_network(NetworkState::Offline);
        source.set_network(NetworkState::Metered);

        watch_rx.changed().await.expect("monitor alive");
        assert_eq!(watch_rx.borrow().network, NetworkState::Metered);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_snapshot_is_not_republished() {
        let (monitor, mut source) = SignalMonitor::new(Signals::default());
        let mut watch_rx = monitor.subscribe();
        tokio::spawn(monitor.run());

        source.report(Signals::default());
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            watch_rx.changed(),
        ).await;
        assert!(result.is_err(), "no transition expected");
    }
}
