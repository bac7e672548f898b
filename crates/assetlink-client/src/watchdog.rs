//! Connection watchdog.
//!
//! Two phases: a one-shot grace period after connect that ends at the first
//! inbound packet, then a recheck window restarted by every packet. When
//! either expires a local `Suspend(ConnectionCheckFailed)` is pushed into
//! the inbound queue and the demultiplexer performs the teardown.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use assetlink_core::config::WatchdogConfig;
use assetlink_core::wire::{ErrorType, Packet};

#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    grace: Duration,
    recheck: Duration,
}

impl Watchdog {
    pub fn new(grace: Duration, recheck: Duration) -> Self {
        Self { grace, recheck }
    }

    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::new(config.grace(), config.recheck())
    }

    /// Watch `activity` until it closes or a timer fires.
    ///
    /// Returns true if the watchdog fired.
    pub async fn run(
        self,
        mut activity: mpsc::Receiver<()>,
        inbound: mpsc::UnboundedSender<Packet>,
    ) -> bool {
        tokio::select! {
            _ = time::sleep(self.grace) => {
                tracing::warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "no packet within grace period"
                );
                return fire(&inbound);
            }
            seen = activity.recv() => {
                if seen.is_none() {
                    return false;
                }
            }
        }

        loop {
            match time::timeout(self.recheck, activity.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return false,
                Err(_) => {
                    tracing::warn!(
                        recheck_ms = self.recheck.as_millis() as u64,
                        "connection silent, recheck failed"
                    );
                    return fire(&inbound);
                }
            }
        }
    }
}

fn fire(inbound: &mpsc::UnboundedSender<Packet>) -> bool {
    // A closed inbound queue means the demultiplexer is already gone.
    inbound
        .send(Packet::suspend(ErrorType::ConnectionCheckFailed))
        .is_ok()
}
