use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::{error::LinkError, types::LinkState};

pub trait WifiLink {
    /// Kicks off association with the configured access point. Must not block
    /// until the link is up; progress is observed through `is_connected`.
    fn begin_association(&mut self) -> Result<(), LinkError>;

    fn is_connected(&mut self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ConnectivityState {
    link: LinkState,
    backend_reachable: bool,
    consecutive_failures: u32,
    delivered: u64,
    failed: u64,
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self {
            link: LinkState::Disconnected,
            backend_reachable: false,
            consecutive_failures: 0,
            delivered: 0,
            failed: 0,
        }
    }
}

impl ConnectivityState {
    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn wifi_connected(&self) -> bool {
        self.link == LinkState::Connected
    }

    pub fn backend_reachable(&self) -> bool {
        self.backend_reachable
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn begin_connecting(&mut self) {
        self.link = LinkState::Connecting;
    }

    pub fn mark_connected(&mut self) {
        self.link = LinkState::Connected;
    }

    pub fn mark_disconnected(&mut self) {
        self.link = LinkState::Disconnected;
    }

    pub fn record_probe(&mut self, reachable: bool) {
        self.backend_reachable = reachable;
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.backend_reachable = true;
        self.delivered = self.delivered.saturating_add(1);
    }

    /// Counts one failed delivery. Reachability only drops once the streak
    /// reaches `max_failures`; returns `true` on the failure that drops it.
    pub fn record_failure(&mut self, max_failures: u32) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.failed = self.failed.saturating_add(1);

        if self.consecutive_failures >= max_failures && self.backend_reachable {
            self.backend_reachable = false;
            return true;
        }
        false
    }
}

/// Starts association and polls the link up to `attempts` times,
/// `poll_interval_ms` apart. Returns whether the link came up.
pub fn associate<L, D>(link: &mut L, delay: &mut D, attempts: u32, poll_interval_ms: u32) -> bool
where
    L: WifiLink + ?Sized,
    D: DelayNs + ?Sized,
{
    if let Err(err) = link.begin_association() {
        warn!("wifi association request failed: {err}");
    }

    for attempt in 1..=attempts {
        if link.is_connected() {
            info!("wifi associated after {attempt} poll(s)");
            return true;
        }
        delay.delay_ms(poll_interval_ms);
    }

    let connected = link.is_connected();
    if !connected {
        warn!(
            "wifi not associated after {attempts} polls ({} ms)",
            u64::from(attempts) * u64::from(poll_interval_ms)
        );
    }
    connected
}
