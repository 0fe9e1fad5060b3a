//! One client's interest in one location.

use std::fmt;

use telemetry_protocol::TickInterval;
use telemetry_types::ClientId;

/// How often a registration fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateInterval {
    /// Fire every this many ticks.
    Every(TickInterval),
    /// Fire once, never again.
    Never,
}

impl fmt::Display for UpdateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every(interval) => write!(f, "every {interval}"),
            Self::Never => f.write_str("once"),
        }
    }
}

/// Server-side record of one client's interest in one location.
///
/// A registration fires on the first sweep whose tick is strictly greater
/// than `next_update_tick`, and is dropped on the first sweep whose tick is
/// strictly greater than `expiry_tick`. A one-shot registration starts out
/// both due and expired, so the next sweep fires it once and removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The interested client.
    pub client: ClientId,
    /// How often to fire.
    pub interval: UpdateInterval,
    /// Fire once the current tick passes this.
    pub next_update_tick: u64,
    /// Drop once the current tick passes this.
    pub expiry_tick: u64,
}

impl Registration {
    /// A one-shot registration created at `current_tick`.
    pub const fn single(client: ClientId, current_tick: u64) -> Self {
        Self {
            client,
            interval: UpdateInterval::Never,
            next_update_tick: current_tick.saturating_sub(1),
            expiry_tick: current_tick.saturating_sub(1),
        }
    }

    /// A subscription created at `current_tick`, first due one interval
    /// later.
    pub fn subscription(
        client: ClientId,
        interval: TickInterval,
        current_tick: u64,
        max_age_ticks: u64,
    ) -> Self {
        Self {
            client,
            interval: UpdateInterval::Every(interval),
            next_update_tick: current_tick.saturating_add(u64::from(interval.get())),
            expiry_tick: current_tick.saturating_add(max_age_ticks),
        }
    }

    /// Whether the registration outlived its expiry window.
    pub const fn is_expired(&self, current_tick: u64) -> bool {
        current_tick > self.expiry_tick
    }

    /// If the registration is due at `current_tick`, schedule the next
    /// firing and return `true`.
    pub fn poll_due(&mut self, current_tick: u64) -> bool {
        if current_tick <= self.next_update_tick {
            return false;
        }
        self.next_update_tick = match self.interval {
            UpdateInterval::Every(interval) => current_tick.saturating_add(u64::from(interval.get())),
            UpdateInterval::Never => u64::MAX,
        };
        true
    }

    /// Push the expiry window forward and adopt `interval`. A shorter
    /// interval pulls the next firing closer; a longer one never delays a
    /// firing that is already scheduled.
    pub fn renew(&mut self, interval: TickInterval, current_tick: u64, max_age_ticks: u64) {
        self.interval = UpdateInterval::Every(interval);
        self.expiry_tick = current_tick.saturating_add(max_age_ticks);
        let candidate = current_tick.saturating_add(u64::from(interval.get()));
        self.next_update_tick = self.next_update_tick.min(candidate);
    }

    /// Make the registration fire on the next sweep without touching its
    /// expiry.
    pub fn fire_next_sweep(&mut self, current_tick: u64) {
        self.next_update_tick = self.next_update_tick.min(current_tick.saturating_sub(1));
    }
}
