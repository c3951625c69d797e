//! Fallback values applied when a configuration document omits a setting.

/// Delay between two walks of a watched directory.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
/// Capacity of the channel between pollers and the coordinator.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

pub(crate) const fn poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

pub(crate) const fn event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}
