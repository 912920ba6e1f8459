//! Connectivity as seen by the scheduler.

use crate::config::NetworkRequirement;
use std::sync::atomic::{AtomicU8, Ordering};

/// Current connectivity of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// No connection.
    Offline,
    /// Connected over a metered link (mobile data).
    Metered,
    /// Connected over an unmetered link (Wi-Fi, ethernet).
    Unmetered,
}

impl NetworkState {
    /// Returns true if a job with `requirement` may run now.
    pub fn satisfies(&self, requirement: NetworkRequirement) -> bool {
        match requirement {
            NetworkRequirement::None => true,
            NetworkRequirement::Connected => !matches!(self, NetworkState::Offline),
            NetworkRequirement::Unmetered => matches!(self, NetworkState::Unmetered),
        }
    }

    fn to_code(self) -> u8 {
        match self {
            NetworkState::Offline => 0,
            NetworkState::Metered => 1,
            NetworkState::Unmetered => 2,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => NetworkState::Metered,
            2 => NetworkState::Unmetered,
            _ => NetworkState::Offline,
        }
    }
}

/// Reports connectivity to the runner.
pub trait NetworkMonitor: Send + Sync {
    /// Returns the current state.
    fn state(&self) -> NetworkState;
}

/// A monitor whose state is set by the host (or a test).
///
/// Platform code usually owns one of these and flips it from its
/// connectivity callbacks.
#[derive(Debug)]
pub struct StaticNetworkMonitor {
    state: AtomicU8,
}

impl StaticNetworkMonitor {
    /// Creates a monitor with an initial state.
    pub fn new(state: NetworkState) -> Self {
        Self {
            state: AtomicU8::new(state.to_code()),
        }
    }

    /// Updates the state.
    pub fn set(&self, state: NetworkState) {
        self.state.store(state.to_code(), Ordering::SeqCst);
    }
}

impl Default for StaticNetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkState::Unmetered)
    }
}

impl NetworkMonitor for StaticNetworkMonitor {
    fn state(&self) -> NetworkState {
        NetworkState::from_code(self.state.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirement_matrix() {
        use NetworkRequirement as R;
        use NetworkState as S;

        assert!(S::Offline.satisfies(R::None));
        assert!(!S::Offline.satisfies(R::Connected));
        assert!(!S::Offline.satisfies(R::Unmetered));

        assert!(S::Metered.satisfies(R::Connected));
        assert!(!S::Metered.satisfies(R::Unmetered));

        assert!(S::Unmetered.satisfies(R::Connected));
        assert!(S::Unmetered.satisfies(R::Unmetered));
    }

    #[test]
    fn static_monitor_updates() {
        let monitor = StaticNetworkMonitor::new(NetworkState::Offline);
        assert_eq!(monitor.state(), NetworkState::Offline);
        monitor.set(NetworkState::Metered);
        assert_eq!(monitor.state(), NetworkState::Metered);
    }
}
