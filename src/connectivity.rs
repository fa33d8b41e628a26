//! Network reachability as seen by upload operations

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::ConnectivityConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStatus {
    pub connected: bool,
    /// Behind a captive portal: connected, but the internet is unreachable
    pub walled: bool,
    pub metered: bool,
}

impl ConnectivityStatus {
    pub const ONLINE: Self = Self {
        connected: true,
        walled: false,
        metered: false,
    };

    pub const OFFLINE: Self = Self {
        connected: false,
        walled: false,
        metered: false,
    };

    pub fn is_usable(&self) -> bool {
        self.connected && !self.walled
    }
}

pub trait ConnectivityOracle: Send + Sync {
    fn status(&self) -> ConnectivityStatus;
}

/// Oracle holding flags that are set from configuration or flipped by callers
#[derive(Debug)]
pub struct StaticConnectivity {
    connected: AtomicBool,
    walled: AtomicBool,
    metered: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(status: ConnectivityStatus) -> Self {
        Self {
            connected: AtomicBool::new(status.connected),
            walled: AtomicBool::new(status.walled),
            metered: AtomicBool::new(status.metered),
        }
    }

    pub fn online() -> Self {
        Self::new(ConnectivityStatus::ONLINE)
    }

    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(ConnectivityStatus {
            connected: config.connected,
            walled: config.walled,
            metered: config.metered,
        })
    }

    pub fn set(&self, status: ConnectivityStatus) {
        self.connected.store(status.connected, Ordering::SeqCst);
        self.walled.store(status.walled, Ordering::SeqCst);
        self.metered.store(status.metered, Ordering::SeqCst);
    }
}

impl ConnectivityOracle for StaticConnectivity {
    fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus {
            connected: self.connected.load(Ordering::SeqCst),
            walled: self.walled.load(Ordering::SeqCst),
            metered: self.metered.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_requires_unwalled_connection() {
        assert!(ConnectivityStatus::ONLINE.is_usable());
        assert!(!ConnectivityStatus::OFFLINE.is_usable());
        assert!(
            !ConnectivityStatus {
                connected: true,
                walled: true,
                metered: false,
            }
            .is_usable()
        );
    }

    #[test]
    fn test_static_oracle_can_flip() {
        let oracle = StaticConnectivity::online();
        assert_eq!(oracle.status(), ConnectivityStatus::ONLINE);

        oracle.set(ConnectivityStatus::OFFLINE);
        assert!(!oracle.status().connected);
    }
}
