use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Connectivity observer consulted when classifying load failures.
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;
}

pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Flag flipped by whatever watches the host's connectivity.
#[derive(Debug, Clone)]
pub struct SharedNetworkStatus {
    online: Arc<AtomicBool>,
}

impl SharedNetworkStatus {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl Default for SharedNetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkStatus for SharedNetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}
