//! Microphone permission probing with a per-instance cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Outcome of asking the platform for microphone access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The platform has no media-device API to ask.
    Unavailable,
}

/// Asks the platform for microphone access, possibly prompting the user.
#[async_trait]
pub trait PermissionProbe: Send + Sync {
    async fn probe(&self) -> PermissionStatus;
}

/// Remembers a grant so the user is never prompted twice.
///
/// Denials are not cached; the next start probes again.
pub struct PermissionCache {
    probe: Arc<dyn PermissionProbe>,
    granted: bool,
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("granted", &self.granted)
            .finish()
    }
}

impl PermissionCache {
    pub fn new(probe: Arc<dyn PermissionProbe>) -> Self {
        Self {
            probe,
            granted: false,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// True when the microphone may be used.
    pub async fn ensure(&mut self) -> bool {
        if self.granted {
            return true;
        }
        match self.probe.probe().await {
            PermissionStatus::Granted => {
                debug!("Microphone permission granted");
                self.granted = true;
            }
            PermissionStatus::Unavailable => {
                debug!("No media-device API; treating microphone as granted");
                self.granted = true;
            }
            PermissionStatus::Denied => {
                warn!("Microphone permission denied");
            }
        }
        self.granted
    }
}

/// Probe answering with a fixed status and counting how often it was asked.
#[derive(Debug)]
pub struct FixedProbe {
    status: PermissionStatus,
    calls: AtomicUsize,
}

impl FixedProbe {
    pub fn new(status: PermissionStatus) -> Arc<Self> {
        Arc::new(Self {
            status,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProbe for FixedProbe {
    async fn probe(&self) -> PermissionStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.status
    }
}
