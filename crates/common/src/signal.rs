//! Level-triggered stop flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stop request shared between a worker loop and whoever may stop it
///
/// Once raised it stays raised; the loop checks it between operations.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_shared_and_sticky() {
        let signal = StopSignal::new();
        let other = signal.clone();
        assert!(!other.is_stopped());

        signal.stop();
        assert!(other.is_stopped());
        signal.stop();
        assert!(other.is_stopped());
    }
}
