//! Fixed delays between remote calls.
//!
//! The batch loop never sleeps directly; it asks a [`Pacer`], so tests can
//! run whole batches without waiting on the clock.

use std::time::Duration;

#[allow(async_fn_in_trait)]
pub trait Pacer {
    async fn pause(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested pause.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingPacer {
    pauses: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingPacer {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }

    pub fn count(&self, duration: Duration) -> usize {
        self.pauses().iter().filter(|d| **d == duration).count()
    }
}

#[cfg(test)]
impl Pacer for RecordingPacer {
    async fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}
