//! Wall-clock harness for live runs of the simulator.

use crate::HarnessContext;
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::Instrument;

/// Harness for `dposim serve` outside of tests.
///
/// Block timestamps follow the host clock and every `Init` mints player keys
/// from OS entropy, so two runs never share identities. Being real-time, it
/// lets engines keep their background round timers.
pub struct TokioContext {
    booted: Instant,
}

impl TokioContext {
    pub fn new() -> Self {
        Self {
            booted: Instant::now(),
        }
    }

    /// Handle for the simulator and its engines.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HarnessContext for TokioContext {
    fn now(&self) -> Duration {
        self.booted.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future.instrument(tracing::info_span!("task", name = %name)));
    }

    /// The extension is ignored: live players get unrelated keys.
    fn derive_signing_key(&self, _seed_extension: u64) -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    fn seed(&self) -> u64 {
        0
    }
}
