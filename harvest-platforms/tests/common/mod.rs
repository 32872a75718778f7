//! Config pointing every platform at one mock server, with fast retries.
#![allow(dead_code)]

use harvest_core::{HarvestConfig, PlatformSettings, RetrySettings};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use wiremock::MockServer;

pub fn mock_settings(server: &MockServer) -> PlatformSettings {
    PlatformSettings {
        base_url: Some(server.uri()),
        item_base_url: Some(server.uri()),
        requests_per_minute: Some(60_000),
        burst: Some(1_000),
        retry: Some(RetrySettings {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }),
    }
}

pub fn mock_config(server: &MockServer) -> HarvestConfig {
    let settings = mock_settings(server);
    HarvestConfig {
        hn: settings.clone(),
        reddit: settings.clone(),
        x: settings.clone(),
        youtube: settings,
        ..HarvestConfig::default()
    }
}

/// Log sink for a thread-local fmt subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Installs a debug-level subscriber writing here until the guard drops.
    pub fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
