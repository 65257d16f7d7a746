use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::scheduler::{polling_loop, PollingScheduler};

/// Owns the background polling task.
pub struct CollectorController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl CollectorController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, scheduler: PollingScheduler) -> Result<()> {
        if self.handle.is_some() {
            bail!("data collection already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(polling_loop(scheduler, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("Data collection started");
        Ok(())
    }

    /// Request a stop and wait for the loop to finish its current tick.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("polling loop task failed to join")?;
            info!("Data collection stopped");
        }
        Ok(())
    }
}

impl Default for CollectorController {
    fn default() -> Self {
        Self::new()
    }
}
