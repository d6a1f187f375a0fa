//! Model-service control: one inference container resident at a time.
//!
//! Vision models are large enough that only one fits on the GPU. Before a
//! model is used, [`ModelServiceController::ensure_ready`] makes sure its
//! container is running, stops every other managed container, and waits for
//! the target's HTTP API to answer.
//!
//! ## Locking
//!
//! The start/stop decision runs under a `tokio::sync::Mutex` owned by the
//! controller. Controllers built with [`ModelServiceController::with_lock`]
//! share one. The lock is released before the readiness poll, so two
//! concurrent requests for *different* models can still stop each other's
//! containers; that thrash is accepted rather than serialised.
//!
//! ## State
//!
//! None. Container state is read back from the runtime on every call.

pub mod readiness;
pub mod runtime;

pub use readiness::wait_for_ready;
pub use runtime::{ContainerRuntime, ContainerStatus, DockerCli, RuntimeError};

use crate::config::DigitizerConfig;
use crate::error::DigitizeError;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Per-probe HTTP timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps the requested model's container running and all others stopped.
#[derive(Clone)]
pub struct ModelServiceController {
    runtime: Arc<dyn ContainerRuntime>,
    lock: Arc<Mutex<()>>,
    config: Arc<DigitizerConfig>,
    probe: reqwest::Client,
}

impl ModelServiceController {
    /// Controller with its own start/stop lock.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config: Arc<DigitizerConfig>,
    ) -> Result<Self, DigitizeError> {
        Self::with_lock(runtime, config, Arc::new(Mutex::new(())))
    }

    /// Controller sharing `lock` with other controllers.
    pub fn with_lock(
        runtime: Arc<dyn ContainerRuntime>,
        config: Arc<DigitizerConfig>,
        lock: Arc<Mutex<()>>,
    ) -> Result<Self, DigitizeError> {
        let probe = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| DigitizeError::Internal(format!("HTTP client init failed: {}", e)))?;
        Ok(Self {
            runtime,
            lock,
            config,
            probe,
        })
    }

    /// The start/stop lock, for sharing with another controller.
    pub fn lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.lock)
    }

    /// Make `model_id`'s service the only one running and wait until it answers.
    ///
    /// Returns the seconds spent, or `0.0` without touching the runtime or
    /// the network when `bindings` has no entry for the model.
    pub async fn ensure_ready(
        &self,
        model_id: &str,
        base_url: &str,
        bindings: &HashMap<String, String>,
        ready_path: &str,
    ) -> Result<f64, DigitizeError> {
        let Some(target) = bindings.get(model_id) else {
            debug!("Model '{}' has no managed container", model_id);
            return Ok(0.0);
        };

        let start = Instant::now();
        {
            let _guard = self.lock.lock().await;
            self.start_target(model_id, target).await?;
            let others: BTreeSet<&str> = bindings
                .values()
                .map(String::as_str)
                .filter(|name| *name != target.as_str())
                .collect();
            for name in others {
                self.stop_competitor(name).await;
            }
        }

        let url = format!("{}{}", base_url.trim_end_matches('/'), ready_path);
        let timeout = self.config.service_start_timeout(model_id);
        wait_for_ready(&self.probe, model_id, &url, timeout, self.config.poll_interval()).await?;

        let elapsed = start.elapsed().as_secs_f64();
        info!("Service '{}' for '{}' ready in {:.2}s", target, model_id, elapsed);
        Ok(elapsed)
    }

    async fn start_target(&self, model_id: &str, name: &str) -> Result<(), DigitizeError> {
        let unavailable = |detail: String| DigitizeError::ServiceUnavailable {
            model: model_id.to_string(),
            container: Some(name.to_string()),
            detail,
        };

        match self.runtime.status(name).await {
            Ok(Some(status)) if status.is_running() => {
                debug!("Container '{}' already running", name);
                Ok(())
            }
            Ok(Some(status)) => {
                info!("Starting container '{}' (was {})", name, status);
                self.runtime
                    .start(name)
                    .await
                    .map_err(|e| unavailable(e.to_string()))
            }
            Ok(None) => Err(unavailable(format!("container '{}' not found", name))),
            Err(e) => Err(unavailable(e.to_string())),
        }
    }

    /// Best effort: failures are logged and swallowed.
    async fn stop_competitor(&self, name: &str) {
        match self.runtime.status(name).await {
            Ok(Some(status)) if status.holds_resources() => {
                info!("Stopping container '{}' ({})", name, status);
                if let Err(e) = self.runtime.stop(name).await {
                    warn!("Failed to stop container '{}': {}", name, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to inspect container '{}': {}", name, e),
        }
    }
}

impl std::fmt::Debug for ModelServiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelServiceController")
            .field("poll_interval", &self.config.poll_interval())
            .finish_non_exhaustive()
    }
}
