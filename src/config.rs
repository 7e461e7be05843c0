use crate::constants;
use crate::error::{EngineError, Result};

/// Runtime configuration for the entity engine.
///
/// Every field has a constant default in [`crate::constants`] and can be
/// overridden from the environment via [`EngineConfig::from_env`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Transient-failure retry budget for owned transactions.
    pub transaction_retries: u32,
    /// Base delay between transaction retries; attempt `n` waits `n` times this.
    pub retry_delay_ms: u64,
    /// Iterations after which a workflow entity is considered stuck.
    pub max_job_iterations: u32,
    /// Base delay for the job driver's exponential backoff.
    pub job_base_delay_ms: u64,
    /// Cap on any single requeue delay.
    pub job_cap_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transaction_retries: constants::DEFAULT_TRANSACTION_RETRIES,
            retry_delay_ms: constants::DEFAULT_RETRY_DELAY_MS,
            max_job_iterations: constants::DEFAULT_MAX_JOB_ITERATIONS,
            job_base_delay_ms: constants::DEFAULT_JOB_BASE_DELAY_MS,
            job_cap_delay_ms: constants::DEFAULT_JOB_CAP_DELAY_MS,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `ENTITY_ENGINE_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = read_env("ENTITY_ENGINE_TRANSACTION_RETRIES")? {
            config.transaction_retries = value;
        }
        if let Some(value) = read_env("ENTITY_ENGINE_RETRY_DELAY_MS")? {
            config.retry_delay_ms = value;
        }
        if let Some(value) = read_env("ENTITY_ENGINE_MAX_JOB_ITERATIONS")? {
            config.max_job_iterations = value;
        }
        if let Some(value) = read_env("ENTITY_ENGINE_JOB_BASE_DELAY_MS")? {
            config.job_base_delay_ms = value;
        }
        if let Some(value) = read_env("ENTITY_ENGINE_JOB_CAP_DELAY_MS")? {
            config.job_cap_delay_ms = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.job_base_delay_ms == 0 {
            return Err(EngineError::Configuration(
                "job_base_delay_ms must be greater than zero".to_string(),
            ));
        }
        if self.job_cap_delay_ms < self.job_base_delay_ms {
            return Err(EngineError::Configuration(format!(
                "job_cap_delay_ms ({}) must not be below job_base_delay_ms ({})",
                self.job_cap_delay_ms, self.job_base_delay_ms
            )));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| EngineError::Configuration(format!("invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
