use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("metered_chunk_size ({metered}) exceeds chunk_size ({chunk})")]
    MeteredChunkTooLarge { metered: u64, chunk: u64 },

    #[error("backoff_base_ms ({base}) exceeds backoff_max_ms ({max})")]
    BackoffRange { base: u64, max: u64 },

    #[error("Account names must not be blank")]
    BlankAccountName,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_scheduler(config)?;
    validate_accounts(config)?;
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    let worker = &config.worker;

    if worker.chunk_size.as_u64() == 0 {
        return Err(ValidationError::ZeroValue {
            field: "worker.chunk_size",
        });
    }
    if worker.metered_chunk_size.as_u64() == 0 {
        return Err(ValidationError::ZeroValue {
            field: "worker.metered_chunk_size",
        });
    }
    if worker.metered_chunk_size > worker.chunk_size {
        return Err(ValidationError::MeteredChunkTooLarge {
            metered: worker.metered_chunk_size.as_u64(),
            chunk: worker.chunk_size.as_u64(),
        });
    }
    if worker.batch_size == 0 {
        return Err(ValidationError::ZeroValue {
            field: "worker.batch_size",
        });
    }
    if worker.poll_interval_ms == 0 {
        return Err(ValidationError::ZeroValue {
            field: "worker.poll_interval_ms",
        });
    }

    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<(), ValidationError> {
    let scheduler = &config.scheduler;

    if scheduler.max_attempts == 0 {
        return Err(ValidationError::ZeroValue {
            field: "scheduler.max_attempts",
        });
    }
    if scheduler.backoff_base_ms > scheduler.backoff_max_ms {
        return Err(ValidationError::BackoffRange {
            base: scheduler.backoff_base_ms,
            max: scheduler.backoff_max_ms,
        });
    }

    Ok(())
}

fn validate_accounts(config: &Config) -> Result<(), ValidationError> {
    if config.accounts.keys().any(|name| name.trim().is_empty()) {
        return Err(ValidationError::BlankAccountName);
    }
    Ok(())
}
