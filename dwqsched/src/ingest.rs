use dwqcore::{
    error::work::ValidationError,
    input::MAX_DATA_SIZE,
    work::{WorkKind, WorkRequest},
};

use crate::config::SchedulerConfig;

/// Validate a request against the configured bounds before it touches
/// the store.
pub fn validate(
    request: &WorkRequest,
    config: &SchedulerConfig,
) -> Result<(), ValidationError> {
    let size = request.input.encoded_len()
        .map_err(ValidationError::InvalidInput)?;
    if size > MAX_DATA_SIZE {
        return Err(ValidationError::InputTooLarge(size));
    }
    if request.backoff_base_ms < config.min_backoff_ms {
        return Err(ValidationError::BackoffTooShort {
            floor: config.min_backoff_ms,
            got: request.backoff_base_ms,
        });
    }
    match request.kind {
        WorkKind::Periodic => {
            let period = request.period_ms
                .ok_or(ValidationError::PeriodMissing)?;
            let flex = request.flex_ms
                .ok_or(ValidationError::FlexMissing)?;
            if period < config.minimum_period_ms {
                return Err(ValidationError::PeriodTooShort {
                    minimum: config.minimum_period_ms,
                    got: period,
                });
            }
            if flex < 0 || flex > period {
                return Err(ValidationError::FlexExceedsPeriod { period, flex });
            }
            if request.initial_delay_ms != 0 {
                return Err(ValidationError::StrayInitialDelay);
            }
            if !request.prereqs.is_empty() {
                return Err(ValidationError::PeriodicInChain);
            }
        }
        WorkKind::OneShot => {
            if request.period_ms.is_some() || request.flex_ms.is_some() {
                return Err(ValidationError::StrayPeriod);
            }
            if request.initial_delay_ms < 0 {
                return Err(ValidationError::NegativeDelay);
            }
        }
    }
    if request.tags.iter().any(|tag| tag.is_empty()) {
        return Err(ValidationError::EmptyTag);
    }
    if let Some(prereq) = request.prereqs.iter().find(|id| **id <= 0) {
        return Err(ValidationError::InvalidPrereq(*prereq));
    }
    Ok(())
}
