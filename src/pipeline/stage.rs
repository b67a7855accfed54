use crate::config::StagePolicy;
use crate::error::{EtlError, Result};
use metrics::{counter, histogram};
use std::future::Future;
use std::time::Instant;
use tracing::{info, warn};

/// Run one pipeline stage under `policy`: every attempt is bounded by the
/// timeout, and a failed or timed-out attempt is retried up to `policy.retries`
/// times after `policy.retry_delay()`. When the budget is spent the stage fails
/// with [`EtlError::StageFailed`].
pub async fn run_stage<T, F, Fut>(stage: &str, policy: &StagePolicy, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.retries.saturating_add(1);
    let mut reason = String::new();

    for n in 1..=attempts {
        counter!("etl_stage_attempts_total", "stage" => stage.to_string()).increment(1);
        let started = Instant::now();

        match tokio::time::timeout(policy.timeout(), attempt()).await {
            Ok(Ok(value)) => {
                histogram!("etl_stage_duration_seconds", "stage" => stage.to_string())
                    .record(started.elapsed().as_secs_f64());
                if n > 1 {
                    info!("Stage {} succeeded on attempt {}", stage, n);
                }
                return Ok(value);
            }
            Ok(Err(e)) => {
                warn!("Stage {} attempt {}/{} failed: {}", stage, n, attempts, e);
                reason = e.to_string();
            }
            Err(_) => {
                warn!("Stage {} attempt {}/{} timed out after {:?}", stage, n, attempts, policy.timeout());
                reason = format!("timed out after {:?}", policy.timeout());
            }
        }

        if n < attempts {
            tokio::time::sleep(policy.retry_delay()).await;
        }
    }

    counter!("etl_stage_failures_total", "stage" => stage.to_string()).increment(1);
    Err(EtlError::StageFailed { stage: stage.to_string(), attempts, reason })
}
