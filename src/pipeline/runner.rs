use crate::apis::GenesysApi;
use crate::config::StagePolicy;
use crate::error::Result;
use crate::notify::FailureEvent;
use crate::pipeline::curate::{curate_endpoint, CuratedOutput};
use crate::pipeline::extract::{run_extraction, ExtractOutcome};
use crate::pipeline::load::{stage_output, upsert_output};
use crate::pipeline::stage::run_stage;
use crate::pipeline::PipelineContext;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const EXTRACT_TASK: &str = "extract_data";
pub const TRANSFORM_TASK: &str = "transform_data";

pub fn load_task_id(output: &str) -> String {
    format!("load_{output}_data_into_staging")
}

pub fn upsert_task_id(output: &str) -> String {
    format!("upsert_{output}_staging_into_main")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// Extraction produced no rows; nothing downstream ran.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLoad {
    pub output: String,
    pub staged_rows: usize,
    pub upserted_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub endpoint: String,
    pub run_id: Uuid,
    pub status: RunStatus,
    pub extracted_rows: usize,
    pub outputs: Vec<OutputLoad>,
}

/// Runs the stages of one endpoint in order, each under its stage policy.
/// A stage that exhausts its policy is reported to the notifier before the
/// error is returned.
#[derive(Clone)]
pub struct EndpointRunner {
    ctx: PipelineContext,
    api: Arc<dyn GenesysApi>,
}

impl EndpointRunner {
    pub fn new(ctx: PipelineContext, api: Arc<dyn GenesysApi>) -> Self {
        Self { ctx, api }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Extract, curate, then stage and upsert every output of `endpoint`.
    pub async fn run(&self, endpoint: &str) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("endpoint_run", endpoint = %endpoint, run_id = %run_id);
        self.run_with_id(endpoint, run_id).instrument(span).await
    }

    async fn run_with_id(&self, endpoint: &str, run_id: Uuid) -> Result<RunReport> {
        info!("Starting run");
        let extracted = self.extract(endpoint, run_id).await?;
        let extracted_rows = extracted.uploaded.iter().map(|u| u.rows).sum();

        if !extracted.data_available {
            info!("No data available, skipping transform and load");
            return Ok(RunReport {
                endpoint: endpoint.to_string(),
                run_id,
                status: RunStatus::Skipped,
                extracted_rows,
                outputs: Vec::new(),
            });
        }

        self.ctx.transform(endpoint, run_id).await?;

        let outputs: Vec<String> = self.ctx.endpoints.endpoint(endpoint)?.output.keys().cloned().collect();
        let mut loads = Vec::with_capacity(outputs.len());
        for output in &outputs {
            loads.push(self.ctx.load_output(endpoint, output, run_id).await?);
        }

        info!("Run completed: {} rows extracted, {} outputs loaded", extracted_rows, loads.len());
        Ok(RunReport {
            endpoint: endpoint.to_string(),
            run_id,
            status: RunStatus::Completed,
            extracted_rows,
            outputs: loads,
        })
    }

    pub async fn extract(&self, endpoint: &str, run_id: Uuid) -> Result<ExtractOutcome> {
        let ctx = &self.ctx;
        let api = self.api.as_ref();
        ctx.guarded(endpoint, run_id, EXTRACT_TASK, &ctx.settings.stages.extract, move || {
            run_extraction(ctx, api, endpoint)
        })
        .await
    }
}

/// Stages that only touch storage and the warehouse, runnable without an API client.
impl PipelineContext {
    pub async fn transform(&self, endpoint: &str, run_id: Uuid) -> Result<Vec<CuratedOutput>> {
        self.guarded(endpoint, run_id, TRANSFORM_TASK, &self.settings.stages.transform, move || {
            curate_endpoint(self, endpoint)
        })
        .await
    }

    /// Stage `output`, then merge it into production.
    pub async fn load_output(&self, endpoint: &str, output: &str, run_id: Uuid) -> Result<OutputLoad> {
        let stages = &self.settings.stages;

        let staged_rows = self
            .guarded(endpoint, run_id, &load_task_id(output), &stages.load, move || {
                stage_output(self, endpoint, output)
            })
            .await?;
        let upserted_rows = self
            .guarded(endpoint, run_id, &upsert_task_id(output), &stages.upsert, move || {
                upsert_output(self, endpoint, output)
            })
            .await?;

        Ok(OutputLoad { output: output.to_string(), staged_rows, upserted_rows })
    }

    /// Run `attempt` under `policy`; on failure notify with `task_id` and return the error.
    pub async fn guarded<T, F, Fut>(
        &self,
        endpoint: &str,
        run_id: Uuid,
        task_id: &str,
        policy: &StagePolicy,
        attempt: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match run_stage(task_id, policy, attempt).await {
            Ok(value) => Ok(value),
            Err(e) => {
                let event = FailureEvent {
                    endpoint: endpoint.to_string(),
                    task_id: task_id.to_string(),
                    run_id,
                    timestamp: Utc::now(),
                    error: e.to_string(),
                };
                if let Err(notify_err) = self.notifier.notify(&event).await {
                    warn!("Failed to deliver failure notification for {}: {}", task_id, notify_err);
                }
                Err(e)
            }
        }
    }
}
