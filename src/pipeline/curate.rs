use crate::error::Result;
use crate::pipeline::PipelineContext;
use crate::storage::{download_rowset, upload_rowset};
use crate::transform::{transform_rowset, TransformReport};
use chrono::Utc;
use tracing::{info, instrument};

/// Outcome of curating one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratedOutput {
    pub output: String,
    pub rows: usize,
    pub report: TransformReport,
}

/// Move every output of `endpoint_name` from the raw to the curated tier,
/// applying the column transforms on the way. All outputs share one
/// `dl_imported_at` timestamp.
#[instrument(skip(ctx))]
pub async fn curate_endpoint(ctx: &PipelineContext, endpoint_name: &str) -> Result<Vec<CuratedOutput>> {
    let endpoint = ctx.endpoints.endpoint(endpoint_name)?;
    let storage = &ctx.connections.storage;
    let imported_at = Utc::now();
    let mut curated = Vec::with_capacity(endpoint.output.len());

    for output in endpoint.output.keys() {
        let blob = ctx.connections.blob_name(output)?;
        let mut rows = download_rowset(ctx.store.as_ref(), &storage.raw_container, blob).await?;
        let report = transform_rowset(endpoint, &mut rows, imported_at);
        upload_rowset(ctx.store.as_ref(), &storage.curated_container, blob, &rows).await?;

        info!(
            "Curated {} rows for output {} ({} transforms applied, {} skipped)",
            rows.len(),
            output,
            report.applied.len(),
            report.skipped.len()
        );
        curated.push(CuratedOutput { output: output.clone(), rows: rows.len(), report });
    }

    Ok(curated)
}
