use crate::config::{EndpointConfig, OutputConfig};
use crate::constants::IMPORTED_AT_COLUMN;
use crate::error::{EtlError, Result};
use crate::pipeline::PipelineContext;
use crate::storage::download_rowset;
use crate::types::RowSet;
use crate::warehouse::TableRef;
use tracing::{info, instrument, warn};

/// Columns loaded into staging for one output: the declared fields, then the
/// business key, then `dl_imported_at` when the dataset carries it. An empty
/// field map loads every curated column. Declared fields the dataset lacks are
/// left out with a warning.
pub fn load_columns(output: &OutputConfig, curated: &RowSet) -> Result<Vec<String>> {
    if let Some(missing) = output.key.iter().find(|k| !curated.has_column(k)) {
        return Err(EtlError::Config(format!("business key column '{missing}' is missing from the curated dataset")));
    }
    if output.fields.is_empty() {
        return Ok(curated.columns().to_vec());
    }

    let mut columns: Vec<String> = Vec::with_capacity(output.fields.len() + output.key.len() + 1);
    for field in output.fields.keys() {
        if curated.has_column(field) {
            columns.push(field.clone());
        } else {
            warn!("Declared field '{}' is missing from the curated dataset, not loading it", field);
        }
    }
    for key in &output.key {
        if !columns.contains(key) {
            columns.push(key.clone());
        }
    }
    if curated.has_column(IMPORTED_AT_COLUMN) && !columns.iter().any(|c| c == IMPORTED_AT_COLUMN) {
        columns.push(IMPORTED_AT_COLUMN.to_string());
    }
    Ok(columns)
}

fn output_config<'a>(endpoint: &'a EndpointConfig, endpoint_name: &str, output: &str) -> Result<&'a OutputConfig> {
    endpoint
        .output
        .get(output)
        .ok_or_else(|| EtlError::Config(format!("Endpoint '{endpoint_name}' has no output '{output}'")))
}

pub fn staging_table(ctx: &PipelineContext, output: &str) -> TableRef {
    TableRef::new(ctx.connections.warehouse.staging_schema.clone(), output)
}

pub fn production_table(ctx: &PipelineContext, output: &str) -> TableRef {
    TableRef::new(ctx.connections.warehouse.production_schema.clone(), output)
}

/// Bulk-load the curated dataset of `output` into its staging table.
#[instrument(skip(ctx))]
pub async fn stage_output(ctx: &PipelineContext, endpoint_name: &str, output: &str) -> Result<usize> {
    let endpoint = ctx.endpoints.endpoint(endpoint_name)?;
    let output_cfg = output_config(endpoint, endpoint_name, output)?;
    let blob = ctx.connections.blob_name(output)?;

    let curated = download_rowset(ctx.store.as_ref(), &ctx.connections.storage.curated_container, blob).await?;
    let columns = load_columns(output_cfg, &curated)?;
    let staging = staging_table(ctx, output);
    let loaded = ctx.warehouse.load_staging(&staging, curated.select(&columns)).await?;

    info!("Staged {} rows into {}", loaded, staging);
    Ok(loaded)
}

/// Merge the staging table of `output` into production on the output's business key.
#[instrument(skip(ctx))]
pub async fn upsert_output(ctx: &PipelineContext, endpoint_name: &str, output: &str) -> Result<usize> {
    let endpoint = ctx.endpoints.endpoint(endpoint_name)?;
    let output_cfg = output_config(endpoint, endpoint_name, output)?;
    let staging = staging_table(ctx, output);
    let production = production_table(ctx, output);

    let merged = ctx.warehouse.upsert(&staging, &production, &output_cfg.key).await?;
    info!("Upserted {} rows from {} into {}", merged, staging, production);
    Ok(merged)
}
