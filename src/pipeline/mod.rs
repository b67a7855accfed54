//! Batch pipeline: extract to the raw tier, curate into the curated tier,
//! then stage and upsert into the warehouse.

pub mod curate;
pub mod extract;
pub mod load;
pub mod runner;
pub mod stage;

use crate::config::{ConnectionsConfig, EndpointsConfig, Settings};
use crate::notify::FailureNotifier;
use crate::storage::ObjectStore;
use crate::warehouse::Warehouse;
use std::sync::Arc;

pub use runner::{EndpointRunner, RunReport, RunStatus};

/// Everything a stage needs besides the API client.
#[derive(Clone)]
pub struct PipelineContext {
    pub endpoints: Arc<EndpointsConfig>,
    pub connections: Arc<ConnectionsConfig>,
    pub settings: Arc<Settings>,
    pub store: Arc<dyn ObjectStore>,
    pub warehouse: Arc<dyn Warehouse>,
    pub notifier: Arc<dyn FailureNotifier>,
}
