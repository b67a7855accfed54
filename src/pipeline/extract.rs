//! Extraction orchestrator: picks the pagination driver for an endpoint,
//! builds the row-sets and uploads them to the raw tier.

use crate::apis::models::{ExternalContact, User, UserAddress};
use crate::apis::{ApiError, GenesysApi};
use crate::config::{EndpointConfig, ExtractionParams, Settings};
use crate::constants::{
    get_supported_endpoints, CALL_LOGS_ENDPOINT, CONTACTS_ENDPOINT, CONVERSATIONS_DATASET, MOBILE_PREFIX,
    PARTICIPANTS_DATASET, SEGMENTS_DATASET, USERS_ENDPOINT,
};
use crate::error::{EtlError, Result};
use crate::flatten::{flatten_conversations, CallLogTables};
use crate::pagination::{drive_cursor_pages, drive_numbered_pages, fetch_single_page, CursorPage, PagingSummary};
use crate::pipeline::PipelineContext;
use crate::storage::upload_rowset;
use crate::types::{Cell, ExtractionResult, RowSet};
use metrics::counter;
use tracing::{debug, info, instrument};

pub const CONTACT_COLUMNS: [&str; 7] = [
    "first_name",
    "last_name",
    "id",
    "email_work",
    "email_personal",
    "phone_work",
    "phone_mobile",
];

pub const USER_COLUMNS: [&str; 5] = ["id", "name", "email", "phone_work", "phone_mobile"];

/// Which pagination protocol an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Numbered pages, fanned out into conversations/participants/segments.
    CallLogs,
    /// Server cursors.
    Contacts,
    /// One page.
    Users,
}

impl EndpointKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            CALL_LOGS_ENDPOINT => Ok(EndpointKind::CallLogs),
            CONTACTS_ENDPOINT => Ok(EndpointKind::Contacts),
            USERS_ENDPOINT => Ok(EndpointKind::Users),
            other => Err(EtlError::Config(format!(
                "No extractor for endpoint '{other}' (supported: {})",
                get_supported_endpoints().join(", ")
            ))),
        }
    }
}

/// A dataset written to the raw tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDataset {
    pub output: String,
    pub blob: String,
    pub rows: usize,
}

/// What the extract stage hands to the next stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOutcome {
    /// False when nothing was extracted; downstream stages should be skipped.
    pub data_available: bool,
    pub uploaded: Vec<UploadedDataset>,
    pub paging: PagingSummary,
}

/// Run the extractor for `endpoint_name` without touching storage.
pub async fn extract_endpoint(
    api: &dyn GenesysApi,
    endpoint_name: &str,
    endpoint: &EndpointConfig,
    settings: &Settings,
) -> Result<(ExtractionResult, PagingSummary)> {
    match EndpointKind::from_name(endpoint_name)? {
        EndpointKind::CallLogs => extract_call_logs(api, &endpoint.params, settings).await,
        EndpointKind::Contacts => extract_contacts(api, &endpoint.params, settings).await,
        EndpointKind::Users => extract_users(api, &endpoint.params, settings).await,
    }
}

/// Extract `endpoint_name` and upload each resulting dataset to the raw tier,
/// one blob per declared output.
#[instrument(skip(ctx, api))]
pub async fn run_extraction(ctx: &PipelineContext, api: &dyn GenesysApi, endpoint_name: &str) -> Result<ExtractOutcome> {
    let endpoint = ctx.endpoints.endpoint(endpoint_name)?;
    let (result, paging) = extract_endpoint(api, endpoint_name, endpoint, &ctx.settings).await?;
    counter!("etl_rows_extracted_total", "endpoint" => endpoint_name.to_string()).increment(result.total_rows() as u64);

    if result.is_empty() {
        info!("No data extracted for {}, skipping downstream stages", endpoint_name);
        return Ok(ExtractOutcome { data_available: false, uploaded: Vec::new(), paging });
    }

    let raw = &ctx.connections.storage.raw_container;
    let mut uploaded = Vec::new();
    for (output, rows) in name_datasets(endpoint_name, endpoint, result)? {
        let blob = ctx.connections.blob_name(&output)?.to_string();
        upload_rowset(ctx.store.as_ref(), raw, &blob, &rows).await?;
        uploaded.push(UploadedDataset { output, blob, rows: rows.len() });
    }

    info!("Extracted {} into {} raw dataset(s)", endpoint_name, uploaded.len());
    Ok(ExtractOutcome { data_available: true, uploaded, paging })
}

/// Pair every dataset with the declared output it is stored under.
fn name_datasets(
    endpoint_name: &str,
    endpoint: &EndpointConfig,
    result: ExtractionResult,
) -> Result<Vec<(String, RowSet)>> {
    match result {
        ExtractionResult::OneDataset(rows) => {
            let mut outputs = endpoint.output.keys();
            match (outputs.next(), outputs.next()) {
                (Some(output), None) => Ok(vec![(output.clone(), rows)]),
                _ => Err(EtlError::Config(format!(
                    "Endpoint '{endpoint_name}' yields one dataset but declares {} outputs",
                    endpoint.output.len()
                ))),
            }
        }
        ExtractionResult::ManyDatasets(sets) => sets
            .into_iter()
            .map(|(name, rows)| {
                if endpoint.output.contains_key(&name) {
                    Ok((name, rows))
                } else {
                    Err(EtlError::Config(format!(
                        "Endpoint '{endpoint_name}' produced dataset '{name}' with no declared output"
                    )))
                }
            })
            .collect(),
    }
}

async fn extract_call_logs(
    api: &dyn GenesysApi,
    params: &ExtractionParams,
    settings: &Settings,
) -> Result<(ExtractionResult, PagingSummary)> {
    let interval = params
        .interval
        .as_deref()
        .ok_or_else(|| EtlError::MissingField("params.interval".into()))?;
    let page_size = params.page_size.unwrap_or(settings.api.default_page_size);
    let mut tables = CallLogTables::default();

    let summary = drive_numbered_pages(
        &settings.paging,
        move |page| async move {
            api.query_conversations(interval, page, page_size)
                .await
                .map(|resp| resp.conversations.unwrap_or_default())
        },
        |conversations| tables.append(flatten_conversations(&conversations)?),
    )
    .await?;

    let tables = tables.finish();
    debug!(
        "Call logs: {} conversations, {} participants, {} segments",
        tables.conversations.len(),
        tables.participants.len(),
        tables.segments.len()
    );

    Ok((
        ExtractionResult::ManyDatasets(vec![
            (CONVERSATIONS_DATASET.to_string(), tables.conversations),
            (PARTICIPANTS_DATASET.to_string(), tables.participants),
            (SEGMENTS_DATASET.to_string(), tables.segments),
        ]),
        summary,
    ))
}

async fn extract_contacts(
    api: &dyn GenesysApi,
    params: &ExtractionParams,
    settings: &Settings,
) -> Result<(ExtractionResult, PagingSummary)> {
    let limit = params.limit.unwrap_or(settings.api.default_page_size);
    let mut rows = RowSet::new(CONTACT_COLUMNS);

    let summary = drive_cursor_pages(
        params.cursor.clone(),
        move |cursor: Option<String>| async move {
            let resp = api.scan_contacts(limit, cursor.as_deref()).await?;
            Ok::<_, ApiError>(CursorPage {
                next_cursor: resp.cursors.and_then(|c| c.after),
                items: resp.entities,
            })
        },
        |contacts| {
            for contact in &contacts {
                rows.push(contact_row(contact))?;
            }
            Ok(())
        },
    )
    .await?;

    Ok((ExtractionResult::OneDataset(rows), summary))
}

async fn extract_users(
    api: &dyn GenesysApi,
    params: &ExtractionParams,
    settings: &Settings,
) -> Result<(ExtractionResult, PagingSummary)> {
    let page_size = params.page_size.unwrap_or(settings.api.default_page_size);
    let (users, summary) =
        fetch_single_page(async { api.list_users(page_size).await.map(|resp| resp.entities) }).await?;

    let mut rows = RowSet::new(USER_COLUMNS);
    for user in &users {
        match user_row(user) {
            Some(row) => rows.push(row)?,
            None => debug!("Skipping user {:?} without addresses", user.id),
        }
    }

    Ok((ExtractionResult::OneDataset(rows), summary))
}

pub fn contact_row(contact: &ExternalContact) -> Vec<Cell> {
    vec![
        contact.first_name.clone(),
        contact.last_name.clone(),
        contact.id.clone(),
        contact.work_email.clone(),
        contact.personal_email.clone(),
        contact.work_phone.as_ref().and_then(|p| p.e164.clone()),
        contact.cell_phone.as_ref().and_then(|p| p.e164.clone()),
    ]
}

/// Row for a user, or `None` when the user has no address entries at all.
pub fn user_row(user: &User) -> Option<Vec<Cell>> {
    let addresses = user.addresses.as_deref().filter(|a| !a.is_empty())?;
    let phones = classify_addresses(addresses);
    Some(vec![
        user.id.clone(),
        user.name.clone(),
        user.email.clone(),
        phones.work,
        phones.mobile,
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneKind {
    Mobile,
    Work,
}

/// Numbers starting with the Dutch mobile prefix are mobile, everything else is work.
pub fn categorize_address(address: &str) -> PhoneKind {
    if address.starts_with(MOBILE_PREFIX) {
        PhoneKind::Mobile
    } else {
        PhoneKind::Work
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPhones {
    pub work: Cell,
    pub mobile: Cell,
}

/// Sort a user's addresses into work and mobile numbers; the last address of each kind wins.
pub fn classify_addresses(addresses: &[UserAddress]) -> UserPhones {
    let mut phones = UserPhones::default();
    for address in addresses.iter().filter_map(|a| a.address.as_deref()) {
        match categorize_address(address) {
            PhoneKind::Mobile => phones.mobile = Some(address.to_string()),
            PhoneKind::Work => phones.work = Some(address.to_string()),
        }
    }
    phones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::models::{
        ContactScanResponse, Conversation, ConversationQueryResponse, Cursors, PhoneNumber, UserListResponse,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tokio::sync::Mutex;

    fn address(value: Option<&str>) -> UserAddress {
        UserAddress { address: value.map(str::to_string), media_type: Some("PHONE".to_string()) }
    }

    fn user(id: &str, addresses: Option<Vec<UserAddress>>) -> User {
        User {
            id: Some(id.to_string()),
            name: Some(format!("User {id}")),
            email: Some(format!("{id}@example.com")),
            addresses,
        }
    }

    #[test]
    fn test_categorize_address() {
        assert_eq!(categorize_address("+31612345678"), PhoneKind::Mobile);
        assert_eq!(categorize_address("+31201234567"), PhoneKind::Work);
    }

    #[test]
    fn test_last_address_of_each_kind_wins() {
        let phones = classify_addresses(&[
            address(Some("+31611111111")),
            address(None),
            address(Some("+31201234567")),
            address(Some("+31622222222")),
        ]);
        assert_eq!(phones.mobile.as_deref(), Some("+31622222222"));
        assert_eq!(phones.work.as_deref(), Some("+31201234567"));
    }

    #[test]
    fn test_user_without_addresses_is_excluded() {
        assert!(user_row(&user("a", Some(vec![]))).is_none());
        assert!(user_row(&user("b", None)).is_none());

        let row = user_row(&user("c", Some(vec![address(None)]))).unwrap();
        assert_eq!(row[3], None);
        assert_eq!(row[4], None);
    }

    #[test]
    fn test_contact_row_reads_e164() {
        let contact = ExternalContact {
            id: Some("x".to_string()),
            first_name: Some("Ada".to_string()),
            work_phone: Some(PhoneNumber { e164: Some("+31201234567".to_string()) }),
            cell_phone: Some(PhoneNumber { e164: None }),
            ..Default::default()
        };
        let row = contact_row(&contact);
        assert_eq!(row[0].as_deref(), Some("Ada"));
        assert_eq!(row[5].as_deref(), Some("+31201234567"));
        assert_eq!(row[6], None);
    }

    /// Serves canned pages and records what was asked for.
    #[derive(Default)]
    struct FakeApi {
        conversation_pages: Vec<Vec<Conversation>>,
        users: Vec<User>,
        requested_pages: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl GenesysApi for FakeApi {
        async fn query_conversations(
            &self,
            _interval: &str,
            page_number: u32,
            _page_size: u32,
        ) -> std::result::Result<ConversationQueryResponse, ApiError> {
            self.requested_pages.lock().await.push(page_number);
            let conversations = self.conversation_pages.get(page_number as usize - 1).cloned();
            Ok(ConversationQueryResponse { conversations, total_hits: None })
        }

        async fn scan_contacts(
            &self,
            _limit: u32,
            cursor: Option<&str>,
        ) -> std::result::Result<ContactScanResponse, ApiError> {
            let after = match cursor {
                None => Some("c1".to_string()),
                _ => None,
            };
            Ok(ContactScanResponse {
                entities: vec![ExternalContact { id: Some("k".to_string()), ..Default::default() }],
                cursors: Some(Cursors { after }),
            })
        }

        async fn list_users(&self, _page_size: u32) -> std::result::Result<UserListResponse, ApiError> {
            Ok(UserListResponse { entities: self.users.clone() })
        }
    }

    fn endpoint(interval: Option<&str>) -> EndpointConfig {
        EndpointConfig {
            schedule: None,
            params: ExtractionParams { interval: interval.map(str::to_string), ..Default::default() },
            output: BTreeMap::new(),
        }
    }

    fn conversation(id: &str) -> Conversation {
        Conversation { conversation_id: Some(id.to_string()), ..Default::default() }
    }

    #[tokio::test]
    async fn test_call_logs_merge_pages_and_dedup() {
        let api = FakeApi {
            conversation_pages: vec![
                vec![conversation("c1"), conversation("c2")],
                vec![conversation("c2"), conversation("c3")],
            ],
            ..Default::default()
        };

        let (result, summary) =
            extract_endpoint(&api, CALL_LOGS_ENDPOINT, &endpoint(Some("2024-01-01/2024-01-02")), &Settings::default())
                .await
                .unwrap();

        assert_eq!(summary.fetches, 3);
        assert_eq!(*api.requested_pages.lock().await, vec![1, 2, 3]);
        match result {
            ExtractionResult::ManyDatasets(sets) => {
                let names: Vec<&str> = sets.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["conversations", "participants", "segments"]);
                assert_eq!(sets[0].1.len(), 3);
            }
            other => panic!("expected many datasets, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_logs_without_pages_is_empty() {
        let api = FakeApi::default();
        let (result, _) =
            extract_endpoint(&api, CALL_LOGS_ENDPOINT, &endpoint(Some("2024-01-01/2024-01-02")), &Settings::default())
                .await
                .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_call_logs_require_interval() {
        let api = FakeApi::default();
        let result = extract_endpoint(&api, CALL_LOGS_ENDPOINT, &endpoint(None), &Settings::default()).await;
        assert!(matches!(result, Err(EtlError::MissingField(_))));
    }

    #[tokio::test]
    async fn test_users_skip_those_without_addresses() {
        let api = FakeApi {
            users: vec![
                user("a", Some(vec![address(Some("+31612345678"))])),
                user("b", Some(vec![])),
                user("c", Some(vec![address(Some("+31201234567"))])),
            ],
            ..Default::default()
        };

        let (result, _) = extract_endpoint(&api, USERS_ENDPOINT, &endpoint(None), &Settings::default())
            .await
            .unwrap();
        let ExtractionResult::OneDataset(rows) = result else {
            panic!("users yield one dataset");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.value(0, "phone_mobile"), Some(&Some("+31612345678".to_string())));
        assert_eq!(rows.value(1, "phone_work"), Some(&Some("+31201234567".to_string())));
    }

    #[tokio::test]
    async fn test_contacts_follow_cursor() {
        let api = FakeApi::default();
        let (result, summary) = extract_endpoint(&api, CONTACTS_ENDPOINT, &endpoint(None), &Settings::default())
            .await
            .unwrap();
        assert_eq!(summary.fetches, 2);
        assert_eq!(result.total_rows(), 2);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_config_error() {
        let api = FakeApi::default();
        let result = extract_endpoint(&api, "queues", &endpoint(None), &Settings::default()).await;
        assert!(matches!(result, Err(EtlError::Config(_))));
    }

    #[test]
    fn test_one_dataset_needs_exactly_one_output() {
        let mut cfg = endpoint(None);
        let rows = RowSet::new(["id"]);
        assert!(name_datasets("users", &cfg, ExtractionResult::OneDataset(rows.clone())).is_err());

        cfg.output.insert("users".to_string(), Default::default());
        let named = name_datasets("users", &cfg, ExtractionResult::OneDataset(rows)).unwrap();
        assert_eq!(named[0].0, "users");
    }
}
