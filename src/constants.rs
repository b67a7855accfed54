/// Endpoint identifiers as they appear in the endpoints document and on the CLI.
pub const CALL_LOGS_ENDPOINT: &str = "call_logs";
pub const CONTACTS_ENDPOINT: &str = "contacts";
pub const USERS_ENDPOINT: &str = "users";

// Dataset names produced by the call-log flattener
pub const CONVERSATIONS_DATASET: &str = "conversations";
pub const PARTICIPANTS_DATASET: &str = "participants";
pub const SEGMENTS_DATASET: &str = "segments";

/// Session metric that carries the completed talk time.
pub const TALK_TIME_METRIC: &str = "tTalkComplete";

/// Dutch mobile numbers; every other user address is filed as a work number.
pub const MOBILE_PREFIX: &str = "+316";

/// URI scheme prefix stripped by the `phone_number` transform.
pub const TEL_SCHEME_PREFIX: &str = "tel:";

/// Field-map sentinel meaning "load the column as-is".
pub const NO_TRANSFORM: &str = "nothing";

/// Metadata column appended to every curated dataset.
pub const IMPORTED_AT_COLUMN: &str = "dl_imported_at";

pub const DEFAULT_REGION: &str = "mypurecloud.de";

/// Get all supported endpoint names
pub fn get_supported_endpoints() -> Vec<&'static str> {
    vec![CALL_LOGS_ENDPOINT, CONTACTS_ENDPOINT, USERS_ENDPOINT]
}
