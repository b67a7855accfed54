pub mod apis;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod flatten;
pub mod logging;
pub mod notify;
pub mod pagination;
pub mod pipeline;
pub mod storage;
pub mod transform;
pub mod types;
pub mod warehouse;
