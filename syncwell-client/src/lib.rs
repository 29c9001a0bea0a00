//! SYNCWELL client library exports.

pub mod api_client;
pub mod board;
pub mod config;
pub mod debounce;
pub mod error;
pub mod notifications;
pub mod remote;
pub mod search;
pub mod tag_picker;
pub mod telemetry;

pub use api_client::{ApiClientError, RestClient};
pub use board::TicketBoard;
pub use config::ClientConfig;
pub use debounce::{Debounced, Debouncer};
pub use error::{ClientError, ClientResult};
pub use remote::{DatabaseApi, DatabaseTreeSource, TagsApi, TicketsApi};
pub use search::SearchFilters;
pub use tag_picker::{TagOptions, TagPicker};
