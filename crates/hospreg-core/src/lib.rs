//! Request and session core of the hospital registration client.

pub mod api;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod secret_store;
pub mod session;
pub mod storage;

pub use api::{
    Credentials, NewAccount, NewFeedback, NewPatient, NewReview, PasswordReset, PaymentQuery,
    RegistrationKey, RegistrationQuery, ReviewQuery, ScheduleQuery, WaitingKey,
};
pub use client::{ApiClient, ApiRequest, DeleteEncoding, HttpMethod, encode_query};
pub use config::{
    ConfigError, ConfigLoadResult, ConfigSource, EnvironmentResolver, FileConfig, ServerMode,
    ServerSettings, config_directory, config_path, load_config, load_config_from, save_config,
};
pub use envelope::PageRequest;
pub use error::{ApiError, ApiErrorKind, RawResponse};
pub use events::{ClientEvent, EventBus, NoticeStyle, Notification};
pub use logging::{LoggingDestination, LoggingError, init_logging};
pub use models::Page;
pub use secret_store::SecretBackend;
pub use session::{IdentityLookup, Session, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, StorageKey};
