pub mod api;
pub mod client;
pub mod collector;
pub mod config;
pub mod credential;
pub mod error;
pub mod limiter;
pub mod signer;
pub mod store;

pub use api::{AppState, build_app};
pub use client::{HeaderSource, TuyaClient, UpstreamResponse};
pub use collector::{CollectOutcome, Collector, MIN_PERIOD};
pub use config::ServerConfig;
pub use credential::{Credentials, StaticHeaders};
pub use error::{ConfigError, FetchError, StoreError};
pub use limiter::RateLimiter;
pub use signer::{SignedHeaders, Signer};
pub use store::{Snapshot, Store};
