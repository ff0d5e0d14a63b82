pub mod browser;
pub mod collect;
pub mod collectors;
pub mod config;
pub mod error;
pub mod schema;

pub use browser::{BrowserAutomation, BrowserError, BrowserLauncher, BrowserResult};
pub use collect::{
    CanonicalRecord, CollectError, CollectFailure, CollectResult, CollectTelemetry,
    CollectionResult, Session,
};
pub use collectors::{Collected, Collector};
pub use config::{load_crawler_config, CrawlerConfig};
pub use error::{ConfigError, Result};
