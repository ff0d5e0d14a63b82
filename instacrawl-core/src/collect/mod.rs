//! Correlates browser actions with captured responses and pages through them.

mod capture;
mod decoder;
mod error;
mod metrics;
mod pagination;
mod record;
mod retry;
mod session;
mod telemetry;

pub use capture::{
    CaptureLog, CaptureStore, ParamMatch, RawResponse, RequestPattern, ResponseLocator,
    SharedCaptureLog,
};
pub use decoder::Decoder;
pub use error::{CollectError, CollectFailure, CollectResult, ErrorCategorizer, FailureClass};
pub use metrics::CollectMetrics;
pub use pagination::{
    CollectionResult, Cursor, EngineState, Harvest, Page, PagedResource, PaginationEngine,
    StopReason,
};
pub use record::CanonicalRecord;
pub use retry::{AttemptFailure, RetryOutcome, RetryPolicy};
pub use session::{Action, ActionSpec, ActionTrigger, Session, SessionAuth};
pub use telemetry::{
    CollectTelemetry, FailureContext, Remediation, RunContext, TelemetryError,
};
