use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::CrawlerConfig;
use crate::schema::{EntityMapper, Identified};

use super::capture::{RawResponse, RequestPattern, ResponseLocator};
use super::decoder::Decoder;
use super::error::{CollectError, CollectFailure, CollectResult, ErrorCategorizer, FailureClass};
use super::metrics::CollectMetrics;
use super::record::CanonicalRecord;
use super::retry::RetryPolicy;
use super::session::{ActionSpec, Session};
use super::telemetry::{CollectTelemetry, FailureContext, Remediation, RunContext};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionResult<T> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T> CollectionResult<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> Default for CollectionResult<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Continuation token plus the upstream "more available" flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub token: Option<String>,
    pub more: bool,
}

impl Cursor {
    pub fn start() -> Self {
        Self {
            token: None,
            more: true,
        }
    }

    pub fn exhausted() -> Self {
        Self {
            token: None,
            more: false,
        }
    }

    pub fn from_page(token: Option<&str>, more: bool) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
            more,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_start(&self) -> bool {
        self.token.is_none() && self.more
    }

    /// Another page can be requested only when upstream says so and gave a token.
    pub fn has_next(&self) -> bool {
        self.more && self.token.is_some()
    }
}

/// One decoded page together with the exchange it came from.
#[derive(Debug, Clone)]
pub struct Page {
    pub response: RawResponse,
    pub record: CanonicalRecord,
}

/// A cursor-paginated upstream collection.
pub trait PagedResource {
    type Item: Identified;

    fn name(&self) -> &str;

    /// What the collection is about (username, post code, tag).
    fn target(&self) -> &str;

    fn action(&self, cursor: &Cursor) -> ActionSpec;

    fn pattern(&self, cursor: &Cursor) -> RequestPattern;

    /// Raw item subtrees of a page. A page without the expected container is malformed;
    /// an entry that cannot hold an item is an `Err` and only that entry is skipped.
    fn items(&self, page: &Page) -> CollectResult<Vec<CollectResult<CanonicalRecord>>>;

    fn next_cursor(&self, page: &Page) -> Cursor;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    LimitReached,
    CursorExhausted,
    Stalled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::LimitReached => "limit_reached",
            StopReason::CursorExhausted => "cursor_exhausted",
            StopReason::Stalled => "stalled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Init,
    Fetching,
    Accumulating,
    Done(StopReason),
    Failed,
}

/// A finished collection.
#[derive(Debug, Clone)]
pub struct Harvest<T> {
    pub result: CollectionResult<T>,
    pub stop: StopReason,
    pub first_page: Option<CanonicalRecord>,
    pub metrics: CollectMetrics,
}

/// Drives trigger, locate, decode and map cycles over one [`Session`].
pub struct PaginationEngine<'s> {
    session: &'s Session,
    locator: ResponseLocator,
    decoder: Decoder,
    mapper: EntityMapper,
    retry: RetryPolicy,
    stall_threshold: usize,
    telemetry: Option<&'s CollectTelemetry>,
    metrics: CollectMetrics,
    run_id: Uuid,
    state: EngineState,
}

impl<'s> PaginationEngine<'s> {
    pub fn new(session: &'s Session, config: &CrawlerConfig) -> Self {
        Self {
            session,
            locator: ResponseLocator::new(&config.capture),
            decoder: Decoder::new(),
            mapper: EntityMapper::new(),
            retry: RetryPolicy::new(config.retry.clone()),
            stall_threshold: config.pagination.stall_threshold.max(1),
            telemetry: None,
            metrics: CollectMetrics::default(),
            run_id: Uuid::new_v4(),
            state: EngineState::Init,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Option<&'s CollectTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn metrics(&self) -> &CollectMetrics {
        &self.metrics
    }

    /// Fetches one page under the retry policy. Used directly for single-shot lookups.
    pub async fn fetch_page(
        &mut self,
        resource: &str,
        action: &ActionSpec,
        pattern: &RequestPattern,
    ) -> CollectResult<Page> {
        if !self.session.is_authenticated().await {
            return Err(CollectError::Authentication(
                "browser session has no valid login".into(),
            ));
        }
        self.state = EngineState::Fetching;
        self.metrics.record_cycle();

        let session = self.session;
        let locator = &self.locator;
        let decoder = &self.decoder;
        let telemetry = self.telemetry;
        let run_id = self.run_id;
        let metrics = &mut self.metrics;
        let steps = action.steps.len() as u64;

        let outcome = self
            .retry
            .execute_observed(
                |attempt| async move {
                    trace!(resource, action = %action.name, attempt, "Triggering action");
                    let since = session.trigger(action, attempt).await?;
                    let response = locator.locate(session.captures(), pattern, since).await?;
                    let record = decoder.decode(&response)?;
                    Ok(Page { response, record })
                },
                ErrorCategorizer::categorize,
                |failure| {
                    metrics.record_actions(steps);
                    match failure.error {
                        CollectError::CaptureNotFound { .. } => metrics.record_capture_miss(),
                        CollectError::RateLimited(_) => metrics.record_rate_limit(),
                        _ => {}
                    }
                    if failure.next_delay.is_some() {
                        metrics.record_retry();
                    }
                    if let Some(telemetry) = telemetry {
                        let entry = FailureContext {
                            timestamp: Utc::now(),
                            run_id,
                            resource: resource.to_string(),
                            pattern: pattern.to_string(),
                            class: failure.class,
                            error_message: failure.error.to_string(),
                            attempt: failure.attempt,
                            remediation: match failure.next_delay {
                                Some(delay) => Remediation::RetryScheduled {
                                    delay_ms: delay.as_millis() as u64,
                                },
                                None => Remediation::Abort,
                            },
                        };
                        if let Err(err) = telemetry.record_failure(&entry) {
                            warn!(error = %err, "Failed to record collect failure");
                        }
                    }
                },
            )
            .await?;

        self.metrics.record_actions(steps);
        self.metrics.record_response();
        debug!(
            resource,
            url = %outcome.result.response.url,
            attempts = outcome.attempts,
            "Fetched page"
        );
        Ok(outcome.result)
    }

    /// Collects up to `limit` unique items (`0` collects everything available).
    pub async fn collect<R>(
        &mut self,
        resource: &R,
        limit: usize,
    ) -> Result<Harvest<R::Item>, CollectFailure<R::Item>>
    where
        R: PagedResource,
    {
        let started = Instant::now();
        self.state = EngineState::Init;
        info!(resource = resource.name(), target = resource.target(), limit, "Starting collection");

        let mut cursor = Cursor::start();
        let mut seen: HashSet<String> = HashSet::new();
        let mut items: Vec<R::Item> = Vec::new();
        let mut first_page: Option<CanonicalRecord> = None;
        let mut stalled_cycles = 0usize;

        let stop = loop {
            let action = resource.action(&cursor);
            let pattern = resource.pattern(&cursor);
            let page = match self.fetch_page(resource.name(), &action, &pattern).await {
                Ok(page) => page,
                Err(error) => return Err(self.fail(resource, limit, started, error, items)),
            };

            self.state = EngineState::Accumulating;
            let raw_items = match resource.items(&page) {
                Ok(raw) => raw,
                Err(error) => return Err(self.fail(resource, limit, started, error, items)),
            };

            let page_items = raw_items.len();
            let mut fresh = 0usize;
            for raw in raw_items {
                let mapped = raw.and_then(|record| self.mapper.map::<R::Item>(&record));
                match mapped {
                    Ok(item) => {
                        if seen.insert(item.id().to_string()) {
                            items.push(item);
                            fresh += 1;
                            self.metrics.record_item();
                        } else {
                            trace!(resource = resource.name(), id = item.id(), "Dropping duplicate item");
                            self.metrics.record_duplicate();
                        }
                    }
                    Err(error) => {
                        warn!(resource = resource.name(), error = %error, "Skipping item that does not map");
                        self.metrics.record_skip();
                    }
                }
                if limit > 0 && items.len() >= limit {
                    break;
                }
            }

            cursor = resource.next_cursor(&page);
            if first_page.is_none() {
                first_page = Some(page.record);
            }
            debug!(
                resource = resource.name(),
                page_items,
                fresh,
                total = items.len(),
                more = cursor.has_next(),
                "Accumulated page"
            );

            if limit > 0 && items.len() >= limit {
                items.truncate(limit);
                break StopReason::LimitReached;
            }
            if !cursor.has_next() {
                break StopReason::CursorExhausted;
            }
            if fresh == 0 {
                stalled_cycles += 1;
                if stalled_cycles >= self.stall_threshold {
                    warn!(
                        resource = resource.name(),
                        cycles = stalled_cycles,
                        "No new items for consecutive pages, stopping"
                    );
                    break StopReason::Stalled;
                }
            } else {
                stalled_cycles = 0;
            }
        };

        self.state = EngineState::Done(stop);
        let result = CollectionResult::new(items);
        info!(
            resource = resource.name(),
            target = resource.target(),
            count = result.count,
            stop = stop.as_str(),
            cycles = self.metrics.cycles,
            yield_rate = self.metrics.yield_rate(),
            "Collection finished"
        );
        self.record_run(resource, limit, started, result.count, stop.as_str());
        Ok(Harvest {
            result,
            stop,
            first_page,
            metrics: self.metrics.clone(),
        })
    }

    fn fail<R: PagedResource>(
        &mut self,
        resource: &R,
        limit: usize,
        started: Instant,
        error: CollectError,
        items: Vec<R::Item>,
    ) -> CollectFailure<R::Item> {
        self.state = EngineState::Failed;
        let class = ErrorCategorizer::categorize(error.root_cause());
        warn!(
            resource = resource.name(),
            target = resource.target(),
            collected = items.len(),
            class = %class,
            error = %error,
            "Collection failed"
        );
        let outcome = if class == FailureClass::Fatal {
            "failed"
        } else {
            "retries_exhausted"
        };
        self.record_run(resource, limit, started, items.len(), outcome);
        CollectFailure::new(error, items)
    }

    fn record_run<R: PagedResource>(
        &self,
        resource: &R,
        limit: usize,
        started: Instant,
        collected: usize,
        outcome: &str,
    ) {
        let Some(telemetry) = self.telemetry else {
            return;
        };
        let run = RunContext {
            timestamp: Utc::now(),
            run_id: self.run_id,
            resource: resource.name().to_string(),
            target: resource.target().to_string(),
            requested: limit,
            collected,
            cycles: self.metrics.cycles,
            outcome: outcome.to_string(),
            duration_ms: started.elapsed().as_millis() as i64,
        };
        if let Err(err) = telemetry.record_run(&run) {
            warn!(error = %err, "Failed to record collect run");
        }
    }
}
