mod support;

use serde_json::{json, Value};
use tempfile::tempdir;

use instacrawl_core::collect::{
    ActionSpec, CanonicalRecord, CollectError, CollectResult, CollectTelemetry, Cursor,
    EngineState, Page, PagedResource, PaginationEngine, ParamMatch, RawResponse,
    RequestPattern, StopReason,
};
use instacrawl_core::schema::UserBasicInfo;

use support::{basic_user, config, Site, BASE};

/// `GET /api/v1/users/?page=..` with `{"users": [...], "next": .., "more": ..}` pages.
struct Directory;

impl PagedResource for Directory {
    type Item = UserBasicInfo;

    fn name(&self) -> &str {
        "directory"
    }

    fn target(&self) -> &str {
        "everyone"
    }

    fn action(&self, cursor: &Cursor) -> ActionSpec {
        ActionSpec::new("directory")
            .scroll_window()
            .with_cursor(cursor.token())
    }

    fn pattern(&self, cursor: &Cursor) -> RequestPattern {
        let matcher = match cursor.token() {
            Some(token) => ParamMatch::Equals(token.to_string()),
            None => ParamMatch::AbsentOrEquals(String::new()),
        };
        RequestPattern::get("/api/v1/users/").query("page", matcher)
    }

    fn items(&self, page: &Page) -> CollectResult<Vec<CollectResult<CanonicalRecord>>> {
        let entries = page
            .record
            .entries("users")
            .ok_or_else(|| CollectError::malformed(&page.response.url, "no users"))?;
        Ok(entries
            .into_iter()
            .map(|entry| entry.ok_or_else(|| CollectError::schema("user", "not an object")))
            .collect())
    }

    fn next_cursor(&self, page: &Page) -> Cursor {
        Cursor::from_page(
            page.record.str_at("next"),
            page.record.bool_at("more").unwrap_or(false),
        )
    }
}

fn directory_page(page: Option<&str>, ids: &[&str], next: Option<&str>) -> RawResponse {
    let users = ids
        .iter()
        .map(|id| basic_user(id, &format!("user{id}")))
        .collect::<Vec<_>>();
    directory_body(page, json!({"users": users, "next": next, "more": next.is_some()}))
}

fn directory_body(page: Option<&str>, body: Value) -> RawResponse {
    let url = match page {
        Some(page) => format!("{BASE}/api/v1/users/?page={page}"),
        None => format!("{BASE}/api/v1/users/"),
    };
    RawResponse::json("GET", url, &body)
}

fn ids(users: &[UserBasicInfo]) -> Vec<&str> {
    users.iter().map(|user| user.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn stops_at_limit_without_fetching_more() {
    let site = Site::new();
    site.on("directory", vec![directory_page(None, &["1", "2", "3"], Some("p2"))]);
    site.on("directory", vec![directory_page(Some("p2"), &["4"], None)]);
    let session = site.session();
    let config = config();

    let mut engine = PaginationEngine::new(&session, &config);
    let harvest = engine.collect(&Directory, 2).await.unwrap();

    assert_eq!(ids(&harvest.result.items), vec!["1", "2"]);
    assert_eq!(harvest.result.count, 2);
    assert_eq!(harvest.stop, StopReason::LimitReached);
    assert_eq!(site.performed().len(), 1);
    assert_eq!(engine.state(), EngineState::Done(StopReason::LimitReached));
}

#[tokio::test(start_paused = true)]
async fn zero_limit_follows_cursor_to_the_end() {
    let site = Site::new();
    site.on("directory", vec![directory_page(None, &["1", "2"], Some("p2"))]);
    site.on("directory", vec![directory_page(Some("p2"), &["3", "4"], Some("p3"))]);
    site.on("directory", vec![directory_page(Some("p3"), &["5"], None)]);
    let session = site.session();
    let config = config();

    let harvest = PaginationEngine::new(&session, &config)
        .collect(&Directory, 0)
        .await
        .unwrap();

    assert_eq!(ids(&harvest.result.items), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(harvest.stop, StopReason::CursorExhausted);
    let cursors = site
        .performed_specs()
        .into_iter()
        .map(|spec| spec.cursor)
        .collect::<Vec<_>>();
    assert_eq!(cursors, vec![None, Some("p2".into()), Some("p3".into())]);
}

#[tokio::test(start_paused = true)]
async fn items_without_required_fields_are_skipped() {
    let site = Site::new();
    site.on(
        "directory",
        vec![directory_body(
            None,
            json!({"users": [
                basic_user("1", "a"),
                basic_user("2", "b"),
                {"username": "no_id"},
                basic_user("3", "c"),
                basic_user("4", "d"),
            ]}),
        )],
    );
    let session = site.session();
    let config = config();

    let harvest = PaginationEngine::new(&session, &config)
        .collect(&Directory, 10)
        .await
        .unwrap();

    assert_eq!(harvest.result.count, 4);
    assert_eq!(harvest.metrics.items_skipped, 1);
    assert_eq!(harvest.stop, StopReason::CursorExhausted);
}

#[tokio::test(start_paused = true)]
async fn non_object_entries_are_counted_as_skipped() {
    let site = Site::new();
    site.on(
        "directory",
        vec![directory_body(
            None,
            json!({"users": [basic_user("1", "a"), "oops", null, basic_user("2", "b")]}),
        )],
    );
    let session = site.session();
    let config = config();

    let harvest = PaginationEngine::new(&session, &config)
        .collect(&Directory, 0)
        .await
        .unwrap();

    assert_eq!(ids(&harvest.result.items), vec!["1", "2"]);
    assert_eq!(harvest.metrics.items_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn truncated_page_fails_without_retry_and_keeps_items() {
    let site = Site::new();
    site.on("directory", vec![directory_page(None, &["1", "2"], Some("p2"))]);
    site.on(
        "directory",
        vec![RawResponse::new(
            "GET",
            format!("{BASE}/api/v1/users/?page=p2"),
            r#"{"users": [{"pk": "3", "usern"#,
        )],
    );
    site.on("directory", vec![directory_page(Some("p2"), &["3"], None)]);
    let session = site.session();
    let config = config();

    let mut engine = PaginationEngine::new(&session, &config);
    let failure = engine.collect(&Directory, 0).await.unwrap_err();

    assert!(matches!(
        failure.error,
        CollectError::MalformedResponse { .. }
    ));
    assert_eq!(ids(&failure.partial.items), vec!["1", "2"]);
    assert_eq!(site.performed().len(), 2);
    assert_eq!(engine.state(), EngineState::Failed);
}

#[tokio::test(start_paused = true)]
async fn duplicates_across_page_boundary_are_dropped() {
    let site = Site::new();
    site.on("directory", vec![directory_page(None, &["1", "2"], Some("p2"))]);
    site.on("directory", vec![directory_page(Some("p2"), &["2", "3"], None)]);
    let session = site.session();
    let config = config();

    let harvest = PaginationEngine::new(&session, &config)
        .collect(&Directory, 0)
        .await
        .unwrap();

    assert_eq!(ids(&harvest.result.items), vec!["1", "2", "3"]);
    assert_eq!(harvest.metrics.duplicates_dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn stall_guard_ends_a_looping_cursor() {
    let site = Site::new();
    site.on("directory", vec![directory_page(None, &["1"], Some("a"))]);
    site.on("directory", vec![directory_page(Some("a"), &["1"], Some("b"))]);
    site.on("directory", vec![directory_page(Some("b"), &["1"], Some("c"))]);
    site.on("directory", vec![directory_page(Some("c"), &["1"], Some("d"))]);
    let session = site.session();
    let mut config = config();
    config.pagination.stall_threshold = 2;

    let harvest = PaginationEngine::new(&session, &config)
        .collect(&Directory, 0)
        .await
        .unwrap();

    assert_eq!(harvest.stop, StopReason::Stalled);
    assert_eq!(harvest.result.count, 1);
    assert_eq!(site.performed().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn lost_login_returns_partial_items() {
    let site = Site::new();
    site.on("directory", vec![directory_page(None, &["1", "2"], Some("p2"))]);
    site.on("directory", vec![directory_page(Some("p2"), &["3", "4"], Some("p3"))]);
    site.on("directory", vec![directory_page(Some("p3"), &["5", "6"], None)]);
    site.expire_login_after(2);
    let session = site.session();
    let config = config();

    let mut engine = PaginationEngine::new(&session, &config);
    let failure = engine.collect(&Directory, 0).await.unwrap_err();

    assert!(matches!(failure.error, CollectError::Authentication(_)));
    assert_eq!(ids(&failure.partial.items), vec!["1", "2", "3", "4"]);
    assert_eq!(failure.partial.count, 4);
    assert_eq!(engine.state(), EngineState::Failed);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_page_is_retried() {
    let site = Site::new();
    site.on(
        "directory",
        vec![directory_body(None, json!({"status": "fail", "message": "Please wait a few minutes"}))
            .with_status(429)],
    );
    site.on("directory", vec![directory_page(None, &["1"], None)]);
    let session = site.session();
    let config = config();

    let harvest = PaginationEngine::new(&session, &config)
        .collect(&Directory, 0)
        .await
        .unwrap();

    assert_eq!(harvest.result.count, 1);
    assert_eq!(harvest.metrics.rate_limits, 1);
    assert_eq!(harvest.metrics.retries, 1);
    assert_eq!(site.performed().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn missing_capture_exhausts_retries() {
    let site = Site::new();
    let session = site.session();
    let config = config();

    let failure = PaginationEngine::new(&session, &config)
        .collect(&Directory, 5)
        .await
        .unwrap_err();

    match &failure.error {
        CollectError::RetriesExhausted { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(**last, CollectError::CaptureNotFound { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(failure.partial.items.is_empty());
    assert_eq!(site.performed().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn fatal_response_is_not_retried() {
    let site = Site::new();
    site.on("directory", vec![directory_body(None, json!({"message": "gone"})).with_status(403)]);
    let session = site.session();
    let config = config();

    let failure = PaginationEngine::new(&session, &config)
        .collect(&Directory, 5)
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        CollectError::Upstream { status: 403, .. }
    ));
    assert_eq!(site.performed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn telemetry_records_failures_and_runs() {
    let dir = tempdir().unwrap();
    let telemetry =
        CollectTelemetry::new(dir.path().join("failures.jsonl"), dir.path().join("metrics.db"))
            .unwrap();
    let site = Site::new();
    site.on("directory", vec![]);
    site.on("directory", vec![directory_page(None, &["1", "2"], None)]);
    let session = site.session();
    let config = config();

    let harvest = PaginationEngine::new(&session, &config)
        .with_telemetry(Some(&telemetry))
        .collect(&Directory, 0)
        .await
        .unwrap();
    assert_eq!(harvest.result.count, 2);
    assert_eq!(harvest.metrics.capture_misses, 1);

    let log = std::fs::read_to_string(dir.path().join("failures.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("\"class\":\"transient\""));

    let conn = rusqlite::Connection::open(telemetry.database_path()).unwrap();
    let (collected, outcome): (i64, String) = conn
        .query_row(
            "SELECT collected, outcome FROM collect_runs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(collected, 2);
    assert_eq!(outcome, "cursor_exhausted");
}
