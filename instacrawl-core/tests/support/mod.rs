#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use url::form_urlencoded;

use instacrawl_core::collect::{
    ActionSpec, ActionTrigger, CollectResult, RawResponse, Session, SessionAuth,
    SharedCaptureLog,
};
use instacrawl_core::config::CrawlerConfig;

pub const BASE: &str = "https://www.instagram.com";

/// A fake site: every action name owns a queue of response batches that are
/// "observed" on the network when the action is performed.
#[derive(Default)]
pub struct Site {
    log: RefCell<Option<SharedCaptureLog>>,
    routes: RefCell<HashMap<String, VecDeque<Vec<RawResponse>>>>,
    performed: RefCell<Vec<ActionSpec>>,
    logins: Cell<Option<usize>>,
}

impl Site {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn on(&self, action: &str, batch: Vec<RawResponse>) -> &Self {
        self.routes
            .borrow_mut()
            .entry(action.to_string())
            .or_default()
            .push_back(batch);
        self
    }

    /// Session stays logged in for the next `checks` auth checks only.
    pub fn expire_login_after(&self, checks: usize) {
        self.logins.set(Some(checks));
    }

    pub fn performed(&self) -> Vec<String> {
        self.performed
            .borrow()
            .iter()
            .map(|spec| spec.name.clone())
            .collect()
    }

    pub fn performed_specs(&self) -> Vec<ActionSpec> {
        self.performed.borrow().clone()
    }

    pub fn session(self: &Rc<Self>) -> Session {
        let log = SharedCaptureLog::new(256);
        *self.log.borrow_mut() = Some(log.clone());
        Session::new(
            Box::new(SiteTrigger(Rc::clone(self))),
            Box::new(log),
            Box::new(SiteAuth(Rc::clone(self))),
        )
    }
}

struct SiteTrigger(Rc<Site>);

#[async_trait(?Send)]
impl ActionTrigger for SiteTrigger {
    async fn perform(&self, spec: &ActionSpec) -> CollectResult<()> {
        self.0.performed.borrow_mut().push(spec.clone());
        let batch = self
            .0
            .routes
            .borrow_mut()
            .get_mut(&spec.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        if let Some(log) = self.0.log.borrow().as_ref() {
            for response in batch {
                log.push(response.with_timestamp(Utc::now()));
            }
        }
        Ok(())
    }
}

struct SiteAuth(Rc<Site>);

#[async_trait(?Send)]
impl SessionAuth for SiteAuth {
    async fn is_valid(&self) -> bool {
        match self.0.logins.get() {
            None => true,
            Some(0) => false,
            Some(left) => {
                self.0.logins.set(Some(left - 1));
                true
            }
        }
    }
}

/// Short waits so paused-clock tests stay readable.
pub fn config() -> CrawlerConfig {
    let mut config = CrawlerConfig::default();
    config.capture.poll_interval_ms = 50;
    config.capture.wait_window_ms = 500;
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 100;
    config.retry.max_delay_ms = 1_000;
    config.retry.rate_limit_delay_ms = 200;
    config.retry.jitter_ms = 0;
    config
}

pub fn profile(username: &str, id: &str, private: bool) -> RawResponse {
    let url = format!("{BASE}/api/v1/users/web_profile_info/?username={username}");
    let body = json!({
        "status": "ok",
        "data": {"user": {
            "id": id,
            "username": username,
            "full_name": username.to_uppercase(),
            "is_private": private,
            "is_verified": true,
            "biography": "Exploring the universe",
            "edge_followed_by": {"count": 97_000_000},
            "edge_follow": {"count": 80},
            "edge_owner_to_timeline_media": {"count": 4_200},
        }}
    });
    RawResponse::json("GET", url, &body)
}

pub fn missing_profile(username: &str) -> RawResponse {
    let url = format!("{BASE}/api/v1/users/web_profile_info/?username={username}");
    RawResponse::json("GET", url, &json!({"status": "ok", "data": {"user": null}}))
}

pub fn graphql(variables: Value, body: Value) -> RawResponse {
    let form = form_urlencoded::Serializer::new(String::new())
        .append_pair("variables", &variables.to_string())
        .finish();
    RawResponse::json("POST", format!("{BASE}/api/graphql"), &body).with_request_body(form)
}

pub fn post_node(id: &str) -> Value {
    json!({
        "pk": id,
        "code": format!("C{id}"),
        "taken_at": 1_700_000_000,
        "media_type": 1,
        "user": {"pk": "528817151", "username": "nasa"},
        "caption": {"pk": format!("cap{id}"), "text": format!("post {id}")},
        "image_versions2": {"candidates": [{"url": format!("https://cdn.example/{id}.jpg")}]},
        "like_count": 10,
        "comment_count": 2
    })
}

/// One page of the user timeline connection.
pub fn timeline_page(username: &str, after: Option<&str>, nodes: Vec<Value>, next: Option<&str>) -> RawResponse {
    let mut variables = json!({"username": username});
    if let Some(after) = after {
        variables["after"] = json!(after);
    }
    let edges = nodes.into_iter().map(|node| json!({"node": node})).collect::<Vec<_>>();
    graphql(
        variables,
        json!({"data": {"xdt_api__v1__feed__user_timeline_graphql_connection": {
            "edges": edges,
            "page_info": {"end_cursor": next, "has_next_page": next.is_some()}
        }}}),
    )
}

pub fn friendships_page(
    user_id: &str,
    segment: &str,
    max_id: Option<&str>,
    users: Vec<Value>,
    next: Option<&str>,
) -> RawResponse {
    let mut url = format!("{BASE}/api/v1/friendships/{user_id}/{segment}/?count=12");
    if let Some(max_id) = max_id {
        url.push_str(&format!("&max_id={max_id}"));
    }
    let mut body = json!({"status": "ok", "users": users});
    if let Some(next) = next {
        body["next_max_id"] = json!(next);
    }
    RawResponse::json("GET", url, &body)
}

pub fn basic_user(id: &str, username: &str) -> Value {
    json!({"pk": id, "username": username, "full_name": "", "is_private": false})
}
