use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};
use url::{form_urlencoded, Url};

use crate::config::CaptureSection;

use super::error::{CollectError, CollectResult};

/// One network exchange observed by the browser.
#[derive(Debug, Clone, Serialize)]
pub struct RawResponse {
    pub url: String,
    pub method: String,
    pub request_body: Option<String>,
    pub status: u16,
    pub mime_type: String,
    pub content_encoding: Option<String>,
    pub base64_encoded: bool,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl RawResponse {
    pub fn new(method: &str, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            method: method.to_ascii_uppercase(),
            request_body: None,
            status: 200,
            mime_type: "application/json".to_string(),
            content_encoding: None,
            base64_encoded: false,
            body: body.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn json(method: &str, url: impl Into<String>, body: &Value) -> Self {
        Self::new(method, url, body.to_string())
    }

    pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Only JSON and javascript payloads carry API data.
    pub fn is_structured(&self) -> bool {
        let mime = self.mime_type.to_ascii_lowercase();
        mime.contains("json") || mime.contains("javascript")
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        let url = Url::parse(&self.url).ok()?;
        let value = url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned());
        value
    }

    pub fn form_field(&self, name: &str) -> Option<String> {
        let body = self.request_body.as_deref()?;
        form_urlencoded::parse(body.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// GraphQL variables, read from the form body first and the query string second.
    pub fn variables(&self) -> Option<Value> {
        let raw = self
            .form_field("variables")
            .or_else(|| self.query_param("variables"))?;
        serde_json::from_str(&raw).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamMatch {
    Equals(String),
    Present,
    /// Matches a missing parameter or one equal to the value. First pages
    /// usually omit the cursor that later pages carry.
    AbsentOrEquals(String),
}

impl ParamMatch {
    fn accepts(&self, actual: Option<&str>) -> bool {
        match (self, actual) {
            (ParamMatch::Equals(expected), Some(value)) => expected == value,
            (ParamMatch::Equals(_), None) => false,
            (ParamMatch::Present, found) => found.is_some(),
            (ParamMatch::AbsentOrEquals(_), None) => true,
            (ParamMatch::AbsentOrEquals(expected), Some(value)) => expected == value,
        }
    }
}

impl fmt::Display for ParamMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamMatch::Equals(value) => write!(f, "={value}"),
            ParamMatch::Present => f.write_str("=*"),
            ParamMatch::AbsentOrEquals(value) => write!(f, "=?{value}"),
        }
    }
}

/// Selects captured responses by method, host, path template and parameters.
///
/// Path templates use `*` for a single segment, so
/// `/api/v1/friendships/*/followers/` matches any user id.
#[derive(Debug, Clone)]
pub struct RequestPattern {
    method: Option<String>,
    host: Option<String>,
    template: String,
    path: Regex,
    query: Vec<(String, ParamMatch)>,
    form: Vec<(String, ParamMatch)>,
    variables: Vec<(String, ParamMatch)>,
}

impl RequestPattern {
    /// Pattern for a path template where a `*` segment matches any single segment.
    ///
    /// # Panics
    ///
    /// Never in practice: every literal segment goes through `regex::escape` and `*` becomes
    /// `[^/]+`, so the assembled expression is always valid whatever the template holds.
    pub fn new(template: &str) -> Self {
        let body = template
            .trim_end_matches('/')
            .split('/')
            .map(|segment| {
                if segment == "*" {
                    "[^/]+".to_string()
                } else {
                    regex::escape(segment)
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        let path = Regex::new(&format!("^{body}/?$")).expect("escaped path template");
        Self {
            method: None,
            host: None,
            template: template.to_string(),
            path,
            query: Vec::new(),
            form: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn get(template: &str) -> Self {
        Self::new(template).method("GET")
    }

    pub fn post(template: &str) -> Self {
        Self::new(template).method("POST")
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_ascii_uppercase());
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_ascii_lowercase());
        self
    }

    pub fn query(mut self, name: &str, matcher: ParamMatch) -> Self {
        self.query.push((name.to_string(), matcher));
        self
    }

    pub fn form(mut self, name: &str, matcher: ParamMatch) -> Self {
        self.form.push((name.to_string(), matcher));
        self
    }

    /// Constrains a dotted path inside the GraphQL `variables` document.
    pub fn variable(mut self, path: &str, matcher: ParamMatch) -> Self {
        self.variables.push((path.to_string(), matcher));
        self
    }

    /// Same as [`RequestPattern::variable`] with an optional cursor: `None`
    /// requires the key to be absent or `null`, `Some` requires equality.
    pub fn cursor_variable(self, path: &str, cursor: Option<&str>) -> Self {
        match cursor {
            Some(value) => self.variable(path, ParamMatch::Equals(value.to_string())),
            None => self.variable(path, ParamMatch::AbsentOrEquals(String::new())),
        }
    }

    pub fn matches(&self, response: &RawResponse) -> bool {
        if let Some(method) = &self.method {
            if !response.method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        let Ok(url) = Url::parse(&response.url) else {
            return false;
        };
        if let Some(host) = &self.host {
            if url.host_str().map(str::to_ascii_lowercase).as_deref() != Some(host.as_str()) {
                return false;
            }
        }
        if !self.path.is_match(url.path()) {
            return false;
        }
        for (name, matcher) in &self.query {
            let actual = url
                .query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned());
            if !matcher.accepts(actual.as_deref()) {
                return false;
            }
        }
        for (name, matcher) in &self.form {
            if !matcher.accepts(response.form_field(name).as_deref()) {
                return false;
            }
        }
        if !self.variables.is_empty() {
            let variables = response.variables().unwrap_or(Value::Null);
            for (path, matcher) in &self.variables {
                let actual = variable_text(&variables, path);
                let actual = actual.as_deref().filter(|value| !value.is_empty());
                if !matcher.accepts(actual) {
                    return false;
                }
            }
        }
        true
    }
}

fn variable_text(variables: &Value, path: &str) -> Option<String> {
    let mut current = variables;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    match current {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}

impl fmt::Display for RequestPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.method.as_deref().unwrap_or("ANY"),
            self.template
        )?;
        let constraints = self
            .query
            .iter()
            .map(|(name, m)| format!("{name}{m}"))
            .chain(self.form.iter().map(|(name, m)| format!("form.{name}{m}")))
            .chain(
                self.variables
                    .iter()
                    .map(|(name, m)| format!("variables.{name}{m}")),
            )
            .collect::<Vec<_>>();
        if !constraints.is_empty() {
            write!(f, " [{}]", constraints.join(", "))?;
        }
        Ok(())
    }
}

/// Read side of the browser's network log.
pub trait CaptureStore {
    /// Returns the most recent entry matching `pattern` captured at or after `since`.
    fn query(&self, pattern: &RequestPattern, since: DateTime<Utc>) -> Option<RawResponse>;
}

/// A bounded, ordered log of captured responses.
#[derive(Debug)]
pub struct CaptureLog {
    entries: VecDeque<RawResponse>,
    max_entries: usize,
}

impl CaptureLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn push(&mut self, response: RawResponse) {
        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(response);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self, pattern: &RequestPattern, since: DateTime<Utc>) -> Option<&RawResponse> {
        self.entries
            .iter()
            .filter(|entry| entry.timestamp >= since && pattern.matches(entry))
            .max_by_key(|entry| entry.timestamp)
    }
}

/// A capture log shared between the network listener and its readers.
#[derive(Debug, Clone)]
pub struct SharedCaptureLog {
    inner: Arc<Mutex<CaptureLog>>,
}

impl SharedCaptureLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureLog::new(max_entries))),
        }
    }

    pub fn push(&self, response: RawResponse) {
        match self.inner.lock() {
            Ok(mut log) => log.push(response),
            Err(poisoned) => poisoned.into_inner().push(response),
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(log) => log.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CaptureStore for SharedCaptureLog {
    fn query(&self, pattern: &RequestPattern, since: DateTime<Utc>) -> Option<RawResponse> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.latest(pattern, since).cloned()
    }
}

/// Polls a [`CaptureStore`] until a matching response shows up or the wait window closes.
#[derive(Debug, Clone)]
pub struct ResponseLocator {
    poll_interval: Duration,
    wait_window: Duration,
}

impl ResponseLocator {
    pub fn new(config: &CaptureSection) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            wait_window: config.wait_window(),
        }
    }

    pub async fn locate(
        &self,
        store: &dyn CaptureStore,
        pattern: &RequestPattern,
        since: DateTime<Utc>,
    ) -> CollectResult<RawResponse> {
        let started = Instant::now();
        let deadline = started + self.wait_window;
        loop {
            if let Some(response) = store.query(pattern, since) {
                debug!(
                    %pattern,
                    url = %response.url,
                    status = response.status,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Located captured response"
                );
                return Ok(response);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CollectError::CaptureNotFound {
                    pattern: pattern.to_string(),
                    waited_ms: self.wait_window.as_millis() as u64,
                });
            }
            trace!(%pattern, "No matching capture yet");
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
