use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::page::Page;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::collect::{CaptureStore, RawResponse, RequestPattern, SharedCaptureLog};
use crate::config::CaptureSection;

use super::error::BrowserResult;

enum NetworkEvent {
    Request {
        id: RequestId,
        url: String,
        method: String,
        post_data: Option<String>,
    },
    Response {
        id: RequestId,
        status: u16,
        mime_type: String,
    },
    Finished(RequestId),
    Failed(RequestId),
}

#[derive(Debug, Default)]
struct PendingExchange {
    url: String,
    method: String,
    post_data: Option<String>,
    status: Option<u16>,
    mime_type: Option<String>,
}

/// Records structured network responses of one page into a [`SharedCaptureLog`].
#[derive(Debug)]
pub struct CdpCaptureStore {
    log: SharedCaptureLog,
    listener: JoinHandle<()>,
}

impl CdpCaptureStore {
    pub async fn attach(page: &Page, config: &CaptureSection) -> BrowserResult<Self> {
        page.execute(EnableParams::default()).await?;

        let requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let responses = page.event_listener::<EventResponseReceived>().await?;
        let finished = page.event_listener::<EventLoadingFinished>().await?;
        let failed = page.event_listener::<EventLoadingFailed>().await?;

        let streams: Vec<BoxStream<'static, NetworkEvent>> = vec![
            requests
                .map(|event| NetworkEvent::Request {
                    id: event.request_id.clone(),
                    url: event.request.url.clone(),
                    method: event.request.method.clone(),
                    post_data: event.request.post_data.clone(),
                })
                .boxed(),
            responses
                .map(|event| NetworkEvent::Response {
                    id: event.request_id.clone(),
                    status: u16::try_from(event.response.status).unwrap_or(0),
                    mime_type: event.response.mime_type.clone(),
                })
                .boxed(),
            finished
                .map(|event| NetworkEvent::Finished(event.request_id.clone()))
                .boxed(),
            failed
                .map(|event| NetworkEvent::Failed(event.request_id.clone()))
                .boxed(),
        ];

        let log = SharedCaptureLog::new(config.max_entries);
        let listener = tokio::spawn(listen(page.clone(), stream::select_all(streams), log.clone()));
        debug!(max_entries = config.max_entries, "Network capture attached");
        Ok(Self { log, listener })
    }

    pub fn log(&self) -> &SharedCaptureLog {
        &self.log
    }
}

impl CaptureStore for CdpCaptureStore {
    fn query(&self, pattern: &RequestPattern, since: DateTime<Utc>) -> Option<RawResponse> {
        self.log.query(pattern, since)
    }
}

impl Drop for CdpCaptureStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen(
    page: Page,
    mut events: stream::SelectAll<BoxStream<'static, NetworkEvent>>,
    log: SharedCaptureLog,
) {
    let mut pending: HashMap<String, PendingExchange> = HashMap::new();
    while let Some(event) = events.next().await {
        match event {
            NetworkEvent::Request {
                id,
                url,
                method,
                post_data,
            } => {
                pending.insert(
                    id.inner().clone(),
                    PendingExchange {
                        url,
                        method,
                        post_data,
                        ..PendingExchange::default()
                    },
                );
            }
            NetworkEvent::Response {
                id,
                status,
                mime_type,
            } => {
                if let Some(exchange) = pending.get_mut(id.inner()) {
                    exchange.status = Some(status);
                    exchange.mime_type = Some(mime_type);
                }
            }
            NetworkEvent::Failed(id) => {
                pending.remove(id.inner());
            }
            NetworkEvent::Finished(id) => {
                let Some(exchange) = pending.remove(id.inner()) else {
                    continue;
                };
                if let Some(response) = fetch_body(&page, id, exchange).await {
                    log.push(response);
                }
            }
        }
    }
    trace!("Network event stream closed");
}

async fn fetch_body(page: &Page, id: RequestId, exchange: PendingExchange) -> Option<RawResponse> {
    let mut response = RawResponse::new(&exchange.method, exchange.url, Vec::new())
        .with_status(exchange.status.unwrap_or(0))
        .with_mime_type(exchange.mime_type.unwrap_or_default());
    if let Some(post_data) = exchange.post_data {
        response = response.with_request_body(post_data);
    }
    if !response.is_structured() {
        return None;
    }

    match page.execute(GetResponseBodyParams::new(id)).await {
        Ok(body) => {
            response.body = body.result.body.clone().into_bytes();
            response.base64_encoded = body.result.base64_encoded;
            response.timestamp = Utc::now();
            trace!(url = %response.url, status = response.status, "Captured response body");
            Some(response)
        }
        Err(err) => {
            debug!(url = %response.url, error = %err, "Response body unavailable");
            None
        }
    }
}
