use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::{GzDecoder, ZlibDecoder};
use serde_json::Value;
use tracing::trace;

use super::capture::RawResponse;
use super::error::{CollectError, CollectResult};
use super::record::CanonicalRecord;

const ANTI_HIJACK_PREFIXES: [&str; 2] = ["for (;;);", "for(;;);"];
const LOGIN_MARKERS: [&str; 3] = ["login_required", "checkpoint_required", "require_login"];

/// Turns captured bytes into a [`CanonicalRecord`], surfacing upstream
/// rate limits and session problems as typed errors.
#[derive(Debug, Clone, Default)]
pub struct Decoder;

impl Decoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, response: &RawResponse) -> CollectResult<CanonicalRecord> {
        match response.status {
            429 => {
                return Err(CollectError::RateLimited(format!(
                    "status 429 from {}",
                    response.url
                )))
            }
            401 => {
                return Err(CollectError::Authentication(format!(
                    "status 401 from {}",
                    response.url
                )))
            }
            _ => {}
        }

        let bytes = self.body_bytes(response)?;
        let text = String::from_utf8(bytes)
            .map_err(|err| CollectError::malformed(&response.url, format!("body is not utf-8: {err}")))?;
        let text = strip_prefix(text.trim_start());
        let parsed: Result<Value, _> = serde_json::from_str(text);

        let value = match parsed {
            Ok(value) => value,
            Err(err) => {
                return Err(match response.status {
                    404 => CollectError::NotFound(response.url.clone()),
                    status if !(200..300).contains(&status) => CollectError::Upstream {
                        status,
                        url: response.url.clone(),
                    },
                    _ => CollectError::malformed(&response.url, format!("invalid json: {err}")),
                });
            }
        };

        check_signals(response, &value)?;

        match response.status {
            200..=299 => {}
            404 => return Err(CollectError::NotFound(response.url.clone())),
            status => {
                return Err(CollectError::Upstream {
                    status,
                    url: response.url.clone(),
                })
            }
        }

        let record = CanonicalRecord::from_value(value)
            .ok_or_else(|| CollectError::malformed(&response.url, "root is not an object"))?;
        trace!(url = %response.url, keys = record.as_map().len(), "Decoded response");
        Ok(record)
    }

    fn body_bytes(&self, response: &RawResponse) -> CollectResult<Vec<u8>> {
        let raw = if response.base64_encoded {
            STANDARD
                .decode(&response.body)
                .map_err(|err| CollectError::malformed(&response.url, format!("bad base64: {err}")))?
        } else {
            response.body.clone()
        };

        let encoding = response
            .content_encoding
            .as_deref()
            .map(str::to_ascii_lowercase);
        match encoding.as_deref() {
            None | Some("") | Some("identity") => Ok(raw),
            Some("gzip") | Some("x-gzip") => inflate(GzDecoder::new(raw.as_slice()), &response.url),
            Some("deflate") => inflate(ZlibDecoder::new(raw.as_slice()), &response.url),
            Some(other) => Err(CollectError::malformed(
                &response.url,
                format!("unsupported content encoding {other}"),
            )),
        }
    }
}

fn inflate<R: Read>(mut reader: R, url: &str) -> CollectResult<Vec<u8>> {
    let mut out = Vec::new();
    reader
        .read_to_end(&mut out)
        .map_err(|err| CollectError::malformed(url, format!("decompression failed: {err}")))?;
    Ok(out)
}

fn strip_prefix(text: &str) -> &str {
    ANTI_HIJACK_PREFIXES
        .iter()
        .find_map(|prefix| text.strip_prefix(prefix))
        .unwrap_or(text)
}

fn check_signals(response: &RawResponse, value: &Value) -> CollectResult<()> {
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let failed = value.get("status").and_then(Value::as_str) == Some("fail");

    if value.get("require_login").and_then(Value::as_bool) == Some(true)
        || LOGIN_MARKERS.iter().any(|marker| message.contains(marker))
    {
        return Err(CollectError::Authentication(if message.is_empty() {
            format!("login required by {}", response.url)
        } else {
            message.to_string()
        }));
    }

    if failed {
        let lowered = message.to_ascii_lowercase();
        if value.get("spam").and_then(Value::as_bool) == Some(true)
            || lowered.contains("wait a few minutes")
            || lowered.contains("rate limit")
            || lowered.contains("too many")
        {
            return Err(CollectError::RateLimited(message.to_string()));
        }
    }
    Ok(())
}
