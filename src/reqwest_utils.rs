use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

pub fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).cookie_store(true).build()?)
}

#[derive(Debug)]
pub struct TextResponse {
    pub status: StatusCode,
    pub text: String,
}

impl TextResponse {
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.text)
    }
}

fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"'))
}

// Japanese shops still serve Shift_JIS / EUC-JP; unknown labels fall back to UTF-8.
pub fn decode_body(body: &Bytes, charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

pub async fn send_to_text(request: RequestBuilder) -> reqwest::Result<TextResponse> {
    let resp = request.send().await?;
    let status = resp.status();
    let charset = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(charset_from_content_type)
        .map(str::to_string);
    let body = resp.bytes().await?;
    Ok(TextResponse {
        status,
        text: decode_body(&body, charset.as_deref()),
    })
}

// Retries on transport errors and 5xx answers; any other status is returned as is.
pub async fn send_to_text_with_retries(
    request: RequestBuilder,
    retries: usize,
) -> Result<TextResponse> {
    let mut last_error = anyhow!("No attempt made");
    for attempt in 0..retries.max(1) {
        if attempt > 0 {
            tokio::time::sleep(RETRY_BACKOFF * 2u32.pow(attempt.min(6) as u32)).await;
        }
        let request = request
            .try_clone()
            .ok_or_else(|| anyhow!("Request body cannot be retried"))?;
        match send_to_text(request).await {
            Ok(resp) if resp.status.is_server_error() => {
                debug!(status = %resp.status, attempt, "Server error, retrying");
                last_error = anyhow!("Server answered {}", resp.status);
            }
            Ok(resp) => return Ok(resp),
            Err(e) => {
                debug!(error = %e, attempt, "Request failed, retrying");
                last_error = e.into();
            }
        }
    }
    Err(last_error)
}
