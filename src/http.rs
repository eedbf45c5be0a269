use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client as HttpClient, ClientBuilder, Response};
use serde_json::Value;

use crate::error::RoomError;

/// Server endpoints for one room. `action` carries a `:name` placeholder
/// filled in per call; `socket` is the control-channel URL.
#[derive(Clone, Debug)]
pub struct RoomUrls {
    pub join: String,
    pub messages: String,
    pub action: String,
    pub recordings: String,
    pub socket: String,
}

impl RoomUrls {
    pub fn for_room(base: &str, room: &str) -> Self {
        let base = base.trim_end_matches('/');
        let socket_base = base
            .replace("http://", "ws://")
            .replace("https://", "wss://");
        RoomUrls {
            join: format!("{base}/rooms/{room}/join/"),
            messages: format!("{base}/rooms/{room}/messages/"),
            action: format!("{base}/rooms/{room}/actions/:name/"),
            recordings: format!("{base}/rooms/{room}/recordings/"),
            socket: format!("{socket_base}/rooms/{room}/socket/"),
        }
    }
}

/// Injected HTTP capability so the core runs without a live network in
/// tests, and so retry/backoff policy can vary by deployment. This layer
/// never retries: a failed request surfaces to the caller as-is.
pub trait RoomApi {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> impl Future<Output = Result<Value, RoomError>> + Send;
    fn get_json(&self, url: &str) -> impl Future<Output = Result<Value, RoomError>> + Send;
}

/// Production implementation over reqwest.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
}

impl ApiClient {
    pub fn new(auth_token: Option<&str>) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("roomlink/0.1")
            .no_proxy();

        if let Some(token) = auth_token {
            builder = builder.default_headers({
                let mut h = reqwest::header::HeaderMap::new();
                let value = format!("Bearer {token}");
                h.insert(
                    reqwest::header::AUTHORIZATION,
                    reqwest::header::HeaderValue::from_str(&value)?,
                );
                h
            });
        }

        Ok(ApiClient {
            http: builder.build()?,
        })
    }
}

impl RoomApi for ApiClient {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RoomError> {
        let resp = self.http.post(url).json(body).send().await?;
        map_json(resp, "post").await
    }

    async fn get_json(&self, url: &str) -> Result<Value, RoomError> {
        let resp = self.http.get(url).send().await?;
        map_json(resp, "get").await
    }
}

async fn map_json(resp: Response, op: &'static str) -> Result<Value, RoomError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RoomError::Status {
        op,
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_at_the_room() {
        let urls = RoomUrls::for_room("https://example.com/", "kitchen");
        assert_eq!(urls.join, "https://example.com/rooms/kitchen/join/");
        assert_eq!(urls.messages, "https://example.com/rooms/kitchen/messages/");
        assert_eq!(
            urls.action,
            "https://example.com/rooms/kitchen/actions/:name/"
        );
        assert_eq!(
            urls.recordings,
            "https://example.com/rooms/kitchen/recordings/"
        );
        assert_eq!(urls.socket, "wss://example.com/rooms/kitchen/socket/");
    }

    #[test]
    fn socket_url_downgrades_with_plain_http() {
        let urls = RoomUrls::for_room("http://127.0.0.1:8000", "kitchen");
        assert_eq!(urls.socket, "ws://127.0.0.1:8000/rooms/kitchen/socket/");
    }
}
