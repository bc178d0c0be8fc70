//! Reddit backend.
//!
//! Talks to the OAuth API with a script-app password grant. One client is
//! built per configured app and shared by every worker replicated from it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::traits::*;
use crate::codec::PostId;
use crate::config::PlatformConfig;

/// Tokens are refreshed this long before the platform expires them.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Account and app credentials for one client.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// Reddit API client.
pub struct RedditClient {
    client: Client,
    credentials: Credentials,
    auth_url: String,
    api_url: String,
    token: RwLock<Option<AccessToken>>,
}

impl RedditClient {
    /// Create a client; no request is made until the first call.
    pub fn new(credentials: Credentials, config: &PlatformConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        Ok(Self {
            client,
            credentials,
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Return a valid bearer token, fetching a new one when needed.
    async fn access_token(&self) -> Result<String, PlatformError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        let mut guard = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = guard.as_ref() {
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        debug!(client_id = %self.credentials.client_id, "Requesting access token");
        let response = self
            .client
            .post(format!("{}/api/v1/access_token", self.auth_url))
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(PlatformError::Auth(error));
        }
        let value = body
            .access_token
            .ok_or_else(|| PlatformError::Auth("no access token in response".to_string()))?;

        let token = AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in.unwrap_or(3600)),
        };
        *guard = Some(token);
        Ok(value)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let token = self.access_token().await?;
        let response = request
            .header(header::AUTHORIZATION, format!("bearer {}", token))
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;
        check_status(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

/// Map non-success statuses onto platform errors.
async fn check_status(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64);
            Err(PlatformError::RateLimited { retry_after_secs })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(PlatformError::Auth(format!("HTTP {}", status)))
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(PlatformError::RequestFailed(format!("HTTP {}: {}", status, body)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// `api_type=json` envelope shared by submit and edit.
#[derive(Debug, Deserialize)]
struct JsonEnvelope<T> {
    json: JsonBody<T>,
}

#[derive(Debug, Deserialize)]
struct JsonBody<T> {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    data: Option<T>,
}

impl<T> JsonBody<T> {
    fn into_result(self) -> Result<Option<T>, PlatformError> {
        if self.errors.is_empty() {
            Ok(self.data)
        } else {
            let errors: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
            Err(PlatformError::RequestFailed(errors.join("; ")))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    data: LinkData,
}

#[derive(Debug, Deserialize)]
struct LinkData {
    id: String,
    name: Option<String>,
    created_utc: Option<f64>,
}

fn parse_id(raw: &str) -> Result<PostId, PlatformError> {
    raw.parse()
        .map_err(|e: crate::codec::FormatError| PlatformError::InvalidResponse(e.to_string()))
}

impl LinkData {
    fn into_item(self) -> Result<Item, PlatformError> {
        let id = parse_id(&self.id)?;
        let mut item = Item::new(id);
        if let Some(name) = self.name {
            item.fullname = name;
        }
        if let Some(created) = self
            .created_utc
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts as i64, 0))
        {
            item = item.with_created_at(created);
        }
        Ok(item)
    }
}

#[async_trait]
impl ContentPlatform for RedditClient {
    fn id(&self) -> &str {
        &self.credentials.client_id
    }

    async fn create_item(
        &self,
        location: &Location,
        title: &str,
        body: &str,
    ) -> Result<Item, PlatformError> {
        let sr = location.api_name();
        let request = self.client.post(self.url("/api/submit")).form(&[
            ("sr", sr.as_str()),
            ("kind", "self"),
            ("title", title),
            ("text", body),
            ("api_type", "json"),
            ("resubmit", "true"),
        ]);

        let envelope: JsonEnvelope<SubmitData> = self
            .authorized(request)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        let data = envelope.json.into_result()?.ok_or_else(|| {
            PlatformError::InvalidResponse("submit response without data".to_string())
        })?;

        let mut item = Item::new(parse_id(&data.id)?).with_created_at(Utc::now());
        if let Some(name) = data.name {
            item.fullname = name;
        }
        Ok(item)
    }

    async fn delete_item(&self, item: &Item) -> Result<(), PlatformError> {
        let request = self
            .client
            .post(self.url("/api/del"))
            .form(&[("id", item.fullname.as_str())]);
        self.authorized(request).await?;
        Ok(())
    }

    async fn edit_item(&self, item: &Item, body: &str) -> Result<(), PlatformError> {
        let request = self.client.post(self.url("/api/editusertext")).form(&[
            ("thing_id", item.fullname.as_str()),
            ("text", body),
            ("api_type", "json"),
        ]);

        let envelope: JsonEnvelope<serde_json::Value> = self
            .authorized(request)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;
        envelope.json.into_result()?;
        Ok(())
    }

    async fn list_recent(
        &self,
        location: &Location,
        limit: usize,
    ) -> Result<Vec<Item>, PlatformError> {
        let path = match location {
            Location::Community(name) => format!("/r/{}/new", name),
            Location::UserProfile(user) => format!("/user/{}/submitted", user),
        };
        let request = self
            .client
            .get(self.url(&path))
            .query(&[("limit", limit.to_string()), ("raw_json", "1".to_string())]);

        let listing: Listing = self
            .authorized(request)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        listing
            .data
            .children
            .into_iter()
            .map(|thing| thing.data.into_item())
            .collect()
    }
}
