#![doc = "Docs host client for the CLI: implements the core `DocsHost` trait against a ReadMe-style REST API."]
//
//! # Docs host client (CLI <-> Core)
//!
//! This module wires the [`DocsHost`] trait from `docs-sync-core` to a real
//! HTTP API. Pages live under `{base_url}/api/v1/docs/{slug}`; the version
//! label travels in the `x-readme-version` header and the API key is sent as
//! the basic-auth user name with an empty password.
//!
//! ## Client Usage
//!
//! - Read the key with [`ApiKey::from_env`] (`README_API_KEY`) and pass it to
//!   [`ReadmeClient::new`]. The client itself never reads the environment.
//! - A client without a key can be constructed; every call then fails with
//!   [`PublishError::MissingCredential`], so runs that publish nothing do not
//!   need a key.

use async_trait::async_trait;
use docs_sync_core::contract::{DocPage, DocsHost, RemoteDoc};
use docs_sync_core::PublishError;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const API_KEY_ENV: &str = "README_API_KEY";
const VERSION_HEADER: &str = "x-readme-version";

/// Docs host API key. Formatting never reveals the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `None` when the variable is unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Self)
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Request body for page create/update.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocBody<'a> {
    title: &'a str,
    slug: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category_slug: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_doc: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    excerpt: Option<&'a str>,
    hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<i64>,
    last_updated_hash: &'a str,
}

impl<'a> From<&'a DocPage> for DocBody<'a> {
    fn from(doc: &'a DocPage) -> Self {
        Self {
            title: &doc.title,
            slug: &doc.slug,
            body: &doc.body,
            category: doc.category.as_deref(),
            category_slug: doc.category_slug.as_deref(),
            parent_doc: doc.parent_doc.as_deref(),
            excerpt: doc.excerpt.as_deref(),
            hidden: doc.hidden,
            order: doc.order,
            last_updated_hash: &doc.content_hash,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocResponse {
    slug: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    last_updated_hash: Option<String>,
}

impl From<DocResponse> for RemoteDoc {
    fn from(doc: DocResponse) -> Self {
        RemoteDoc {
            slug: doc.slug,
            title: doc.title,
            last_updated_hash: doc.last_updated_hash,
        }
    }
}

pub struct ReadmeClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<ApiKey>,
}

impl ReadmeClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<ApiKey>) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("docs-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        let base_url = base_url.into();
        let base_url = match Url::parse(&base_url) {
            Ok(url) if !url.cannot_be_a_base() => url,
            Ok(_) => {
                return Err(PublishError::InvalidBaseUrl {
                    url: base_url,
                    reason: "not a hierarchical URL".to_string(),
                })
            }
            Err(e) => {
                return Err(PublishError::InvalidBaseUrl {
                    url: base_url,
                    reason: e.to_string(),
                })
            }
        };
        tracing::info!(
            base_url = %base_url,
            api_key_set = api_key.is_some(),
            "Initialized docs host client"
        );
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// `{base_url}/api/v1/docs[/{slug}]`; the slug is one percent-encoded segment.
    fn docs_url(&self, slug: Option<&str>) -> Result<Url, PublishError> {
        let mut url = self.base_url.clone();
        {
            let mut segments =
                url.path_segments_mut()
                    .map_err(|_| PublishError::InvalidBaseUrl {
                        url: self.base_url.to_string(),
                        reason: "not a hierarchical URL".to_string(),
                    })?;
            segments.pop_if_empty().extend(["api", "v1", "docs"]);
            if let Some(slug) = slug {
                segments.push(slug);
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder, version: &str) -> Result<RequestBuilder, PublishError> {
        let key = self.api_key.as_ref().ok_or_else(|| {
            tracing::error!("No docs host API key configured ({API_KEY_ENV} unset)");
            PublishError::MissingCredential
        })?;
        Ok(request
            .basic_auth(key.expose(), Some(""))
            .header(VERSION_HEADER, version)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PublishError> {
        request.send().await.map_err(|e| {
            tracing::error!(error = ?e, "Docs host request failed");
            PublishError::Transport(e.to_string())
        })
    }

    async fn parse(response: Response, slug: &str) -> Result<RemoteDoc, PublishError> {
        let response = check_status(response, slug).await?;
        response
            .json::<DocResponse>()
            .await
            .map(RemoteDoc::from)
            .map_err(|e| PublishError::Transport(format!("invalid response for {slug}: {e}")))
    }
}

async fn check_status(response: Response, slug: &str) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        tracing::error!(status = status.as_u16(), slug, "Docs host rejected the API key");
        return Err(PublishError::Unauthorized {
            status: status.as_u16(),
        });
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
    tracing::error!(status = status.as_u16(), slug, %body, "Docs host returned error");
    Err(PublishError::Http {
        slug: slug.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl DocsHost for ReadmeClient {
    async fn get_doc(&self, slug: &str, version: &str) -> Result<Option<RemoteDoc>, PublishError> {
        tracing::info!(slug, version, "Fetching page");
        let request = self.authorized(self.http.get(self.docs_url(Some(slug))?), version)?;
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(slug, version, "Page does not exist yet");
            return Ok(None);
        }
        Self::parse(response, slug).await.map(Some)
    }

    async fn create_doc(&self, doc: &DocPage, version: &str) -> Result<RemoteDoc, PublishError> {
        tracing::info!(slug = %doc.slug, version, "Creating page");
        let request = self
            .authorized(self.http.post(self.docs_url(None)?), version)?
            .json(&DocBody::from(doc));
        let response = self.send(request).await?;
        let created = Self::parse(response, &doc.slug).await?;
        tracing::info!(slug = %created.slug, "Successfully created page");
        Ok(created)
    }

    async fn update_doc(
        &self,
        slug: &str,
        doc: &DocPage,
        version: &str,
    ) -> Result<RemoteDoc, PublishError> {
        tracing::info!(slug, version, "Updating page");
        let request = self
            .authorized(self.http.put(self.docs_url(Some(slug))?), version)?
            .json(&DocBody::from(doc));
        let response = self.send(request).await?;
        let updated = Self::parse(response, slug).await?;
        tracing::info!(slug = %updated.slug, "Successfully updated page");
        Ok(updated)
    }
}
