//! HTTP Remote Store
//!
//! reqwest client against a document-store REST layout:
//! `{base}/users/{user}/{category}/data`. GET returns the stored JSON
//! body or 404 when the document does not exist; PUT replaces it.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::auth::Identity;
use crate::domain::{DomainError, DomainResult};
use super::remote::{Category, RemoteStore};

/// Remote document store reachable over HTTP
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_token: None,
        }
    }

    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_token: Some(token.into()),
        }
    }

    fn document_url(&self, identity: &Identity, category: Category) -> String {
        format!(
            "{}/users/{}/{}/data",
            self.base_url.trim_end_matches('/'),
            identity.as_str(),
            category.as_str()
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(
        &self,
        identity: &Identity,
        category: Category,
    ) -> DomainResult<Option<serde_json::Value>> {
        let url = self.document_url(identity, category);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| DomainError::Remote(format!("GET {}: {}", category, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(DomainError::Remote(format!(
                "GET {}: status {}",
                category,
                response.status()
            )));
        }

        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| DomainError::Remote(format!("decode {}: {}", category, e)))?;
        Ok(Some(body))
    }

    async fn put(
        &self,
        identity: &Identity,
        category: Category,
        body: serde_json::Value,
    ) -> DomainResult<()> {
        let url = self.document_url(identity, category);
        let response = self
            .authorize(self.client.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::Remote(format!("PUT {}: {}", category, e)))?;

        if !response.status().is_success() {
            return Err(DomainError::Remote(format!(
                "PUT {}: status {}",
                category,
                response.status()
            )));
        }
        Ok(())
    }
}
