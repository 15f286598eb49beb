//! Snapshot source backed by the REST API.

use crate::error::{SyncError, SyncResult};
use crate::source::{BillSource, CollectionSource};
use api_shared::auth::{actor_headers, API_KEY_HEADER};
use api_shared::{ErrorRes, HealthRes, ListRes, WireEntity};
use async_trait::async_trait;
use clinic_core::lifecycle::Bill;
use clinic_core::{Actor, Collection, ErrorKind, ListFilter};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    actor: Actor,
    api_key: Option<String>,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, actor: Actor) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            actor,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        for (name, value) in actor_headers(&self.actor) {
            req = req.header(name, value);
        }
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }
        req
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> SyncResult<T> {
        let res = req.send().await?;
        let status = res.status();
        let body = res.bytes().await?;
        if !status.is_success() {
            return Err(remote_error(status.as_u16(), &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn health(&self) -> SyncResult<HealthRes> {
        self.send(self.request(Method::GET, "health")).await
    }
}

fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::PermissionDenied,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::IllegalTransition,
        412 => ErrorKind::StaleState,
        422 => ErrorKind::ValidationFailed,
        s if s >= 500 => ErrorKind::Storage,
        _ => ErrorKind::BadRequest,
    }
}

fn remote_error(status: u16, body: &[u8]) -> SyncError {
    match serde_json::from_slice::<ErrorRes>(body) {
        Ok(err) => SyncError::Remote {
            kind: err.kind,
            message: err.message,
        },
        Err(_) => SyncError::Remote {
            kind: kind_for_status(status),
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[async_trait]
impl<E: WireEntity> CollectionSource<E> for HttpSource {
    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn snapshot(&self, filter: &ListFilter) -> SyncResult<Vec<E>> {
        let req = self
            .request(Method::GET, E::COLLECTION.as_str())
            .query(filter);
        let list: ListRes<E> = self.send(req).await?;
        Ok(list.items)
    }

    async fn fetch(&self, id: Uuid) -> SyncResult<E> {
        let path = format!("{}/{id}", E::COLLECTION);
        self.send(self.request(Method::GET, &path)).await
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: E::Status,
        action: E::Action,
    ) -> SyncResult<E> {
        let path = format!("{}/{id}/status", E::COLLECTION);
        let body = E::to_request(expected, &action);
        self.send(self.request(Method::PATCH, &path).json(&body))
            .await
    }
}

#[async_trait]
impl BillSource for HttpSource {
    async fn delete_bill(&self, id: Uuid) -> SyncResult<()> {
        let path = format!("{}/{id}", Collection::Bills);
        let res = self.request(Method::DELETE, &path).send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let body = res.bytes().await?;
        Err(remote_error(status.as_u16(), &body))
    }
}
