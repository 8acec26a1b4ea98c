//! ---
//! sfb_section: "03-persistence-logging"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Store port and adapters for telemetry history and alerts."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! Supabase / PostgREST adapter.
//!
//! Every request carries the `apikey` header and the same key as a bearer
//! token. Writes ask for `Prefer: return=representation` so the stored row
//! comes back in the response. Filters use PostgREST operator syntax
//! (`column=eq.value`). Open-alert uniqueness is expected to be enforced by a
//! partial unique index; its violation surfaces as HTTP 409.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use sfb_common::StoreConfig;
use sfb_telemetry::FactoryId;

use crate::model::{Alert, AlertFilter, AlertId, AlertKey, NewAlert, NewTelemetry, TelemetryRow};
use crate::{BridgeStore, Result, StoreError};

const REST_PATH: &str = "rest/v1/";
const MAX_ERROR_BODY: usize = 512;

/// Table names used by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgrestTables {
    /// Telemetry history.
    pub telemetry: String,
    /// Alert rows.
    pub alerts: String,
    /// Factory registry carrying `last_data_received`.
    pub factories: String,
}

impl Default for PostgrestTables {
    fn default() -> Self {
        Self {
            telemetry: "telemetry".into(),
            alerts: "system_alerts".into(),
            factories: "factories".into(),
        }
    }
}

/// PostgREST-backed store.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: Client,
    base: Url,
    api_key: Option<String>,
    tables: PostgrestTables,
}

impl PostgrestStore {
    /// Build the adapter from configuration. The API key is read from the
    /// environment variable named in the configuration.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let raw = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("store.url is not configured".into()))?;
        let client = Client::builder().timeout(config.timeout).build()?;
        let api_key = config.api_key();
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "no PostgREST api key in environment; requests are anonymous");
        }
        let tables = PostgrestTables {
            telemetry: config.telemetry_table.clone(),
            alerts: config.alerts_table.clone(),
            factories: config.factories_table.clone(),
        };
        Self::new(Url::parse(raw)?, api_key, tables, client)
    }

    /// Build the adapter against a project URL (`https://<ref>.supabase.co`)
    /// or a bare PostgREST root already ending in `rest/v1`.
    pub fn new(
        endpoint: Url,
        api_key: Option<String>,
        tables: PostgrestTables,
        client: Client,
    ) -> Result<Self> {
        Ok(Self {
            client,
            base: rest_root(endpoint)?,
            api_key,
            tables,
        })
    }

    /// Root URL requests are resolved against.
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn table_url(&self, table: &str, filters: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base.join(table)?;
        if !filters.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (column, value) in filters {
                pairs.append_pair(column, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn rows<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Vec<T>> {
        let response = check(builder.send().await?).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn write_one<B, T>(&self, method: Method, url: Url, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self
            .request(method, url)
            .header("Prefer", "return=representation")
            .json(body);
        let mut rows: Vec<T> = self.rows(builder).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn patch_open_alert(&self, id: AlertId, body: serde_json::Value) -> Result<Alert> {
        let url = self.table_url(
            &self.tables.alerts,
            &[("id", eq(id)), ("is_resolved", eq(false))],
        )?;
        self.write_one(Method::PATCH, url, &body)
            .await?
            .ok_or(StoreError::NotFound(id))
    }
}

fn rest_root(mut endpoint: Url) -> Result<Url> {
    if !endpoint.path().ends_with('/') {
        let path = format!("{}/", endpoint.path());
        endpoint.set_path(&path);
    }
    if endpoint.path().ends_with(REST_PATH) {
        Ok(endpoint)
    } else {
        Ok(endpoint.join(REST_PATH)?)
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|idx| body.is_char_boundary(*idx))
            .unwrap_or(0);
        body.truncate(cut);
    }
    debug!(status = status.as_u16(), %body, "postgrest request failed");
    Err(StoreError::Http {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl BridgeStore for PostgrestStore {
    async fn insert_telemetry(&self, row: &NewTelemetry) -> Result<TelemetryRow> {
        let url = self.table_url(&self.tables.telemetry, &[])?;
        self.write_one(Method::POST, url, row).await?.ok_or_else(|| {
            StoreError::Unavailable("telemetry insert returned no row".into())
        })
    }

    async fn touch_factory(&self, factory: FactoryId, at: DateTime<Utc>) -> Result<()> {
        let url = self.table_url(&self.tables.factories, &[("id", eq(factory))])?;
        let builder = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=minimal")
            .json(&json!({ "last_data_received": timestamp(at) }));
        check(builder.send().await?).await?;
        Ok(())
    }

    async fn insert_alert(&self, alert: &NewAlert) -> Result<Alert> {
        let url = self.table_url(&self.tables.alerts, &[])?;
        match self.write_one(Method::POST, url, alert).await {
            Ok(Some(stored)) => Ok(stored),
            Ok(None) => Err(StoreError::Unavailable("alert insert returned no row".into())),
            Err(StoreError::Http { status, .. }) if status == StatusCode::CONFLICT.as_u16() => {
                Err(StoreError::Conflict(alert.key()))
            }
            Err(err) => Err(err),
        }
    }

    async fn find_open_alert(&self, key: &AlertKey) -> Result<Option<Alert>> {
        let url = self.table_url(
            &self.tables.alerts,
            &[
                ("factory_id", eq(key.factory_id)),
                ("system_name", eq(&key.system)),
                ("alert_type", eq(key.alert_type)),
                ("is_resolved", eq(false)),
                ("order", "created_at.desc".into()),
                ("limit", "1".into()),
            ],
        )?;
        let mut rows: Vec<Alert> = self.rows(self.request(Method::GET, url)).await?;
        Ok(rows.pop())
    }

    async fn update_alert(&self, id: AlertId, message: &str, at: DateTime<Utc>) -> Result<Alert> {
        self.patch_open_alert(
            id,
            json!({ "message": message, "updated_at": timestamp(at) }),
        )
        .await
    }

    async fn resolve_alert(&self, id: AlertId, at: DateTime<Utc>) -> Result<Alert> {
        let at = timestamp(at);
        self.patch_open_alert(
            id,
            json!({ "is_resolved": true, "resolved_at": at, "updated_at": at }),
        )
        .await
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut filters = Vec::new();
        if let Some(factory) = filter.factory_id {
            filters.push(("factory_id", eq(factory)));
        }
        if let Some(system) = &filter.system {
            filters.push(("system_name", eq(system)));
        }
        if let Some(open) = filter.open {
            filters.push(("is_resolved", eq(!open)));
        }
        filters.push(("order", "created_at.desc,id.desc".into()));
        if let Some(limit) = filter.limit {
            filters.push(("limit", limit.to_string()));
        }
        let url = self.table_url(&self.tables.alerts, &filters)?;
        self.rows(self.request(Method::GET, url)).await
    }

    async fn acknowledge_alert(&self, id: AlertId, at: DateTime<Utc>) -> Result<Alert> {
        let url = self.table_url(
            &self.tables.alerts,
            &[("id", eq(id)), ("is_acknowledged", eq(false))],
        )?;
        let body = json!({ "is_acknowledged": true, "acknowledged_at": timestamp(at) });
        if let Some(alert) = self.write_one(Method::PATCH, url, &body).await? {
            return Ok(alert);
        }
        // Already acknowledged, or missing.
        let url = self.table_url(&self.tables.alerts, &[("id", eq(id))])?;
        let mut rows: Vec<Alert> = self.rows(self.request(Method::GET, url)).await?;
        rows.pop().ok_or(StoreError::NotFound(id))
    }
}
