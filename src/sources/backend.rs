//! Thin client for the project's telemetry web application.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::BackendError;
use crate::fetch::{ContentKind, Fetch, Method, RawDocument, Request};
use crate::settings::BackendSettings;

pub const API_URI: &str = "/api/v1";

/// Shared between worker threads when dummy records are sent in parallel.
pub struct BackendClient<'a> {
    fetcher: &'a (dyn Fetch + Sync),
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl<'a> BackendClient<'a> {
    pub fn new(
        fetcher: &'a (dyn Fetch + Sync),
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        BackendClient {
            fetcher,
            base_url: base_url.into(),
            api_key,
            timeout,
        }
    }

    pub fn from_settings(fetcher: &'a (dyn Fetch + Sync), settings: &BackendSettings, production: bool) -> Self {
        Self::new(
            fetcher,
            settings.base_url(production),
            settings.api_key.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the call without sending it. GET and DELETE carry the
    /// parameters in the query string, sorted by key; POST sends them as a
    /// form with `auth_key` appended.
    pub fn build(&self, method: Method, uri: &str, params: &[(&str, &str)]) -> Result<Request, BackendError> {
        let url = format!("{}{}", self.base_url, uri);
        let mut req = Request::new(method, url, ContentKind::Json).timeout(self.timeout);
        match method {
            Method::Get | Method::Delete => {
                let mut sorted = params.to_vec();
                sorted.sort_by_key(|(k, _)| *k);
                for (k, v) in sorted {
                    req = req.query(k, v);
                }
            }
            Method::Post => {
                let key = self.api_key.as_deref().ok_or(BackendError::MissingApiKey)?;
                for (k, v) in params {
                    req = req.form(*k, *v);
                }
                req = req.form("auth_key", key);
            }
        }
        Ok(req)
    }

    fn send(&self, method: Method, uri: &str, params: &[(&str, &str)]) -> Result<RawDocument, BackendError> {
        let req = self.build(method, uri, params)?;
        let doc = self.fetcher.fetch(&req)?;
        debug!(url = %req.url, bytes = doc.body.len(), "backend answered");
        Ok(doc)
    }

    pub fn request(&self, method: Method, uri: &str, params: &[(&str, &str)]) -> Result<Value, BackendError> {
        let doc = self.send(method, uri, params)?;
        serde_json::from_slice(&doc.body).map_err(|_| BackendError::NotJson {
            body: doc.text().into_owned(),
        })
    }

    pub fn test_connection(&self) -> Result<Value, BackendError> {
        self.request(Method::Post, API_URI, &[("subject", "test")])
    }

    /// Runs `query` (terminator added) and returns the rows as a JSON array.
    pub fn sql_query(&self, query: &str) -> Result<Value, BackendError> {
        let query_str = format!("{query};");
        let rows = self.request(
            Method::Post,
            API_URI,
            &[("subject", "sql_query"), ("query_str", query_str.as_str())],
        )?;
        if rows.is_array() {
            Ok(rows)
        } else {
            Err(BackendError::UnexpectedShape {
                expected: "an array of rows",
                found: rows.to_string(),
            })
        }
    }

    /// Hands one record to the collector endpoint. The collector answers
    /// with a status only, so the body is not inspected.
    pub fn save(&self, collector_path: &str, subject: &str, fields: &[(&str, &str)]) -> Result<(), BackendError> {
        let mut params = vec![("subject", subject)];
        params.extend_from_slice(fields);
        self.send(Method::Get, collector_path, &params)?;
        Ok(())
    }
}
