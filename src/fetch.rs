use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::error::FetchError;
use crate::settings::HttpSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Json,
    Binary,
}

impl ContentKind {
    pub fn name(self) -> &'static str {
        match self {
            ContentKind::Html => "HTML",
            ContentKind::Json => "JSON",
            ContentKind::Binary => "binary",
        }
    }
}

/// One outbound call: endpoint, verb, query string and optional form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub kind: ContentKind,
    /// Overrides the fetcher's default bound for this call.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>, kind: ContentKind) -> Self {
        Request {
            url: url.into(),
            method,
            query: Vec::new(),
            form: Vec::new(),
            kind,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>, kind: ContentKind) -> Self {
        Request::new(Method::Get, url, kind)
    }

    pub fn post(url: impl Into<String>, kind: ContentKind) -> Self {
        Request::new(Method::Post, url, kind)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `url?k=v&k=v`, unencoded. Used for logs and as the lookup key of [`CannedFetcher`].
    pub fn describe(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let qs: Vec<String> = self.query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}?{}", self.url, qs.join("&"))
    }
}

/// Response body of one request, tagged with what the caller asked for.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub kind: ContentKind,
    pub body: Vec<u8>,
}

impl RawDocument {
    pub fn new(kind: ContentKind, body: impl Into<Vec<u8>>) -> Self {
        RawDocument {
            kind,
            body: body.into(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

pub trait Fetch {
    fn fetch(&self, request: &Request) -> Result<RawDocument, FetchError>;
}

/// Blocking HTTP fetcher. One attempt per call, bounded by the configured timeout.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(FetchError::Client)?;
        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, request: &Request) -> Result<RawDocument, FetchError> {
        debug!(method = ?request.method, url = %request.describe(), "fetch");
        let mut builder = self
            .client
            .request(request.method.as_reqwest(), &request.url)
            .query(&request.query);
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().map_err(|source| FetchError::Transport {
            url: request.url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.describe(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(|source| FetchError::Body {
            url: request.url.clone(),
            source,
        })?;
        Ok(RawDocument::new(request.kind, body.to_vec()))
    }
}

/// Serves fixed bodies keyed by [`Request::describe`]; anything else answers 404.
/// Lets the pipeline run against saved pages without touching the network.
#[derive(Default)]
pub struct CannedFetcher {
    responses: HashMap<String, Result<Vec<u8>, u16>>,
}

impl CannedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, described: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(described.into(), Ok(body.into()));
        self
    }

    pub fn fail(mut self, described: impl Into<String>, status: u16) -> Self {
        self.responses.insert(described.into(), Err(status));
        self
    }
}

impl Fetch for CannedFetcher {
    fn fetch(&self, request: &Request) -> Result<RawDocument, FetchError> {
        let key = request.describe();
        match self.responses.get(&key) {
            Some(Ok(body)) => Ok(RawDocument::new(request.kind, body.clone())),
            Some(Err(status)) => Err(FetchError::Status {
                url: key,
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: key,
                status: 404,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_keeps_query_order() {
        let req = Request::get("https://example.org/route", ContentKind::Json)
            .query("start", "L00P1133")
            .query("mode", "M0000");
        assert_eq!(req.describe(), "https://example.org/route?start=L00P1133&mode=M0000");
        assert_eq!(
            Request::get("https://example.org/", ContentKind::Html).describe(),
            "https://example.org/"
        );
    }

    #[test]
    fn canned_fetcher_serves_and_fails() {
        let fetcher = CannedFetcher::new()
            .respond("https://a/x", "hello")
            .fail("https://a/y", 500);

        let doc = fetcher
            .fetch(&Request::get("https://a/x", ContentKind::Html))
            .unwrap();
        assert_eq!(doc.text(), "hello");
        assert_eq!(doc.kind, ContentKind::Html);

        match fetcher.fetch(&Request::get("https://a/y", ContentKind::Html)) {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 500),
            other => panic!("unexpected {other:?}"),
        }
        match fetcher.fetch(&Request::get("https://a/z", ContentKind::Html)) {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("unexpected {other:?}"),
        }
    }
}
