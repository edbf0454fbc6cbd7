use crate::config::Credentials;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, Url};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub body: String,
    pub json: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: Client,
    credentials: Option<Credentials>,
}

impl ApiClient {
    pub fn new(base_url: &str, credentials: Option<Credentials>, timeout: Duration) -> Result<Self> {
        let mut parsed = Url::parse(base_url).context("parsing site URL")?;
        // keep sub-directory installs when joining relative paths
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(HeaderValue::from_static("streamctl/0.1"))
            // admin-ajax.php keys its session on cookies
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            base_url: parsed,
            http,
            credentials,
        })
    }

    pub fn get(&self, path: &str, query: &[(String, String)]) -> Result<ResponseData> {
        self.request(Method::GET, path, query, None)
    }

    pub fn post_form(&self, path: &str, form: &[(String, String)]) -> Result<ResponseData> {
        self.request(Method::POST, path, &[], Some(form))
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        form: Option<&[(String, String)]>,
    ) -> Result<ResponseData> {
        let normalized = path.trim_start_matches('/');
        let url = self
            .base_url
            .join(normalized)
            .with_context(|| format!("joining path `{}` to site URL", path))?;

        tracing::debug!(%method, %url, "sending request");

        let mut request = self
            .http
            .request(method, url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.app_password));
        }

        if !query.is_empty() {
            request = request.query(query);
        }

        if let Some(form) = form {
            request = request.form(form);
        }

        let response = request
            .send()
            .and_then(|r| r.error_for_status())
            .context("sending request")?;

        let status = response.status().as_u16();
        let text = response.text().context("reading response body")?;
        let json = serde_json::from_str(&text).ok();

        tracing::debug!(status, bytes = text.len(), "received response");

        Ok(ResponseData {
            status,
            body: text,
            json,
        })
    }
}
