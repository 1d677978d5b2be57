//! Eureka-backed [`DiscoveryClient`].
//!
//! The market service registers itself in Eureka under an application name.
//! Resolution reads that application's instance list and picks the first
//! `UP` instance's home page URL; registration posts the new market to that
//! URL.

use std::time::Duration;

use async_trait::async_trait;
use mkt_core::StreamError;
use serde::Deserialize;
use tracing::debug;

use super::DiscoveryClient;

#[derive(Debug, Deserialize)]
struct AppEnvelope {
    application: Application,
}

#[derive(Debug, Deserialize)]
struct Application {
    #[serde(default)]
    instance: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
struct Instance {
    #[serde(rename = "homePageUrl", default)]
    home_page_url: String,
    #[serde(default)]
    status: String,
}

/// Pick the home page URL of the first `UP` instance in an Eureka
/// `GET /apps/{name}` response body.
pub fn pick_home_page(body: &str) -> Result<String, String> {
    let envelope: AppEnvelope = serde_json::from_str(body).map_err(|e| format!("bad eureka response: {e}"))?;
    envelope
        .application
        .instance
        .into_iter()
        .find(|i| i.status.eq_ignore_ascii_case("UP") && !i.home_page_url.is_empty())
        .map(|i| i.home_page_url.trim_end_matches('/').to_string())
        .ok_or_else(|| "no UP instance".to_string())
}

/// HTTP client for an Eureka directory and the market service behind it.
pub struct EurekaClient {
    http: reqwest::Client,
    eureka_url: String,
    register_path: String,
}

impl EurekaClient {
    pub fn new(eureka_url: &str, register_path: &str, request_timeout: Duration) -> Result<Self, StreamError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StreamError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            eureka_url: eureka_url.trim_end_matches('/').to_string(),
            register_path: register_path.to_string(),
        })
    }

    fn apps_url(&self, service_name: &str) -> String {
        format!("{}/apps/{}", self.eureka_url, service_name.to_uppercase())
    }
}

#[async_trait]
impl DiscoveryClient for EurekaClient {
    async fn resolve(&self, service_name: &str) -> Result<String, StreamError> {
        let fail = |reason: String| StreamError::DiscoveryResolution {
            service: service_name.to_string(),
            reason,
        };

        let url = self.apps_url(service_name);
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("{url} returned {status}")));
        }
        let body = resp.text().await.map_err(|e| fail(e.to_string()))?;
        let home = pick_home_page(&body).map_err(fail)?;
        debug!("resolved {service_name} -> {home}");
        Ok(home)
    }

    async fn register_market(&self, market_id: u64, symbol: &str, url: &str) -> Result<(), StreamError> {
        let fail = |reason: String| StreamError::DiscoveryRegistration {
            market_id,
            symbol: symbol.to_string(),
            reason,
        };

        let endpoint = format!("{}{}", url.trim_end_matches('/'), self.register_path);
        let resp = self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({ "id": market_id, "name": symbol }))
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(fail(format!("{endpoint} returned {status}: {body}")));
        }
        Ok(())
    }
}
