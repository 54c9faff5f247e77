//! HTTP client for the Amadeus uPoW API and chain RPC

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use turbomul_engine::{
    Dimensions, EngineError, LedgerClient, Result, Solution, SubmitReceipt, Validation, Workload,
};

use crate::config::ApiConfig;

const WORKLOAD_PATH: &str = "/api/upow/seed_with_matrix_a_b";
const VALIDATE_PATH: &str = "/api/upow/validate";
const CHAIN_STATS_PATH: &str = "/api/chain/stats";
const SUBMIT_PATH: &str = "/api/tx/submit_and_wait";
const EPOCH_SCORE_PATH: &str = "/api/epoch/score";

#[derive(Debug, Deserialize)]
struct ChainStatsResponse {
    stats: Option<ChainStats>,
}

#[derive(Debug, Deserialize)]
struct ChainStats {
    diff_bits: Option<u32>,
    height: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    valid_math: bool,
}

pub struct HttpLedgerClient {
    http: Client,
    api_url: String,
    rpc_url: String,
    fetch_timeout: Duration,
    stats_timeout: Duration,
    submit_timeout: Duration,
    dims: Dimensions,
}

impl HttpLedgerClient {
    pub fn new(api: &ApiConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(api.insecure_tls)
            .user_agent(concat!("turbomul-miner/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_url: api.base_url.trim_end_matches('/').to_string(),
            rpc_url: api.rpc_url.trim_end_matches('/').to_string(),
            fetch_timeout: Duration::from_secs(api.fetch_timeout_secs),
            stats_timeout: Duration::from_secs(api.stats_timeout_secs),
            submit_timeout: Duration::from_secs(api.submit_timeout_secs),
            dims: Dimensions::AMADEUS,
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn rpc(&self, path: &str) -> String {
        format!("{}{}", self.rpc_url, path)
    }

    async fn get_bytes(&self, op: &'static str, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| EngineError::transient(op, e))?;
        let response = check_status(op, response)?;
        let body = response
            .bytes()
            .await
            .map_err(|e| EngineError::transient(op, e))?;
        Ok(body.to_vec())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        op: &'static str,
        url: &str,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| EngineError::transient(op, e))?;
        check_status(op, response)?
            .json::<T>()
            .await
            .map_err(|e| EngineError::transient(op, e))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        op: &'static str,
        url: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| EngineError::transient(op, e))?;
        check_status(op, response)?
            .json::<T>()
            .await
            .map_err(|e| EngineError::transient(op, e))
    }
}

fn check_status(op: &'static str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::transient(op, format!("HTTP {}", status)));
    }
    Ok(response)
}

/// `error == "ok"` is the ledger's success marker for submissions.
fn submission_accepted(raw: &serde_json::Value) -> bool {
    raw.get("error").and_then(|e| e.as_str()) == Some("ok")
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn fetch_workload(&self) -> Result<Workload> {
        let body = self
            .get_bytes("fetch_workload", &self.api(WORKLOAD_PATH), self.fetch_timeout)
            .await?;
        debug!("Workload response: {} bytes", body.len());
        Workload::from_response(&body, self.dims)
    }

    async fn fetch_difficulty(&self) -> Result<Option<u32>> {
        let stats: ChainStatsResponse = self
            .get_json("fetch_difficulty", &self.rpc(CHAIN_STATS_PATH), self.stats_timeout)
            .await?;
        let stats = stats.stats;
        if let Some(height) = stats.as_ref().and_then(|s| s.height) {
            debug!("Chain height {}", height);
        }
        Ok(stats.and_then(|s| s.diff_bits))
    }

    async fn validate(&self, solution: &Solution) -> Result<Validation> {
        let resp: ValidateResponse = self
            .post_json("validate", &self.api(VALIDATE_PATH), solution.as_bytes(), self.submit_timeout)
            .await?;
        Ok(Validation {
            valid: resp.valid,
            valid_math: resp.valid_math,
        })
    }

    async fn submit(&self, solution: &Solution) -> Result<SubmitReceipt> {
        let raw: serde_json::Value = self
            .post_json("submit", &self.rpc(SUBMIT_PATH), solution.as_bytes(), self.submit_timeout)
            .await?;
        Ok(SubmitReceipt {
            accepted: submission_accepted(&raw),
            raw,
        })
    }

    async fn epoch_score(&self) -> Result<Option<serde_json::Value>> {
        let raw: serde_json::Value = self
            .get_json("epoch_score", &self.rpc(EPOCH_SCORE_PATH), self.stats_timeout)
            .await?;
        Ok(if raw.is_null() { None } else { Some(raw) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submission_marker() {
        assert!(submission_accepted(&json!({ "error": "ok", "hash": "abc" })));
        assert!(!submission_accepted(&json!({ "error": "invalid_sol" })));
        assert!(!submission_accepted(&json!({})));
    }

    #[test]
    fn test_chain_stats_shapes() {
        let full: ChainStatsResponse =
            serde_json::from_str(r#"{"stats": {"diff_bits": 24, "height": 100}}"#).unwrap();
        assert_eq!(full.stats.and_then(|s| s.diff_bits), Some(24));

        let missing: ChainStatsResponse = serde_json::from_str(r#"{"stats": {}}"#).unwrap();
        assert_eq!(missing.stats.and_then(|s| s.diff_bits), None);

        let empty: ChainStatsResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.stats.is_none());
    }

    #[test]
    fn test_validate_response_defaults() {
        let v: ValidateResponse = serde_json::from_str(r#"{"valid_math": true}"#).unwrap();
        assert!(v.valid_math);
        assert!(!v.valid);
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let mut api = ApiConfig::default();
        api.base_url = "https://example.test/".to_string();
        let client = HttpLedgerClient::new(&api).unwrap();
        assert_eq!(client.api(WORKLOAD_PATH), "https://example.test/api/upow/seed_with_matrix_a_b");
        assert_eq!(client.rpc(SUBMIT_PATH), "https://testnet-rpc.ama.one/api/tx/submit_and_wait");
    }
}
