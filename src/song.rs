use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;

use crate::error::RepairError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdate {
    pub file_size: u64,
    pub file_md5sum: String,
}

pub trait SongClient: Send + Sync {
    fn get_analysis_state(&self, project: &str, analysis_id: &str) -> Result<String, RepairError>;
    fn update_file(
        &self,
        project: &str,
        object_id: &str,
        update: &FileUpdate,
    ) -> Result<(), RepairError>;
    fn publish(&self, project: &str, analysis_id: &str) -> Result<(), RepairError>;
}

#[derive(Clone)]
pub struct SongHttpClient {
    client: Client,
    base_url: String,
}

impl SongHttpClient {
    pub fn new(base_url: &str, access_token: Option<&str>) -> Result<Self, RepairError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("meta-repair/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RepairError::SongHttp(err.to_string()))?,
        );
        if let Some(token) = access_token {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {trimmed}"))
                        .map_err(|err| RepairError::SongHttp(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| RepairError::SongHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, RepairError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(RepairError::SongHttp(err.to_string()));
                }
            }
        }
    }

    fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, RepairError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "SONG request failed".to_string());
        Err(RepairError::SongStatus { status, message })
    }
}

impl SongClient for SongHttpClient {
    fn get_analysis_state(&self, project: &str, analysis_id: &str) -> Result<String, RepairError> {
        let url = format!("{}/studies/{project}/analysis/{analysis_id}", self.base_url);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let response = Self::check_status(response)?;
        let body: Value = response
            .json()
            .map_err(|err| RepairError::SongHttp(err.to_string()))?;
        body.get("analysisState")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .ok_or_else(|| RepairError::SongHttp("analysis response missing analysisState".to_string()))
    }

    fn update_file(
        &self,
        project: &str,
        object_id: &str,
        update: &FileUpdate,
    ) -> Result<(), RepairError> {
        let url = format!("{}/studies/{project}/files/{object_id}", self.base_url);
        let response = self
            .client
            .put(&url)
            .json(update)
            .send()
            .map_err(|err| RepairError::SongHttp(err.to_string()))?;
        Self::check_status(response)?;
        Ok(())
    }

    fn publish(&self, project: &str, analysis_id: &str) -> Result<(), RepairError> {
        let url = format!(
            "{}/studies/{project}/analysis/publish/{analysis_id}",
            self.base_url
        );
        let response = self
            .client
            .put(&url)
            .send()
            .map_err(|err| RepairError::SongHttp(err.to_string()))?;
        Self::check_status(response)?;
        Ok(())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
