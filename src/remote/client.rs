// ABOUTME: HTTP client for the remote command endpoint that processes one batch per call
// ABOUTME: Implements the runner's invoker seam over reqwest

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::models::ErrorPayload;
use super::Invoker;
use crate::scheduler::job::JobId;

pub struct RemoteClient {
    client: Client,
    api_base_url: String,
}

impl RemoteClient {
    pub fn new(api_base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn command_url(&self, command: &str) -> String {
        format!("{}/commands/{}", self.api_base_url, command)
    }

    /// Send one serialized job to `command` and return the echoed job.
    ///
    /// Every failure is turned into a serialized [`ErrorPayload`] carrying the
    /// job id when it can be read from the request body.
    pub async fn execute(
        &self,
        command: &str,
        payload: String,
    ) -> std::result::Result<String, String> {
        let job: Value = serde_json::from_str(&payload).map_err(|err| {
            ErrorPayload::new(None, format!("Invalid job payload: {}", err)).to_json()
        })?;
        let job_id = job_id_of(&job);
        let url = self.command_url(command);

        let response = self
            .client
            .post(&url)
            .json(&job)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(command, error = %err, "Remote call did not complete");
                ErrorPayload::new(job_id, format!("Failed to reach remote service: {}", err))
                    .to_json()
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            ErrorPayload::new(job_id, format!("Failed to read remote response: {}", err)).to_json()
        })?;

        if !status.is_success() {
            tracing::warn!(command, status = %status, "Remote call rejected");
            if body.trim().is_empty() {
                let message = format!("Remote call failed with status {}", status);
                return Err(ErrorPayload::new(job_id, message).to_json());
            }
            return Err(body);
        }

        Ok(body)
    }
}

impl Invoker for RemoteClient {
    fn invoke<'a>(
        &'a self,
        command: &'a str,
        payload: String,
    ) -> BoxFuture<'a, std::result::Result<String, String>> {
        Box::pin(self.execute(command, payload))
    }
}

fn job_id_of(job: &Value) -> Option<JobId> {
    job.get("id")?.as_u64().map(JobId)
}
