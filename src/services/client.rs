// src/services/client.rs
//! Client for the verification endpoint, used by the `check` command.
//!
//! Mirrors the verification page: POST the SAP id to `/verify`, retry once
//! after a short delay if the server answers with a non-success status.

use crate::services::verifier::VerifiedStudent;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {0} without a readable body")]
    Status(u16),
}

/// Body of a `/verify` response.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<VerifiedStudent>,
}

impl VerifyResponse {
    /// Renders the result the way the verification page shows it.
    pub fn render(&self) -> String {
        match (&self.data, self.success) {
            (Some(student), true) => {
                let mut out = format!(
                    "VERIFIED\n  Name:  {}\n  Email: {}\n  SAP:   {}",
                    student.name, student.email, student.sap
                );
                if let Some(course) = &student.course {
                    out.push_str(&format!("\n  Course: {}", course));
                }
                if let Some(date) = &student.issue_date {
                    out.push_str(&format!("\n  Issued: {}", date));
                }
                out
            }
            _ => format!(
                "INVALID: {}",
                self.message.as_deref().unwrap_or("Certificate could not be verified")
            ),
        }
    }
}

pub struct VerifyClient {
    http: reqwest::Client,
    base_url: String,
    retry_delay: Duration,
}

impl VerifyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Asks the backend to verify `sap`.
    ///
    /// A non-success status is retried once; whatever the second answer is
    /// gets parsed and returned.
    pub async fn check(&self, sap: &str) -> Result<VerifyResponse, ClientError> {
        let url = format!("{}/verify", self.base_url);
        let body = json!({ "sap": sap });

        let mut response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            log::warn!("{} answered {}; retrying in {:?}", url, response.status(), self.retry_delay);
            tokio::time::sleep(self.retry_delay).await;
            response = self.http.post(&url).json(&body).send().await?;
        }

        let status = response.status().as_u16();
        response
            .json::<VerifyResponse>()
            .await
            .map_err(|_| ClientError::Status(status))
    }
}
