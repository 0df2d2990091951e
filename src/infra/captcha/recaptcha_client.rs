// reCAPTCHA CLIENT - Google siteverify integration
//
// Implements `HumanVerifier` by posting the client's token to
// https://www.google.com/recaptcha/api/siteverify (form-encoded, secret in
// the body). v3 responses carry a score, v2 responses only `success`.

use crate::core::captcha::{CaptchaError, HumanVerifier, VerificationOutcome};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

pub struct RecaptchaClient {
    client: Client,
    secret: String,
    endpoint: String,
}

impl RecaptchaClient {
    pub fn new(secret: String) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            secret,
            endpoint: SITEVERIFY_URL.to_string(),
        })
    }

    /// Point the client at a different siteverify-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl HumanVerifier for RecaptchaClient {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<VerificationOutcome, CaptchaError> {
        if token.trim().is_empty() {
            return Ok(VerificationOutcome::failed("missing-input-response"));
        }

        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| CaptchaError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CaptchaError::Unavailable(format!(
                "siteverify answered {}",
                response.status()
            )));
        }

        let body: SiteverifyResponse = response
            .json()
            .await
            .map_err(|e| CaptchaError::Unavailable(e.to_string()))?;

        tracing::debug!(
            success = body.success,
            score = ?body.score,
            action = ?body.action,
            "reCAPTCHA verification finished"
        );

        Ok(VerificationOutcome {
            success: body.success,
            score: body.score,
            error_codes: body.error_codes,
        })
    }
}
