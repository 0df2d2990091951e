// Core captcha module - the human-verification port.
//
// The web layer asks a HumanVerifier before it hands a submission to the
// comment service. The comment core never sees tokens.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptchaError {
    /// The verification service could not be reached or answered garbage.
    #[error("Verification service unavailable: {0}")]
    Unavailable(String),
}

/// What the verification service decided about a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub success: bool,
    /// Present for score-based (v3) checks, 0.0 = bot, 1.0 = human
    pub score: Option<f64>,
    pub error_codes: Vec<String>,
}

impl VerificationOutcome {
    pub fn passed() -> Self {
        Self {
            success: true,
            score: None,
            error_codes: Vec::new(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            score: None,
            error_codes: vec![reason.into()],
        }
    }

    /// Passed and, when scored, at or above `min_score`.
    pub fn is_human(&self, min_score: f64) -> bool {
        self.success && self.score.map_or(true, |score| score >= min_score)
    }
}

#[async_trait]
pub trait HumanVerifier: Send + Sync {
    /// False when verification is switched off and tokens are not required.
    fn is_enabled(&self) -> bool;

    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<VerificationOutcome, CaptchaError>;
}

// Lets the web state hold a shared trait object.
#[async_trait]
impl HumanVerifier for Arc<dyn HumanVerifier> {
    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<VerificationOutcome, CaptchaError> {
        (**self).verify(token, remote_ip).await
    }
}
