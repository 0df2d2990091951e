// Implementations of HumanVerifier.

pub mod recaptcha_client;

pub use recaptcha_client::RecaptchaClient;

use crate::core::captcha::{CaptchaError, HumanVerifier, VerificationOutcome};
use async_trait::async_trait;

/// Used when no reCAPTCHA secret is configured. Every token passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledVerifier;

#[async_trait]
impl HumanVerifier for DisabledVerifier {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn verify(
        &self,
        _token: &str,
        _remote_ip: Option<&str>,
    ) -> Result<VerificationOutcome, CaptchaError> {
        Ok(VerificationOutcome::passed())
    }
}
