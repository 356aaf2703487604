//! HSM-mediated transaction signer (spec §4.13): the execution bot never holds a private key
//! in process memory. Signing is delegated to one of four provider backends behind a common
//! trait, selected at startup by `HsmProvider` (spec §6 configuration).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;

use crate::config::HsmProvider;
use crate::error::HsmError;

#[async_trait]
pub trait HsmSigner: Send + Sync {
    /// Sign `message` (an already-serialized transaction) and return the raw signature bytes.
    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>, HsmError>;

    /// Cheap liveness probe used by the HSM-failure circuit breaker before a real sign call.
    async fn health_check(&self) -> Result<(), HsmError>;

    fn provider(&self) -> HsmProvider;
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature_b64: String,
}

/// Shared HTTP-backed implementation: all four providers expose a sign/health endpoint over
/// HTTPS with a provider-specific path and auth header, so one struct parameterized by
/// `endpoint`/`auth_header` covers every backend.
struct HttpHsmClient {
    http: Client,
    endpoint: String,
    auth_header: String,
    provider: HsmProvider,
}

#[async_trait]
impl HsmSigner for HttpHsmClient {
    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>, HsmError> {
        let response = self
            .http
            .post(format!("{}/sign", self.endpoint))
            .header("authorization", &self.auth_header)
            .json(&serde_json::json!({
                "key_id": key_id,
                "message_b64": BASE64.encode(message),
            }))
            .send()
            .await
            .map_err(|e| HsmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(HsmError::Signing(format!(
                "hsm provider returned status {}",
                response.status()
            )));
        }

        let parsed: SignResponse = response
            .json()
            .await
            .map_err(|e| HsmError::Signing(e.to_string()))?;

        BASE64
            .decode(parsed.signature_b64)
            .map_err(|e| HsmError::Signing(format!("invalid signature encoding: {e}")))
    }

    async fn health_check(&self) -> Result<(), HsmError> {
        let response = self
            .http
            .get(format!("{}/health", self.endpoint))
            .header("authorization", &self.auth_header)
            .send()
            .await
            .map_err(|e| HsmError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(HsmError::Connection(format!(
                "hsm provider unhealthy: status {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn provider(&self) -> HsmProvider {
        self.provider
    }
}

/// Build the configured signer. Endpoint/credential env vars are read at construction time
/// so a misconfigured deployment fails at startup instead of on first trade.
pub fn build_signer(provider: HsmProvider) -> Box<dyn HsmSigner> {
    let (endpoint_var, endpoint_default, auth_var) = match provider {
        HsmProvider::AwsKms => ("AWS_KMS_ENDPOINT", "https://kms.us-east-1.amazonaws.com", "AWS_KMS_AUTH_TOKEN"),
        HsmProvider::AzureKeyvault => (
            "AZURE_KEYVAULT_ENDPOINT",
            "https://vault.azure.net",
            "AZURE_KEYVAULT_AUTH_TOKEN",
        ),
        HsmProvider::GoogleKms => (
            "GOOGLE_KMS_ENDPOINT",
            "https://cloudkms.googleapis.com",
            "GOOGLE_KMS_AUTH_TOKEN",
        ),
        HsmProvider::HardwareHsm => (
            "HARDWARE_HSM_ENDPOINT",
            "https://localhost:9443",
            "HARDWARE_HSM_AUTH_TOKEN",
        ),
    };

    Box::new(HttpHsmClient {
        http: Client::new(),
        endpoint: std::env::var(endpoint_var).unwrap_or_else(|_| endpoint_default.to_string()),
        auth_header: std::env::var(auth_var).unwrap_or_default(),
        provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_signer_for_each_provider_without_panicking() {
        for provider in [
            HsmProvider::AwsKms,
            HsmProvider::AzureKeyvault,
            HsmProvider::GoogleKms,
            HsmProvider::HardwareHsm,
        ] {
            let signer = build_signer(provider);
            assert_eq!(signer.provider(), provider);
        }
    }
}
