//! AMM router client (spec §6): the off-chain quote/swap service the executor calls while
//! building a transaction. Treated as an external collaborator — only the wire contract is
//! owned here, not its implementation.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

#[derive(Debug, Clone, Deserialize)]
pub struct RouteQuote {
    #[serde(rename = "inAmount")]
    pub in_amount: String,
    #[serde(rename = "outAmount")]
    pub out_amount: String,
    #[serde(rename = "slippageBps")]
    pub slippage_bps: u32,
    #[serde(flatten)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct SwapRequest<'a> {
    #[serde(rename = "userPublicKey")]
    user_public_key: &'a str,
    #[serde(rename = "quoteResponse")]
    quote_response: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SwapTransactionResponse {
    #[serde(rename = "swapTransaction")]
    pub swap_transaction_b64: String,
}

pub struct RouterClient {
    http: Client,
    base_url: String,
}

impl RouterClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// `GET /quote?inputMint&outputMint&amount&slippageBps` (spec §6).
    pub async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u32,
    ) -> Result<serde_json::Value, ExecutorError> {
        let response = self
            .http
            .get(format!("{}/quote", self.base_url))
            .query(&[
                ("inputMint", input_mint),
                ("outputMint", output_mint),
                ("amount", &amount.to_string()),
                ("slippageBps", &slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ExecutorError::Build(format!("router quote request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ExecutorError::Build(format!(
                "router quote returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ExecutorError::Build(format!("router quote decode failed: {e}")))
    }

    /// `POST /swap {userPublicKey, quoteResponse}` (spec §6): returns the base64-encoded,
    /// router-built swap transaction for the caller to extract the swap instruction from.
    pub async fn build_swap_transaction(
        &self,
        user_public_key: &str,
        quote_response: &serde_json::Value,
    ) -> Result<SwapTransactionResponse, ExecutorError> {
        let response = self
            .http
            .post(format!("{}/swap", self.base_url))
            .json(&SwapRequest {
                user_public_key,
                quote_response,
            })
            .send()
            .await
            .map_err(|e| ExecutorError::Build(format!("router swap request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ExecutorError::Build(format!(
                "router swap returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ExecutorError::Build(format!("router swap decode failed: {e}")))
    }
}

/// Vault-program wrapper instruction data: `discriminator(8) || amount_in(8 LE) || min_amount_out(8 LE) || inner_data`
/// (spec §4.12 step 3).
pub fn wrap_vault_instruction(discriminator: [u8; 8], amount_in: u64, min_amount_out: u64, inner_data: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(24 + inner_data.len());
    data.extend_from_slice(&discriminator);
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_amount_out.to_le_bytes());
    data.extend_from_slice(inner_data);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_instruction_has_expected_layout() {
        let data = wrap_vault_instruction([1, 2, 3, 4, 5, 6, 7, 8], 1000, 990, &[0xAA, 0xBB]);
        assert_eq!(data.len(), 8 + 8 + 8 + 2);
        assert_eq!(&data[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 1000);
        assert_eq!(u64::from_le_bytes(data[16..24].try_into().unwrap()), 990);
        assert_eq!(&data[24..], &[0xAA, 0xBB]);
    }
}
