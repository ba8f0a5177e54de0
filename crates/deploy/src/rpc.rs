//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DeployError, Result};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| DeployError::rpc(format!("Failed to create HTTP client: {e}")))
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result. An error response from the node is returned as
/// [`DeployError::Rpc`] carrying the node's message unchanged.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| DeployError::rpc(format!("Failed to send {method} request: {e}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| DeployError::rpc(format!("Failed to parse {method} response: {e}")))?;

    parse_response(method, result)
}

/// Extract the `result` member of a JSON-RPC response body.
fn parse_response<T: DeserializeOwned>(method: &str, body: Value) -> Result<T> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        return Err(DeployError::rpc(message));
    }

    let result_value = body
        .get("result")
        .cloned()
        .ok_or_else(|| DeployError::rpc(format!("No result in {method} response")))?;

    serde_json::from_value(result_value)
        .map_err(|e| DeployError::rpc(format!("Failed to deserialize {method} result: {e}")))
}
