use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc transport error: {0}")]
    Transport(String),
    #[error("rpc error from node: {0}")]
    Node(String),
    #[error("unexpected rpc response shape: {0}")]
    Shape(String),
}

/// One entry from `listunspent`, with the node's floating-point amount
/// already converted to smallest units.
#[derive(Debug, Clone, Deserialize)]
pub struct UnspentOutput {
    pub txid: String,
    pub vout: u32,
    pub address: Option<String>,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    #[serde(rename = "redeemScript")]
    pub redeem_script: Option<String>,
    pub amount: f64,
    pub confirmations: i64,
}

impl UnspentOutput {
    /// Node amounts are decimal coins; convert to smallest units.
    pub fn value_units(&self) -> u64 {
        (self.amount * 1e8).round() as u64
    }
}

/// JSON-RPC client for the UTXO-chain full node. Thin on purpose — raw HTTP
/// POST with serde_json, one method per node RPC the coordinator consumes.
pub struct UtxoRpc {
    url: String,
    user: Option<String>,
    pass: Option<String>,
    client: reqwest::Client,
}

impl UtxoRpc {
    pub fn new(url: &str, user: Option<String>, pass: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            user,
            pass,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "crosslock",
            "method": method,
            "params": params,
        });

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(user) = &self.user {
            req = req.basic_auth(user, self.pass.as_deref());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let json: Value = resp
            .json()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if let Some(err) = json.get("error") {
            if !err.is_null() {
                return Err(RpcError::Node(err.to_string()));
            }
        }
        Ok(json.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn get_block_count(&self) -> Result<u64, RpcError> {
        let result = self.call("getblockcount", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| RpcError::Shape("getblockcount: expected integer".into()))
    }

    pub async fn list_unspent(
        &self,
        min_conf: u32,
        addresses: Option<Vec<String>>,
    ) -> Result<Vec<UnspentOutput>, RpcError> {
        let params = match addresses {
            Some(addrs) => json!([min_conf, 9_999_999, addrs]),
            None => json!([min_conf]),
        };
        let result = self.call("listunspent", params).await?;
        serde_json::from_value(result).map_err(|e| RpcError::Shape(e.to_string()))
    }

    /// Sign an ordinary-input transaction with the node wallet. `prevtxs`
    /// entries carry the redeemScript for any P2SH inputs.
    pub async fn sign_raw_transaction(
        &self,
        tx_hex: &str,
        prevtxs: Value,
    ) -> Result<String, RpcError> {
        let result = self
            .call("signrawtransaction", json!([tx_hex, prevtxs]))
            .await?;
        let complete = result["complete"].as_bool().unwrap_or(false);
        if !complete {
            return Err(RpcError::Node("signrawtransaction incomplete".into()));
        }
        result["hex"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RpcError::Shape("signrawtransaction: missing hex".into()))
    }

    pub async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String, RpcError> {
        let result = self.call("sendrawtransaction", json!([tx_hex])).await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RpcError::Shape("sendrawtransaction: expected txid".into()))
    }

    pub async fn decode_raw_transaction(&self, tx_hex: &str) -> Result<Value, RpcError> {
        self.call("decoderawtransaction", json!([tx_hex])).await
    }

    /// Export the WIF for an owned address. Needed once per swap so the
    /// coordinator can sign the custom P2SH claim/refund locally.
    pub async fn dump_priv_key(&self, address: &str) -> Result<String, RpcError> {
        let result = self.call("dumpprivkey", json!([address])).await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RpcError::Shape("dumpprivkey: expected WIF string".into()))
    }

    /// Resolve an address to its pubkey hash and validity.
    pub async fn validate_address(&self, address: &str) -> Result<Value, RpcError> {
        self.call("validateaddress", json!([address])).await
    }
}
