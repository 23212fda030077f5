//! JSON-RPC client for the supervised node
//!
//! Issues JSON-RPC 1.0 requests over authenticated HTTP to the local node.
//! Every call resolves to an `RpcOutcome`; transport errors and JSON-RPC
//! error objects both surface as `success == false`, never as a Rust error.

use crate::credentials::Credentials;
use serde::Serialize;
use serde_json::Value;
use std::error::Error as _;
use std::time::Duration;
use url::Url;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed request id, the node echoes it back
const REQUEST_ID: &str = "supervisor";

/// JSON-RPC error code the node reports while still loading its block index
pub const RPC_IN_WARMUP: i64 = -28;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: &'a [Value],
}

/// Uniform result of a single RPC call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcOutcome {
    pub success: bool,
    /// Response body, retained on failure too so callers can inspect the
    /// JSON-RPC error object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Transport-level hint: the TCP connection was actively refused
    #[serde(skip)]
    pub connection_refused: bool,
}

impl RpcOutcome {
    pub fn ok(body: Value) -> Self {
        Self {
            success: true,
            body: Some(body),
            error: None,
            connection_refused: false,
        }
    }

    pub fn failed(body: Option<Value>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            body,
            error: Some(error.into()),
            connection_refused: false,
        }
    }

    /// JSON-RPC error code from the body, if one is present
    pub fn error_code(&self) -> Option<i64> {
        self.body.as_ref()?.get("error")?.get("code")?.as_i64()
    }

    /// JSON-RPC error message from the body, if one is present
    pub fn error_message(&self) -> Option<&str> {
        self.body.as_ref()?.get("error")?.get("message")?.as_str()
    }
}

/// Client bound to one set of credentials
#[derive(Debug, Clone)]
pub struct RpcClient {
    endpoint: Url,
    user: String,
    password: String,
}

impl RpcClient {
    pub fn new(credentials: &Credentials) -> Self {
        // The port comes from the node's own config, so this cannot fail
        let endpoint = Url::parse(&format!("http://127.0.0.1:{}/", credentials.rpc_port))
            .unwrap_or_else(|_| Url::parse("http://127.0.0.1:0/").unwrap());

        Self {
            endpoint,
            user: credentials.rpc_user.clone(),
            password: credentials.rpc_password.clone(),
        }
    }

    /// Issue one JSON-RPC call with the fixed 10 second timeout
    pub async fn call(&self, method: &str, params: &[Value]) -> RpcOutcome {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: REQUEST_ID,
            method,
            params,
        };

        let client = match reqwest::Client::builder().timeout(RPC_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => return RpcOutcome::failed(None, e.to_string()),
        };

        let response = client
            .post(self.endpoint.clone())
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let mut outcome = RpcOutcome::failed(None, e.to_string());
                outcome.connection_refused = is_connection_refused(&e);
                return outcome;
            }
        };

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return RpcOutcome::failed(None, e.to_string()),
        };

        // A JSON-RPC level error object counts as failure, body retained
        match body.get("error") {
            Some(error) if !error.is_null() => {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("rpc error")
                    .to_string();
                RpcOutcome::failed(Some(body), message)
            }
            _ => RpcOutcome::ok(body),
        }
    }
}

/// Walk the error source chain looking for ECONNREFUSED
fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = inner.source();
    }
    false
}
