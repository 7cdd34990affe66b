//! HTTP gateway surface. Queries answer health checks and CORS preflight;
//! everything else is upgraded to an update call so it may reach the chain.

use candid::CandidType;
use forwarder::relay::RELAY_PATH;
use forwarder::status::{NetworkStatus, UserStatus};
use forwarder::parse_address;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{RelayError, RelayResult};
use crate::evm::EvmRpcCanister;
use crate::log;
use crate::relay::relay_from_config;
use crate::state::RelayerConfig;
use crate::status::StatusReader;

pub const NETWORK_STATUS_PATH: &str = "/api/status/network";
pub const USER_STATUS_PATH: &str = "/api/status/user";
const HEALTH_PATH: &str = "/health";

#[derive(Clone, Debug, CandidType, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
    pub upgrade: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Health,
    Relay,
    NetworkStatus,
    UserStatus { address: Option<String> },
    MethodNotAllowed { allow: &'static str },
    NotFound,
}

pub fn route(method: &str, url: &str) -> Route {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };
    let method = method.to_ascii_uppercase();
    if method == "OPTIONS" {
        return Route::Preflight;
    }
    match (path.trim_end_matches('/'), method.as_str()) {
        (HEALTH_PATH, "GET") => Route::Health,
        (RELAY_PATH, "POST") => Route::Relay,
        (RELAY_PATH, _) => Route::MethodNotAllowed { allow: "POST" },
        (NETWORK_STATUS_PATH, "GET") => Route::NetworkStatus,
        (USER_STATUS_PATH, "GET") => Route::UserStatus {
            address: query.and_then(|q| query_param(q, "address")),
        },
        (NETWORK_STATUS_PATH, _) | (USER_STATUS_PATH, _) => {
            Route::MethodNotAllowed { allow: "GET" }
        }
        _ => Route::NotFound,
    }
}

/// Answer for the `http_request` query.
pub fn query_response(req: &HttpRequest) -> HttpResponse {
    match route(&req.method, &req.url) {
        Route::Preflight => preflight(),
        Route::Health => json_response(200, &json!({ "status": "ok" })),
        Route::NotFound => not_found(),
        Route::MethodNotAllowed { allow } => method_not_allowed(allow),
        Route::Relay | Route::NetworkStatus | Route::UserStatus { .. } => upgrade(),
    }
}

/// Answer for the upgraded `http_request_update` call.
pub async fn update_response(req: &HttpRequest, config: &RelayerConfig, now: u64) -> HttpResponse {
    match route(&req.method, &req.url) {
        Route::Relay => match relay_from_config(config, &req.body, now).await {
            Ok(success) => json_response(200, &success),
            Err(err) => error_response(&err),
        },
        Route::NetworkStatus => match network_status(config).await {
            Ok(status) => json_response(200, &status),
            Err(err) => error_response(&err),
        },
        Route::UserStatus { address } => match user_status(config, address.as_deref()).await {
            Ok(status) => json_response(200, &status),
            Err(err) => error_response(&err),
        },
        Route::Preflight => preflight(),
        Route::Health => json_response(200, &json!({ "status": "ok" })),
        Route::MethodNotAllowed { allow } => method_not_allowed(allow),
        Route::NotFound => not_found(),
    }
}

async fn network_status(config: &RelayerConfig) -> RelayResult<NetworkStatus> {
    let ctx = config.status_context()?;
    let rpc = EvmRpcCanister::from_config(config)?;
    StatusReader::new(&rpc, &ctx).network_status().await
}

async fn user_status(
    config: &RelayerConfig,
    address: Option<&str>,
) -> RelayResult<UserStatus> {
    let ctx = config.status_context()?;
    let rpc = EvmRpcCanister::from_config(config)?;
    let address = address.ok_or_else(|| RelayError::InvalidQuery("Missing address".into()))?;
    let user = parse_address(address)
        .map_err(|err| RelayError::InvalidQuery(format!("Invalid address: {}", err)))?;
    StatusReader::new(&rpc, &ctx).user_status(&user).await
}

pub fn json_response<T: Serialize>(status_code: u16, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(body) => HttpResponse {
            status_code,
            headers: json_headers(),
            body,
            upgrade: None,
        },
        Err(err) => HttpResponse {
            status_code: 500,
            headers: json_headers(),
            body: format!(r#"{{"error":"json error: {}"}}"#, err).into_bytes(),
            upgrade: None,
        },
    }
}

pub fn error_response(err: &RelayError) -> HttpResponse {
    if err.status_code() >= 500 {
        log!("relay error: {}", err);
    }
    json_response(err.status_code(), &err.to_failure())
}

fn upgrade() -> HttpResponse {
    HttpResponse {
        status_code: 200,
        headers: Vec::new(),
        body: Vec::new(),
        upgrade: Some(true),
    }
}

fn preflight() -> HttpResponse {
    HttpResponse {
        status_code: 204,
        headers: cors_headers(),
        body: Vec::new(),
        upgrade: None,
    }
}

fn not_found() -> HttpResponse {
    json_response(404, &json!({ "error": "Not found" }))
}

fn method_not_allowed(allow: &'static str) -> HttpResponse {
    let mut response = json_response(405, &json!({ "error": "Method not allowed" }));
    response.headers.push(("Allow".to_string(), allow.to_string()));
    response
}

fn cors_headers() -> Vec<(String, String)> {
    vec![
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        (
            "Access-Control-Allow-Methods".to_string(),
            "GET, POST, OPTIONS".to_string(),
        ),
        (
            "Access-Control-Allow-Headers".to_string(),
            "Content-Type".to_string(),
        ),
    ]
}

fn json_headers() -> Vec<(String, String)> {
    let mut headers = cors_headers();
    headers.push(("Content-Type".to_string(), "application/json".to_string()));
    headers
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| percent_decode(v).unwrap_or_else(|| v.to_string()))
        .filter(|v| !v.is_empty())
}

/// `None` on a malformed escape or non-UTF-8 result.
fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}
