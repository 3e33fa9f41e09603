//! Angel One SmartAPI historical candle client.
//!
//! Logs in once with client code, MPIN and a TOTP code, then issues one
//! `getCandleData` call per `fetch`. Retries and pacing are handled by the
//! backfill orchestrator, so this client never loops.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{debug, info};

use super::provider::{CandleRequest, CandleSource, DataError, RawRecord};

pub const DEFAULT_BASE_URL: &str = "https://apiconnect.angelone.in";
const LOGIN_PATH: &str = "/rest/auth/angelbroking/user/v1/loginByPassword";
const CANDLE_PATH: &str = "/rest/secure/angelbroking/historical/v1/getCandleData";
const REQUEST_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Login material for one SmartAPI account.
#[derive(Clone)]
pub struct SmartApiCredentials {
    pub api_key: String,
    pub client_code: String,
    pub pin: String,
    pub totp_secret: String,
}

impl std::fmt::Debug for SmartApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartApiCredentials")
            .field("client_code", &self.client_code)
            .finish_non_exhaustive()
    }
}

/// Current TOTP code for a base32 secret.
pub fn totp_code(secret: &str, unix_secs: u64) -> Result<String, DataError> {
    let secret = secret.trim().replace(' ', "").to_uppercase();
    let bytes = Secret::Encoded(secret)
        .to_bytes()
        .map_err(|e| DataError::AuthenticationRequired(format!("invalid TOTP secret: {e:?}")))?;
    let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes)
        .map_err(|e| DataError::AuthenticationRequired(format!("invalid TOTP secret: {e}")))?;
    Ok(totp.generate(unix_secs))
}

// ── Wire types ──

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    clientcode: &'a str,
    password: &'a str,
    totp: &'a str,
}

#[derive(Debug, Serialize)]
struct CandleBody<'a> {
    exchange: &'a str,
    symboltoken: &'a str,
    interval: &'a str,
    fromdate: String,
    todate: String,
}

/// Common SmartAPI response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errorcode: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    jwt_token: String,
}

/// Authenticated SmartAPI session.
pub struct SmartApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    jwt: String,
}

impl SmartApiClient {
    /// Log in against the production endpoint.
    pub fn connect(credentials: &SmartApiCredentials) -> Result<Self, DataError> {
        Self::connect_to(DEFAULT_BASE_URL, credentials)
    }

    pub fn connect_to(base_url: &str, credentials: &SmartApiCredentials) -> Result<Self, DataError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DataError::Other(format!("system clock before epoch: {e}")))?
            .as_secs();
        let totp = totp_code(&credentials.totp_secret, now)?;

        let body = LoginBody {
            clientcode: &credentials.client_code,
            password: &credentials.pin,
            totp: &totp,
        };
        let url = format!("{}{LOGIN_PATH}", base_url.trim_end_matches('/'));
        let request = with_headers(http.post(&url), &credentials.api_key).json(&body);
        let (status, text) = send(request)?;
        let data: LoginData = unwrap_envelope(status, &text)?.ok_or_else(|| {
            DataError::AuthenticationRequired("login response carried no session".into())
        })?;

        info!(client_code = %credentials.client_code, "SmartAPI session established");
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
            jwt: data
                .jwt_token
                .trim_start_matches("Bearer ")
                .to_string(),
        })
    }
}

impl CandleSource for SmartApiClient {
    fn name(&self) -> &str {
        "smartapi"
    }

    fn fetch(&self, request: &CandleRequest) -> Result<Vec<RawRecord>, DataError> {
        let body = CandleBody {
            exchange: &request.exchange,
            symboltoken: &request.symbol_token,
            interval: request.interval.as_str(),
            fromdate: request.from.format(REQUEST_TIME_FORMAT).to_string(),
            todate: request.to.format(REQUEST_TIME_FORMAT).to_string(),
        };
        debug!(fromdate = %body.fromdate, todate = %body.todate, "getCandleData");

        let url = format!("{}{CANDLE_PATH}", self.base_url);
        let http_request = with_headers(self.http.post(&url), &self.api_key)
            .bearer_auth(&self.jwt)
            .json(&body);
        let (status, text) = send(http_request)?;
        parse_candle_response(status, &text, &request.symbol_token)
    }
}

fn with_headers(builder: RequestBuilder, api_key: &str) -> RequestBuilder {
    builder
        .header("Accept", "application/json")
        .header("X-UserType", "USER")
        .header("X-SourceID", "WEB")
        .header("X-ClientLocalIP", "127.0.0.1")
        .header("X-ClientPublicIP", "127.0.0.1")
        .header("X-MACAddress", "00:00:00:00:00:00")
        .header("X-PrivateKey", api_key)
}

fn send(request: RequestBuilder) -> Result<(StatusCode, String), DataError> {
    let resp = request
        .send()
        .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
    let status = resp.status();
    let text = resp
        .text()
        .map_err(|e| DataError::NetworkUnreachable(format!("failed to read body: {e}")))?;
    Ok((status, text))
}

/// Map HTTP status and envelope fields onto `DataError`.
fn unwrap_envelope<T: serde::de::DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<Option<T>, DataError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(DataError::RateLimited(snippet(body)));
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DataError::AuthenticationRequired(format!(
            "HTTP {status}: {}",
            snippet(body)
        )));
    }
    if !status.is_success() {
        return Err(DataError::Http {
            status: status.as_u16(),
            message: snippet(body),
        });
    }

    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormatChanged(format!("{e}: {}", snippet(body))))?;

    if !envelope.status {
        return Err(classify_api_error(&envelope.errorcode, &envelope.message));
    }
    Ok(envelope.data)
}

fn classify_api_error(code: &str, message: &str) -> DataError {
    let lower = message.to_lowercase();
    match code {
        "AG8001" | "AG8002" | "AG8003" | "AB1010" => {
            DataError::AuthenticationRequired(format!("{code}: {message}"))
        }
        _ if lower.contains("access rate") => DataError::RateLimited(message.to_string()),
        _ if lower.contains("invalid token") => {
            DataError::AuthenticationRequired(format!("{code}: {message}"))
        }
        _ => DataError::Other(format!("{code}: {message}")),
    }
}

fn parse_candle_response(
    status: StatusCode,
    body: &str,
    token: &str,
) -> Result<Vec<RawRecord>, DataError> {
    match unwrap_envelope::<Vec<RawRecord>>(status, body) {
        Ok(data) => Ok(data.unwrap_or_default()),
        Err(DataError::Other(msg)) if msg.to_lowercase().contains("symbol") => {
            Err(DataError::InstrumentNotFound {
                token: token.to_string(),
            })
        }
        Err(e) => Err(e),
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totp_matches_rfc6238_vector() {
        // base32("12345678901234567890")
        let code = totp_code("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ", 59).unwrap();
        assert_eq!(code, "287082");
    }

    #[test]
    fn totp_tolerates_spaces_and_case() {
        let a = totp_code("gezd gnbv gy3t qojq gezd gnbv gy3t qojq", 59).unwrap();
        assert_eq!(a, "287082");
    }

    #[test]
    fn totp_rejects_garbage_secret() {
        assert!(matches!(
            totp_code("!!!", 59),
            Err(DataError::AuthenticationRequired(_))
        ));
    }

    #[test]
    fn parses_candle_payload() {
        let body = r#"{"status":true,"message":"SUCCESS","errorcode":"","data":[
            ["2023-09-06T11:15:00+05:30",19571.2,19587.9,19540.0,19550.0,0],
            ["2023-09-06T11:16:00+05:30",19550.0,19560.0,19545.0,19555.5,0]
        ]}"#;
        let records = parse_candle_response(StatusCode::OK, body, "99926000").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields().len(), 6);
    }

    #[test]
    fn null_data_is_empty() {
        let body = r#"{"status":true,"message":"SUCCESS","errorcode":"","data":null}"#;
        let records = parse_candle_response(StatusCode::OK, body, "1").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn rate_limit_status_maps_to_rate_limited() {
        let err = parse_candle_response(StatusCode::TOO_MANY_REQUESTS, "slow down", "1").unwrap_err();
        assert!(matches!(err, DataError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn access_rate_message_maps_to_rate_limited() {
        let body = r#"{"status":false,"message":"Access denied because of exceeding access rate","errorcode":"AB1004","data":null}"#;
        let err = parse_candle_response(StatusCode::OK, body, "1").unwrap_err();
        assert!(matches!(err, DataError::RateLimited(_)));
    }

    #[test]
    fn expired_token_is_permanent() {
        let body = r#"{"status":false,"message":"Invalid Token","errorcode":"AG8001","data":null}"#;
        let err = parse_candle_response(StatusCode::OK, body, "1").unwrap_err();
        assert!(matches!(err, DataError::AuthenticationRequired(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn unauthorized_status_is_permanent() {
        let err = parse_candle_response(StatusCode::UNAUTHORIZED, "", "1").unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_error_is_retryable_http() {
        let err = parse_candle_response(StatusCode::BAD_GATEWAY, "oops", "1").unwrap_err();
        assert!(matches!(err, DataError::Http { status: 502, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn unknown_symbol_maps_to_instrument_not_found() {
        let body = r#"{"status":false,"message":"Invalid symboltoken","errorcode":"AB4000","data":null}"#;
        let err = parse_candle_response(StatusCode::OK, body, "42").unwrap_err();
        assert!(matches!(err, DataError::InstrumentNotFound { ref token } if token == "42"));
    }

    #[test]
    fn html_body_is_format_change() {
        let err = parse_candle_response(StatusCode::OK, "<html>", "1").unwrap_err();
        assert!(matches!(err, DataError::ResponseFormatChanged(_)));
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let creds = SmartApiCredentials {
            api_key: "key".into(),
            client_code: "A123".into(),
            pin: "9999".into(),
            totp_secret: "SECRET".into(),
        };
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("A123"));
        assert!(!dbg.contains("9999"));
        assert!(!dbg.contains("SECRET"));
    }
}
