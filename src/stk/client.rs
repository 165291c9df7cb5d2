//! Push provider HTTP client.
//!
//! Wraps the mobile-money provider's OAuth token, STK push, and status query
//! endpoints. The access token is an explicit cached-value-with-expiry owned
//! by this client and refreshed inside the configured margin; it is never
//! shared as global state. Every call is bounded by the configured timeout
//! and network failures surface as `ProviderUnavailable` so callers can
//! decide whether to retry.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::StkProviderConfig;
use crate::error::PaymentError;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Provider response to a push initiation.
#[derive(Debug, Clone, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
}

/// Provider response to a status query.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode", default)]
    pub response_code: Option<String>,
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<String>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// The provider serializes this as a string
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

/// HTTP client for the mobile-money push provider.
pub struct StkClient {
    http: reqwest::Client,
    config: StkProviderConfig,
    token: Mutex<Option<CachedToken>>,
}

impl StkClient {
    pub fn new(config: StkProviderConfig) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| {
                PaymentError::ProviderUnavailable(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    /// Initiate an STK push for `amount` minor units against the payer's
    /// phone. The provider API takes whole currency units.
    pub async fn stk_push(
        &self,
        phone: &str,
        amount: i64,
        account_reference: &str,
    ) -> Result<StkPushResponse, PaymentError> {
        let token = self.access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = self.push_password(&timestamp)?;

        let body = serde_json::json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount / 100,
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.config.callback_url,
            "AccountReference": account_reference,
            "TransactionDesc": format!("Rent {account_reference}"),
        });

        let response = self
            .http
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.config.base_url
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // A token the provider no longer honors is a credential problem;
            // drop the cache so the next attempt re-authenticates.
            self.token.lock().await.take();
            return Err(PaymentError::ProviderAuth(format!(
                "push request rejected with HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(PaymentError::ProviderUnavailable(format!(
                "push request failed with HTTP {status}"
            )));
        }

        let push: StkPushResponse = response.json().await.map_err(|err| {
            PaymentError::ProviderUnavailable(format!("malformed push response: {err}"))
        })?;

        if push.response_code != "0" {
            return Err(PaymentError::ProviderUnavailable(format!(
                "provider declined push: {}",
                push.response_description
                    .as_deref()
                    .unwrap_or(&push.response_code)
            )));
        }

        debug!(
            checkout_request_id = %push.checkout_request_id,
            "STK push accepted by provider"
        );
        Ok(push)
    }

    /// Best-effort status query for an initiated push.
    pub async fn query_status(
        &self,
        checkout_request_id: &str,
    ) -> Result<StkQueryResponse, PaymentError> {
        let token = self.access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = self.push_password(&timestamp)?;

        let body = serde_json::json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_request_id,
        });

        let response = self
            .http
            .post(format!(
                "{}/mpesa/stkpushquery/v1/query",
                self.config.base_url
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(PaymentError::ProviderUnavailable(format!(
                "status query failed with HTTP {}",
                response.status()
            )));
        }

        response.json().await.map_err(|err| {
            PaymentError::ProviderUnavailable(format!("malformed query response: {err}"))
        })
    }

    /// Return the cached access token, refreshing it when missing or inside
    /// the expiry margin. The lock is held across the refresh so concurrent
    /// callers do not stampede the token endpoint.
    async fn access_token(&self) -> Result<String, PaymentError> {
        let margin = Duration::seconds(self.config.token_expiry_margin_seconds as i64);
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at - margin > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let (key, secret) = match (&self.config.consumer_key, &self.config.consumer_secret) {
            (Some(key), Some(secret)) => (key.clone(), secret.clone()),
            _ => {
                return Err(PaymentError::ProviderAuth(
                    "push provider credentials are not configured".to_string(),
                ));
            }
        };

        let response = self
            .http
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.config.base_url
            ))
            .basic_auth(key, Some(secret))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(PaymentError::ProviderAuth(format!(
                "token endpoint rejected credentials with HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(PaymentError::ProviderUnavailable(format!(
                "token endpoint failed with HTTP {status}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|err| {
            PaymentError::ProviderUnavailable(format!("malformed token response: {err}"))
        })?;

        let expires_in = token
            .expires_in
            .as_ref()
            .and_then(parse_expires_in)
            .unwrap_or(3600);

        let fresh = CachedToken {
            value: token.access_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        };
        let value = fresh.value.clone();
        *cached = Some(fresh);

        debug!(expires_in, "Refreshed push provider access token");
        Ok(value)
    }

    fn push_password(&self, timestamp: &str) -> Result<String, PaymentError> {
        let passkey = self.config.passkey.as_deref().ok_or_else(|| {
            PaymentError::ProviderAuth("push provider passkey is not configured".to_string())
        })?;
        Ok(general_purpose::STANDARD
            .encode(format!("{}{}{}", self.config.shortcode, passkey, timestamp)))
    }
}

fn map_transport_error(err: reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        warn!("Push provider call timed out");
    }
    PaymentError::ProviderUnavailable(format!("provider request failed: {err}"))
}

fn parse_expires_in(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
