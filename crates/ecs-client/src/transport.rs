use chrono::Utc;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::credentials::Credentials;
use crate::retry::RetryPolicy;
use crate::sigv4::{self, SigningParams, CONTENT_TYPE};
use crate::{EcsClientError, Result};
use std::time::Duration;

/// Upper bound on one HTTP exchange, body included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()?)
}

/// One AWS JSON-1.1 service endpoint: signs, sends and decodes calls, retrying
/// the transient failures allowed by its [`RetryPolicy`].
#[derive(Debug, Clone)]
pub(crate) struct JsonTransport {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    service: &'static str,
    target_prefix: &'static str,
    credentials: Credentials,
    retry: RetryPolicy,
}

impl JsonTransport {
    pub(crate) fn new(
        endpoint: &str,
        region: impl Into<String>,
        service: &'static str,
        target_prefix: &'static str,
        credentials: Credentials,
    ) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).map_err(|_| EcsClientError::Endpoint(endpoint.to_string()))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(EcsClientError::Endpoint(endpoint.to_string())),
        };
        Ok(Self {
            http: http_client(REQUEST_TIMEOUT)?,
            endpoint,
            host,
            region: region.into(),
            service,
            target_prefix,
            credentials,
            retry: RetryPolicy::default(),
        })
    }

    pub(crate) fn set_retry(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Invoke `action` with a JSON body and decode the response into `T`.
    pub(crate) async fn call<T: DeserializeOwned>(&self, action: &str, body: &Value) -> Result<T> {
        let payload = serde_json::to_vec(body).map_err(|source| EcsClientError::Decode {
            action: action.to_string(),
            source,
        })?;

        let mut attempt = 1;
        loop {
            match self.send_once(action, &payload).await {
                Ok(bytes) => {
                    let raw: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
                    return serde_json::from_slice(raw).map_err(|source| EcsClientError::Decode {
                        action: action.to_string(),
                        source,
                    });
                }
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        service = self.service,
                        action,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, action: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let target = format!("{}.{action}", self.target_prefix);
        let signed = sigv4::sign(
            &SigningParams {
                credentials: &self.credentials,
                region: &self.region,
                service: self.service,
                host: &self.host,
                target: &target,
                now: Utc::now(),
            },
            payload,
        )?;

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-target", &target)
            .header("authorization", &signed.authorization)
            .body(payload.to_vec());
        if let Some(token) = &signed.security_token {
            request = request.header("x-amz-security-token", token);
        }

        tracing::debug!(service = self.service, action, "sending request");
        let response = request.send().await?;
        let status = response.status();
        let error_header = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        if status.is_success() {
            return Ok(bytes);
        }
        Err(api_error(status.as_u16(), error_header.as_deref(), &bytes))
    }
}

/// Build an [`EcsClientError::Api`] from an error response.
///
/// The code comes from the body's `__type` (`com.amazonaws.ecs#ClientException`)
/// or, failing that, the `x-amzn-ErrorType` header (`ClientException:http://...`).
pub(crate) fn api_error(status: u16, error_header: Option<&str>, body: &[u8]) -> EcsClientError {
    let parsed: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let code = parsed
        .get("__type")
        .and_then(Value::as_str)
        .or(error_header)
        .map(|t| {
            let t = t.rsplit('#').next().unwrap_or(t);
            t.split(':').next().unwrap_or(t).to_string()
        })
        .unwrap_or_else(|| format!("Http{status}"));
    let message = parsed
        .get("message")
        .or_else(|| parsed.get("Message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    EcsClientError::Api {
        status,
        code,
        message,
    }
}
