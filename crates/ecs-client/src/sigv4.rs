//! AWS Signature Version 4 for JSON-protocol POST requests.
//!
//! Every ECS and ECR call is a `POST /` with an `X-Amz-Target` header naming the
//! action, so the canonical request only ever has the root path, an empty
//! query string and a fixed header set.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;
use crate::{EcsClientError, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub(crate) const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Headers to attach to a signed request, in addition to the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub security_token: Option<String>,
}

pub(crate) struct SigningParams<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service: &'a str,
    pub host: &'a str,
    pub target: &'a str,
    pub now: DateTime<Utc>,
}

pub(crate) fn sign(params: &SigningParams<'_>, payload: &[u8]) -> Result<SignedHeaders> {
    let amz_date = params.now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = params.now.format("%Y%m%d").to_string();
    let token = params.credentials.session_token.as_deref();

    // Header names must be lowercase and sorted.
    let mut canonical_headers = format!(
        "content-type:{CONTENT_TYPE}\nhost:{}\nx-amz-date:{amz_date}\n",
        params.host
    );
    let mut signed_headers = String::from("content-type;host;x-amz-date");
    if let Some(token) = token {
        canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
        signed_headers.push_str(";x-amz-security-token");
    }
    canonical_headers.push_str(&format!("x-amz-target:{}\n", params.target));
    signed_headers.push_str(";x-amz-target");

    let canonical_request = format!(
        "POST\n/\n\n{canonical_headers}\n{signed_headers}\n{}",
        hex::encode(Sha256::digest(payload))
    );

    let scope = format!(
        "{date_stamp}/{}/{}/aws4_request",
        params.region, params.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(
        &params.credentials.secret_access_key,
        &date_stamp,
        params.region,
        params.service,
    )?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            params.credentials.access_key_id
        ),
        amz_date,
        security_token: token.map(str::to_string),
    })
}

pub(crate) fn signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| EcsClientError::Signing(format!("failed to initialize hmac: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params<'a>(creds: &'a Credentials, target: &'a str) -> SigningParams<'a> {
        SigningParams {
            credentials: creds,
            region: "us-east-1",
            service: "ecs",
            host: "ecs.us-east-1.amazonaws.com",
            target,
            now: Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap(),
        }
    }

    #[test]
    fn signing_key_matches_published_example() {
        // Worked example from the AWS SigV4 documentation.
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn authorization_header_shape() {
        let creds = Credentials::new("AKIDEXAMPLE", "secret");
        let target = "AmazonEC2ContainerServiceV20141113.DescribeServices";
        let signed = sign(&params(&creds, target), b"{}").unwrap();

        assert_eq!(signed.amz_date, "20240309T123005Z");
        assert!(signed.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240309/us-east-1/ecs/aws4_request, "
        ));
        assert!(signed
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-target, "));
        let sig = signed.authorization.rsplit("Signature=").next().unwrap();
        assert_eq!(sig.len(), 64);
        assert!(signed.security_token.is_none());
    }

    #[test]
    fn session_token_is_signed() {
        let creds = Credentials::new("AKIDEXAMPLE", "secret").with_session_token("session");
        let target = "AmazonEC2ContainerServiceV20141113.DescribeServices";
        let signed = sign(&params(&creds, target), b"{}").unwrap();
        assert!(signed
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target, "));
        assert_eq!(signed.security_token.as_deref(), Some("session"));
    }

    #[test]
    fn full_signature_matches_reference_signer() {
        let creds = Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
            .with_session_token("TOKEN123");
        let target = "AmazonEC2ContainerServiceV20141113.DescribeServices";
        let payload = br#"{"cluster":"prod","services":["web"]}"#;
        let signed = sign(&params(&creds, target), payload).unwrap();
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240309/us-east-1/ecs/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target, \
             Signature=da3e9cfb67b816ec41348f043ae18b4560f00ba6cbe33165d0ed19fd482d1d07"
        );
    }

    #[test]
    fn signature_depends_on_payload() {
        let creds = Credentials::new("AKIDEXAMPLE", "secret");
        let target = "AmazonEC2ContainerServiceV20141113.DescribeServices";
        let a = sign(&params(&creds, target), b"{\"a\":1}").unwrap();
        let b = sign(&params(&creds, target), b"{\"a\":2}").unwrap();
        assert_ne!(a.authorization, b.authorization);
        let again = sign(&params(&creds, target), b"{\"a\":1}").unwrap();
        assert_eq!(a, again);
    }
}
