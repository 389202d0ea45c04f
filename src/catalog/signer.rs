use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const TERMINAL: &str = "aws4_request";
const TARGET_PREFIX: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1";

/// One request to authenticate.
#[derive(Debug, Clone)]
pub struct SignInput<'a> {
    pub host: &'a str,
    pub path: &'a str,
    pub payload: &'a str,
    /// API operation, e.g. `GetItems`.
    pub operation: &'a str,
    pub timestamp: DateTime<Utc>,
}

/// Produces the headers that authenticate a catalog request. Output must be a
/// pure function of the input and the signer's own secret.
pub trait Signer: Send + Sync {
    fn sign(&self, input: &SignInput<'_>) -> Result<BTreeMap<String, String>>;
}

/// HMAC-SHA256 chain signer: the signing key is derived through date, region,
/// service and a fixed terminal string.
pub struct HmacChainSigner {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl HmacChainSigner {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            service: service.into(),
        }
    }

    fn signing_key(&self, datestamp: &str) -> Result<Vec<u8>> {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), datestamp)?;
        let k_region = hmac_sha256(&k_date, &self.region)?;
        let k_service = hmac_sha256(&k_region, &self.service)?;
        hmac_sha256(&k_service, TERMINAL)
    }
}

impl Signer for HmacChainSigner {
    fn sign(&self, input: &SignInput<'_>) -> Result<BTreeMap<String, String>> {
        let amz_date = input.timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let datestamp = input.timestamp.format("%Y%m%d").to_string();

        // BTreeMap keeps header names sorted, which the canonical form needs.
        let mut headers = BTreeMap::new();
        headers.insert("content-encoding".to_string(), "amz-1.0".to_string());
        headers.insert(
            "content-type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        headers.insert("host".to_string(), input.host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert(
            "x-amz-target".to_string(),
            format!("{TARGET_PREFIX}.{}", input.operation),
        );

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect();
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let payload_hash = hex::encode(Sha256::digest(input.payload.as_bytes()));

        let canonical_request = [
            "POST",
            input.path,
            "",
            canonical_headers.as_str(),
            signed_headers.as_str(),
            payload_hash.as_str(),
        ]
        .join("\n");

        let credential_scope = format!(
            "{datestamp}/{}/{}/{TERMINAL}",
            self.region, self.service
        );
        let request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = [
            ALGORITHM,
            amz_date.as_str(),
            credential_scope.as_str(),
            request_hash.as_str(),
        ]
        .join("\n");

        let signing_key = self.signing_key(&datestamp)?;
        let signature = hex::encode(hmac_sha256(&signing_key, &string_to_sign)?);

        headers.insert(
            "authorization".to_string(),
            format!(
                "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.access_key
            ),
        );
        Ok(headers)
    }
}

fn hmac_sha256(key: &[u8], msg: &str) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| AppError::Signing(e.to_string()))?;
    mac.update(msg.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer(secret: &str) -> HmacChainSigner {
        HmacChainSigner::new("AKIDEXAMPLE", secret, "us-west-2", "ProductAdvertisingAPI")
    }

    fn input(ts: DateTime<Utc>) -> SignInput<'static> {
        SignInput {
            host: "webservices.amazon.co.jp",
            path: "/paapi5/getitems",
            payload: r#"{"ItemIds":["B0CC944LHR"]}"#,
            operation: "GetItems",
            timestamp: ts,
        }
    }

    #[test]
    fn same_timestamp_and_secret_is_deterministic() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let a = signer("secret").sign(&input(ts)).unwrap();
        let b = signer("secret").sign(&input(ts)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_secret_and_time() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let base = signer("secret").sign(&input(ts)).unwrap();
        let other_secret = signer("other").sign(&input(ts)).unwrap();
        let later = signer("secret")
            .sign(&input(ts + chrono::Duration::seconds(1)))
            .unwrap();
        assert_ne!(base["authorization"], other_secret["authorization"]);
        assert_ne!(base["authorization"], later["authorization"]);
    }

    #[test]
    fn authorization_header_layout() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let headers = signer("secret").sign(&input(ts)).unwrap();
        let auth = &headers["authorization"];
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240301/us-west-2/ProductAdvertisingAPI/aws4_request, "
        ));
        assert!(auth.contains(
            "SignedHeaders=content-encoding;content-type;host;x-amz-date;x-amz-target, "
        ));
        let sig = auth.rsplit("Signature=").next().unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(headers["x-amz-date"], "20240301T120000Z");
        assert_eq!(
            headers["x-amz-target"],
            "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.GetItems"
        );
    }
}
