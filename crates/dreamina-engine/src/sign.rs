use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::Error;

pub type HmacSha256 = Hmac<Sha256>;

/// Algorithm identifier per the Volcengine signing specification
/// (https://www.volcengine.com/docs/6369/67269). The secret key enters the
/// first key derivation unprefixed; both are part of the external contract.
pub const ALGORITHM: &str = "HMAC-SHA256";

/// Scope terminator for the key-derivation chain and credential scope.
const REQUEST_SUFFIX: &str = "request";

/// Headers that must be present in the signing set. The verifying server
/// recomputes the signature over exactly these.
const REQUIRED_HEADERS: [&str; 4] = ["content-type", "host", "x-content-sha256", "x-date"];

/// Static API credentials. The secret key never appears in Debug output.
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Result<Self, Error> {
        let credentials = Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(Error::InvalidCredentials);
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// One captured instant plus the scope it binds the signature to. The same
/// instant feeds both the `x-date` header and the credential scope; mixing
/// two clock reads produces an unverifiable signature.
#[derive(Debug, Clone)]
pub struct SigningContext {
    pub timestamp: DateTime<Utc>,
    pub region: String,
    pub service: String,
}

impl SigningContext {
    pub fn now(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            region: region.into(),
            service: service.into(),
        }
    }

    /// `YYYYMMDDThhmmssZ`, the `x-date` header value.
    pub fn long_stamp(&self) -> String {
        self.timestamp.format("%Y%m%dT%H%M%SZ").to_string()
    }

    /// `YYYYMMDD`, the first key-derivation input.
    pub fn date_stamp(&self) -> String {
        self.timestamp.format("%Y%m%d").to_string()
    }

    /// `YYYYMMDD/region/service/request`.
    pub fn credential_scope(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.date_stamp(),
            self.region,
            self.service,
            REQUEST_SUFFIX
        )
    }
}

/// The exact bytes being signed. The header map is keyed by lowercase name
/// and sorted, so insertion order never changes the signature; the query
/// string must already be percent-encoded and sorted by key.
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub uri_path: &'a str,
    pub canonical_query: &'a str,
    pub headers: BTreeMap<String, String>,
    pub body: &'a [u8],
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// kDate -> kRegion -> kService -> kSigning, each output keying the next.
fn signing_key(secret_key: &str, context: &SigningContext) -> Vec<u8> {
    let k_date = hmac_sha256(secret_key.as_bytes(), context.date_stamp().as_bytes());
    let k_region = hmac_sha256(&k_date, context.region.as_bytes());
    let k_service = hmac_sha256(&k_region, context.service.as_bytes());
    hmac_sha256(&k_service, REQUEST_SUFFIX.as_bytes())
}

/// Produces the `authorization` header value for a request. Pure function of
/// its inputs: deterministic for a fixed timestamp, no I/O.
pub fn authorization(
    credentials: &Credentials,
    context: &SigningContext,
    request: &SignableRequest<'_>,
) -> Result<String, Error> {
    credentials.validate()?;
    for required in REQUIRED_HEADERS {
        if !request.headers.contains_key(required) {
            return Err(Error::MalformedRequest(format!(
                "missing required header '{required}'"
            )));
        }
    }

    let body_hash = sha256_hex(request.body);

    let mut header_block = String::new();
    let mut names = Vec::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        header_block.push_str(name);
        header_block.push(':');
        header_block.push_str(value);
        header_block.push('\n');
        names.push(name.as_str());
    }
    let signed_headers = names.join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.uri_path,
        request.canonical_query,
        header_block,
        signed_headers,
        body_hash
    );

    let scope = context.credential_scope();
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        context.long_stamp(),
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&credentials.secret_key, context);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key, scope, signed_headers, signature
    ))
}

/// Assembles the full header set for a request: the four companion headers
/// derived from one captured instant, plus `authorization` computed over
/// exactly that set.
pub fn signed_header_set(
    credentials: &Credentials,
    context: &SigningContext,
    method: &str,
    uri_path: &str,
    canonical_query: &str,
    host: &str,
    body: &[u8],
) -> Result<Vec<(String, String)>, Error> {
    let content_type = if body.is_empty() {
        "application/x-www-form-urlencoded"
    } else {
        "application/json"
    };

    let mut headers = BTreeMap::new();
    headers.insert("host".to_string(), host.to_string());
    headers.insert("x-date".to_string(), context.long_stamp());
    headers.insert("x-content-sha256".to_string(), sha256_hex(body));
    headers.insert("content-type".to_string(), content_type.to_string());

    let request = SignableRequest {
        method,
        uri_path,
        canonical_query,
        headers,
        body,
    };
    let authorization = authorization(credentials, context, &request)?;

    let mut out: Vec<(String, String)> = request
        .headers
        .into_iter()
        .collect();
    out.push(("authorization".to_string(), authorization));
    Ok(out)
}
