use std::env;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use url::Url;

use crate::artifact::{ImageArtifact, Written};
use crate::error::Error;
use crate::response::{self, ImageSource};
use crate::sign::{self, Credentials, SigningContext};
use crate::truncate_text;

pub const DEFAULT_API_BASE: &str = "https://open.volcengineapi.com";
pub const DEFAULT_REGION: &str = "cn-north-1";
pub const SERVICE: &str = "cv";

const ACTION: &str = "CVProcess";
const API_VERSION: &str = "2022-08-31";
const REQ_KEY: &str = "high_aes_general_v21_L";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_BODY_MAX_CHARS: usize = 512;

/// One image-generation job: prompt in, file at `output` out.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Defaults to a time-derived value when unset, so runs are
    /// reproducible on demand rather than truly random.
    pub seed: Option<u32>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            output: output.into(),
            width: 1024,
            height: 1024,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CvProcessBody {
    req_key: &'static str,
    prompt: String,
    width: u32,
    height: u32,
    seed: u32,
    use_seed: bool,
    return_url: bool,
    logo_info: LogoInfo,
}

#[derive(Debug, Clone, Serialize)]
struct LogoInfo {
    add_logo: bool,
}

/// Dreamina API client. Holds no per-request state: `generate` takes
/// `&self`, so one client may serve many threads concurrently.
#[derive(Debug, Clone)]
pub struct Client {
    api_base: String,
    host: String,
    region: String,
    credentials: Credentials,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    /// Builds a client against the production endpoint, honoring a
    /// `DREAMINA_API_BASE` override for testing.
    pub fn new(credentials: Credentials) -> Result<Self, Error> {
        let api_base = env::var("DREAMINA_API_BASE")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self::with_api_base(credentials, &api_base)
    }

    pub fn with_api_base(credentials: Credentials, api_base: &str) -> Result<Self, Error> {
        credentials.validate()?;
        let api_base = api_base.trim_end_matches('/').to_string();
        let parsed = Url::parse(&api_base)
            .map_err(|err| Error::MalformedRequest(format!("invalid api base '{api_base}': {err}")))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(Error::MalformedRequest(format!(
                    "api base '{api_base}' has no host"
                )))
            }
        };

        Ok(Self {
            api_base,
            host,
            region: DEFAULT_REGION.to_string(),
            credentials,
            timeout: DEFAULT_TIMEOUT,
            http: HttpClient::new(),
        })
    }

    /// Per-call deadline for each of the two network round-trips.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Signs and submits a CVProcess request, resolves where the image
    /// bytes live, and persists them at `request.output`. A fresh timestamp
    /// and signature are produced on every call; retrying callers get a new
    /// signature for free.
    pub fn generate(&self, request: &GenerateRequest) -> Result<Written, Error> {
        let raw = self.call_cv_process(request)?;
        let bytes = match response::resolve(&raw)? {
            ImageSource::Url(url) => self.fetch_image(&url)?,
            ImageSource::Inline(encoded) => response::decode_inline(&encoded)?,
        };
        ImageArtifact::new(&request.output, bytes).persist()
    }

    fn call_cv_process(&self, request: &GenerateRequest) -> Result<String, Error> {
        let body = CvProcessBody {
            req_key: REQ_KEY,
            prompt: request.prompt.clone(),
            width: request.width,
            height: request.height,
            seed: request.seed.unwrap_or_else(time_derived_seed),
            use_seed: true,
            return_url: true,
            logo_info: LogoInfo { add_logo: false },
        };
        let body_bytes = serde_json::to_vec(&body)
            .map_err(|err| Error::MalformedRequest(format!("body serialization failed: {err}")))?;

        // Already percent-encoded and sorted by key, as signing requires.
        let canonical_query = format!("Action={ACTION}&Version={API_VERSION}");
        let context = SigningContext::now(&self.region, SERVICE);
        let headers = sign::signed_header_set(
            &self.credentials,
            &context,
            "POST",
            "/",
            &canonical_query,
            &self.host,
            &body_bytes,
        )?;

        let endpoint = format!("{}/?{}", self.api_base, canonical_query);
        let mut builder = self
            .http
            .post(&endpoint)
            .timeout(self.timeout)
            .body(body_bytes);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .map_err(|err| Error::from_transport("CVProcess call", self.timeout, err))?;
        let status = response.status();
        let raw = response
            .text()
            .map_err(|err| Error::from_transport("CVProcess call", self.timeout, err))?;
        if !status.is_success() {
            return Err(Error::Api {
                stage: "CVProcess call",
                status: status.as_u16(),
                body: truncate_text(&raw, ERROR_BODY_MAX_CHARS),
            });
        }
        Ok(raw)
    }

    /// Plain unauthenticated GET of a result URL.
    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, Error> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .map_err(|err| Error::from_transport("image download", self.timeout, err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Api {
                stage: "image download",
                status: status.as_u16(),
                body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
            });
        }
        let bytes = response
            .bytes()
            .map_err(|err| Error::from_transport("image download", self.timeout, err))?;
        Ok(bytes.to_vec())
    }
}

fn time_derived_seed() -> u32 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    (millis % 1_000_000_000) as u32
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::{Client, GenerateRequest};
    use crate::error::Error;
    use crate::sign::Credentials;

    fn client_for(server: &MockServer) -> Client {
        let credentials = Credentials::new("AKTEST", "SKTEST").unwrap();
        Client::with_api_base(credentials, &server.base_url()).unwrap()
    }

    #[test]
    fn generate_downloads_remote_url_shape() {
        let server = MockServer::start();
        let image_bytes = b"\x89PNG\r\n\x1a\nfake-image".to_vec();

        let image_mock = server.mock(|when, then| {
            when.method(GET).path("/img.png");
            then.status(200).body(image_bytes.clone());
        });
        let api_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/")
                .query_param("Action", "CVProcess")
                .query_param("Version", "2022-08-31")
                .header_exists("authorization")
                .header_exists("x-date")
                .header_exists("x-content-sha256")
                .header("content-type", "application/json");
            then.status(200)
                .json_body(json!({"data": {"image_url": server.url("/img.png")}}));
        });

        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("nested").join("out.png");
        let request = GenerateRequest::new("a beautiful sunset", &output);
        let written = client_for(&server).generate(&request).unwrap();

        api_mock.assert();
        image_mock.assert();
        assert_eq!(written.bytes, image_bytes.len() as u64);
        assert_eq!(fs::read(&output).unwrap(), image_bytes);
    }

    #[test]
    fn generate_decodes_inline_shape() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(200).json_body(json!({"data": {"image": "QUJD"}}));
        });

        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out.png");
        let request = GenerateRequest::new("abc", &output);
        client_for(&server).generate(&request).unwrap();

        assert_eq!(fs::read(&output).unwrap(), b"ABC");
    }

    #[test]
    fn empty_data_leaves_no_file_behind() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(200).json_body(json!({"data": {}}));
        });

        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out.png");
        let request = GenerateRequest::new("abc", &output);
        let err = client_for(&server).generate(&request).unwrap_err();

        assert!(matches!(err, Error::NoImageData { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn api_error_surfaces_status_and_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(403).body(r#"{"message":"SignatureDoesNotMatch"}"#);
        });

        let temp = tempfile::tempdir().unwrap();
        let request = GenerateRequest::new("abc", temp.path().join("out.png"));
        let err = client_for(&server).generate(&request).unwrap_err();

        match err {
            Error::Api { status, body, .. } => {
                assert_eq!(status, 403);
                assert!(body.contains("SignatureDoesNotMatch"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn failed_image_download_is_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gone.png");
            then.status(404).body("not found");
        });
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(200)
                .json_body(json!({"data": {"image_url": server.url("/gone.png")}}));
        });

        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out.png");
        let request = GenerateRequest::new("abc", &output);
        let err = client_for(&server).generate(&request).unwrap_err();

        assert!(matches!(err, Error::Api { status: 404, .. }));
        assert!(!output.exists());
    }

    #[test]
    fn slow_api_call_times_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(200)
                .delay(Duration::from_secs(5))
                .json_body(json!({"data": {"image": "QUJD"}}));
        });

        let temp = tempfile::tempdir().unwrap();
        let request = GenerateRequest::new("abc", temp.path().join("out.png"));
        let err = client_for(&server)
            .with_timeout(Duration::from_millis(100))
            .generate(&request)
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn malformed_inline_payload_is_decode_failed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(200)
                .json_body(json!({"data": {"image": "@@not-base64@@"}}));
        });

        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out.png");
        let request = GenerateRequest::new("abc", &output);
        let err = client_for(&server).generate(&request).unwrap_err();

        assert!(matches!(err, Error::DecodeFailed(_)));
        assert!(!output.exists());
    }

    #[test]
    fn empty_credentials_fail_before_any_network_call() {
        let credentials = Credentials {
            access_key: "AKTEST".to_string(),
            secret_key: String::new(),
        };
        let err = Client::with_api_base(credentials, "http://127.0.0.1:9").unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }
}
