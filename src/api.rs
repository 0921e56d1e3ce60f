// API client module: packages a local file and its catalog metadata into a
// multipart body and POSTs it to the data catalog's `resource_create`
// action. Sending goes through the `Transport` trait so the request flow can
// be exercised without a live server.

use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::multipart::MultipartBody;
use crate::progress::{ProgressReader, ProgressSink};
use reqwest::blocking::{Body, Client};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// Catalog action that creates a resource from an uploaded file.
pub const RESOURCE_CREATE: &str = "resource_create";

/// Build the URL of a catalog API action, e.g.
/// `https://host/api/3/action/resource_create`.
pub fn action_url(base_url: &str, action: &str) -> String {
    format!("{}/api/3/action/{}", base_url.trim_end_matches('/'), action)
}

/// What to upload. `metadata` becomes the text fields of the form; for
/// `resource_create` it needs at least `package_id` and `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub metadata: BTreeMap<String, String>,
}

impl UploadRequest {
    pub fn new(file_path: impl Into<PathBuf>, package_id: &str, name: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("package_id".to_string(), package_id.to_string());
        metadata.insert("name".to_string(), name.to_string());
        UploadRequest {
            file_path: file_path.into(),
            metadata,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of a request that reached the server. Non-2xx statuses are
/// still results; see [`UploadResult::error_for_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub status_code: u16,
    pub reason: String,
    pub body: String,
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Parse the response body; the catalog answers with a JSON envelope.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }

    /// Opt-in strict handling: turn a non-2xx status into an error.
    pub fn error_for_status(self) -> Result<Self, UploadError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(UploadError::Remote {
                status: self.status_code,
                reason: self.reason,
            })
        }
    }
}

/// A fully prepared request handed to a [`Transport`].
pub struct OutgoingRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub content_type: String,
    pub content_length: u64,
    pub body: Box<dyn Read + Send>,
}

/// Sends one prepared request and reports what came back. Implementations
/// must not retry.
pub trait Transport {
    fn send(&self, request: OutgoingRequest) -> Result<UploadResult, UploadError>;
}

/// Blocking reqwest transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Option<Duration>,
    connect_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &UploaderConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| UploadError::configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpTransport {
            client,
            timeout: config.timeout,
            connect_timeout: config.connect_timeout,
        })
    }

    fn map_error(&self, err: reqwest::Error) -> UploadError {
        if err.is_timeout() {
            UploadError::Timeout(expired_limit(
                err.is_connect(),
                self.timeout,
                self.connect_timeout,
            ))
        } else {
            UploadError::network(err)
        }
    }
}

// Which configured limit a timeout error belongs to. Connect timeouts are
// flagged by reqwest; anything else can only be the whole-request limit.
fn expired_limit(
    during_connect: bool,
    request_timeout: Option<Duration>,
    connect_timeout: Duration,
) -> Option<Duration> {
    if during_connect {
        Some(connect_timeout)
    } else {
        request_timeout
    }
}

// The phrase from the status line. hyper only keeps it when it differs
// from the canonical one.
fn reason_phrase(res: &reqwest::blocking::Response) -> String {
    match res.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => res.status().canonical_reason().unwrap_or("").to_string(),
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: OutgoingRequest) -> Result<UploadResult, UploadError> {
        let body = Body::sized(request.body, request.content_length);
        let res = self
            .client
            .post(&request.url)
            .headers(request.headers)
            .header(CONTENT_TYPE, request.content_type)
            .body(body)
            .send()
            .map_err(|e| self.map_error(e))?;

        let status = res.status();
        let reason = reason_phrase(&res);
        let body = res.text().map_err(|e| self.map_error(e))?;
        Ok(UploadResult {
            status_code: status.as_u16(),
            reason,
            body,
        })
    }
}

/// A request whose token and file have been checked, ready to send.
#[derive(Debug)]
pub struct PreparedUpload {
    url: String,
    headers: HeaderMap,
    body: MultipartBody,
}

impl PreparedUpload {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &MultipartBody {
        &self.body
    }
}

/// Uploads files to the catalog. Holds the configuration it was built
/// with; nothing is shared between calls.
pub struct Uploader<T = HttpTransport> {
    config: UploaderConfig,
    transport: T,
}

impl Uploader<HttpTransport> {
    pub fn new(config: UploaderConfig) -> Result<Self, UploadError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Uploader { config, transport })
    }
}

impl<T: Transport> Uploader<T> {
    pub fn with_transport(config: UploaderConfig, transport: T) -> Self {
        Uploader { config, transport }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Upload `request.file_path` with `request.metadata` as form fields.
    ///
    /// Configuration and file problems are reported before anything is
    /// sent. Any HTTP response, whatever its status, comes back as `Ok`.
    pub fn upload<S>(&self, request: &UploadRequest, sink: S) -> Result<UploadResult, UploadError>
    where
        S: ProgressSink + 'static,
    {
        let prepared = self.prepare(request)?;
        self.send(prepared, sink)
    }

    /// Check the token and open the file without sending anything.
    pub fn prepare(&self, request: &UploadRequest) -> Result<PreparedUpload, UploadError> {
        let headers = self.auth_headers()?;
        let body = MultipartBody::new(&request.metadata, &request.file_path)?;
        Ok(PreparedUpload {
            url: action_url(&self.config.base_url, RESOURCE_CREATE),
            headers,
            body,
        })
    }

    /// Stream a prepared upload through the transport.
    pub fn send<S>(&self, prepared: PreparedUpload, sink: S) -> Result<UploadResult, UploadError>
    where
        S: ProgressSink + 'static,
    {
        let PreparedUpload { url, headers, body } = prepared;
        let content_type = body.content_type();
        let total = body.content_length();
        log::info!(
            "Uploading {} ({} bytes, {} bytes encoded) to {}",
            body.file_name(),
            body.file_len(),
            total,
            url
        );
        log::debug!("Form fields: {:?}", body.field_names());

        let reader = ProgressReader::new(body.into_reader(), total, sink);
        let result = self.transport.send(OutgoingRequest {
            url,
            headers,
            content_type,
            content_length: total,
            body: Box::new(reader),
        });

        match &result {
            Ok(res) if res.is_success() => {
                log::info!("Upload finished: {} {}", res.status_code, res.reason)
            }
            Ok(res) => log::warn!("Server answered {} {}", res.status_code, res.reason),
            Err(e) => log::error!("Upload failed: {}", e),
        }
        result
    }

    /// Authorization header carrying the raw token, as the catalog expects.
    fn auth_headers(&self) -> Result<HeaderMap, UploadError> {
        let token = self.config.token()?;
        let mut value = HeaderValue::from_str(token).map_err(|_| {
            UploadError::configuration("API token contains characters not allowed in a header")
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}
