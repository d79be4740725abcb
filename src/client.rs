use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{
    ACCEPT, ACCEPT_CHARSET, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
    USER_AGENT,
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Config, Credentials};
use crate::error::{Error, Result, http_error};
use crate::poll::SystemClock;
use crate::workflow::{self, Outcome, WorkItemApi};
use crate::workitem::{
    JobId, JobResult, JobStatus, StatusReply, SubmitReply, WorkItem, WorkItemResource,
};

const ODATA_JSON: &str = "application/json;odata.metadata=minimal";

/// Authorization obtained from the authentication endpoint.
///
/// Valid for the rest of the run; never persisted or refreshed.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    token_type: String,
    access_token: String,
}

impl Token {
    pub fn new(token_type: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            token_type: token_type.into(),
            access_token: access_token.into(),
        }
    }

    /// `"<token_type> <access_token>"`, ready for the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, serde::Deserialize)]
struct AuthReply {
    token_type: String,
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Headers every call to the work-item service carries, whatever the verb.
pub fn odata_headers(token: &Token) -> Result<HeaderMap> {
    let mut auth = HeaderValue::from_str(&token.header_value())?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("odata-version"),
        HeaderValue::from_static("4.0"),
    );
    headers.insert(
        HeaderName::from_static("odata-maxversion"),
        HeaderValue::from_static("4.0"),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(ODATA_JSON));
    headers.insert(ACCEPT, HeaderValue::from_static(ODATA_JSON));
    headers.insert(ACCEPT_CHARSET, HeaderValue::from_static("UTF-8"));
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

/// Blocking client for the AutoCAD I/O work-item service.
#[derive(Debug, Clone)]
pub struct Client {
    config: Config,
    http: HttpClient,
}

impl Client {
    pub fn new(config: Config) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("acadio/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("acadio")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout);

        if !config.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Authenticates with the configured credentials, submits `item`, waits for
    /// it to finish and downloads its files when it succeeded.
    pub fn run(&self, item: &WorkItem, cancel: &CancellationToken) -> Result<Outcome> {
        workflow::run(self, &self.config, item, &SystemClock, cancel)
    }

    /// Exchanges the consumer key/secret for a token.
    pub fn authenticate(&self, credentials: &Credentials) -> Result<Token> {
        let url = &self.config.auth_url;
        debug!(%url, "requesting access token");

        let resp = self
            .http
            .post(url)
            .form(&[
                ("client_id", credentials.consumer_key.as_str()),
                ("client_secret", credentials.consumer_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()?;

        let reply: AuthReply = expect_json(resp, StatusCode::OK, "authentication")?;
        if let Some(secs) = reply.expires_in {
            debug!(expires_in = secs, "access token issued");
        }
        Ok(Token::new(reply.token_type, reply.access_token))
    }

    /// Posts `item` to `WorkItems` and returns the id the service assigned.
    pub fn submit(&self, token: &Token, item: &WorkItem) -> Result<JobId> {
        let url = format!("{}/WorkItems", self.config.api_url);
        info!(activity = %item.activity_id, "submitting work item");

        let body = serde_json::to_vec(item).map_err(Error::Encode)?;
        let resp = self.odata(self.http.post(&url), token)?.body(body).send()?;

        let reply: SubmitReply = expect_json(resp, StatusCode::CREATED, "work item submission")?;
        let id = JobId::new(reply.id)?;
        info!(%id, "work item submitted");
        Ok(id)
    }

    /// Current state of the work item.
    pub fn status(&self, token: &Token, id: &JobId) -> Result<JobStatus> {
        let url = format!("{}/Status", self.work_item_url(id));
        let resp = self.odata(self.http.get(&url), token)?.send()?;
        let reply: StatusReply = expect_json(resp, StatusCode::OK, "work item status")?;
        Ok(reply.value)
    }

    /// Locations of the first output and of the status report.
    pub fn fetch_results(&self, token: &Token, id: &JobId) -> Result<JobResult> {
        let url = self.work_item_url(id);
        let resp = self.odata(self.http.get(&url), token)?.send()?;
        let resource: WorkItemResource = expect_json(resp, StatusCode::OK, "work item")?;
        resource.into_result()
    }

    /// Downloads `url` into `target`, replacing whatever is there.
    ///
    /// Result and report URLs are pre-signed, so no authorization is sent.
    pub fn download(&self, url: &str, target: &Path) -> Result<PathBuf> {
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!(%url, target = %target.display(), "downloading");
        let mut resp = self.http.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(http_error(status, url, &text));
        }

        let io_err = |source: std::io::Error| Error::Io {
            path: target.to_path_buf(),
            source,
        };

        let mut out = File::create(target).map_err(io_err)?;
        let pb = self.progress_bar(resp.content_length());

        let mut buf = [0u8; 64 * 1024];
        let mut written: u64 = 0;
        loop {
            let n = match resp.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => return Err(io_err(e)),
            };
            out.write_all(&buf[..n]).map_err(io_err)?;
            written += n as u64;
            if let Some(pb) = &pb {
                pb.inc(n as u64);
            }
        }
        out.flush().map_err(io_err)?;

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        info!(bytes = written, target = %target.display(), "downloaded");
        Ok(target.to_path_buf())
    }

    fn work_item_url(&self, id: &JobId) -> String {
        // OData string keys escape a quote by doubling it.
        format!(
            "{}/WorkItems('{}')",
            self.config.api_url,
            id.as_str().replace('\'', "''")
        )
    }

    fn odata(&self, req: RequestBuilder, token: &Token) -> Result<RequestBuilder> {
        Ok(req.headers(odata_headers(token)?))
    }

    fn progress_bar(&self, len: Option<u64>) -> Option<ProgressBar> {
        if !self.config.progress {
            return None;
        }
        let pb = match len {
            Some(len) => {
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                )
                .map(|s| s.progress_chars("=>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
                ProgressBar::new(len).with_style(style)
            }
            None => ProgressBar::new_spinner(),
        };
        Some(pb)
    }
}

impl WorkItemApi for Client {
    fn authenticate(&self, credentials: &Credentials) -> Result<Token> {
        Client::authenticate(self, credentials)
    }

    fn submit(&self, token: &Token, item: &WorkItem) -> Result<JobId> {
        Client::submit(self, token, item)
    }

    fn status(&self, token: &Token, id: &JobId) -> Result<JobStatus> {
        Client::status(self, token, id)
    }

    fn fetch_results(&self, token: &Token, id: &JobId) -> Result<JobResult> {
        Client::fetch_results(self, token, id)
    }

    fn download(&self, url: &str, target: &Path) -> Result<PathBuf> {
        Client::download(self, url, target)
    }
}

fn expect_json<T: DeserializeOwned>(
    resp: Response,
    expected: StatusCode,
    what: &'static str,
) -> Result<T> {
    let status = resp.status();
    if status != expected {
        let url = resp.url().to_string();
        let text = resp.text().unwrap_or_default();
        return Err(http_error(status, &url, &text));
    }

    let text = resp.text()?;
    serde_json::from_str::<T>(&text).map_err(|e| Error::structure(what, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_header_value_joins_type_and_token() {
        assert_eq!(Token::new("Bearer", "abc").header_value(), "Bearer abc");
    }

    #[test]
    fn token_debug_hides_access_token() {
        let text = format!("{:?}", Token::new("Bearer", "s3cr3t"));
        assert!(text.contains("Bearer"));
        assert!(!text.contains("s3cr3t"));
    }

    #[test]
    fn odata_headers_are_complete() {
        let headers = odata_headers(&Token::new("Bearer", "abc")).unwrap();
        assert_eq!(headers.len(), 6);
        assert_eq!(headers["OData-Version"], "4.0");
        assert_eq!(headers["OData-MaxVersion"], "4.0");
        assert_eq!(headers[CONTENT_TYPE], ODATA_JSON);
        assert_eq!(headers[ACCEPT], ODATA_JSON);
        assert_eq!(headers[ACCEPT_CHARSET], "UTF-8");
        assert_eq!(headers[AUTHORIZATION], "Bearer abc");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn odata_headers_are_stable_across_calls() {
        let token = Token::new("Bearer", "abc");
        assert_eq!(odata_headers(&token).unwrap(), odata_headers(&token).unwrap());
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let err = odata_headers(&Token::new("Bearer", "a\nb")).unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)));
    }

    #[test]
    fn work_item_url_escapes_quotes() {
        let cfg = Config::new(Credentials::new("k", "s"));
        let api = cfg.api_url.clone();
        let client = Client::new(cfg).unwrap();
        let id = JobId::new("a'b").unwrap();
        assert_eq!(client.work_item_url(&id), format!("{api}/WorkItems('a''b')"));
    }
}
