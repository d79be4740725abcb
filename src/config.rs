use anyhow::{Context, Result, bail};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::poll::PollPolicy;

pub const DEFAULT_AUTH_URL: &str =
    "https://developer.api.autodesk.com/authentication/v1/authenticate";
pub const DEFAULT_API_URL: &str = "https://developer.api.autodesk.com/autocad.io/us-east/v2";

/// Consumer key/secret pair of the app registered with Autodesk.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl Credentials {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .finish()
    }
}

/// Settings for one work-item run. Built once at start-up and handed to
/// [`Client::new`](crate::Client::new).
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    /// OAuth endpoint exchanging the consumer key/secret for a token.
    pub auth_url: String,
    /// Base of the work-item service; `WorkItems` is appended to it.
    pub api_url: String,
    /// Where the job's first output is written.
    pub output_path: PathBuf,
    /// Where the job's status report is written.
    pub report_path: PathBuf,
    pub poll: PollPolicy,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    /// Show a progress bar while downloading.
    pub progress: bool,
}

impl Config {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            output_path: PathBuf::from("result.pdf"),
            report_path: PathBuf::from("report.txt"),
            poll: PollPolicy::default(),
            timeout: Duration::from_secs(60),
            verify: true,
            progress: true,
        }
    }

    /// Loads credentials and endpoints from `ACADIO_*` environment variables
    /// and `.acadiorc`, all other settings at their defaults.
    pub fn from_env() -> Result<Self> {
        Self::load(ConfigOverrides::default())
    }

    /// Resolves each setting from (in order of precedence):
    /// - `overrides`
    /// - `ACADIO_CONSUMER_KEY`, `ACADIO_CONSUMER_SECRET`, `ACADIO_AUTH_URL`, `ACADIO_API_URL`
    /// - the rc file named by `ACADIO_RC`, else `./.acadiorc`, else `~/.acadiorc`
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        load_config(overrides, |name| std::env::var(name).ok(), &rc_candidates())
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

/// Values given explicitly, e.g. on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub auth_url: Option<String>,
    pub api_url: Option<String>,
    pub verify: Option<bool>,
}

#[derive(Debug, Default)]
struct RcConfig {
    key: Option<String>,
    secret: Option<String>,
    auth_url: Option<String>,
    api_url: Option<String>,
    verify: Option<bool>,
}

fn load_config<E>(overrides: ConfigOverrides, env: E, rc_candidates: &[PathBuf]) -> Result<Config>
where
    E: Fn(&str) -> Option<String>,
{
    let mut key = overrides
        .consumer_key
        .or_else(|| env("ACADIO_CONSUMER_KEY"));
    let mut secret = overrides
        .consumer_secret
        .or_else(|| env("ACADIO_CONSUMER_SECRET"));
    let mut auth_url = overrides.auth_url.or_else(|| env("ACADIO_AUTH_URL"));
    let mut api_url = overrides.api_url.or_else(|| env("ACADIO_API_URL"));
    let mut verify = overrides.verify;

    let incomplete = key.is_none()
        || secret.is_none()
        || auth_url.is_none()
        || api_url.is_none()
        || verify.is_none();
    if incomplete {
        for rc_path in rc_candidates {
            if rc_path.exists() {
                let cfg = read_rc(rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;

                key = key.or(cfg.key);
                secret = secret.or(cfg.secret);
                auth_url = auth_url.or(cfg.auth_url);
                api_url = api_url.or(cfg.api_url);
                verify = verify.or(cfg.verify);
                break;
            }
        }
    }

    let key = required(key, "consumer key", "ACADIO_CONSUMER_KEY", "key", rc_candidates)?;
    let secret = required(
        secret,
        "consumer secret",
        "ACADIO_CONSUMER_SECRET",
        "secret",
        rc_candidates,
    )?;

    let mut config = Config::new(Credentials::new(key, secret));
    if let Some(url) = auth_url {
        config.auth_url = url;
    }
    if let Some(url) = api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    config.verify = verify.unwrap_or(true);
    Ok(config)
}

fn required(
    value: Option<String>,
    what: &str,
    env_name: &str,
    rc_key: &str,
    rc_candidates: &[PathBuf],
) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ if rc_candidates.is_empty() => {
            bail!("Missing configuration: {what} (set {env_name} or create .acadiorc)")
        }
        _ => bail!(
            "Missing configuration: {what} (set {env_name} or put `{rc_key}:` in one of: {})",
            rc_candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    let mut cfg = RcConfig::default();

    // A key may be followed by its value on the next line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !looks_like_entry(line) {
                set_rc_value(&mut cfg, pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                pending_key = Some(k);
            } else {
                set_rc_value(&mut cfg, k, v);
            }
        }
    }

    Ok(cfg)
}

// `url: https://...` contains a colon too, so only known keys start an entry.
fn looks_like_entry(line: &str) -> bool {
    line.split_once(':').is_some_and(|(k, _)| {
        matches!(k.trim(), "key" | "secret" | "auth_url" | "api_url" | "verify")
    })
}

fn set_rc_value(cfg: &mut RcConfig, key: &str, value: &str) {
    match key {
        "key" => cfg.key = Some(value.to_string()),
        "secret" => cfg.secret = Some(value.to_string()),
        "auth_url" => cfg.auth_url = Some(value.to_string()),
        "api_url" => cfg.api_url = Some(value.to_string()),
        "verify" => cfg.verify = Some(value != "0" && !value.eq_ignore_ascii_case("false")),
        _ => {}
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    if let Ok(p) = std::env::var("ACADIO_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".acadiorc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".acadiorc"));
    }
    v
}
