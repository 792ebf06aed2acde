use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::fetcher::FetchPolicy;
use crate::reconciler::DEFAULT_ACTIVITY_CAP;
use crate::reconnect::ReconnectPolicy;

pub const ENV_API_URL: &str = "GATEKEEPER_API_URL";
pub const ENV_USER_ID: &str = "GATEKEEPER_USER_ID";
pub const ENV_VOICE_AGENT_ID: &str = "GATEKEEPER_VOICE_AGENT_ID";
pub const ENV_VOICE_API_KEY: &str = "GATEKEEPER_VOICE_API_KEY";

/// Third-party voice agent credentials. Both must be set for voice features.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceCredentials {
    pub agent_id: Option<String>,
    pub api_key: Option<String>,
}

impl fmt::Debug for VoiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceCredentials")
            .field("agent_id", &self.agent_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceFeatures {
    Enabled { agent_id: String },
    Disabled { missing: Vec<&'static str> },
}

impl VoiceFeatures {
    pub fn from_config(voice: &VoiceCredentials) -> Self {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let mut missing = Vec::new();
        if !present(&voice.agent_id) {
            missing.push("agent_id");
        }
        if !present(&voice.api_key) {
            missing.push("api_key");
        }
        match (&voice.agent_id, missing.is_empty()) {
            (Some(agent_id), true) => VoiceFeatures::Enabled { agent_id: agent_id.trim().to_string() },
            _ => {
                warn!(missing = ?missing, "voice credentials incomplete, voice features disabled");
                VoiceFeatures::Disabled { missing }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, VoiceFeatures::Enabled { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub user_id: String,
    pub activity_cap: usize,
    pub reconnect: ReconnectPolicy,
    pub fetch: FetchPolicy,
    pub voice: VoiceCredentials,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            user_id: "demo_user".to_string(),
            activity_cap: DEFAULT_ACTIVITY_CAP,
            reconnect: ReconnectPolicy::default(),
            fetch: FetchPolicy::default(),
            voice: VoiceCredentials::default(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gatekeeper").join("config.toml"))
}

impl ClientConfig {
    /// Read `path` (or the default location) if it exists, then apply
    /// environment overrides. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let mut cfg = match path {
            Some(p) if p.exists() => Self::from_file(&p)?,
            Some(p) => {
                debug!(path = %p.display(), "no config file, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        cfg.apply_env_from(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_API_URL) {
            self.api_url = v;
        }
        if let Some(v) = get(ENV_USER_ID) {
            self.user_id = v;
        }
        if let Some(v) = get(ENV_VOICE_AGENT_ID) {
            self.voice.agent_id = Some(v);
        }
        if let Some(v) = get(ENV_VOICE_API_KEY) {
            self.voice.api_key = Some(v);
        }
    }

    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let trimmed = self.api_url.trim().trim_end_matches('/').to_string();
        let url = Url::parse(&trimmed)
            .map_err(|e| ConfigError::InvalidUrl { url: self.api_url.clone(), reason: e.to_string() })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.api_url.clone(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl { url: self.api_url.clone(), reason: "missing host".into() });
        }
        self.api_url = trimmed;

        self.user_id = self.user_id.trim().to_string();
        if self.user_id.is_empty() {
            return Err(ConfigError::Invalid { field: "user_id", reason: "must not be empty".into() });
        }
        let r = &self.reconnect;
        if r.base_ms == 0 {
            return Err(ConfigError::Invalid { field: "reconnect.base_ms", reason: "must be positive".into() });
        }
        if r.cap_ms < r.base_ms {
            return Err(ConfigError::Invalid {
                field: "reconnect.cap_ms",
                reason: format!("{} is below base_ms {}", r.cap_ms, r.base_ms),
            });
        }
        if r.max_attempts == 0 {
            return Err(ConfigError::Invalid { field: "reconnect.max_attempts", reason: "must be positive".into() });
        }
        if self.fetch.timeout_ms == 0 {
            return Err(ConfigError::Invalid { field: "fetch.timeout_ms", reason: "must be positive".into() });
        }
        if self.activity_cap == 0 {
            return Err(ConfigError::Invalid { field: "activity_cap", reason: "must be positive".into() });
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(self.api_url.trim())
            .map_err(|e| ConfigError::InvalidUrl { url: self.api_url.clone(), reason: e.to_string() })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl { url: self.api_url.clone(), reason: "cannot be a base".into() });
        }
        if let Ok(mut segs) = url.path_segments_mut() {
            segs.pop_if_empty();
        }
        Ok(url)
    }

    /// `{api_url}/api/realtime/events/{user_id}` with the user id escaped.
    pub fn stream_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.base_url()?;
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| ConfigError::InvalidUrl { url: self.api_url.clone(), reason: "cannot be a base".into() })?;
            segs.extend(common::STREAM_PATH_PREFIX.split('/').filter(|s| !s.is_empty()));
            segs.push(&self.user_id);
        }
        Ok(url)
    }

    pub fn voice_features(&self) -> VoiceFeatures {
        VoiceFeatures::from_config(&self.voice)
    }
}
