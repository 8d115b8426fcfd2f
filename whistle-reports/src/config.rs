use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    // Credential issuance and the access gate
    #[serde(default = "default_issuer_max_attempts")]
    pub issuer_max_attempts: u32,
    #[serde(default = "default_auth_max_failures")]
    pub auth_max_failures: u32,
    #[serde(default = "default_auth_failure_window_secs")]
    pub auth_failure_window_secs: u64,

    // Intake limits
    #[serde(default = "default_max_attachments")]
    pub max_attachments: usize,
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Comma separated list of origins allowed by CORS.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
}

fn default_port() -> u16 { 3010 }
fn default_jwt_secret() -> String { "development-secret-change-in-production".into() }
fn default_issuer_max_attempts() -> u32 { 8 }
fn default_auth_max_failures() -> u32 { 5 }
fn default_auth_failure_window_secs() -> u64 { 900 }
fn default_max_attachments() -> usize { 10 }
fn default_max_attachment_bytes() -> usize { 10 * 1024 * 1024 }
// ten base64-encoded attachments at the size limit, plus the form itself
fn default_max_body_bytes() -> usize { 150 * 1024 * 1024 }
fn default_allowed_origins() -> String { "http://localhost:3000".into() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            jwt_secret: default_jwt_secret(),
            issuer_max_attempts: default_issuer_max_attempts(),
            auth_max_failures: default_auth_max_failures(),
            auth_failure_window_secs: default_auth_failure_window_secs(),
            max_attachments: default_max_attachments(),
            max_attachment_bytes: default_max_attachment_bytes(),
            max_body_bytes: default_max_body_bytes(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("WHISTLE_REPORTS").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}
