use rand::distributions::{Alphanumeric, Uniform};
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

pub const TRACKING_ID_PREFIX: &str = "WB-";
/// 12 base-32 symbols, 60 bits.
pub const TRACKING_ID_LEN: usize = 12;
/// 32 base-62 symbols, ~190 bits.
pub const ACCESS_TOKEN_LEN: usize = 32;

/// Crockford base-32: no I, L, O or U, so IDs survive being read aloud or
/// written down.
const TRACKING_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Secret half of a report's credentials.
///
/// `Debug` is redacted so the value cannot leak through `tracing` fields.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn digest(&self) -> String {
        hash_token(&self.0)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub tracking_id: String,
    pub access_token: AccessToken,
}

#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    #[error("no free tracking id after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Mints tracking IDs and access tokens from the operating system CSPRNG.
#[derive(Debug, Clone)]
pub struct Issuer {
    max_attempts: u32,
    draw_id: fn() -> String,
}

impl Issuer {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1), draw_id: generate_tracking_id }
    }

    #[cfg(test)]
    pub(crate) fn with_id_source(max_attempts: u32, draw_id: fn() -> String) -> Self {
        Self { draw_id, ..Self::new(max_attempts) }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draw a fresh credential pair. `is_taken` reports tracking IDs that
    /// already exist; those are redrawn up to the attempt limit.
    pub fn issue(&self, is_taken: impl Fn(&str) -> bool) -> Result<IssuedCredentials, IssuerError> {
        for attempt in 1..=self.max_attempts {
            let tracking_id = (self.draw_id)();
            if is_taken(&tracking_id) {
                tracing::warn!(attempt, "tracking id collision, redrawing");
                continue;
            }
            return Ok(IssuedCredentials {
                tracking_id,
                access_token: generate_access_token(),
            });
        }
        Err(IssuerError::Exhausted { attempts: self.max_attempts })
    }
}

pub fn generate_tracking_id() -> String {
    let symbols = Uniform::from(0..TRACKING_ALPHABET.len());
    let suffix: String = OsRng
        .sample_iter(symbols)
        .take(TRACKING_ID_LEN)
        .map(|i| TRACKING_ALPHABET[i] as char)
        .collect();
    format!("{TRACKING_ID_PREFIX}{suffix}")
}

pub fn generate_access_token() -> AccessToken {
    let token: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(ACCESS_TOKEN_LEN)
        .map(char::from)
        .collect();
    AccessToken(token)
}

/// Canonical form of a user-typed tracking ID, or `None` if it cannot be one.
pub fn normalize_tracking_id(raw: &str) -> Option<String> {
    let id = raw.trim().to_ascii_uppercase();
    let suffix = id.strip_prefix(TRACKING_ID_PREFIX)?;
    let well_formed = suffix.len() == TRACKING_ID_LEN
        && suffix.bytes().all(|b| TRACKING_ALPHABET.contains(&b));
    well_formed.then_some(id)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
