use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role carried by a staff bearer token. Reporters never hold one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StaffRole {
    CaseHandler,
    Supervisor,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::CaseHandler => "caseHandler",
            StaffRole::Supervisor => "supervisor",
        }
    }
}

/// Staff JWT payload. Tokens are minted by the identity provider; this
/// service only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: StaffRole,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(staff_id: Uuid, role: StaffRole, ttl_secs: i64) -> Self {
        let iat = Utc::now().timestamp();
        Self { sub: staff_id, role, iat, exp: iat + ttl_secs }
    }
}

#[derive(Debug, Clone)]
pub struct StaffUser {
    pub id: Uuid,
    pub role: StaffRole,
}

impl StaffUser {
    pub fn is_supervisor(&self) -> bool {
        self.role == StaffRole::Supervisor
    }
}

impl From<Claims> for StaffUser {
    fn from(claims: Claims) -> Self {
        Self { id: claims.sub, role: claims.role }
    }
}
