use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::issuer::{hash_token, normalize_tracking_id, ACCESS_TOKEN_LEN};
use crate::models::Report;
use crate::rate_limit::FailureLimiter;
use crate::store::ReportStore;

/// Digest compared against when the tracking ID is unknown, so the miss
/// path performs the same hashing and comparison as a wrong token.
const DUMMY_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("invalid tracking id or access token")]
    Unauthorized,
    #[error("too many failed attempts, try again later")]
    RateLimited,
}

/// Releases a report only to callers holding its `(tracking id, token)` pair.
pub struct AccessGate {
    store: Arc<ReportStore>,
    limiter: FailureLimiter,
}

impl AccessGate {
    pub fn new(store: Arc<ReportStore>, limiter: FailureLimiter) -> Self {
        Self { store, limiter }
    }

    /// Returns the report snapshot on success. Every failure other than rate
    /// limiting is the same `Unauthorized`, whatever the reason.
    ///
    /// The stored digest is compared in place under the record's read lock;
    /// the report is only copied once the token has matched, so a wrong token
    /// on a large report costs the same as an unknown ID.
    pub async fn authorize(&self, tracking_id: &str, access_token: &str) -> Result<Report, GateError> {
        let limiter_key = limiter_key(tracking_id);
        let Some(attempt) = self.limiter.acquire(&limiter_key) else {
            metrics::counter!("report_access_denied_total", "reason" => "rate_limited").increment(1);
            return Err(GateError::RateLimited);
        };

        let presented = hash_token(access_token);
        let well_formed = access_token.len() == ACCESS_TOKEN_LEN;

        let lookup = match normalize_tracking_id(tracking_id) {
            Some(id) => {
                self.store
                    .inspect(&id, |report| {
                        (digest_eq(&presented, &report.access_token_hash) && well_formed)
                            .then(|| report.clone())
                    })
                    .await
            }
            None => None,
        };
        let matched = match lookup {
            Some(matched) => matched,
            None => {
                std::hint::black_box(digest_eq(&presented, DUMMY_DIGEST));
                None
            }
        };

        match matched {
            Some(report) => {
                self.limiter.clear(&limiter_key);
                Ok(report)
            }
            None => {
                metrics::counter!("report_access_denied_total", "reason" => "credentials").increment(1);
                tracing::debug!(attempt, "report access denied");
                Err(GateError::Unauthorized)
            }
        }
    }
}

fn digest_eq(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Rate-limit key for a presented ID: its canonical form when it parses, a
/// bounded prefix of the raw input otherwise.
fn limiter_key(tracking_id: &str) -> String {
    normalize_tracking_id(tracking_id)
        .unwrap_or_else(|| tracking_id.trim().chars().take(64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use chrono::Utc;

    use crate::issuer::{generate_access_token, generate_tracking_id};
    use crate::models::{Author, Category, ContactPreference, Message, NewReport};

    fn new_report() -> NewReport {
        NewReport {
            category: Category::Fraud,
            description: "Ten or more characters describing the issue.".into(),
            incident_date: None,
            location: None,
            people_involved: None,
            attachments: vec![],
            contact: ContactPreference::None,
        }
    }

    fn gate_with_report(max_failures: u32) -> (AccessGate, String, String) {
        let store = Arc::new(ReportStore::new());
        let tracking_id = generate_tracking_id();
        let token = generate_access_token();
        store
            .create(Report::new(tracking_id.clone(), token.digest(), new_report()))
            .unwrap();
        let gate = AccessGate::new(store, FailureLimiter::new(max_failures, Duration::from_secs(900)));
        (gate, tracking_id, token.expose().to_string())
    }

    #[tokio::test]
    async fn correct_pair_is_authorized() {
        let (gate, id, token) = gate_with_report(5);
        let report = gate.authorize(&id, &token).await.unwrap();
        assert_eq!(report.tracking_id, id);
    }

    #[tokio::test]
    async fn tracking_id_input_is_normalized() {
        let (gate, id, token) = gate_with_report(5);
        let typed = format!("  {}  ", id.to_lowercase());
        assert!(gate.authorize(&typed, &token).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_token_and_unknown_id_look_the_same() {
        let (gate, id, token) = gate_with_report(100);
        let wrong_token = generate_access_token();

        let wrong = gate.authorize(&id, wrong_token.expose()).await.unwrap_err();
        let unknown = gate.authorize(&generate_tracking_id(), &token).await.unwrap_err();
        let malformed = gate.authorize("not-an-id", "").await.unwrap_err();

        assert_eq!(wrong, GateError::Unauthorized);
        assert_eq!(wrong, unknown);
        assert_eq!(wrong, malformed);
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    async fn time_failures(gate: &AccessGate, id: &str, token: &str, rounds: u32) -> Duration {
        let start = Instant::now();
        for _ in 0..rounds {
            let _ = gate.authorize(id, token).await;
        }
        start.elapsed()
    }

    async fn assert_comparable(gate: &AccessGate, id: &str) {
        let wrong = generate_access_token();
        let unknown_id = generate_tracking_id();
        let rounds = 200;

        // warm up
        time_failures(gate, id, wrong.expose(), 20).await;
        time_failures(gate, &unknown_id, wrong.expose(), 20).await;

        let wrong_token_time = time_failures(gate, id, wrong.expose(), rounds).await;
        let unknown_id_time = time_failures(gate, &unknown_id, wrong.expose(), rounds).await;

        let (fast, slow) = if wrong_token_time < unknown_id_time {
            (wrong_token_time, unknown_id_time)
        } else {
            (unknown_id_time, wrong_token_time)
        };
        assert!(
            slow < fast * 10,
            "wrong token {wrong_token_time:?} vs unknown id {unknown_id_time:?}"
        );
    }

    #[tokio::test]
    async fn failure_paths_take_comparable_time() {
        let (gate, id, _) = gate_with_report(u32::MAX);
        assert_comparable(&gate, &id).await;
    }

    #[tokio::test]
    async fn report_size_does_not_show_in_failure_timing() {
        let store = Arc::new(ReportStore::new());
        let tracking_id = generate_tracking_id();
        let mut report = Report::new(tracking_id.clone(), generate_access_token().digest(), new_report());
        let filler = "x".repeat(5_000);
        report.messages = (0..2_000)
            .map(|_| Message {
                author: Author::CaseHandler,
                content: filler.clone(),
                created_at: Utc::now(),
            })
            .collect();
        store.create(report).unwrap();

        let gate = AccessGate::new(store, FailureLimiter::new(u32::MAX, Duration::from_secs(900)));
        assert_comparable(&gate, &tracking_id).await;
    }

    #[tokio::test]
    async fn repeated_failures_are_rate_limited() {
        let (gate, id, token) = gate_with_report(3);
        let wrong = generate_access_token();
        for _ in 0..3 {
            assert_eq!(gate.authorize(&id, wrong.expose()).await.unwrap_err(), GateError::Unauthorized);
        }
        // even the right token is refused until the window passes
        assert_eq!(gate.authorize(&id, &token).await.unwrap_err(), GateError::RateLimited);
    }

    #[tokio::test]
    async fn unknown_ids_are_rate_limited_too() {
        let (gate, _, token) = gate_with_report(2);
        let guessed = generate_tracking_id();
        gate.authorize(&guessed, &token).await.unwrap_err();
        gate.authorize(&guessed, &token).await.unwrap_err();
        assert_eq!(gate.authorize(&guessed, &token).await.unwrap_err(), GateError::RateLimited);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let (gate, id, token) = gate_with_report(3);
        let wrong = generate_access_token();
        gate.authorize(&id, wrong.expose()).await.unwrap_err();
        gate.authorize(&id, wrong.expose()).await.unwrap_err();
        gate.authorize(&id, &token).await.unwrap();
        gate.authorize(&id, wrong.expose()).await.unwrap_err();
        gate.authorize(&id, wrong.expose()).await.unwrap_err();
        assert!(gate.authorize(&id, &token).await.is_ok());
    }
}
