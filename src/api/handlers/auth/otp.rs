//! One-time-code lifecycle: issue at login, verify on the second round-trip.
//!
//! Records live in the `verification_codes` table and are never deleted, only
//! marked `used` — the table doubles as an audit trail. At most one unused,
//! unexpired record exists per user: issuing a new code invalidates all prior
//! unused ones. Expired and absent records are indistinguishable to callers.
//!
//! Attempt counting is crash-safe and race-free: the counter is persisted
//! before the code comparison, through a conditional update filtered on the
//! observed value. Two concurrent attempts cannot both consume the same slot;
//! the loser re-reads and is judged against the fresh counter.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::supabase::TableClient;

pub const OTP_LENGTH: usize = 6;
pub const OTP_EXPIRY_MINUTES: i64 = 10;
pub const OTP_MAX_ATTEMPTS: i64 = 5;

const VERIFICATION_CODES: &str = "verification_codes";

// Bound on CAS retries under contention; each retry re-reads the record.
const VERIFY_RETRIES: usize = 3;

/// A persisted verification record.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationRecord {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub code: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i64,
    pub max_attempts: i64,
    pub used: bool,
}

/// Insert payload for a freshly issued code.
#[derive(Debug, Clone, Serialize)]
pub struct NewVerification {
    pub user_id: String,
    pub email: String,
    pub code: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i64,
    pub max_attempts: i64,
}

/// Why a verification attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpRejection {
    /// No unused, unexpired record — covers "never issued" and "expired"
    /// alike, so callers cannot probe which it was.
    NotFound,
    /// The attempt budget is spent; the record is now retired.
    AttemptsExhausted,
    CodeMismatch { remaining: i64 },
}

#[derive(Debug)]
pub enum VerifyOutcome {
    Valid { access_token: String },
    Rejected(OtpRejection),
}

/// Durable storage for verification records. All state lives behind this
/// seam; there is no in-memory cache, every check re-reads durable state.
#[allow(async_fn_in_trait)]
pub trait VerificationStore {
    /// Newest unused record for the user that expires at or after `now`.
    async fn latest_active(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationRecord>>;

    /// Mark every unused record for the user as used.
    async fn invalidate_all(&self, user_id: &str) -> Result<()>;

    async fn insert(&self, record: NewVerification) -> Result<()>;

    async fn mark_used(&self, id: &str) -> Result<()>;

    /// Conditionally bump the attempt counter from `observed` to
    /// `observed + 1`. Returns false when another request got there first.
    async fn increment_attempts(&self, id: &str, observed: i64) -> Result<bool>;
}

impl VerificationStore for TableClient {
    async fn latest_active(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationRecord>> {
        self.from(VERIFICATION_CODES)
            .eq("user_id", user_id)
            .eq("used", false)
            .gte("expires_at", now.to_rfc3339())
            .order_desc("created_at")
            .select_one()
            .await
    }

    async fn invalidate_all(&self, user_id: &str) -> Result<()> {
        self.from(VERIFICATION_CODES)
            .eq("user_id", user_id)
            .eq("used", false)
            .update(&json!({ "used": true }))
            .await?;

        Ok(())
    }

    async fn insert(&self, record: NewVerification) -> Result<()> {
        self.from(VERIFICATION_CODES)
            .insert(&serde_json::to_value(record)?)
            .await?;

        Ok(())
    }

    async fn mark_used(&self, id: &str) -> Result<()> {
        self.from(VERIFICATION_CODES)
            .eq("id", id)
            .update(&json!({ "used": true }))
            .await?;

        Ok(())
    }

    async fn increment_attempts(&self, id: &str, observed: i64) -> Result<bool> {
        let updated = self
            .from(VERIFICATION_CODES)
            .eq("id", id)
            .eq("attempts", observed)
            .update(&json!({ "attempts": observed + 1 }))
            .await?;

        Ok(!updated.is_empty())
    }
}

/// Generate a 6-digit code from the OS random source, uniform per digit.
#[must_use]
pub fn generate_code() -> String {
    let mut rng = OsRng;
    (0..OTP_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

/// Issue a fresh code for the user: invalidate prior unused records, persist
/// the new one with a zeroed attempt counter, and return the code for
/// out-of-band delivery. The access token is parked in the record and only
/// released by a successful [`verify`].
/// # Errors
/// Returns an error when the store is unreachable.
pub async fn issue<S: VerificationStore>(
    store: &S,
    user_id: &str,
    email: &str,
    access_token: &str,
) -> Result<String> {
    let code = generate_code();

    store.invalidate_all(user_id).await?;

    store
        .insert(NewVerification {
            user_id: user_id.to_string(),
            email: email.to_string(),
            code: code.clone(),
            access_token: access_token.to_string(),
            expires_at: Utc::now() + Duration::minutes(OTP_EXPIRY_MINUTES),
            attempts: 0,
            max_attempts: OTP_MAX_ATTEMPTS,
        })
        .await?;

    Ok(code)
}

/// Check a submitted code against the user's active record.
/// # Errors
/// Returns an error when the store is unreachable; every domain outcome is a
/// [`VerifyOutcome`].
pub async fn verify<S: VerificationStore>(
    store: &S,
    user_id: &str,
    code: &str,
) -> Result<VerifyOutcome> {
    for _ in 0..VERIFY_RETRIES {
        let Some(record) = store.latest_active(user_id, Utc::now()).await? else {
            return Ok(VerifyOutcome::Rejected(OtpRejection::NotFound));
        };

        if record.attempts >= record.max_attempts {
            store.mark_used(&record.id).await?;
            return Ok(VerifyOutcome::Rejected(OtpRejection::AttemptsExhausted));
        }

        // Count the attempt before comparing the code, so a crash mid-check
        // still burns the attempt. Losing the conditional update means a
        // concurrent request consumed this slot; re-read and try again.
        if !store.increment_attempts(&record.id, record.attempts).await? {
            continue;
        }

        if record.code.as_bytes() != code.as_bytes() {
            return Ok(VerifyOutcome::Rejected(OtpRejection::CodeMismatch {
                remaining: record.max_attempts - record.attempts - 1,
            }));
        }

        store.mark_used(&record.id).await?;

        return Ok(VerifyOutcome::Valid {
            access_token: record.access_token,
        });
    }

    // Persistent contention: deny without leaking whether a record exists.
    Ok(VerifyOutcome::Rejected(OtpRejection::NotFound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory [`VerificationStore`] mirroring the table semantics.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<VerificationRecord>>,
    }

    impl MemoryStore {
        fn all(&self) -> Vec<VerificationRecord> {
            self.rows.lock().unwrap().clone()
        }
    }

    impl VerificationStore for MemoryStore {
        async fn latest_active(
            &self,
            user_id: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<VerificationRecord>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id && !r.used && r.expires_at >= now)
                .next_back()
                .cloned())
        }

        async fn invalidate_all(&self, user_id: &str) -> Result<()> {
            for row in self.rows.lock().unwrap().iter_mut() {
                if row.user_id == user_id && !row.used {
                    row.used = true;
                }
            }
            Ok(())
        }

        async fn insert(&self, record: NewVerification) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            let id = format!("rec-{}", rows.len());
            rows.push(VerificationRecord {
                id,
                user_id: record.user_id,
                email: record.email,
                code: record.code,
                access_token: record.access_token,
                expires_at: record.expires_at,
                attempts: record.attempts,
                max_attempts: record.max_attempts,
                used: false,
            });
            Ok(())
        }

        async fn mark_used(&self, id: &str) -> Result<()> {
            for row in self.rows.lock().unwrap().iter_mut() {
                if row.id == id {
                    row.used = true;
                }
            }
            Ok(())
        }

        async fn increment_attempts(&self, id: &str, observed: i64) -> Result<bool> {
            for row in self.rows.lock().unwrap().iter_mut() {
                if row.id == id && row.attempts == observed {
                    row.attempts += 1;
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }

    #[test]
    fn test_generate_code_shape() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), OTP_LENGTH);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_issue_creates_single_active_record() {
        let store = MemoryStore::default();

        issue(&store, "u-1", "doc@careplus.dev", "token-1")
            .await
            .unwrap();
        issue(&store, "u-1", "doc@careplus.dev", "token-2")
            .await
            .unwrap();

        let rows = store.all();
        assert_eq!(rows.len(), 2);
        // First record invalidated, audit row kept
        assert!(rows[0].used);
        assert!(!rows[1].used);
        assert_eq!(rows[1].attempts, 0);
        assert_eq!(rows[1].max_attempts, OTP_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_correct_code_releases_token_once() {
        let store = MemoryStore::default();
        let code = issue(&store, "u-1", "doc@careplus.dev", "the-token")
            .await
            .unwrap();

        match verify(&store, "u-1", &code).await.unwrap() {
            VerifyOutcome::Valid { access_token } => assert_eq!(access_token, "the-token"),
            VerifyOutcome::Rejected(rejection) => panic!("rejected: {rejection:?}"),
        }

        // The used record is excluded from the query, so replay fails closed.
        match verify(&store, "u-1", &code).await.unwrap() {
            VerifyOutcome::Rejected(OtpRejection::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_code_counts_down() {
        let store = MemoryStore::default();
        let code = issue(&store, "u-1", "doc@careplus.dev", "the-token")
            .await
            .unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for expected_remaining in (0..OTP_MAX_ATTEMPTS).rev() {
            match verify(&store, "u-1", wrong).await.unwrap() {
                VerifyOutcome::Rejected(OtpRejection::CodeMismatch { remaining }) => {
                    assert_eq!(remaining, expected_remaining);
                }
                other => panic!("expected mismatch, got {other:?}"),
            }
        }

        // Budget is spent: even the correct code is rejected and the record
        // retired.
        match verify(&store, "u-1", &code).await.unwrap() {
            VerifyOutcome::Rejected(OtpRejection::AttemptsExhausted) => {}
            other => panic!("expected exhaustion, got {other:?}"),
        }
        match verify(&store, "u-1", &code).await.unwrap() {
            VerifyOutcome::Rejected(OtpRejection::NotFound) => {}
            other => panic!("expected NotFound after retirement, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_indistinguishable_from_absent() {
        let store = MemoryStore::default();
        store
            .insert(NewVerification {
                user_id: "u-1".to_string(),
                email: "doc@careplus.dev".to_string(),
                code: "123456".to_string(),
                access_token: "the-token".to_string(),
                expires_at: Utc::now() - Duration::minutes(1),
                attempts: 0,
                max_attempts: OTP_MAX_ATTEMPTS,
            })
            .await
            .unwrap();

        let expired = verify(&store, "u-1", "123456").await.unwrap();
        let absent = verify(&store, "u-2", "123456").await.unwrap();

        for outcome in [expired, absent] {
            match outcome {
                VerifyOutcome::Rejected(OtpRejection::NotFound) => {}
                other => panic!("expected NotFound, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_attempts_persist_before_comparison() {
        let store = MemoryStore::default();
        let code = issue(&store, "u-1", "doc@careplus.dev", "the-token")
            .await
            .unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        verify(&store, "u-1", wrong).await.unwrap();

        let record = store.all().into_iter().find(|r| !r.used).unwrap();
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn test_lost_cas_retries_against_fresh_counter() {
        /// Store whose conditional update always loses, as if a concurrent
        /// request incremented first.
        struct Contended(MemoryStore);

        impl VerificationStore for Contended {
            async fn latest_active(
                &self,
                user_id: &str,
                now: DateTime<Utc>,
            ) -> Result<Option<VerificationRecord>> {
                self.0.latest_active(user_id, now).await
            }
            async fn invalidate_all(&self, user_id: &str) -> Result<()> {
                self.0.invalidate_all(user_id).await
            }
            async fn insert(&self, record: NewVerification) -> Result<()> {
                self.0.insert(record).await
            }
            async fn mark_used(&self, id: &str) -> Result<()> {
                self.0.mark_used(id).await
            }
            async fn increment_attempts(&self, id: &str, observed: i64) -> Result<bool> {
                // Simulate the racing winner, then report the loss.
                self.0.increment_attempts(id, observed).await?;
                Ok(false)
            }
        }

        let store = Contended(MemoryStore::default());
        let code = issue(&store, "u-1", "doc@careplus.dev", "the-token")
            .await
            .unwrap();

        // The loser never slips through; it is denied, not granted a free
        // comparison.
        match verify(&store, "u-1", &code).await.unwrap() {
            VerifyOutcome::Rejected(_) => {}
            VerifyOutcome::Valid { .. } => panic!("lost race must not release the token"),
        }
    }
}
