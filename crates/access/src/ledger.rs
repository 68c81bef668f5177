use std::sync::Arc;

use chrono::{DateTime, Utc};
use lettergate_common::{KeySpace, StoreError, StoreResult};
use lettergate_profile::{DetectedProfile, ProfileType};
use lettergate_store::SharedStore;
use serde::{Deserialize, Serialize};

/// Everything the ledger knows about one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visitor {
    pub session_id: String,
    pub visit_count: u64,
    pub profile_type: Option<ProfileType>,
    pub confidence: u8,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// JSON body stored at `visitor:{session}:profile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileRecord {
    #[serde(default)]
    profile_type: Option<ProfileType>,
    #[serde(default)]
    confidence: u8,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl ProfileRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            profile_type: None,
            confidence: 0,
            first_seen: now,
            last_seen: now,
        }
    }
}

/// Per-session visit counter and last detected profile.
///
/// Records never expire; the count only grows.
#[derive(Clone)]
pub struct VisitorLedger {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
}

impl VisitorLedger {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    async fn load_count(&self, session: &str) -> StoreResult<Option<u64>> {
        let key = self.keys.visitor_count(session);
        match self.store.get(&key).await? {
            Some(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key,
                    message: format!("visit count is not an integer: {}", e),
                }),
            None => Ok(None),
        }
    }

    async fn load_record(&self, session: &str) -> StoreResult<Option<ProfileRecord>> {
        match self.store.get(&self.keys.visitor_profile(session)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_record(&self, session: &str, record: &ProfileRecord) -> StoreResult<()> {
        let body = serde_json::to_string(record)?;
        self.store
            .set(&self.keys.visitor_profile(session), &body, None)
            .await
    }

    fn visitor(session: &str, count: u64, record: ProfileRecord) -> Visitor {
        Visitor {
            session_id: session.to_string(),
            visit_count: count,
            profile_type: record.profile_type,
            confidence: record.confidence,
            first_seen: record.first_seen,
            last_seen: record.last_seen,
        }
    }

    /// Note a request from `session`.
    ///
    /// The count is incremented for the first request of a server-side
    /// session and for the first sighting ever; repeated requests inside a
    /// session only refresh `last_seen`.
    pub async fn record_visit(&self, session: &str, new_session: bool) -> StoreResult<Visitor> {
        let count = match (new_session, self.load_count(session).await?) {
            (false, Some(count)) => count,
            _ => self.store.incr(&self.keys.visitor_count(session)).await?.max(0) as u64,
        };

        let now = Utc::now();
        let mut record = self
            .load_record(session)
            .await?
            .unwrap_or_else(|| ProfileRecord::new(now));
        record.last_seen = now;
        self.save_record(session, &record).await?;

        tracing::debug!(session, visit_count = count, new_session, "visit recorded");
        Ok(Self::visitor(session, count, record))
    }

    /// Overwrite the stored profile type and confidence.
    pub async fn record_profile(&self, session: &str, profile: &DetectedProfile) -> StoreResult<()> {
        let now = Utc::now();
        let mut record = self
            .load_record(session)
            .await?
            .unwrap_or_else(|| ProfileRecord::new(now));
        record.profile_type = Some(profile.profile_type);
        record.confidence = profile.confidence;
        record.last_seen = now;
        self.save_record(session, &record).await
    }

    pub async fn get(&self, session: &str) -> StoreResult<Option<Visitor>> {
        let count = self.load_count(session).await?;
        let record = self.load_record(session).await?;
        Ok(match (count, record) {
            (None, None) => None,
            (count, record) => {
                let record = record.unwrap_or_else(|| ProfileRecord::new(Utc::now()));
                Some(Self::visitor(session, count.unwrap_or(0), record))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettergate_profile::user_agent::DeviceSummary;
    use lettergate_store::MemoryStore;

    fn ledger() -> VisitorLedger {
        VisitorLedger::new(Arc::new(MemoryStore::new()), KeySpace::default())
    }

    #[tokio::test]
    async fn first_sighting_counts_even_without_new_session_flag() {
        let ledger = ledger();
        let visitor = ledger.record_visit("s1", false).await.unwrap();
        assert_eq!(visitor.visit_count, 1);
        assert_eq!(visitor.profile_type, None);
    }

    #[tokio::test]
    async fn only_new_sessions_increment() {
        let ledger = ledger();
        ledger.record_visit("s1", true).await.unwrap();
        ledger.record_visit("s1", false).await.unwrap();
        ledger.record_visit("s1", false).await.unwrap();
        let visitor = ledger.record_visit("s1", true).await.unwrap();
        assert_eq!(visitor.visit_count, 2);
        assert!(visitor.last_seen >= visitor.first_seen);
    }

    #[tokio::test]
    async fn profile_is_overwritten() {
        let ledger = ledger();
        ledger.record_visit("s1", true).await.unwrap();

        let mut profile = DetectedProfile::other(DeviceSummary::unknown());
        profile.profile_type = ProfileType::Cto;
        profile.confidence = 70;
        ledger.record_profile("s1", &profile).await.unwrap();

        profile.profile_type = ProfileType::Developer;
        profile.confidence = 21;
        ledger.record_profile("s1", &profile).await.unwrap();

        let visitor = ledger.get("s1").await.unwrap().unwrap();
        assert_eq!(visitor.profile_type, Some(ProfileType::Developer));
        assert_eq!(visitor.confidence, 21);
        assert_eq!(visitor.visit_count, 1);
    }

    #[tokio::test]
    async fn unknown_session_is_none() {
        assert!(ledger().get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_count_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.set("visitor:s1:count", "many", None).await.unwrap();
        let ledger = VisitorLedger::new(store, KeySpace::default());
        assert!(matches!(
            ledger.get("s1").await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
