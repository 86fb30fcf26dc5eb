//! Latest-code resolution over the record store.

use crate::clock::Clock;
use crate::error::SmsResult;
use crate::store::RecordStore;
use crate::types::{MatchSet, MessageRecord, RecordQuery, Resolution};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Tunables for resolution and waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPolicy {
    /// How far back a record may have been received and still count
    pub recency_window: Duration,
    /// Maximum candidates examined per match set
    pub candidate_limit: usize,
    /// Delay between resolve attempts while waiting
    pub poll_interval: Duration,
    /// Upper bound applied to caller-supplied wait timeouts
    pub max_wait: Duration,
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self {
            recency_window: Duration::from_secs(10 * 60),
            candidate_limit: 5,
            poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(120),
        }
    }
}

/// Finds the newest usable code for a phone number.
#[derive(Clone)]
pub struct LatestCodeResolver {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    policy: LookupPolicy,
}

impl LatestCodeResolver {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, policy: LookupPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &LookupPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Resolve the latest code for `phone_number`, optionally requiring the
    /// message body to contain `keyword`.
    ///
    /// Candidates are records received within the recency window whose
    /// extracted phone number equals `phone_number`. Only when there are no
    /// such records are records whose sim slot merely contains the number
    /// considered. At most `candidate_limit` of the newest candidates are
    /// examined; older records are never reached even if they carry a code.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(
        &self,
        phone_number: &str,
        keyword: Option<&str>,
    ) -> SmsResult<Option<Resolution>> {
        let now = self.clock.now();
        let keyword = keyword.filter(|k| !k.is_empty());

        let primary = RecordQuery {
            phone_number_eq: Some(phone_number.to_string()),
            ..self.window_query(now, keyword)
        };
        let candidates = self.store.query(&primary).await?;

        let (candidates, match_set) = if candidates.is_empty() {
            let secondary = RecordQuery {
                sim_slot_contains: Some(phone_number.to_string()),
                ..self.window_query(now, keyword)
            };
            (self.store.query(&secondary).await?, MatchSet::Secondary)
        } else {
            (candidates, MatchSet::Primary)
        };

        debug!(
            candidates = candidates.len(),
            ?match_set,
            "Scanning candidates for a code"
        );

        Ok(first_with_code(candidates).map(|(code, record)| Resolution {
            code,
            record,
            match_set,
        }))
    }

    fn window_query(&self, now: DateTime<Utc>, keyword: Option<&str>) -> RecordQuery {
        // An unrepresentable window leaves the lower bound open
        let received_after = chrono::Duration::from_std(self.policy.recency_window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window));

        RecordQuery {
            received_after,
            received_before: Some(now),
            body_contains: keyword.map(str::to_string),
            limit: Some(self.policy.candidate_limit),
            ..Default::default()
        }
    }
}

fn first_with_code(candidates: Vec<MessageRecord>) -> Option<(String, MessageRecord)> {
    candidates
        .into_iter()
        .find_map(|record| record.extracted_code.clone().map(|code| (code, record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SmsError;
    use crate::store::{MemoryRecordStore, MockRecordStore};
    use crate::types::{NewMessage, NewRecord};
    use chrono::TimeZone;

    const PHONE: &str = "15012345678";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryRecordStore>,
        clock: ManualClock,
        resolver: LatestCodeResolver,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryRecordStore::new());
        let clock = ManualClock::new(start());
        let resolver = LatestCodeResolver::new(
            store.clone(),
            Arc::new(clock.clone()),
            LookupPolicy::default(),
        );
        Fixture {
            store,
            clock,
            resolver,
        }
    }

    async fn insert(
        store: &MemoryRecordStore,
        seconds_ago: i64,
        body: &str,
        sim_slot: &str,
        phone: Option<&str>,
        code: Option<&str>,
    ) -> MessageRecord {
        let time = start() - chrono::Duration::seconds(seconds_ago);
        store
            .insert(NewRecord {
                message: NewMessage::new("10086", body, time).with_sim_slot(sim_slot),
                extracted_code: code.map(String::from),
                extracted_phone_number: phone.map(String::from),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_newest_with_code_wins() {
        let f = fixture();
        insert(&f.store, 120, "code 111111", "SIM1", Some(PHONE), Some("111111")).await;
        insert(&f.store, 60, "welcome aboard", "SIM1", Some(PHONE), None).await;

        let resolution = f.resolver.resolve(PHONE, None).await.unwrap().unwrap();
        assert_eq!(resolution.code, "111111");
        assert_eq!(resolution.match_set, MatchSet::Primary);
    }

    #[tokio::test]
    async fn test_newest_code_preferred() {
        let f = fixture();
        insert(&f.store, 300, "code 111111", "SIM1", Some(PHONE), Some("111111")).await;
        insert(&f.store, 30, "code 222222", "SIM1", Some(PHONE), Some("222222")).await;

        let resolution = f.resolver.resolve(PHONE, None).await.unwrap().unwrap();
        assert_eq!(resolution.code, "222222");
    }

    #[tokio::test]
    async fn test_window_excludes_stale_and_future_records() {
        let f = fixture();
        insert(&f.store, 601, "code 111111", "SIM1", Some(PHONE), Some("111111")).await;
        insert(&f.store, -5, "code 333333", "SIM1", Some(PHONE), Some("333333")).await;

        assert!(f.resolver.resolve(PHONE, None).await.unwrap().is_none());

        // exactly at the window edge still counts
        insert(&f.store, 600, "code 444444", "SIM1", Some(PHONE), Some("444444")).await;
        let resolution = f.resolver.resolve(PHONE, None).await.unwrap().unwrap();
        assert_eq!(resolution.code, "444444");
    }

    #[tokio::test]
    async fn test_record_ages_out() {
        let f = fixture();
        insert(&f.store, 0, "code 111111", "SIM1", Some(PHONE), Some("111111")).await;
        assert!(f.resolver.resolve(PHONE, None).await.unwrap().is_some());

        f.clock.advance(Duration::from_secs(10 * 60 + 1));
        assert!(f.resolver.resolve(PHONE, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keyword_is_case_sensitive_substring() {
        let f = fixture();
        insert(&f.store, 60, "【Taobao】code 111111", "SIM1", Some(PHONE), Some("111111")).await;
        insert(&f.store, 30, "【JD】code 222222", "SIM1", Some(PHONE), Some("222222")).await;

        let hit = f.resolver.resolve(PHONE, Some("Taobao")).await.unwrap().unwrap();
        assert_eq!(hit.code, "111111");

        assert!(f.resolver.resolve(PHONE, Some("taobao")).await.unwrap().is_none());

        // empty keyword means no keyword
        let hit = f.resolver.resolve(PHONE, Some("")).await.unwrap().unwrap();
        assert_eq!(hit.code, "222222");
    }

    #[tokio::test]
    async fn test_secondary_match_on_sim_slot() {
        let f = fixture();
        insert(&f.store, 60, "code 555555", "SIM1(+86 15012345678)", None, Some("555555")).await;

        let hit = f.resolver.resolve(PHONE, None).await.unwrap().unwrap();
        assert_eq!(hit.code, "555555");
        assert_eq!(hit.match_set, MatchSet::Secondary);
    }

    #[tokio::test]
    async fn test_secondary_match_honors_keyword() {
        let f = fixture();
        insert(&f.store, 60, "【Taobao】code 111111", "SIM1(15012345678)", None, Some("111111")).await;
        insert(&f.store, 30, "【JD】code 222222", "SIM1(15012345678)", None, Some("222222")).await;

        let hit = f.resolver.resolve(PHONE, Some("Taobao")).await.unwrap().unwrap();
        assert_eq!(hit.code, "111111");
        assert_eq!(hit.match_set, MatchSet::Secondary);

        assert!(f.resolver.resolve(PHONE, Some("Alipay")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_secondary_candidate_cap() {
        let f = fixture();
        insert(&f.store, 500, "code 111111", "SIM1(15012345678)", None, Some("111111")).await;
        for i in 0..5 {
            insert(&f.store, 100 - i, "no code here", "SIM1(15012345678)", None, None).await;
        }

        assert!(f.resolver.resolve(PHONE, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_primary_set_shadows_secondary() {
        let f = fixture();
        // primary candidate exists but has no code
        insert(&f.store, 30, "hello", "SIM1", Some(PHONE), None).await;
        // secondary candidate has a code but must not be consulted
        insert(&f.store, 20, "code 555555", "SIM2(15012345678)", None, Some("555555")).await;

        assert!(f.resolver.resolve(PHONE, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_candidate_cap() {
        let f = fixture();
        insert(&f.store, 500, "code 111111", "SIM1", Some(PHONE), Some("111111")).await;
        for i in 0..5 {
            insert(&f.store, 100 - i, "no code here", "SIM1", Some(PHONE), None).await;
        }

        // the only coded record is sixth newest
        assert!(f.resolver.resolve(PHONE, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_numbers_ignored() {
        let f = fixture();
        insert(&f.store, 30, "code 111111", "SIM1(15099999999)", Some("15099999999"), Some("111111")).await;

        assert!(f.resolver.resolve(PHONE, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_secondary_skipped_when_primary_nonempty() {
        let mut store = MockRecordStore::new();
        let record = MessageRecord::from_new(
            1,
            NewRecord {
                message: NewMessage::new("10086", "code 123456", start()),
                extracted_code: Some("123456".into()),
                extracted_phone_number: Some(PHONE.into()),
            },
        );

        store
            .expect_query()
            .withf(|q| q.phone_number_eq.as_deref() == Some(PHONE) && q.limit == Some(5))
            .times(1)
            .returning(move |_| Ok(vec![record.clone()]));
        store
            .expect_query()
            .withf(|q| q.sim_slot_contains.is_some())
            .never();

        let resolver = LatestCodeResolver::new(
            Arc::new(store),
            Arc::new(ManualClock::new(start())),
            LookupPolicy::default(),
        );
        let hit = resolver.resolve(PHONE, None).await.unwrap().unwrap();
        assert_eq!(hit.record.id, 1);
    }

    #[tokio::test]
    async fn test_storage_error_propagates() {
        let mut store = MockRecordStore::new();
        store
            .expect_query()
            .returning(|_| Err(SmsError::Storage("disk on fire".into())));

        let resolver = LatestCodeResolver::new(
            Arc::new(store),
            Arc::new(ManualClock::new(start())),
            LookupPolicy::default(),
        );
        let err = resolver.resolve(PHONE, None).await.unwrap_err();
        assert!(matches!(err, SmsError::Storage(_)));
    }
}
