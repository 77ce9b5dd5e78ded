//! Drives one ingestion pass: classify every alert currently on the feed,
//! upsert it, then mark anything no longer present as deleted (§4.9).

use crate::classifier;
use crate::clock::Clock;
use crate::error::Result;
use crate::model::RawAlert;
use crate::store::{AlertStore, TimetableStore};

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub upserted: usize,
    pub marked_deleted: u64,
}

pub async fn run_ingest_pass(
    raw_alerts: Vec<RawAlert>,
    timetable: &dyn TimetableStore,
    alert_store: &dyn AlertStore,
    clock: &dyn Clock,
) -> Result<IngestSummary> {
    let mut keep_ids = Vec::with_capacity(raw_alerts.len());

    for raw in &raw_alerts {
        let normalized = classifier::classify(raw, timetable).await?;
        keep_ids.push(normalized.id.clone());
        alert_store.upsert_alert(&normalized).await?;
    }

    let marked_deleted = alert_store
        .mark_deleted_if_not_in(&keep_ids, clock.now_jerusalem_naive())
        .await?;

    Ok(IngestSummary {
        upserted: raw_alerts.len(),
        marked_deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::NormalizedAlert;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTimetable;

    #[async_trait]
    impl TimetableStore for FakeTimetable {
        async fn agencies(&self, _ids: &[String]) -> Result<BTreeMap<String, crate::store::Agency>> {
            Ok(BTreeMap::new())
        }
        async fn stops_metadata(&self, _stop_ids: &[String]) -> Result<BTreeMap<String, crate::store::Stop>> {
            Ok(BTreeMap::new())
        }
        async fn routes_short_metadata(
            &self,
            _route_ids: &[String],
        ) -> Result<BTreeMap<String, (String, String)>> {
            Ok(BTreeMap::new())
        }
        async fn all_stop_coords_by_route_ids(&self, _route_ids: &[String]) -> Result<Vec<(f64, f64)>> {
            Ok(Vec::new())
        }
        async fn representative_trip_id(
            &self,
            _route_id: &str,
            _preferred_date: NaiveDate,
        ) -> Result<Option<String>> {
            Ok(None)
        }
        async fn stop_sequence(&self, _trip_id: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn route_metadata(&self, _route_id: &str) -> Result<Option<crate::store::RouteMetadata>> {
            Ok(None)
        }
        async fn all_routes(&self) -> Result<Vec<crate::store::RouteMetadata>> {
            Ok(Vec::new())
        }
        async fn trip_headsign(&self, _trip_id: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn stop_desc(&self, _stop_ids: &[String]) -> Result<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }
        async fn shape_points(&self, _trip_id: &str) -> Result<Vec<(f64, f64)>> {
            Ok(Vec::new())
        }
        async fn stops_for_map(&self, _stop_ids: &[String]) -> Result<BTreeMap<String, crate::store::StopCoord>> {
            Ok(BTreeMap::new())
        }
        async fn unique_agencies_for_routes(&self, _route_ids: &[String]) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn routes_at_stops_in_dateranges(
            &self,
            _stop_ids: &[String],
            _periods: &[crate::model::RawActivePeriod],
        ) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn departures_for_fake_trip_ids(
            &self,
            _fake_trip_ids: &[String],
        ) -> Result<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }
        async fn stops_by_polygon(&self, _polygon: &[(String, String)]) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeAlertStore {
        upserted: Mutex<Vec<String>>,
        mark_deleted_calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl AlertStore for FakeAlertStore {
        async fn upsert_alert(&self, alert: &NormalizedAlert) -> Result<()> {
            self.upserted.lock().unwrap().push(alert.id.clone());
            Ok(())
        }
        async fn mark_deleted_if_not_in(
            &self,
            keep_ids: &[String],
            _now: chrono::NaiveDateTime,
        ) -> Result<u64> {
            self.mark_deleted_calls.lock().unwrap().push(keep_ids.to_vec());
            Ok(0)
        }
        async fn get_alert(&self, _id: &str) -> Result<Option<NormalizedAlert>> {
            Ok(None)
        }
        async fn get_alerts(&self) -> Result<Vec<NormalizedAlert>> {
            Ok(Vec::new())
        }
    }

    fn raw(id: &str) -> RawAlert {
        RawAlert {
            id: id.to_string(),
            cause: "OTHER_CAUSE".into(),
            effect: "OTHER_EFFECT".into(),
            active_periods: vec![crate::model::RawActivePeriod { start: 0, end: 0 }],
            url: BTreeMap::new(),
            header: BTreeMap::new(),
            description: BTreeMap::new(),
            informed_entities: Vec::new(),
            raw_data: vec![],
        }
    }

    #[tokio::test]
    async fn upserts_every_alert_then_reconciles_deletions() {
        let timetable = FakeTimetable::default();
        let alert_store = FakeAlertStore::default();
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let summary = run_ingest_pass(vec![raw("a1"), raw("a2")], &timetable, &alert_store, &clock)
            .await
            .unwrap();

        assert_eq!(summary.upserted, 2);
        assert_eq!(*alert_store.upserted.lock().unwrap(), vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(
            alert_store.mark_deleted_calls.lock().unwrap()[0],
            vec!["a1".to_string(), "a2".to_string()]
        );
    }
}
