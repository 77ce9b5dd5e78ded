//! `AlertStore` backed by the `alert`/`alert_agency`/`alert_route`/`alert_stop`
//! tables, grounded on `create_or_update_alert`/`mark_alerts_deleted_if_not_in_list`.

use alerts_core::error::{CoreError, Result};
use alerts_core::model::{ActivePeriods, NormalizedAlert, ScheduleChanges, Selector, UseCase};
use alerts_core::store::AlertStore;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn use_case_code(u: UseCase) -> i16 {
    u as i16
}

fn row_to_alert(row: PgRow) -> Result<NormalizedAlert> {
    let use_case_raw: i16 = row.try_get("use_case").map_err(db_err)?;
    let use_case = match use_case_raw {
        1 => UseCase::National,
        2 => UseCase::Agency,
        3 => UseCase::Region,
        4 => UseCase::Cities,
        5 => UseCase::StopsCancelled,
        6 => UseCase::RouteChangesFlex,
        7 => UseCase::RouteChangesSimple,
        8 => UseCase::ScheduleChanges,
        other => return Err(CoreError::Store(format!("unknown use_case {other} in storage"))),
    };

    let original_selector: Option<Json<Selector>> = row.try_get("original_selector").map_err(db_err)?;
    let schedule_changes: Option<Json<ScheduleChanges>> = row.try_get("schedule_changes").map_err(db_err)?;
    let url: Json<BTreeMap<String, String>> = row.try_get("url").map_err(db_err)?;
    let header: Json<BTreeMap<String, String>> = row.try_get("header").map_err(db_err)?;
    let description: Json<BTreeMap<String, String>> = row.try_get("description").map_err(db_err)?;
    let active_periods: Json<ActivePeriods> = row.try_get("active_periods").map_err(db_err)?;

    Ok(NormalizedAlert {
        id: row.try_get("id").map_err(db_err)?,
        first_start_time: row.try_get("first_start_time").map_err(db_err)?,
        last_end_time: row.try_get("last_end_time").map_err(db_err)?,
        raw_data: row.try_get("raw_data").map_err(db_err)?,
        use_case,
        original_selector: original_selector.map(|j| j.0),
        cause: row.try_get("cause").map_err(db_err)?,
        effect: row.try_get("effect").map_err(db_err)?,
        url: url.0,
        header: header.0,
        description: description.0,
        active_periods: active_periods.0,
        schedule_changes: schedule_changes.map(|j| j.0),
        is_national: row.try_get("is_national").map_err(db_err)?,
        deletion_tstz: row.try_get("deletion_tstz").map_err(db_err)?,
        relevant_agencies: row.try_get("relevant_agencies").map_err(db_err)?,
        relevant_route_ids: row.try_get("relevant_route_ids").map_err(db_err)?,
        added_stop_ids: row.try_get("added_stop_ids").map_err(db_err)?,
        removed_stop_ids: row.try_get("removed_stop_ids").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Store(e.to_string())
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn upsert_alert(&self, alert: &NormalizedAlert) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO alert (
                id, first_start_time, last_end_time, raw_data, use_case,
                original_selector, cause, effect, url, header, description,
                active_periods, schedule_changes, is_national, deletion_tstz
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
            ON CONFLICT (id) DO UPDATE SET
                first_start_time = EXCLUDED.first_start_time,
                last_end_time = EXCLUDED.last_end_time,
                raw_data = EXCLUDED.raw_data,
                use_case = EXCLUDED.use_case,
                original_selector = EXCLUDED.original_selector,
                cause = EXCLUDED.cause,
                effect = EXCLUDED.effect,
                url = EXCLUDED.url,
                header = EXCLUDED.header,
                description = EXCLUDED.description,
                active_periods = EXCLUDED.active_periods,
                schedule_changes = EXCLUDED.schedule_changes,
                is_national = EXCLUDED.is_national,
                deletion_tstz = CASE
                    WHEN EXCLUDED.deletion_tstz IS NULL THEN NULL
                    ELSE LEAST(EXCLUDED.deletion_tstz, alert.deletion_tstz)
                END",
        )
        .bind(&alert.id)
        .bind(alert.first_start_time)
        .bind(alert.last_end_time)
        .bind(&alert.raw_data)
        .bind(use_case_code(alert.use_case))
        .bind(alert.original_selector.as_ref().map(Json))
        .bind(&alert.cause)
        .bind(&alert.effect)
        .bind(Json(&alert.url))
        .bind(Json(&alert.header))
        .bind(Json(&alert.description))
        .bind(Json(&alert.active_periods))
        .bind(alert.schedule_changes.as_ref().map(Json))
        .bind(alert.is_national)
        .bind(alert.deletion_tstz)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if alert.relevant_agencies.is_empty() {
            sqlx::query("DELETE FROM alert_agency WHERE alert_id = $1")
                .bind(&alert.id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        } else {
            sqlx::query("DELETE FROM alert_agency WHERE alert_id = $1 AND agency_id <> ALL($2)")
                .bind(&alert.id)
                .bind(&alert.relevant_agencies)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            for agency_id in &alert.relevant_agencies {
                sqlx::query(
                    "INSERT INTO alert_agency (alert_id, agency_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(&alert.id)
                .bind(agency_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        if alert.relevant_route_ids.is_empty() {
            sqlx::query("DELETE FROM alert_route WHERE alert_id = $1")
                .bind(&alert.id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        } else {
            sqlx::query("DELETE FROM alert_route WHERE alert_id = $1 AND route_id <> ALL($2)")
                .bind(&alert.id)
                .bind(&alert.relevant_route_ids)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            for route_id in &alert.relevant_route_ids {
                sqlx::query(
                    "INSERT INTO alert_route (alert_id, route_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(&alert.id)
                .bind(route_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        // Every removed stop, flagged with whether it's also an addition, plus
        // the additions that aren't also removals.
        let mut all_stops: Vec<(String, bool, bool)> = alert
            .removed_stop_ids
            .iter()
            .map(|s| (s.clone(), alert.added_stop_ids.contains(s), true))
            .collect();
        all_stops.extend(
            alert
                .added_stop_ids
                .iter()
                .filter(|s| !alert.removed_stop_ids.contains(*s))
                .map(|s| (s.clone(), true, false)),
        );

        if all_stops.is_empty() {
            sqlx::query("DELETE FROM alert_stop WHERE alert_id = $1")
                .bind(&alert.id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        } else {
            let stop_ids: Vec<String> = all_stops.iter().map(|(s, _, _)| s.clone()).collect();
            sqlx::query("DELETE FROM alert_stop WHERE alert_id = $1 AND stop_id <> ALL($2)")
                .bind(&alert.id)
                .bind(&stop_ids)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            for (stop_id, is_added, is_removed) in &all_stops {
                sqlx::query(
                    "INSERT INTO alert_stop (alert_id, stop_id, is_added, is_removed)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (alert_id, stop_id) DO UPDATE SET
                        is_added = EXCLUDED.is_added, is_removed = EXCLUDED.is_removed",
                )
                .bind(&alert.id)
                .bind(stop_id)
                .bind(is_added)
                .bind(is_removed)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn mark_deleted_if_not_in(&self, keep_ids: &[String], now: NaiveDateTime) -> Result<u64> {
        // The reference job skips this update entirely on an empty feed,
        // rather than marking every stored alert deleted.
        if keep_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE alert SET deletion_tstz = $1 WHERE deletion_tstz IS NULL AND id <> ALL($2)",
        )
        .bind(now)
        .bind(keep_ids)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn get_alert(&self, id: &str) -> Result<Option<NormalizedAlert>> {
        let row = sqlx::query("SELECT * FROM alerts_with_related WHERE NOT (is_deleted AND is_expired) AND id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(row_to_alert).transpose()
    }

    async fn get_alerts(&self) -> Result<Vec<NormalizedAlert>> {
        let rows = sqlx::query("SELECT * FROM alerts_with_related WHERE NOT (is_deleted AND is_expired)")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(row_to_alert).collect()
    }
}
