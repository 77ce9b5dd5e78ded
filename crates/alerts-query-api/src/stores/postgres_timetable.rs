//! `TimetableStore` backed by the static GTFS database, grounded on
//! `GtfsDbApi`'s query methods in the reference pipeline. Identical
//! read-only surface to the ingester's own `PgTimetableStore` — this crate
//! never writes the timetable, only the ingester loads it.

use std::collections::BTreeMap;

use alerts_core::clock::JERUSALEM;
use alerts_core::error::{CoreError, Result};
use alerts_core::model::RawActivePeriod;
use alerts_core::store::{Agency, RouteMetadata, Stop, StopCoord, TimetableStore};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use sqlx::{PgPool, Row};

use crate::dateranges::build_routes_at_stops_statement;

pub struct PgTimetableStore {
    pool: PgPool,
}

impl PgTimetableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Store(e.to_string())
}

const GTFS_CALENDAR_DOW: [&str; 7] = [
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

#[async_trait]
impl TimetableStore for PgTimetableStore {
    async fn agencies(&self, ids: &[String]) -> Result<BTreeMap<String, Agency>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = sqlx::query("SELECT agency_id, agency_name FROM agency WHERE agency_id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let agency_id: String = row.try_get("agency_id").map_err(db_err)?;
                let agency_name: String = row.try_get("agency_name").map_err(db_err)?;
                Ok((agency_id.clone(), Agency { agency_id, agency_name }))
            })
            .collect()
    }

    async fn stops_metadata(&self, stop_ids: &[String]) -> Result<BTreeMap<String, Stop>> {
        if stop_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = sqlx::query(
            "SELECT stop_id, stop_lon, stop_lat, stop_name, stop_code FROM stops WHERE stop_id = ANY($1)",
        )
        .bind(stop_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let stop_id: String = row.try_get("stop_id").map_err(db_err)?;
                Ok((
                    stop_id.clone(),
                    Stop {
                        stop_id,
                        stop_lon: row.try_get("stop_lon").map_err(db_err)?,
                        stop_lat: row.try_get("stop_lat").map_err(db_err)?,
                        stop_name: row.try_get("stop_name").map_err(db_err)?,
                        stop_code: row.try_get("stop_code").map_err(db_err)?,
                    },
                ))
            })
            .collect()
    }

    async fn routes_short_metadata(
        &self,
        route_ids: &[String],
    ) -> Result<BTreeMap<String, (String, String)>> {
        if route_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = sqlx::query(
            "SELECT route_id, route_short_name, agency_id FROM routes WHERE route_id = ANY($1)",
        )
        .bind(route_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let route_id: String = row.try_get("route_id").map_err(db_err)?;
                let short_name: String = row.try_get("route_short_name").map_err(db_err)?;
                let agency_id: String = row.try_get("agency_id").map_err(db_err)?;
                Ok((route_id, (short_name, agency_id)))
            })
            .collect()
    }

    async fn all_stop_coords_by_route_ids(&self, route_ids: &[String]) -> Result<Vec<(f64, f64)>> {
        if route_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT DISTINCT stop_lat, stop_lon FROM stops \
             INNER JOIN stoptimes ON stops.stop_id = stoptimes.stop_id \
             INNER JOIN trips ON stoptimes.trip_id = trips.trip_id \
             WHERE trips.route_id = ANY($1)",
        )
        .bind(route_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let lat: f64 = row.try_get("stop_lat").map_err(db_err)?;
                let lon: f64 = row.try_get("stop_lon").map_err(db_err)?;
                Ok((lat, lon))
            })
            .collect()
    }

    async fn representative_trip_id(
        &self,
        route_id: &str,
        preferred_date: NaiveDate,
    ) -> Result<Option<String>> {
        let dow_column = GTFS_CALENDAR_DOW[preferred_date.weekday().num_days_from_monday() as usize];
        let sql = format!(
            "SELECT trips.trip_id FROM trips \
             INNER JOIN calendar ON trips.service_id = calendar.service_id \
             WHERE route_id = $1 \
             ORDER BY \
                daterange(start_date, end_date + 1) @> $2::DATE DESC, \
                start_date - $2::DATE <= 0 DESC, \
                ABS(start_date - $2::DATE) ASC, \
                calendar.{dow_column} DESC \
             LIMIT 1"
        );

        let row = sqlx::query(&sql)
            .bind(route_id)
            .bind(preferred_date)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|r| r.try_get::<String, _>("trip_id").map_err(db_err)).transpose()
    }

    async fn stop_sequence(&self, trip_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT stops.stop_id FROM stops \
             INNER JOIN stoptimes ON stops.stop_id = stoptimes.stop_id \
             WHERE stoptimes.trip_id = $1 ORDER BY stop_sequence ASC",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("stop_id").map_err(db_err))
            .collect()
    }

    async fn route_metadata(&self, route_id: &str) -> Result<Option<RouteMetadata>> {
        let row = sqlx::query(
            "SELECT routes.route_desc, routes.agency_id, route_short_name AS line_number, agency_name \
             FROM routes INNER JOIN agency ON routes.agency_id = agency.agency_id \
             WHERE route_id = $1",
        )
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|row| {
            Ok(RouteMetadata {
                route_id: route_id.to_string(),
                route_desc: row.try_get("route_desc").map_err(db_err)?,
                agency_id: row.try_get("agency_id").map_err(db_err)?,
                line_number: row.try_get("line_number").map_err(db_err)?,
                agency_name: row.try_get("agency_name").map_err(db_err)?,
            })
        })
        .transpose()
    }

    async fn all_routes(&self) -> Result<Vec<RouteMetadata>> {
        let rows = sqlx::query(
            "SELECT routes.route_id, routes.route_desc, routes.agency_id, route_short_name AS line_number, agency_name \
             FROM routes INNER JOIN agency ON routes.agency_id = agency.agency_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(RouteMetadata {
                    route_id: row.try_get("route_id").map_err(db_err)?,
                    route_desc: row.try_get("route_desc").map_err(db_err)?,
                    agency_id: row.try_get("agency_id").map_err(db_err)?,
                    line_number: row.try_get("line_number").map_err(db_err)?,
                    agency_name: row.try_get("agency_name").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn trip_headsign(&self, trip_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT trip_headsign FROM trips WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|r| r.try_get::<Option<String>, _>("trip_headsign").map_err(db_err))
            .transpose()
            .map(|o| o.flatten())
    }

    async fn stop_desc(&self, stop_ids: &[String]) -> Result<BTreeMap<String, String>> {
        if stop_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = sqlx::query("SELECT stop_id, stop_desc FROM stops WHERE stop_id = ANY($1)")
            .bind(stop_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let stop_id: String = row.try_get("stop_id").map_err(db_err)?;
                let stop_desc: String = row.try_get("stop_desc").map_err(db_err)?;
                Ok((stop_id, stop_desc))
            })
            .collect()
    }

    async fn shape_points(&self, trip_id: &str) -> Result<Vec<(f64, f64)>> {
        let rows = sqlx::query(
            "SELECT shape_pt_lon, shape_pt_lat FROM shapes \
             WHERE shapes.shape_id = (SELECT trips.shape_id FROM trips WHERE trip_id = $1) \
             ORDER BY shape_pt_sequence ASC",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let lon: f64 = row.try_get("shape_pt_lon").map_err(db_err)?;
                let lat: f64 = row.try_get("shape_pt_lat").map_err(db_err)?;
                Ok((lon, lat))
            })
            .collect()
    }

    async fn stops_for_map(&self, stop_ids: &[String]) -> Result<BTreeMap<String, StopCoord>> {
        if stop_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = sqlx::query("SELECT stop_id, stop_lon, stop_lat FROM stops WHERE stop_id = ANY($1)")
            .bind(stop_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let stop_id: String = row.try_get("stop_id").map_err(db_err)?;
                Ok((
                    stop_id,
                    StopCoord {
                        stop_lon: row.try_get("stop_lon").map_err(db_err)?,
                        stop_lat: row.try_get("stop_lat").map_err(db_err)?,
                    },
                ))
            })
            .collect()
    }

    async fn unique_agencies_for_routes(&self, route_ids: &[String]) -> Result<Vec<String>> {
        if route_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT DISTINCT agency_id FROM routes WHERE route_id = ANY($1)")
            .bind(route_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("agency_id").map_err(db_err))
            .collect()
    }

    async fn routes_at_stops_in_dateranges(
        &self,
        stop_ids: &[String],
        periods: &[RawActivePeriod],
    ) -> Result<Vec<String>> {
        if stop_ids.is_empty() || periods.is_empty() {
            return Ok(Vec::new());
        }

        let statement = build_routes_at_stops_statement(stop_ids, periods, JERUSALEM);
        let rows = statement.fetch_all(&self.pool).await.map_err(db_err)?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("route_id").map_err(db_err))
            .collect()
    }

    async fn departures_for_fake_trip_ids(
        &self,
        fake_trip_ids: &[String],
    ) -> Result<BTreeMap<String, String>> {
        if fake_trip_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = sqlx::query(
            r#"SELECT DISTINCT "TripId", "DepartureTime" FROM trip_id_to_date WHERE "TripId" = ANY($1)"#,
        )
        .bind(fake_trip_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let trip_id: String = row.try_get("TripId").map_err(db_err)?;
                let departure_time: String = row.try_get("DepartureTime").map_err(db_err)?;
                Ok((trip_id, departure_time))
            })
            .collect()
    }

    async fn stops_by_polygon(&self, polygon: &[(String, String)]) -> Result<Vec<String>> {
        if polygon.is_empty() {
            return Ok(Vec::new());
        }
        let points: String = polygon
            .iter()
            .map(|(lat, lon)| format!("({lat},{lon})"))
            .collect::<Vec<_>>()
            .join(", ");
        let polygon_literal = format!("({points})");

        let rows = sqlx::query("SELECT stop_id FROM stops WHERE point(stop_lat, stop_lon) <@ polygon($1)")
            .bind(&polygon_literal)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("stop_id").map_err(db_err))
            .collect()
    }
}
