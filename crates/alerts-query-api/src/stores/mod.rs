pub mod postgres_alerts;
pub mod postgres_timetable;

pub use postgres_alerts::PgAlertStore;
pub use postgres_timetable::PgTimetableStore;
