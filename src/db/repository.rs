use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::models::{CourseSnapshot, CourseStatus, WatchlistEntry};

// ── Course snapshots ──────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct CourseRow {
    code: String,
    name: String,
    credits: i64,
    available_spots: i64,
    total_spots: i64,
    instructor: String,
    schedule: String,
    prerequisites: String,
    status: String,
    observed_at: String,
}

impl TryFrom<CourseRow> for CourseSnapshot {
    type Error = sqlx::Error;

    fn try_from(row: CourseRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<CourseStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(CourseSnapshot {
            code: row.code,
            name: row.name,
            credits: to_count(row.credits)?,
            available_spots: to_count(row.available_spots)?,
            total_spots: to_count(row.total_spots)?,
            instructor: row.instructor,
            schedule: row.schedule,
            prerequisites: row.prerequisites,
            status,
            observed_at: parse_timestamp(&row.observed_at)?,
        })
    }
}

const COURSE_COLUMNS: &str = "code, name, credits, available_spots, total_spots, instructor, schedule, prerequisites, status, observed_at";

/// Inserts or replaces the snapshot stored under `snapshot.code`.
pub async fn upsert_course(db: &SqlitePool, snapshot: &CourseSnapshot) -> Result<(), sqlx::Error> {
    let mut conn = db.acquire().await?;
    upsert_course_on(&mut conn, snapshot).await
}

/// Stores a whole scrape in one transaction.
pub async fn upsert_courses(db: &SqlitePool, snapshots: &[CourseSnapshot]) -> Result<usize, sqlx::Error> {
    let mut tx = db.begin().await?;
    for snapshot in snapshots {
        upsert_course_on(&mut tx, snapshot).await?;
    }
    tx.commit().await?;
    Ok(snapshots.len())
}

async fn upsert_course_on(
    conn: &mut sqlx::SqliteConnection,
    snapshot: &CourseSnapshot,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO courses
            (code, name, credits, available_spots, total_spots, instructor,
            schedule, prerequisites, status, observed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(code) DO UPDATE SET
            name = excluded.name,
            credits = excluded.credits,
            available_spots = excluded.available_spots,
            total_spots = excluded.total_spots,
            instructor = excluded.instructor,
            schedule = excluded.schedule,
            prerequisites = excluded.prerequisites,
            status = excluded.status,
            observed_at = excluded.observed_at
        "#,
    )
    .bind(&snapshot.code)
    .bind(&snapshot.name)
    .bind(i64::from(snapshot.credits))
    .bind(i64::from(snapshot.available_spots))
    .bind(i64::from(snapshot.total_spots))
    .bind(&snapshot.instructor)
    .bind(&snapshot.schedule)
    .bind(&snapshot.prerequisites)
    .bind(snapshot.status.as_str())
    .bind(format_timestamp(&snapshot.observed_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn find_course_by_code(db: &SqlitePool, code: &str) -> Result<Option<CourseSnapshot>, sqlx::Error> {
    let row = sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {} FROM courses WHERE code = ?",
        COURSE_COLUMNS
    ))
    .bind(code)
    .fetch_optional(db)
    .await?;

    row.map(CourseSnapshot::try_from).transpose()
}

pub async fn fetch_available_courses(db: &SqlitePool) -> Result<Vec<CourseSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {} FROM courses WHERE available_spots > 0 ORDER BY code",
        COURSE_COLUMNS
    ))
    .fetch_all(db)
    .await?
    .into_iter()
    .map(CourseSnapshot::try_from)
    .collect()
}

// ── Watchlist ─────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct WatchRow {
    course_code: String,
    priority: i64,
    auto_register: bool,
    added_at: String,
}

impl TryFrom<WatchRow> for WatchlistEntry {
    type Error = sqlx::Error;

    fn try_from(row: WatchRow) -> Result<Self, Self::Error> {
        Ok(WatchlistEntry {
            course_code: row.course_code,
            priority: to_count(row.priority)?,
            auto_register: row.auto_register,
            added_at: parse_timestamp(&row.added_at)?,
        })
    }
}

/// Inserts or replaces the entry for `entry.course_code`.
///
/// A replaced entry gets a new row, so it sorts as a fresh watch among
/// entries sharing its priority and `added_at`.
pub async fn upsert_watch_entry(db: &SqlitePool, entry: &WatchlistEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO watchlist (course_code, priority, auto_register, added_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&entry.course_code)
    .bind(i64::from(entry.priority))
    .bind(entry.auto_register)
    .bind(format_timestamp(&entry.added_at))
    .execute(db)
    .await?;

    Ok(())
}

/// Returns whether an entry was removed. Removing an absent code is not an error.
pub async fn remove_watch_entry(db: &SqlitePool, course_code: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM watchlist WHERE course_code = ?")
        .bind(course_code)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// Scan order: priority ascending, then `added_at` ascending.
pub async fn fetch_watchlist_ordered(db: &SqlitePool) -> Result<Vec<WatchlistEntry>, sqlx::Error> {
    sqlx::query_as::<_, WatchRow>(
        r#"
        SELECT course_code, priority, auto_register, added_at
        FROM watchlist
        ORDER BY priority ASC, added_at ASC, id ASC
        "#,
    )
    .fetch_all(db)
    .await?
    .into_iter()
    .map(WatchlistEntry::try_from)
    .collect()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Fixed-width RFC3339 so text order matches time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn to_count(value: i64) -> Result<u32, sqlx::Error> {
    u32::try_from(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
