use axum::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use shared_proto::session::BookingStatus;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::model::Booking;
use super::store::{BookingStore, StoreError};
use crate::time_window::TimeWindow;

#[derive(Debug, FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    therapist_id: Uuid,
    date: NaiveDate,
    time_slot: String,
    starts_at: Option<NaiveDateTime>,
    ends_at: Option<NaiveDateTime>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
            id: row.id,
            reason: format!("unknown status '{}'", row.status),
        })?;

        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            therapist_id: row.therapist_id,
            date: row.date,
            time_slot: row.time_slot,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            status,
            created_at: row.created_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, StoreError> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, user_id, therapist_id, date, time_slot, starts_at, ends_at, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.therapist_id)
        .bind(booking.date)
        .bind(&booking.time_slot)
        .bind(booking.starts_at)
        .bind(booking.ends_at)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Booking::try_from)
            .transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY starts_at ASC NULLS LAST, created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        into_bookings(rows)
    }

    async fn list_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings WHERE therapist_id = $1 ORDER BY starts_at ASC NULLS LAST, created_at ASC",
        )
        .bind(therapist_id)
        .fetch_all(&self.pool)
        .await?;
        into_bookings(rows)
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        into_bookings(rows)
    }

    async fn find_overlapping(
        &self,
        therapist_id: Uuid,
        window: &TimeWindow,
    ) -> Result<Option<Booking>, StoreError> {
        sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT * FROM bookings
            WHERE therapist_id = $1
              AND status <> 'cancelled'
              AND starts_at < $3
              AND ends_at > $2
            LIMIT 1
            "#,
        )
        .bind(therapist_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_optional(&self.pool)
        .await?
        .map(Booking::try_from)
        .transpose()
    }

    async fn set_status(&self, id: Uuid, status: BookingStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE bookings SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn expire_ended(&self, now: NaiveDateTime) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'expired' WHERE status = 'booked' AND ends_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
