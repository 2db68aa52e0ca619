use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::ApiError;
use crate::routes::venue::model::Venue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Pending,
    Attending,
    Waitlist,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::Attending => "attending",
            AttendanceStatus::Waitlist => "waitlist",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(AttendanceStatus::Pending),
            "attending" => Some(AttendanceStatus::Attending),
            "waitlist" => Some(AttendanceStatus::Waitlist),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub group_id: i64,
    pub venue_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub capacity: i32,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventImage {
    pub id: i64,
    pub event_id: i64,
    pub url: String,
    pub preview: bool,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub status: String,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeInfo {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueRef {
    pub id: i64,
    pub city: String,
    pub state: String,
}

/// 列表视图，不带 description/capacity/price 等重字段
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: i64,
    pub group_id: i64,
    pub venue_id: Option<i64>,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub num_attending: i64,
    pub preview_image: Option<String>,
    pub group: GroupRef,
    pub venue: Option<VenueRef>,
}

#[derive(Debug, FromRow)]
struct EventListRow {
    id: i64,
    group_id: i64,
    venue_id: Option<i64>,
    name: String,
    start_date: DateTime<Utc>,
    num_attending: i64,
    preview_image: Option<String>,
    group_name: String,
    group_city: String,
    group_state: String,
    venue_city: Option<String>,
    venue_state: Option<String>,
}

impl From<EventListRow> for EventSummary {
    fn from(row: EventListRow) -> Self {
        let venue = match (row.venue_id, row.venue_city, row.venue_state) {
            (Some(id), Some(city), Some(state)) => Some(VenueRef { id, city, state }),
            _ => None,
        };
        EventSummary {
            id: row.id,
            group_id: row.group_id,
            venue_id: row.venue_id,
            name: row.name,
            start_date: row.start_date,
            num_attending: row.num_attending,
            preview_image: row.preview_image,
            group: GroupRef {
                id: row.group_id,
                name: row.group_name,
                city: row.group_city,
                state: row.group_state,
            },
            venue,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub id: i64,
    pub group_id: i64,
    pub venue_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub capacity: i32,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub num_attending: i64,
    pub group: GroupRef,
    pub venue: Option<Venue>,
    pub images: Vec<EventImage>,
}

/// 事件列表的时间分桶，按开始时间升序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    Past,
    Upcoming,
}

impl EventScope {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "past" => Some(EventScope::Past),
            "upcoming" => Some(EventScope::Upcoming),
            _ => None,
        }
    }
}

/// 以 now 为界拆分 (past, upcoming)，两侧都按开始时间升序。
/// 每次取数算一遍即可，不随渲染反复计算。
pub fn partition_by_start(
    mut events: Vec<EventSummary>,
    now: DateTime<Utc>,
) -> (Vec<EventSummary>, Vec<EventSummary>) {
    events.sort_by_key(|e| (e.start_date, e.id));
    events.into_iter().partition(|e| e.start_date <= now)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    pub venue_id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub capacity: Option<i32>,
    pub price: Option<f64>,
}

#[derive(Debug)]
pub struct ValidEventInput {
    pub venue_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub capacity: i32,
    pub price: f64,
}

fn parse_start_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

impl EventInput {
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidEventInput, ApiError> {
        let mut errors: BTreeMap<&'static str, String> = BTreeMap::new();

        let name = self.name.unwrap_or_default();
        if name.chars().count() < 5 {
            errors.insert("name", "Name must be at least 5 characters".into());
        }

        let description = self.description.unwrap_or_default();
        if description.trim().is_empty() {
            errors.insert("description", "Description is required".into());
        }

        let start_date = match self.start_date.as_deref().map(parse_start_date) {
            Some(Some(parsed)) if parsed > now => Some(parsed),
            Some(Some(_)) => {
                errors.insert("startDate", "Start date must be in the future".into());
                None
            }
            _ => {
                errors.insert("startDate", "Start date must be a valid datetime".into());
                None
            }
        };

        match self.capacity {
            Some(capacity) if capacity > 0 => {}
            _ => {
                errors.insert("capacity", "Capacity must be a positive integer".into());
            }
        }

        match self.price {
            Some(price) if price >= 0.0 => {}
            _ => {
                errors.insert("price", "Price is invalid".into());
            }
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        Ok(ValidEventInput {
            venue_id: self.venue_id,
            name,
            description,
            start_date: start_date.unwrap_or(now),
            capacity: self.capacity.unwrap_or_default(),
            price: self.price.unwrap_or_default(),
        })
    }
}

const EVENT_COLUMNS: &str =
    "id, group_id, venue_id, name, description, start_date, capacity, price, created_at, updated_at";

/// 出席数只统计 attending；预览图取 id 最大的一条
const LIST_SQL: &str = r#"
    SELECT e.id, e.group_id, e.venue_id, e.name, e.start_date,
           (SELECT COUNT(*) FROM attendances a
              WHERE a.event_id = e.id AND a.status = 'attending') AS num_attending,
           (SELECT ei.url FROM event_images ei
              WHERE ei.event_id = e.id AND ei.preview
              ORDER BY ei.id DESC LIMIT 1) AS preview_image,
           g.name AS group_name, g.city AS group_city, g.state AS group_state,
           v.city AS venue_city, v.state AS venue_state
    FROM events e
    JOIN groups g ON g.id = e.group_id
    LEFT JOIN venues v ON v.id = e.venue_id
"#;

impl Event {
    pub async fn list(pool: &PgPool) -> Result<Vec<EventSummary>, ApiError> {
        let rows = sqlx::query_as::<_, EventListRow>(&format!(
            "{LIST_SQL} ORDER BY e.start_date, e.id"
        ))
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(EventSummary::from).collect())
    }

    pub async fn list_for_group(
        pool: &PgPool,
        group_id: i64,
    ) -> Result<Vec<EventSummary>, ApiError> {
        let rows = sqlx::query_as::<_, EventListRow>(&format!(
            "{LIST_SQL} WHERE e.group_id = $1 ORDER BY e.start_date, e.id"
        ))
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(EventSummary::from).collect())
    }

    pub async fn find_or_404(pool: &PgPool, event_id: i64) -> Result<Self, ApiError> {
        sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(event_id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::NotFound("Event couldn't be found"))
    }

    pub async fn detail(pool: &PgPool, event_id: i64) -> Result<EventDetail, ApiError> {
        let event = Self::find_or_404(pool, event_id).await?;

        let num_attending = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attendances WHERE event_id = $1 AND status = 'attending'",
        )
        .bind(event_id)
        .fetch_one(pool)
        .await?;

        let group = sqlx::query_as::<_, (i64, String, String, String)>(
            "SELECT id, name, city, state FROM groups WHERE id = $1",
        )
        .bind(event.group_id)
        .fetch_one(pool)
        .await
        .map(|(id, name, city, state)| GroupRef {
            id,
            name,
            city,
            state,
        })?;

        let venue = match event.venue_id {
            Some(venue_id) => sqlx::query_as::<_, Venue>(
                "SELECT id, group_id, address, city, state, lat, lng FROM venues WHERE id = $1",
            )
            .bind(venue_id)
            .fetch_optional(pool)
            .await?,
            None => None,
        };

        let images = sqlx::query_as::<_, EventImage>(
            "SELECT id, event_id, url, preview FROM event_images WHERE event_id = $1 ORDER BY id",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await?;

        Ok(EventDetail {
            id: event.id,
            group_id: event.group_id,
            venue_id: event.venue_id,
            name: event.name,
            description: event.description,
            start_date: event.start_date,
            capacity: event.capacity,
            price: event.price,
            created_at: event.created_at,
            updated_at: event.updated_at,
            num_attending,
            group,
            venue,
            images,
        })
    }

    /// venue 必须属于该群组
    async fn check_venue(
        pool: &PgPool,
        group_id: i64,
        venue_id: Option<i64>,
    ) -> Result<(), ApiError> {
        let Some(venue_id) = venue_id else {
            return Ok(());
        };
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM venues WHERE id = $1 AND group_id = $2",
        )
        .bind(venue_id)
        .bind(group_id)
        .fetch_optional(pool)
        .await?;

        match found {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound("Venue couldn't be found")),
        }
    }

    /// 创建事件并在同一事务里写入主持人的出席行
    pub async fn create(
        pool: &PgPool,
        group_id: i64,
        input: ValidEventInput,
        host_id: i64,
    ) -> Result<Self, ApiError> {
        Self::check_venue(pool, group_id, input.venue_id).await?;

        let mut tx = pool.begin().await?;

        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (group_id, venue_id, name, description, start_date, capacity, price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(group_id)
        .bind(input.venue_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.start_date)
        .bind(input.capacity)
        .bind(input.price)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO attendances (event_id, user_id, status) VALUES ($1, $2, $3)")
            .bind(event.id)
            .bind(host_id)
            .bind(AttendanceStatus::Attending.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(event)
    }

    pub async fn update(
        pool: &PgPool,
        event_id: i64,
        group_id: i64,
        input: ValidEventInput,
    ) -> Result<Self, ApiError> {
        Self::check_venue(pool, group_id, input.venue_id).await?;

        sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET venue_id = $1, name = $2, description = $3, start_date = $4,
                capacity = $5, price = $6, updated_at = NOW()
            WHERE id = $7
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(input.venue_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.start_date)
        .bind(input.capacity)
        .bind(input.price)
        .bind(event_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Event couldn't be found"))
    }

    pub async fn delete(pool: &PgPool, event_id: i64) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(event_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 同群组预览图规则：设预览前清掉旧标记
    pub async fn add_image(
        pool: &PgPool,
        event_id: i64,
        url: &str,
        preview: bool,
    ) -> Result<EventImage, ApiError> {
        let mut tx = pool.begin().await?;

        if preview {
            sqlx::query("UPDATE event_images SET preview = FALSE WHERE event_id = $1 AND preview")
                .bind(event_id)
                .execute(&mut *tx)
                .await?;
        }

        let image = sqlx::query_as::<_, EventImage>(
            r#"
            INSERT INTO event_images (event_id, url, preview)
            VALUES ($1, $2, $3)
            RETURNING id, event_id, url, preview
            "#,
        )
        .bind(event_id)
        .bind(url)
        .bind(preview)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(image)
    }
}

impl Attendance {
    pub async fn status_for(
        pool: &PgPool,
        event_id: i64,
        user_id: i64,
    ) -> Result<Option<AttendanceStatus>, ApiError> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM attendances WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        match status {
            None => Ok(None),
            Some(raw) => AttendanceStatus::parse(&raw)
                .map(Some)
                .ok_or_else(|| ApiError::Internal(format!("unknown attendance status: {raw}"))),
        }
    }

    pub async fn request(pool: &PgPool, event_id: i64, user_id: i64) -> Result<Self, ApiError> {
        match Self::status_for(pool, event_id, user_id).await? {
            Some(AttendanceStatus::Pending) => Err(ApiError::field(
                "attendance",
                "Attendance has already been requested",
            )),
            Some(_) => Err(ApiError::field(
                "attendance",
                "User is already an attendee of the event",
            )),
            None => {
                let attendance = sqlx::query_as::<_, Attendance>(
                    r#"
                    INSERT INTO attendances (event_id, user_id, status)
                    VALUES ($1, $2, $3)
                    RETURNING id, event_id, user_id, status
                    "#,
                )
                .bind(event_id)
                .bind(user_id)
                .bind(AttendanceStatus::Pending.as_str())
                .fetch_one(pool)
                .await?;

                Ok(attendance)
            }
        }
    }

    pub async fn set_status(
        pool: &PgPool,
        event_id: i64,
        user_id: i64,
        status: AttendanceStatus,
    ) -> Result<Self, ApiError> {
        sqlx::query_as::<_, Attendance>(
            r#"
            UPDATE attendances
            SET status = $1
            WHERE event_id = $2 AND user_id = $3
            RETURNING id, event_id, user_id, status
            "#,
        )
        .bind(status.as_str())
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound(
            "Attendance between the user and the event does not exist",
        ))
    }

    pub async fn remove(pool: &PgPool, event_id: i64, user_id: i64) -> Result<(), ApiError> {
        let deleted = sqlx::query_scalar::<_, i64>(
            "DELETE FROM attendances WHERE event_id = $1 AND user_id = $2 RETURNING id",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        match deleted {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound(
                "Attendance between the user and the event does not exist",
            )),
        }
    }

    pub async fn list_for_event(
        pool: &PgPool,
        event_id: i64,
        include_pending: bool,
    ) -> Result<Vec<AttendeeInfo>, ApiError> {
        let mut sql = String::from(
            r#"
            SELECT u.id, u.first_name, u.last_name, a.status
            FROM attendances a
            JOIN users u ON u.id = a.user_id
            WHERE a.event_id = $1
            "#,
        );
        if !include_pending {
            sql.push_str(" AND a.status <> 'pending'");
        }
        sql.push_str(" ORDER BY u.id");

        let attendees = sqlx::query_as::<_, AttendeeInfo>(&sql)
            .bind(event_id)
            .fetch_all(pool)
            .await?;

        Ok(attendees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: i64, start: DateTime<Utc>) -> EventSummary {
        EventSummary {
            id,
            group_id: 1,
            venue_id: None,
            name: format!("Event {id}"),
            start_date: start,
            num_attending: 0,
            preview_image: None,
            group: GroupRef {
                id: 1,
                name: "Evening Hill Runners".into(),
                city: "Portland".into(),
                state: "OR".into(),
            },
            venue: None,
        }
    }

    fn at(stamp: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
    }

    #[test]
    fn partition_splits_around_now() {
        let now = at("2050-06-01 12:00:00");
        let events = vec![
            summary(1, at("2020-01-01 00:00:00")),
            summary(2, at("2099-01-01 00:00:00")),
        ];

        let (past, upcoming) = partition_by_start(events, now);
        assert_eq!(past.len(), 1);
        assert_eq!(past[0].id, 1);
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, 2);
    }

    #[test]
    fn partition_sorts_each_bucket_ascending() {
        let now = at("2050-06-01 12:00:00");
        let events = vec![
            summary(1, at("2049-05-01 00:00:00")),
            summary(2, at("2020-01-01 00:00:00")),
            summary(3, at("2099-01-01 00:00:00")),
            summary(4, at("2051-01-01 00:00:00")),
        ];

        let (past, upcoming) = partition_by_start(events, now);
        let past_ids: Vec<i64> = past.iter().map(|e| e.id).collect();
        let upcoming_ids: Vec<i64> = upcoming.iter().map(|e| e.id).collect();
        assert_eq!(past_ids, vec![2, 1]);
        assert_eq!(upcoming_ids, vec![4, 3]);
    }

    #[test]
    fn event_starting_exactly_now_is_past() {
        let now = at("2050-06-01 12:00:00");
        let (past, upcoming) = partition_by_start(vec![summary(1, now)], now);
        assert_eq!(past.len(), 1);
        assert!(upcoming.is_empty());
    }

    #[test]
    fn scope_parse() {
        assert_eq!(EventScope::parse("past"), Some(EventScope::Past));
        assert_eq!(EventScope::parse("upcoming"), Some(EventScope::Upcoming));
        assert_eq!(EventScope::parse("soon"), None);
    }

    fn full_input() -> EventInput {
        EventInput {
            venue_id: None,
            name: Some("Sunset trail run".into()),
            description: Some("An easy five kilometer loop around the hill.".into()),
            start_date: Some("2099-01-01 18:00:00".into()),
            capacity: Some(20),
            price: Some(0.0),
        }
    }

    fn now() -> DateTime<Utc> {
        at("2050-06-01 12:00:00")
    }

    fn errors_of(input: EventInput) -> BTreeMap<&'static str, String> {
        match input.validate(now()).unwrap_err() {
            ApiError::Validation(errors) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn valid_event_input_passes() {
        let valid = full_input().validate(now()).unwrap();
        assert_eq!(valid.capacity, 20);
        assert_eq!(valid.start_date, at("2099-01-01 18:00:00"));
    }

    #[test]
    fn rfc3339_start_date_is_accepted() {
        let mut input = full_input();
        input.start_date = Some("2099-01-01T18:00:00Z".into());
        assert!(input.validate(now()).is_ok());
    }

    #[test]
    fn short_name_is_rejected() {
        let mut input = full_input();
        input.name = Some("Run".into());
        assert!(errors_of(input).contains_key("name"));
    }

    #[test]
    fn start_date_must_be_in_the_future() {
        let mut input = full_input();
        input.start_date = Some("2020-01-01 00:00:00".into());
        let errors = errors_of(input);
        assert_eq!(errors["startDate"], "Start date must be in the future");
    }

    #[test]
    fn garbled_start_date_is_rejected() {
        let mut input = full_input();
        input.start_date = Some("next tuesday".into());
        let errors = errors_of(input);
        assert_eq!(errors["startDate"], "Start date must be a valid datetime");
    }

    #[test]
    fn capacity_and_price_bounds() {
        let mut input = full_input();
        input.capacity = Some(0);
        assert!(errors_of(input).contains_key("capacity"));

        let mut input = full_input();
        input.price = Some(-1.0);
        assert!(errors_of(input).contains_key("price"));

        let mut input = full_input();
        input.price = None;
        assert!(errors_of(input).contains_key("price"));
    }

    #[test]
    fn attendance_status_round_trip() {
        for status in [
            AttendanceStatus::Pending,
            AttendanceStatus::Attending,
            AttendanceStatus::Waitlist,
        ] {
            assert_eq!(AttendanceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AttendanceStatus::parse("maybe"), None);
    }
}
