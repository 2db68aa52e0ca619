use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::ApiError;

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: i64,
    pub group_id: i64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
pub struct VenueInput {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug)]
pub struct ValidVenueInput {
    pub address: String,
    pub city: String,
    pub state: String,
    pub lat: f64,
    pub lng: f64,
}

// 沿用的坐标边界，开区间
const LAT_RANGE: (f64, f64) = (-89.0, 91.0);
const LNG_RANGE: (f64, f64) = (-179.0, 181.0);

impl VenueInput {
    pub fn validate(self) -> Result<ValidVenueInput, ApiError> {
        let mut errors: BTreeMap<&'static str, String> = BTreeMap::new();

        let address = self.address.unwrap_or_default();
        if address.trim().is_empty() {
            errors.insert("address", "Street address is required".into());
        }
        let city = self.city.unwrap_or_default();
        if city.trim().is_empty() {
            errors.insert("city", "City is required".into());
        }
        let state = self.state.unwrap_or_default();
        if state.trim().is_empty() {
            errors.insert("state", "State is required".into());
        }

        match self.lat {
            Some(lat) if lat > LAT_RANGE.0 && lat < LAT_RANGE.1 => {}
            _ => {
                errors.insert("lat", "Latitude is not valid".into());
            }
        }
        match self.lng {
            Some(lng) if lng > LNG_RANGE.0 && lng < LNG_RANGE.1 => {}
            _ => {
                errors.insert("lng", "Longitude is not valid".into());
            }
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        Ok(ValidVenueInput {
            address,
            city,
            state,
            lat: self.lat.unwrap_or_default(),
            lng: self.lng.unwrap_or_default(),
        })
    }
}

const VENUE_COLUMNS: &str = "id, group_id, address, city, state, lat, lng";

impl Venue {
    pub async fn list_for_group(pool: &PgPool, group_id: i64) -> Result<Vec<Self>, ApiError> {
        let venues = sqlx::query_as::<_, Venue>(&format!(
            "SELECT {VENUE_COLUMNS} FROM venues WHERE group_id = $1 ORDER BY id"
        ))
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(venues)
    }

    pub async fn find_or_404(pool: &PgPool, venue_id: i64) -> Result<Self, ApiError> {
        sqlx::query_as::<_, Venue>(&format!("SELECT {VENUE_COLUMNS} FROM venues WHERE id = $1"))
            .bind(venue_id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::NotFound("Venue couldn't be found"))
    }

    pub async fn create(
        pool: &PgPool,
        group_id: i64,
        input: ValidVenueInput,
    ) -> Result<Self, ApiError> {
        let venue = sqlx::query_as::<_, Venue>(&format!(
            r#"
            INSERT INTO venues (group_id, address, city, state, lat, lng)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {VENUE_COLUMNS}
            "#
        ))
        .bind(group_id)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(input.lat)
        .bind(input.lng)
        .fetch_one(pool)
        .await?;

        Ok(venue)
    }

    pub async fn update(
        pool: &PgPool,
        venue_id: i64,
        input: ValidVenueInput,
    ) -> Result<Self, ApiError> {
        sqlx::query_as::<_, Venue>(&format!(
            r#"
            UPDATE venues
            SET address = $1, city = $2, state = $3, lat = $4, lng = $5
            WHERE id = $6
            RETURNING {VENUE_COLUMNS}
            "#
        ))
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(input.lat)
        .bind(input.lng)
        .bind(venue_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Venue couldn't be found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_input() -> VenueInput {
        VenueInput {
            address: Some("500 SW 5th Ave".into()),
            city: Some("Portland".into()),
            state: Some("OR".into()),
            lat: Some(45.52),
            lng: Some(-122.68),
        }
    }

    fn errors_of(input: VenueInput) -> BTreeMap<&'static str, String> {
        match input.validate().unwrap_err() {
            ApiError::Validation(errors) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn valid_venue_passes() {
        assert!(full_input().validate().is_ok());
    }

    #[test]
    fn latitude_bounds_are_exclusive() {
        let mut input = full_input();
        input.lat = Some(-90.0);
        assert!(errors_of(input).contains_key("lat"));

        let mut input = full_input();
        input.lat = Some(-89.0);
        assert!(errors_of(input).contains_key("lat"));

        let mut input = full_input();
        input.lat = Some(91.0);
        assert!(errors_of(input).contains_key("lat"));

        let mut input = full_input();
        input.lat = Some(0.0);
        assert!(input.validate().is_ok());

        let mut input = full_input();
        input.lat = Some(90.9);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn longitude_bounds_are_exclusive() {
        let mut input = full_input();
        input.lng = Some(-179.0);
        assert!(errors_of(input).contains_key("lng"));

        let mut input = full_input();
        input.lng = Some(181.0);
        assert!(errors_of(input).contains_key("lng"));

        let mut input = full_input();
        input.lng = Some(180.5);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn missing_coordinates_are_reported() {
        let mut input = full_input();
        input.lat = None;
        input.lng = None;
        let errors = errors_of(input);
        assert!(errors.contains_key("lat"));
        assert!(errors.contains_key("lng"));
    }

    #[test]
    fn address_fields_are_required() {
        let input = VenueInput {
            address: Some("".into()),
            city: None,
            state: Some("  ".into()),
            lat: Some(0.0),
            lng: Some(0.0),
        };
        let errors = errors_of(input);
        assert!(errors.contains_key("address"));
        assert!(errors.contains_key("city"));
        assert!(errors.contains_key("state"));
    }
}
