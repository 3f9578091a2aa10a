//! City repository.

use chrono::NaiveDateTime;
use sqlx::Row;

use crate::models::{City, CityStatus};
use crate::DbPool;

/// Repository for city operations.
#[derive(Clone)]
pub struct CityRepository {
    pool: DbPool,
}

impl CityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Add a city with its zipcodes. Admin-import path only.
    pub async fn add_city(&self, city: &City) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO cities (banana, name, state, vendor, slug, county, status, population)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&city.banana)
        .bind(&city.name)
        .bind(&city.state)
        .bind(&city.vendor)
        .bind(&city.slug)
        .bind(&city.county)
        .bind(city.status)
        .bind(city.population)
        .execute(&mut *tx)
        .await?;

        for zipcode in &city.zipcodes {
            sqlx::query(
                r#"
                INSERT INTO zipcodes (banana, zipcode, is_primary)
                VALUES ($1, $2, false)
                ON CONFLICT (banana, zipcode) DO NOTHING
                "#,
            )
            .bind(&city.banana)
            .bind(zipcode)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(banana = %city.banana, name = %city.name, "city added");
        Ok(())
    }

    pub async fn get_city(&self, banana: &str) -> Result<Option<City>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT banana, name, state, vendor, slug, county, status, population
            FROM cities
            WHERE banana = $1
            "#,
        )
        .bind(banana)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let zipcodes: Vec<String> =
            sqlx::query_scalar("SELECT zipcode FROM zipcodes WHERE banana = $1 ORDER BY zipcode")
                .bind(banana)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(build_city(&row, zipcodes)?))
    }

    /// All cities with the given status, zipcodes omitted.
    pub async fn get_all_cities(&self, status: CityStatus) -> Result<Vec<City>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT banana, name, state, vendor, slug, county, status, population
            FROM cities
            WHERE status = $1
            ORDER BY banana
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| build_city(row, Vec::new())).collect()
    }

    /// Count of meetings for a city in the last `days` days.
    ///
    /// Drives the adaptive sync schedule.
    pub async fn get_city_meeting_frequency(
        &self,
        banana: &str,
        days: i32,
    ) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM meetings
            WHERE banana = $1
              AND date >= NOW() - INTERVAL '1 day' * $2
            "#,
        )
        .bind(banana)
        .bind(days)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Timestamp of the most recently synced meeting for a city, used as
    /// a proxy for last sync time.
    pub async fn get_city_last_sync(
        &self,
        banana: &str,
    ) -> Result<Option<NaiveDateTime>, sqlx::Error> {
        sqlx::query_scalar("SELECT MAX(updated_at) FROM meetings WHERE banana = $1")
            .bind(banana)
            .fetch_one(&self.pool)
            .await
    }

    /// Delete a city; all dependent rows cascade.
    pub async fn delete_city(&self, banana: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cities WHERE banana = $1")
            .bind(banana)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn build_city(row: &sqlx::postgres::PgRow, zipcodes: Vec<String>) -> Result<City, sqlx::Error> {
    Ok(City {
        banana: row.try_get("banana")?,
        name: row.try_get("name")?,
        state: row.try_get("state")?,
        vendor: row.try_get("vendor")?,
        slug: row.try_get("slug")?,
        county: row.try_get("county")?,
        status: row.try_get("status")?,
        population: row.try_get("population")?,
        zipcodes,
    })
}
