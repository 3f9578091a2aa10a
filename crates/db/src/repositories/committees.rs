//! Committee and roster repository.

use chrono::NaiveDateTime;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::ids::short_digest;
use crate::models::{normalize_committee_name, Committee, CommitteeMembership, CouncilMember};
use crate::DbPool;

/// Deterministic committee id from banana + normalized name.
pub fn committee_id(banana: &str, name: &str) -> String {
    format!("{banana}_c{}", short_digest(&normalize_committee_name(name)))
}

/// Deterministic council member id from banana + name.
pub fn council_member_id(banana: &str, name: &str) -> String {
    format!("{banana}_p{}", short_digest(&name.trim().to_lowercase()))
}

/// Repository for committee and membership operations.
#[derive(Clone)]
pub struct CommitteeRepository {
    pool: DbPool,
}

impl CommitteeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find a committee by normalized name, creating it on first sight.
    pub async fn find_or_create(
        &self,
        banana: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Committee, sqlx::Error> {
        let id = committee_id(banana, name);
        let normalized = normalize_committee_name(name);

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"
            SELECT id, banana, name, normalized_name, description, status,
                   created_at, updated_at
            FROM committees
            WHERE id = $1
            "#,
        )
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            tx.commit().await?;
            return build_committee(&row);
        }

        sqlx::query(
            r#"
            INSERT INTO committees (id, banana, name, normalized_name, description, status)
            VALUES ($1, $2, $3, $4, $5, 'active')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(banana)
        .bind(name)
        .bind(&normalized)
        .bind(description)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(committee_id = %id, name, banana, "created committee");

        Ok(Committee {
            id,
            banana: banana.to_string(),
            name: name.to_string(),
            normalized_name: normalized,
            description: description.map(String::from),
            status: "active".to_string(),
            created_at: None,
            updated_at: None,
        })
    }

    pub async fn get_committees_by_city(&self, banana: &str) -> Result<Vec<Committee>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, banana, name, normalized_name, description, status,
                   created_at, updated_at
            FROM committees
            WHERE banana = $1
            ORDER BY name
            "#,
        )
        .bind(banana)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(build_committee).collect()
    }

    /// Upsert a council member record.
    pub async fn upsert_member(&self, member: &CouncilMember) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO council_members (id, banana, name, title, email)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                title = COALESCE(EXCLUDED.title, council_members.title),
                email = COALESCE(EXCLUDED.email, council_members.email)
            "#,
        )
        .bind(&member.id)
        .bind(&member.banana)
        .bind(&member.name)
        .bind(&member.title)
        .bind(&member.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Add a member to a committee. Returns false when the membership
    /// already exists.
    pub async fn add_member(
        &self,
        committee_id: &str,
        council_member_id: &str,
        role: Option<&str>,
        joined_at: Option<NaiveDateTime>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO committee_members (committee_id, council_member_id, role, joined_at)
            VALUES ($1, $2, $3, COALESCE($4, CURRENT_TIMESTAMP))
            ON CONFLICT (committee_id, council_member_id, joined_at) DO NOTHING
            "#,
        )
        .bind(committee_id)
        .bind(council_member_id)
        .bind(role)
        .bind(joined_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Close the active membership by setting `left_at`. Returns false
    /// when no active membership existed.
    pub async fn remove_member(
        &self,
        committee_id: &str,
        council_member_id: &str,
        left_at: Option<NaiveDateTime>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE committee_members
            SET left_at = COALESCE($3, CURRENT_TIMESTAMP)
            WHERE committee_id = $1
              AND council_member_id = $2
              AND left_at IS NULL
            "#,
        )
        .bind(committee_id)
        .bind(council_member_id)
        .bind(left_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Current roster (active memberships only).
    pub async fn get_current_members(
        &self,
        committee_id: &str,
    ) -> Result<Vec<(CouncilMember, CommitteeMembership)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT cm.id, cm.banana, cm.name, cm.title, cm.email,
                   m.committee_id, m.council_member_id, m.role, m.joined_at, m.left_at
            FROM committee_members m
            JOIN council_members cm ON cm.id = m.council_member_id
            WHERE m.committee_id = $1 AND m.left_at IS NULL
            ORDER BY cm.name
            "#,
        )
        .bind(committee_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok((
                    CouncilMember {
                        id: row.try_get("id")?,
                        banana: row.try_get("banana")?,
                        name: row.try_get("name")?,
                        title: row.try_get("title")?,
                        email: row.try_get("email")?,
                    },
                    CommitteeMembership {
                        committee_id: row.try_get("committee_id")?,
                        council_member_id: row.try_get("council_member_id")?,
                        role: row.try_get("role")?,
                        joined_at: row.try_get("joined_at")?,
                        left_at: row.try_get("left_at")?,
                    },
                ))
            })
            .collect()
    }
}

fn build_committee(row: &PgRow) -> Result<Committee, sqlx::Error> {
    Ok(Committee {
        id: row.try_get("id")?,
        banana: row.try_get("banana")?,
        name: row.try_get("name")?,
        normalized_name: row.try_get("normalized_name")?,
        description: row.try_get("description")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committee_id_is_stable_across_spelling_variants() {
        assert_eq!(
            committee_id("paloaltoCA", "City Council - Regular"),
            committee_id("paloaltoCA", "city council   regular")
        );
        assert_ne!(
            committee_id("paloaltoCA", "City Council"),
            committee_id("berkeleyCA", "City Council")
        );
    }
}
