//! Postgres-backed directory, profile store and pending role storage.

use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use crate::identity::{
    AccountDirectory, DirectoryError, PendingRoleStore, Profile, ProfileStore, Role, RoleLookup,
};

// Selections older than this are treated as abandoned redirects.
const PENDING_ROLE_TTL_SECONDS: i64 = 60 * 60;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(operation: &'static str, err: &sqlx::Error) -> DirectoryError {
    warn!(operation, "database error: {err}");
    DirectoryError::Unavailable(format!("{operation}: {err}"))
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn parse_role(value: Option<String>) -> Option<Role> {
    let value = value?;
    match value.parse::<Role>() {
        Ok(role) => Some(role),
        Err(err) => {
            warn!("ignoring stored role: {err}");
            None
        }
    }
}

fn profile_from_row(row: &PgRow) -> Profile {
    Profile {
        id: row.get("id"),
        email: row.get("email"),
        role: parse_role(row.get("role")),
        display_name: row.get("display_name"),
        phone: row.get("phone"),
        has_password: row.get("has_password"),
    }
}

#[async_trait]
impl AccountDirectory for PgStore {
    async fn email_exists(&self, email: &str) -> Result<bool, DirectoryError> {
        let query =
            "SELECT EXISTS (SELECT 1 FROM profiles WHERE lower(email) = lower($1)) AS found";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(|err| db_error("email_exists", &err))?;
        Ok(row.get("found"))
    }

    async fn role_for(&self, email: &str) -> Result<RoleLookup, DirectoryError> {
        let query = "SELECT role FROM profiles WHERE lower(email) = lower($1) LIMIT 1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(|err| db_error("role_for", &err))?;

        Ok(row.map_or(
            RoleLookup {
                exists: false,
                role: None,
            },
            |row| RoleLookup {
                exists: true,
                role: parse_role(row.get("role")),
            },
        ))
    }

    async fn has_password(&self, email: &str) -> Result<bool, DirectoryError> {
        let query = "SELECT has_password FROM profiles WHERE lower(email) = lower($1) LIMIT 1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(|err| db_error("has_password", &err))?;
        Ok(row.is_some_and(|row| row.get::<bool, _>("has_password")))
    }

    async fn ping(&self) -> Result<(), DirectoryError> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|err| db_error("acquire", &err))?;
        conn.ping()
            .instrument(span)
            .await
            .map_err(|err| db_error("ping", &err))
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<Profile>, DirectoryError> {
        let query = r"
            SELECT id, email, role, display_name, phone, has_password
            FROM profiles
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(|err| db_error("get_profile", &err))?;
        Ok(row.as_ref().map(profile_from_row))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Profile>, DirectoryError> {
        let query = r"
            SELECT id, email, role, display_name, phone, has_password
            FROM profiles
            WHERE lower(email) = lower($1)
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(|err| db_error("get_profile_by_email", &err))?;
        Ok(row.as_ref().map(profile_from_row))
    }

    async fn upsert(&self, profile: &Profile) -> Result<Profile, DirectoryError> {
        // COALESCE keeps an already-bound role; the role column is write-once.
        let query = r"
            INSERT INTO profiles (id, email, role, display_name, phone, has_password)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                role = COALESCE(profiles.role, EXCLUDED.role),
                display_name = EXCLUDED.display_name,
                phone = EXCLUDED.phone,
                has_password = profiles.has_password OR EXCLUDED.has_password,
                updated_at = NOW()
            RETURNING id, email, role, display_name, phone, has_password
        ";
        let row = sqlx::query(query)
            .bind(profile.id)
            .bind(&profile.email)
            .bind(profile.role.map(Role::as_str))
            .bind(&profile.display_name)
            .bind(&profile.phone)
            .bind(profile.has_password)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| db_error("upsert_profile", &err))?;
        Ok(profile_from_row(&row))
    }

    async fn bind_role(&self, id: Uuid, role: Role) -> Result<bool, DirectoryError> {
        let query = r"
            UPDATE profiles
            SET role = $2, updated_at = NOW()
            WHERE id = $1 AND role IS NULL
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(role.as_str())
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(|err| db_error("bind_role", &err))?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_password_set(&self, id: Uuid) -> Result<(), DirectoryError> {
        let query = "UPDATE profiles SET has_password = TRUE, updated_at = NOW() WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(|err| db_error("mark_password_set", &err))?;
        Ok(())
    }
}

#[async_trait]
impl PendingRoleStore for PgStore {
    async fn get(&self, browser_key: &str) -> Result<Option<Role>, DirectoryError> {
        let query = r"
            SELECT role
            FROM pending_role_selections
            WHERE browser_key = $1
              AND created_at > NOW() - ($2 * INTERVAL '1 second')
        ";
        let row = sqlx::query(query)
            .bind(browser_key)
            .bind(PENDING_ROLE_TTL_SECONDS)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(|err| db_error("get_pending_role", &err))?;
        Ok(row.and_then(|row| parse_role(row.get("role"))))
    }

    async fn set(&self, browser_key: &str, role: Role) -> Result<(), DirectoryError> {
        let query = r"
            INSERT INTO pending_role_selections (browser_key, role)
            VALUES ($1, $2)
            ON CONFLICT (browser_key) DO UPDATE
            SET role = EXCLUDED.role, created_at = NOW()
        ";
        sqlx::query(query)
            .bind(browser_key)
            .bind(role.as_str())
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| db_error("set_pending_role", &err))?;
        Ok(())
    }

    async fn delete(&self, browser_key: &str) -> Result<(), DirectoryError> {
        let query = "DELETE FROM pending_role_selections WHERE browser_key = $1";
        sqlx::query(query)
            .bind(browser_key)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .map_err(|err| db_error("delete_pending_role", &err))?;
        Ok(())
    }
}
