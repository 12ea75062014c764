use anyhow::{anyhow, Context};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::Database;
use crate::auth::{hash_password, verify_password};
use crate::error::ServiceError;
use crate::models::account::{AuditEntry, NewUser, StoredUser, User, UserRole};

const USER_COLUMNS: &str =
    "id, username, email, full_name, role, is_active, hashed_password, created_at, last_login";

fn from_millis(ms: i64) -> Result<DateTime<Utc>, ServiceError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ServiceError::Internal(anyhow!("invalid stored timestamp {}", ms)))
}

fn user_from_row(row: &SqliteRow) -> Result<StoredUser, ServiceError> {
    let role: String = row.try_get("role").context("users.role")?;
    let last_login: Option<i64> = row.try_get("last_login").context("users.last_login")?;

    Ok(StoredUser {
        user: User {
            id: row.try_get("id").context("users.id")?,
            username: row.try_get("username").context("users.username")?,
            email: row.try_get("email").context("users.email")?,
            full_name: row.try_get("full_name").context("users.full_name")?,
            role: role.parse::<UserRole>().map_err(|e| ServiceError::Internal(anyhow!(e)))?,
            is_active: row.try_get("is_active").context("users.is_active")?,
            created_at: from_millis(row.try_get("created_at").context("users.created_at")?)?,
            last_login: last_login.map(from_millis).transpose()?,
        },
        hashed_password: row.try_get("hashed_password").context("users.hashed_password")?,
    })
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditEntry, ServiceError> {
    Ok(AuditEntry {
        id: row.try_get("id").context("audit_logs.id")?,
        user_id: row.try_get("user_id").context("audit_logs.user_id")?,
        action: row.try_get("action").context("audit_logs.action")?,
        details: row.try_get("details").context("audit_logs.details")?,
        timestamp: from_millis(row.try_get("timestamp").context("audit_logs.timestamp")?)?,
    })
}

/// Credential storage and audit trail.
#[derive(Clone)]
pub struct AccountStore {
    db: Database,
}

impl AccountStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn ping(&self) -> bool {
        self.db.ping().await
    }

    #[instrument(skip(self, new_user), fields(username = %new_user.username))]
    pub async fn create_user(&self, new_user: &NewUser) -> Result<User, ServiceError> {
        new_user.validate()?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            full_name: new_user.full_name.clone(),
            role: new_user.role,
            is_active: new_user.is_active,
            created_at: Utc::now(),
            last_login: None,
        };
        let hashed = hash_password(&new_user.password)?;

        let result = sqlx::query(
            "INSERT INTO users (id, username, email, full_name, role, is_active, hashed_password, created_at, last_login)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(&hashed)
        .bind(user.created_at.timestamp_millis())
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => {
                info!(user_id = %user.id, "user created");
                Ok(user)
            }
            Err(sqlx::Error::Database(err)) if err.message().contains("UNIQUE constraint failed") => {
                warn!("user already exists");
                let field = if err.message().contains("users.email") { "email" } else { "username" };
                Err(ServiceError::Conflict(format!("a user with this {} already exists", field)))
            }
            Err(err) => Err(ServiceError::Internal(
                anyhow::Error::new(err).context("failed to insert user"),
            )),
        }
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<StoredUser>, ServiceError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS))
            .bind(username)
            .fetch_optional(self.db.pool())
            .await
            .context("failed to load user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<StoredUser>, ServiceError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await
            .context("failed to load user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn update_last_login(&self, username: &str) -> Result<DateTime<Utc>, ServiceError> {
        let now = Utc::now();
        sqlx::query("UPDATE users SET last_login = ? WHERE username = ?")
            .bind(now.timestamp_millis())
            .bind(username)
            .execute(self.db.pool())
            .await
            .context("failed to update last login")?;
        Ok(now)
    }

    pub async fn log_audit(
        &self,
        user_id: &str,
        action: &str,
        details: Option<&str>,
    ) -> Result<AuditEntry, ServiceError> {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            action: action.to_string(),
            details: details.map(str::to_string),
            timestamp: Utc::now(),
        };

        sqlx::query("INSERT INTO audit_logs (id, user_id, action, details, timestamp) VALUES (?, ?, ?, ?, ?)")
            .bind(&entry.id)
            .bind(&entry.user_id)
            .bind(&entry.action)
            .bind(&entry.details)
            .bind(entry.timestamp.timestamp_millis())
            .execute(self.db.pool())
            .await
            .context("failed to write audit entry")?;
        Ok(entry)
    }

    /// Most recent first.
    pub async fn get_audit_logs(&self, user_id: &str, limit: i64) -> Result<Vec<AuditEntry>, ServiceError> {
        let rows = sqlx::query(
            "SELECT id, user_id, action, details, timestamp FROM audit_logs
             WHERE user_id = ? ORDER BY timestamp DESC, rowid DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .context("failed to load audit log")?;
        rows.iter().map(audit_from_row).collect()
    }

    /// Create the bootstrap administrator unless the username is taken.
    pub async fn ensure_default_admin(&self, username: &str, password: &str) -> Result<bool, ServiceError> {
        if self.get_user_by_username(username).await?.is_some() {
            return Ok(false);
        }

        let admin = NewUser {
            username: username.to_string(),
            password: password.to_string(),
            email: None,
            full_name: Some("System Administrator".to_string()),
            role: UserRole::Admin,
            is_active: true,
        };
        self.create_user(&admin).await?;
        info!(username = %username, "created default admin user");
        Ok(true)
    }

    /// Verify credentials, stamp the login and record it.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, ServiceError> {
        let invalid = || ServiceError::Unauthorized("incorrect username or password".into());

        let stored = self.get_user_by_username(username).await?.ok_or_else(invalid)?;
        if !verify_password(password, &stored.hashed_password) {
            warn!("failed login attempt");
            return Err(invalid());
        }
        if !stored.user.is_active {
            return Err(ServiceError::Unauthorized("user account is disabled".into()));
        }

        let mut user = stored.user;
        user.last_login = Some(self.update_last_login(username).await?);
        self.log_audit(&user.id, "login", Some("successful login")).await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::{SafeEmail, Username};
    use fake::Fake;

    async fn store() -> AccountStore {
        let db = Database::connect_url("sqlite::memory:", 1).await.unwrap();
        AccountStore::new(db)
    }

    fn new_user(role: UserRole) -> NewUser {
        let username: String = Username().fake();
        NewUser {
            username: format!("{}_user", username),
            password: "s3cure-passw0rd".into(),
            email: Some(SafeEmail().fake()),
            full_name: None,
            role,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_user() {
        let store = store().await;
        let request = new_user(UserRole::Physician);
        let created = store.create_user(&request).await.unwrap();

        let by_name = store.get_user_by_username(&request.username).await.unwrap().unwrap();
        assert_eq!(by_name.user, created);
        assert_ne!(by_name.hashed_password, request.password);

        let by_id = store.get_user_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(by_id.user.username, request.username);
        assert_eq!(by_id.user.role, UserRole::Physician);
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let store = store().await;
        let request = new_user(UserRole::Nurse);
        store.create_user(&request).await.unwrap();

        let again = NewUser { email: None, ..request };
        assert!(matches!(store.create_user(&again).await, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn users_without_email_do_not_collide() {
        let store = store().await;
        let a = NewUser { email: None, ..new_user(UserRole::Viewer) };
        let b = NewUser { email: None, ..new_user(UserRole::Viewer) };
        store.create_user(&a).await.unwrap();
        store.create_user(&b).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_insert() {
        let store = store().await;
        let request = NewUser { password: "short".into(), ..new_user(UserRole::Nurse) };
        assert!(matches!(store.create_user(&request).await, Err(ServiceError::BadRequest(_))));
        assert!(store.get_user_by_username(&request.username).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn default_admin_is_created_once() {
        let store = store().await;
        assert!(store.ensure_default_admin("admin", "admin123").await.unwrap());
        assert!(!store.ensure_default_admin("admin", "admin123").await.unwrap());

        let admin = store.get_user_by_username("admin").await.unwrap().unwrap();
        assert_eq!(admin.user.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn authenticate_stamps_login_and_audits() {
        let store = store().await;
        let request = new_user(UserRole::Nurse);
        store.create_user(&request).await.unwrap();

        let user = store.authenticate(&request.username, &request.password).await.unwrap();
        assert!(user.last_login.is_some());

        let logs = store.get_audit_logs(&user.id, 50).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "login");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_unauthorized() {
        let store = store().await;
        let request = new_user(UserRole::Nurse);
        store.create_user(&request).await.unwrap();

        assert!(matches!(
            store.authenticate(&request.username, "nope-nope-nope").await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            store.authenticate("ghost", "whatever1").await,
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn disabled_account_cannot_log_in() {
        let store = store().await;
        let request = NewUser { is_active: false, ..new_user(UserRole::Viewer) };
        store.create_user(&request).await.unwrap();
        assert!(store.authenticate(&request.username, &request.password).await.is_err());
    }

    #[tokio::test]
    async fn audit_log_is_newest_first_and_limited() {
        let store = store().await;
        for action in ["a", "b", "c"] {
            store.log_audit("u1", action, None).await.unwrap();
        }
        let logs = store.get_audit_logs("u1", 2).await.unwrap();
        assert_eq!(logs.iter().map(|l| l.action.as_str()).collect::<Vec<_>>(), vec!["c", "b"]);
    }
}
