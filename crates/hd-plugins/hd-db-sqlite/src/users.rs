use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use hd_core::error::{AppError, Resource, Result};
use hd_core::models::{NewUser, Role, User};
use hd_core::traits::UserRepo;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;

use crate::tx::execute_in_transaction;
use crate::{db_error, from_db_time, is_unique_violation, to_db_time};

pub struct SqliteUserRepo {
    pool: SqlitePool,
}

impl SqliteUserRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, bind: String) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
        sqlx::query(&sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("read user", e))?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn fetch_many(&self, role: Option<Role>) -> Result<Vec<User>> {
        let rows = match role {
            Some(role) => {
                sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE role = ? ORDER BY id"))
                    .bind(role.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| db_error("list users", e))?;

        rows.iter().map(user_from_row).collect()
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, role, created_at, updated_at";

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let get = |e: sqlx::Error| db_error("decode user", e);
    let role: &str = row.try_get("role").map_err(get)?;
    Ok(User {
        id: row.try_get("id").map_err(get)?,
        username: row.try_get("username").map_err(get)?,
        email: row.try_get("email").map_err(get)?,
        password_hash: row.try_get("password_hash").map_err(get)?,
        role: role
            .parse()
            .map_err(|_| AppError::Database(format!("corrupt user role '{role}'")))?,
        created_at: from_db_time(row.try_get("created_at").map_err(get)?)?,
        updated_at: from_db_time(row.try_get("updated_at").map_err(get)?)?,
    })
}

async fn count_tickets_by_author(conn: &mut SqliteConnection, email: &str) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE author_email = ?")
        .bind(email)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("count user tickets", e))
}

async fn delete_user_tx(conn: &mut SqliteConnection, email: String, missing: Resource) -> Result<()> {
    let dependents = count_tickets_by_author(conn, &email).await?;
    if dependents > 0 {
        return Err(AppError::HasDependentTickets(dependents));
    }

    let deleted = sqlx::query("DELETE FROM users WHERE email = ?")
        .bind(&email)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("delete user", e))?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(missing));
    }
    Ok(())
}

fn insert_error(email: &str, e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict(format!("email '{email}' is already registered"))
    } else {
        db_error("insert user", e)
    }
}

fn stored_user(user: NewUser, id: i64, now: DateTime<Utc>) -> User {
    User {
        id,
        username: user.username,
        email: user.email,
        password_hash: user.password_hash,
        role: user.role,
        created_at: now,
        updated_at: now,
    }
}

async fn create_master_tx(conn: &mut SqliteConnection, user: NewUser) -> Result<User> {
    let now = Utc::now().trunc_subsecs(6);
    let inserted = sqlx::query(
        "INSERT INTO users (username, email, password_hash, role, created_at, updated_at) \
         SELECT ?, ?, ?, 'master', ?, ? \
         WHERE NOT EXISTS (SELECT 1 FROM users WHERE role = 'master')",
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(to_db_time(now))
    .bind(to_db_time(now))
    .execute(&mut *conn)
    .await
    .map_err(|e| insert_error(&user.email, e))?;

    if inserted.rows_affected() == 0 {
        return Err(AppError::Conflict("a master account already exists".into()));
    }
    let user = NewUser { role: Role::Master, ..user };
    Ok(stored_user(user, inserted.last_insert_rowid(), now))
}

async fn delete_master_tx(conn: &mut SqliteConnection) -> Result<()> {
    let email: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE role = 'master' LIMIT 1")
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("find master", e))?;

    let email = email.ok_or(AppError::NotFound(Resource::Master))?;
    delete_user_tx(conn, email, Resource::Master).await
}

#[async_trait]
impl UserRepo for SqliteUserRepo {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let now = Utc::now().trunc_subsecs(6);
        let inserted = sqlx::query(
            "INSERT INTO users (username, email, password_hash, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(to_db_time(now))
        .bind(to_db_time(now))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(&user.email, e))?;

        Ok(stored_user(user, inserted.last_insert_rowid(), now))
    }

    async fn create_master(&self, user: NewUser) -> Result<User> {
        let master = execute_in_transaction(&self.pool, move |conn| Box::pin(create_master_tx(conn, user))).await?;
        tracing::info!(user_id = master.id, "master row inserted");
        Ok(master)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_where("email = ?", email.to_string()).await
    }

    async fn find_master(&self) -> Result<Option<User>> {
        self.fetch_one_where("role = ? ORDER BY id LIMIT 1", Role::Master.as_str().to_string())
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.fetch_many(None).await
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>> {
        self.fetch_many(Some(role)).await
    }

    async fn delete_user(&self, email: &str) -> Result<()> {
        let target = email.to_string();
        execute_in_transaction(&self.pool, move |conn| Box::pin(delete_user_tx(conn, target, Resource::User))).await?;
        tracing::info!(email, "user deleted");
        Ok(())
    }

    async fn delete_master(&self) -> Result<()> {
        execute_in_transaction(&self.pool, |conn| Box::pin(delete_master_tx(conn))).await?;
        tracing::info!("master deleted");
        Ok(())
    }
}
