//! Ticket, image, history and counters persistence.

use async_trait::async_trait;
use chrono::{Duration, SubsecRound, TimeDelta, TimeZone, Utc};
use hd_core::error::{AppError, Resource, Result};
use hd_core::models::{
    Counters, Image, Ticket, TicketDetails, TicketFilter, TicketHistory, TicketStatus, TicketSummary,
};
use hd_core::traits::TicketRepo;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::tx::execute_in_transaction;
use crate::{db_error, from_db_time, to_db_time};

pub struct SqliteTicketRepo {
    pool: SqlitePool,
}

impl SqliteTicketRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const TICKET_COLUMNS: &str = "id, name, explanation, status, author_id, author_email, created_at, updated_at";

fn parse_status(raw: &str) -> Result<TicketStatus> {
    raw.parse()
        .map_err(|_| AppError::Database(format!("corrupt ticket status '{raw}'")))
}

fn ticket_from_row(row: &SqliteRow) -> Result<Ticket> {
    let get = |e: sqlx::Error| db_error("decode ticket", e);
    Ok(Ticket {
        id: row.try_get("id").map_err(get)?,
        name: row.try_get("name").map_err(get)?,
        explanation: row.try_get("explanation").map_err(get)?,
        status: parse_status(row.try_get("status").map_err(get)?)?,
        author_id: row.try_get("author_id").map_err(get)?,
        author_email: row.try_get("author_email").map_err(get)?,
        created_at: from_db_time(row.try_get("created_at").map_err(get)?)?,
        updated_at: from_db_time(row.try_get("updated_at").map_err(get)?)?,
    })
}

fn image_from_row(row: &SqliteRow) -> Result<Image> {
    let get = |e: sqlx::Error| db_error("decode image", e);
    Ok(Image {
        id: row.try_get("id").map_err(get)?,
        ticket_id: row.try_get("ticket_id").map_err(get)?,
        name: row.try_get("name").map_err(get)?,
        content_type: row.try_get("content_type").map_err(get)?,
        content_base64: row.try_get("content_base64").map_err(get)?,
        uploaded_at: from_db_time(row.try_get("uploaded_at").map_err(get)?)?,
    })
}

fn history_from_row(row: &SqliteRow) -> Result<TicketHistory> {
    let get = |e: sqlx::Error| db_error("decode history", e);
    Ok(TicketHistory {
        id: row.try_get("id").map_err(get)?,
        ticket_id: row.try_get("ticket_id").map_err(get)?,
        message: row.try_get("message").map_err(get)?,
        created_at: from_db_time(row.try_get("created_at").map_err(get)?)?,
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<TicketSummary> {
    let get = |e: sqlx::Error| db_error("decode ticket summary", e);
    Ok(TicketSummary {
        id: row.try_get("id").map_err(get)?,
        name: row.try_get("name").map_err(get)?,
        status: parse_status(row.try_get("status").map_err(get)?)?,
        author_name: row.try_get("author_name").map_err(get)?,
        created_at: from_db_time(row.try_get("created_at").map_err(get)?)?,
    })
}

/// Author lookup and inserts share one transaction so a ticket never outlives a missing author.
async fn create_ticket_tx(conn: &mut SqliteConnection, mut ticket: Ticket, images: Vec<Image>) -> Result<Ticket> {
    let author_id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&ticket.author_email)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("resolve ticket author", e))?;

    ticket.author_id = author_id.ok_or(AppError::NotFound(Resource::Author))?;
    // Stored precision is microseconds; hand back exactly what a later read returns.
    ticket.created_at = ticket.created_at.trunc_subsecs(6);
    ticket.updated_at = ticket.updated_at.trunc_subsecs(6);

    sqlx::query(
        "INSERT INTO tickets (id, name, explanation, status, author_id, author_email, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&ticket.id)
    .bind(&ticket.name)
    .bind(&ticket.explanation)
    .bind(ticket.status.as_str())
    .bind(ticket.author_id)
    .bind(&ticket.author_email)
    .bind(to_db_time(ticket.created_at))
    .bind(to_db_time(ticket.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("insert ticket", e))?;

    for image in images {
        sqlx::query(
            "INSERT INTO images (id, ticket_id, name, content_type, content_base64, uploaded_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&image.id)
        .bind(&ticket.id)
        .bind(&image.name)
        .bind(&image.content_type)
        .bind(&image.content_base64)
        .bind(to_db_time(image.uploaded_at))
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("insert image", e))?;
    }

    Ok(ticket)
}

async fn count_ticket_tx(conn: &mut SqliteConnection, status: TicketStatus) -> Result<()> {
    // Writing first takes the write lock up front instead of upgrading from a read.
    sqlx::query("INSERT INTO counters (id) VALUES (1) ON CONFLICT (id) DO NOTHING")
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("create counters row", e))?;

    let column = match status {
        TicketStatus::Pending => "pending",
        TicketStatus::Doing => "doing",
        TicketStatus::Concluded => "concluded",
    };
    let sql = format!("UPDATE counters SET {column} = {column} + 1, total = total + 1 WHERE id = 1");
    sqlx::query(&sql)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("increment counters", e))?;

    Ok(())
}

async fn update_status_tx(conn: &mut SqliteConnection, id: String, status: TicketStatus) -> Result<()> {
    let current: Option<String> = sqlx::query_scalar("SELECT status FROM tickets WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("read ticket status", e))?;

    let current = parse_status(&current.ok_or(AppError::NotFound(Resource::Ticket))?)?;
    if current == status {
        return Err(AppError::NoStatusChange(status.to_string()));
    }

    let updated = sqlx::query("UPDATE tickets SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(to_db_time(Utc::now()))
        .bind(&id)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("update ticket status", e))?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(Resource::Ticket));
    }
    Ok(())
}

async fn delete_ticket_tx(conn: &mut SqliteConnection, id: String) -> Result<()> {
    sqlx::query("DELETE FROM images WHERE ticket_id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("delete ticket images", e))?;

    sqlx::query("DELETE FROM ticket_history WHERE ticket_id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("delete ticket history", e))?;

    let deleted = sqlx::query("DELETE FROM tickets WHERE id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("delete ticket", e))?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(Resource::Ticket));
    }
    Ok(())
}

#[async_trait]
impl TicketRepo for SqliteTicketRepo {
    async fn create_ticket(&self, ticket: Ticket, images: Vec<Image>) -> Result<Ticket> {
        let created = execute_in_transaction(&self.pool, move |conn| Box::pin(create_ticket_tx(conn, ticket, images)))
            .await?;
        tracing::debug!(ticket_id = %created.id, author_id = created.author_id, "ticket stored");
        Ok(created)
    }

    async fn count_ticket(&self, status: TicketStatus) -> Result<()> {
        execute_in_transaction(&self.pool, move |conn| Box::pin(count_ticket_tx(conn, status))).await
    }

    async fn get_counters(&self) -> Result<Counters> {
        let row = sqlx::query("SELECT pending, doing, concluded, total FROM counters WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("read counters", e))?
            .ok_or(AppError::NotFound(Resource::Counters))?;

        let get = |e: sqlx::Error| db_error("decode counters", e);
        Ok(Counters {
            pending: row.try_get("pending").map_err(get)?,
            doing: row.try_get("doing").map_err(get)?,
            concluded: row.try_get("concluded").map_err(get)?,
            total: row.try_get("total").map_err(get)?,
        })
    }

    async fn get_ticket(&self, id: &str) -> Result<Ticket> {
        let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("read ticket", e))?
            .ok_or(AppError::NotFound(Resource::Ticket))?;
        ticket_from_row(&row)
    }

    async fn get_ticket_details(&self, id: &str) -> Result<TicketDetails> {
        let ticket = self.get_ticket(id).await?;

        let images = sqlx::query(
            "SELECT id, ticket_id, name, content_type, content_base64, uploaded_at \
             FROM images WHERE ticket_id = ? ORDER BY uploaded_at ASC, id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("read ticket images", e))?
        .iter()
        .map(image_from_row)
        .collect::<Result<Vec<_>>>()?;

        let history = sqlx::query(
            "SELECT id, ticket_id, message, created_at FROM ticket_history \
             WHERE ticket_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("read ticket history", e))?
        .iter()
        .map(history_from_row)
        .collect::<Result<Vec<_>>>()?;

        Ok(TicketDetails { ticket, images, history })
    }

    async fn find_tickets(&self, filter: TicketFilter) -> Result<Vec<TicketSummary>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT t.id, t.name, t.status, t.created_at, u.username AS author_name \
             FROM tickets t LEFT JOIN users u ON u.id = t.author_id WHERE 1 = 1",
        );

        if let Some(email) = filter.author_email {
            qb.push(" AND t.author_email = ").push_bind(email);
        }
        if let Some(status) = filter.status {
            qb.push(" AND t.status = ").push_bind(status.as_str());
        }
        if let Some(day) = filter.created_since {
            let midnight = Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN));
            qb.push(" AND t.created_at >= ").push_bind(to_db_time(midnight));
        }
        if let Some(name) = filter.name {
            qb.push(" AND instr(lower(t.name), lower(").push_bind(name).push(")) > 0");
        }
        qb.push(" ORDER BY t.created_at DESC, t.id ASC");

        qb.build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("find tickets", e))?
            .iter()
            .map(summary_from_row)
            .collect()
    }

    async fn update_ticket_status(&self, id: &str, status: TicketStatus) -> Result<()> {
        let id = id.to_string();
        execute_in_transaction(&self.pool, move |conn| Box::pin(update_status_tx(conn, id, status))).await
    }

    async fn add_ticket_history(&self, id: &str, message: &str) -> Result<TicketHistory> {
        let created_at = Utc::now();
        let inserted = sqlx::query("INSERT INTO ticket_history (ticket_id, message, created_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(message)
            .bind(to_db_time(created_at))
            .execute(&self.pool)
            .await;

        match inserted {
            Ok(done) => Ok(TicketHistory {
                id: done.last_insert_rowid(),
                ticket_id: id.to_string(),
                message: message.to_string(),
                created_at,
            }),
            // The only foreign key on ticket_history is the parent ticket.
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => Err(AppError::NotFound(Resource::Ticket)),
            Err(e) => Err(db_error("insert ticket history", e)),
        }
    }

    async fn delete_ticket(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        execute_in_transaction(&self.pool, move |conn| Box::pin(delete_ticket_tx(conn, id))).await
    }

    async fn remove_tickets_with_status(&self, status: TicketStatus, older_than_days: i64) -> Result<u64> {
        let cutoff = TimeDelta::try_days(older_than_days)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| AppError::Validation(format!("expiry age of {older_than_days} days is out of range")))?;

        // Images and history go with their ticket through ON DELETE CASCADE.
        let removed = sqlx::query("DELETE FROM tickets WHERE status = ? AND created_at < ?")
            .bind(status.as_str())
            .bind(to_db_time(cutoff))
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("remove expired tickets", e))?
            .rows_affected();

        Ok(removed)
    }
}
