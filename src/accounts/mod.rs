//! Account storage. Identity is established upstream; this just
//! resolves ids to account records and seeds new accounts.

use anyhow::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::core::db::{timestamp_from_sql, timestamp_to_sql};

#[derive(Serialize, Clone, Debug)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

pub async fn create_user(db: &Connection, username: &str, email: &str) -> Result<UserRecord, Error> {
    let record = UserRecord {
        id: Uuid::new_v4().to_string(),
        username: username.trim().to_string(),
        email: email.trim().to_lowercase(),
        created_at: Utc::now(),
    };
    let row = record.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO user (id, username, email, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![row.id, row.username, row.email, timestamp_to_sql(&row.created_at)],
        )?;
        Ok(())
    })
    .await?;

    Ok(record)
}

pub async fn find_user(db: &Connection, user_id: &str) -> Result<Option<UserRecord>, Error> {
    let id = user_id.to_owned();
    let user = db
        .call(move |conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, email, created_at FROM user WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(UserRecord {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            email: row.get(2)?,
                            created_at: timestamp_from_sql(3, row.get(3)?)?,
                        })
                    },
                )
                .optional()?;
            Ok(user)
        })
        .await?;

    Ok(user)
}
