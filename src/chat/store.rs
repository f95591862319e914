//! History store for per-user chat sessions.
//!
//! Every operation runs as one logical read-modify-write on the
//! connection's worker thread, with multi-statement mutations wrapped
//! in a transaction. Concurrent requests for the same user never
//! observe a half-applied turn or eviction.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Transaction};
use serde::Serialize;
use thiserror::Error;
use tokio_rusqlite::{Connection, params};
use uuid::Uuid;

use crate::chat::models::{ChatMessage, Sender, Session, SessionSummary, derive_title};
use crate::core::db::{timestamp_from_sql, timestamp_to_sql};

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("user not found")]
    UserNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error(transparent)]
    Storage(#[from] tokio_rusqlite::Error),
}

/// Pagination summary for a history listing.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Pagination {
    pub page: usize,
    pub total_pages: usize,
    pub total_sessions: usize,
    pub has_more: bool,
}

#[derive(Serialize, Clone, Debug)]
pub struct SessionPage {
    pub sessions: Vec<SessionSummary>,
    pub pagination: Pagination,
}

/// Receipt for a successfully appended turn.
#[derive(Clone, Debug)]
pub struct AppendedTurn {
    pub session_id: String,
    pub created_new: bool,
    pub appended_at: DateTime<Utc>,
}

// Outcome of a query closure, so the async wrappers can tell the two
// "not found" cases apart from a row without stringly-typed errors.
enum Lookup<T> {
    Found(T),
    UserMissing,
    SessionMissing,
}

fn found<T>(lookup: Lookup<T>) -> Result<T, HistoryError> {
    match lookup {
        Lookup::Found(value) => Ok(value),
        Lookup::UserMissing => Err(HistoryError::UserNotFound),
        Lookup::SessionMissing => Err(HistoryError::SessionNotFound),
    }
}

fn user_exists(conn: &rusqlite::Connection, user_id: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM user WHERE id = ?1)",
        [user_id],
        |row| row.get(0),
    )
}

/// List a user's sessions, most recently active first. Paging values
/// that are missing or not positive integers fall back to defaults
/// rather than erroring.
pub async fn list_sessions(
    db: &Connection,
    user_id: &str,
    page: Option<usize>,
    page_size: Option<usize>,
) -> Result<SessionPage, HistoryError> {
    let page = page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
    let page_size = page_size.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE_SIZE);
    // Clamp so the OFFSET bind always fits an i64
    let offset = page
        .saturating_sub(1)
        .saturating_mul(page_size)
        .min(i64::MAX as usize);

    let uid = user_id.to_owned();
    let lookup = db
        .call(move |conn| {
            if !user_exists(conn, &uid)? {
                return Ok(Lookup::UserMissing);
            }
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM session WHERE user_id = ?1",
                [&uid],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(
                r#"
                SELECT s.id, s.title, s.created_at, s.updated_at,
                       (SELECT COUNT(*) FROM chat_message m WHERE m.session_id = s.id) as message_count
                FROM session s
                WHERE s.user_id = ?1
                ORDER BY s.updated_at DESC, s.created_at DESC
                LIMIT ?2 OFFSET ?3
                "#,
            )?;
            let sessions = stmt
                .query_map(params![uid, page_size, offset], |row| {
                    Ok(SessionSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        created_at: timestamp_from_sql(2, row.get(2)?)?,
                        updated_at: timestamp_from_sql(3, row.get(3)?)?,
                        message_count: row.get(4)?,
                    })
                })?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            Ok(Lookup::Found((sessions, total as usize)))
        })
        .await?;

    let (sessions, total) = found(lookup)?;
    let pagination = Pagination {
        page,
        total_pages: total.div_ceil(page_size),
        total_sessions: total,
        has_more: page.checked_mul(page_size).is_some_and(|seen| seen < total),
    };
    Ok(SessionPage {
        sessions,
        pagination,
    })
}

/// Fetch one of the user's sessions with its full transcript.
pub async fn find_session(
    db: &Connection,
    user_id: &str,
    session_id: &str,
) -> Result<Session, HistoryError> {
    let uid = user_id.to_owned();
    let sid = session_id.to_owned();
    let lookup = db
        .call(move |conn| {
            if !user_exists(conn, &uid)? {
                return Ok(Lookup::UserMissing);
            }
            let session = conn
                .query_row(
                    "SELECT id, title, created_at, updated_at FROM session
                     WHERE id = ?1 AND user_id = ?2",
                    params![sid, uid],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            timestamp_from_sql(2, row.get(2)?)?,
                            timestamp_from_sql(3, row.get(3)?)?,
                        ))
                    },
                )
                .optional()?;
            let Some((id, title, created_at, updated_at)) = session else {
                return Ok(Lookup::SessionMissing);
            };

            let mut stmt = conn.prepare(
                "SELECT text, sender, created_at FROM chat_message
                 WHERE session_id = ?1 ORDER BY id",
            )?;
            let messages = stmt
                .query_map([&id], |row| {
                    Ok(ChatMessage {
                        text: row.get(0)?,
                        sender: row.get(1)?,
                        created_at: timestamp_from_sql(2, row.get(2)?)?,
                    })
                })?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();

            Ok(Lookup::Found(Session {
                id,
                title,
                created_at,
                updated_at,
                messages,
            }))
        })
        .await?;
    found(lookup)
}

/// Append a (user, bot) message pair to a session, creating the
/// session when `session_id` is `None`. The pair, the session's
/// recency bump, and any eviction commit atomically or not at all.
pub async fn append_turn(
    db: &Connection,
    user_id: &str,
    session_id: Option<&str>,
    user_text: &str,
    bot_text: &str,
    max_sessions: usize,
) -> Result<AppendedTurn, HistoryError> {
    let uid = user_id.to_owned();
    let sid = session_id.map(str::to_owned);
    let user_msg = user_text.to_owned();
    let bot_msg = bot_text.to_owned();
    let appended_at = Utc::now();

    let lookup = db
        .call(move |conn| {
            let tx = conn.transaction()?;
            if !user_exists(&tx, &uid)? {
                return Ok(Lookup::UserMissing);
            }
            let now = timestamp_to_sql(&appended_at);

            let (target_id, created_new) = match sid {
                Some(existing) => {
                    let found_id: Option<String> = tx
                        .query_row(
                            "SELECT id FROM session WHERE id = ?1 AND user_id = ?2",
                            params![existing, uid],
                            |row| row.get(0),
                        )
                        .optional()?;
                    match found_id {
                        Some(id) => {
                            tx.execute(
                                "UPDATE session SET updated_at = ?1 WHERE id = ?2",
                                params![now, id],
                            )?;
                            (id, false)
                        }
                        None => return Ok(Lookup::SessionMissing),
                    }
                }
                None => {
                    // The cap only applies when a new session is added
                    evict_to_fit(&tx, &uid, max_sessions)?;
                    let id = Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO session (id, user_id, title, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![id, uid, derive_title(&user_msg), now, now],
                    )?;
                    (id, true)
                }
            };

            tx.execute(
                "INSERT INTO chat_message (session_id, sender, text, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![target_id, Sender::User, user_msg, now],
            )?;
            tx.execute(
                "INSERT INTO chat_message (session_id, sender, text, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![target_id, Sender::Bot, bot_msg, now],
            )?;

            tx.commit()?;
            Ok(Lookup::Found(AppendedTurn {
                session_id: target_id,
                created_new,
                appended_at,
            }))
        })
        .await?;
    found(lookup)
}

// Make room for one more session by deleting the least recently
// updated ones first, oldest created_at breaking ties.
fn evict_to_fit(
    tx: &Transaction<'_>,
    user_id: &str,
    max_sessions: usize,
) -> Result<(), rusqlite::Error> {
    let total: i64 = tx.query_row(
        "SELECT COUNT(*) FROM session WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    let excess = (total as usize + 1).saturating_sub(max_sessions);
    if excess == 0 {
        return Ok(());
    }

    let mut stmt = tx.prepare(
        r#"
        SELECT id FROM session
        WHERE user_id = ?1
        ORDER BY updated_at ASC, created_at ASC
        LIMIT ?2
        "#,
    )?;
    let victims = stmt
        .query_map(params![user_id, excess], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    for victim in &victims {
        tx.execute("DELETE FROM chat_message WHERE session_id = ?1", [victim])?;
        tx.execute("DELETE FROM session WHERE id = ?1", [victim])?;
    }
    Ok(())
}

/// Delete one of the user's sessions and its messages.
pub async fn delete_session(
    db: &Connection,
    user_id: &str,
    session_id: &str,
) -> Result<(), HistoryError> {
    let uid = user_id.to_owned();
    let sid = session_id.to_owned();
    let lookup = db
        .call(move |conn| {
            let tx = conn.transaction()?;
            if !user_exists(&tx, &uid)? {
                return Ok(Lookup::UserMissing);
            }
            let target: Option<String> = tx
                .query_row(
                    "SELECT id FROM session WHERE id = ?1 AND user_id = ?2",
                    params![sid, uid],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(id) = target else {
                return Ok(Lookup::SessionMissing);
            };

            tx.execute("DELETE FROM chat_message WHERE session_id = ?1", [&id])?;
            tx.execute("DELETE FROM session WHERE id = ?1", [&id])?;
            tx.commit()?;
            Ok(Lookup::Found(()))
        })
        .await?;
    found(lookup)
}

/// Delete all of the user's sessions. Returns how many were removed.
pub async fn clear_history(db: &Connection, user_id: &str) -> Result<usize, HistoryError> {
    let uid = user_id.to_owned();
    let lookup = db
        .call(move |conn| {
            let tx = conn.transaction()?;
            if !user_exists(&tx, &uid)? {
                return Ok(Lookup::UserMissing);
            }
            tx.execute(
                "DELETE FROM chat_message WHERE session_id IN
                 (SELECT id FROM session WHERE user_id = ?1)",
                [&uid],
            )?;
            let removed = tx.execute("DELETE FROM session WHERE user_id = ?1", [&uid])?;
            tx.commit()?;
            Ok(Lookup::Found(removed))
        })
        .await?;
    found(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::create_user;
    use crate::core::db::initialize_db;
    use chrono::TimeZone;

    async fn test_db() -> Connection {
        let db = Connection::open_in_memory().await.unwrap();
        db.call(|conn| {
            initialize_db(conn).expect("Failed to migrate db");
            Ok(())
        })
        .await
        .unwrap();
        db
    }

    async fn seed_user(db: &Connection) -> String {
        create_user(db, "testuser", "test@example.com")
            .await
            .unwrap()
            .id
    }

    /// Pin a session's timestamps so ordering assertions don't depend
    /// on the wall clock.
    async fn set_session_times(db: &Connection, session_id: &str, created: i64, updated: i64) {
        let sid = session_id.to_owned();
        let created = timestamp_to_sql(&Utc.timestamp_opt(created, 0).unwrap());
        let updated = timestamp_to_sql(&Utc.timestamp_opt(updated, 0).unwrap());
        db.call(move |conn| {
            conn.execute(
                "UPDATE session SET created_at = ?1, updated_at = ?2 WHERE id = ?3",
                params![created, updated, sid],
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_append_creates_session_with_derived_title() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;

        let long_message = format!("{}{}", "m".repeat(30), "ore");
        let receipt = append_turn(&db, &user_id, None, &long_message, "reply", 50)
            .await
            .unwrap();
        assert!(receipt.created_new);

        let session = find_session(&db, &user_id, &receipt.session_id)
            .await
            .unwrap();
        assert_eq!(session.title, format!("{}...", "m".repeat(30)));
        assert_eq!(session.created_at, session.updated_at);
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].sender, Sender::User);
        assert_eq!(session.messages[0].text, long_message);
        assert_eq!(session.messages[1].sender, Sender::Bot);
        assert_eq!(session.messages[1].text, "reply");
    }

    #[tokio::test]
    async fn test_append_to_existing_session_keeps_order() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;

        let first = append_turn(&db, &user_id, None, "one", "two", 50)
            .await
            .unwrap();
        let second = append_turn(&db, &user_id, Some(&first.session_id), "three", "four", 50)
            .await
            .unwrap();
        assert!(!second.created_new);
        assert_eq!(second.session_id, first.session_id);

        let session = find_session(&db, &user_id, &first.session_id)
            .await
            .unwrap();
        let texts: Vec<&str> = session.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three", "four"]);
        // Title still comes from the first message
        assert_eq!(session.title, "one");
        assert!(session.updated_at >= session.created_at);
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_changes_nothing() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;

        let result = append_turn(&db, &user_id, Some("no-such-session"), "hi", "yo", 50).await;
        assert!(matches!(result, Err(HistoryError::SessionNotFound)));

        let page = list_sessions(&db, &user_id, None, None).await.unwrap();
        assert_eq!(page.pagination.total_sessions, 0);
    }

    #[tokio::test]
    async fn test_append_for_unknown_user_fails() {
        let db = test_db().await;
        let result = append_turn(&db, "ghost", None, "hi", "yo", 50).await;
        assert!(matches!(result, Err(HistoryError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_eviction_removes_least_recently_updated() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;

        let mut ids = Vec::new();
        for i in 0..3 {
            let receipt = append_turn(&db, &user_id, None, &format!("chat {}", i), "ok", 3)
                .await
                .unwrap();
            ids.push(receipt.session_id);
        }
        // chat 1 is the stalest by recency even though chat 0 is older
        // by creation
        set_session_times(&db, &ids[0], 100, 500).await;
        set_session_times(&db, &ids[1], 200, 400).await;
        set_session_times(&db, &ids[2], 300, 600).await;

        let receipt = append_turn(&db, &user_id, None, "chat 3", "ok", 3)
            .await
            .unwrap();

        let page = list_sessions(&db, &user_id, None, None).await.unwrap();
        assert_eq!(page.pagination.total_sessions, 3);
        let listed: Vec<&str> = page.sessions.iter().map(|s| s.id.as_str()).collect();
        assert!(!listed.contains(&ids[1].as_str()));
        assert_eq!(listed[0], receipt.session_id);

        let evicted = find_session(&db, &user_id, &ids[1]).await;
        assert!(matches!(evicted, Err(HistoryError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_eviction_breaks_recency_ties_by_creation() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;

        let a = append_turn(&db, &user_id, None, "a", "ok", 2).await.unwrap();
        let b = append_turn(&db, &user_id, None, "b", "ok", 2).await.unwrap();
        set_session_times(&db, &a.session_id, 100, 400).await;
        set_session_times(&db, &b.session_id, 200, 400).await;

        append_turn(&db, &user_id, None, "c", "ok", 2).await.unwrap();

        assert!(matches!(
            find_session(&db, &user_id, &a.session_id).await,
            Err(HistoryError::SessionNotFound)
        ));
        assert!(find_session(&db, &user_id, &b.session_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_appending_at_capacity_to_existing_session_evicts_nothing() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;

        let first = append_turn(&db, &user_id, None, "a", "ok", 2).await.unwrap();
        let second = append_turn(&db, &user_id, None, "b", "ok", 2).await.unwrap();
        set_session_times(&db, &first.session_id, 100, 100).await;
        set_session_times(&db, &second.session_id, 200, 200).await;

        append_turn(&db, &user_id, Some(&first.session_id), "more", "ok", 2)
            .await
            .unwrap();

        let page = list_sessions(&db, &user_id, None, None).await.unwrap();
        assert_eq!(page.pagination.total_sessions, 2);
        // The appended-to session is now the most recently active
        assert_eq!(page.sessions[0].id, first.session_id);
        assert_eq!(page.sessions[0].message_count, 4);
    }

    #[tokio::test]
    async fn test_eviction_at_default_capacity() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;

        let mut ids = Vec::new();
        for i in 0..50 {
            let receipt = append_turn(&db, &user_id, None, &format!("chat {}", i), "ok", 50)
                .await
                .unwrap();
            ids.push(receipt.session_id);
        }
        for (i, id) in ids.iter().enumerate() {
            let t = 1_000 + i as i64;
            set_session_times(&db, id, t, t).await;
        }

        let receipt = append_turn(&db, &user_id, None, "one more", "ok", 50)
            .await
            .unwrap();

        let page = list_sessions(&db, &user_id, None, Some(100)).await.unwrap();
        assert_eq!(page.pagination.total_sessions, 50);
        assert_eq!(page.sessions[0].id, receipt.session_id);
        assert!(matches!(
            find_session(&db, &user_id, &ids[0]).await,
            Err(HistoryError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_orders_by_recency_and_paginates() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;

        let mut ids = Vec::new();
        for i in 0..5 {
            let receipt = append_turn(&db, &user_id, None, &format!("chat {}", i), "ok", 50)
                .await
                .unwrap();
            ids.push(receipt.session_id);
            set_session_times(&db, &ids[i], 1_000 + i as i64, 1_000 + i as i64).await;
        }

        let page = list_sessions(&db, &user_id, Some(1), Some(2)).await.unwrap();
        assert_eq!(page.sessions.len(), 2);
        assert_eq!(page.sessions[0].id, ids[4]);
        assert_eq!(page.sessions[1].id, ids[3]);
        assert_eq!(
            page.pagination,
            Pagination {
                page: 1,
                total_pages: 3,
                total_sessions: 5,
                has_more: true,
            }
        );

        let page = list_sessions(&db, &user_id, Some(3), Some(2)).await.unwrap();
        assert_eq!(page.sessions.len(), 1);
        assert_eq!(page.sessions[0].id, ids[0]);
        assert!(!page.pagination.has_more);

        // Past the end is an empty page, not an error
        let page = list_sessions(&db, &user_id, Some(4), Some(2)).await.unwrap();
        assert!(page.sessions.is_empty());
        assert!(!page.pagination.has_more);
    }

    #[tokio::test]
    async fn test_list_falls_back_to_default_paging() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;
        append_turn(&db, &user_id, None, "hello", "ok", 50)
            .await
            .unwrap();

        // Zero is not a valid page or size
        let page = list_sessions(&db, &user_id, Some(0), Some(0)).await.unwrap();
        assert_eq!(page.pagination.page, DEFAULT_PAGE);
        assert_eq!(page.sessions.len(), 1);
        assert_eq!(page.pagination.total_pages, 1);
    }

    #[tokio::test]
    async fn test_list_for_unknown_user_fails() {
        let db = test_db().await;
        let result = list_sessions(&db, "ghost", None, None).await;
        assert!(matches!(result, Err(HistoryError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_find_session_ignores_other_users_sessions() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let other = create_user(&db, "other", "other@example.com")
            .await
            .unwrap()
            .id;

        let receipt = append_turn(&db, &owner, None, "mine", "ok", 50)
            .await
            .unwrap();

        let result = find_session(&db, &other, &receipt.session_id).await;
        assert!(matches!(result, Err(HistoryError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_delete_session_is_not_repeatable() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;
        let receipt = append_turn(&db, &user_id, None, "hello", "ok", 50)
            .await
            .unwrap();

        delete_session(&db, &user_id, &receipt.session_id)
            .await
            .unwrap();
        let again = delete_session(&db, &user_id, &receipt.session_id).await;
        assert!(matches!(again, Err(HistoryError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_clear_history_reports_removed_count() {
        let db = test_db().await;
        let user_id = seed_user(&db).await;
        for i in 0..3 {
            append_turn(&db, &user_id, None, &format!("chat {}", i), "ok", 50)
                .await
                .unwrap();
        }

        assert_eq!(clear_history(&db, &user_id).await.unwrap(), 3);
        assert_eq!(clear_history(&db, &user_id).await.unwrap(), 0);

        let page = list_sessions(&db, &user_id, None, None).await.unwrap();
        assert_eq!(page.pagination.total_sessions, 0);
        assert_eq!(page.pagination.total_pages, 0);
    }
}
