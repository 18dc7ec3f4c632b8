//! User accounts
//!
//! The rest of the crate only ever sees the `user_id` handed out here.

use rusqlite::OptionalExtension;
use rusqlite::types::ValueRef;
use tracing::info;
use crate::storage::Store;
use crate::{Error, Result};

/// Registration and login against the `users` table
pub struct Auth<'a> {
    store: &'a Store,
    cost: u32,
}

impl<'a> Auth<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store, cost: bcrypt::DEFAULT_COST }
    }

    /// Use a different bcrypt cost
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Create an account and return its user id
    pub fn register(&self, username: &str, password: &str) -> Result<i64> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(Error::validation("Username and password are required"));
        }
        if self.user_id(username)?.is_some() {
            return Err(Error::validation(format!("Username already taken: {}", username)));
        }

        let hashed = bcrypt::hash(password, self.cost).map_err(|e| Error::Auth(e.to_string()))?;
        self.store.conn.execute(
            "INSERT INTO users (username, password) VALUES (?1, ?2)",
            [username, hashed.as_str()],
        )?;
        let id = self.store.conn.last_insert_rowid();
        info!("Registered user {} (#{})", username, id);
        Ok(id)
    }

    /// User id for valid credentials, `None` otherwise
    pub fn login(&self, username: &str, password: &str) -> Result<Option<i64>> {
        let row = self
            .store
            .conn
            .query_row(
                "SELECT id, password FROM users WHERE username = ?1",
                [username.trim()],
                |row| {
                    // older databases hold the hash as a blob
                    let hash = match row.get_ref(1)? {
                        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
                        _ => String::new(),
                    };
                    Ok((row.get::<_, i64>(0)?, hash))
                },
            )
            .optional()?;

        let Some((id, hash)) = row else {
            return Ok(None);
        };
        match bcrypt::verify(password, &hash) {
            Ok(true) => Ok(Some(id)),
            Ok(false) => Ok(None),
            Err(e) => Err(Error::Auth(e.to_string())),
        }
    }

    fn user_id(&self, username: &str) -> Result<Option<i64>> {
        let id = self
            .store
            .conn
            .query_row("SELECT id FROM users WHERE username = ?1", [username], |row| row.get(0))
            .optional()?;
        Ok(id)
    }
}
