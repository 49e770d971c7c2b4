//! User model for rssfeed.
//!
//! Users only matter to the feed engine as owners of subscriptions and read
//! marks, and as the address that receives failure notices.

use chrono::{DateTime, Utc};

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    /// User ID.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// Notification address.
    pub email: String,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

/// New user for creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique login name.
    pub username: String,
    /// Notification address.
    pub email: String,
}

impl NewUser {
    /// Create a new user.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }
}
