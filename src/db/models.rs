use crate::db::schema::{BANNED_USERS, GAMES, GUESSES, LEADERBOARD, TableDef, USERS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row type backed by one table of the schema.
pub trait Entity {
    const TABLE: &'static TableDef;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct Game {
    pub id: i64,
    pub word: String,
    pub active_chat: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct Guess {
    pub id: i64,
    pub guess: String,
    pub game_id: i64,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub username: Option<String>,
    pub telegram_user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct BannedUser {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Game {
    const TABLE: &'static TableDef = &GAMES;
}

impl Entity for Guess {
    const TABLE: &'static TableDef = &GUESSES;
}

impl Entity for User {
    const TABLE: &'static TableDef = &USERS;
}

impl Entity for LeaderboardEntry {
    const TABLE: &'static TableDef = &LEADERBOARD;
}

impl Entity for BannedUser {
    const TABLE: &'static TableDef = &BANNED_USERS;
}

/// Leaderboard entry joined with the owning user's display fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct LeaderboardRow {
    pub user_id: i64,
    pub name: String,
    pub username: Option<String>,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewGame {
    pub word: String,
    pub active_chat: String,
}

impl NewGame {
    pub fn new(word: impl Into<String>, active_chat: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            active_chat: active_chat.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewGuess {
    pub guess: String,
    pub game_id: i64,
    pub chat_id: String,
}

impl NewGuess {
    pub fn new(guess: impl Into<String>, game_id: i64, chat_id: impl Into<String>) -> Self {
        Self {
            guess: guess.into(),
            game_id,
            chat_id: chat_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub username: Option<String>,
    pub telegram_user_id: String,
}

impl NewUser {
    pub fn new(name: impl Into<String>, telegram_user_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            username: None,
            telegram_user_id: telegram_user_id.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// `score: None` leaves the column to its storage default (0).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewLeaderboardEntry {
    pub user_id: i64,
    pub chat_id: String,
    pub score: Option<i64>,
}

impl NewLeaderboardEntry {
    pub fn new(user_id: i64, chat_id: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id: chat_id.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }
}
