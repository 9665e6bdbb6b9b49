//! Database module: schema metadata, row models and the SQLite store.
//!
//! Layout:
//! - `schema.rs`: table/column/relation metadata and the DDL rendered from it
//! - `models.rs`: Rust structs mirroring DB rows and insert payloads
//! - `sqlite.rs`: pool-backed store applying the schema and running queries

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{
    BannedUser, Entity, Game, Guess, LeaderboardEntry, LeaderboardRow, NewGame, NewGuess,
    NewLeaderboardEntry, NewUser, User,
};
pub use schema::{SCHEMA, init_statements};
pub use sqlite::{SqlitePool, WordleStorage};
