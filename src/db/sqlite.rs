use crate::db::models::{
    BannedUser, Entity, Game, Guess, LeaderboardEntry, LeaderboardRow, NewGame, NewGuess,
    NewLeaderboardEntry, NewUser, User,
};
use crate::db::schema::{self, BANNED_USERS, GAMES, GUESSES, LEADERBOARD, SCHEMA, TableDef, USERS};
use crate::error::WordleError;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Error as SqlxError, FromRow, Pool, Sqlite};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub type SqlitePool = Pool<Sqlite>;

/// Row types the store can decode generically.
pub trait StoredRow: Entity + for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static {}

impl<T> StoredRow for T where T: Entity + for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static {}

#[derive(Clone)]
pub struct WordleStorage {
    pool: SqlitePool,
}

impl WordleStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) a database with foreign keys enforced on
    /// every pooled connection.
    pub async fn open(database_url: &str, max_connections: u32) -> Result<Self, WordleError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Validate the bundled metadata and apply its DDL in one transaction.
    /// Safe to run against an already initialised database.
    pub async fn init_schema(&self) -> Result<(), WordleError> {
        schema::validate(SCHEMA).map_err(WordleError::InvalidSchema)?;

        let statements = schema::init_statements();
        let mut tx = self.pool.begin().await?;
        for stmt in &statements {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(
            tables = SCHEMA.len(),
            statements = statements.len(),
            "schema applied"
        );
        Ok(())
    }

    pub async fn count_rows(&self, table: &TableDef) -> Result<i64, WordleError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name);
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    pub async fn get<T: StoredRow>(&self, id: i64) -> Result<T, WordleError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            T::TABLE.column_list(),
            T::TABLE.name
        );
        sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| WordleError::not_found(T::TABLE.name, id))
    }

    /// Delete one row by id. Dependent rows go with it through the
    /// foreign-key cascade, inside the same statement.
    pub async fn delete<T: Entity>(&self, id: i64) -> Result<(), WordleError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", T::TABLE.name);
        let res = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if res.rows_affected() == 0 {
            return Err(WordleError::not_found(T::TABLE.name, id));
        }
        debug!(table = T::TABLE.name, id, "row deleted");
        Ok(())
    }

    /// Load the rows reachable from `from` through the named relation.
    ///
    /// `key` is the value of the relation's source column on the source row
    /// (the parent id for one-to-many, the foreign key for many-to-one).
    pub async fn fetch_related<T: StoredRow>(
        &self,
        from: &TableDef,
        relation: &str,
        key: i64,
    ) -> Result<Vec<T>, WordleError> {
        let rel = from
            .relation(relation)
            .filter(|r| r.to_table == T::TABLE.name)
            .ok_or_else(|| WordleError::UnknownRelation {
                table: from.name.to_string(),
                relation: relation.to_string(),
            })?;
        let sql = rel.select_sql(T::TABLE);
        let rows: Vec<T> = sqlx::query_as::<_, T>(&sql)
            .bind(key)
            .fetch(&self.pool)
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn fetch_parent<T: StoredRow>(
        &self,
        from: &TableDef,
        relation: &str,
        key: i64,
    ) -> Result<T, WordleError> {
        self.fetch_related::<T>(from, relation, key)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WordleError::not_found(T::TABLE.name, key))
    }

    // ---- games ----

    pub async fn create_game(&self, new: &NewGame) -> Result<Game, WordleError> {
        let sql = format!(
            "INSERT INTO games (word, active_chat) VALUES (?, ?) RETURNING {}",
            GAMES.column_list()
        );
        let game: Game = sqlx::query_as(&sql)
            .bind(&new.word)
            .bind(&new.active_chat)
            .fetch_one(&self.pool)
            .await
            .map_err(rejected(GAMES.name))?;
        debug!(id = game.id, chat = %game.active_chat, "game created");
        Ok(game)
    }

    pub async fn get_game(&self, id: i64) -> Result<Game, WordleError> {
        self.get(id).await
    }

    pub async fn find_game_by_chat(&self, active_chat: &str) -> Result<Option<Game>, WordleError> {
        let sql = format!(
            "SELECT {} FROM games WHERE active_chat = ?",
            GAMES.column_list()
        );
        Ok(sqlx::query_as(&sql)
            .bind(active_chat)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn update_game_word(&self, id: i64, word: &str) -> Result<Game, WordleError> {
        let res = sqlx::query("UPDATE games SET word = ? WHERE id = ?")
            .bind(word)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(rejected(GAMES.name))?;
        if res.rows_affected() == 0 {
            return Err(WordleError::not_found(GAMES.name, id));
        }
        // re-read: the touch trigger runs after the statement
        self.get(id).await
    }

    pub async fn delete_game(&self, id: i64) -> Result<(), WordleError> {
        self.delete::<Game>(id).await
    }

    /// Remove the game occupying a chat, freeing the slot for a new one.
    pub async fn delete_game_by_chat(&self, active_chat: &str) -> Result<bool, WordleError> {
        let res = sqlx::query("DELETE FROM games WHERE active_chat = ?")
            .bind(active_chat)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // ---- guesses ----

    pub async fn create_guess(&self, new: &NewGuess) -> Result<Guess, WordleError> {
        let sql = format!(
            "INSERT INTO guesses (guess, game_id, chat_id) VALUES (?, ?, ?) RETURNING {}",
            GUESSES.column_list()
        );
        let guess: Guess = sqlx::query_as(&sql)
            .bind(&new.guess)
            .bind(new.game_id)
            .bind(&new.chat_id)
            .fetch_one(&self.pool)
            .await
            .map_err(rejected(GUESSES.name))?;
        debug!(id = guess.id, game_id = guess.game_id, "guess recorded");
        Ok(guess)
    }

    /// Guesses of a game in the order they were made.
    pub async fn list_guesses(&self, game_id: i64) -> Result<Vec<Guess>, WordleError> {
        self.fetch_related(&GAMES, "guesses", game_id).await
    }

    pub async fn game_guesses(&self, game: &Game) -> Result<Vec<Guess>, WordleError> {
        self.list_guesses(game.id).await
    }

    pub async fn guess_game(&self, guess: &Guess) -> Result<Game, WordleError> {
        self.fetch_parent(&GUESSES, "game", guess.game_id).await
    }

    // ---- users ----

    pub async fn create_user(&self, new: &NewUser) -> Result<User, WordleError> {
        let sql = format!(
            "INSERT INTO users (name, username, telegram_user_id) VALUES (?, ?, ?) RETURNING {}",
            USERS.column_list()
        );
        let user: User = sqlx::query_as(&sql)
            .bind(&new.name)
            .bind(&new.username)
            .bind(&new.telegram_user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(rejected(USERS.name))?;
        debug!(id = user.id, telegram_user_id = %user.telegram_user_id, "user created");
        Ok(user)
    }

    /// Insert or refresh a user keyed by `telegram_user_id`. Repeating the
    /// call with the same payload leaves the row, and its `updated_at`,
    /// untouched.
    pub async fn upsert_user(&self, new: &NewUser) -> Result<User, WordleError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (name, username, telegram_user_id)
            VALUES (?, ?, ?)
            ON CONFLICT(telegram_user_id) DO UPDATE SET
                name = excluded.name,
                username = excluded.username
            WHERE users.name IS NOT excluded.name
               OR users.username IS NOT excluded.username
            "#,
        )
        .bind(&new.name)
        .bind(&new.username)
        .bind(&new.telegram_user_id)
        .execute(&mut *tx)
        .await
        .map_err(rejected(USERS.name))?;

        let sql = format!(
            "SELECT {} FROM users WHERE telegram_user_id = ?",
            USERS.column_list()
        );
        let user: User = sqlx::query_as(&sql)
            .bind(&new.telegram_user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<User, WordleError> {
        self.get(id).await
    }

    pub async fn find_user_by_telegram_id(
        &self,
        telegram_user_id: &str,
    ) -> Result<Option<User>, WordleError> {
        let sql = format!(
            "SELECT {} FROM users WHERE telegram_user_id = ?",
            USERS.column_list()
        );
        Ok(sqlx::query_as(&sql)
            .bind(telegram_user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), WordleError> {
        self.delete::<User>(id).await
    }

    pub async fn user_leaderboard(&self, user: &User) -> Result<Vec<LeaderboardEntry>, WordleError> {
        self.fetch_related(&USERS, "leaderboard", user.id).await
    }

    pub async fn user_bans(&self, user: &User) -> Result<Vec<BannedUser>, WordleError> {
        self.fetch_related(&USERS, "bans", user.id).await
    }

    // ---- leaderboard ----

    pub async fn create_entry(
        &self,
        new: &NewLeaderboardEntry,
    ) -> Result<LeaderboardEntry, WordleError> {
        let returning = LEADERBOARD.column_list();
        let entry: LeaderboardEntry = match new.score {
            Some(score) => {
                let sql = format!(
                    "INSERT INTO leaderboard (user_id, chat_id, score) VALUES (?, ?, ?) RETURNING {returning}"
                );
                sqlx::query_as(&sql)
                    .bind(new.user_id)
                    .bind(&new.chat_id)
                    .bind(score)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "INSERT INTO leaderboard (user_id, chat_id) VALUES (?, ?) RETURNING {returning}"
                );
                sqlx::query_as(&sql)
                    .bind(new.user_id)
                    .bind(&new.chat_id)
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(rejected(LEADERBOARD.name))?;
        debug!(id = entry.id, user_id = entry.user_id, chat = %entry.chat_id, "leaderboard entry created");
        Ok(entry)
    }

    /// Add `points` to the user's entry for a chat, creating the entry on
    /// first score.
    pub async fn add_score(
        &self,
        user_id: i64,
        chat_id: &str,
        points: i64,
    ) -> Result<LeaderboardEntry, WordleError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE leaderboard SET score = score + ?
            WHERE id = (
                SELECT id FROM leaderboard
                WHERE user_id = ? AND chat_id = ?
                ORDER BY id LIMIT 1
            )
            "#,
        )
        .bind(points)
        .bind(user_id)
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query("INSERT INTO leaderboard (user_id, chat_id, score) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(chat_id)
                .bind(points)
                .execute(&mut *tx)
                .await
                .map_err(rejected(LEADERBOARD.name))?;
        }

        let sql = format!(
            "SELECT {} FROM leaderboard WHERE user_id = ? AND chat_id = ? ORDER BY id LIMIT 1",
            LEADERBOARD.column_list()
        );
        let entry: LeaderboardEntry = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(chat_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(user_id, chat = %chat_id, score = entry.score, "score added");
        Ok(entry)
    }

    pub async fn set_score(&self, entry_id: i64, score: i64) -> Result<LeaderboardEntry, WordleError> {
        let res = sqlx::query("UPDATE leaderboard SET score = ? WHERE id = ?")
            .bind(score)
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(WordleError::not_found(LEADERBOARD.name, entry_id));
        }
        self.get(entry_id).await
    }

    /// Highest scores first; ties keep the earlier entry ahead.
    pub async fn chat_leaderboard(
        &self,
        chat_id: &str,
        limit: u32,
    ) -> Result<Vec<LeaderboardRow>, WordleError> {
        let rows = sqlx::query_as(
            r#"
            SELECT l.user_id, u.name, u.username, l.score
            FROM leaderboard l
            JOIN users u ON u.id = l.user_id
            WHERE l.chat_id = ?
            ORDER BY l.score DESC, l.id
            LIMIT ?
            "#,
        )
        .bind(chat_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn entry_user(&self, entry: &LeaderboardEntry) -> Result<User, WordleError> {
        self.fetch_parent(&LEADERBOARD, "user", entry.user_id).await
    }

    // ---- bans ----

    /// Ban a user. Banning an already banned user returns the existing
    /// record. The insert-if-absent is a single write statement so that
    /// concurrent callers wait on the write lock instead of failing busy.
    pub async fn ban_user(&self, user_id: i64) -> Result<BannedUser, WordleError> {
        let inserted = sqlx::query(
            "INSERT INTO banned_users (user_id) SELECT ?1 \
             WHERE NOT EXISTS (SELECT 1 FROM banned_users WHERE user_id = ?1)",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(rejected(BANNED_USERS.name))?;

        let sql = format!(
            "SELECT {} FROM banned_users WHERE user_id = ? ORDER BY id LIMIT 1",
            BANNED_USERS.column_list()
        );
        let ban: BannedUser = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        info!(user_id, new = inserted.rows_affected() > 0, "user banned");
        Ok(ban)
    }

    /// Returns the number of ban records removed.
    pub async fn unban_user(&self, user_id: i64) -> Result<u64, WordleError> {
        let res = sqlx::query("DELETE FROM banned_users WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        info!(user_id, removed = res.rows_affected(), "user unbanned");
        Ok(res.rows_affected())
    }

    pub async fn is_banned(&self, user_id: i64) -> Result<bool, WordleError> {
        let banned: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM banned_users WHERE user_id = ?)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(banned)
    }

    pub async fn ban_target(&self, ban: &BannedUser) -> Result<User, WordleError> {
        self.fetch_parent(&BANNED_USERS, "user", ban.user_id).await
    }
}

/// Classify a failed write and attribute context-free failures to `table`.
fn rejected(table: &'static str) -> impl FnOnce(SqlxError) -> WordleError {
    move |e| {
        let err = WordleError::from(e).in_table(table);
        if !matches!(err, WordleError::DatabaseError(_)) {
            warn!(table, error = %err, "write rejected by constraint");
        }
        err
    }
}
