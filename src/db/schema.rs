//! Table, column and relation metadata for the game database, plus the
//! SQLite DDL rendered from it.
//!
//! Everything the store relies on (length bounds, uniqueness, cascade rules,
//! auto-updated timestamps) lives here as data, so it can be inspected and
//! validated without touching a database.

use serde::Serialize;
use std::collections::HashSet;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Surrogate key assigned by the storage layer, never reused.
    Serial,
    Integer,
    Text,
    /// String with an optional maximum length in characters.
    Varchar(Option<u32>),
    /// RFC 3339 UTC timestamp with millisecond precision.
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// Statement clock at insert time.
    Now,
    Integer(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    Restrict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub default: Option<DefaultValue>,
    pub references: Option<ForeignKey>,
    /// Refreshed by the storage layer on every modification of the row.
    pub auto_update: bool,
    /// Fixed at insert; updates that change it are aborted.
    pub immutable: bool,
}

impl ColumnDef {
    const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            unique: false,
            primary_key: false,
            default: None,
            references: None,
            auto_update: false,
            immutable: false,
        }
    }

    const fn id() -> Self {
        let mut col = Self::new("id", ColumnType::Serial);
        col.primary_key = true;
        col
    }

    const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    const fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    const fn references(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some(ForeignKey {
            table,
            column,
            on_delete: OnDelete::Cascade,
        });
        self
    }

    const fn created_at() -> Self {
        let mut col = Self::new("created_at", ColumnType::Timestamp).default(DefaultValue::Now);
        col.immutable = true;
        col
    }

    const fn updated_at() -> Self {
        let mut col = Self::new("updated_at", ColumnType::Timestamp).default(DefaultValue::Now);
        col.auto_update = true;
        col
    }

    /// Maximum length in characters, if the column is bounded.
    pub fn max_length(&self) -> Option<u32> {
        match self.ty {
            ColumnType::Varchar(bound) => bound,
            _ => None,
        }
    }

    /// Name of the CHECK constraint guarding the length bound.
    pub fn length_constraint_name(&self, table: &str) -> String {
        format!("{table}_{}_length", self.name)
    }

    fn render(&self, table: &str) -> String {
        let mut sql = format!("{} {}", self.name, sql_type(self.ty));
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.ty == ColumnType::Serial {
                sql.push_str(" AUTOINCREMENT");
            }
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        match self.default {
            Some(DefaultValue::Now) => {
                sql.push_str(&format!(" DEFAULT ({NOW_EXPR})"));
            }
            Some(DefaultValue::Integer(v)) => sql.push_str(&format!(" DEFAULT {v}")),
            None => {}
        }
        if let Some(fk) = self.references {
            sql.push_str(&format!(
                " REFERENCES {}({}) ON DELETE {}",
                fk.table,
                fk.column,
                on_delete_sql(fk.on_delete)
            ));
        }
        if let Some(max) = self.max_length() {
            sql.push_str(&format!(
                " CONSTRAINT {} CHECK (length({}) <= {max})",
                self.length_constraint_name(table),
                self.name
            ));
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToMany,
    ManyToOne,
}

/// A named, navigable link between two tables.
///
/// Related rows are the rows of `to_table` whose `to_column` equals the
/// value of `from_column` on the source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationDef {
    pub name: &'static str,
    pub from_table: &'static str,
    pub to_table: &'static str,
    pub cardinality: Cardinality,
    pub from_column: &'static str,
    pub to_column: &'static str,
}

impl RelationDef {
    pub fn select_sql(&self, to: &TableDef) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} = ? ORDER BY id",
            to.column_list(),
            self.to_table,
            self.to_column
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub relations: &'static [RelationDef],
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (&ColumnDef, &ForeignKey)> {
        self.columns
            .iter()
            .filter_map(|c| c.references.as_ref().map(|fk| (c, fk)))
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.unique)
    }

    /// Comma-separated column names in declaration order.
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn create_table_sql(&self) -> String {
        let body = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.render(self.name)))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n)", self.name, body)
    }

    pub fn index_sql(&self) -> Vec<String> {
        self.foreign_keys()
            .map(|(col, _)| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{col} ON {table}({col})",
                    table = self.name,
                    col = col.name
                )
            })
            .collect()
    }

    /// Triggers guarding the timestamp columns, each preceded by a `DROP` so
    /// re-applying the schema replaces older trigger bodies.
    ///
    /// Immutable columns get a `BEFORE UPDATE` guard that aborts the write.
    /// Auto-updated columns get an `AFTER UPDATE` touch that overwrites
    /// whatever the write stored with the later of the current time and the
    /// old value plus one millisecond, so the column moves forward on every
    /// modification even inside one clock tick.
    pub fn trigger_sql(&self) -> Vec<String> {
        let table = self.name;
        let mut stmts = Vec::new();

        for col in self.columns.iter().filter(|c| c.immutable) {
            let name = format!("{table}_{}_freeze", col.name);
            stmts.push(format!("DROP TRIGGER IF EXISTS {name}"));
            stmts.push(format!(
                "CREATE TRIGGER {name}\n\
                 BEFORE UPDATE OF {col} ON {table}\n\
                 FOR EACH ROW WHEN NEW.{col} IS NOT OLD.{col}\n\
                 BEGIN\n    \
                     SELECT RAISE(ABORT, '{IMMUTABLE_PREFIX}{table}.{col}');\n\
                 END",
                col = col.name
            ));
        }

        for col in self.columns.iter().filter(|c| c.auto_update) {
            let name = format!("{table}_{}_touch", col.name);
            stmts.push(format!("DROP TRIGGER IF EXISTS {name}"));
            stmts.push(format!(
                "CREATE TRIGGER {name}\n\
                 AFTER UPDATE ON {table}\n\
                 FOR EACH ROW\n\
                 BEGIN\n    \
                     UPDATE {table} SET {col} = strftime('{TIMESTAMP_FORMAT}', \
                     max(julianday('now'), julianday(OLD.{col}) + 1.0 / 86400000.0)) \
                     WHERE id = NEW.id;\n\
                 END",
                col = col.name
            ));
        }

        stmts
    }
}

/// Message prefix of the abort raised when an immutable column is changed.
pub const IMMUTABLE_PREFIX: &str = "immutable column ";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%fZ";
const NOW_EXPR: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Serial | ColumnType::Integer => "INTEGER",
        ColumnType::Text | ColumnType::Varchar(_) | ColumnType::Timestamp => "TEXT",
    }
}

fn on_delete_sql(action: OnDelete) -> &'static str {
    match action {
        OnDelete::Cascade => "CASCADE",
        OnDelete::Restrict => "RESTRICT",
    }
}

pub const GAMES: TableDef = TableDef {
    name: "games",
    columns: &[
        ColumnDef::id(),
        ColumnDef::new("word", ColumnType::Varchar(Some(5))),
        ColumnDef::new("active_chat", ColumnType::Text).unique(),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
    ],
    relations: &[RelationDef {
        name: "guesses",
        from_table: "games",
        to_table: "guesses",
        cardinality: Cardinality::OneToMany,
        from_column: "id",
        to_column: "game_id",
    }],
};

pub const GUESSES: TableDef = TableDef {
    name: "guesses",
    columns: &[
        ColumnDef::id(),
        ColumnDef::new("guess", ColumnType::Varchar(Some(5))),
        ColumnDef::new("game_id", ColumnType::Integer).references("games", "id"),
        ColumnDef::new("chat_id", ColumnType::Varchar(None)),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
    ],
    relations: &[RelationDef {
        name: "game",
        from_table: "guesses",
        to_table: "games",
        cardinality: Cardinality::ManyToOne,
        from_column: "game_id",
        to_column: "id",
    }],
};

pub const USERS: TableDef = TableDef {
    name: "users",
    columns: &[
        ColumnDef::id(),
        ColumnDef::new("name", ColumnType::Varchar(Some(255))),
        ColumnDef::new("username", ColumnType::Varchar(Some(255))).nullable(),
        ColumnDef::new("telegram_user_id", ColumnType::Varchar(None)).unique(),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
    ],
    relations: &[
        RelationDef {
            name: "leaderboard",
            from_table: "users",
            to_table: "leaderboard",
            cardinality: Cardinality::OneToMany,
            from_column: "id",
            to_column: "user_id",
        },
        RelationDef {
            name: "bans",
            from_table: "users",
            to_table: "banned_users",
            cardinality: Cardinality::OneToMany,
            from_column: "id",
            to_column: "user_id",
        },
    ],
};

pub const LEADERBOARD: TableDef = TableDef {
    name: "leaderboard",
    columns: &[
        ColumnDef::id(),
        ColumnDef::new("user_id", ColumnType::Integer).references("users", "id"),
        ColumnDef::new("chat_id", ColumnType::Varchar(None)),
        ColumnDef::new("score", ColumnType::Integer).default(DefaultValue::Integer(0)),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
    ],
    relations: &[RelationDef {
        name: "user",
        from_table: "leaderboard",
        to_table: "users",
        cardinality: Cardinality::ManyToOne,
        from_column: "user_id",
        to_column: "id",
    }],
};

pub const BANNED_USERS: TableDef = TableDef {
    name: "banned_users",
    columns: &[
        ColumnDef::id(),
        ColumnDef::new("user_id", ColumnType::Integer).references("users", "id"),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
    ],
    relations: &[RelationDef {
        name: "user",
        from_table: "banned_users",
        to_table: "users",
        cardinality: Cardinality::ManyToOne,
        from_column: "user_id",
        to_column: "id",
    }],
};

/// All tables, parents before children.
pub const SCHEMA: &[TableDef] = &[GAMES, GUESSES, USERS, LEADERBOARD, BANNED_USERS];

pub fn table(name: &str) -> Option<&'static TableDef> {
    SCHEMA.iter().find(|t| t.name == name)
}

/// Ordered DDL for the whole schema: tables, then indexes, then triggers.
pub fn init_statements() -> Vec<String> {
    let tables = SCHEMA.iter().map(TableDef::create_table_sql);
    let indexes = SCHEMA.iter().flat_map(TableDef::index_sql);
    let triggers = SCHEMA.iter().flat_map(TableDef::trigger_sql);
    tables.chain(indexes).chain(triggers).collect()
}

/// Check the metadata for dangling references and missing inverses.
pub fn validate(schema: &[TableDef]) -> Result<(), String> {
    let lookup = |name: &str| schema.iter().find(|t| t.name == name);
    let mut seen = HashSet::new();

    for t in schema {
        if !seen.insert(t.name) {
            return Err(format!("table `{}` declared twice", t.name));
        }
        let pks = t.columns.iter().filter(|c| c.primary_key).count();
        if pks != 1 {
            return Err(format!("table `{}` has {pks} primary keys", t.name));
        }

        for (col, fk) in t.foreign_keys() {
            // parents must be created first
            let parent_pos = schema.iter().position(|p| p.name == fk.table);
            let own_pos = schema.iter().position(|p| p.name == t.name);
            match (parent_pos, own_pos) {
                (Some(p), Some(o)) if p < o => {}
                (Some(_), _) => {
                    return Err(format!(
                        "`{}.{}` references `{}` declared after it",
                        t.name, col.name, fk.table
                    ));
                }
                (None, _) => {
                    return Err(format!(
                        "`{}.{}` references unknown table `{}`",
                        t.name, col.name, fk.table
                    ));
                }
            }
            if lookup(fk.table).and_then(|p| p.column(fk.column)).is_none() {
                return Err(format!(
                    "`{}.{}` references unknown column `{}.{}`",
                    t.name, col.name, fk.table, fk.column
                ));
            }
        }

        for rel in t.relations {
            if rel.from_table != t.name || t.column(rel.from_column).is_none() {
                return Err(format!("relation `{}.{}` has a bad source", t.name, rel.name));
            }
            let Some(target) = lookup(rel.to_table) else {
                return Err(format!(
                    "relation `{}.{}` targets unknown table `{}`",
                    t.name, rel.name, rel.to_table
                ));
            };
            if target.column(rel.to_column).is_none() {
                return Err(format!(
                    "relation `{}.{}` targets unknown column `{}.{}`",
                    t.name, rel.name, rel.to_table, rel.to_column
                ));
            }
            let inverse = target.relations.iter().any(|r| {
                r.to_table == t.name
                    && r.from_column == rel.to_column
                    && r.to_column == rel.from_column
            });
            if !inverse {
                return Err(format!("relation `{}.{}` has no inverse", t.name, rel.name));
            }
        }
    }
    Ok(())
}
