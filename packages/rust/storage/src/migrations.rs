//! SQL migration definitions for the FightSync database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: fighters, fight_history, rankings, upcoming_bouts",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Canonical fighters
CREATE TABLE IF NOT EXISTS fighters (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    nickname            TEXT,
    profile_url_ufc     TEXT,
    profile_url_sherdog TEXT,
    image_url           TEXT,
    height              REAL,
    weight              REAL,
    reach               REAL,
    country             TEXT,
    age                 INTEGER,
    gender              TEXT,
    weight_class        TEXT,
    wins_total          INTEGER,
    losses_total        INTEGER,
    wins_ko             INTEGER,
    wins_sub            INTEGER,
    wins_dec            INTEGER,
    losses_ko           INTEGER,
    losses_sub          INTEGER,
    losses_dec          INTEGER,
    updated_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fighters_name ON fighters(name);

-- Past bouts, one row per fight per fighter. The fighter_id column is
-- intentionally unconstrained: the integrity pass reports orphans
-- instead of the insert rejecting them.
CREATE TABLE IF NOT EXISTS fight_history (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    fighter_id TEXT NOT NULL,
    opponent   TEXT NOT NULL,
    result     TEXT NOT NULL,
    method     TEXT,
    round      INTEGER,
    time       TEXT,
    fight_date TEXT
);

CREATE INDEX IF NOT EXISTS idx_fight_history_fighter ON fight_history(fighter_id);

-- Divisional rankings
CREATE TABLE IF NOT EXISTS rankings (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    division         TEXT NOT NULL,
    position         TEXT NOT NULL,
    fighter_id       TEXT,
    fighter_name     TEXT NOT NULL,
    change_indicator TEXT
);

CREATE INDEX IF NOT EXISTS idx_rankings_division ON rankings(division);

-- Scheduled matchups
CREATE TABLE IF NOT EXISTS upcoming_bouts (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    event         TEXT NOT NULL,
    event_date    TEXT,
    event_time    TEXT,
    venue         TEXT,
    location      TEXT,
    card_section  TEXT,
    bout_order    INTEGER,
    weight_class  TEXT,
    fighter1_id   TEXT,
    fighter1_name TEXT NOT NULL,
    fighter2_id   TEXT,
    fighter2_name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_upcoming_bouts_event ON upcoming_bouts(event);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
