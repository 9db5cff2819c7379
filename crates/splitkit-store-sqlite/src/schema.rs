//! SQL schema for the splitkit SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Experiments are deactivated, never deleted.
CREATE TABLE IF NOT EXISTS experiments (
    experiment_id TEXT PRIMARY KEY,
    name          TEXT NOT NULL UNIQUE,
    description   TEXT,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS variants (
    variant_id    TEXT PRIMARY KEY,
    experiment_id TEXT NOT NULL REFERENCES experiments(experiment_id) ON DELETE CASCADE,
    name          TEXT NOT NULL,
    weight        REAL NOT NULL CHECK (weight >= 0 AND weight <= 1),
    config        TEXT NOT NULL DEFAULT '{}',   -- JSON object
    created_at    TEXT NOT NULL,
    UNIQUE (experiment_id, name)
);

-- Append-once. The primary key is what makes the first committed
-- assignment for a visitor the only one.
CREATE TABLE IF NOT EXISTS assignments (
    experiment_id TEXT NOT NULL REFERENCES experiments(experiment_id),
    visitor_id    TEXT NOT NULL,
    variant_id    TEXT NOT NULL REFERENCES variants(variant_id),
    created_at    TEXT NOT NULL,
    PRIMARY KEY (experiment_id, visitor_id)
);

-- Append-only. Linkage is optional and outlives its targets.
CREATE TABLE IF NOT EXISTS events (
    event_id      TEXT PRIMARY KEY,
    visitor_id    TEXT NOT NULL,
    experiment_id TEXT REFERENCES experiments(experiment_id) ON DELETE SET NULL,
    variant_id    TEXT REFERENCES variants(variant_id) ON DELETE SET NULL,
    event_type    TEXT NOT NULL,
    event_data    TEXT NOT NULL DEFAULT '{}',   -- JSON object
    page_url      TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS feature_toggles (
    toggle_id     TEXT PRIMARY KEY,
    key           TEXT NOT NULL UNIQUE,
    label         TEXT NOT NULL,
    description   TEXT,
    enabled       INTEGER NOT NULL DEFAULT 0,
    config        TEXT NOT NULL DEFAULT '{}',   -- JSON object
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS variants_experiment_idx ON variants(experiment_id);
CREATE INDEX IF NOT EXISTS events_experiment_idx   ON events(experiment_id, variant_id);
CREATE INDEX IF NOT EXISTS events_visitor_idx      ON events(visitor_id);
CREATE INDEX IF NOT EXISTS events_created_idx      ON events(created_at);

PRAGMA user_version = 1;
";
