//! SQLite schema definition

/// SQL schema for the chart database
pub const SCHEMA_SQL: &str = r#"
-- Charts: tracked chart reference data
CREATE TABLE IF NOT EXISTS charts (
    id TEXT PRIMARY KEY,
    chart_type TEXT NOT NULL,
    genre_slug TEXT NOT NULL,
    name TEXT NOT NULL
);

-- Snapshots: one fetch of one chart for one week bucket
CREATE TABLE IF NOT EXISTS chart_snapshots (
    id TEXT PRIMARY KEY,
    chart_id TEXT NOT NULL REFERENCES charts(id),
    snapshot_date TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    source_url TEXT,
    status TEXT NOT NULL DEFAULT 'ok',
    error TEXT,
    payload_bytes INTEGER,
    UNIQUE(chart_id, snapshot_date)
);

-- Tracks: canonical track identity
CREATE TABLE IF NOT EXISTS tracks (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT,
    mix_name TEXT,
    artists TEXT,
    remixers TEXT
);

-- Entries: ranked tracks within a snapshot
CREATE TABLE IF NOT EXISTS chart_entries (
    snapshot_id TEXT NOT NULL REFERENCES chart_snapshots(id),
    track_id TEXT NOT NULL REFERENCES tracks(id),
    rank INTEGER NOT NULL CHECK (rank > 0),
    PRIMARY KEY(snapshot_id, track_id),
    UNIQUE(snapshot_id, rank)
);

-- Durability metrics: one row per chart, track and as-of week
CREATE TABLE IF NOT EXISTS durability_metrics (
    chart_id TEXT NOT NULL REFERENCES charts(id),
    track_id TEXT NOT NULL REFERENCES tracks(id),
    as_of_week TEXT NOT NULL,
    weeks_on_chart INTEGER NOT NULL,
    first_seen_week TEXT NOT NULL,
    last_seen_week TEXT NOT NULL,
    age_weeks INTEGER NOT NULL,
    presence_ratio REAL NOT NULL,
    current_streak_weeks INTEGER NOT NULL,
    max_streak_weeks INTEGER NOT NULL,
    last_streak_weeks INTEGER NOT NULL,
    reentry_count INTEGER NOT NULL,
    segments_count INTEGER NOT NULL,
    best_rank INTEGER NOT NULL,
    best_rank_week TEXT NOT NULL,
    avg_rank REAL NOT NULL,
    rank_stddev REAL NOT NULL,
    top10_weeks INTEGER NOT NULL,
    top25_weeks INTEGER NOT NULL,
    last_rank INTEGER,
    prev_rank INTEGER,
    wow_delta INTEGER,
    momentum_4w REAL,
    volatility_4w REAL,
    durability_score REAL NOT NULL,
    PRIMARY KEY(chart_id, track_id, as_of_week)
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_chart_snapshots_chart_date ON chart_snapshots(chart_id, snapshot_date);
CREATE INDEX IF NOT EXISTS idx_chart_entries_track ON chart_entries(track_id);
CREATE INDEX IF NOT EXISTS idx_durability_metrics_week ON durability_metrics(chart_id, as_of_week);
"#;
