pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS academies (
    id INTEGER PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    city TEXT,
    logo_url TEXT,
    invite_code TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS memberships (
    id INTEGER PRIMARY KEY,
    academy_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'student',
    joined_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (academy_id, user_id),
    FOREIGN KEY (academy_id) REFERENCES academies (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY,
    display_name TEXT,
    email TEXT,
    avatar_url TEXT,
    rank_name TEXT,
    rank_degree INTEGER
);

CREATE TABLE IF NOT EXISTS class_schedules (
    id INTEGER PRIMARY KEY,
    academy_id INTEGER NOT NULL,
    weekday INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    instructor_id TEXT,
    recurring BOOLEAN NOT NULL DEFAULT TRUE,
    start_date TEXT,
    FOREIGN KEY (academy_id) REFERENCES academies (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS checkins (
    id INTEGER PRIMARY KEY,
    academy_id INTEGER NOT NULL,
    class_id INTEGER NOT NULL,
    student_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'approved', 'rejected')),
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    validated_by TEXT,
    validated_at TIMESTAMP,
    FOREIGN KEY (academy_id) REFERENCES academies (id),
    FOREIGN KEY (class_id) REFERENCES class_schedules (id)
);

CREATE INDEX IF NOT EXISTS idx_memberships_user ON memberships (user_id);
CREATE INDEX IF NOT EXISTS idx_checkins_status ON checkins (academy_id, status);
CREATE INDEX IF NOT EXISTS idx_checkins_class_day ON checkins (class_id, student_id, created_at);
"#;

/// Installed only when dedupe mode is on: the store-level guard that keeps
/// one check-in per (class, student, calendar date). The application-level
/// existence check alone cannot hold under concurrent submissions.
pub const DEDUPE_GUARD_SCHEMA: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_checkins_same_day
    ON checkins (class_id, student_id, date(created_at));
"#;
