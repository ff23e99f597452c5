use chrono::{NaiveDate, Utc};
use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};
use tracing::{info, instrument};

use crate::database::schema::{CURRENT_SCHEMA, DEDUPE_GUARD_SCHEMA};
use crate::env::CoreConfig;
use crate::error::AppError;
use crate::models::{
    Academy, CheckinRecord, CheckinStatus, ClassSchedule, DbAcademy, DbCheckinRecord,
    DbClassSchedule, DbMemberSummary, DbMembership, DbProfile, MemberSummary, Membership,
    NewAcademy, NewClassSchedule, Profile,
};
use crate::roles::MembershipRole;

/// Connects a pool and applies the declarative schema.
///
/// In-memory SQLite gives every pooled connection its own empty database,
/// so memory-backed pools are capped at one connection. File-backed pools
/// keep a small pool; conditional updates stay atomic at the statement
/// level either way.
pub async fn setup_database(database_url: &str) -> Result<Pool<Sqlite>, AppError> {
    let max_connections = if is_memory_url(database_url) { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::raw_sql(CURRENT_SCHEMA).execute(&pool).await?;

    Ok(pool)
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Connects per the config, installing the same-day check-in uniqueness
/// guard when dedupe mode is on.
pub async fn setup_database_with(config: &CoreConfig) -> Result<Pool<Sqlite>, AppError> {
    let pool = setup_database(&config.database_url).await?;

    if config.dedupe_checkins {
        sqlx::raw_sql(DEDUPE_GUARD_SCHEMA).execute(&pool).await?;
    }

    Ok(pool)
}

#[instrument(skip(pool, academy))]
pub async fn insert_academy(
    pool: &Pool<Sqlite>,
    owner_id: &str,
    academy: &NewAcademy,
    invite_code: &str,
) -> Result<Academy, AppError> {
    info!("Inserting academy");
    let res = sqlx::query(
        "INSERT INTO academies (owner_id, name, city, logo_url, invite_code)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(owner_id)
    .bind(&academy.name)
    .bind(&academy.city)
    .bind(&academy.logo_url)
    .bind(invite_code)
    .execute(pool)
    .await;

    match res {
        Ok(res) => get_academy(pool, res.last_insert_rowid()).await,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            // The UNIQUE constraint on invite_code is the authoritative
            // guard against two academies generating the same candidate
            // concurrently.
            Err(AppError::Conflict(format!(
                "Invite code {} already in use",
                invite_code
            )))
        }
        Err(err) => Err(err.into()),
    }
}

#[instrument]
pub async fn get_academy(pool: &Pool<Sqlite>, id: i64) -> Result<Academy, AppError> {
    info!("Fetching academy by ID");
    let row = sqlx::query_as::<_, DbAcademy>(
        "SELECT id, owner_id, name, city, logo_url, invite_code, created_at
         FROM academies WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(academy) => Ok(Academy::from(academy)),
        _ => Err(AppError::NotFound(format!(
            "Academy with id {} not found",
            id
        ))),
    }
}

/// The academy treated as "the" academy for an owner. Multiple rows can
/// exist; the oldest wins, with the row id as a deterministic tiebreak.
#[instrument]
pub async fn get_academy_for_owner(
    pool: &Pool<Sqlite>,
    owner_id: &str,
) -> Result<Option<Academy>, AppError> {
    info!("Fetching academy by owner");
    let row = sqlx::query_as::<_, DbAcademy>(
        "SELECT id, owner_id, name, city, logo_url, invite_code, created_at
         FROM academies WHERE owner_id = ?
         ORDER BY created_at ASC, id ASC
         LIMIT 1",
    )
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Academy::from))
}

#[instrument]
pub async fn get_academy_by_invite_code(
    pool: &Pool<Sqlite>,
    code: &str,
) -> Result<Option<Academy>, AppError> {
    info!("Fetching academy by invite code");
    let row = sqlx::query_as::<_, DbAcademy>(
        "SELECT id, owner_id, name, city, logo_url, invite_code, created_at
         FROM academies WHERE invite_code = ?",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Academy::from))
}

#[instrument]
pub async fn invite_code_exists(pool: &Pool<Sqlite>, code: &str) -> Result<bool, AppError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM academies WHERE invite_code = ?")
        .bind(code)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

#[instrument]
pub async fn user_owns_academy(pool: &Pool<Sqlite>, user_id: &str) -> Result<bool, AppError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM academies WHERE owner_id = ? LIMIT 1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.is_some())
}

/// Upserts a membership row keyed on (academy_id, user_id); inserting an
/// existing pair is a no-op, never an error.
#[instrument]
pub async fn upsert_membership(
    pool: &Pool<Sqlite>,
    academy_id: i64,
    user_id: &str,
    role: MembershipRole,
) -> Result<(), AppError> {
    info!("Upserting membership");
    sqlx::query(
        "INSERT INTO memberships (academy_id, user_id, role)
         VALUES (?, ?, ?)
         ON CONFLICT (academy_id, user_id) DO NOTHING",
    )
    .bind(academy_id)
    .bind(user_id)
    .bind(role.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument]
pub async fn get_membership(
    pool: &Pool<Sqlite>,
    academy_id: i64,
    user_id: &str,
) -> Result<Option<Membership>, AppError> {
    info!("Fetching membership");
    let row = sqlx::query_as::<_, DbMembership>(
        "SELECT id, academy_id, user_id, role, joined_at
         FROM memberships WHERE academy_id = ? AND user_id = ?",
    )
    .bind(academy_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Membership::from))
}

/// Memberships for a user in insertion order. Role resolution depends on
/// that order; do not add sorting here.
#[instrument]
pub async fn list_memberships_for_user(
    pool: &Pool<Sqlite>,
    user_id: &str,
) -> Result<Vec<Membership>, AppError> {
    info!("Listing memberships for user");
    let rows = sqlx::query_as::<_, DbMembership>(
        "SELECT id, academy_id, user_id, role, joined_at
         FROM memberships WHERE user_id = ?
         ORDER BY id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Membership::from).collect())
}

#[instrument]
pub async fn list_members_with_profiles(
    pool: &Pool<Sqlite>,
    academy_id: i64,
) -> Result<Vec<MemberSummary>, AppError> {
    info!("Listing members with profiles");
    let rows = sqlx::query_as::<_, DbMemberSummary>(
        "SELECT m.id AS membership_id, m.academy_id, m.user_id, m.role, m.joined_at,
                p.display_name, p.email, p.avatar_url, p.rank_name, p.rank_degree
         FROM memberships m
         LEFT JOIN profiles p ON p.user_id = m.user_id
         WHERE m.academy_id = ?
         ORDER BY m.joined_at ASC, m.id ASC",
    )
    .bind(academy_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MemberSummary::from).collect())
}

#[instrument]
pub async fn delete_membership(
    pool: &Pool<Sqlite>,
    academy_id: i64,
    user_id: &str,
) -> Result<u64, AppError> {
    info!("Deleting membership");
    let result = sqlx::query("DELETE FROM memberships WHERE academy_id = ? AND user_id = ?")
        .bind(academy_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[instrument(skip(pool, profile))]
pub async fn upsert_profile(pool: &Pool<Sqlite>, profile: &Profile) -> Result<(), AppError> {
    info!("Upserting profile");
    sqlx::query(
        "INSERT INTO profiles (user_id, display_name, email, avatar_url, rank_name, rank_degree)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_id) DO UPDATE SET
             display_name = excluded.display_name,
             email = excluded.email,
             avatar_url = excluded.avatar_url,
             rank_name = excluded.rank_name,
             rank_degree = excluded.rank_degree",
    )
    .bind(&profile.user_id)
    .bind(&profile.display_name)
    .bind(&profile.email)
    .bind(&profile.avatar_url)
    .bind(&profile.rank_name)
    .bind(profile.rank_degree)
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument]
pub async fn get_profile(pool: &Pool<Sqlite>, user_id: &str) -> Result<Profile, AppError> {
    info!("Fetching profile");
    let row = sqlx::query_as::<_, DbProfile>(
        "SELECT user_id, display_name, email, avatar_url, rank_name, rank_degree
         FROM profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(profile) => Ok(Profile::from(profile)),
        _ => Err(AppError::NotFound(format!(
            "Profile for user {} not found",
            user_id
        ))),
    }
}

#[instrument(skip(pool, class))]
pub async fn insert_class(
    pool: &Pool<Sqlite>,
    academy_id: i64,
    class: &NewClassSchedule,
) -> Result<ClassSchedule, AppError> {
    info!("Inserting class schedule");
    let res = sqlx::query(
        "INSERT INTO class_schedules
             (academy_id, weekday, start_time, end_time, instructor_id, recurring, start_date)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(academy_id)
    .bind(class.weekday)
    .bind(&class.start_time)
    .bind(&class.end_time)
    .bind(&class.instructor_id)
    .bind(class.recurring)
    .bind(&class.start_date)
    .execute(pool)
    .await?;

    let id = res.last_insert_rowid();
    match get_class(pool, id).await? {
        Some(class) => Ok(class),
        _ => Err(AppError::NotFound(format!(
            "Class with id {} not found after insert",
            id
        ))),
    }
}

#[instrument]
pub async fn get_class(pool: &Pool<Sqlite>, id: i64) -> Result<Option<ClassSchedule>, AppError> {
    info!("Fetching class schedule");
    let row = sqlx::query_as::<_, DbClassSchedule>(
        "SELECT id, academy_id, weekday, start_time, end_time, instructor_id, recurring, start_date
         FROM class_schedules WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ClassSchedule::from))
}

#[instrument]
pub async fn list_classes_for_academy(
    pool: &Pool<Sqlite>,
    academy_id: i64,
) -> Result<Vec<ClassSchedule>, AppError> {
    info!("Listing classes for academy");
    let rows = sqlx::query_as::<_, DbClassSchedule>(
        "SELECT id, academy_id, weekday, start_time, end_time, instructor_id, recurring, start_date
         FROM class_schedules WHERE academy_id = ?
         ORDER BY weekday ASC, start_time ASC",
    )
    .bind(academy_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ClassSchedule::from).collect())
}

#[instrument]
pub async fn insert_checkin(
    pool: &Pool<Sqlite>,
    academy_id: i64,
    class_id: i64,
    student_id: &str,
) -> Result<CheckinRecord, AppError> {
    info!("Inserting check-in");
    let res = sqlx::query(
        "INSERT INTO checkins (academy_id, class_id, student_id, status)
         VALUES (?, ?, ?, 'pending')",
    )
    .bind(academy_id)
    .bind(class_id)
    .bind(student_id)
    .execute(pool)
    .await;

    match res {
        Ok(res) => {
            let id = res.last_insert_rowid();
            match get_checkin(pool, id).await? {
                Some(checkin) => Ok(checkin),
                _ => Err(AppError::NotFound(format!(
                    "Check-in with id {} not found after insert",
                    id
                ))),
            }
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            // The dedupe-mode unique index is the authoritative guard
            // against two same-day submissions racing past the existence
            // check.
            Err(AppError::Conflict(format!(
                "Student {} already checked in to class {} today",
                student_id, class_id
            )))
        }
        Err(err) => Err(err.into()),
    }
}

#[instrument]
pub async fn get_checkin(pool: &Pool<Sqlite>, id: i64) -> Result<Option<CheckinRecord>, AppError> {
    info!("Fetching check-in");
    let row = sqlx::query_as::<_, DbCheckinRecord>(
        "SELECT id, academy_id, class_id, student_id, status, created_at, validated_by, validated_at
         FROM checkins WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(CheckinRecord::from))
}

#[instrument]
pub async fn checkin_exists_for_day(
    pool: &Pool<Sqlite>,
    class_id: i64,
    student_id: &str,
    day: NaiveDate,
) -> Result<bool, AppError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM checkins
         WHERE class_id = ? AND student_id = ? AND date(created_at) = ?
         LIMIT 1",
    )
    .bind(class_id)
    .bind(student_id)
    .bind(day.format("%Y-%m-%d").to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Conditional transition away from `pending`. The WHERE clause is the
/// compare-and-swap: zero rows affected on an existing record means the
/// record already reached a terminal state.
#[instrument]
pub async fn transition_checkin(
    pool: &Pool<Sqlite>,
    checkin_id: i64,
    new_status: CheckinStatus,
    approver_id: &str,
) -> Result<u64, AppError> {
    info!("Transitioning check-in status");
    let now = Utc::now().naive_utc();

    let result = sqlx::query(
        "UPDATE checkins
         SET status = ?, validated_by = ?, validated_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(new_status.as_str())
    .bind(approver_id)
    .bind(now)
    .bind(checkin_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[instrument]
pub async fn list_pending_for_academy(
    pool: &Pool<Sqlite>,
    academy_id: i64,
) -> Result<Vec<CheckinRecord>, AppError> {
    info!("Listing pending check-ins for academy");
    let rows = sqlx::query_as::<_, DbCheckinRecord>(
        "SELECT id, academy_id, class_id, student_id, status, created_at, validated_by, validated_at
         FROM checkins
         WHERE academy_id = ? AND status = 'pending'
         ORDER BY created_at ASC, id ASC",
    )
    .bind(academy_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CheckinRecord::from).collect())
}

/// Pending check-ins the approver may act on, scoped in SQL: everything in
/// academies they own, plus assigned classes where they still hold an
/// instructor membership. Mirrors the transition authorization exactly, so
/// nothing surfaces here that a transition would then refuse.
#[instrument]
pub async fn list_pending_for_approver(
    pool: &Pool<Sqlite>,
    approver_id: &str,
) -> Result<Vec<CheckinRecord>, AppError> {
    info!("Listing pending check-ins for approver");
    let rows = sqlx::query_as::<_, DbCheckinRecord>(
        "SELECT c.id, c.academy_id, c.class_id, c.student_id, c.status, c.created_at,
                c.validated_by, c.validated_at
         FROM checkins c
         JOIN academies a ON a.id = c.academy_id
         JOIN class_schedules cs ON cs.id = c.class_id
         WHERE c.status = 'pending'
           AND (a.owner_id = ?
                OR (cs.instructor_id = ?
                    AND EXISTS (SELECT 1 FROM memberships m
                                WHERE m.academy_id = c.academy_id
                                  AND m.user_id = ?
                                  AND m.role = 'instructor')))
         ORDER BY c.created_at ASC, c.id ASC",
    )
    .bind(approver_id)
    .bind(approver_id)
    .bind(approver_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CheckinRecord::from).collect())
}
