use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::database::db;
use crate::error::AppError;
use crate::models::{
    Academy, ClassSchedule, MemberSummary, Membership, NewAcademy, NewClassSchedule, Profile,
};
use crate::ranks::BeltScale;
use crate::roles::{EffectiveRole, MembershipRecord, MembershipRole, resolve_role};

/// Letters allowed in invite codes. Excludes I, O and Q, which read too
/// much like 1 and 0 when hand-typed.
const INVITE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPRSTUVWXYZ";

const INVITE_CODE_ATTEMPTS: u32 = 5;

static INVITE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}-[0-9]{4}$").expect("invite code regex"));

fn generate_invite_code() -> String {
    let mut rng = rand::rng();

    let letters: String = (0..3)
        .map(|_| INVITE_ALPHABET[rng.random_range(0..INVITE_ALPHABET.len())] as char)
        .collect();
    let digits: u32 = rng.random_range(0..10_000);

    format!("{}-{:04}", letters, digits)
}

/// Canonicalizes a hand-typed invite code: uppercase, and anything outside
/// `[A-Z0-9-]` (spaces, punctuation the presentation layer added) is
/// stripped so formatting differences never cause false negatives.
pub fn normalize_invite_code(raw: &str) -> String {
    raw.trim()
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Creates an academy for an owner, generating a collision-checked invite
/// code. Gives up with `CodeGenerationExhausted` after five colliding
/// candidates; the caller decides whether to start over.
#[instrument(skip(pool, academy))]
pub async fn create_academy(
    pool: &Pool<Sqlite>,
    owner_id: &str,
    academy: NewAcademy,
) -> Result<Academy, AppError> {
    create_academy_with_generator(pool, owner_id, academy, generate_invite_code).await
}

// Split out so tests can force colliding candidates.
pub(crate) async fn create_academy_with_generator(
    pool: &Pool<Sqlite>,
    owner_id: &str,
    academy: NewAcademy,
    mut generate: impl FnMut() -> String,
) -> Result<Academy, AppError> {
    info!("Creating academy");
    academy.validate()?;

    for attempt in 1..=INVITE_CODE_ATTEMPTS {
        let code = generate();

        if db::invite_code_exists(pool, &code).await? {
            debug!(attempt = %attempt, code = %code, "Invite code collision, regenerating");
            continue;
        }

        // The UNIQUE constraint on the invite_code column still backs this
        // up if another academy lands the same code between the check and
        // the insert.
        return db::insert_academy(pool, owner_id, &academy, &code).await;
    }

    warn!(attempts = %INVITE_CODE_ATTEMPTS, "Invite code generation exhausted");
    Err(AppError::CodeGenerationExhausted(INVITE_CODE_ATTEMPTS))
}

/// The academy treated as "the" academy for an owner: oldest row first,
/// stable for a given data set.
#[instrument]
pub async fn get_academy_for_owner(
    pool: &Pool<Sqlite>,
    owner_id: &str,
) -> Result<Option<Academy>, AppError> {
    db::get_academy_for_owner(pool, owner_id).await
}

/// Looks up an academy by invite code. Input is normalized before the
/// lookup, so case and presentation formatting never matter.
#[instrument]
pub async fn lookup_by_invite_code(pool: &Pool<Sqlite>, code: &str) -> Result<Academy, AppError> {
    info!("Looking up academy by invite code");
    let normalized = normalize_invite_code(code);

    if !INVITE_CODE_RE.is_match(&normalized) {
        return Err(AppError::Validation(format!(
            "Invite code {:?} is not of the form AAA-9999",
            code
        )));
    }

    match db::get_academy_by_invite_code(pool, &normalized).await? {
        Some(academy) => Ok(academy),
        _ => Err(AppError::NotFound(format!(
            "No academy with invite code {}",
            normalized
        ))),
    }
}

/// Enrolls a user into an academy. Idempotent: calling twice with the same
/// (academy, user) pair leaves exactly one membership row and returns it
/// unchanged, with no error on the second call.
#[instrument]
pub async fn add_member(
    pool: &Pool<Sqlite>,
    academy_id: i64,
    user_id: &str,
    role: MembershipRole,
) -> Result<Membership, AppError> {
    info!("Adding member to academy");

    // Surfaces NotFound before the upsert can trip the foreign key.
    db::get_academy(pool, academy_id).await?;

    db::upsert_membership(pool, academy_id, user_id, role).await?;

    match db::get_membership(pool, academy_id, user_id).await? {
        Some(membership) => Ok(membership),
        _ => Err(AppError::NotFound(format!(
            "Membership for user {} in academy {} not found after upsert",
            user_id, academy_id
        ))),
    }
}

/// Member summaries for an academy, joined with profile fields, ordered by
/// join time ascending (stable).
#[instrument]
pub async fn list_members_with_profiles(
    pool: &Pool<Sqlite>,
    academy_id: i64,
) -> Result<Vec<MemberSummary>, AppError> {
    db::get_academy(pool, academy_id).await?;
    db::list_members_with_profiles(pool, academy_id).await
}

/// Hard-deletes a membership scoped to one academy. Historical check-in
/// records are left in place for audit purposes.
#[instrument]
pub async fn remove_member(
    pool: &Pool<Sqlite>,
    academy_id: i64,
    user_id: &str,
) -> Result<(), AppError> {
    info!("Removing member from academy");
    let removed = db::delete_membership(pool, academy_id, user_id).await?;

    if removed == 0 {
        return Err(AppError::NotFound(format!(
            "User {} is not a member of academy {}",
            user_id, academy_id
        )));
    }

    Ok(())
}

/// Store-backed role resolution: ownership plus memberships in insertion
/// order, fed through `resolve_role`. This is the entry point the session
/// layer re-runs on every auth state change.
#[instrument]
pub async fn effective_role_for_user(
    pool: &Pool<Sqlite>,
    user_id: &str,
) -> Result<EffectiveRole, AppError> {
    info!("Resolving effective role");
    let owns_academy = db::user_owns_academy(pool, user_id).await?;
    let memberships = db::list_memberships_for_user(pool, user_id).await?;

    let records: Vec<MembershipRecord> = memberships
        .iter()
        .map(|m| MembershipRecord {
            academy_id: m.academy_id,
            role: m.role,
        })
        .collect();

    Ok(resolve_role(owns_academy, &records))
}

/// Writes a member profile, passing the rank degree through the scale's
/// normalization first.
#[instrument(skip(pool, profile))]
pub async fn save_profile(
    pool: &Pool<Sqlite>,
    scale: &BeltScale,
    mut profile: Profile,
) -> Result<Profile, AppError> {
    info!("Saving profile");
    profile.rank_degree =
        scale.normalize_degree(&profile.rank_name, profile.rank_degree.map(|d| d as f64));

    db::upsert_profile(pool, &profile).await?;

    Ok(profile)
}

#[instrument]
pub async fn get_profile(pool: &Pool<Sqlite>, user_id: &str) -> Result<Profile, AppError> {
    db::get_profile(pool, user_id).await
}

/// Schedules a class for an academy. Weekday is 0-6; one-off classes must
/// carry a concrete start date.
#[instrument(skip(pool, class))]
pub async fn create_class(
    pool: &Pool<Sqlite>,
    academy_id: i64,
    class: NewClassSchedule,
) -> Result<ClassSchedule, AppError> {
    info!("Creating class schedule");

    if !(0..=6).contains(&class.weekday) {
        return Err(AppError::Validation(format!(
            "Weekday must be 0-6, got {}",
            class.weekday
        )));
    }

    if !class.recurring && class.start_date.is_none() {
        return Err(AppError::Validation(
            "One-off classes need a start date".to_string(),
        ));
    }

    db::get_academy(pool, academy_id).await?;
    db::insert_class(pool, academy_id, &class).await
}

#[instrument]
pub async fn list_classes(
    pool: &Pool<Sqlite>,
    academy_id: i64,
) -> Result<Vec<ClassSchedule>, AppError> {
    db::list_classes_for_academy(pool, academy_id).await
}
