use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::database::db;
use crate::env::CoreConfig;
use crate::error::AppError;
use crate::models::{CheckinRecord, CheckinStatus};
use crate::roles::MembershipRole;

/// Creates an attendance claim, always `pending`.
///
/// Duplicate submissions for the same (student, class, calendar date) are
/// tolerated by default for compatibility with existing data; the
/// `dedupe_checkins` config flag opts into rejecting them with `Conflict`.
#[instrument(skip(pool, config))]
pub async fn create_checkin(
    pool: &Pool<Sqlite>,
    config: &CoreConfig,
    academy_id: i64,
    class_id: i64,
    student_id: &str,
) -> Result<CheckinRecord, AppError> {
    info!("Creating check-in");

    let class = match db::get_class(pool, class_id).await? {
        Some(class) => class,
        _ => {
            return Err(AppError::NotFound(format!(
                "Class with id {} not found",
                class_id
            )));
        }
    };

    if class.academy_id != academy_id {
        return Err(AppError::Validation(format!(
            "Class {} does not belong to academy {}",
            class_id, academy_id
        )));
    }

    if config.dedupe_checkins {
        let today = Utc::now().date_naive();
        // The unique index installed in dedupe mode still backs this up if
        // two submissions land between the check and the insert.
        if db::checkin_exists_for_day(pool, class_id, student_id, today).await? {
            return Err(AppError::Conflict(format!(
                "Student {} already checked in to class {} today",
                student_id, class_id
            )));
        }
    }

    db::insert_checkin(pool, academy_id, class_id, student_id).await
}

/// Transitions a pending check-in to `approved` or `rejected`.
///
/// Authorization is evaluated here against the academy's own ownership and
/// membership records, never trusted from client input. The transition
/// itself is a conditional update at the store; when two approvers race,
/// exactly one wins and the loser observes `Conflict`.
#[instrument]
pub async fn update_status(
    pool: &Pool<Sqlite>,
    checkin_id: i64,
    new_status: CheckinStatus,
    approver_id: &str,
) -> Result<CheckinRecord, AppError> {
    info!("Updating check-in status");

    if !new_status.is_terminal() {
        return Err(AppError::Validation(format!(
            "Check-ins can only transition to approved or rejected, not {}",
            new_status
        )));
    }

    let checkin = match db::get_checkin(pool, checkin_id).await? {
        Some(checkin) => checkin,
        _ => {
            return Err(AppError::NotFound(format!(
                "Check-in with id {} not found",
                checkin_id
            )));
        }
    };

    authorize_transition(pool, &checkin, approver_id).await?;

    let affected = db::transition_checkin(pool, checkin_id, new_status, approver_id).await?;
    if affected == 0 {
        // The record existed a moment ago, so the swap lost: the record is
        // already terminal. Callers must not blindly retry this.
        return Err(AppError::Conflict(format!(
            "Check-in {} has already been resolved",
            checkin_id
        )));
    }

    match db::get_checkin(pool, checkin_id).await? {
        Some(checkin) => Ok(checkin),
        _ => Err(AppError::NotFound(format!(
            "Check-in with id {} not found after transition",
            checkin_id
        ))),
    }
}

/// The approver must be the owner of the check-in's academy, or an
/// instructor member of that academy who is the instructor assigned on the
/// check-in's class.
async fn authorize_transition(
    pool: &Pool<Sqlite>,
    checkin: &CheckinRecord,
    approver_id: &str,
) -> Result<(), AppError> {
    let academy = db::get_academy(pool, checkin.academy_id).await?;

    if academy.owner_id == approver_id {
        return Ok(());
    }

    let is_instructor_member = matches!(
        db::get_membership(pool, checkin.academy_id, approver_id)
            .await?
            .map(|m| m.role),
        Some(MembershipRole::Instructor)
    );

    let assigned_to_class = db::get_class(pool, checkin.class_id)
        .await?
        .and_then(|c| c.instructor_id)
        .is_some_and(|id| id == approver_id);

    if is_instructor_member && assigned_to_class {
        return Ok(());
    }

    warn!(
        approver_id = %approver_id,
        checkin_id = %checkin.id,
        academy_id = %checkin.academy_id,
        "Check-in transition denied"
    );

    Err(AppError::Forbidden(format!(
        "User {} may not validate check-in {}",
        approver_id, checkin.id
    )))
}

/// Pending check-ins for one academy, oldest first.
#[instrument]
pub async fn list_pending_for_academy(
    pool: &Pool<Sqlite>,
    academy_id: i64,
) -> Result<Vec<CheckinRecord>, AppError> {
    db::list_pending_for_academy(pool, academy_id).await
}

/// Pending check-ins the approver is allowed to act on. Scoping happens in
/// the query, never by filtering on the client.
#[instrument]
pub async fn list_pending_for_approver(
    pool: &Pool<Sqlite>,
    approver_id: &str,
) -> Result<Vec<CheckinRecord>, AppError> {
    db::list_pending_for_approver(pool, approver_id).await
}
