use anyhow::Error;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::roles::MembershipRole;

#[derive(Debug, Serialize, Clone)]
pub struct Academy {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub city: String,
    pub logo_url: String,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAcademy {
    pub id: Option<i64>,
    pub owner_id: Option<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub logo_url: Option<String>,
    pub invite_code: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbAcademy> for Academy {
    fn from(academy: DbAcademy) -> Self {
        Self {
            id: academy.id.unwrap_or_default(),
            owner_id: academy.owner_id.unwrap_or_default(),
            name: academy.name.unwrap_or_default(),
            city: academy.city.unwrap_or_default(),
            logo_url: academy.logo_url.unwrap_or_default(),
            invite_code: academy.invite_code.unwrap_or_default(),
            created_at: to_utc(academy.created_at),
        }
    }
}

/// Owner-supplied fields for academy creation. The invite code is never
/// caller-supplied; the registry generates it.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAcademy {
    #[validate(length(min = 1, max = 120, message = "Academy name must be 1-120 characters"))]
    pub name: String,
    #[validate(length(max = 80, message = "City must be at most 80 characters"))]
    pub city: Option<String>,
    #[validate(url(message = "Logo must be a valid URL"))]
    pub logo_url: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Membership {
    pub id: i64,
    pub academy_id: i64,
    pub user_id: String,
    pub role: MembershipRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbMembership {
    pub id: Option<i64>,
    pub academy_id: Option<i64>,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub joined_at: Option<NaiveDateTime>,
}

impl From<DbMembership> for Membership {
    fn from(membership: DbMembership) -> Self {
        Self {
            id: membership.id.unwrap_or_default(),
            academy_id: membership.academy_id.unwrap_or_default(),
            user_id: membership.user_id.unwrap_or_default(),
            role: MembershipRole::from_str(&membership.role.unwrap_or_default())
                .unwrap_or(MembershipRole::Student),
            joined_at: to_utc(membership.joined_at),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: String,
    pub rank_name: String,
    pub rank_degree: Option<i64>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbProfile {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub rank_name: Option<String>,
    pub rank_degree: Option<i64>,
}

impl From<DbProfile> for Profile {
    fn from(profile: DbProfile) -> Self {
        Self {
            user_id: profile.user_id.unwrap_or_default(),
            display_name: profile.display_name.unwrap_or_default(),
            email: profile.email.unwrap_or_default(),
            avatar_url: profile.avatar_url.unwrap_or_default(),
            rank_name: profile.rank_name.unwrap_or_default(),
            rank_degree: profile.rank_degree,
        }
    }
}

/// Membership row joined with the profile fields member lists display.
#[derive(Debug, Serialize, Clone)]
pub struct MemberSummary {
    pub membership_id: i64,
    pub academy_id: i64,
    pub user_id: String,
    pub role: MembershipRole,
    pub joined_at: DateTime<Utc>,
    pub display_name: String,
    pub email: String,
    pub avatar_url: String,
    pub rank_name: String,
    pub rank_degree: Option<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbMemberSummary {
    pub membership_id: Option<i64>,
    pub academy_id: Option<i64>,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub joined_at: Option<NaiveDateTime>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub rank_name: Option<String>,
    pub rank_degree: Option<i64>,
}

impl From<DbMemberSummary> for MemberSummary {
    fn from(summary: DbMemberSummary) -> Self {
        Self {
            membership_id: summary.membership_id.unwrap_or_default(),
            academy_id: summary.academy_id.unwrap_or_default(),
            user_id: summary.user_id.unwrap_or_default(),
            role: MembershipRole::from_str(&summary.role.unwrap_or_default())
                .unwrap_or(MembershipRole::Student),
            joined_at: to_utc(summary.joined_at),
            display_name: summary.display_name.unwrap_or_default(),
            email: summary.email.unwrap_or_default(),
            avatar_url: summary.avatar_url.unwrap_or_default(),
            rank_name: summary.rank_name.unwrap_or_default(),
            rank_degree: summary.rank_degree,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ClassSchedule {
    pub id: i64,
    pub academy_id: i64,
    pub weekday: i64,
    pub start_time: String,
    pub end_time: String,
    pub instructor_id: Option<String>,
    pub recurring: bool,
    pub start_date: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbClassSchedule {
    pub id: Option<i64>,
    pub academy_id: Option<i64>,
    pub weekday: Option<i64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub instructor_id: Option<String>,
    pub recurring: Option<bool>,
    pub start_date: Option<String>,
}

impl From<DbClassSchedule> for ClassSchedule {
    fn from(class: DbClassSchedule) -> Self {
        Self {
            id: class.id.unwrap_or_default(),
            academy_id: class.academy_id.unwrap_or_default(),
            weekday: class.weekday.unwrap_or_default(),
            start_time: class.start_time.unwrap_or_default(),
            end_time: class.end_time.unwrap_or_default(),
            instructor_id: class.instructor_id,
            recurring: class.recurring.unwrap_or_default(),
            start_date: class.start_date,
        }
    }
}

/// Fields for scheduling a class; either recurring or carrying a concrete
/// one-off start date.
#[derive(Debug, Clone, Deserialize)]
pub struct NewClassSchedule {
    pub weekday: i64,
    pub start_time: String,
    pub end_time: String,
    pub instructor_id: Option<String>,
    pub recurring: bool,
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckinStatus {
    Pending,
    Approved,
    Rejected,
}

impl CheckinStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CheckinStatus::Pending => "pending",
            CheckinStatus::Approved => "approved",
            CheckinStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(CheckinStatus::Pending),
            "approved" => Ok(CheckinStatus::Approved),
            "rejected" => Ok(CheckinStatus::Rejected),
            _ => Err(Error::msg(format!("Unknown check-in status: {}", s))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckinStatus::Approved | CheckinStatus::Rejected)
    }
}

impl fmt::Display for CheckinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct CheckinRecord {
    pub id: i64,
    pub academy_id: i64,
    pub class_id: i64,
    pub student_id: String,
    pub status: CheckinStatus,
    pub created_at: DateTime<Utc>,
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCheckinRecord {
    pub id: Option<i64>,
    pub academy_id: Option<i64>,
    pub class_id: Option<i64>,
    pub student_id: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub validated_by: Option<String>,
    pub validated_at: Option<NaiveDateTime>,
}

impl From<DbCheckinRecord> for CheckinRecord {
    fn from(checkin: DbCheckinRecord) -> Self {
        Self {
            id: checkin.id.unwrap_or_default(),
            academy_id: checkin.academy_id.unwrap_or_default(),
            class_id: checkin.class_id.unwrap_or_default(),
            student_id: checkin.student_id.unwrap_or_default(),
            // The schema CHECK constraint keeps this column to the three
            // known values.
            status: CheckinStatus::from_str(&checkin.status.unwrap_or_default())
                .unwrap_or(CheckinStatus::Pending),
            created_at: to_utc(checkin.created_at),
            validated_by: checkin.validated_by,
            validated_at: checkin
                .validated_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)),
        }
    }
}

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}
