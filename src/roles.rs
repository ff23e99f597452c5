use anyhow::Error;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    EditOwnProfile,
    ViewSchedule,
    SubmitCheckin,

    ViewMembers,
    ApproveAssignedCheckins,

    ApproveAcademyCheckins,
    ManageClasses,
    ManageMembers,
    ManageAcademy,
}

/// Role a membership row carries. Ownership is not a membership; see
/// `EffectiveRole`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Instructor,
    Student,
}

impl MembershipRole {
    pub fn as_str(&self) -> &str {
        match self {
            MembershipRole::Instructor => "instructor",
            MembershipRole::Student => "student",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "instructor" => Ok(MembershipRole::Instructor),
            "student" => Ok(MembershipRole::Student),
            _ => Err(Error::msg(format!("Unknown membership role: {}", s))),
        }
    }
}

impl fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's single derived role, never persisted. `Owner` comes from owning
/// an academy, not from a membership row, and wins over any membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveRole {
    Owner,
    Instructor,
    Student,
    None,
}

/// Minimal membership projection role resolution works over, in the order
/// the store returned the rows.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipRecord {
    pub academy_id: i64,
    pub role: MembershipRole,
}

/// Derives the single effective role for a user.
///
/// Precedence is fixed: ownership beats every membership row, and when the
/// user holds memberships in several academies the FIRST row in store order
/// wins. That last part is a compatibility quirk, not a business rule; it is
/// kept behind this one function so an explicit "active academy" selector
/// can replace it later without touching call sites.
pub fn resolve_role(owns_academy: bool, memberships: &[MembershipRecord]) -> EffectiveRole {
    if owns_academy {
        return EffectiveRole::Owner;
    }

    match memberships.first().map(|m| m.role) {
        Some(MembershipRole::Instructor) => EffectiveRole::Instructor,
        Some(MembershipRole::Student) => EffectiveRole::Student,
        None => EffectiveRole::None,
    }
}

static NO_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(HashSet::new);

static STUDENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);
    permissions.insert(Permission::ViewSchedule);
    permissions.insert(Permission::SubmitCheckin);

    permissions
});

static INSTRUCTOR_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(STUDENT_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewMembers);
    permissions.insert(Permission::ApproveAssignedCheckins);

    permissions
});

static OWNER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(INSTRUCTOR_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ApproveAcademyCheckins);
    permissions.insert(Permission::ManageClasses);
    permissions.insert(Permission::ManageMembers);
    permissions.insert(Permission::ManageAcademy);

    permissions
});

impl EffectiveRole {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            EffectiveRole::Owner => &OWNER_PERMISSIONS,
            EffectiveRole::Instructor => &INSTRUCTOR_PERMISSIONS,
            EffectiveRole::Student => &STUDENT_PERMISSIONS,
            EffectiveRole::None => &NO_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            EffectiveRole::Owner => "owner",
            EffectiveRole::Instructor => "instructor",
            EffectiveRole::Student => "student",
            EffectiveRole::None => "none",
        }
    }
}

impl fmt::Display for EffectiveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<MembershipRole> for EffectiveRole {
    fn from(role: MembershipRole) -> Self {
        match role {
            MembershipRole::Instructor => EffectiveRole::Instructor,
            MembershipRole::Student => EffectiveRole::Student,
        }
    }
}
