#[cfg(test)]
mod tests {
    use crate::checkins::{
        create_checkin, list_pending_for_academy, list_pending_for_approver, update_status,
    };
    use crate::database::db::get_checkin;
    use crate::error::AppError;
    use crate::models::CheckinStatus;
    use crate::registry::remove_member;
    use crate::test::utils::test_db::{TestDb, TestDbBuilder};

    async fn academy_with_class() -> TestDb {
        TestDbBuilder::new()
            .academy("Dojo Central", "ana")
            .instructor("Dojo Central", "carla")
            .student("Dojo Central", "bruno")
            .class("evening", "Dojo Central", 2, Some("carla"))
            .build()
            .await
            .expect("Failed to build test database")
    }

    #[tokio::test]
    async fn test_checkin_is_created_pending() {
        let mut test_db = academy_with_class().await;

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");

        let checkin = create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("Failed to create check-in");

        assert_eq!(checkin.status, CheckinStatus::Pending);
        assert_eq!(checkin.student_id, bruno);
        assert!(checkin.validated_by.is_none());
        assert!(checkin.validated_at.is_none());
    }

    #[tokio::test]
    async fn test_checkin_requires_existing_class_in_academy() {
        let mut test_db = academy_with_class().await;

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");

        let missing =
            create_checkin(&test_db.pool, &test_db.config, academy_id, 999, &bruno).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let wrong_academy =
            create_checkin(&test_db.pool, &test_db.config, academy_id + 1, class_id, &bruno).await;
        assert!(matches!(wrong_academy, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicate_checkins_tolerated_by_default() {
        let mut test_db = academy_with_class().await;

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");

        create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("First check-in should succeed");
        create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("Duplicate check-in is tolerated in compatibility mode");

        let pending = list_pending_for_academy(&test_db.pool, academy_id)
            .await
            .expect("Failed to list pending");
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn test_dedupe_mode_rejects_same_day_duplicates() {
        let mut test_db = TestDbBuilder::new()
            .academy("Dojo Central", "ana")
            .class("evening", "Dojo Central", 2, Some("carla"))
            .dedupe_checkins(true)
            .build()
            .await
            .expect("Failed to build test database");

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");

        create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("First check-in should succeed");

        let duplicate =
            create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        let pending = list_pending_for_academy(&test_db.pool, academy_id)
            .await
            .expect("Failed to list pending");
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_same_day_checkins_race_in_dedupe_mode() {
        let mut test_db = TestDbBuilder::new()
            .academy("Dojo Central", "ana")
            .class("evening", "Dojo Central", 2, Some("carla"))
            .dedupe_checkins(true)
            .build()
            .await
            .expect("Failed to build test database");

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");

        // Both submissions pass the existence check before either inserts;
        // the unique index must still let only one through.
        let (first, second) = tokio::join!(
            create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno),
            create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno),
        );

        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one same-day submission may land");

        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(AppError::Conflict(_))));

        let pending = list_pending_for_academy(&test_db.pool, academy_id)
            .await
            .expect("Failed to list pending");
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_assigned_instructor_approves_then_conflict() {
        let mut test_db = academy_with_class().await;

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");
        let carla = test_db.user_id("carla");

        let checkin = create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("Failed to create check-in");

        let approved = update_status(&test_db.pool, checkin.id, CheckinStatus::Approved, &carla)
            .await
            .expect("Assigned instructor should be allowed to approve");

        assert_eq!(approved.status, CheckinStatus::Approved);
        assert_eq!(approved.validated_by.as_deref(), Some(carla.as_str()));
        assert!(approved.validated_at.is_some());

        let again =
            update_status(&test_db.pool, checkin.id, CheckinStatus::Approved, &carla).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let rejected_late =
            update_status(&test_db.pool, checkin.id, CheckinStatus::Rejected, &carla).await;
        assert!(matches!(rejected_late, Err(AppError::Conflict(_))));

        // The record is untouched by the failed transitions.
        let stored = get_checkin(&test_db.pool, checkin.id)
            .await
            .expect("Failed to fetch check-in")
            .expect("Check-in should exist");
        assert_eq!(stored.status, CheckinStatus::Approved);
        assert_eq!(stored.validated_by.as_deref(), Some(carla.as_str()));
    }

    #[tokio::test]
    async fn test_owner_can_reject() {
        let mut test_db = academy_with_class().await;

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");
        let ana = test_db.user_id("ana");

        let checkin = create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("Failed to create check-in");

        let rejected = update_status(&test_db.pool, checkin.id, CheckinStatus::Rejected, &ana)
            .await
            .expect("Owner should be allowed to reject");

        assert_eq!(rejected.status, CheckinStatus::Rejected);
        assert_eq!(rejected.validated_by.as_deref(), Some(ana.as_str()));
    }

    #[tokio::test]
    async fn test_unauthorized_approvers_are_forbidden() {
        let mut test_db = TestDbBuilder::new()
            .academy("Dojo Central", "ana")
            .instructor("Dojo Central", "carla")
            .instructor("Dojo Central", "diego")
            .student("Dojo Central", "bruno")
            .class("evening", "Dojo Central", 2, Some("carla"))
            .build()
            .await
            .expect("Failed to build test database");

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");
        let diego = test_db.user_id("diego");
        let stranger = test_db.user_id("stranger");

        let checkin = create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("Failed to create check-in");

        // Not a member at all.
        let result =
            update_status(&test_db.pool, checkin.id, CheckinStatus::Approved, &stranger).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        // Instructor in the academy, but not assigned to this class.
        let result =
            update_status(&test_db.pool, checkin.id, CheckinStatus::Approved, &diego).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        // The student cannot validate their own claim.
        let result =
            update_status(&test_db.pool, checkin.id, CheckinStatus::Approved, &bruno).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let stored = get_checkin(&test_db.pool, checkin.id)
            .await
            .expect("Failed to fetch check-in")
            .expect("Check-in should exist");
        assert_eq!(stored.status, CheckinStatus::Pending);
        assert!(stored.validated_by.is_none());
    }

    #[tokio::test]
    async fn test_update_status_input_errors() {
        let mut test_db = academy_with_class().await;
        let carla = test_db.user_id("carla");

        let missing =
            update_status(&test_db.pool, 999, CheckinStatus::Approved, &carla).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let not_terminal =
            update_status(&test_db.pool, 999, CheckinStatus::Pending, &carla).await;
        assert!(matches!(not_terminal, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_concurrent_approvals_race_one_winner() {
        let mut test_db = academy_with_class().await;

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");
        let ana = test_db.user_id("ana");
        let carla = test_db.user_id("carla");

        let checkin = create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("Failed to create check-in");

        // Owner and assigned instructor act at the same time.
        let (owner_result, instructor_result) = tokio::join!(
            update_status(&test_db.pool, checkin.id, CheckinStatus::Approved, &ana),
            update_status(&test_db.pool, checkin.id, CheckinStatus::Rejected, &carla),
        );

        let successes = [&owner_result, &instructor_result]
            .iter()
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(successes, 1, "exactly one transition may win");

        let loser = if owner_result.is_ok() {
            instructor_result
        } else {
            owner_result
        };
        assert!(matches!(&loser, Err(AppError::Conflict(_))));
        if let Err(err) = loser {
            assert!(!err.is_retryable(), "a lost race must not be retried blindly");
        }

        let stored = get_checkin(&test_db.pool, checkin.id)
            .await
            .expect("Failed to fetch check-in")
            .expect("Check-in should exist");
        assert!(stored.status.is_terminal());
        assert!(stored.validated_by.is_some());
    }

    #[tokio::test]
    async fn test_pending_projections_are_scoped_to_the_approver() {
        let mut test_db = TestDbBuilder::new()
            .academy("Dojo Central", "ana")
            .academy("Rival Gym", "diego")
            .instructor("Dojo Central", "carla")
            .student("Dojo Central", "bruno")
            .class("evening", "Dojo Central", 2, Some("carla"))
            .class("morning", "Dojo Central", 3, None)
            .class("rival", "Rival Gym", 4, None)
            .build()
            .await
            .expect("Failed to build test database");

        let dojo = test_db.academy_id("Dojo Central").expect("Academy missing");
        let rival = test_db.academy_id("Rival Gym").expect("Academy missing");
        let evening = test_db.class_id("evening").expect("Class missing");
        let morning = test_db.class_id("morning").expect("Class missing");
        let rival_class = test_db.class_id("rival").expect("Class missing");
        let bruno = test_db.user_id("bruno");
        let ana = test_db.user_id("ana");
        let carla = test_db.user_id("carla");

        create_checkin(&test_db.pool, &test_db.config, dojo, evening, &bruno)
            .await
            .expect("Failed to create check-in");
        create_checkin(&test_db.pool, &test_db.config, dojo, morning, &bruno)
            .await
            .expect("Failed to create check-in");
        create_checkin(&test_db.pool, &test_db.config, rival, rival_class, &bruno)
            .await
            .expect("Failed to create check-in");

        let academy_pending = list_pending_for_academy(&test_db.pool, dojo)
            .await
            .expect("Failed to list pending");
        assert_eq!(academy_pending.len(), 2);

        // Owner sees everything in their academy, nothing in the rival's.
        let owner_pending = list_pending_for_approver(&test_db.pool, &ana)
            .await
            .expect("Failed to list pending for owner");
        assert_eq!(owner_pending.len(), 2);
        assert!(owner_pending.iter().all(|c| c.academy_id == dojo));

        // Instructor sees only the class they are assigned to.
        let instructor_pending = list_pending_for_approver(&test_db.pool, &carla)
            .await
            .expect("Failed to list pending for instructor");
        assert_eq!(instructor_pending.len(), 1);
        assert_eq!(instructor_pending[0].class_id, evening);

        let student_pending = list_pending_for_approver(&test_db.pool, &bruno)
            .await
            .expect("Failed to list pending for student");
        assert!(student_pending.is_empty());
    }

    #[tokio::test]
    async fn test_removed_instructor_loses_pending_projection() {
        let mut test_db = academy_with_class().await;

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");
        let carla = test_db.user_id("carla");

        create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("Failed to create check-in");

        let before = list_pending_for_approver(&test_db.pool, &carla)
            .await
            .expect("Failed to list pending for instructor");
        assert_eq!(before.len(), 1);

        remove_member(&test_db.pool, academy_id, &carla)
            .await
            .expect("Removal should succeed");

        // Still assigned on the class row, but no longer a member: the
        // projection must match what a transition would authorize.
        let after = list_pending_for_approver(&test_db.pool, &carla)
            .await
            .expect("Failed to list pending for former instructor");
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn test_member_removal_leaves_checkin_history() {
        let mut test_db = academy_with_class().await;

        let academy_id = test_db.academy_id("Dojo Central").expect("Academy missing");
        let class_id = test_db.class_id("evening").expect("Class missing");
        let bruno = test_db.user_id("bruno");

        let checkin = create_checkin(&test_db.pool, &test_db.config, academy_id, class_id, &bruno)
            .await
            .expect("Failed to create check-in");

        remove_member(&test_db.pool, academy_id, &bruno)
            .await
            .expect("Removal should succeed");

        // Attendance history must survive the membership.
        let stored = get_checkin(&test_db.pool, checkin.id)
            .await
            .expect("Failed to fetch check-in");
        assert!(stored.is_some());
    }
}
