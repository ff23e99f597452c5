#[cfg(test)]
pub mod test_db {
    use crate::database::db::setup_database_with;
    use crate::env::CoreConfig;
    use crate::error::AppError;
    use crate::models::{NewAcademy, NewClassSchedule, Profile};
    use crate::ranks::ADULT_SCALE;
    use crate::registry;
    use crate::roles::MembershipRole;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;
    use uuid::Uuid;

    static INIT: Once = Once::new();

    #[derive(Default)]
    pub struct TestDbBuilder {
        academies: Vec<TestAcademy>,
        members: Vec<TestMember>,
        classes: Vec<TestClass>,
        profiles: Vec<TestProfile>,
        dedupe_checkins: bool,
    }

    struct TestAcademy {
        name: String,
        owner: String,
        city: Option<String>,
    }

    struct TestMember {
        academy_name: String,
        user: String,
        role: MembershipRole,
    }

    struct TestClass {
        label: String,
        academy_name: String,
        weekday: i64,
        instructor: Option<String>,
    }

    struct TestProfile {
        user: String,
        display_name: String,
        email: String,
        rank_name: String,
        rank_degree: Option<i64>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn academy(mut self, name: &str, owner: &str) -> Self {
            self.academies.push(TestAcademy {
                name: name.to_string(),
                owner: owner.to_string(),
                city: Some("Testville".to_string()),
            });
            self
        }

        pub fn student(mut self, academy_name: &str, user: &str) -> Self {
            self.members.push(TestMember {
                academy_name: academy_name.to_string(),
                user: user.to_string(),
                role: MembershipRole::Student,
            });
            self
        }

        pub fn instructor(mut self, academy_name: &str, user: &str) -> Self {
            self.members.push(TestMember {
                academy_name: academy_name.to_string(),
                user: user.to_string(),
                role: MembershipRole::Instructor,
            });
            self
        }

        pub fn class(
            mut self,
            label: &str,
            academy_name: &str,
            weekday: i64,
            instructor: Option<&str>,
        ) -> Self {
            self.classes.push(TestClass {
                label: label.to_string(),
                academy_name: academy_name.to_string(),
                weekday,
                instructor: instructor.map(String::from),
            });
            self
        }

        pub fn profile(
            mut self,
            user: &str,
            display_name: &str,
            email: &str,
            rank_name: &str,
            rank_degree: Option<i64>,
        ) -> Self {
            self.profiles.push(TestProfile {
                user: user.to_string(),
                display_name: display_name.to_string(),
                email: email.to_string(),
                rank_name: rank_name.to_string(),
                rank_degree,
            });
            self
        }

        pub fn dedupe_checkins(mut self, on: bool) -> Self {
            self.dedupe_checkins = on;
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            let config = CoreConfig::default().with_dedupe(self.dedupe_checkins);
            let pool = setup_database_with(&config).await?;

            let mut user_id_map: HashMap<String, String> = HashMap::new();
            let mut academy_id_map: HashMap<String, i64> = HashMap::new();
            let mut class_id_map: HashMap<String, i64> = HashMap::new();

            for academy in &self.academies {
                let owner_id = mint_user(&mut user_id_map, &academy.owner);

                let created = registry::create_academy(
                    &pool,
                    &owner_id,
                    NewAcademy {
                        name: academy.name.clone(),
                        city: academy.city.clone(),
                        logo_url: None,
                    },
                )
                .await?;

                academy_id_map.insert(academy.name.clone(), created.id);
            }

            for member in &self.members {
                let academy_id = academy_id_map[&member.academy_name];
                let user_id = mint_user(&mut user_id_map, &member.user);

                registry::add_member(&pool, academy_id, &user_id, member.role).await?;
            }

            for class in &self.classes {
                let academy_id = academy_id_map[&class.academy_name];
                let instructor_id = class
                    .instructor
                    .as_ref()
                    .map(|label| mint_user(&mut user_id_map, label));

                let created = registry::create_class(
                    &pool,
                    academy_id,
                    NewClassSchedule {
                        weekday: class.weekday,
                        start_time: "18:00".to_string(),
                        end_time: "19:30".to_string(),
                        instructor_id,
                        recurring: true,
                        start_date: None,
                    },
                )
                .await?;

                class_id_map.insert(class.label.clone(), created.id);
            }

            for profile in &self.profiles {
                let user_id = mint_user(&mut user_id_map, &profile.user);

                registry::save_profile(
                    &pool,
                    &ADULT_SCALE,
                    Profile {
                        user_id,
                        display_name: profile.display_name.clone(),
                        email: profile.email.clone(),
                        avatar_url: String::new(),
                        rank_name: profile.rank_name.clone(),
                        rank_degree: profile.rank_degree,
                    },
                )
                .await?;
            }

            Ok(TestDb {
                pool,
                config,
                user_id_map,
                academy_id_map,
                class_id_map,
            })
        }
    }

    fn mint_user(map: &mut HashMap<String, String>, label: &str) -> String {
        map.entry(label.to_string())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub config: CoreConfig,
        pub user_id_map: HashMap<String, String>,
        pub academy_id_map: HashMap<String, i64>,
        pub class_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        /// Mints an id for a user label that was never seeded, so tests can
        /// refer to strangers too.
        pub fn user_id(&mut self, label: &str) -> String {
            mint_user(&mut self.user_id_map, label)
        }

        pub fn academy_id(&self, name: &str) -> Option<i64> {
            self.academy_id_map.get(name).copied()
        }

        pub fn class_id(&self, label: &str) -> Option<i64> {
            self.class_id_map.get(label).copied()
        }
    }
}
