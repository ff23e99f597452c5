use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::registry;
use crate::roles::EffectiveRole;

/// Auth state changes the identity gateway notifies about. The core only
/// ever consumes a stable user id and email from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { user_id: String, email: String },
    TokenRefreshed { user_id: String, email: String },
    SignedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub user: Option<SessionUser>,
    pub role: EffectiveRole,
}

impl SessionState {
    pub fn signed_out() -> Self {
        Self {
            user: None,
            role: EffectiveRole::None,
        }
    }
}

/// Explicit session state, replacing ambient globals.
///
/// Every auth event re-resolves the effective role against the store and
/// publishes the result on a watch channel. Resolution is single-flight per
/// session: each event bumps a generation counter, and a resolution only
/// publishes if its generation is still current. A superseded resolution's
/// result is discarded; there is no other cancellation model.
#[derive(Debug)]
pub struct SessionContext {
    pool: Pool<Sqlite>,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
}

impl SessionContext {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        let (state, _) = watch::channel(SessionState::signed_out());

        Self {
            pool,
            state,
            generation: AtomicU64::new(0),
        }
    }

    /// Subscribes to session state changes. Dropping the receiver is the
    /// unsubscribe.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[instrument(skip(self))]
    pub async fn handle_auth_event(&self, event: AuthEvent) -> Result<EffectiveRole, AppError> {
        info!("Handling auth event");
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        match event {
            AuthEvent::SignedOut => {
                self.publish(generation, SessionState::signed_out());
                Ok(EffectiveRole::None)
            }
            AuthEvent::SignedIn { user_id, email } | AuthEvent::TokenRefreshed { user_id, email } => {
                let role = registry::effective_role_for_user(&self.pool, &user_id).await?;

                let state = SessionState {
                    user: Some(SessionUser {
                        id: user_id,
                        email,
                    }),
                    role,
                };

                if !self.publish(generation, state) {
                    debug!(generation = %generation, "Discarding superseded role resolution");
                }

                Ok(role)
            }
        }
    }

    fn publish(&self, generation: u64, state: SessionState) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }

        self.state.send_replace(state);
        true
    }

    /// Test hook: bumps the generation as a newer auth event would, without
    /// touching the store.
    #[cfg(test)]
    pub(crate) fn supersede(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[cfg(test)]
    pub(crate) fn publish_at(&self, generation: u64, state: SessionState) -> bool {
        self.publish(generation, state)
    }
}
