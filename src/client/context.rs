use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::state::session::JoinCode;

/// Who this client is and which session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Internal session id, used for host-side reads.
    pub session_id: Uuid,
    /// Public join code, used for player-side reads.
    pub join_code: JoinCode,
    /// Name this client plays under.
    pub player_name: String,
    /// Whether this client created the session.
    pub is_host: bool,
}

impl SessionContext {
    /// Context of the client that hosts the session.
    pub fn host(session_id: Uuid, join_code: JoinCode, player_name: impl Into<String>) -> Self {
        Self {
            session_id,
            join_code,
            player_name: player_name.into(),
            is_host: true,
        }
    }

    /// Context of a client that joined through the code.
    pub fn player(session_id: Uuid, join_code: JoinCode, player_name: impl Into<String>) -> Self {
        Self {
            session_id,
            join_code,
            player_name: player_name.into(),
            is_host: false,
        }
    }
}

/// Holder of the current [`SessionContext`], with an explicit teardown point.
///
/// Clones share the same slot; subscribers see every enter and leave.
#[derive(Clone)]
pub struct ContextSlot {
    current: watch::Sender<Option<SessionContext>>,
}

impl Default for ContextSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextSlot {
    /// Empty slot.
    pub fn new() -> Self {
        let (current, _rx) = watch::channel(None);
        Self { current }
    }

    /// Store `context`, returning the one it replaces.
    pub fn enter(&self, context: SessionContext) -> Option<SessionContext> {
        debug!(
            session_id = %context.session_id,
            player = %context.player_name,
            "entering session"
        );
        self.current.send_replace(Some(context))
    }

    /// Copy of the current context.
    pub fn current(&self) -> Option<SessionContext> {
        self.current.borrow().clone()
    }

    /// Clear the slot, returning what it held.
    pub fn leave(&self) -> Option<SessionContext> {
        let previous = self.current.send_replace(None);
        if let Some(context) = &previous {
            debug!(
                session_id = %context.session_id,
                player = %context.player_name,
                "left session"
            );
        }
        previous
    }

    /// Watch enters and leaves.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionContext>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(name: &str) -> SessionContext {
        SessionContext::player(Uuid::new_v4(), JoinCode::parse("ABC123").unwrap(), name)
    }

    #[test]
    fn enter_replaces_and_leave_clears() {
        let slot = ContextSlot::new();
        assert_eq!(slot.enter(context("Ava")), None);

        let previous = slot.enter(context("Ben")).unwrap();
        assert_eq!(previous.player_name, "Ava");
        assert_eq!(slot.current().unwrap().player_name, "Ben");

        assert_eq!(slot.leave().unwrap().player_name, "Ben");
        assert_eq!(slot.current(), None);
        assert_eq!(slot.leave(), None);
    }

    #[test]
    fn clones_share_the_slot() {
        let slot = ContextSlot::new();
        let mut watcher = slot.subscribe();
        let other = slot.clone();

        other.enter(context("Ava"));
        assert!(watcher.has_changed().unwrap());
        assert_eq!(
            watcher.borrow_and_update().as_ref().map(|c| c.is_host),
            Some(false)
        );
        assert_eq!(slot.current().unwrap().player_name, "Ava");
    }
}
