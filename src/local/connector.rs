//! Connector for local sessions.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::backend::{Connector, Joined};
use crate::error::SessionError;
use crate::session::SessionParams;
use crate::types::SessionId;

use super::model::Model;
use super::reflector::LocalReflector;
use super::view::LocalSession;

struct ConnectorInner<M: Model> {
    factory: Box<dyn Fn(&SessionParams) -> M>,
    sessions: RefCell<BTreeMap<(String, String), LocalReflector<M>>>,
}

/// Joins local sessions, creating each one on first join.
///
/// Sessions are keyed by `(app_id, name)`; the first join builds the model
/// with the factory and fixes the session password. Cloning creates a new
/// handle to the **same** set of sessions.
pub struct LocalConnector<M: Model> {
    inner: Rc<ConnectorInner<M>>,
}

impl<M: Model> Clone for LocalConnector<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M: Model> fmt::Debug for LocalConnector<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConnector")
            .field("sessions", &self.inner.sessions.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<M: Model> LocalConnector<M> {
    pub fn new(factory: impl Fn(&SessionParams) -> M + 'static) -> Self {
        Self {
            inner: Rc::new(ConnectorInner {
                factory: Box::new(factory),
                sessions: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// The session `name` of `app_id`, if anyone joined it.
    pub fn reflector(&self, app_id: &str, name: &str) -> Option<LocalReflector<M>> {
        let key = (app_id.to_string(), name.to_string());
        self.inner.sessions.borrow().get(&key).cloned()
    }

    /// Pump every session. Returns the number of envelopes processed.
    pub fn pump_all(&self) -> usize {
        let sessions: Vec<LocalReflector<M>> = self.inner.sessions.borrow().values().cloned().collect();
        sessions.iter().map(LocalReflector::pump).sum()
    }

    fn session_for(&self, params: &SessionParams) -> Result<LocalReflector<M>, SessionError> {
        let key = (params.app_id.clone(), params.name.clone());
        let existing = self.inner.sessions.borrow().get(&key).cloned();
        if let Some(reflector) = existing {
            return Ok(reflector);
        }

        let model = (self.inner.factory)(params);
        let id = SessionId::new(format!("{}/{}", params.app_id, params.name));
        let reflector = LocalReflector::with_password(id, model, params.password.clone())?;
        self.inner.sessions.borrow_mut().insert(key, reflector.clone());
        Ok(reflector)
    }
}

impl<M: Model> Connector<M> for LocalConnector<M> {
    fn join(&self, params: &SessionParams) -> Result<Joined<M>, SessionError> {
        params.validate()?;
        let reflector = self.session_for(params)?;

        if reflector.password() != params.password.as_deref() {
            return Err(SessionError::JoinFailed {
                name: params.name.clone(),
                reason: "wrong session password".to_string(),
            });
        }

        let view = reflector.connect_view(params.view_data.clone());
        let session = LocalSession::new(
            reflector.session_id().clone(),
            view.info().view_id.clone(),
            reflector.outbox(),
        );

        Ok(Joined {
            session: Rc::new(session),
            view,
            model: reflector.model(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Empty;

    impl Model for Empty {}

    #[test]
    fn test_joins_share_a_session_by_name() {
        let connector = LocalConnector::new(|_| Empty);
        let params = SessionParams::new("app", "room");

        let a = connector.join(&params).unwrap();
        let b = connector.join(&params).unwrap();
        let other = connector.join(&params.clone().with_name("lobby")).unwrap();

        assert!(a.model.ptr_eq(&b.model));
        assert!(!a.model.ptr_eq(&other.model));
        assert_ne!(a.view.view_id(), b.view.view_id());
        assert_eq!(a.session.id().as_str(), "app/room");
        assert_eq!(connector.reflector("app", "room").map(|r| r.views().len()), Some(2));
    }

    #[test]
    fn test_reflector_lookup_uses_app_and_name() {
        let connector = LocalConnector::new(|_| Empty);
        let chat = connector.join(&SessionParams::new("chat", "room")).unwrap();
        let game = connector.join(&SessionParams::new("game", "room")).unwrap();
        assert!(!chat.model.ptr_eq(&game.model));

        let chat_room = connector.reflector("chat", "room").unwrap();
        let game_room = connector.reflector("game", "room").unwrap();
        assert_eq!(chat_room.session_id().as_str(), "chat/room");
        assert_eq!(game_room.session_id().as_str(), "game/room");
        assert!(connector.reflector("other", "room").is_none());
        assert!(connector.reflector("chat", "lobby").is_none());
    }

    #[test]
    fn test_password_is_fixed_by_first_join() {
        let connector = LocalConnector::new(|_| Empty);
        let params = SessionParams::new("app", "room").with_password("secret");
        connector.join(&params).unwrap();

        let err = connector
            .join(&SessionParams::new("app", "room").with_password("guess"))
            .unwrap_err();
        assert!(matches!(err, SessionError::JoinFailed { .. }));
    }

    #[test]
    fn test_leave_removes_view() {
        let connector = LocalConnector::new(|_| Empty);
        let joined = connector.join(&SessionParams::new("app", "room")).unwrap();
        let reflector = connector.reflector("app", "room").unwrap();
        assert_eq!(reflector.views().len(), 1);

        joined.session.leave();
        joined.session.leave();
        assert!(reflector.views().is_empty());
        assert_eq!(connector.pump_all(), 3, "join, sync and exit");
    }
}
