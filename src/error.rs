use thiserror::Error;

/// Errors surfaced by the session bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A hook was used outside of a session provider
    #[error("`{hook}` was called outside of a session provider. Wrap the component in `SessionRoot::provide`")]
    MissingContext { hook: &'static str },

    /// An imperative operation was attempted while no session is joined
    #[error("`{operation}` requires a joined session, but no session is active")]
    NoSession { operation: &'static str },

    /// The root model does not track joined views
    #[error("The root model is not tracking joined views. Set `track_views: true` in the session parameters and expose a view registry from the model")]
    ViewsNotTracked,

    /// A model subscribed directly to an event the bindings handle themselves
    #[error("Models cannot subscribe directly to `{event}`. Override `{handler}` instead")]
    ReservedEvent { event: String, handler: &'static str },

    /// Session parameters failed validation
    #[error("Invalid session parameters: {reason}")]
    InvalidParams { reason: String },

    /// The backend refused or failed to join the session
    #[error("Failed to join session `{name}`: {reason}")]
    JoinFailed { name: String, reason: String },

    /// An event payload could not be converted to or from its wire form
    #[error("Payload for `{scope}`/`{event}` could not be converted: {reason}")]
    Payload {
        scope: String,
        event: String,
        reason: String,
    },
}
