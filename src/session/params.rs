//! Session parameters - what a [`Connector`](crate::backend::Connector) needs to join.
//!
//! Parameters are plain data: build them with the `with_*` methods, or load
//! them from JSON (`SessionParams::from_json`). Changing sessions at runtime
//! merges a [`ChangeSessionParams`] over the current parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;

/// Parameters used to join a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    /// Application identifier, e.g. `io.example.counter`.
    pub app_id: String,
    /// API key issued for the application.
    pub api_key: String,
    /// Session name. Clients joining the same name share a session.
    pub name: String,
    /// Session password, used by the backend to derive the encryption key.
    pub password: Option<String>,
    /// Simulation ticks per second requested from the reflector.
    pub tps: Option<f64>,
    /// Maximum events per second a view may publish.
    pub event_rate_limit: Option<u32>,
    /// Whether the root model keeps a registry of joined views.
    pub track_views: bool,
    /// Application data attached to this view's join announcement.
    pub view_data: Option<Value>,
    /// Backend-specific options passed through unchanged.
    pub options: Option<Value>,
}

impl SessionParams {
    pub fn new(app_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse parameters from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        serde_json::from_str(json).map_err(|e| SessionError::InvalidParams {
            reason: e.to_string(),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_tps(mut self, tps: f64) -> Self {
        self.tps = Some(tps);
        self
    }

    pub fn with_event_rate_limit(mut self, limit: u32) -> Self {
        self.event_rate_limit = Some(limit);
        self
    }

    pub fn with_track_views(mut self, track_views: bool) -> Self {
        self.track_views = track_views;
        self
    }

    pub fn with_view_data(mut self, view_data: Value) -> Self {
        self.view_data = Some(view_data);
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Check the parameters a backend cannot do without.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.app_id.trim().is_empty() {
            return Err(SessionError::InvalidParams {
                reason: "app_id must not be empty".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(SessionError::InvalidParams {
                reason: "name must not be empty".to_string(),
            });
        }
        if let Some(tps) = self.tps {
            if !(tps.is_finite() && tps > 0.0) {
                return Err(SessionError::InvalidParams {
                    reason: format!("tps must be a positive number, got {tps}"),
                });
            }
        }
        if self.event_rate_limit == Some(0) {
            return Err(SessionError::InvalidParams {
                reason: "event_rate_limit must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Apply a session change. Fields not provided keep their current value.
    pub fn merged(&self, change: &ChangeSessionParams) -> Self {
        let mut next = self.clone();
        if let Some(name) = &change.name {
            next.name = name.clone();
        }
        if let Some(password) = &change.password {
            next.password = Some(password.clone());
        }
        next
    }
}

/// The parts of [`SessionParams`] that can change while mounted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSessionParams {
    pub name: Option<String>,
    pub password: Option<String>,
}

impl ChangeSessionParams {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
