//! Joined-views hook.

use std::rc::Rc;

use crate::backend::TracksViews;
use crate::bridge::{ModelWatch, WatchOptions};
use crate::error::SessionError;
use crate::session::current_context;
use crate::types::{events, JoinedViews};

use super::selector::watch;

/// Watch the views joined to the session.
///
/// Re-evaluates on `views-updated` rather than on every state change. Fails
/// with [`SessionError::ViewsNotTracked`] when the attached model keeps no
/// view registry. A watch created before joining cannot know that yet; it
/// stays unavailable for as long as the attached model is not tracking.
pub fn use_joined_views<M>() -> Result<ModelWatch<JoinedViews>, SessionError>
where
    M: TracksViews + 'static,
{
    let ctx = current_context::<M>("use_joined_views")?;

    let tracked = ctx.model().map(|model| model.read(|m| m.joined_views().is_some()));
    if tracked == Some(false) {
        return Err(SessionError::ViewsNotTracked);
    }

    Ok(watch(
        &ctx,
        WatchOptions::on_event(events::VIEWS_UPDATED),
        Rc::new(|m: &M| m.joined_views().map(JoinedViews::from)),
    ))
}
