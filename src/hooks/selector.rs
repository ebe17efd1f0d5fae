//! Selector hooks - watch a slice of the replicated model.

use std::hash::Hash;
use std::rc::Rc;

use spark_signals::effect;

use crate::backend::{ModelHandle, ModelLookup};
use crate::bridge::{evaluate_partial, ModelWatch, PartialSelector, WatchCore, WatchOptions};
use crate::error::SessionError;
use crate::session::{current_context, SessionContext};

/// Watch `selector` over the root model of the nearest session.
///
/// The returned [`ModelWatch`] starts with the selector's result against
/// whatever root is available right now, or `None` if no session is
/// attached. It re-evaluates at most once per frame after each
/// `state-updated` notification and signals a re-render only when the
/// selected value's fingerprint changes.
///
/// ```ignore
/// let count = root.provide(|| use_model_selector(|m: &Counter| m.count))?;
/// effect(move || {
///     if let Some(count) = count.get() {
///         println!("count is {count}");
///     }
/// });
/// ```
pub fn use_model_selector<M, R, F>(selector: F) -> Result<ModelWatch<R>, SessionError>
where
    M: 'static,
    R: Hash + 'static,
    F: Fn(&M) -> R + 'static,
{
    let ctx = current_context::<M>("use_model_selector")?;
    Ok(watch(&ctx, WatchOptions::default(), Rc::new(move |m: &M| Some(selector(m)))))
}

/// [`use_model_selector`] with an explicit cadence or notification event.
pub fn use_model_selector_with<M, R, F>(
    options: WatchOptions,
    selector: F,
) -> Result<ModelWatch<R>, SessionError>
where
    M: 'static,
    R: Hash + 'static,
    F: Fn(&M) -> R + 'static,
{
    let ctx = current_context::<M>("use_model_selector_with")?;
    Ok(watch(&ctx, options, Rc::new(move |m: &M| Some(selector(m)))))
}

/// The root model of the nearest session, tracked on attachment changes.
pub fn use_model_root<M: 'static>() -> Result<Option<ModelHandle<M>>, SessionError> {
    let ctx = current_context::<M>("use_model_root")?;
    ctx.core.track();
    Ok(ctx.model())
}

/// Watch the sub-object `id` of the root model.
pub fn use_model_by_id<M>(id: impl Into<String>) -> Result<ModelWatch<Option<M::Entry>>, SessionError>
where
    M: ModelLookup + 'static,
    M::Entry: Hash + 'static,
{
    let ctx = current_context::<M>("use_model_by_id")?;
    let id = id.into();
    Ok(watch(
        &ctx,
        WatchOptions::default(),
        Rc::new(move |m: &M| Some(m.lookup(&id))),
    ))
}

/// Build a watch that follows the context's attachment.
///
/// The selector's `None` reads as unavailable, like a missing session.
pub(crate) fn watch<M, R>(
    ctx: &SessionContext<M>,
    options: WatchOptions,
    selector: PartialSelector<M, R>,
) -> ModelWatch<R>
where
    M: 'static,
    R: Hash + 'static,
{
    let initial = evaluate_partial(ctx.model().as_ref(), &*selector);
    let core = WatchCore::new(selector, initial, options, ctx.scheduler());
    let trigger = Rc::clone(core.trigger());

    let weak = Rc::downgrade(&core);
    let ctx = ctx.clone();
    let stop = effect(move || {
        ctx.core.track();
        let Some(core) = weak.upgrade() else {
            return;
        };
        match ctx.attachment() {
            Some((model, view, scope)) => core.attach(model, &view, &scope),
            None => core.detach(),
        }
    });

    ModelWatch::new(
        trigger,
        Box::new(move || {
            stop();
            core.dispose();
        }),
    )
}
