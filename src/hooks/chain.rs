//! Sequential execution of hook snapshots.
//!
//! Exactly one hook of a chain is active at a time and hooks run in snapshot
//! order, however long a suspending hook takes. Inline hook errors propagate to
//! the caller unchanged; nothing in a chain is retried.
use crate::errors::InterceptError;
use crate::hooks::hook::{
    AfterContinuation, AfterHook, BeforeContinuation, BeforeHook, BeforeStep,
};
use crate::net::request::Request;
use crate::net::response::{Response, ResponsePatch};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Partial response stage announced by a suspending before-hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Partial {
    Head,
    Progress,
}

#[derive(Debug)]
pub(crate) enum BeforeOutcome {
    /// No hook answered, call the transport
    Proceed(Request),
    /// A hook short-circuited the call
    Reply(Request, ResponsePatch),
}

/// Runs the before-chain.
///
/// `on_partial` receives headers-only and progress responses while a suspending
/// hook is still in control. Cancelling `cancel` stops the chain at the next hook
/// boundary, or while it waits on a suspended hook, with [`InterceptError::Aborted`].
pub(crate) async fn run_before<F>(
    hooks: Vec<BeforeHook>,
    mut request: Request,
    cancel: &CancellationToken,
    mut on_partial: F,
) -> Result<BeforeOutcome, InterceptError>
where
    F: FnMut(Partial, ResponsePatch),
{
    for (index, hook) in hooks.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(InterceptError::Aborted);
        }

        match hook {
            BeforeHook::Sync(f) => {
                if let Some(reply) = f(&mut request)? {
                    log::debug!("before-hook #{} answered {} {}", index, request.method, request.url);
                    return Ok(BeforeOutcome::Reply(request, reply.into_patch()));
                }
            }
            BeforeHook::Async(f) => {
                if !request.is_async {
                    log::debug!("skipping suspending before-hook #{} on a synchronous call", index);
                    continue;
                }

                let (tx, mut rx) = mpsc::unbounded_channel();
                f(BeforeContinuation::new(request, tx));

                request = loop {
                    let step = tokio::select! {
                        step = rx.recv() => step,
                        _ = cancel.cancelled() => return Err(InterceptError::Aborted),
                    };
                    match step {
                        Some(BeforeStep::Head(patch)) => on_partial(Partial::Head, patch),
                        Some(BeforeStep::Progress(patch)) => on_partial(Partial::Progress, patch),
                        Some(BeforeStep::Next(req)) => break req,
                        Some(BeforeStep::Dropped(req)) => {
                            log::warn!("before-hook #{} dropped its continuation; continuing", index);
                            break req;
                        }
                        Some(BeforeStep::Respond(req, reply)) => {
                            log::debug!("before-hook #{} answered {} {}", index, req.method, req.url);
                            return Ok(BeforeOutcome::Reply(req, reply.into_patch()));
                        }
                        None => return Err(InterceptError::ContinuationLost),
                    }
                };
            }
        }
    }

    Ok(BeforeOutcome::Proceed(request))
}

/// Runs the after-chain and hands back the final request and response.
pub(crate) async fn run_after(
    hooks: Vec<AfterHook>,
    mut request: Request,
    mut response: Response,
) -> Result<(Request, Response), InterceptError> {
    for (index, hook) in hooks.into_iter().enumerate() {
        match hook {
            AfterHook::Sync(f) => f(&request, &mut response)?,
            AfterHook::Async(f) => {
                if !request.is_async {
                    log::debug!("skipping suspending after-hook #{} on a synchronous call", index);
                    continue;
                }
                let (tx, rx) = oneshot::channel();
                f(AfterContinuation::new(request, response, tx));
                (request, response) = rx.await.map_err(|_| InterceptError::ContinuationLost)?;
            }
        }
    }

    Ok((request, response))
}
