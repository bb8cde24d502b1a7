//! The command actor event loop.
//!
//! Drives one handler through its lifecycle: `handle_command` once, then
//! the asynchronous hooks as messages arrive, racing every await against
//! the engine's cancellation signal and the safety-phase stream. On exit
//! the outcome is handed to the engine for caching and cleanup.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::actor::BusMsg;
use crate::mailbox::MailboxReceiver;
use crate::registry::RegistrationGuard;
use crate::runtime::command::{
    After, CommandContext, CommandError, CommandHandler, CommandResult, Step, StopReason,
};
use crate::runtime::engine::RuntimeEngine;
use crate::safety::SafetyPhase;

/// Spawn the actor task for one execution.
pub(crate) fn spawn(
    engine: RuntimeEngine,
    ctx: CommandContext,
    mut handler: Box<dyn CommandHandler>,
    mut mailbox: MailboxReceiver<BusMsg>,
    mut cancel: watch::Receiver<bool>,
    mut safety: broadcast::Receiver<SafetyPhase>,
    registration: RegistrationGuard,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Dropping the guard on any exit path removes the registry binding.
        let _registration = registration;

        let reason = drive(handler.as_mut(), &ctx, &mut mailbox, &mut cancel, &mut safety).await;
        debug!(command = %ctx.command(), execution = %ctx.execution_id(), %reason, "command stopping");

        let outcome: CommandResult = match &reason {
            StopReason::Done => handler.result(&ctx).await,
            StopReason::Disarmed => Err(CommandError::Disarmed),
            StopReason::Cancelled => Err(CommandError::Cancelled),
            StopReason::Fault(message) => Err(CommandError::Failed(message.clone())),
        };
        handler.terminate(&reason, &ctx).await;

        engine.finish(ctx.execution_id(), outcome).await;
    })
}

/// What woke the actor up.
enum Wakeup {
    Cancelled,
    Bus(BusMsg),
    Safety(SafetyPhase),
    TimerElapsed,
    MailboxClosed,
}

async fn drive(
    handler: &mut dyn CommandHandler,
    ctx: &CommandContext,
    mailbox: &mut MailboxReceiver<BusMsg>,
    cancel: &mut watch::Receiver<bool>,
    safety: &mut broadcast::Receiver<SafetyPhase>,
) -> StopReason {
    // Entry point, raced against cancellation.
    let first = tokio::select! {
        biased;
        _ = cancel.changed() => return StopReason::Cancelled,
        step = handler.handle_command(ctx) => step,
    };
    let mut step = match first {
        Ok(step) => step,
        Err(err) => return StopReason::Fault(err.to_string()),
    };

    loop {
        // Deferred work scheduled by the previous step runs before the
        // mailbox is read again.
        if let Step::ContinueThen(After::Continuation(tag)) = &step {
            let tag = tag.clone();
            let next = tokio::select! {
                biased;
                _ = cancel.changed() => return StopReason::Cancelled,
                step = handler.handle_continue(&tag, ctx) => step,
            };
            step = match next {
                Ok(step) => step,
                Err(err) => return StopReason::Fault(err.to_string()),
            };
            continue;
        }

        let timer = match &step {
            Step::Stop(reason) => return reason.clone(),
            Step::ContinueThen(After::Timeout(window)) => Some(*window),
            Step::Continue | Step::ContinueThen(After::Hibernate) => None,
            // Continuations were consumed above.
            Step::ContinueThen(After::Continuation(_)) => None,
        };

        let wakeup = wait(mailbox, cancel, safety, timer).await;
        let next = match wakeup {
            Wakeup::Cancelled => return StopReason::Cancelled,
            Wakeup::MailboxClosed => return StopReason::Cancelled,
            Wakeup::TimerElapsed => handler.handle_timeout(ctx).await,
            Wakeup::Safety(phase) => handler.handle_safety_state_change(phase, ctx).await,
            Wakeup::Bus(BusMsg::Deliver(envelope)) => handler.handle_message(envelope, ctx).await,
            Wakeup::Bus(BusMsg::Cast(envelope)) => handler.handle_cast(envelope, ctx).await,
            Wakeup::Bus(BusMsg::Call { envelope, reply }) => {
                let (response, step) = handler.handle_call(envelope, ctx).await;
                if reply.send(response).is_err() {
                    debug!(command = %ctx.command(), "caller went away before call reply");
                }
                Ok(step)
            }
            Wakeup::Bus(BusMsg::Options(options)) => handler.handle_options(options, ctx).await,
            Wakeup::Bus(BusMsg::Safety(phase)) => {
                handler.handle_safety_state_change(phase, ctx).await
            }
            Wakeup::Bus(BusMsg::Shutdown) => return StopReason::Cancelled,
        };

        step = match next {
            Ok(step) => step,
            Err(err) => return StopReason::Fault(err.to_string()),
        };
    }
}

async fn wait(
    mailbox: &mut MailboxReceiver<BusMsg>,
    cancel: &mut watch::Receiver<bool>,
    safety: &mut broadcast::Receiver<SafetyPhase>,
    timer: Option<std::time::Duration>,
) -> Wakeup {
    loop {
        if let Some(window) = timer {
            tokio::select! {
                biased;
                _ = cancel.changed() => return Wakeup::Cancelled,
                phase = safety.recv() => match phase {
                    Ok(phase) => return Wakeup::Safety(phase),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "command actor lagged on safety phases");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return continue_without_safety(mailbox, cancel, Some(window)).await;
                    }
                },
                message = mailbox.recv() => return bus_or_closed(message),
                () = sleep(window) => return Wakeup::TimerElapsed,
            }
        } else {
            tokio::select! {
                biased;
                _ = cancel.changed() => return Wakeup::Cancelled,
                phase = safety.recv() => match phase {
                    Ok(phase) => return Wakeup::Safety(phase),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "command actor lagged on safety phases");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return continue_without_safety(mailbox, cancel, None).await;
                    }
                },
                message = mailbox.recv() => return bus_or_closed(message),
            }
        }
    }
}

/// The safety broadcast closed (robot shutting down); keep serving the
/// mailbox and the cancel signal.
async fn continue_without_safety(
    mailbox: &mut MailboxReceiver<BusMsg>,
    cancel: &mut watch::Receiver<bool>,
    timer: Option<std::time::Duration>,
) -> Wakeup {
    if let Some(window) = timer {
        tokio::select! {
            biased;
            _ = cancel.changed() => Wakeup::Cancelled,
            message = mailbox.recv() => bus_or_closed(message),
            () = sleep(window) => Wakeup::TimerElapsed,
        }
    } else {
        tokio::select! {
            biased;
            _ = cancel.changed() => Wakeup::Cancelled,
            message = mailbox.recv() => bus_or_closed(message),
        }
    }
}

fn bus_or_closed(message: Option<BusMsg>) -> Wakeup {
    match message {
        Some(message) => Wakeup::Bus(message),
        None => Wakeup::MailboxClosed,
    }
}
