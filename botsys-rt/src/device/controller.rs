//! Controller drivers and the controller actor loop.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

// Layer 3: Internal module imports
use botsys_model::Path;

use crate::actor::BusMsg;
use crate::device::context::DeviceContext;
use crate::error::RuntimeError;
use crate::mailbox::MailboxReceiver;
use crate::message::Envelope;
use crate::pubsub::SubscribeOptions;
use crate::registry::RegistrationGuard;

/// A closed-loop controller.
///
/// Controllers consume the fabric: the actor subscribes to the driver's
/// chosen prefix and feeds every matching envelope to `update`; an
/// optional fixed-period `tick` runs between messages.
#[async_trait]
pub trait ControllerDriver: Send + 'static {
    /// One-time setup.
    async fn init(&mut self, _ctx: &DeviceContext) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Topic prefix this controller consumes; `None` for tick-only
    /// controllers.
    fn subscription(&self) -> Option<Path> {
        None
    }

    /// Fixed control period; `None` for purely event-driven controllers.
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    /// A matching envelope arrived.
    async fn update(&mut self, _envelope: Envelope, _ctx: &DeviceContext) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// The control period elapsed.
    async fn tick(&mut self, _ctx: &DeviceContext) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Run one controller actor until shutdown or failure.
pub(crate) fn spawn_controller(
    ctx: DeviceContext,
    mut driver: Box<dyn ControllerDriver>,
    mut mailbox: MailboxReceiver<BusMsg>,
    mut shutdown: watch::Receiver<bool>,
    registration: RegistrationGuard,
) -> JoinHandle<Result<(), RuntimeError>> {
    let mut subscription = driver
        .subscription()
        .map(|prefix| ctx.pubsub.subscribe(prefix, SubscribeOptions::new()));

    tokio::spawn(async move {
        let _registration = registration;

        if let Err(err) = driver.init(&ctx).await {
            ctx.report_fault(&err).await;
            return Err(err);
        }

        let mut ticker = driver.tick_interval().map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker
        });

        loop {
            let step: Result<(), RuntimeError> = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(controller = %ctx.name, "controller stopping");
                    return Ok(());
                }
                message = mailbox.recv() => match message {
                    Some(BusMsg::Shutdown) | None => return Ok(()),
                    Some(BusMsg::Cast(envelope)) | Some(BusMsg::Deliver(envelope)) => {
                        driver.update(envelope, &ctx).await
                    }
                    Some(_) => Ok(()),
                },
                envelope = recv_subscription(&mut subscription) => match envelope {
                    Some(envelope) => driver.update(envelope, &ctx).await,
                    None => return Ok(()),
                },
                _ = tick(&mut ticker) => driver.tick(&ctx).await,
            };
            if let Err(err) = step {
                ctx.report_fault(&err).await;
                return Err(err);
            }
        }
    })
}

async fn recv_subscription(
    subscription: &mut Option<crate::pubsub::Subscription>,
) -> Option<Envelope> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
