//! Sensor drivers and the sensor actor loop.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

// Layer 3: Internal module imports
use crate::actor::BusMsg;
use crate::device::context::DeviceContext;
use crate::error::RuntimeError;
use crate::mailbox::MailboxReceiver;
use crate::message::{Envelope, Payload};
use crate::registry::RegistrationGuard;

/// A periodic sensor.
///
/// The actor loop owns the cadence: every `sample_interval` it calls
/// `read` and publishes the returned payload on the sensor's topic. A
/// read error fails the actor; its supervisor restarts it within the
/// restart budget.
#[async_trait]
pub trait SensorDriver: Send + 'static {
    /// One-time setup before sampling starts.
    async fn init(&mut self, _ctx: &DeviceContext) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Sampling period.
    fn sample_interval(&self) -> Duration;

    /// Produce the next reading; `None` skips this cycle.
    async fn read(&mut self, ctx: &DeviceContext) -> Result<Option<Payload>, RuntimeError>;
}

/// Run one sensor actor until shutdown or failure.
pub(crate) fn spawn_sensor(
    ctx: DeviceContext,
    mut driver: Box<dyn SensorDriver>,
    mut mailbox: MailboxReceiver<BusMsg>,
    mut shutdown: watch::Receiver<bool>,
    registration: RegistrationGuard,
) -> JoinHandle<Result<(), RuntimeError>> {
    tokio::spawn(async move {
        let _registration = registration;

        if let Err(err) = driver.init(&ctx).await {
            ctx.report_fault(&err).await;
            return Err(err);
        }

        let mut ticker = tokio::time::interval(driver.sample_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(sensor = %ctx.name, "sensor stopping");
                    return Ok(());
                }
                message = mailbox.recv() => match message {
                    Some(BusMsg::Shutdown) | None => return Ok(()),
                    // Sensors are sources; other traffic is ignored.
                    Some(_) => {}
                },
                _ = ticker.tick() => {
                    match driver.read(&ctx).await {
                        Ok(Some(payload)) => {
                            let envelope = Envelope::new(ctx.frame.clone(), payload)?;
                            ctx.pubsub.publish(&ctx.topic, envelope);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            ctx.report_fault(&err).await;
                            return Err(err);
                        }
                    }
                }
            }
        }
    })
}
