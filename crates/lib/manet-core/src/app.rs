use crate::bucket::{Bucket, TimeMS};
use crate::node::{AppId, AppOrder};

/// A trait that allows an application to be scheduled for simulation.
///
/// An application is activated once at `time_of_activation` and is retired by the scheduler
/// as soon as it reports itself as deactivated.
pub trait Activatable {
    fn activate(&mut self, now: TimeMS);
    fn deactivate(&mut self);
    fn is_deactivated(&self) -> bool;
    fn time_of_activation(&self) -> TimeMS;
}

pub trait Orderable {
    fn order(&self) -> AppOrder;
}

/// A trait that represents anything the engine steps: in this workspace, traffic sources and
/// sinks. Only types with this trait can be handed to a scheduler.
pub trait Application<B>: Activatable + Orderable + Send
where
    B: Bucket,
{
    fn id(&self) -> AppId;
    /// Runs in ascending order. Sources transmit here.
    fn stage_one(&mut self, bucket: &mut B);
    /// Runs in descending order after the bucket resolved deliveries. Sinks consume here.
    fn stage_two_reverse(&mut self, bucket: &mut B);
}
