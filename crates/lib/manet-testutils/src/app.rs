use manet_core::app::{Activatable, Application, Orderable};
use manet_core::bucket::TimeMS;
use manet_core::node::{AppId, AppOrder};

use crate::bucket::RecordingBucket;

/// Application that is active in `[start, stop)` and logs its stages into the bucket.
#[derive(Clone, Debug)]
pub struct TestApp {
    pub id: AppId,
    pub order: AppOrder,
    pub start: TimeMS,
    pub stop: TimeMS,
    pub activated_at: Option<TimeMS>,
    pub deactivated: bool,
}

impl TestApp {
    pub fn make_app(id: u32, order: u32, start: u64, stop: u64) -> Self {
        Self {
            id: AppId::from(id),
            order: AppOrder::from(order),
            start: TimeMS::from(start),
            stop: TimeMS::from(stop),
            activated_at: None,
            deactivated: false,
        }
    }
}

impl Activatable for TestApp {
    fn activate(&mut self, now: TimeMS) {
        self.activated_at = Some(now);
    }

    fn deactivate(&mut self) {
        self.deactivated = true;
    }

    fn is_deactivated(&self) -> bool {
        self.deactivated
    }

    fn time_of_activation(&self) -> TimeMS {
        self.start
    }
}

impl Orderable for TestApp {
    fn order(&self) -> AppOrder {
        self.order
    }
}

impl Application<RecordingBucket> for TestApp {
    fn id(&self) -> AppId {
        self.id
    }

    fn stage_one(&mut self, bucket: &mut RecordingBucket) {
        if bucket.step >= self.stop {
            self.deactivate();
            return;
        }
        bucket.record(format!("one:{}@{}", self.id, bucket.step));
    }

    fn stage_two_reverse(&mut self, bucket: &mut RecordingBucket) {
        if self.deactivated {
            return;
        }
        bucket.record(format!("two:{}@{}", self.id, bucket.step));
    }
}
