use manet_core::bucket::{Bucket, TimeMS};
use manet_core::error::ExperimentError;

/// Bucket that records every hook the scheduler calls, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingBucket {
    pub step: TimeMS,
    pub events: Vec<String>,
    pub initialized: u32,
    pub terminated: u32,
    pub fail_on_terminate: bool,
}

impl RecordingBucket {
    pub fn failing() -> Self {
        Self {
            fail_on_terminate: true,
            ..Default::default()
        }
    }

    pub fn record(&mut self, event: String) {
        self.events.push(event);
    }

    pub fn events_at(&self, step: TimeMS) -> Vec<&str> {
        let suffix = format!("@{}", step);
        self.events
            .iter()
            .filter(|event| event.ends_with(&suffix))
            .map(|event| event.as_str())
            .collect()
    }
}

impl Bucket for RecordingBucket {
    fn initialize(&mut self, step: TimeMS) {
        self.step = step;
        self.initialized += 1;
    }

    fn before_apps(&mut self, step: TimeMS) {
        self.step = step;
        self.record(format!("before_apps@{}", step));
    }

    fn after_stage_one(&mut self) {
        self.record(format!("after_stage_one@{}", self.step));
    }

    fn after_apps(&mut self) {
        self.record(format!("after_apps@{}", self.step));
    }

    fn terminate(&mut self) -> Result<(), ExperimentError> {
        self.terminated += 1;
        if self.fail_on_terminate {
            return Err(ExperimentError::engine("recording bucket asked to fail"));
        }
        Ok(())
    }
}
