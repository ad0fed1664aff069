use std::cmp::Ordering;
use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::debug;
use typed_builder::TypedBuilder;

use crate::app::Application;
use crate::bucket::{Bucket, TimeMS};
use crate::error::ExperimentError;
use crate::hashbrown::HashMap;
use crate::node::AppId;

/// A trait used to represent the engine that owns the simulated clock. The order of calling
/// the scheduler's functions is important: `initialize` once, then `activate` and `trigger`
/// for every step, then `terminate` once.
///
/// `terminate` consumes the scheduler, so an engine can be stopped only once and is
/// destroyed when the returned bucket is handed back.
pub trait Scheduler<B: Bucket>: Send {
    fn duration(&self) -> TimeMS;
    fn now(&self) -> TimeMS;
    fn active_apps(&self) -> usize;
    fn initialize(&mut self);
    fn activate(&mut self);
    fn trigger(&mut self) -> TimeMS;
    fn terminate(self) -> Result<B, ExperimentError>;
}

/// Time-stepped scheduler. Applications wait in an activation cache until their start time,
/// are stepped in `(order, id)` order while active and are retired once they deactivate.
#[derive(TypedBuilder)]
pub struct StepScheduler<A, B>
where
    A: Application<B>,
    B: Bucket,
{
    pub bucket: B,
    pub duration: TimeMS,
    pub step_size: TimeMS,
    pub inactive_apps: HashMap<AppId, A>,
    #[builder(default)]
    pub active_apps: IndexMap<AppId, A>,
    #[builder(default)]
    pub retired_apps: Vec<A>,
    #[builder(default)]
    pub activation_cache: BTreeMap<TimeMS, Vec<AppId>>,
    #[builder(default = TimeMS::default())]
    pub now: TimeMS,
}

impl<A, B> StepScheduler<A, B>
where
    A: Application<B>,
    B: Bucket,
{
    pub fn app_of(&self, app_id: &AppId) -> Option<&A> {
        self.active_apps.get(app_id)
    }

    fn app_cmp(this_id: &AppId, this_app: &A, other_id: &AppId, other_app: &A) -> Ordering {
        this_app
            .order()
            .cmp(&other_app.order())
            .then_with(|| this_id.cmp(other_id))
    }

    fn retire_deactivated(&mut self) {
        let deactivated: Vec<AppId> = self
            .active_apps
            .values()
            .filter(|app| app.is_deactivated())
            .map(|app| app.id())
            .collect();

        for app_id in deactivated.into_iter() {
            if let Some(app) = self.active_apps.shift_remove(&app_id) {
                debug!("Retiring app {} at {}", app_id, self.now);
                self.retired_apps.push(app);
            }
        }
    }
}

impl<A, B> Scheduler<B> for StepScheduler<A, B>
where
    A: Application<B>,
    B: Bucket,
{
    fn duration(&self) -> TimeMS {
        self.duration
    }

    fn now(&self) -> TimeMS {
        self.now
    }

    fn active_apps(&self) -> usize {
        self.active_apps.len()
    }

    fn initialize(&mut self) {
        let mut app_ids: Vec<AppId> = self.inactive_apps.keys().copied().collect();
        app_ids.sort();
        for app_id in app_ids.into_iter() {
            if let Some(app) = self.inactive_apps.get(&app_id) {
                debug!("Adding app {} to the scheduler", app_id);
                self.activation_cache
                    .entry(app.time_of_activation())
                    .or_default()
                    .push(app_id);
            }
        }
        self.bucket.initialize(self.now);
    }

    fn activate(&mut self) {
        let mut activated = false;
        while let Some(entry) = self.activation_cache.first_entry() {
            if *entry.key() > self.now {
                break;
            }
            for app_id in entry.remove().into_iter() {
                if let Some(mut app) = self.inactive_apps.remove(&app_id) {
                    app.activate(self.now);
                    self.active_apps.insert(app_id, app);
                    activated = true;
                }
            }
        }
        if activated {
            self.active_apps.sort_by(Self::app_cmp);
        }
    }

    fn trigger(&mut self) -> TimeMS {
        self.bucket.before_apps(self.now);

        self.active_apps
            .values_mut()
            .for_each(|app| app.stage_one(&mut self.bucket));

        self.bucket.after_stage_one();

        self.active_apps
            .values_mut()
            .rev()
            .for_each(|app| app.stage_two_reverse(&mut self.bucket));

        self.bucket.after_apps();
        self.retire_deactivated();

        self.now += self.step_size;
        self.now
    }

    fn terminate(mut self) -> Result<B, ExperimentError> {
        self.active_apps.values_mut().for_each(|app| app.deactivate());
        self.bucket.terminate()?;
        Ok(self.bucket)
    }
}
