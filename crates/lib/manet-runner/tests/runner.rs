use std::thread;

use hashbrown::HashMap;

use manet_core::bucket::TimeMS;
use manet_core::node::AppId;
use manet_core::scheduler::StepScheduler;
use manet_runner::runner::run_simulation;
use manet_testutils::app::TestApp;
use manet_testutils::bucket::RecordingBucket;

fn scheduler(bucket: RecordingBucket, duration: u64) -> StepScheduler<TestApp, RecordingBucket> {
    let apps: HashMap<AppId, TestApp> = [
        TestApp::make_app(1, 1, 0, 50),
        TestApp::make_app(2, 0, 20, 100),
    ]
    .into_iter()
    .map(|app| (app.id, app))
    .collect();
    StepScheduler::builder()
        .bucket(bucket)
        .duration(TimeMS::from(duration))
        .step_size(TimeMS::from(10u64))
        .inactive_apps(apps)
        .build()
}

#[test]
fn run_covers_every_step_and_stops_once() {
    let bucket = run_simulation(scheduler(RecordingBucket::default(), 100)).expect("run succeeds");
    assert_eq!(bucket.initialized, 1);
    assert_eq!(bucket.terminated, 1);
    let steps = bucket
        .events
        .iter()
        .filter(|event| event.starts_with("before_apps"))
        .count();
    assert_eq!(steps, 10);
    assert!(bucket.events.contains(&"one:1@40".to_string()));
    assert!(!bucket.events.contains(&"one:1@50".to_string()));
    assert!(bucket.events.contains(&"one:2@90".to_string()));
}

#[test]
fn run_without_applications_still_stops() {
    let empty = StepScheduler::<TestApp, RecordingBucket>::builder()
        .bucket(RecordingBucket::default())
        .duration(TimeMS::from(30u64))
        .step_size(TimeMS::from(10u64))
        .inactive_apps(HashMap::new())
        .build();
    let bucket = run_simulation(empty).expect("run succeeds");
    assert_eq!(bucket.initialized, 1);
    assert_eq!(bucket.terminated, 1);
}

#[test]
fn fault_surfaces_after_teardown() {
    let result = run_simulation(scheduler(RecordingBucket::failing(), 30));
    let error = result.expect_err("bucket fault is reported");
    assert!(!error.is_config());
    assert!(error.to_string().contains("recording bucket asked to fail"));
}

#[test]
fn concurrent_runs_are_serialised() {
    let expected = run_simulation(scheduler(RecordingBucket::default(), 100))
        .expect("run succeeds")
        .events;
    let handles: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                run_simulation(scheduler(RecordingBucket::default(), 100)).expect("run succeeds")
            })
        })
        .collect();
    for handle in handles {
        let bucket = handle.join().expect("run thread");
        assert_eq!(bucket.terminated, 1);
        assert_eq!(bucket.events, expected);
    }
}
