use manet_core::bucket::{Bucket, TimeMS};
use manet_testutils::bucket::RecordingBucket;

#[test]
fn test_bucket_update() {
    let mut bucket = RecordingBucket::default();
    let step0 = TimeMS::from(0u64);
    bucket.initialize(step0);
    assert_eq!(bucket.step, TimeMS::from(0u64));
    let step1 = TimeMS::from(10u64);
    bucket.before_apps(step1);
    assert_eq!(bucket.step, TimeMS::from(10u64));
    bucket.after_stage_one();
    bucket.after_apps();
    assert_eq!(
        bucket.events_at(step1),
        vec!["before_apps@10", "after_stage_one@10", "after_apps@10"]
    );
}

#[test]
fn test_failing_bucket_reports_on_terminate() {
    let mut bucket = RecordingBucket::failing();
    assert!(bucket.terminate().is_err());
    assert_eq!(bucket.terminated, 1);
}
