use super::*;
use tempfile::TempDir;

fn open_wal(dir: &TempDir) -> Wal {
    let mut wal = Wal::new(dir.path().join("wal.log"));
    wal.open().unwrap();
    wal
}

#[test]
fn sync_mode_syncs_on_every_append() {
    let tmp = TempDir::new().unwrap();
    let mut wal = open_wal(&tmp);
    let mut policy = SyncPolicy::new(WriteMode::Sync, 10, 10_000);

    for i in 0..20 {
        wal.append_put("k", &i.to_string()).unwrap();
        policy.after_wal_append(&mut wal).unwrap();
    }

    assert_eq!(policy.fsync_count(), 20);
}

#[test]
fn batch_mode_defers_sync_until_threshold() {
    let tmp = TempDir::new().unwrap();
    let mut wal = open_wal(&tmp);
    let mut policy = SyncPolicy::new(WriteMode::Batch, 5, 60_000);

    // First append always forces a sync (0-sentinel elapsed check).
    wal.append_put("k", "0").unwrap();
    policy.after_wal_append(&mut wal).unwrap();
    assert_eq!(policy.fsync_count(), 1);

    // Next 4 appends stay below the batch threshold and the interval
    // hasn't elapsed, so no further sync happens yet.
    for i in 1..4 {
        wal.append_put("k", &i.to_string()).unwrap();
        policy.after_wal_append(&mut wal).unwrap();
    }
    assert_eq!(policy.fsync_count(), 1);

    // The 5th pending op reaches batch_size and forces a sync.
    wal.append_put("k", "4").unwrap();
    policy.after_wal_append(&mut wal).unwrap();
    assert_eq!(policy.fsync_count(), 2);
}

#[test]
fn batch_mode_syncs_after_interval_even_below_threshold() {
    let tmp = TempDir::new().unwrap();
    let mut wal = open_wal(&tmp);
    let mut policy = SyncPolicy::new(WriteMode::Batch, 1_000_000, 1);

    wal.append_put("k", "0").unwrap();
    policy.after_wal_append(&mut wal).unwrap();
    assert_eq!(policy.fsync_count(), 1);

    std::thread::sleep(std::time::Duration::from_millis(5));

    wal.append_put("k", "1").unwrap();
    policy.after_wal_append(&mut wal).unwrap();
    assert_eq!(policy.fsync_count(), 2);
}

#[test]
fn adaptive_mode_widens_batch_after_high_throughput_sync() {
    let tmp = TempDir::new().unwrap();
    let mut wal = open_wal(&tmp);
    let mut policy = SyncPolicy::new(WriteMode::Adaptive, 10, 60_000);
    assert_eq!(policy.adaptive_batch_size, 10);

    // First sync is the forced 0-sentinel sync; no throughput is measured
    // yet because `last_sync_time` was undefined.
    wal.append_put("k", "0").unwrap();
    policy.after_wal_append(&mut wal).unwrap();
    assert_eq!(policy.adaptive_batch_size, 10);

    // Manually stage a large pending count with a tiny elapsed window to
    // deterministically cross the high-QPS threshold rather than racing
    // a real clock in a unit test.
    policy.pending_ops = 50_000;
    policy.last_sync_time = Some(Instant::now() - std::time::Duration::from_millis(1));
    policy.sync_now(&mut wal).unwrap();

    assert_eq!(policy.adaptive_batch_size, 40);
}

#[test]
fn adaptive_mode_resets_to_base_after_low_throughput_sync() {
    let tmp = TempDir::new().unwrap();
    let mut wal = open_wal(&tmp);
    let mut policy = SyncPolicy::new(WriteMode::Adaptive, 10, 60_000);
    policy.adaptive_batch_size = 40;

    policy.pending_ops = 1;
    policy.last_sync_time = Some(Instant::now() - std::time::Duration::from_secs(5));
    policy.sync_now(&mut wal).unwrap();

    assert_eq!(policy.adaptive_batch_size, 10);
}

#[test]
fn adaptive_retuning_applies_only_to_next_window() {
    let tmp = TempDir::new().unwrap();
    let mut wal = open_wal(&tmp);
    let mut policy = SyncPolicy::new(WriteMode::Adaptive, 10, 60_000);

    wal.append_put("k", "0").unwrap();
    policy.after_wal_append(&mut wal).unwrap();

    policy.pending_ops = 50_000;
    policy.last_sync_time = Some(Instant::now() - std::time::Duration::from_millis(1));
    let batch_size_used_for_this_sync = policy.adaptive_batch_size;
    policy.sync_now(&mut wal).unwrap();

    // The sync that just ran was evaluated against the *old* batch size;
    // only the next decision sees the widened one.
    assert_eq!(batch_size_used_for_this_sync, 10);
    assert_eq!(policy.adaptive_batch_size, 40);
}
