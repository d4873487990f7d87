//! # Checkpoint Model Integration Tests
//!
//! End-to-end exercise of the transactional KV model: timestamped commits,
//! prepared transactions, named and unnamed checkpoints, stable-timestamp
//! monotonicity, and the abort conditions for illegal transitions.

use burrowdb::error::ErrorCode;
use burrowdb::mvcc::{Checkpoint, Table, TS_LATEST};
use burrowdb::Database;
use std::sync::Arc;

fn get(table: &Table, key: &[u8]) -> Option<Vec<u8>> {
    table.get_latest(key).unwrap()
}

fn get_at(table: &Table, key: &[u8], ts: u64) -> Option<Vec<u8>> {
    table.get_at(key, ts).unwrap()
}

fn get_ckpt(table: &Table, ckpt: &Arc<Checkpoint>, key: &[u8]) -> Option<Vec<u8>> {
    table.get_checkpoint(ckpt, key, None).unwrap()
}

fn get_ckpt_at(
    table: &Table,
    ckpt: &Arc<Checkpoint>,
    key: &[u8],
    ts: u64,
) -> Option<Vec<u8>> {
    table.get_checkpoint(ckpt, key, Some(ts)).unwrap()
}

fn some(value: &[u8]) -> Option<Vec<u8>> {
    Some(value.to_vec())
}

/// The basic checkpoint flow: named checkpoint before the stable timestamp
/// exists, unnamed checkpoint after, prepared transactions bracketing the
/// stable timestamp, and the illegal-update behaviors. Mirrors the engine's
/// own model exercise step for step.
#[test]
fn checkpoint_model_end_to_end() {
    let db = Database::new();
    let table = db.create_table("table").unwrap();

    // Add some data.
    let mut txn1 = db.begin_transaction().unwrap();
    table.insert(&txn1, b"Key 1", b"Value 1").unwrap();
    txn1.commit_at(10, None).unwrap();
    let mut txn1 = db.begin_transaction().unwrap();
    table.insert(&txn1, b"Key 2", b"Value 2").unwrap();
    txn1.commit_at(20, None).unwrap();

    // Create a named checkpoint, then set the stable timestamp and create an
    // unnamed checkpoint.
    let ckpt1 = db.create_checkpoint(Some("ckpt1")).unwrap();
    db.set_stable_timestamp(15);
    let ckpt = db.create_checkpoint(None).unwrap();

    // Add more data.
    let mut txn1 = db.begin_transaction().unwrap();
    table.insert(&txn1, b"Key 3", b"Value 3").unwrap();
    txn1.commit_at(30, None).unwrap();

    // The named checkpoint predates the stable timestamp: it sees all
    // committed data. The unnamed checkpoint is bounded by stable = 15.
    assert_eq!(get_ckpt(&table, &ckpt1, b"Key 1"), some(b"Value 1"));
    assert_eq!(get_ckpt(&table, &ckpt1, b"Key 2"), some(b"Value 2"));
    assert_eq!(get_ckpt(&table, &ckpt1, b"Key 3"), None);
    assert_eq!(get_ckpt(&table, &ckpt, b"Key 1"), some(b"Value 1"));
    assert_eq!(get_ckpt(&table, &ckpt, b"Key 2"), None);
    assert_eq!(get_ckpt(&table, &ckpt, b"Key 3"), None);

    // With a read timestamp overlaid on the checkpoint.
    assert_eq!(get_ckpt_at(&table, &ckpt1, b"Key 1", 15), some(b"Value 1"));
    assert_eq!(get_ckpt_at(&table, &ckpt1, b"Key 2", 15), None);
    assert_eq!(get_ckpt_at(&table, &ckpt1, b"Key 3", 15), None);

    // Two more keys; only committed data is included in the checkpoint.
    let mut txn1 = db.begin_transaction().unwrap();
    let mut txn2 = db.begin_transaction().unwrap();
    table.insert(&txn1, b"Key 4", b"Value 4").unwrap();
    table.insert(&txn2, b"Key 5", b"Value 5").unwrap();
    txn1.commit_at(40, None).unwrap();
    db.set_stable_timestamp(40);
    let ckpt2 = db.create_checkpoint(Some("ckpt2")).unwrap();
    assert_eq!(get_ckpt(&table, &ckpt2, b"Key 3"), some(b"Value 3"));
    assert_eq!(get_ckpt(&table, &ckpt2, b"Key 4"), some(b"Value 4"));
    assert_eq!(get_ckpt(&table, &ckpt2, b"Key 5"), None);
    txn2.commit_at(50, None).unwrap();

    // Prepared transactions. While prepared, snapshot reads of the written
    // keys fail with a prepare conflict instead of returning stale values.
    let mut txn1 = db.begin_transaction().unwrap();
    let mut txn2 = db.begin_transaction().unwrap();
    table.insert(&txn1, b"Key 1", b"Value 4").unwrap();
    table.insert(&txn2, b"Key 2", b"Value 5").unwrap();
    txn1.prepare_at(55).unwrap();
    txn2.prepare_at(55).unwrap();

    let err = table.get_latest(b"Key 1").unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::PrepareConflict));
    let err = table.get_at(b"Key 2", 55).unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::PrepareConflict));
    // A reader below the prepare timestamp is unaffected.
    assert_eq!(get_at(&table, b"Key 1", 54), some(b"Value 1"));

    txn1.commit_at(60, Some(60)).unwrap();
    txn2.commit_at(60, Some(65)).unwrap();
    db.set_stable_timestamp(60);
    let ckpt3 = db.create_checkpoint(Some("ckpt3")).unwrap();

    // Key 1 committed with durable = 60 <= stable and is captured; Key 2's
    // durable timestamp (65) exceeds the stable timestamp, so the checkpoint
    // exposes the old value.
    assert_eq!(get_ckpt(&table, &ckpt3, b"Key 1"), some(b"Value 4"));
    assert_eq!(get_ckpt(&table, &ckpt3, b"Key 2"), some(b"Value 2"));
    assert_eq!(get_ckpt(&table, &ckpt3, b"Key 3"), some(b"Value 3"));

    // Moving the stable timestamp backwards fails silently.
    db.set_stable_timestamp(50);
    assert_eq!(db.stable_timestamp(), 60);
    let ckpt4 = db.create_checkpoint(Some("ckpt4")).unwrap();
    assert_eq!(get_ckpt(&table, &ckpt4, b"Key 1"), some(b"Value 4"));
    assert_eq!(get_ckpt(&table, &ckpt4, b"Key 2"), some(b"Value 2"));
    assert_eq!(get_ckpt(&table, &ckpt4, b"Key 3"), some(b"Value 3"));

    // Illegal update behaviors. A prepare at the stable timestamp aborts.
    db.set_stable_timestamp(60);
    let mut txn1 = db.begin_transaction().unwrap();
    table.insert(&txn1, b"Key 1", b"Value 1").unwrap();
    let err = txn1.prepare_at(60).unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
    txn1.rollback().unwrap();

    // A prepared commit below the prepare/stable timestamps aborts.
    let mut txn1 = db.begin_transaction().unwrap();
    table.insert(&txn1, b"Key 1", b"Value 1").unwrap();
    txn1.prepare_at(62).unwrap();
    db.set_stable_timestamp(62);
    let err = txn1.commit_at(60, Some(62)).unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
    txn1.rollback().unwrap();

    // Nothing leaked: the rolled-back value never became visible.
    assert_eq!(get(&table, b"Key 1"), some(b"Value 4"));
}

/// P1: after commit, every written key reads back at the commit timestamp.
#[test]
fn committed_writes_read_back_at_commit_timestamp() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"a", b"1").unwrap();
    table.insert(&txn, b"b", b"2").unwrap();
    table.insert(&txn, b"a", b"3").unwrap();
    txn.commit_at(25, None).unwrap();

    assert_eq!(get_at(&table, b"a", 25), some(b"3"));
    assert_eq!(get_at(&table, b"b", 25), some(b"2"));
}

/// P2: a value is stable over timestamp ranges with no intervening commit.
#[test]
fn reads_are_stable_between_commits() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k", b"v").unwrap();
    txn.commit_at(10, None).unwrap();

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k", b"w").unwrap();
    txn.commit_at(50, None).unwrap();

    db.set_stable_timestamp(50);
    for ts in 10..50 {
        assert_eq!(get_at(&table, b"k", ts), some(b"v"));
    }
    assert_eq!(get_at(&table, b"k", 50), some(b"w"));
}

/// P3: setting the stable timestamp at or below the current value is a
/// silent no-op.
#[test]
fn stable_timestamp_never_regresses() {
    let db = Database::new();
    assert_eq!(db.stable_timestamp(), 0);

    db.set_stable_timestamp(60);
    db.set_stable_timestamp(50);
    assert_eq!(db.stable_timestamp(), 60);
    db.set_stable_timestamp(60);
    assert_eq!(db.stable_timestamp(), 60);
    db.set_stable_timestamp(61);
    assert_eq!(db.stable_timestamp(), 61);
}

/// P4: a checkpoint at stable `S` answers like a live read at `S`.
#[test]
fn checkpoint_agrees_with_timestamped_reads() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    for (key, ts) in [(b"a", 10u64), (b"b", 20), (b"c", 30)] {
        let mut txn = db.begin_transaction().unwrap();
        table.insert(&txn, key, &ts.to_be_bytes()).unwrap();
        txn.commit_at(ts, None).unwrap();
    }

    db.set_stable_timestamp(20);
    let ckpt = db.create_checkpoint(Some("p4")).unwrap();

    for key in [b"a", b"b", b"c"] {
        assert_eq!(get_ckpt(&table, &ckpt, key), get_at(&table, key, 20));
    }
}

/// The checkpoint's visible set is fixed at creation: later commits below
/// its bound do not appear (I5).
#[test]
fn checkpoint_is_immutable_after_creation() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    let ckpt = db.create_checkpoint(Some("before")).unwrap();
    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k", b"v").unwrap();
    txn.commit_at(5, None).unwrap();

    assert_eq!(get_ckpt(&table, &ckpt, b"k"), None);
    assert_eq!(get(&table, b"k"), some(b"v"));
}

#[test]
fn unnamed_checkpoint_replaces_its_predecessor() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k", b"old").unwrap();
    txn.commit_at(10, None).unwrap();
    db.create_checkpoint(None).unwrap();

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k", b"new").unwrap();
    txn.commit_at(20, None).unwrap();
    db.create_checkpoint(None).unwrap();

    let unnamed = db.checkpoint(None).unwrap();
    assert_eq!(get_ckpt(&table, &unnamed, b"k"), some(b"new"));
}

/// Write-write conflict: the second committer is rolled back.
#[test]
fn second_committer_on_same_key_is_rolled_back() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    let mut txn1 = db.begin_transaction().unwrap();
    let mut txn2 = db.begin_transaction().unwrap();
    table.insert(&txn1, b"k", b"from txn1").unwrap();
    table.insert(&txn2, b"k", b"from txn2").unwrap();

    txn1.commit_at(10, None).unwrap();
    let err = txn2.commit_at(20, None).unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Rollback));

    assert_eq!(get(&table, b"k"), some(b"from txn1"));
    assert_eq!(db.active_transaction_count(), 0);
}

#[test]
fn disjoint_keys_commit_without_conflict() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    let mut txn1 = db.begin_transaction().unwrap();
    let mut txn2 = db.begin_transaction().unwrap();
    table.insert(&txn1, b"k4", b"v4").unwrap();
    table.insert(&txn2, b"k5", b"v5").unwrap();
    txn1.commit_at(40, None).unwrap();
    txn2.commit_at(50, None).unwrap();

    assert_eq!(get(&table, b"k4"), some(b"v4"));
    assert_eq!(get(&table, b"k5"), some(b"v5"));
}

/// The state-machine rejections: writes and prepares on a prepared
/// transaction, operations on terminal transactions, durable < commit.
#[test]
fn illegal_transitions_raise_the_abort_condition() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k", b"v").unwrap();
    txn.prepare_at(10).unwrap();

    let err = table.insert(&txn, b"k2", b"v").unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
    let err = txn.prepare_at(11).unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
    let err = txn.commit().unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));

    // Equality between commit and prepare timestamps is permitted.
    txn.commit_at(10, None).unwrap();

    let err = txn.commit_at(11, None).unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
    let err = txn.rollback().unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k3", b"v").unwrap();
    let err = txn.commit_at(20, Some(15)).unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::Panic));
    txn.rollback().unwrap();
}

/// Configuration-string forms of the same flows.
#[test]
fn config_strings_drive_timestamps() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k", b"v1").unwrap();
    txn.timestamp_transaction("commit_timestamp=a").unwrap();
    txn.commit().unwrap();

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k", b"v2").unwrap();
    txn.timestamp_transaction("commit_timestamp=1e,durable_timestamp=1e")
        .unwrap();
    txn.commit().unwrap();

    // read_timestamp pins the snapshot below the second commit.
    let reader = db
        .begin_transaction_with_config(Some("read_timestamp=14"))
        .unwrap();
    assert_eq!(reader.read_ts(), 20);
    assert_eq!(table.get_txn(&reader, b"k").unwrap(), some(b"v1"));
    drop(reader);

    // Prepared flow through configuration strings.
    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k2", b"v3").unwrap();
    txn.timestamp_transaction("prepare_timestamp=28").unwrap();
    txn.prepare().unwrap();
    txn.timestamp_transaction("commit_timestamp=2a,durable_timestamp=2c")
        .unwrap();
    txn.commit().unwrap();
    assert_eq!(get_at(&table, b"k2", 42), some(b"v3"));

    db.set_timestamp("stable_timestamp=3c").unwrap();
    assert_eq!(db.stable_timestamp(), 60);

    let err = db
        .begin_transaction_with_config(Some("commit_timestamp=5"))
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), Some(ErrorCode::InvalidArgument));
}

/// Non-timestamped transactions commit and are visible at every timestamp.
#[test]
fn untimestamped_commits_are_always_visible() {
    let db = Database::new();
    let table = db.create_table("t").unwrap();

    let mut txn = db.begin_transaction().unwrap();
    table.insert(&txn, b"k", b"v").unwrap();
    txn.commit().unwrap();

    assert_eq!(get_at(&table, b"k", 1), some(b"v"));
    assert_eq!(get_at(&table, b"k", TS_LATEST), some(b"v"));

    // And they land in stable-bounded checkpoints.
    db.set_stable_timestamp(5);
    let ckpt = db.create_checkpoint(Some("c")).unwrap();
    assert_eq!(get_ckpt(&table, &ckpt, b"k"), some(b"v"));
}
