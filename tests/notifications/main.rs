//! Integration tests for the notification indexer.

#[path = "../support/mod.rs"]
mod support;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use socialdrive::notifications::{CountOpts, ListOpts};
use socialdrive::store::Drive;
use socialdrive::{
    EventDetail, EventKind, IndexStore, LockKey, MemoryIndexStore, NotificationWorker,
    Notifications,
};
use support::World;

fn notifications(world: &World) -> Notifications<MemoryIndexStore> {
    Notifications::new(Arc::clone(&world.ctx), MemoryIndexStore::new())
}

fn unread(n: &Notifications<MemoryIndexStore>) -> usize {
    n.count(CountOpts { unread: true }).unwrap()
}

#[test]
fn vote_on_user_post_becomes_one_unread_event() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let n = notifications(&world);

    // First contact only records where each drive is.
    let seeded = n.update_index(&world.user).unwrap();
    assert_eq!(seeded.drives_scanned, 1);
    assert_eq!(seeded.new_events, 0);

    let href = world.user_post_url(1);
    bob.vote(1_700_000_000_000, &href, 1);

    let report = n.update_index(&world.user).unwrap();
    assert_eq!(report.new_events, 1);

    let events = n.list(ListOpts::default()).unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.event(), EventKind::Vote);
    assert_eq!(event.author, bob.key);
    assert_eq!(event.timestamp, 1_700_000_000_000);
    assert!(!event.is_read);
    match &event.detail {
        EventDetail::Vote { href: h, vote, .. } => {
            assert_eq!(h, &href);
            assert_eq!(*vote, 1);
        }
        other => panic!("expected a vote, got {:?}", other),
    }

    assert_eq!(unread(&n), 1);
    assert_eq!(n.mark_all_read().unwrap(), 1);
    assert_eq!(unread(&n), 0);
    assert_eq!(n.count(CountOpts::default()).unwrap(), 1);
}

#[test]
fn history_before_first_contact_is_skipped() {
    let world = World::new();
    let bob = world.peer("Bob");
    bob.vote(1, &world.user_post_url(1), 1);
    world.follow(&bob);
    let n = notifications(&world);

    assert_eq!(n.update_index(&world.user).unwrap().new_events, 0);
    assert_eq!(n.count(CountOpts::default()).unwrap(), 0);
}

#[test]
fn reindexing_without_changes_is_a_no_op() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let n = notifications(&world);
    n.update_index(&world.user).unwrap();

    bob.vote(10, &world.user_post_url(1), 1);
    bob.comment(11, &world.user_post_url(1), None, "nice");
    assert_eq!(n.update_index(&world.user).unwrap().new_events, 2);

    let checkpoints = n.store().checkpoints().unwrap();
    let again = n.update_index(&world.user).unwrap();
    assert_eq!(again.new_events, 0);
    assert_eq!(n.count(CountOpts::default()).unwrap(), 2);
    assert_eq!(n.store().checkpoints().unwrap(), checkpoints);
}

#[test]
fn checkpoints_track_the_scanned_version() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let n = notifications(&world);

    n.update_index(&world.user).unwrap();
    let first = n.store().checkpoint(&bob.key).unwrap().unwrap().version;
    assert_eq!(first, bob.drive.get_info().unwrap().version);

    bob.vote(10, &world.user_post_url(1), 1);
    bob.vote(11, &world.user_post_url(2), -1);
    n.update_index(&world.user).unwrap();
    let second = n.store().checkpoint(&bob.key).unwrap().unwrap().version;
    assert_eq!(second, bob.drive.get_info().unwrap().version);
    assert!(second > first);
}

#[test]
fn pages_are_newest_first_without_gaps() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let n = notifications(&world);
    n.update_index(&world.user).unwrap();

    for ts in 1..=5 {
        bob.vote(ts, &world.user_post_url(ts as u32), 1);
    }
    assert_eq!(n.update_index(&world.user).unwrap().new_events, 5);

    let page = |offset, limit| -> Vec<i64> {
        n.list(ListOpts::page(offset, limit))
            .unwrap()
            .iter()
            .map(|e| e.timestamp)
            .collect()
    };
    assert_eq!(page(0, 2), vec![5, 4]);
    assert_eq!(page(2, 2), vec![3, 2]);
    assert_eq!(page(4, 2), vec![1]);
}

#[test]
fn unreachable_drive_does_not_stop_the_run() {
    let world = World::new();
    let bob = world.peer("Bob");
    let carol = world.peer("Carol");
    world.follow(&bob);
    world.follow(&carol);
    let n = notifications(&world);
    n.update_index(&world.user).unwrap();
    let bob_checkpoint = n.store().checkpoint(&bob.key).unwrap().unwrap();

    bob.vote(10, &world.user_post_url(1), 1);
    carol.vote(11, &world.user_post_url(1), -1);
    world.network.set_unreachable(&bob.key, true).unwrap();

    let report = n.update_index(&world.user).unwrap();
    assert_eq!(report.drives_scanned, 1);
    assert_eq!(report.drives_failed, 1);
    assert_eq!(report.new_events, 1);
    assert_eq!(n.store().checkpoint(&bob.key).unwrap().unwrap(), bob_checkpoint);

    world.network.set_unreachable(&bob.key, false).unwrap();
    let report = n.update_index(&world.user).unwrap();
    assert_eq!(report.drives_failed, 0);
    assert_eq!(report.new_events, 1);
    assert_eq!(n.count(CountOpts::default()).unwrap(), 2);
}

#[test]
fn comments_follows_and_second_degree_drives_are_indexed() {
    let world = World::new();
    let bob = world.peer("Bob");
    let carol = world.peer("Carol");
    world.follow(&bob);
    bob.follow("carol", &carol.key);
    let n = notifications(&world);
    n.update_index(&world.user).unwrap();

    let post = world.user_post_url(1);
    let mine = world.user.join("/comments/5.md");
    let elsewhere = carol.key.join("/posts/news/1.md");

    bob.comment(20, &post, None, "on your post");
    bob.comment(21, &elsewhere, Some(&mine), "reply to you");
    bob.comment(22, &elsewhere, None, "not about you");
    carol.follow("1700000000123", &world.user);
    carol.vote(23, &post, 1);

    let report = n.update_index(&world.user).unwrap();
    assert_eq!(report.drives_scanned, 2);
    assert_eq!(report.new_events, 4);

    let events = n.list(ListOpts::default()).unwrap();
    let follow = &events[0];
    assert_eq!(follow.event(), EventKind::Follow);
    assert_eq!(follow.author, carol.key);
    assert_eq!(follow.timestamp, 1_700_000_000_123);

    let kinds: Vec<(EventKind, i64)> = events[1..]
        .iter()
        .map(|e| (e.event(), e.timestamp))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (EventKind::Vote, 23),
            (EventKind::Comment, 21),
            (EventKind::Comment, 20),
        ]
    );
    match &events[2].detail {
        EventDetail::Comment { parent, .. } => assert_eq!(parent.as_deref(), Some(mine.as_str())),
        other => panic!("expected a comment, got {:?}", other),
    }
}

#[test]
fn slug_mount_names_take_the_mount_time() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let n = notifications(&world);
    n.update_index(&world.user).unwrap();

    bob.vote(1_700_000_000_000, &world.user_post_url(1), 1);
    bob.follow("3d-printing-fans", &world.user);
    assert_eq!(n.update_index(&world.user).unwrap().new_events, 2);

    let events = n.list(ListOpts::default()).unwrap();
    assert_eq!(events[0].event(), EventKind::Follow);
    assert!(events[0].timestamp > 1_700_000_000_000);
    assert_eq!(events[1].event(), EventKind::Vote);
}

#[test]
fn follows_sharing_a_digit_prefix_are_both_kept() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let n = notifications(&world);
    n.update_index(&world.user).unwrap();

    bob.follow("3-a", &world.user);
    bob.follow("3-b", &world.user);
    assert_eq!(n.update_index(&world.user).unwrap().new_events, 2);

    let mut names: Vec<String> = n
        .list(ListOpts::default())
        .unwrap()
        .into_iter()
        .map(|e| match e.detail {
            EventDetail::Follow { name, .. } => name,
            other => panic!("expected a follow, got {:?}", other),
        })
        .collect();
    names.sort();
    assert_eq!(names, vec!["3-a", "3-b"]);
}

#[test]
fn mark_all_read_waits_for_a_running_update() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let n = Arc::new(notifications(&world));
    n.update_index(&world.user).unwrap();
    bob.vote(10, &world.user_post_url(1), 1);
    n.update_index(&world.user).unwrap();

    let guard = world.locks.acquire(LockKey::NotificationsUpdate).unwrap();
    let (tx, rx) = mpsc::channel();
    let handle = {
        let n = Arc::clone(&n);
        thread::spawn(move || {
            let changed = n.mark_all_read().unwrap();
            tx.send(changed).unwrap();
        })
    };

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(unread(&n), 1);

    guard.release();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
    handle.join().unwrap();
    assert_eq!(unread(&n), 0);
}

#[cfg(feature = "emitter")]
#[test]
fn new_events_are_broadcast() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let n = notifications(&world);
    n.update_index(&world.user).unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    n.on_new_events(move |count| {
        let _ = tx.lock().unwrap().send(count);
    });

    // Runs without new events stay quiet.
    n.update_index(&world.user).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    bob.vote(10, &world.user_post_url(1), 1);
    bob.vote(11, &world.user_post_url(2), 1);
    n.update_index(&world.user).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
}

#[test]
fn worker_polls_until_stopped() {
    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let n = Arc::new(notifications(&world));
    n.update_index(&world.user).unwrap();

    let worker = NotificationWorker::spawn(
        Arc::clone(&n),
        world.user.clone(),
        Duration::from_millis(10),
    );
    bob.vote(10, &world.user_post_url(1), 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    while n.count(CountOpts::default()).unwrap() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    let stats = worker.stop();
    assert!(stats.polls >= 1);
    assert_eq!(stats.events_indexed, 1);
    assert_eq!(stats.runs_failed, 0);
    assert_eq!(n.count(CountOpts::default()).unwrap(), 1);
}

#[test]
fn closed_locks_fail_runs_without_panicking() {
    let world = World::new();
    let n = notifications(&world);
    world.locks.close().unwrap();
    assert!(n.update_index(&world.user).is_err());
    assert!(n.mark_all_read().is_err());
}

#[cfg(feature = "sled")]
#[test]
fn sled_backed_index_end_to_end() {
    use socialdrive::SledIndexStore;

    let world = World::new();
    let bob = world.peer("Bob");
    world.follow(&bob);
    let dir = tempfile::tempdir().unwrap();
    let n = Notifications::new(
        Arc::clone(&world.ctx),
        SledIndexStore::open(dir.path()).unwrap(),
    );
    n.update_index(&world.user).unwrap();

    bob.vote(10, &world.user_post_url(1), 1);
    assert_eq!(n.update_index(&world.user).unwrap().new_events, 1);
    assert_eq!(n.count(CountOpts { unread: true }).unwrap(), 1);
    n.mark_all_read().unwrap();
    assert_eq!(n.count(CountOpts { unread: true }).unwrap(), 0);
}
