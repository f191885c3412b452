//! Executor queue ordering through the engine context.
//!
//! Work posted from many producer threads must run on the owning thread,
//! one item at a time, in per-producer post order. Work posted by a
//! running item waits for the next update.

use std::sync::{Arc, Mutex};
use std::thread;

use cadence_core::FrameTime;
use cadence_engine::{EngineConfig, EngineContext, WorkOptions};
use cadence_test_utils::{exclusive_context, init_test_logging};

const PRODUCERS: u32 = 8;
const ITEMS_PER_PRODUCER: u32 = 250;

fn config() -> EngineConfig {
    EngineConfig {
        worker_count: Some(2),
        worker_name_prefix: "queue-order".to_string(),
        ..EngineConfig::default()
    }
}

#[test]
fn items_run_on_owner_in_post_order() {
    init_test_logging();
    let _guard = exclusive_context();
    let mut ctx = EngineContext::new(&config()).unwrap();
    let owner = ctx.owner();
    let log = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let handle = ctx.handle();
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..ITEMS_PER_PRODUCER {
                    let log = Arc::clone(&log);
                    handle
                        .post(move || {
                            assert_eq!(thread::current().id(), owner);
                            log.lock().unwrap().push((p, i));
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    ctx.update(&FrameTime::default(), |_| {}).unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), (PRODUCERS * ITEMS_PER_PRODUCER) as usize);
    for p in 0..PRODUCERS {
        let seq: Vec<u32> = log
            .iter()
            .filter(|(q, _)| *q == p)
            .map(|(_, i)| *i)
            .collect();
        assert_eq!(seq, (0..ITEMS_PER_PRODUCER).collect::<Vec<_>>());
    }
    drop(log);
    ctx.dispose().unwrap();
}

#[test]
fn self_reposting_item_cannot_starve_the_update() {
    init_test_logging();
    let _guard = exclusive_context();
    let mut ctx = EngineContext::new(&config()).unwrap();
    let handle = ctx.handle();
    let runs = Arc::new(Mutex::new(0u32));

    fn repost(handle: cadence_engine::ContextHandle, runs: Arc<Mutex<u32>>) {
        let h = handle.clone();
        handle
            .post(move || {
                *runs.lock().unwrap() += 1;
                repost(h, runs);
            })
            .unwrap();
    }
    repost(handle.clone(), Arc::clone(&runs));

    for frame in 1..=5u32 {
        let mut updated = false;
        ctx.update(&FrameTime::default(), |_| updated = true).unwrap();
        assert!(updated);
        assert_eq!(*runs.lock().unwrap(), frame);
    }
    assert_eq!(handle.pending_work_items(), 1);
    ctx.dispose().unwrap();
}

#[test]
fn worker_awaits_owner_result() {
    init_test_logging();
    let _guard = exclusive_context();
    let mut ctx = EngineContext::new(&config()).unwrap();
    let handle = ctx.handle();

    let h = handle.clone();
    let waiter = thread::spawn(move || {
        h.queue_work_item(|| thread::current().id(), WorkOptions::NONE)
            .unwrap()
            .unwrap()
            .wait()
    });

    while handle.pending_work_items() == 0 {
        thread::yield_now();
    }
    ctx.update(&FrameTime::default(), |_| {}).unwrap();
    assert_eq!(waiter.join().unwrap(), Ok(ctx.owner()));
    ctx.dispose().unwrap();
}
