//! End-to-end lifecycle tests for the shared context

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use attune::{
    AttuneError, ContextConfig, ContextInitializer, NamedSharedRegion, SharedContext,
};

fn unique_prefix(tag: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "attune_it_{}_{}_{}",
        tag,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn test_config(tag: &str) -> ContextConfig {
    ContextConfig::new(unique_prefix(tag)).with_io_timeout(Duration::from_millis(500))
}

/// POSIX shm names are visible under /dev/shm on Linux
#[cfg(target_os = "linux")]
fn os_name_exists(name: &str) -> bool {
    std::path::Path::new("/dev/shm")
        .join(name.trim_start_matches('/'))
        .exists()
}

#[cfg(target_os = "linux")]
fn assert_context_names_exist(config: &ContextConfig, expected: bool) {
    for name in [
        config.global_region_name(),
        config.control_region_name(),
        config.feedback_region_name(),
        config.control_event_name(),
        config.feedback_event_name(),
        config.ready_event_name(),
    ] {
        assert_eq!(
            os_name_exists(&name),
            expected,
            "unexpected OS name state for {}",
            name
        );
    }
}

#[test]
fn test_cold_start_creates_all_resources() {
    let config = test_config("cold");

    let init = ContextInitializer::with_config(config.clone()).unwrap();
    assert!(init.global_created());
    assert!(init.control_region_created());
    assert!(init.feedback_region_created());
    assert!(init.control_event_created());
    assert!(init.feedback_event_created());
    assert!(init.ready_event_created());
    assert_eq!(init.attached_processes(), 1);

    let ctx = SharedContext::new(init).unwrap();
    assert_eq!(ctx.attached_processes(), 1);

    // Initialization signaled the target-ready event.
    ctx.wait_for_peer(Duration::from_millis(100)).unwrap();

    #[cfg(target_os = "linux")]
    assert_context_names_exist(&config, true);

    drop(ctx);

    // Last detach deleted every OS-global name.
    #[cfg(target_os = "linux")]
    assert_context_names_exist(&config, false);
}

#[test]
fn test_attach_detach_end_to_end() {
    let config = test_config("e2e");

    // Process A attaches cold.
    let ctx_a = SharedContext::attach_with_config(config.clone()).unwrap();
    assert_eq!(ctx_a.attached_processes(), 1);

    // Process B attaches warm: everything already exists.
    let init_b = ContextInitializer::with_config(config.clone()).unwrap();
    assert!(!init_b.global_created());
    assert!(!init_b.control_region_created());
    assert!(!init_b.feedback_region_created());
    assert!(!init_b.control_event_created());
    assert!(!init_b.feedback_event_created());
    assert!(!init_b.ready_event_created());
    assert_eq!(init_b.attached_processes(), 2);
    let ctx_b = SharedContext::new(init_b).unwrap();

    // B detaches: no deletions, A still depends on the names.
    drop(ctx_b);
    assert_eq!(ctx_a.attached_processes(), 1);
    #[cfg(target_os = "linux")]
    assert_context_names_exist(&config, true);

    // A detaches last: every name deleted.
    drop(ctx_a);
    #[cfg(target_os = "linux")]
    assert_context_names_exist(&config, false);
}

#[test]
fn test_detach_in_attach_order() {
    let config = test_config("order");

    let ctx_a = SharedContext::attach_with_config(config.clone()).unwrap();
    let ctx_b = SharedContext::attach_with_config(config.clone()).unwrap();
    assert_eq!(ctx_b.attached_processes(), 2);

    // The first attacher leaves first; the counter, not attach order,
    // decides who cleans up.
    drop(ctx_a);
    assert_eq!(ctx_b.attached_processes(), 1);
    #[cfg(target_os = "linux")]
    assert_context_names_exist(&config, true);

    drop(ctx_b);
    #[cfg(target_os = "linux")]
    assert_context_names_exist(&config, false);
}

#[test]
fn test_failed_initialization_rolls_back_everything() {
    let config = test_config("rollback");

    // Occupy the control channel name with an incompatible size so the
    // acquire sequence fails partway through.
    let mut blocker = NamedSharedRegion::create_new(&config.control_region_name(), 4096).unwrap();

    let err = ContextInitializer::with_config(config.clone()).unwrap_err();
    assert!(matches!(
        err,
        AttuneError::Initialization {
            step: "control channel region",
            ..
        }
    ));

    // The global region acquired before the failure was deleted again: this
    // process was the sole attacher, so rollback escalated cleanup.
    #[cfg(target_os = "linux")]
    {
        assert!(!os_name_exists(&config.global_region_name()));
        assert!(!os_name_exists(&config.feedback_region_name()));
    }

    // Retrying from scratch succeeds once the conflict is gone.
    blocker.mark_cleanup();
    blocker.close();
    let ctx = SharedContext::attach_with_config(config.clone()).unwrap();
    assert_eq!(ctx.attached_processes(), 1);
    drop(ctx);
}

#[test]
fn test_failed_initialization_preserves_other_attachers() {
    let config = test_config("rollback_live");

    let ctx_a = SharedContext::attach_with_config(config.clone()).unwrap();

    // Replace the ready event name with an incompatible segment so a second
    // initializer fails near the end of the sequence, after it has already
    // attached.
    let mut existing = NamedSharedRegion::open_existing(&config.ready_event_name()).unwrap();
    existing.mark_cleanup();
    existing.close();
    let mut blocker = NamedSharedRegion::create_new(&config.ready_event_name(), 4096).unwrap();

    let err = ContextInitializer::with_config(config.clone()).unwrap_err();
    assert!(matches!(
        err,
        AttuneError::Initialization {
            step: "ready event",
            ..
        }
    ));

    // A's attachment survived the failed attempt: the counter is back to 1
    // and no name A depends on was deleted, since the failing process saw a
    // pre-decrement value greater than 1.
    assert_eq!(ctx_a.attached_processes(), 1);
    #[cfg(target_os = "linux")]
    {
        assert!(os_name_exists(&config.global_region_name()));
        assert!(os_name_exists(&config.control_region_name()));
        assert!(os_name_exists(&config.feedback_region_name()));
        assert!(os_name_exists(&config.control_event_name()));
        assert!(os_name_exists(&config.feedback_event_name()));
    }

    blocker.mark_cleanup();
    blocker.close();

    // A detaches last; its unlink of the already-deleted ready event name is
    // tolerated and everything else is cleaned up.
    drop(ctx_a);
    #[cfg(target_os = "linux")]
    assert_context_names_exist(&config, false);
}

#[test]
fn test_concurrent_create_or_open_single_first_writer() {
    use std::sync::{Arc, Barrier};

    let config = test_config("race");
    let name = config.global_region_name();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let name = name.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                // A loser of the creation race can observe the segment
                // before the winner sized it; that surfaces as an open
                // failure and is retried, like a caller would.
                loop {
                    match NamedSharedRegion::create_or_open(&name, 65536) {
                        Ok((region, created)) => return (region, created),
                        Err(_) => std::thread::yield_now(),
                    }
                }
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let creators = results.iter().filter(|(_, created)| *created).count();
    assert_eq!(creators, 1, "exactly one process performs first-writer init");

    let mut regions: Vec<_> = results.into_iter().map(|(r, _)| r).collect();
    for region in &mut regions[1..] {
        region.close();
    }
    regions[0].mark_cleanup();
    regions[0].close();
}

#[test]
fn test_channels_between_two_contexts() {
    use attune::ControlMessage;

    let config = test_config("channels");
    let mut ctx_a = SharedContext::attach_with_config(config.clone()).unwrap();
    let mut ctx_b = SharedContext::attach_with_config(config).unwrap();

    // Control messages flow A -> B.
    ctx_a
        .send_control_message(&ControlMessage::RegisterRegion { index: 42 })
        .unwrap();
    let msg = ctx_b
        .recv_control_message(Duration::from_secs(1))
        .unwrap();
    assert_eq!(msg, ControlMessage::RegisterRegion { index: 42 });

    // Feedback frames flow B -> A.
    ctx_b.send_feedback(b"observation").unwrap();
    let frame = ctx_a.recv_feedback(Duration::from_secs(1)).unwrap();
    assert_eq!(frame, b"observation");

    // Nothing left queued.
    assert!(ctx_b.try_recv_control_message().unwrap().is_none());
}

#[test]
fn test_unconsumed_initializer_detaches_on_drop() {
    let config = test_config("unconsumed");

    let init = ContextInitializer::with_config(config.clone()).unwrap();
    assert_eq!(init.attached_processes(), 1);

    // Never consumed into a context; dropping it still detaches honestly
    // and, as the last holder, deletes every name.
    drop(init);

    #[cfg(target_os = "linux")]
    assert_context_names_exist(&config, false);
}

#[test]
fn test_wait_for_peer_times_out_without_signal() {
    let config = test_config("peer");
    let ctx = SharedContext::attach_with_config(config).unwrap();

    // Consume the signal from this context's own initialization; a second
    // wait then has nobody to signal it.
    ctx.wait_for_peer(Duration::from_millis(100)).unwrap();
    let err = ctx.wait_for_peer(Duration::from_millis(50)).unwrap_err();
    assert!(matches!(err, AttuneError::WaitTimeout { .. }));
}
