//! Tests for shared config region registration

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use attune::{
    AttuneError, ContextConfig, ControlMessage, RegionIdentifier, RegionKind,
    RegionRegistration, SharedContext,
};

fn unique_prefix(tag: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "attune_reg_{}_{}_{}",
        tag,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn test_config(tag: &str) -> ContextConfig {
    ContextConfig::new(unique_prefix(tag)).with_io_timeout(Duration::from_millis(500))
}

#[cfg(target_os = "linux")]
fn os_name_exists(name: &str) -> bool {
    std::path::Path::new("/dev/shm")
        .join(name.trim_start_matches('/'))
        .exists()
}

#[test]
fn test_publish_registers_announces_and_shares() {
    let config = test_config("publish");
    let mut ctx_a = SharedContext::attach_with_config(config.clone()).unwrap();
    let mut ctx_b = SharedContext::attach_with_config(config.clone()).unwrap();

    ctx_a
        .publish_region(RegionKind::SharedConfig, 7, 4096)
        .unwrap();

    // The counterpart learns about the region from the control channel.
    let msg = ctx_b
        .recv_control_message(Duration::from_secs(1))
        .unwrap();
    assert_eq!(msg, ControlMessage::RegisterRegion { index: 7 });

    // The directory holds exactly one entry with A's synthesized name.
    let registration = ctx_b
        .directory()
        .find(RegionIdentifier::new(RegionKind::SharedConfig, 7))
        .unwrap();
    assert_eq!(registration.name, config.config_region_name(7));
    assert_eq!(registration.size, 4096);
    assert_eq!(ctx_b.directory().len(), 1);

    // Bytes written by the publisher are visible to the opener.
    let published = ctx_a
        .config_region_mut(RegionKind::SharedConfig, 7)
        .unwrap();
    published.payload_bytes_mut()[..5].copy_from_slice(b"tuned");

    let opened = ctx_b
        .open_registered_region(RegionKind::SharedConfig, 7)
        .unwrap();
    assert_eq!(&opened.payload_bytes()[..5], b"tuned");

    drop(ctx_b);
    drop(ctx_a);

    #[cfg(target_os = "linux")]
    assert!(!os_name_exists(&config.config_region_name(7)));
}

#[test]
fn test_directory_conflict_deletes_created_region() {
    let config = test_config("conflict");
    let mut ctx = SharedContext::attach_with_config(config.clone()).unwrap();

    // Seed the directory with an entry whose identifier collides with the
    // upcoming publish but whose metadata differs.
    ctx.directory()
        .create_or_update(&RegionRegistration {
            id: RegionIdentifier::new(RegionKind::SharedConfig, 9),
            name: "/somewhere.else".to_string(),
            size: 8192,
        })
        .unwrap();

    let err = ctx
        .publish_region(RegionKind::SharedConfig, 9, 4096)
        .unwrap_err();
    assert!(matches!(
        err,
        AttuneError::DirectoryConflict { index: 9, .. }
    ));

    // The region created for the failed publish was deleted, not leaked.
    #[cfg(target_os = "linux")]
    assert!(!os_name_exists(&config.config_region_name(9)));

    // The conflicting entry is untouched.
    let registration = ctx
        .directory()
        .find(RegionIdentifier::new(RegionKind::SharedConfig, 9))
        .unwrap();
    assert_eq!(registration.size, 8192);
}

#[test]
fn test_republish_same_index_fails_exclusive_create() {
    let config = test_config("republish");
    let mut ctx = SharedContext::attach_with_config(config).unwrap();

    ctx.publish_region(RegionKind::SharedConfig, 3, 4096)
        .unwrap();

    // Publishing is exclusive creation; the name already exists.
    let err = ctx
        .publish_region(RegionKind::SharedConfig, 3, 4096)
        .unwrap_err();
    assert!(matches!(err, AttuneError::Resource { .. }));
    assert_eq!(ctx.directory().len(), 1);
}

#[test]
fn test_last_detach_deletes_opened_config_regions() {
    let config = test_config("cleanup_opened");
    let mut ctx_a = SharedContext::attach_with_config(config.clone()).unwrap();
    let mut ctx_b = SharedContext::attach_with_config(config.clone()).unwrap();

    ctx_a
        .publish_region(RegionKind::SharedConfig, 5, 4096)
        .unwrap();
    ctx_b
        .open_registered_region(RegionKind::SharedConfig, 5)
        .unwrap();

    // The publisher detaches first: not last, so the config region survives
    // for the process still using it.
    drop(ctx_a);
    #[cfg(target_os = "linux")]
    assert!(os_name_exists(&config.config_region_name(5)));

    // The last process out deletes it.
    drop(ctx_b);
    #[cfg(target_os = "linux")]
    assert!(!os_name_exists(&config.config_region_name(5)));
}

#[test]
fn test_last_detach_deletes_unopened_config_regions() {
    let config = test_config("cleanup_unopened");
    let mut ctx_a = SharedContext::attach_with_config(config.clone()).unwrap();
    let ctx_b = SharedContext::attach_with_config(config.clone()).unwrap();

    // A publishes; B never opens the region or drains the announcement.
    ctx_a
        .publish_region(RegionKind::SharedConfig, 11, 4096)
        .unwrap();
    drop(ctx_a);

    // B is last out; cleanup covers the region it never opened, via the
    // directory.
    drop(ctx_b);
    #[cfg(target_os = "linux")]
    assert!(!os_name_exists(&config.config_region_name(11)));
}
