use std::collections::HashMap;
use std::sync::Arc;

use crate::{Context, Device, HOST_HANDLE_SIZE};

#[test]
fn test_builder_defaults() {
    let device = Device::builder().name("cpu").build();
    assert_eq!(device.max_dimensions(), 3);
    assert_eq!(device.handle_size(), HOST_HANDLE_SIZE);
    assert_eq!(device.preferred_group_multiple("anything"), 8);
    assert!(!device.is_spmd());
}

#[test]
fn test_preferred_multiple_overrides() {
    let device = Device::builder()
        .name("cpu")
        .preferred_multiple(0)
        .kernel_multiples(HashMap::from([("wide".to_string(), 32), ("broken".to_string(), 0)]))
        .build();
    assert_eq!(device.preferred_group_multiple("narrow"), 1);
    assert_eq!(device.preferred_group_multiple("wide"), 32);
    assert_eq!(device.preferred_group_multiple("broken"), 1);
}

#[test]
fn test_devices_have_distinct_ids() {
    let a = Device::host();
    let b = Device::host();
    assert_ne!(a.id(), b.id());
    assert_ne!(*a, *b);
}

#[test]
fn test_context_membership() {
    let inside = Device::host();
    let outside = Device::host();
    let context = Context::new([Arc::clone(&inside)]);
    assert!(context.contains(&inside));
    assert!(context.ensure_contains(&outside).is_err());
}
