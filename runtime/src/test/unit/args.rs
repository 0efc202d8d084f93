use std::sync::Arc;

use test_case::test_case;
use tessel_device::{ChannelOrder, ChannelType, Context, Device, ImageDesc, ImageFormat, MemFlags, MemObject};
use tessel_ir::{AddrSpace, ParamKind};

use crate::args::{
    AlignedBytes, ArgKind, ArgPayload, ArgSlot, ArgValue, MAX_EXTENDED_ALIGNMENT, alignment_for, retained_memory,
};

fn image(context: &Context) -> Arc<MemObject> {
    let format = ImageFormat::new(ChannelOrder::Rgba, ChannelType::UnormInt8);
    let desc = ImageDesc { format, width: 4, height: 4, depth: 0, row_pitch: 16, slice_pitch: 0 };
    MemObject::image(context, desc, MemFlags::default())
}

#[test_case(0, 1)]
#[test_case(1, 1)]
#[test_case(3, 4)]
#[test_case(8, 8)]
#[test_case(12, 16)]
#[test_case(128, 128)]
#[test_case(200, MAX_EXTENDED_ALIGNMENT)]
fn test_alignment_for(size: usize, expected: usize) {
    assert_eq!(alignment_for(size), expected);
}

#[test]
fn test_aligned_bytes_layout() {
    let data = [1u8, 2, 3, 4, 5, 6];
    let bytes = AlignedBytes::copy_from(&data).unwrap();

    assert_eq!(bytes.as_slice(), &data);
    assert_eq!(bytes.alignment(), 8);
    assert_eq!(bytes.as_ptr() as usize % 8, 0);
    assert_eq!(bytes.capacity(), 8);

    let copy = bytes.try_clone().unwrap();
    assert_ne!(copy.as_ptr(), bytes.as_ptr());
    assert_eq!(copy.as_slice(), bytes.as_slice());
}

#[test]
fn test_tiny_value_gets_alignment_sized_allocation() {
    let bytes = AlignedBytes::copy_from(&[9]).unwrap();
    assert_eq!(bytes.len(), 1);
    assert_eq!(bytes.capacity(), 1);

    let large = AlignedBytes::copy_from(&[0u8; 300]).unwrap();
    assert_eq!(large.alignment(), MAX_EXTENDED_ALIGNMENT);
    assert_eq!(large.capacity(), 300);
}

#[test_case(ParamKind::Scalar { size: 4 }, ArgKind::Value)]
#[test_case(ParamKind::Pointer { space: AddrSpace::Global }, ArgKind::Pointer)]
#[test_case(ParamKind::Pointer { space: AddrSpace::Constant }, ArgKind::Pointer)]
#[test_case(ParamKind::Pointer { space: AddrSpace::Local }, ArgKind::LocalBuffer)]
#[test_case(ParamKind::LocalBuffer { size: 32 }, ArgKind::LocalBuffer)]
#[test_case(ParamKind::Image, ArgKind::Image)]
#[test_case(ParamKind::Sampler, ArgKind::Sampler)]
fn test_arg_kind_of_param(param: ParamKind, expected: ArgKind) {
    assert_eq!(ArgKind::of(&param), expected);
}

#[test]
fn test_payload_rejects_mismatched_values() {
    let device = Device::host();
    let context = Context::new([device]);
    let buffer = MemObject::buffer(&context, 16, MemFlags::default());
    let img = image(&context);

    assert!(ArgPayload::from_value(ArgKind::Value, &ArgValue::Mem(None)).is_none());
    assert!(ArgPayload::from_value(ArgKind::Pointer, &ArgValue::Mem(Some(Arc::clone(&img)))).is_none());
    assert!(ArgPayload::from_value(ArgKind::Image, &ArgValue::Mem(None)).is_none());
    assert!(ArgPayload::from_value(ArgKind::Image, &ArgValue::Mem(Some(buffer))).is_none());
    assert!(ArgPayload::from_value(ArgKind::LocalBuffer, &ArgValue::Bytes(&[0; 4])).is_none());

    assert!(matches!(ArgPayload::from_value(ArgKind::Pointer, &ArgValue::Mem(None)), Some(Ok(ArgPayload::Mem(None)))));
    assert!(matches!(ArgPayload::from_value(ArgKind::Image, &ArgValue::Mem(Some(img))), Some(Ok(ArgPayload::Mem(Some(_))))));
}

#[test]
fn test_slot_clone_copies_bytes() {
    let payload = ArgPayload::from_value(ArgKind::Value, &ArgValue::Bytes(&42u32.to_ne_bytes())).unwrap().unwrap();
    let slot = ArgSlot { kind: ArgKind::Value, size: 4, payload, is_set: true };
    let copy = slot.try_clone().unwrap();

    assert_eq!(copy.bytes(), Some(&42u32.to_ne_bytes()[..]));
    assert_ne!(copy.bytes().unwrap().as_ptr(), slot.bytes().unwrap().as_ptr());
    assert_eq!(copy.alignment(), 4);
}

#[test]
fn test_local_slot_is_preset() {
    let slot = ArgSlot::local(64);
    assert!(slot.is_set);
    assert_eq!(slot.kind, ArgKind::LocalBuffer);
    assert_eq!(slot.size, 64);
    assert!(!ArgSlot::unset(ArgKind::Value).is_set);
}

#[test]
fn test_retained_memory_skips_null_and_undeclared() {
    let context = Context::new([Device::host()]);
    let kept = MemObject::buffer(&context, 16, MemFlags::default());
    let beyond = MemObject::buffer(&context, 16, MemFlags::default());
    let mem = |m: Option<Arc<MemObject>>| ArgSlot { kind: ArgKind::Pointer, size: 8, payload: ArgPayload::Mem(m), is_set: true };

    let slots = vec![mem(Some(Arc::clone(&kept))), mem(None), ArgSlot::local(16), mem(Some(beyond))];
    let retained = retained_memory(&slots, 3);

    assert_eq!(retained.len(), 1);
    assert!(Arc::ptr_eq(&retained[0], &kept));
}
