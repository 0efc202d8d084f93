//! External collaborators of the tessel launch path.
//!
//! Devices, contexts, memory objects, samplers and events are owned elsewhere in
//! a full runtime. This crate models just enough of them for launch validation,
//! argument binding and command completion.

pub mod device;
pub mod error;
pub mod memory;
pub mod sync;

#[cfg(test)]
pub mod test;

pub use device::{Context, ContextId, Device, DeviceId, HOST_HANDLE_SIZE};
pub use error::{Error, Result};
pub use memory::{
    AddressingMode, ChannelOrder, ChannelType, DeviceHandle, DeviceImage, FilterMode, ImageDesc, ImageFormat,
    MemAccess, MemFlags, MemId, MemKind, MemObject, Sampler, SamplerId,
};
pub use sync::{CommandStatus, Event, EventId};
