//! API Module - serializable snapshots of the patch and playback status

pub mod dto;

pub use dto::*;
