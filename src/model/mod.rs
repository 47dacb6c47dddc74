//! Read-only views of cluster Pods and the events that carry them

mod event;
mod pod;

pub use event::*;
pub use pod::*;
