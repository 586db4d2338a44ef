#[cfg(feature = "file")]
mod file;
#[cfg(feature = "log")]
mod log;
#[cfg(feature = "memory")]
mod memory;
mod registry;

#[cfg(feature = "file")]
pub use file::{read_tail, FileAuditStore};
#[cfg(feature = "log")]
pub use log::TracingAuditStore;
#[cfg(feature = "memory")]
pub use memory::MemoryAuditStore;
pub use registry::build_store;
