//! Extension class registrations and virtual dispatch.
//!
//! ## Key Types
//!
//! - [`ClassDbBuilder`]: collects classes and overrides at load time
//! - [`ClassDb`]: frozen registrations, read without locking
//! - [`Trampoline`]: signature-erased entry point of one override

pub mod class_db;
pub mod native_callbacks;
pub mod trampoline;

pub use class_db::{ClassDb, ClassDbBuilder, ClassEntry, Instance, VirtualEntry};
pub use native_callbacks::{call_virtual_with_data, get_virtual_call_data};
pub use trampoline::Trampoline;
