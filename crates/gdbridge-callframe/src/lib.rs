//! Call frame codec.
//!
//! Host values are encoded into fixed-width slots laid out the way the engine
//! reads pointer-call arguments, and results are decoded out of a return slot
//! reserved before the call.
//!
//! ## Key Types
//!
//! - [`Frame`]: pooled argument buffer with its `p_args` pointer array
//! - [`RetSlot`], [`HandleRet`], [`Nil`]: return slots
//! - [`Encode`], [`Decode`]: slot layout of host values
//! - [`FromArg`], [`IntoRet`], [`ArgList`]: the same layout seen from a virtual override

pub mod codec;
pub mod frame;
pub mod ret;
pub mod slot;
pub mod virtual_args;

pub use codec::{Decode, Encode};
pub use frame::{Addr, Frame};
pub use ret::{HandleRet, Nil, RetSlot, ReturnTarget};
pub use slot::{SLOT_BYTES, Slot};
pub use virtual_args::{ArgList, FromArg, IntoRet, arg_at, set_ret};

#[doc(hidden)]
pub mod __private {
    pub use gdbridge_core::{HandleTable, Payload};
}
