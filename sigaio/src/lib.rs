//! A bridge between POSIX AIO and a signal-driven reactor.
//!
//! [`Bridge`] tracks asynchronous file reads, writes, and syncs submitted
//! through the kernel's POSIX AIO facility. Each control block is
//! configured to raise [`COMPLETION_SIGNAL`] when its operation finishes;
//! the reactor dispatches the bridge's persistent signal watch, and the
//! bridge rescans its in-flight operations with `aio_error`, reclaiming
//! finished ones with `aio_return` and invoking their completion
//! callbacks.
//!
//! The completion signal carries no per-operation identity, so every
//! notification triggers a full rescan of the in-flight set. This is a
//! deliberate O(in-flight) tradeoff: in-flight counts are bounded by what
//! a single reactor thread can submit.
//!
//! All types are bound to the reactor thread (none are `Send`), so
//! submitting from another thread is a compile error rather than a caller
//! obligation. The POSIX AIO implementation may execute the actual I/O on
//! kernel or library worker threads; those threads never touch bridge
//! state, they only cause signal delivery.
//!
//! Only one [`Bridge`] per process may use [`COMPLETION_SIGNAL`]. Running
//! several bridges on the same signal channel is a caller error: the
//! channel cannot be demultiplexed, so completion-delivery timing becomes
//! unspecified.
#![cfg(target_os = "linux")]
#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::missing_safety_doc
)]

pub(crate) mod aio;
mod bridge;
mod error;
mod operation;
mod registry;

/// Stable buffer traits for operation-owned I/O buffers.
pub mod buf;

pub use aio::COMPLETION_SIGNAL;
pub use bridge::{Bridge, Handle};
pub use operation::SyncMode;
