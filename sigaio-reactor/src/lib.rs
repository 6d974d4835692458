//! Signal-subscription seam between an event loop and the sigaio bridge.
//!
//! The bridge core consumes its event loop through the [`Reactor`] trait,
//! which models a single capability: register a persistent handler for a
//! POSIX signal, dispatched on the loop's own thread.
//!
//! [`SignalLoop`] is a minimal built-in implementation suitable for tests
//! and simple embeddings. Applications with their own event loop implement
//! [`Reactor`] for it instead.
#![cfg(target_os = "linux")]
#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::missing_safety_doc
)]
use std::io;
use std::os::raw::c_int;

mod dispatch;
mod signals;

pub use dispatch::{SignalLoop, SignalWatch};

/// A signal-subscription capability provided by an event loop.
///
/// Implementations register a persistent handler for a signal number. The
/// handler must keep firing across deliveries until the returned watch is
/// dropped, and must run on the loop's own dispatch thread, never from
/// signal context.
pub trait Reactor {
    /// Subscription guard. Dropping it cancels delivery to the handler.
    type Watch;

    /// Register `handler` to run each time the loop observes `signo`.
    fn watch_signal(&self, signo: c_int, handler: Box<dyn FnMut()>)
        -> io::Result<Self::Watch>;
}
