use std::cell::RefCell;
use std::io;
use std::os::raw::c_int;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::trace;

use crate::signals;
use crate::Reactor;

const LOG: &str = "sigaio_reactor::dispatch";

/// Upper bound on how long one dispatch iteration sleeps.
///
/// The sleep is interrupted by any signal delivery, so the tick only bounds
/// wakeup latency for deliveries that raced the sleep setup or landed on
/// another thread.
const TICK: Duration = Duration::from_millis(10);

struct Slot {
    signo: c_int,
    /// Delivery count observed by the last dispatch of this slot.
    seen: u64,
    /// Taken out while the handler runs so it may drop or add watches.
    handler: Option<Box<dyn FnMut()>>,
}

type Table = Rc<RefCell<Vec<Option<Slot>>>>;

/// A minimal single-threaded dispatch loop for signal-driven completion
/// sources.
///
/// Handlers registered through [`Reactor::watch_signal`] run on the thread
/// calling [`SignalLoop::dispatch`], never from signal context. Signal
/// delivery is treated as a level-style hint: a handler may run when
/// nothing actually changed, and several deliveries may coalesce into one
/// invocation.
pub struct SignalLoop {
    table: Table,
}

/// Guard for one [`Reactor::watch_signal`] subscription.
///
/// Dropping the watch removes the handler. The process-wide signal
/// disposition stays installed.
pub struct SignalWatch {
    table: Table,
    key: usize,
}

impl std::fmt::Debug for SignalLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalLoop").finish()
    }
}

impl std::fmt::Debug for SignalWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalWatch").field("key", &self.key).finish()
    }
}

impl SignalLoop {
    /// Create a loop with no watches.
    pub fn new() -> Self {
        Self {
            table: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Run handlers whose signals were delivered since their last dispatch.
    ///
    /// Returns the number of handlers invoked.
    fn poll(&self) -> usize {
        let len = self.table.borrow().len();
        let mut fired = 0;
        for key in 0..len {
            let taken = {
                let mut table = self.table.borrow_mut();
                match table.get_mut(key).and_then(Option::as_mut) {
                    Some(slot) => {
                        let current = signals::delivered(slot.signo);
                        if current != slot.seen {
                            slot.seen = current;
                            slot.handler.take()
                        } else {
                            None
                        }
                    }
                    None => None,
                }
            };
            if let Some(mut handler) = taken {
                handler();
                fired += 1;
                // The handler may have dropped its own watch.
                let mut table = self.table.borrow_mut();
                if let Some(slot) = table.get_mut(key).and_then(Option::as_mut) {
                    slot.handler = Some(handler);
                }
            }
        }
        fired
    }

    /// One loop iteration.
    ///
    /// Dispatches anything already pending; otherwise sleeps until a signal
    /// arrives (bounded by an internal tick) and dispatches again. Returns
    /// the number of handlers invoked.
    pub fn dispatch(&mut self) -> io::Result<usize> {
        let fired = self.poll();
        if fired > 0 {
            trace!(target: LOG, "dispatch.fired {}", fired);
            return Ok(fired);
        }
        signals::wait(TICK)?;
        Ok(self.poll())
    }

    /// Dispatch repeatedly until `done` returns true or `deadline` elapses.
    ///
    /// Returns true if the predicate was satisfied.
    pub fn run_until(
        &mut self,
        deadline: Duration,
        mut done: impl FnMut() -> bool,
    ) -> io::Result<bool> {
        let start = Instant::now();
        loop {
            if done() {
                return Ok(true);
            }
            if start.elapsed() >= deadline {
                return Ok(false);
            }
            self.dispatch()?;
        }
    }
}

impl Default for SignalLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor for SignalLoop {
    type Watch = SignalWatch;

    fn watch_signal(
        &self,
        signo: c_int,
        handler: Box<dyn FnMut()>,
    ) -> io::Result<SignalWatch> {
        if !(1..=signals::MAX_SIGNO).contains(&signo) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        signals::install(signo)?;
        let slot = Slot {
            signo,
            seen: signals::delivered(signo),
            handler: Some(handler),
        };
        let mut table = self.table.borrow_mut();
        let key = table.len();
        table.push(Some(slot));
        trace!(target: LOG, "watch.register signo={} key={}", signo, key);
        Ok(SignalWatch {
            table: Rc::clone(&self.table),
            key,
        })
    }
}

impl Drop for SignalWatch {
    fn drop(&mut self) {
        if let Some(entry) = self.table.borrow_mut().get_mut(self.key) {
            *entry = None;
        }
    }
}
