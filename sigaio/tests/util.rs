#![cfg(target_os = "linux")]

use std::cell::Cell;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use sigaio::Bridge;
use sigaio_reactor::SignalLoop;

/// Deadline generous enough for loaded CI machines.
#[allow(dead_code)]
pub const COMPLETION_DEADLINE: Duration = Duration::from_secs(10);

pub fn test_env() -> (SignalLoop, Bridge<SignalLoop>) {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
    let reactor = SignalLoop::new();
    let bridge = Bridge::new(&reactor).expect("completion-signal subscription");
    (reactor, bridge)
}

/// Test directory under the system temp dir keyed by the current thread
/// name, which cargo test sets to the test name.
///
/// The directory is cleaned up on drop.
pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    pub fn new() -> Self {
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("unnamed").replace("::", "-");
        let path = std::env::temp_dir().join("sigaio-tests").join(name);
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).expect("could not create test directory");
        Self { path }
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Completion observations shared between a callback and the test body.
#[derive(Default)]
pub struct CallState {
    pub calls: Cell<u32>,
    /// Last observed outcome, errno-keyed for assertions.
    pub result: Cell<Option<Result<usize, i32>>>,
}

#[allow(dead_code)]
impl CallState {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn record(&self, result: &io::Result<usize>) {
        self.calls.set(self.calls.get() + 1);
        let entry = match result {
            Ok(n) => Ok(*n),
            Err(err) => Err(err.raw_os_error().unwrap_or(-1)),
        };
        self.result.set(Some(entry));
    }

    pub fn completed(&self) -> bool {
        self.calls.get() > 0
    }
}
