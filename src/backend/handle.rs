use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static HANDLE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Opaque reference to one launched process.
///
/// Carries the OS pid, a process-unique id and optional backend-private state.
/// Cloning is cheap; clones refer to the same process.
#[derive(Clone)]
pub struct ProcessHandle {
    id: u64,
    pid: u32,
    state: Option<Arc<dyn Any + Send + Sync>>,
}

impl ProcessHandle {
    /// Creates a handle for `pid` with a fresh id and no backend state.
    pub fn new(pid: u32) -> Self {
        Self {
            id: HANDLE_SEQ.fetch_add(1, Ordering::Relaxed),
            pid,
            state: None,
        }
    }

    /// Attaches backend-private state, retrievable with [`state`](Self::state).
    pub fn with_state<T: Any + Send + Sync>(mut self, state: Arc<T>) -> Self {
        self.state = Some(state);
        self
    }

    /// Unique id of this launch (pids can be reused, ids are not).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Backend-private state, if it has type `T`.
    pub fn state<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.state.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ProcessHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProcessHandle {}
