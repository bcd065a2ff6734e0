use std::sync::{Arc, Mutex, MutexGuard};

use dmtest::exec::{ProcessEntry, ProcessTable};

/// In-memory process list.
///
/// - `snapshot` returns whatever was added.
/// - `kill` records the pid and removes the entry, so a second lookup no
///   longer finds it.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessTable {
    entries: Arc<Mutex<Vec<ProcessEntry>>>,
    kills: Arc<Mutex<Vec<u32>>>,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, pid: u32, name: &str, args: &[&str]) {
        self.add_entry(ProcessEntry {
            pid,
            name: name.to_string(),
            exe: None,
            args: args.iter().map(|a| a.to_string()).collect(),
        });
    }

    pub fn add_entry(&self, entry: ProcessEntry) {
        lock(&self.entries).push(entry);
    }

    /// Pids passed to `kill`, in call order.
    pub fn kills(&self) -> Vec<u32> {
        lock(&self.kills).clone()
    }

    pub fn is_running(&self, pid: u32) -> bool {
        lock(&self.entries).iter().any(|e| e.pid == pid)
    }
}

impl ProcessTable for FakeProcessTable {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        lock(&self.entries).clone()
    }

    fn kill(&self, pid: u32) -> bool {
        lock(&self.kills).push(pid);
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|e| e.pid != pid);
        entries.len() != before
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
