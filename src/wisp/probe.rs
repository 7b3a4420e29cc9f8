use crate::subprocess::Tool;

/// Answers whether a process id still names a running process.
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

impl<T: ProcessProbe + ?Sized> ProcessProbe for &T {
    fn is_alive(&self, pid: u32) -> bool {
        (**self).is_alive(pid)
    }
}

/// Probe backed by `ps -p <pid>`.
///
/// If `ps` itself cannot be run the process is reported alive: gc must
/// not reclaim a wisp it cannot prove orphaned.
#[derive(Debug, Clone, Copy, Default)]
pub struct PsProbe;

impl ProcessProbe for PsProbe {
    fn is_alive(&self, pid: u32) -> bool {
        match Tool::new("ps").args(["-p", &pid.to_string()]).run() {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::warn!(pid, error = %e, "cannot probe process, assuming alive");
                true
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;

    use super::ProcessProbe;

    /// Probe with a fixed set of live pids.
    #[derive(Default)]
    pub struct FakeProbe {
        pub alive: HashSet<u32>,
    }

    impl FakeProbe {
        pub fn with_alive(pids: &[u32]) -> Self {
            Self {
                alive: pids.iter().copied().collect(),
            }
        }
    }

    impl ProcessProbe for FakeProbe {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.contains(&pid)
        }
    }
}
