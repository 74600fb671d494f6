//! Process-tree discovery and tree kill
//!
//! Enumeration is a best-effort snapshot: a process forked after the snapshot
//! is taken is not part of the tree that gets signalled.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;

use tracing::debug;

/// One row of the OS process table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent: Option<u32>,
}

/// Source of process-table snapshots
pub trait ProcessTable: Send + Sync {
    fn snapshot(&self) -> io::Result<Vec<ProcessEntry>>;
}

/// Process table backed by `sysinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> io::Result<Vec<ProcessEntry>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "process enumeration is not supported on this platform",
            ));
        }
        let mut system = sysinfo::System::new();
        system.refresh_processes();

        Ok(system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                parent: process.parent().map(|p| p.as_u32()),
            })
            .collect())
    }
}

/// Process table read straight from `/proc/<pid>/stat`
#[cfg(target_os = "linux")]
#[derive(Debug, Clone)]
pub struct ProcfsProcessTable {
    root: std::path::PathBuf,
}

#[cfg(target_os = "linux")]
impl ProcfsProcessTable {
    pub fn new() -> Self {
        Self::at("/proc")
    }

    /// Read a procfs-shaped tree mounted somewhere else
    pub fn at(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[cfg(target_os = "linux")]
impl Default for ProcfsProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl ProcessTable for ProcfsProcessTable {
    fn snapshot(&self) -> io::Result<Vec<ProcessEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            // The process may exit between readdir and open.
            let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if let Some(parent) = parse_stat_parent(&stat) {
                entries.push(ProcessEntry {
                    pid,
                    parent: Some(parent).filter(|p| *p != 0),
                });
            }
        }
        Ok(entries)
    }
}

/// Extract the ppid field from a `/proc/<pid>/stat` line
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
pub fn parse_stat_parent(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

/// `root` followed by all of its transitive children, breadth first
///
/// Pids already visited are skipped, so a corrupt snapshot with a parent
/// cycle still terminates.
pub fn descendants(entries: &[ProcessEntry], root: u32) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for entry in entries {
        if let Some(parent) = entry.parent {
            if parent != entry.pid {
                children.entry(parent).or_default().push(entry.pid);
            }
        }
    }

    let mut seen = HashSet::from([root]);
    let mut order = vec![root];
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        let Some(kids) = children.get(&pid) else {
            continue;
        };
        let mut kids = kids.clone();
        kids.sort_unstable();
        for kid in kids {
            if seen.insert(kid) {
                order.push(kid);
                queue.push_back(kid);
            }
        }
    }
    order
}

/// Snapshot the table and return the tree rooted at `root`
pub fn collect(table: &dyn ProcessTable, root: u32) -> io::Result<Vec<u32>> {
    let entries = table.snapshot()?;
    Ok(descendants(&entries, root))
}

/// Forcefully kill every pid, ignoring per-pid failures
///
/// A pid that is already gone is the expected race between enumeration and
/// signalling, not an error.
pub async fn kill_all(pids: &[u32]) {
    for &pid in pids {
        match kill_pid(pid).await {
            Ok(()) => debug!(pid, "Sent kill"),
            Err(e) => debug!(pid, error = %e, "Kill failed, ignoring"),
        }
    }
}

#[cfg(unix)]
async fn kill_pid(pid: u32) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    kill(Pid::from_raw(raw), Signal::SIGKILL).map_err(io::Error::from)
}

#[cfg(windows)]
async fn kill_pid(pid: u32) -> io::Result<()> {
    use std::process::Stdio;
    use tokio::process::Command;

    let status = Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/t", "/f"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(io::ErrorKind::Other, format!("taskkill exited with {}", status)))
    }
}
