//! In-memory collaborators for tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{
    CollabError, CommandOutput, FileKind, FileStat, FileSystem, NetworkQuery, ProcessExecutor,
    ShellMode, BAD_REPLY,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ──────────────────────────────────────────────
// FakeExecutor
// ──────────────────────────────────────────────

/// Answers commands from a table of canned outputs and records every call.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    responses: Mutex<HashMap<String, CommandOutput>>,
    calls: Mutex<Vec<(String, ShellMode)>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, command: &str, stdout: &str, exit_code: i32) -> Self {
        self.set_response(command, stdout, exit_code);
        self
    }

    pub fn set_response(&self, command: &str, stdout: &str, exit_code: i32) {
        lock(&self.responses).insert(
            command.to_string(),
            CommandOutput {
                stdout: stdout.to_string(),
                exit_code,
            },
        );
    }

    pub fn calls(&self) -> Vec<(String, ShellMode)> {
        lock(&self.calls).clone()
    }
}

impl ProcessExecutor for FakeExecutor {
    fn run(&self, command: &str, mode: ShellMode) -> Result<CommandOutput, CollabError> {
        lock(&self.calls).push((command.to_string(), mode));
        lock(&self.responses)
            .get(command)
            .cloned()
            .ok_or_else(|| CollabError::Spawn {
                command: command.to_string(),
                message: "no such command".to_string(),
            })
    }
}

// ──────────────────────────────────────────────
// FakeFileSystem
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
struct FakeEntry {
    kind: FileKind,
    content: Vec<u8>,
    mode: u32,
    mtime: i64,
    uid: u32,
}

/// A tree of files and directories held in memory. Parent directories
/// are created implicitly.
#[derive(Debug, Default)]
pub struct FakeFileSystem {
    entries: Mutex<BTreeMap<PathBuf, FakeEntry>>,
    process_uid: u32,
}

impl FakeFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.insert(path, FileKind::File, content.as_bytes().to_vec(), 0o644);
        self
    }

    pub fn with_executable(self, path: &str) -> Self {
        self.insert(path, FileKind::File, b"#!/bin/sh\n".to_vec(), 0o755);
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.insert(path, FileKind::Directory, Vec::new(), 0o755);
        self
    }

    /// Change the owner of an existing entry.
    pub fn with_owner(self, path: &str, uid: u32) -> Self {
        if let Some(entry) = lock(&self.entries).get_mut(Path::new(path)) {
            entry.uid = uid;
        }
        self
    }

    /// Set the modification time of an existing entry.
    pub fn with_mtime(self, path: &str, mtime: i64) -> Self {
        if let Some(entry) = lock(&self.entries).get_mut(Path::new(path)) {
            entry.mtime = mtime;
        }
        self
    }

    /// Pretend the evaluator runs as `uid`. Defaults to root.
    pub fn with_process_uid(mut self, uid: u32) -> Self {
        self.process_uid = uid;
        self
    }

    fn insert(&self, path: &str, kind: FileKind, content: Vec<u8>, mode: u32) {
        let path = PathBuf::from(path);
        let mut entries = lock(&self.entries);
        for parent in path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                continue;
            }
            entries
                .entry(parent.to_path_buf())
                .or_insert_with(|| FakeEntry {
                    kind: FileKind::Directory,
                    content: Vec::new(),
                    mode: 0o755,
                    mtime: 0,
                    uid: 0,
                });
        }
        entries.insert(
            path,
            FakeEntry {
                kind,
                content,
                mode,
                mtime: 0,
                uid: 0,
            },
        );
    }

    fn entry(&self, path: &Path) -> Result<FakeEntry, CollabError> {
        lock(&self.entries)
            .get(path)
            .cloned()
            .ok_or_else(|| CollabError::NotFound {
                path: path.display().to_string(),
            })
    }
}

impl FileSystem for FakeFileSystem {
    fn read(&self, path: &Path, max_bytes: usize) -> Result<Vec<u8>, CollabError> {
        let entry = self.entry(path)?;
        if entry.kind != FileKind::File {
            return Err(CollabError::Io {
                path: path.display().to_string(),
                message: "is a directory".to_string(),
            });
        }
        Ok(entry.content.into_iter().take(max_bytes).collect())
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>, CollabError> {
        if self.entry(path)?.kind != FileKind::Directory {
            return Err(CollabError::Io {
                path: path.display().to_string(),
                message: "not a directory".to_string(),
            });
        }
        Ok(lock(&self.entries)
            .keys()
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect())
    }

    fn stat(&self, path: &Path) -> Result<FileStat, CollabError> {
        let entry = self.entry(path)?;
        Ok(FileStat {
            size: entry.content.len() as u64,
            kind: entry.kind,
            mode: entry.mode,
            mtime: entry.mtime,
            uid: entry.uid,
        })
    }

    fn process_uid(&self) -> u32 {
        self.process_uid
    }
}

// ──────────────────────────────────────────────
// FakeNetwork
// ──────────────────────────────────────────────

/// Replies keyed by `(host, key)`. Unknown keys are refused.
#[derive(Debug, Default)]
pub struct FakeNetwork {
    replies: Mutex<HashMap<(String, String), String>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reply(&self, host: &str, key: &str, reply: &str) {
        lock(&self.replies).insert((host.to_string(), key.to_string()), reply.to_string());
    }

    /// Make a key fail from now on.
    pub fn refuse(&self, host: &str, key: &str) {
        self.set_reply(host, key, &format!("{}refused", BAD_REPLY));
    }
}

impl NetworkQuery for FakeNetwork {
    fn query(&self, _kind: &str, key: &str, host: &str, _encrypted: bool) -> String {
        lock(&self.replies)
            .get(&(host.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_else(|| format!("{}unknown", BAD_REPLY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_fs_creates_parents() {
        let fs = FakeFileSystem::new().with_file("/etc/app/conf", "x=1");
        assert_eq!(fs.stat(Path::new("/etc/app")).unwrap().kind, FileKind::Directory);
        assert_eq!(fs.list_dir(Path::new("/etc")).unwrap(), vec!["app"]);
        assert_eq!(fs.read(Path::new("/etc/app/conf"), 1).unwrap(), b"x");
    }

    #[test]
    fn fake_executor_records_calls() {
        let ex = FakeExecutor::new().with_response("/bin/true", "", 0);
        assert!(ex.run("/bin/true", ShellMode::NoShell).unwrap().success());
        assert!(ex.run("/bin/false", ShellMode::NoShell).is_err());
        assert_eq!(ex.calls().len(), 2);
    }
}
