//! Collaborators backed by the local system.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, UNIX_EPOCH};

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use tracing::debug;

use super::{
    CollabError, CommandOutput, FileKind, FileStat, FileSystem, HashAlgorithm, HashProvider,
    NetworkQuery, ProcessExecutor, ShellMode, BAD_REPLY,
};

pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 5;

// ──────────────────────────────────────────────
// SystemExecutor
// ──────────────────────────────────────────────

/// Runs commands with `std::process`, capturing stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl ProcessExecutor for SystemExecutor {
    fn run(&self, command: &str, mode: ShellMode) -> Result<CommandOutput, CollabError> {
        let mut cmd = match mode {
            ShellMode::UseShell => {
                let mut c = Command::new("/bin/sh");
                c.arg("-c").arg(command);
                c
            }
            ShellMode::PowerShell => {
                if !cfg!(windows) {
                    return Err(CollabError::Unsupported {
                        feature: "powershell".to_string(),
                    });
                }
                let mut c = Command::new("powershell.exe");
                c.arg("-Command").arg(command);
                c
            }
            ShellMode::NoShell => {
                let words = split_command_line(command);
                let Some((program, args)) = words.split_first() else {
                    return Err(CollabError::Spawn {
                        command: command.to_string(),
                        message: "empty command".to_string(),
                    });
                };
                let mut c = Command::new(program);
                c.args(args);
                c
            }
        };

        debug!(command, ?mode, "running command");
        let output = cmd
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| CollabError::Spawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Split a command line on whitespace, honouring single and double quotes.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

// ──────────────────────────────────────────────
// SystemFileSystem
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFileSystem;

impl FileSystem for SystemFileSystem {
    fn read(&self, path: &Path, max_bytes: usize) -> Result<Vec<u8>, CollabError> {
        let file = fs::File::open(path).map_err(|e| CollabError::io(path, e))?;
        let mut buf = Vec::new();
        file.take(max_bytes as u64)
            .read_to_end(&mut buf)
            .map_err(|e| CollabError::io(path, e))?;
        Ok(buf)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>, CollabError> {
        let entries = fs::read_dir(path).map_err(|e| CollabError::io(path, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CollabError::io(path, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn stat(&self, path: &Path) -> Result<FileStat, CollabError> {
        let meta = fs::metadata(path).map_err(|e| CollabError::io(path, e))?;
        let kind = if meta.is_dir() {
            FileKind::Directory
        } else if meta.is_file() {
            FileKind::File
        } else if meta.file_type().is_symlink() {
            FileKind::Symlink
        } else {
            FileKind::Other
        };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs() as i64);

        Ok(FileStat {
            size: meta.len(),
            kind,
            mode: permission_bits(&meta),
            mtime,
            uid: owner_uid(&meta),
        })
    }

    #[cfg(unix)]
    fn process_uid(&self) -> u32 {
        // SAFETY: getuid has no preconditions and cannot fail.
        unsafe { libc::getuid() }
    }

    #[cfg(not(unix))]
    fn process_uid(&self) -> u32 {
        0
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn owner_uid(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.uid()
}

#[cfg(not(unix))]
fn owner_uid(_meta: &fs::Metadata) -> u32 {
    0
}

// ──────────────────────────────────────────────
// OfflineNetwork
// ──────────────────────────────────────────────

/// Network collaborator for hosts with no remote server configured.
/// Every query is refused, so callers fall back to cached values. The
/// timeout is carried for a real transport to honour and is only reported
/// in the refusal log event here.
#[derive(Debug, Clone, Copy)]
pub struct OfflineNetwork {
    timeout: Duration,
}

impl OfflineNetwork {
    pub fn new(timeout: Duration) -> Self {
        OfflineNetwork { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl NetworkQuery for OfflineNetwork {
    fn query(&self, kind: &str, key: &str, host: &str, _encrypted: bool) -> String {
        debug!(kind, key, host, timeout_secs = self.timeout.as_secs(), "network offline");
        format!("{}offline", BAD_REPLY)
    }
}

// ──────────────────────────────────────────────
// DigestHasher
// ──────────────────────────────────────────────

/// RustCrypto digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestHasher;

impl HashProvider for DigestHasher {
    fn digest(&self, bytes: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
        match algorithm {
            HashAlgorithm::Md5 => Md5::digest(bytes).to_vec(),
            HashAlgorithm::Sha1 => Sha1::digest(bytes).to_vec(),
            HashAlgorithm::Sha224 => Sha224::digest(bytes).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(bytes).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}
