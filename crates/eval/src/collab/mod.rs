//! Collaborator abstraction for everything outside the evaluator.
//!
//! Built-ins never touch processes, files, the network or digest code
//! directly. They go through the traits here so a pass can run against
//! the real system ([`Collaborators::system`]) or against in-memory fakes
//! ([`fake`]).
//!
//! Collaborator errors are never fatal. Call sites turn them into a soft
//! [`FnCallResult::Failure`](crate::FnCallResult::Failure).

pub mod fake;
pub mod system;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ──────────────────────────────────────────────
// CollabError
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollabError {
    #[error("i/o error on '{path}': {message}")]
    Io { path: String, message: String },

    #[error("could not run '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("'{path}' does not exist")]
    NotFound { path: String },

    #[error("{feature} is not supported on this platform")]
    Unsupported { feature: String },
}

impl CollabError {
    pub fn io(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            return CollabError::NotFound {
                path: path.display().to_string(),
            };
        }
        CollabError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }
}

// ──────────────────────────────────────────────
// Processes
// ──────────────────────────────────────────────

/// How a command line is handed to the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellMode {
    UseShell,
    NoShell,
    PowerShell,
}

impl ShellMode {
    pub fn from_option(option: &str) -> Option<ShellMode> {
        match option {
            "useshell" => Some(ShellMode::UseShell),
            "noshell" => Some(ShellMode::NoShell),
            "powershell" => Some(ShellMode::PowerShell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait ProcessExecutor: Send + Sync {
    fn run(&self, command: &str, mode: ShellMode) -> Result<CommandOutput, CollabError>;
}

// ──────────────────────────────────────────────
// Files
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub kind: FileKind,
    /// Unix permission bits. Zero where the platform has none.
    pub mode: u32,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    /// Owner's user id. Zero where the platform has none.
    pub uid: u32,
}

impl FileStat {
    pub fn is_executable(&self) -> bool {
        self.kind == FileKind::File && self.mode & 0o111 != 0
    }
}

pub trait FileSystem: Send + Sync {
    /// Read at most `max_bytes` bytes from the start of a file.
    fn read(&self, path: &Path, max_bytes: usize) -> Result<Vec<u8>, CollabError>;

    /// Names of the entries of a directory, without `.` and `..`.
    fn list_dir(&self, path: &Path) -> Result<Vec<String>, CollabError>;

    fn stat(&self, path: &Path) -> Result<FileStat, CollabError>;

    /// User id the evaluator runs as, compared against file owners.
    fn process_uid(&self) -> u32;

    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }
}

// ──────────────────────────────────────────────
// Network
// ──────────────────────────────────────────────

/// Reply prefix a server uses to refuse a query.
pub const BAD_REPLY: &str = "BAD:";

pub trait NetworkQuery: Send + Sync {
    /// Ask `host` for the value of `key`. A reply starting with
    /// [`BAD_REPLY`] means the query failed.
    fn query(&self, kind: &str, key: &str, host: &str, encrypted: bool) -> String;
}

// ──────────────────────────────────────────────
// Digests
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Accepts both the plain names and the `cf_`-prefixed aliases.
    pub fn from_name(name: &str) -> Option<HashAlgorithm> {
        match name.strip_prefix("cf_").unwrap_or(name) {
            "md5" => Some(HashAlgorithm::Md5),
            "sha1" => Some(HashAlgorithm::Sha1),
            "sha224" => Some(HashAlgorithm::Sha224),
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha384" => Some(HashAlgorithm::Sha384),
            "sha512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait HashProvider: Send + Sync {
    fn digest(&self, bytes: &[u8], algorithm: HashAlgorithm) -> Vec<u8>;

    /// Lowercase hex form of [`HashProvider::digest`].
    fn hex_digest(&self, bytes: &[u8], algorithm: HashAlgorithm) -> String {
        to_hex(&self.digest(bytes, algorithm))
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ──────────────────────────────────────────────
// Collaborators
// ──────────────────────────────────────────────

/// The full set of collaborators one evaluator works with.
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn ProcessExecutor>,
    pub fs: Arc<dyn FileSystem>,
    pub network: Arc<dyn NetworkQuery>,
    pub hasher: Arc<dyn HashProvider>,
}

impl Collaborators {
    /// Real processes, files and digests; an offline network.
    pub fn system() -> Self {
        Self::system_with_timeout(Duration::from_secs(system::DEFAULT_NETWORK_TIMEOUT_SECS))
    }

    pub fn system_with_timeout(network_timeout: Duration) -> Self {
        Collaborators {
            executor: Arc::new(system::SystemExecutor),
            fs: Arc::new(system::SystemFileSystem),
            network: Arc::new(system::OfflineNetwork::new(network_timeout)),
            hasher: Arc::new(system::DigestHasher),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ProcessExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkQuery>) -> Self {
        self.network = network;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
