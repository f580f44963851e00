//! File reading and file tests, all through the [`FileSystem`] collaborator.
//!
//! [`FileSystem`]: crate::collab::FileSystem

use std::path::Path;

use serde_json::Value as Json;
use tracing::debug;
use vesta_core::{parse_int, parse_real, DataType, EvalContext, Value, VarRef};

use super::{bool_arg, fixed, full_regex, int_arg, reference, resolve_list, search_regex, split_regex, text};
use crate::collab::{FileKind, HashAlgorithm};
use crate::contract::{ArgContract, ABSPATH, ANY_STRING, BOOL_OPTIONS, ID_RANGE, PATH, VAL_RANGE};
use crate::evaluator::Evaluator;
use crate::registry::{Category, FunctionRegistry, ReturnKind};
use crate::types::{EvalError, FnCallResult};

type CallResult = Result<FnCallResult, EvalError>;

static READ_ARGS: [ArgContract; 2] = [
    ArgContract::string(ABSPATH, "path"),
    ArgContract::int(VAL_RANGE, "max_bytes"),
];
static READ_LIST_ARGS: [ArgContract; 5] = [
    ArgContract::string(ABSPATH, "path"),
    ArgContract::string(ANY_STRING, "comment_regex"),
    ArgContract::string(ANY_STRING, "split_regex"),
    ArgContract::int(VAL_RANGE, "max_entries"),
    ArgContract::int(VAL_RANGE, "max_bytes"),
];
static READ_ARRAY_ARGS: [ArgContract; 6] = [
    ArgContract::string(ID_RANGE, "array"),
    ArgContract::string(ABSPATH, "path"),
    ArgContract::string(ANY_STRING, "comment_regex"),
    ArgContract::string(ANY_STRING, "split_regex"),
    ArgContract::int(VAL_RANGE, "max_entries"),
    ArgContract::int(VAL_RANGE, "max_bytes"),
];
static FILE_ARGS: [ArgContract; 1] = [ArgContract::string(ABSPATH, "path")];
static TWO_FILES: [ArgContract; 2] = [
    ArgContract::string(ABSPATH, "newer"),
    ArgContract::string(ABSPATH, "older"),
];
static FILES_LIST: [ArgContract; 1] = [ArgContract::reference(ID_RANGE, "paths")];
static LINE_MATCH_ARGS: [ArgContract; 2] = [
    ArgContract::string(ANY_STRING, "regex"),
    ArgContract::string(ABSPATH, "path"),
];
static LSDIR_ARGS: [ArgContract; 3] = [
    ArgContract::string(PATH, "path"),
    ArgContract::string(ANY_STRING, "regex"),
    ArgContract::options(BOOL_OPTIONS, "include_base"),
];
static HASHMATCH_ARGS: [ArgContract; 3] = [
    ArgContract::string(ABSPATH, "path"),
    ArgContract::options("md5,sha1,cf_sha224,cf_sha256,cf_sha384,cf_sha512", "algorithm"),
    ArgContract::string(ANY_STRING, "hex"),
];

pub(super) fn register(r: &mut FunctionRegistry) {
    use Category::{Data, Files, Io};
    use ReturnKind::{Class, Container, Int, List, Scalar};

    r.register(fixed("readfile", Scalar, &READ_ARGS, Io, "Contents of a file, up to max bytes", readfile));
    r.register(fixed("readjson", Container, &READ_ARGS, Io, "Parse a JSON file into a container", readjson));
    r.register(fixed("readstringlist", List, &READ_LIST_ARGS, Io, "Strings read from a file, comments stripped and split on a regex", readstringlist));
    r.register(fixed("readintlist", List, &READ_LIST_ARGS, Io, "Integers read from a file, comments stripped and split on a regex", readintlist));
    r.register(fixed("readreallist", List, &READ_LIST_ARGS, Io, "Reals read from a file, comments stripped and split on a regex", readreallist));
    r.register(fixed("readstringarray", Int, &READ_ARRAY_ARGS, Io, "Fill an array keyed by first field from a file's lines; returns the line count", readstringarray));
    r.register(fixed("readintarray", Int, &READ_ARRAY_ARGS, Io, "Fill an integer array keyed by first field from a file's lines", readintarray));
    r.register(fixed("readrealarray", Int, &READ_ARRAY_ARGS, Io, "Fill a real array keyed by first field from a file's lines", readrealarray));
    r.register(fixed("readstringarrayidx", Int, &READ_ARRAY_ARGS, Io, "Fill an array keyed by line number from a file's lines", readstringarrayidx));
    r.register(fixed("fileexists", Class, &FILE_ARGS, Files, "True if the path exists", fileexists));
    r.register(fixed("filesexist", Class, &FILES_LIST, Files, "True if every path in the list exists", filesexist));
    r.register(fixed("isexecutable", Class, &FILE_ARGS, Files, "True if the path is an executable file", isexecutable));
    r.register(fixed("isnewerthan", Class, &TWO_FILES, Files, "True if the first file was modified after the second", isnewerthan));
    r.register(fixed("isdir", Class, &FILE_ARGS, Files, "True if the path is a directory", isdir));
    r.register(fixed("isplain", Class, &FILE_ARGS, Files, "True if the path is a plain file", isplain));
    r.register(fixed("filesize", Int, &FILE_ARGS, Files, "Size of a file in bytes", filesize));
    r.register(fixed("lsdir", List, &LSDIR_ARGS, Files, "Directory entries fully matching a regex", lsdir));
    r.register(fixed("countlinesmatching", Int, &LINE_MATCH_ARGS, Io, "Number of lines in a file fully matching a regex", countlinesmatching));
    r.register(fixed("regline", Class, &LINE_MATCH_ARGS, Io, "True if any line in a file fully matches a regex", regline));
    r.register(fixed("hashmatch", Class, &HASHMATCH_ARGS, Data, "True if a file's digest equals the given hex", hashmatch));
}

/// A zero limit means the whole file.
fn byte_limit(args: &[Value], i: usize) -> usize {
    match int_arg(args, i) {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
        _ => usize::MAX,
    }
}

fn read_text(ev: &Evaluator, function: &str, path: &str, max_bytes: usize) -> Option<String> {
    match ev.collaborators().fs.read(Path::new(path), max_bytes) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            debug!(function, path, error = %e, "could not read file");
            None
        }
    }
}

fn readfile(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    match read_text(ev, "readfile", &text(args, 0), byte_limit(args, 1)) {
        Some(contents) => Ok(FnCallResult::value(contents)),
        None => Ok(FnCallResult::Failure),
    }
}

fn readjson(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let path = text(args, 0);
    let Some(contents) = read_text(ev, "readjson", &path, byte_limit(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    match serde_json::from_str::<Json>(&contents) {
        Ok(json) => Ok(FnCallResult::value(json)),
        Err(e) => {
            debug!(function = "readjson", path = %path, error = %e, "invalid JSON");
            Ok(FnCallResult::Failure)
        }
    }
}

#[derive(Clone, Copy)]
pub(super) enum ItemKind {
    String,
    Int,
    Real,
}

impl ItemKind {
    /// The stored form of an item, `None` if it does not parse.
    fn convert(self, item: &str) -> Option<String> {
        match self {
            ItemKind::String => Some(item.to_string()),
            ItemKind::Int => parse_int(item).map(|n| n.to_string()),
            ItemKind::Real => parse_real(item).map(|_| item.trim().to_string()),
        }
    }

    fn data_type(self) -> DataType {
        match self {
            ItemKind::String => DataType::String,
            ItemKind::Int => DataType::Int,
            ItemKind::Real => DataType::Real,
        }
    }
}

/// Remove every match of `comment` from `contents`. An empty pattern
/// strips nothing.
fn strip_comments(function: &str, contents: String, comment: &str) -> Option<String> {
    if comment.is_empty() {
        return Some(contents);
    }
    let re = search_regex(function, comment)?;
    Some(re.replace_all(&contents, "").into_owned())
}

/// Read a file, strip comment matches, split on a regex, and check each
/// item parses as `kind`.
fn read_list(ev: &Evaluator, function: &str, args: &[Value], kind: ItemKind) -> CallResult {
    let path = text(args, 0);
    let Some(contents) = read_text(ev, function, &path, byte_limit(args, 4)) else {
        return Ok(FnCallResult::Failure);
    };

    let Some(contents) = strip_comments(function, contents, &text(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    let Some(split) = search_regex(function, &text(args, 2)) else {
        return Ok(FnCallResult::Failure);
    };
    let max_entries = byte_limit(args, 3);
    let items = split_regex(&contents, &split, max_entries, false);

    let bad = items.iter().find(|item| kind.convert(item).is_none());
    if let Some(bad) = bad {
        debug!(function, path = %path, item = %bad, "item has no recognizable value");
        return Ok(FnCallResult::Failure);
    }
    if items.is_empty() {
        return Ok(FnCallResult::Failure);
    }
    Ok(FnCallResult::list(items))
}

fn readstringlist(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    read_list(ev, "readstringlist", args, ItemKind::String)
}

fn readintlist(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    read_list(ev, "readintlist", args, ItemKind::Int)
}

fn readreallist(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    read_list(ev, "readreallist", args, ItemKind::Real)
}

// ──────────────────────────────────────────────
// Line arrays
// ──────────────────────────────────────────────

/// Most lines one array function will store.
const MAX_ARRAY_LINES: usize = 4000;

/// How rows of a line array are keyed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum RowKey {
    FirstField,
    LineNumber,
}

/// Where a line array comes from and how it is cut up.
pub(super) struct LineArray<'a> {
    pub array: VarRef,
    pub comment: &'a str,
    pub split: &'a str,
    pub max_entries: usize,
    pub kind: ItemKind,
    pub key: RowKey,
}

impl LineArray<'_> {
    /// Store every non-blank line of `contents` as `array[row][field]`
    /// and return the number of lines stored.
    ///
    /// `None` means a regex did not compile or a field did not parse as
    /// the array's item kind.
    pub(super) fn fill(&self, ctx: &mut EvalContext, function: &str, contents: String) -> Option<usize> {
        let contents = strip_comments(function, contents, self.comment)?;
        let split = search_regex(function, self.split)?;
        let limit = self.max_entries.min(MAX_ARRAY_LINES);

        let mut rows = Vec::new();
        for line in contents.split('\n') {
            if rows.len() >= limit {
                break;
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let mut fields = Vec::new();
            for field in split_regex(line, &split, usize::MAX, true) {
                match self.kind.convert(&field) {
                    Some(value) => fields.push(value),
                    None => {
                        debug!(function, line, field = %field, "field has no recognizable value");
                        return None;
                    }
                }
            }
            rows.push(fields);
        }

        for (number, fields) in rows.iter().enumerate() {
            let row = match self.key {
                RowKey::LineNumber => number.to_string(),
                RowKey::FirstField => fields.first().cloned().unwrap_or_default(),
            };
            for (column, field) in fields.iter().enumerate() {
                let entry = self
                    .array
                    .clone()
                    .with_index(row.as_str())
                    .with_index(column.to_string());
                ctx.variable_put(&entry, Value::scalar(field.as_str()), self.kind.data_type());
            }
        }
        debug!(function, array = %self.array, lines = rows.len(), "array filled");
        Some(rows.len())
    }
}

/// Read a file into a line array. An unreadable file stores nothing and
/// counts zero lines.
fn read_array(ev: &Evaluator, ctx: &mut EvalContext, function: &str, args: &[Value], kind: ItemKind, key: RowKey) -> CallResult {
    let Some(array) = reference(&text(args, 0)) else {
        return Ok(FnCallResult::Failure);
    };
    let Some(contents) = read_text(ev, function, &text(args, 1), byte_limit(args, 5)) else {
        return Ok(FnCallResult::value("0"));
    };
    let (comment, split) = (text(args, 2), text(args, 3));
    let lines = LineArray {
        array,
        comment: &comment,
        split: &split,
        max_entries: byte_limit(args, 4),
        kind,
        key,
    };
    match lines.fill(ctx, function, contents) {
        Some(count) => Ok(FnCallResult::value(count.to_string())),
        None => Ok(FnCallResult::Failure),
    }
}

fn readstringarray(ev: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    read_array(ev, ctx, "readstringarray", args, ItemKind::String, RowKey::FirstField)
}

fn readintarray(ev: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    read_array(ev, ctx, "readintarray", args, ItemKind::Int, RowKey::FirstField)
}

fn readrealarray(ev: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    read_array(ev, ctx, "readrealarray", args, ItemKind::Real, RowKey::FirstField)
}

fn readstringarrayidx(ev: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    read_array(ev, ctx, "readstringarrayidx", args, ItemKind::String, RowKey::LineNumber)
}

// ──────────────────────────────────────────────
// Line matching
// ──────────────────────────────────────────────

/// Lines of a file fully matching a regex. `None` for a bad regex; an
/// unreadable file has no lines.
fn matching_lines(ev: &Evaluator, function: &str, args: &[Value]) -> Option<usize> {
    let re = full_regex(function, &text(args, 0))?;
    let contents = read_text(ev, function, &text(args, 1), usize::MAX).unwrap_or_default();
    Some(
        contents
            .lines()
            .filter(|line| re.is_match(line))
            .count(),
    )
}

fn countlinesmatching(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    match matching_lines(ev, "countlinesmatching", args) {
        Some(n) => Ok(FnCallResult::value(n.to_string())),
        None => Ok(FnCallResult::Failure),
    }
}

fn regline(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    match matching_lines(ev, "regline", args) {
        Some(n) => Ok(FnCallResult::boolean(n > 0)),
        None => Ok(FnCallResult::Failure),
    }
}

// ──────────────────────────────────────────────
// File tests
// ──────────────────────────────────────────────

fn stat_kind(ev: &Evaluator, path: &str) -> Option<FileKind> {
    ev.collaborators().fs.stat(Path::new(path)).ok().map(|s| s.kind)
}

fn fileexists(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::boolean(stat_kind(ev, &text(args, 0)).is_some()))
}

fn filesexist(ev: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(paths) = resolve_list(ctx, "filesexist", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    let all = paths.iter().all(|p| stat_kind(ev, p).is_some());
    Ok(FnCallResult::boolean(all))
}

fn isexecutable(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let path = text(args, 0);
    let executable = ev
        .collaborators()
        .fs
        .stat(Path::new(&*path))
        .is_ok_and(|s| s.is_executable());
    Ok(FnCallResult::boolean(executable))
}

/// Both files must exist; otherwise the call fails.
fn isnewerthan(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let fs = &ev.collaborators().fs;
    let (newer, older) = (text(args, 0), text(args, 1));
    match (fs.stat(Path::new(&*newer)), fs.stat(Path::new(&*older))) {
        (Ok(a), Ok(b)) => Ok(FnCallResult::boolean(a.mtime > b.mtime)),
        _ => Ok(FnCallResult::Failure),
    }
}

fn isdir(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::boolean(
        stat_kind(ev, &text(args, 0)) == Some(FileKind::Directory),
    ))
}

fn isplain(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    Ok(FnCallResult::boolean(
        stat_kind(ev, &text(args, 0)) == Some(FileKind::File),
    ))
}

fn filesize(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let path = text(args, 0);
    match ev.collaborators().fs.stat(Path::new(&*path)) {
        Ok(stat) => Ok(FnCallResult::value(stat.size.to_string())),
        Err(_) => Ok(FnCallResult::Failure),
    }
}

fn lsdir(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let dir = text(args, 0);
    let pattern = text(args, 1);
    let include_base = bool_arg(args, 2);

    let regex = if pattern.is_empty() {
        None
    } else {
        match full_regex("lsdir", &pattern) {
            Some(re) => Some(re),
            None => return Ok(FnCallResult::Failure),
        }
    };

    let mut names = match ev.collaborators().fs.list_dir(Path::new(&*dir)) {
        Ok(names) => names,
        Err(e) => {
            debug!(function = "lsdir", path = %dir, error = %e, "directory could not be read");
            return Ok(FnCallResult::value(Value::empty_list()));
        }
    };
    names.sort();

    let entries = names
        .into_iter()
        .filter(|n| regex.as_ref().map_or(true, |re| re.is_match(n)))
        .map(|n| {
            if include_base {
                format!("{}/{}", dir.trim_end_matches('/'), n)
            } else {
                n
            }
        });
    Ok(FnCallResult::list(entries))
}

fn hashmatch(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(algorithm) = HashAlgorithm::from_name(&text(args, 1)) else {
        return Ok(FnCallResult::Failure);
    };
    let path = text(args, 0);
    let collab = ev.collaborators();
    let matches = match collab.fs.read(Path::new(&*path), usize::MAX) {
        Ok(bytes) => {
            let digest = collab.hasher.hex_digest(&bytes, algorithm);
            debug!(function = "hashmatch", path = %path, digest = %digest, "computed file digest");
            digest.eq_ignore_ascii_case(text(args, 2).trim())
        }
        Err(_) => false,
    };
    Ok(FnCallResult::boolean(matches))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::test_support::{put, scalar, strings};
    use super::*;
    use crate::collab::fake::FakeFileSystem;
    use crate::collab::Collaborators;
    use crate::types::Expr;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn evaluator() -> Evaluator {
        let fs = FakeFileSystem::new()
            .with_file("/etc/motd", "hello\n")
            .with_file("/etc/app.json", r#"{"port": 8080}"#)
            .with_file("/etc/bad.json", "{nope")
            .with_file("/data/words", "# header\nalpha beta\ngamma # trailing\n")
            .with_file("/data/ints", "1,2,3k")
            .with_file("/data/reals", "1.5\n2.25\n")
            .with_file("/data/mixed", "1\ntwo\n")
            .with_file("/etc/services.map", "web 10.0.0.1 80\r\n\n# retired\ndb 10.0.0.2 5432\n")
            .with_file("/data/sizes", "1:07\n2:20\n3:30\n")
            .with_file("/data/weights", "a:0.5\n")
            .with_executable("/usr/bin/tool")
            .with_file("/var/new", "")
            .with_mtime("/var/new", 200)
            .with_file("/var/old", "")
            .with_mtime("/var/old", 100)
            .with_file("/srv/www/index.html", "")
            .with_file("/srv/www/about.html", "")
            .with_dir("/srv/www/assets");
        Evaluator::new(Collaborators::system().with_fs(Arc::new(fs)))
    }

    fn run(name: &str, args: &[&str]) -> FnCallResult {
        run_in(&mut EvalContext::new(), name, args)
    }

    fn run_in(ctx: &mut EvalContext, name: &str, args: &[&str]) -> FnCallResult {
        let mut ev = evaluator();
        let args: Vec<Expr> = args.iter().map(|a| Expr::scalar(*a)).collect();
        ev.call_function(ctx, name, &args).unwrap()
    }

    fn entry(ctx: &EvalContext, name: &str) -> Option<Value> {
        ctx.variable_get(&VarRef::parse(name).unwrap()).map(|(v, _)| v)
    }

    #[test]
    fn readfile_limits_and_failures() {
        assert_eq!(scalar(&run("readfile", &["/etc/motd", "0"])), "hello\n");
        assert_eq!(scalar(&run("readfile", &["/etc/motd", "3"])), "hel");
        assert_eq!(run("readfile", &["/etc/missing", "10"]), FnCallResult::Failure);
    }

    #[test]
    fn readfile_rejects_relative_paths() {
        let mut ctx = EvalContext::new();
        let mut ev = evaluator();
        let args = [Expr::scalar("etc/motd"), Expr::scalar("10")];
        assert!(matches!(
            ev.call_function(&mut ctx, "readfile", &args),
            Err(EvalError::ContractViolation { index: 0, .. })
        ));
    }

    #[test]
    fn readjson_parses_files() {
        assert_eq!(
            run("readjson", &["/etc/app.json", "1000"]).as_value(),
            Some(&Value::Container(json!({"port": 8080})))
        );
        assert_eq!(run("readjson", &["/etc/bad.json", "1000"]), FnCallResult::Failure);
    }

    #[test]
    fn read_lists() {
        assert_eq!(
            strings(&run("readstringlist", &["/data/words", "#[^\n]*", r"\s+", "10", "1000"])),
            vec!["alpha", "beta", "gamma"]
        );
        assert_eq!(
            strings(&run("readstringlist", &["/data/words", "#[^\n]*", r"\s+", "2", "1000"])),
            vec!["alpha", "beta"]
        );
        assert_eq!(
            strings(&run("readintlist", &["/data/ints", "", ",", "10", "100"])),
            vec!["1", "2", "3k"]
        );
        assert_eq!(
            strings(&run("readreallist", &["/data/reals", "", "\n", "10", "100"])),
            vec!["1.5", "2.25"]
        );
        assert_eq!(
            run("readintlist", &["/data/mixed", "", "\n", "10", "100"]),
            FnCallResult::Failure
        );
        assert_eq!(
            run("readstringlist", &["/etc/missing", "", "\n", "10", "100"]),
            FnCallResult::Failure
        );
    }

    #[test]
    fn readstringarray_keys_rows_by_first_field() {
        let mut ctx = EvalContext::new();
        let result = run_in(
            &mut ctx,
            "readstringarray",
            &["svc", "/etc/services.map", "#[^\n]*", r"\s+", "10", "0"],
        );
        assert_eq!(scalar(&result), "2");
        assert_eq!(entry(&ctx, "svc[web][0]"), Some(Value::scalar("web")));
        assert_eq!(entry(&ctx, "svc[web][2]"), Some(Value::scalar("80")));
        assert_eq!(entry(&ctx, "svc[db][1]"), Some(Value::scalar("10.0.0.2")));
        assert_eq!(entry(&ctx, "svc[retired][0]"), None);
    }

    #[test]
    fn readstringarrayidx_keys_rows_by_line_number() {
        let mut ctx = EvalContext::new();
        let result = run_in(
            &mut ctx,
            "readstringarrayidx",
            &["svc", "/etc/services.map", "#[^\n]*", r"\s+", "1", "0"],
        );
        assert_eq!(scalar(&result), "1");
        assert_eq!(entry(&ctx, "svc[0][0]"), Some(Value::scalar("web")));
        assert_eq!(entry(&ctx, "svc[1][0]"), None);
    }

    #[test]
    fn typed_arrays_normalize_or_fail() {
        let mut ctx = EvalContext::new();
        assert_eq!(
            scalar(&run_in(&mut ctx, "readintarray", &["size", "/data/sizes", "", ":", "10", "0"])),
            "3"
        );
        assert_eq!(entry(&ctx, "size[1][1]"), Some(Value::scalar("7")));
        assert_eq!(entry(&ctx, "size[3][1]"), Some(Value::scalar("30")));

        assert_eq!(
            run_in(&mut ctx, "readrealarray", &["w", "/data/weights", "", ":", "10", "0"]),
            FnCallResult::Failure
        );
        assert_eq!(entry(&ctx, "w[a][1]"), None);
    }

    #[test]
    fn unreadable_array_file_counts_zero() {
        assert_eq!(
            scalar(&run("readstringarray", &["x", "/etc/missing", "", ",", "10", "0"])),
            "0"
        );
    }

    #[test]
    fn line_matching() {
        assert_eq!(
            scalar(&run("countlinesmatching", &["db .*", "/etc/services.map"])),
            "1"
        );
        assert_eq!(scalar(&run("countlinesmatching", &[".*", "/etc/missing"])), "0");
        assert_eq!(run("regline", &["web .* 80", "/etc/services.map"]).as_bool(), Some(true));
        assert_eq!(run("regline", &["web", "/etc/services.map"]).as_bool(), Some(false));
        assert_eq!(run("regline", &["(", "/etc/services.map"]), FnCallResult::Failure);
    }

    #[test]
    fn more_file_tests() {
        assert_eq!(run("isexecutable", &["/usr/bin/tool"]).as_bool(), Some(true));
        assert_eq!(run("isexecutable", &["/etc/motd"]).as_bool(), Some(false));
        assert_eq!(run("isnewerthan", &["/var/new", "/var/old"]).as_bool(), Some(true));
        assert_eq!(run("isnewerthan", &["/var/old", "/var/new"]).as_bool(), Some(false));
        assert_eq!(run("isnewerthan", &["/var/new", "/var/gone"]), FnCallResult::Failure);

        let mut ctx = EvalContext::new();
        put(&mut ctx, "present", Value::list(["/etc/motd", "/var/new"]));
        put(&mut ctx, "partial", Value::list(["/etc/motd", "/var/gone"]));
        assert_eq!(run_in(&mut ctx, "filesexist", &["@(present)"]).as_bool(), Some(true));
        assert_eq!(run_in(&mut ctx, "filesexist", &["partial"]).as_bool(), Some(false));
    }

    #[test]
    fn file_tests() {
        assert_eq!(run("fileexists", &["/etc/motd"]).as_bool(), Some(true));
        assert_eq!(run("fileexists", &["/etc/nothing"]).as_bool(), Some(false));
        assert_eq!(run("isdir", &["/etc"]).as_bool(), Some(true));
        assert_eq!(run("isdir", &["/etc/motd"]).as_bool(), Some(false));
        assert_eq!(run("isplain", &["/etc/motd"]).as_bool(), Some(true));
        assert_eq!(scalar(&run("filesize", &["/etc/motd"])), "6");
        assert_eq!(run("filesize", &["/etc/nothing"]), FnCallResult::Failure);
    }

    #[test]
    fn lsdir_filters_and_sorts() {
        assert_eq!(
            strings(&run("lsdir", &["/srv/www", ".*\\.html", "false"])),
            vec!["about.html", "index.html"]
        );
        assert_eq!(
            strings(&run("lsdir", &["/srv/www", "", "true"])),
            vec!["/srv/www/about.html", "/srv/www/assets", "/srv/www/index.html"]
        );
        assert!(strings(&run("lsdir", &["/nowhere", "", "false"])).is_empty());
    }

    #[test]
    fn hashmatch_compares_file_digest() {
        // md5("hello\n")
        let hex = "b1946ac92492d2347c6235b4d2611184";
        assert_eq!(run("hashmatch", &["/etc/motd", "md5", hex]).as_bool(), Some(true));
        assert_eq!(run("hashmatch", &["/etc/motd", "md5", "00"]).as_bool(), Some(false));
        assert_eq!(run("hashmatch", &["/etc/missing", "md5", hex]).as_bool(), Some(false));
    }
}
