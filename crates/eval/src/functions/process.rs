//! Running commands and modules, and reading the environment.

use std::path::Path;

use tracing::{debug, info, warn};
use vesta_core::{EvalContext, Value};

use super::{fixed, int_arg, text};
use crate::collab::system::split_command_line;
use crate::collab::{CommandOutput, ShellMode};
use crate::contract::{ArgContract, ABSPATH, ANY_STRING, ID_RANGE, PATH, VAL_RANGE};
use crate::evaluator::Evaluator;
use crate::module_protocol::ModuleProtocol;
use crate::registry::{Category, FunctionRegistry, ReturnKind};
use crate::types::{EvalError, FnCallResult};

type CallResult = Result<FnCallResult, EvalError>;

const SHELL_OPTIONS: &str = "useshell,noshell,powershell";

static EXECRESULT_ARGS: [ArgContract; 2] = [
    ArgContract::string(PATH, "command"),
    ArgContract::options(SHELL_OPTIONS, "shell"),
];
static RETURNSZERO_ARGS: [ArgContract; 2] = [
    ArgContract::string(ABSPATH, "command"),
    ArgContract::options(SHELL_OPTIONS, "shell"),
];
static USEMODULE_ARGS: [ArgContract; 2] = [
    ArgContract::string(ANY_STRING, "module"),
    ArgContract::string(ANY_STRING, "args"),
];
static GETENV_ARGS: [ArgContract; 2] = [
    ArgContract::string(ID_RANGE, "name"),
    ArgContract::int(VAL_RANGE, "max_chars"),
];

pub(super) fn register(r: &mut FunctionRegistry) {
    use Category::{System, Utilities};
    use ReturnKind::{Class, Scalar};

    r.register(fixed("execresult", Scalar, &EXECRESULT_ARGS, Utilities, "Standard output of a command", execresult));
    r.register(fixed("returnszero", Class, &RETURNSZERO_ARGS, Utilities, "True if a command exits with status zero", returnszero));
    r.register(fixed("usemodule", Class, &USEMODULE_ARGS, Utilities, "Run a module from the work directory and apply its output", usemodule));
    r.register(fixed("getenv", Scalar, &GETENV_ARGS, System, "Environment variable, truncated to max characters", getenv));
}

/// Run `command` if the shell rules allow it: outside `useshell` the command
/// must be an absolute path, and an absolute command must be executable.
fn run_checked(ev: &Evaluator, function: &str, command: &str, mode: ShellMode) -> Option<CommandOutput> {
    let arg0 = split_command_line(command).into_iter().next().unwrap_or_default();
    let absolute = Path::new(&arg0).is_absolute();
    if !absolute && mode != ShellMode::UseShell {
        debug!(function, command, "command does not have an absolute path");
        return None;
    }
    if absolute {
        let executable = ev
            .collaborators()
            .fs
            .stat(Path::new(&arg0))
            .is_ok_and(|s| s.is_executable());
        if !executable {
            debug!(function, command, "command is assumed to be executable but isn't");
            return None;
        }
    }
    match ev.collaborators().executor.run(command, mode) {
        Ok(output) => Some(output),
        Err(e) => {
            debug!(function, command, error = %e, "command failed to run");
            None
        }
    }
}

fn shell_mode(args: &[Value]) -> ShellMode {
    ShellMode::from_option(&text(args, 1)).unwrap_or(ShellMode::NoShell)
}

fn execresult(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    match run_checked(ev, "execresult", &text(args, 0), shell_mode(args)) {
        Some(output) => {
            let stdout = output.stdout.trim_end_matches(['\n', '\r']);
            Ok(FnCallResult::value(stdout))
        }
        None => Ok(FnCallResult::Failure),
    }
}

fn returnszero(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let ok = run_checked(ev, "returnszero", &text(args, 0), shell_mode(args))
        .is_some_and(|output| output.success());
    Ok(FnCallResult::boolean(ok))
}

fn usemodule(ev: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let module = text(args, 0);
    let module_args = text(args, 1);
    let path = ev.workdir().join("modules").join(&*module);

    let fs = &ev.collaborators().fs;
    let stat = match fs.stat(&path) {
        Ok(stat) => stat,
        Err(e) => {
            debug!(function = "usemodule", module = %path.display(), error = %e, "module not found");
            return Ok(FnCallResult::Failure);
        }
    };
    let uid = fs.process_uid();
    if stat.uid != 0 && stat.uid != uid {
        warn!(module = %path.display(), owner = stat.uid, uid, "module is not owned by root or the running user");
        return Ok(FnCallResult::Failure);
    }

    let command = if module_args.trim().is_empty() {
        format!("\"{}\"", path.display())
    } else {
        format!("\"{}\" {}", path.display(), module_args)
    };
    info!(command = %command, "executing module");

    let output = match ev.collaborators().executor.run(&command, ShellMode::NoShell) {
        Ok(output) => output,
        Err(e) => {
            debug!(function = "usemodule", command = %command, error = %e, "module failed to run");
            return Ok(FnCallResult::Failure);
        }
    };

    let mut protocol = ModuleProtocol::new(&command, ctx.current_namespace());
    protocol.feed(ctx, output.stdout.lines())?;
    Ok(FnCallResult::boolean(true))
}

fn getenv(_: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let limit = int_arg(args, 1).map_or(0, |n| usize::try_from(n).unwrap_or(0));
    let value = std::env::var(&*text(args, 0)).unwrap_or_default();
    Ok(FnCallResult::value(value.chars().take(limit).collect::<String>()))
}
