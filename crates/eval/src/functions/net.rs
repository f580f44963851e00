use tracing::{debug, warn};
use vesta_core::{canonify, ContextScope, DataType, EvalContext, Value};

use super::{bool_arg, fixed, full_regex, int_arg, reference, resolve_list, text};
use crate::collab::BAD_REPLY;
use crate::contract::{ArgContract, ANY_STRING, BOOL_OPTIONS, ID_RANGE, VAL_RANGE};
use crate::evaluator::Evaluator;
use crate::registry::{Category, FunctionRegistry, ReturnKind};
use crate::types::{EvalError, FnCallResult};

type CallResult = Result<FnCallResult, EvalError>;

const REMOTESCALAR: &str = "remotescalar";
const REMOTECLASSES: &str = "remoteclassesmatching";

/// Most bytes of a server reply `selectservers` looks at.
const MAX_SELECT_BYTES: usize = 4096;

static REMOTESCALAR_ARGS: [ArgContract; 3] = [
    ArgContract::string(ID_RANGE, "handle"),
    ArgContract::string(ANY_STRING, "host"),
    ArgContract::options(BOOL_OPTIONS, "encrypt"),
];

static REMOTECLASSES_ARGS: [ArgContract; 4] = [
    ArgContract::string(ANY_STRING, "regex"),
    ArgContract::string(ANY_STRING, "host"),
    ArgContract::options(BOOL_OPTIONS, "encrypt"),
    ArgContract::string(ID_RANGE, "prefix"),
];
static SELECTSERVERS_ARGS: [ArgContract; 6] = [
    ArgContract::reference(ID_RANGE, "hosts"),
    ArgContract::int(VAL_RANGE, "port"),
    ArgContract::string(ANY_STRING, "send"),
    ArgContract::string(ANY_STRING, "regex"),
    ArgContract::int(VAL_RANGE, "max_bytes"),
    ArgContract::string(ID_RANGE, "array"),
];

pub(super) fn register(r: &mut FunctionRegistry) {
    use Category::Communication;
    use ReturnKind::{Class, Int, Scalar};

    r.register(fixed(REMOTESCALAR, Scalar, &REMOTESCALAR_ARGS, Communication, "Value a remote server publishes under a handle", remotescalar));
    r.register(fixed(REMOTECLASSES, Class, &REMOTECLASSES_ARGS, Communication, "Define prefixed classes for the remote classes matching a regex", remoteclassesmatching));
    r.register(fixed("selectservers", Int, &SELECTSERVERS_ARGS, Communication, "Count hosts whose reply matches a regex, storing them in an array", selectservers));
}

fn server_address(host: &str) -> String {
    match host {
        "localhost" => "127.0.0.1".to_string(),
        other => other.to_string(),
    }
}

/// Ask a server for a published value. A refused query falls back to the
/// last value seen for the handle, or the empty string.
fn remotescalar(ev: &mut Evaluator, _: &mut EvalContext, args: &[Value]) -> CallResult {
    let handle = text(args, 0).into_owned();
    let host = server_address(&text(args, 1));
    let encrypted = bool_arg(args, 2);

    let reply = ev.collaborators().network.query("VAR", &handle, &host, encrypted);
    if reply.starts_with(BAD_REPLY) {
        let cached = ev.cache().get(REMOTESCALAR, &handle).unwrap_or("");
        warn!(handle = %handle, host = %host, reply = %reply, "remote query failed, using cached value");
        return Ok(FnCallResult::value(cached));
    }

    debug!(handle = %handle, host = %host, "remote value received");
    ev.cache_mut().put(REMOTESCALAR, &handle, &reply);
    Ok(FnCallResult::value(reply))
}

/// Ask a server which of its classes match a regex and define each one
/// locally as `prefix_<class>`. A refused query reuses the last reply.
fn remoteclassesmatching(ev: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let pattern = text(args, 0).into_owned();
    let host = server_address(&text(args, 1));
    let encrypted = bool_arg(args, 2);
    let prefix = text(args, 3).into_owned();

    let reply = ev.collaborators().network.query("CONTEXT", &pattern, &host, encrypted);
    let classes = if reply.starts_with(BAD_REPLY) {
        match ev.cache().get(REMOTECLASSES, &pattern) {
            Some(cached) => {
                warn!(regex = %pattern, host = %host, reply = %reply, "remote class query failed, using cached reply");
                cached.to_string()
            }
            None => {
                debug!(regex = %pattern, host = %host, reply = %reply, "remote class query failed");
                return Ok(FnCallResult::Failure);
            }
        }
    } else {
        ev.cache_mut().put(REMOTECLASSES, &pattern, &reply);
        reply
    };

    let ns = ctx.current_namespace().to_string();
    let scope = if ctx.current_bundle().is_some() {
        ContextScope::Bundle
    } else {
        ContextScope::Namespace
    };
    for name in classes.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let class = canonify(&format!("{}_{}", prefix, name));
        if let Err(e) = ctx.class_activate(&ns, &class, true, scope) {
            debug!(class = %class, error = %e, "remote class not defined");
        }
    }
    Ok(FnCallResult::boolean(true))
}

/// Send a string to each host and keep the ones whose reply fully
/// matches the regex. Survivors land in `array[0]`, `array[1]`, ...
fn selectservers(ev: &mut Evaluator, ctx: &mut EvalContext, args: &[Value]) -> CallResult {
    let Some(hosts) = resolve_list(ctx, "selectservers", &args[0]) else {
        return Ok(FnCallResult::Failure);
    };
    let (Some(port), Some(max_bytes)) = (int_arg(args, 1), int_arg(args, 4)) else {
        return Ok(FnCallResult::Failure);
    };
    if port < 0 || max_bytes < 0 {
        return Ok(FnCallResult::Failure);
    }
    let max_bytes = match usize::try_from(max_bytes) {
        Ok(n) if n > 0 => n.min(MAX_SELECT_BYTES),
        _ => MAX_SELECT_BYTES,
    };
    let send = text(args, 2).into_owned();
    let pattern = text(args, 3);
    let regex = if pattern.is_empty() {
        None
    } else {
        match full_regex("selectservers", &pattern) {
            Some(re) => Some(re),
            None => return Ok(FnCallResult::Failure),
        }
    };
    let Some(array) = reference(&text(args, 5)) else {
        return Ok(FnCallResult::Failure);
    };

    let mut count = 0usize;
    for host in hosts {
        if host.is_empty() || host.contains("$(") || host.contains("${") {
            continue;
        }
        let address = format!("{}:{}", server_address(&host), port);
        let reply = ev.collaborators().network.query("TCP", &send, &address, false);
        if reply.starts_with(BAD_REPLY) {
            debug!(host = %host, reply = %reply, "server did not answer");
            continue;
        }
        let reply: String = reply.chars().take(max_bytes).collect();
        if regex.as_ref().map_or(true, |re| re.is_match(&reply)) {
            ctx.variable_put(
                &array.clone().with_index(count.to_string()),
                Value::scalar(host.as_str()),
                DataType::String,
            );
            count += 1;
        }
    }
    debug!(function = "selectservers", count, "servers selected");
    Ok(FnCallResult::value(count.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::test_support::put;
    use super::*;
    use crate::collab::fake::FakeNetwork;
    use crate::collab::Collaborators;
    use crate::types::Expr;
    use pretty_assertions::assert_eq;
    use vesta_core::VarRef;

    fn ask(ev: &mut Evaluator, handle: &str, host: &str) -> FnCallResult {
        let args = [Expr::scalar(handle), Expr::scalar(host), Expr::scalar("no")];
        ev.call_function(&mut EvalContext::new(), REMOTESCALAR, &args).unwrap()
    }

    #[test]
    fn falls_back_to_last_good_value() {
        let network = Arc::new(FakeNetwork::new());
        let mut ev = Evaluator::new(Collaborators::system().with_network(network.clone()));

        assert_eq!(ask(&mut ev, "motd", "hub").as_value(), Some(&Value::scalar("")));

        network.set_reply("hub", "motd", "hello");
        assert_eq!(ask(&mut ev, "motd", "hub").as_value(), Some(&Value::scalar("hello")));

        network.refuse("hub", "motd");
        assert_eq!(ask(&mut ev, "motd", "hub").as_value(), Some(&Value::scalar("hello")));
    }

    fn remote_classes(ev: &mut Evaluator, ctx: &mut EvalContext, host: &str) -> FnCallResult {
        let args = [
            Expr::scalar("web_.*"),
            Expr::scalar(host),
            Expr::scalar("no"),
            Expr::scalar("hub"),
        ];
        ev.call_function(ctx, REMOTECLASSES, &args).unwrap()
    }

    #[test]
    fn remote_classes_are_defined_with_prefix() {
        let network = Arc::new(FakeNetwork::new());
        network.set_reply("hub", "web_.*", "web_front,web_back");
        let mut ev = Evaluator::new(Collaborators::system().with_network(network));
        let mut ctx = EvalContext::new();

        assert_eq!(remote_classes(&mut ev, &mut ctx, "hub").as_bool(), Some(true));
        assert!(ctx.class_is_defined("default", "hub_web_front"));
        assert!(ctx.class_is_defined("default", "hub_web_back"));
    }

    #[test]
    fn remote_classes_fall_back_to_cached_reply() {
        let network = Arc::new(FakeNetwork::new());
        let mut ev = Evaluator::new(Collaborators::system().with_network(network.clone()));

        assert_eq!(remote_classes(&mut ev, &mut EvalContext::new(), "hub"), FnCallResult::Failure);

        network.set_reply("hub", "web_.*", "web_front");
        assert_eq!(remote_classes(&mut ev, &mut EvalContext::new(), "hub").as_bool(), Some(true));

        network.refuse("hub", "web_.*");
        let mut ctx = EvalContext::new();
        assert_eq!(remote_classes(&mut ev, &mut ctx, "hub").as_bool(), Some(true));
        assert!(ctx.class_is_defined("default", "hub_web_front"));
    }

    fn select(ev: &mut Evaluator, ctx: &mut EvalContext, port: &str, regex: &str) -> FnCallResult {
        let args = [
            Expr::scalar("servers"),
            Expr::scalar(port),
            Expr::scalar("HEAD /"),
            Expr::scalar(regex),
            Expr::scalar("100"),
            Expr::scalar("up"),
        ];
        ev.call_function(ctx, "selectservers", &args).unwrap()
    }

    #[test]
    fn selectservers_keeps_matching_hosts_in_order() {
        let network = Arc::new(FakeNetwork::new());
        network.set_reply("web1:80", "HEAD /", "HTTP/1.1 200 OK");
        network.set_reply("web2:80", "HEAD /", "HTTP/1.1 503 Busy");
        network.set_reply("web4:80", "HEAD /", "HTTP/1.0 200 OK");
        let mut ev = Evaluator::new(Collaborators::system().with_network(network));
        let mut ctx = EvalContext::new();
        put(&mut ctx, "servers", Value::list(["web1", "web2", "web3", "web4"]));

        let result = select(&mut ev, &mut ctx, "80", "HTTP/1\\.. 200.*");
        assert_eq!(result.as_value(), Some(&Value::scalar("2")));
        let get = |ctx: &EvalContext, name: &str| {
            ctx.variable_get(&VarRef::parse(name).unwrap()).map(|(v, _)| v)
        };
        assert_eq!(get(&ctx, "up[0]"), Some(Value::scalar("web1")));
        assert_eq!(get(&ctx, "up[1]"), Some(Value::scalar("web4")));
        assert_eq!(get(&ctx, "up[2]"), None);
    }

    #[test]
    fn selectservers_needs_a_list() {
        let mut ev = Evaluator::new(Collaborators::system().with_network(Arc::new(FakeNetwork::new())));
        let mut ctx = EvalContext::new();
        put(&mut ctx, "servers", Value::scalar("web1"));
        assert_eq!(select(&mut ev, &mut ctx, "80", ""), FnCallResult::Failure);
    }

    #[test]
    fn localhost_means_loopback() {
        let network = Arc::new(FakeNetwork::new());
        network.set_reply("127.0.0.1", "motd", "local");
        let mut ev = Evaluator::new(Collaborators::system().with_network(network));
        assert_eq!(ask(&mut ev, "motd", "localhost").as_value(), Some(&Value::scalar("local")));
    }
}
