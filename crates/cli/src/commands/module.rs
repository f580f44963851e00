use std::process;

use serde_json::json;
use tracing::warn;
use vesta_core::reference::class_ref_to_string;
use vesta_core::EvalContext;
use vesta_eval::collab::ShellMode;
use vesta_eval::ModuleProtocol;

use super::evaluator;
use super::seed::{seed_context, SeedArgs};
use crate::config::VestaConfig;
use crate::{print_json, report_error, OutputFormat, EXIT_FATAL, EXIT_USAGE};

pub(crate) fn cmd_module(
    command: &str,
    seed: &SeedArgs,
    config: &VestaConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let mut ctx = match seed_context(seed, config) {
        Ok(ctx) => ctx,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(EXIT_USAGE);
        }
    };

    let ev = evaluator(config);
    let run = match ev.collaborators().executor.run(command, ShellMode::NoShell) {
        Ok(run) => run,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(EXIT_FATAL);
        }
    };
    if !run.success() {
        warn!(command, exit_code = run.exit_code, "module exited with non-zero status");
    }

    let mut protocol = ModuleProtocol::new(command, &config.namespace);
    if let Err(e) = protocol.feed(&mut ctx, run.stdout.lines()) {
        report_error(&format!("error: {}", e), output, quiet);
        process::exit(EXIT_FATAL);
    }

    match output {
        OutputFormat::Json => print_json(&context_json(&ctx, &protocol)),
        OutputFormat::Text => print_context(&ctx),
    }
}

fn print_context(ctx: &EvalContext) {
    for class in ctx.global_classes().iter() {
        let kind = if class.is_hard() { "hard" } else { "soft" };
        println!("class {} ({})", class_ref_to_string(&class.ns, &class.name), kind);
    }
    for variable in ctx.visible_variables() {
        println!("var {} = {}", variable.reference, variable.value);
    }
}

fn context_json(ctx: &EvalContext, protocol: &ModuleProtocol) -> serde_json::Value {
    let classes: Vec<serde_json::Value> = ctx
        .global_classes()
        .iter()
        .map(|c| {
            json!({
                "name": class_ref_to_string(&c.ns, &c.name),
                "hard": c.is_hard(),
                "tags": c.tags,
            })
        })
        .collect();
    let variables: serde_json::Map<String, serde_json::Value> = ctx
        .visible_variables()
        .into_iter()
        .map(|v| (v.reference.to_string(), v.value.to_json()))
        .collect();
    json!({
        "context": protocol.context(),
        "classes": classes,
        "variables": variables,
    })
}
