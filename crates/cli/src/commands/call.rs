use std::process;

use serde_json::json;
use vesta_core::{Bundle, Value, DEFAULT_SCOPE};
use vesta_eval::{CallValue, EvalError, FnCallResult};

use super::evaluator;
use super::seed::{seed_context, SeedArgs};
use crate::config::VestaConfig;
use crate::{print_json, report_error, OutputFormat, EXIT_FATAL, EXIT_USAGE};

pub(crate) fn cmd_call(
    expr: &str,
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

    let mut ev = evaluator(config);
    let bundle = Bundle::new(&config.namespace, DEFAULT_SCOPE);
    let result = ctx.with_frame(bundle, |ctx| ev.call_expression(ctx, expr));

    match result {
        Ok(FnCallResult::Success(value)) => print_success(value, output),
        Ok(FnCallResult::Failure) => match output {
            OutputFormat::Json => print_json(&json!({ "status": "failure" })),
            OutputFormat::Text => {
                if !quiet {
                    eprintln!("call did not resolve: {}", expr);
                }
            }
        },
        Err(e @ EvalError::Parse { .. }) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(EXIT_USAGE);
        }
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(EXIT_FATAL);
        }
    }
}

fn print_success(value: CallValue, output: OutputFormat) {
    match output {
        OutputFormat::Json => {
            let value = match value {
                CallValue::Bool(b) => json!(b),
                CallValue::Value(v) => v.to_json(),
            };
            print_json(&json!({ "status": "success", "value": value }));
        }
        OutputFormat::Text => match value.into_value() {
            Value::Scalar(s) => println!("{}", s),
            list @ Value::List(_) => {
                for item in list.list_strings().unwrap_or_default() {
                    println!("{}", item);
                }
            }
            Value::Container(json) => print_json(&json),
        },
    }
}
