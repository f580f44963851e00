use std::process;

use serde_json::json;
use vesta_eval::{Category, FunctionDescriptor, FunctionRegistry};

use crate::{print_json, report_error, OutputFormat, EXIT_USAGE};

pub(crate) fn cmd_functions(category: Option<&str>, output: OutputFormat, quiet: bool) {
    let filter = match category.map(Category::from_name) {
        None => None,
        Some(Some(c)) => Some(c),
        Some(None) => {
            let valid: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
            let msg = format!(
                "unknown category '{}'. Valid: {}",
                category.unwrap_or_default(),
                valid.join(", ")
            );
            report_error(&msg, output, quiet);
            process::exit(EXIT_USAGE);
        }
    };

    let registry = FunctionRegistry::builtin();
    let selected: Vec<&FunctionDescriptor> = registry
        .iter()
        .filter(|d| filter.map_or(true, |c| d.category == c))
        .collect();

    match output {
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = selected.iter().map(|d| descriptor_json(d)).collect();
            print_json(&json!(entries));
        }
        OutputFormat::Text => {
            for d in selected {
                println!("{:<14} {:<60} {}", d.category.as_str(), d.signature(), d.synopsis);
            }
        }
    }
}

fn descriptor_json(d: &FunctionDescriptor) -> serde_json::Value {
    let args: Vec<serde_json::Value> = d
        .args
        .iter()
        .map(|a| {
            json!({
                "name": a.description,
                "type": a.arg_type.as_str(),
                "accepts": a.expectation(),
            })
        })
        .collect();
    json!({
        "name": d.name,
        "category": d.category.as_str(),
        "returns": d.return_kind.as_str(),
        "variadic": d.variadic,
        "args": args,
        "synopsis": d.synopsis,
    })
}
