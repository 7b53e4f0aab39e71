use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::sandbox::schema::{self, F_OK, R_OK, W_OK, X_OK};
use crate::sandbox::{CallArg, Gate};

#[derive(Args)]
pub struct CallArgs {
    /// Operation name (see `sandboxfs schema`)
    pub operation: String,

    /// Positional arguments of the call
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Sandbox root directory (repeatable; default: sandbox.roots)
    #[arg(short, long = "root")]
    pub roots: Vec<PathBuf>,
}

pub fn run(args: CallArgs, config: &Config) -> Result<()> {
    let Some(spec) = schema::lookup(&args.operation) else {
        println!("{}: not intercepted", args.operation);
        return Ok(());
    };

    let roots = super::sandbox_roots(&args.roots, config)?;
    let call_args = classify(&args.operation, &args.args);
    let gate = Gate::new(config.resolver());

    gate.check_call(spec.name, &call_args, &roots)?;
    if spec.gating.applies(&call_args) {
        println!("{}: allowed", spec.name);
    } else {
        println!("{}: allowed (not gated for these arguments)", spec.name);
    }
    Ok(())
}

/// Type raw CLI strings the way a real caller would pass them.
///
/// Schema path positions stay paths. Elsewhere integers parse as `Int`;
/// an `access` mode may also be spelled with the letters `f`, `r`, `w`, `x`.
fn classify<'a>(operation: &str, raw: &'a [String]) -> Vec<CallArg<'a>> {
    let path_positions = schema::descriptors_for(operation);

    raw.iter()
        .enumerate()
        .map(|(i, value)| {
            if path_positions.iter().any(|p| p.index == i) {
                return CallArg::Path(Path::new(value));
            }
            if let Ok(n) = value.parse::<i64>() {
                return CallArg::Int(n);
            }
            if operation == "access"
                && let Some(mode) = access_mode(value)
            {
                return CallArg::Int(mode.into());
            }
            CallArg::Text(value)
        })
        .collect()
}

fn access_mode(letters: &str) -> Option<i32> {
    letters.chars().try_fold(F_OK, |mode, c| match c.to_ascii_lowercase() {
        'f' => Some(mode | F_OK),
        'r' => Some(mode | R_OK),
        'w' => Some(mode | W_OK),
        'x' => Some(mode | X_OK),
        _ => None,
    })
}
