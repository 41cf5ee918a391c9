//! `cruntime` — compiles and runs C source in-process via an embedded
//! code generator, in three modes: file, inline, and REPL.

mod repl_loop;

use cruntime_runtime::{config::Config, context::RuntimeContext, driver};

fn main() -> anyhow::Result<()> {
    let raw_args: Vec<String> = std::env::args().collect();
    let args = &raw_args[1..];

    let config = Config::from_env();
    let ctx = RuntimeContext::new(&config)?;

    let mode = driver::select_mode(args);

    let exit_code = match driver::run(&ctx, &mode) {
        Some(code) => code,
        None => repl_loop::run(&ctx),
    };

    std::process::exit(exit_code);
}
