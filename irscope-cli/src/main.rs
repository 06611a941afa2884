mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // irscope info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("irscope", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Compile {
            path,
            preset,
            inline,
            parallel,
            events,
        } => commands::compile::run(
            path,
            &commands::compile::CompileOptions {
                preset,
                inline: inline.as_deref(),
                parallel: *parallel,
                events: *events,
            },
            &cli.global,
        ),
        Command::Cfg {
            path,
            scope,
            format,
            optimize,
        } => commands::cfg::run(path, scope.as_deref(), format, *optimize),
        Command::Liveness { path, scope } => {
            commands::liveness::run(path, scope.as_deref(), &cli.global)
        }
        Command::Passes { preset, inline } => {
            commands::passes::run(preset, inline.as_deref(), &cli.global)
        }
    }
}
