use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// irscope - lower, compile and inspect IR scope trees
#[derive(Debug, Parser)]
#[command(name = "irscope", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Lower an AST, run the pass pipeline, and print the resulting IR.
    Compile {
        /// Path to the AST in JSON form.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Pipeline preset: interpreter, jit, safe, or disabled.
        #[arg(short, long, default_value = "interpreter")]
        preset: String,

        /// Inline calls to this method (defined in the same file).
        #[arg(long, value_name = "METHOD")]
        inline: Option<String>,

        /// Compile sibling scopes in parallel.
        #[arg(long)]
        parallel: bool,

        /// List every event the passes recorded.
        #[arg(long)]
        events: bool,
    },

    /// Build and print the control-flow graph of one scope.
    Cfg {
        /// Path to the AST in JSON form.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Scope name (method name, `_CLOSURE_<n>`); defaults to the script.
        #[arg(short, long)]
        scope: Option<String>,

        /// Output format: text, dot, or json.
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Merge straight-line blocks and prune unreachable ones first.
        #[arg(long)]
        optimize: bool,
    },

    /// Print live variables before and after every instruction of a scope.
    Liveness {
        /// Path to the AST in JSON form.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Scope name; defaults to the script.
        #[arg(short, long)]
        scope: Option<String>,
    },

    /// List the passes a preset runs, in order.
    Passes {
        /// Pipeline preset: interpreter, jit, safe, or disabled.
        #[arg(short, long, default_value = "interpreter")]
        preset: String,

        /// Include the inline pass for this method.
        #[arg(long, value_name = "METHOD")]
        inline: Option<String>,
    },
}
