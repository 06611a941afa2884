use std::{collections::BTreeMap, path::Path, time::Instant};

use anyhow::Context;
use irscope::{compiler::CompilationContext, ir::IrScope};
use log::info;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{config_for, flatten, load_scope},
    output::{print_output, Align, TabWriter},
};

pub struct CompileOptions<'a> {
    pub preset: &'a str,
    pub inline: Option<&'a str>,
    pub parallel: bool,
    pub events: bool,
}

#[derive(Debug, Serialize)]
struct ScopeOutput {
    id: u32,
    kind: String,
    name: String,
    instructions: Vec<String>,
    rescue_map: Vec<isize>,
}

#[derive(Debug, Serialize)]
struct CompileOutput {
    scopes: Vec<ScopeOutput>,
    event_counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<String>,
}

fn scope_output(scope: &IrScope) -> ScopeOutput {
    let (instructions, rescue_map) = match scope.interpreter_context() {
        Some(ic) => (
            ic.instrs().iter().map(ToString::to_string).collect(),
            ic.rescue_map(),
        ),
        None => (
            scope
                .to_string_instrs()
                .lines()
                .map(str::to_string)
                .collect(),
            Vec::new(),
        ),
    };
    ScopeOutput {
        id: scope.id().0,
        kind: scope.kind().to_string(),
        name: scope.name().to_string(),
        instructions,
        rescue_map,
    }
}

pub fn run(path: &Path, opts: &CompileOptions<'_>, global: &GlobalOptions) -> anyhow::Result<()> {
    let mut root = load_scope(path)?;
    let config = config_for(opts.preset, opts.inline, opts.parallel)?;
    let ctx = CompilationContext::new(config);

    if opts.inline.is_some() {
        let registered = ctx.register_methods_from(&root)?;
        info!("{registered} method bodies available for inlining");
    }

    let started = Instant::now();
    ctx.compile(&mut root)
        .with_context(|| format!("compilation failed: {}", path.display()))?;
    info!(
        "compiled {} scopes in {:.2?}",
        root.scope_count(),
        started.elapsed()
    );

    let output = CompileOutput {
        scopes: flatten(&root).into_iter().map(scope_output).collect(),
        event_counts: ctx
            .events()
            .count_by_kind()
            .into_iter()
            .map(|(kind, count)| (kind.to_string(), count))
            .collect(),
        events: if opts.events {
            ctx.events().iter().map(ToString::to_string).collect()
        } else {
            Vec::new()
        },
    };

    print_output(&output, global, |out| {
        for scope in &out.scopes {
            println!("{} {} (scope {}):", scope.kind, scope.name, scope.id);
            for (ipc, instr) in scope.instructions.iter().enumerate() {
                match scope.rescue_map.get(ipc) {
                    Some(&rescue) if rescue >= 0 => println!("  {ipc:>4}  {instr}  [rescue {rescue}]"),
                    _ => println!("  {ipc:>4}  {instr}"),
                }
            }
            println!();
        }

        let mut table = TabWriter::new(vec![("Event", Align::Left), ("Count", Align::Right)]);
        for (kind, count) in &out.event_counts {
            table.row(vec![kind.clone(), count.to_string()]);
        }
        table.print();

        if !out.events.is_empty() {
            println!();
            for event in &out.events {
                println!("{event}");
            }
        }
    })
}
