use std::path::Path;

use irscope::dataflow::{DataFlowSolver, LiveVariables};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{find_scope, load_scope},
    output::print_output,
};

#[derive(Debug, Serialize)]
struct BlockLiveness {
    block: usize,
    label: String,
    live_in: Vec<String>,
    live_out: Vec<String>,
}

#[derive(Debug, Serialize)]
struct LivenessOutput {
    scope: String,
    variables: usize,
    iterations: usize,
    blocks: Vec<BlockLiveness>,
    #[serde(skip)]
    text: String,
}

fn names(vars: Vec<irscope::ir::Variable>) -> Vec<String> {
    vars.iter().map(ToString::to_string).collect()
}

pub fn run(path: &Path, scope: Option<&str>, global: &GlobalOptions) -> anyhow::Result<()> {
    let mut root = load_scope(path)?;
    let scope = find_scope(&mut root, scope)?;
    scope.build_cfg()?;
    let liveness = LiveVariables::compute(scope, &DataFlowSolver::new())?;
    let cfg = scope.require_cfg("liveness")?;

    let output = LivenessOutput {
        scope: scope.name().to_string(),
        variables: liveness.vars().len(),
        iterations: liveness.iterations(),
        blocks: cfg
            .reverse_postorder()
            .into_iter()
            .filter_map(|id| {
                let block = cfg.block(id)?;
                Some(BlockLiveness {
                    block: id.index(),
                    label: block.label().to_string(),
                    live_in: names(liveness.live_in(id)),
                    live_out: names(liveness.live_out(id)),
                })
            })
            .collect(),
        text: liveness.to_string_per_instr(cfg),
    };

    print_output(&output, global, |out| {
        println!(
            "{}: {} variables, solved in {} iterations",
            out.scope, out.variables, out.iterations
        );
        print!("{}", out.text);
    })
}
