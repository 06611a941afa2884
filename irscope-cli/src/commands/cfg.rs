use std::path::Path;

use anyhow::bail;
use irscope::cfg::Cfg;
use serde::Serialize;

use crate::commands::common::{find_scope, load_scope};

#[derive(Debug, Serialize)]
struct CfgSuccessorOutput {
    block: usize,
    edge_type: String,
}

#[derive(Debug, Serialize)]
struct CfgBlockOutput {
    id: usize,
    label: String,
    instructions: Vec<String>,
    rescuer: Option<usize>,
    successors: Vec<CfgSuccessorOutput>,
}

#[derive(Debug, Serialize)]
struct CfgOutput {
    scope: String,
    block_count: usize,
    edge_count: usize,
    entry: usize,
    exit: usize,
    blocks: Vec<CfgBlockOutput>,
}

fn cfg_output(name: &str, cfg: &Cfg) -> CfgOutput {
    let blocks = cfg
        .reverse_postorder()
        .into_iter()
        .filter_map(|id| {
            let block = cfg.block(id)?;
            Some(CfgBlockOutput {
                id: id.index(),
                label: block.label().to_string(),
                instructions: block.instrs().iter().map(ToString::to_string).collect(),
                rescuer: cfg.rescuer_for(id).map(|r| r.index()),
                successors: cfg
                    .outgoing(id)
                    .map(|(target, edge)| CfgSuccessorOutput {
                        block: target.index(),
                        edge_type: edge.to_string(),
                    })
                    .collect(),
            })
        })
        .collect();

    CfgOutput {
        scope: name.to_string(),
        block_count: cfg.block_count(),
        edge_count: cfg.edge_count(),
        entry: cfg.entry().index(),
        exit: cfg.exit().index(),
        blocks,
    }
}

pub fn run(path: &Path, scope: Option<&str>, format: &str, optimize: bool) -> anyhow::Result<()> {
    if !matches!(format, "text" | "dot" | "json") {
        bail!("unknown format '{format}' (expected text, dot, or json)");
    }

    let mut root = load_scope(path)?;
    let scope = find_scope(&mut root, scope)?;
    scope.build_cfg()?;
    let name = scope.name().to_string();
    let cfg = scope.require_cfg_mut("cfg")?;
    if optimize {
        cfg.optimize()?;
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&cfg_output(&name, cfg))?),
        "dot" => print!("{}", cfg.to_dot(Some(&name))),
        _ => print!("{}", cfg.to_string_graph()),
    }
    Ok(())
}
