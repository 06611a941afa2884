use std::path::Path;

use anyhow::{bail, Context};
use irscope::{
    ir::{persist, IrScope},
    CompilerConfig, IrBuilder,
};

/// Read an AST from JSON and lower it into a scope tree.
pub fn load_scope(path: &Path) -> anyhow::Result<IrScope> {
    let ast = persist::load_ast(path)
        .with_context(|| format!("failed to load AST: {}", path.display()))?;
    IrBuilder::new()
        .build_root(&ast)
        .with_context(|| format!("failed to lower AST: {}", path.display()))
}

/// Resolve a preset name plus command-line overrides into a configuration.
pub fn config_for(
    preset: &str,
    inline: Option<&str>,
    parallel: bool,
) -> anyhow::Result<CompilerConfig> {
    let Some(mut config) = CompilerConfig::preset(preset) else {
        bail!("unknown preset '{preset}' (expected interpreter, jit, safe, or disabled)");
    };
    if let Some(method) = inline {
        config = config.with_inline_target(method);
    }
    Ok(config.with_parallel(parallel))
}

/// Find a scope by name in the tree, the root when `name` is `None`.
pub fn find_scope<'a>(
    root: &'a mut IrScope,
    name: Option<&str>,
) -> anyhow::Result<&'a mut IrScope> {
    fn walk<'a>(scope: &'a mut IrScope, name: &str) -> Option<&'a mut IrScope> {
        if scope.name() == name {
            return Some(scope);
        }
        scope
            .nested_mut()
            .iter_mut()
            .find_map(|child| walk(child, name))
    }

    match name {
        None => Ok(root),
        Some(name) => walk(root, name).with_context(|| format!("no scope named '{name}'")),
    }
}

/// Every scope of the tree, parents before children.
pub fn flatten(root: &IrScope) -> Vec<&IrScope> {
    let mut out = vec![root];
    for child in root.nested() {
        out.extend(flatten(child));
    }
    out
}
