#![no_main]

use libfuzzer_sys::fuzz_target;
use irscope::{ast::Node, compiler::CompilationContext, CompilerConfig, IrBuilder};

fuzz_target!(|data: &[u8]| {
    let Ok(node) = serde_json::from_slice::<Node>(data) else {
        return;
    };
    let Ok(mut root) = IrBuilder::new().build_root(&node) else {
        return;
    };
    let ctx = CompilationContext::new(CompilerConfig::default());
    let _ = ctx.compile(&mut root);
});
