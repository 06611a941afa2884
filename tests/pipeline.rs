//! End-to-end compilation: AST in, interpreter instruction lists out.

use irscope::prelude::*;

fn build(ast: &Node) -> IrScope {
    IrBuilder::new().build_root(ast).unwrap()
}

fn compile(ast: &Node, config: CompilerConfig) -> (IrScope, CompilationContext) {
    let mut root = build(ast);
    let ctx = CompilationContext::new(config);
    ctx.compile(&mut root).unwrap();
    (root, ctx)
}

fn interpreted(scope: &IrScope) -> &[Instr] {
    scope
        .interpreter_context()
        .expect("scope was not linearized")
        .instrs()
}

fn position(instrs: &[Instr], pred: impl Fn(&Instr) -> bool) -> usize {
    instrs.iter().position(pred).expect("instruction not found")
}

fn calls_named(instrs: &[Instr], name: &str) -> usize {
    instrs
        .iter()
        .filter(|i| matches!(i, Instr::Call(c) if c.method.name == name))
        .count()
}

fn each_block(body: Node) -> Node {
    Node::Call {
        receiver: None,
        name: "each".into(),
        args: vec![],
        block: Some(Box::new(Node::Iter {
            params: vec![],
            body: Box::new(body),
        })),
    }
}

fn collect_text(scope: &IrScope, out: &mut Vec<String>) {
    out.push(format!("{} {}", scope.id(), scope.name()));
    if let Some(ic) = scope.interpreter_context() {
        out.extend(ic.instrs().iter().map(ToString::to_string));
    }
    for child in scope.nested() {
        collect_text(child, out);
    }
}

#[test]
fn dead_store_is_dropped_from_interpreter_list() {
    let ast = Node::seq(vec![
        Node::assign("a", Node::int(1)),
        Node::assign("a", Node::int(2)),
        Node::var("a"),
    ]);
    let (root, ctx) = compile(&ast, CompilerConfig::interpreter());

    let first_store = Instr::copy(Variable::local("a"), Operand::Fixnum(1));
    assert!(!interpreted(&root).contains(&first_store));
    assert!(ctx.events().has(EventKind::InstructionRemoved));
}

#[test]
fn arithmetic_on_constants_folds_behind_a_guard() {
    let ast = Node::seq(vec![
        Node::assign("a", Node::int(1)),
        Node::call(Node::var("a"), "+", vec![Node::int(2)]),
    ]);
    let (root, ctx) = compile(&ast, CompilerConfig::interpreter());
    let instrs = interpreted(&root);

    assert_eq!(calls_named(instrs, "+"), 0);
    let guard = position(instrs, |i| matches!(i, Instr::AssertMethodVersion { .. }));
    let folded = position(
        instrs,
        |i| matches!(i, Instr::Copy { value: Operand::Fixnum(3), .. }),
    );
    assert!(guard < folded);
    assert!(instrs.contains(&Instr::Return {
        value: Operand::Fixnum(3)
    }));
    assert!(ctx.events().has(EventKind::ConstantFolded));
    assert!(ctx.events().has(EventKind::GuardInserted));
}

#[test]
fn captured_local_is_stored_before_and_loaded_after_the_block_call() {
    let ast = Node::seq(vec![
        Node::assign("x", Node::int(1)),
        each_block(Node::assign(
            "x",
            Node::call(Node::var("x"), "+", vec![Node::int(1)]),
        )),
        Node::var("x"),
    ]);
    let (root, ctx) = compile(&ast, CompilerConfig::interpreter());
    let instrs = interpreted(&root);
    let x = Variable::local("x");

    let store = position(instrs, |i| *i == Instr::StoreLocalVar { local: x.clone() });
    let call = position(instrs, |i| matches!(i, Instr::Call(c) if c.method.name == "each"));
    let load = position(instrs, |i| *i == Instr::LoadLocalVar { local: x.clone() });
    assert!(store < call && call < load);
    assert!(ctx.events().has(EventKind::StoreInserted));
    assert!(ctx.events().has(EventKind::LoadInserted));
}

#[test]
fn end_blocks_restrict_the_tree_to_safe_passes() {
    let ast = Node::seq(vec![
        Node::EndBlock {
            body: Box::new(Node::Nil),
        },
        Node::assign("a", Node::int(1)),
        Node::assign("a", Node::int(2)),
        Node::var("a"),
    ]);
    let (root, ctx) = compile(&ast, CompilerConfig::interpreter());

    assert!(root.is_unsafe_for_optimization());
    assert!(root.dominators().is_none());
    let first_store = Instr::copy(Variable::local("a"), Operand::Fixnum(1));
    assert!(interpreted(&root).contains(&first_store));
    assert!(!interpreted(&root.nested()[0]).is_empty());
    assert!(!ctx.events().has(EventKind::InstructionRemoved));
    assert!(ctx.events().has(EventKind::Info));
}

#[test]
fn parallel_and_sequential_compilation_agree() {
    let method = |name: &str| Node::Def {
        name: name.into(),
        params: vec!["n".into()],
        optional: vec![],
        block_param: None,
        body: Box::new(Node::seq(vec![
            Node::assign("m", Node::call(Node::var("n"), "*", vec![Node::int(2)])),
            Node::assign("m", Node::call(Node::var("m"), "+", vec![Node::int(1)])),
            Node::var("m"),
        ])),
    };
    let ast = Node::seq(vec![
        method("a"),
        method("b"),
        method("c"),
        Node::assign("total", Node::int(0)),
        each_block(Node::assign(
            "total",
            Node::call(Node::var("total"), "+", vec![Node::int(1)]),
        )),
        Node::While {
            condition: Box::new(Node::call(Node::var("total"), "<", vec![Node::int(10)])),
            body: Box::new(Node::assign(
                "total",
                Node::call(Node::var("total"), "+", vec![Node::int(2)]),
            )),
        },
    ]);

    let (sequential, _) = compile(&ast, CompilerConfig::interpreter());
    let (parallel, _) = compile(&ast, CompilerConfig::interpreter().with_parallel(true));

    let (mut left, mut right) = (Vec::new(), Vec::new());
    collect_text(&sequential, &mut left);
    collect_text(&parallel, &mut right);
    assert_eq!(left, right);
}

#[test]
fn inline_target_is_spliced_with_renamed_locals() {
    let ast = Node::seq(vec![
        Node::Def {
            name: "add_one".into(),
            params: vec!["x".into()],
            optional: vec![],
            block_param: None,
            body: Box::new(Node::call(Node::var("x"), "+", vec![Node::int(1)])),
        },
        Node::assign("x", Node::int(5)),
        Node::Call {
            receiver: None,
            name: "add_one".into(),
            args: vec![Node::var("x")],
            block: None,
        },
    ]);
    let mut root = build(&ast);
    let ctx = CompilationContext::new(CompilerConfig::interpreter().with_inline_target("add_one"));
    assert_eq!(ctx.register_methods_from(&root).unwrap(), 1);
    ctx.compile(&mut root).unwrap();

    let instrs = interpreted(&root);
    // The only call left is the fallback behind the version guard
    assert_eq!(calls_named(instrs, "add_one"), 1);
    let guard = position(instrs, |i| matches!(i, Instr::GuardMethodVersion { .. }));
    let fallback = position(instrs, |i| matches!(i, Instr::Call(c) if c.method.name == "add_one"));
    let ic = root.interpreter_context().unwrap();
    let target = instrs[guard]
        .branch_target()
        .and_then(|label| ic.label_ipc(label))
        .unwrap();
    assert!(target <= fallback);
    assert!(instrs
        .iter()
        .filter_map(Instr::result)
        .any(|v| matches!(v, Variable::Inlined { .. })));
    assert!(ctx.events().has(EventKind::MethodInlined));

    // The method body itself is compiled untouched
    let method = &root.nested()[0];
    assert_eq!(calls_named(interpreted(method), "+"), 1);
}

#[test]
fn every_scope_in_the_tree_is_linearized() {
    let ast = Node::seq(vec![
        Node::Def {
            name: "m".into(),
            params: vec![],
            optional: vec![],
            block_param: None,
            body: Box::new(each_block(each_block(Node::Nil))),
        },
        Node::EndBlock {
            body: Box::new(Node::Nil),
        },
    ]);
    let (root, _) = compile(&ast, CompilerConfig::safe());

    let mut pending = vec![&root];
    let mut seen = 0;
    while let Some(scope) = pending.pop() {
        seen += 1;
        let ic = scope.interpreter_context().unwrap();
        assert!(ic.instrs().iter().any(|i| matches!(i, Instr::Return { .. })));
        pending.extend(scope.nested());
    }
    assert_eq!(seen, root.scope_count());
}

#[test]
fn disabled_pipeline_leaves_scopes_flat() {
    let (root, ctx) = compile(&Node::assign("a", Node::int(1)), CompilerConfig::disabled());
    assert!(!root.has_cfg());
    assert!(root.interpreter_context().is_none());
    assert_eq!(ctx.events().transformation_count(), 0);
}
