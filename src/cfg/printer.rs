//! Text and Graphviz renderings of a CFG.

use std::fmt::Write;

use crate::{
    cfg::{Cfg, EdgeType},
    ir::BlockId,
    utils::escape_dot,
};

impl Cfg {
    fn describe_successors(&self, id: BlockId) -> String {
        self.outgoing(id)
            .map(|(dst, ty)| match self.block(dst) {
                Some(block) => format!("{block} ({ty})"),
                None => format!("{dst} ({ty})"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Lists every block followed by its outgoing edges.
    #[must_use]
    pub fn to_string_graph(&self) -> String {
        let mut out = String::from("Blocks:\n");
        for block in self.blocks() {
            let _ = writeln!(out, "  {block}");
        }
        out.push_str("\nGraph:\n");
        for block in self.blocks() {
            let succs = self.describe_successors(block.id());
            if succs.is_empty() {
                let _ = writeln!(out, "  {block}");
            } else {
                let _ = writeln!(out, "  {block} -> {succs}");
            }
        }
        out
    }

    /// Lists every block's instructions in id order.
    ///
    /// ENTRY and EXIT are printed as bare headers. Blocks with a rescuer name
    /// it after the header.
    #[must_use]
    pub fn to_string_instrs(&self) -> String {
        let mut out = String::new();
        for block in self.blocks() {
            let _ = write!(out, "{block}");
            if let Some(rescuer) = self.rescuer_for(block.id()).and_then(|r| self.block(r)) {
                let _ = write!(out, " (rescuer: {})", rescuer.label());
            }
            out.push('\n');
            for instr in block.instrs() {
                let _ = writeln!(out, "  {instr}");
            }
        }
        out
    }

    /// Generates a Graphviz DOT rendering.
    ///
    /// ENTRY is filled green, EXIT red, rescue entries yellow. Edge labels
    /// and colours follow the [`EdgeType`].
    #[must_use]
    pub fn to_dot(&self, title: Option<&str>) -> String {
        let mut dot = String::new();

        dot.push_str("digraph CFG {\n");
        if let Some(name) = title {
            let _ = writeln!(dot, "    label=\"CFG: {}\";", escape_dot(name));
        }
        dot.push_str("    labelloc=t;\n");
        dot.push_str("    node [shape=box, fontname=\"Courier\", fontsize=10];\n");
        dot.push_str("    edge [fontname=\"Courier\", fontsize=9];\n\n");

        for block in self.blocks() {
            let id = block.id();
            let mut label = format!("{}\\l", escape_dot(&block.to_string()));
            for instr in block.instrs() {
                let _ = write!(label, "{}\\l", escape_dot(&instr.to_string()));
            }

            let style = if id == self.entry {
                ", style=filled, fillcolor=lightgreen"
            } else if id == self.exit {
                ", style=filled, fillcolor=lightcoral"
            } else if block.is_rescue_entry() {
                ", style=filled, fillcolor=lightyellow"
            } else {
                ""
            };

            let _ = writeln!(dot, "    B{} [label=\"{label}\"{style}];", id.index());
        }

        dot.push('\n');

        for block in self.blocks() {
            for (dst, ty) in self.outgoing(block.id()) {
                let (edge_label, color, line) = match ty {
                    EdgeType::Regular => ("", "black", "solid"),
                    EdgeType::FallThrough => ("fall", "blue", "solid"),
                    EdgeType::Exception => ("rescue", "purple", "dashed"),
                    EdgeType::Exit => ("exit", "red", "dotted"),
                };
                let _ = writeln!(
                    dot,
                    "    B{} -> B{} [label=\"{edge_label}\", color={color}, style={line}];",
                    block.id().index(),
                    dst.index()
                );
            }
        }

        dot.push_str("}\n");
        dot
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cfg::Cfg,
        ir::{Instr, Label, Operand, ScopeAllocator, Variable},
    };

    fn sample() -> Cfg {
        let instrs = vec![
            Instr::copy(Variable::local("a"), Operand::Str("q\"uote".into())),
            Instr::BTrue {
                value: Variable::local("a").into(),
                target: Label::new("Lout"),
            },
            Instr::Label(Label::new("Lout")),
            Instr::Return {
                value: Variable::local("a").into(),
            },
        ];
        Cfg::build(instrs, &mut ScopeAllocator::default()).unwrap()
    }

    #[test]
    fn test_to_string_graph() {
        let text = sample().to_string_graph();
        assert!(text.starts_with("Blocks:\n"));
        assert!(text.contains("BB [0:_ENTRY] -> BB [2:L0] (fall_through), BB [1:_EXIT] (exit)"));
        assert!(text.contains("BB [3:Lout] -> BB [1:_EXIT] (exit)"));
    }

    #[test]
    fn test_to_string_instrs() {
        let text = sample().to_string_instrs();
        assert!(text.contains("BB [3:Lout]\n  return(a)\n"));
    }

    #[test]
    fn test_to_dot() {
        let dot = sample().to_dot(Some("main"));
        assert!(dot.starts_with("digraph CFG {"));
        assert!(dot.contains("label=\"CFG: main\";"));
        assert!(dot.contains("fillcolor=lightgreen"));
        assert!(dot.contains("fillcolor=lightcoral"));
        assert!(dot.contains("B0 -> B2 [label=\"fall\""));
        assert!(dot.contains("\\\"uote"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
