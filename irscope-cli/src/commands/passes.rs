use irscope::compiler::create_pass;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::config_for,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct PassOutput {
    name: String,
    order: &'static str,
    safe: bool,
    description: &'static str,
}

pub fn run(preset: &str, inline: Option<&str>, global: &GlobalOptions) -> anyhow::Result<()> {
    let config = config_for(preset, inline, false)?;
    let passes: Vec<PassOutput> = config
        .pipeline()
        .into_iter()
        .map(|kind| {
            let pass = create_pass(kind, &config);
            PassOutput {
                name: pass.name().to_string(),
                order: if pass.is_pre_order() { "pre" } else { "post" },
                safe: pass.is_safe(),
                description: pass.description(),
            }
        })
        .collect();

    print_output(&passes, global, |passes| {
        let mut table = TabWriter::new(vec![
            ("#", Align::Right),
            ("Pass", Align::Left),
            ("Order", Align::Left),
            ("Safe", Align::Left),
            ("Description", Align::Left),
        ]);
        for (i, pass) in passes.iter().enumerate() {
            table.row(vec![
                (i + 1).to_string(),
                pass.name.clone(),
                pass.order.to_string(),
                if pass.safe { "yes" } else { "" }.to_string(),
                pass.description.to_string(),
            ]);
        }
        table.print();
    })
}
