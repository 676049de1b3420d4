//! `stackplan outputs` - show the applied outputs of a stack

use anyhow::{Context as AnyhowContext, Result, bail};

use super::Session;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, stack: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    if session.project.stack(stack).is_none() {
        bail!("Unknown stack '{stack}'");
    }

    let Some(record) = session.store.get(stack) else {
        ui::warn(&format!("Stack '{stack}' has not been applied yet"));
        return Ok(());
    };

    ui::header(&format!("Outputs of '{stack}'"));
    if record.applied.outputs.is_empty() {
        ui::dim("(none)");
    }
    for (name, value) in &record.applied.outputs {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string(other).context("Failed to render output")?,
        };
        ui::kv(name, &rendered);
    }
    ui::dim(&format!(
        "applied {}",
        record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    Ok(())
}
