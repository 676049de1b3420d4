//! `stackplan apply` - apply stacks in dependency order
//!
//! Stacks are applied one at a time. Each stack is planned again right
//! before it is applied, so values of stacks applied earlier in the same run
//! are already concrete.

use anyhow::{Context as AnyhowContext, Result, bail};
use stackgraph::{
    ApplyResult, ExecuteOptions, ExecuteReport, SiblingState, StackRegistry, compute_diffs, execute,
};

use super::Session;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::LocalProvisioner;
use crate::progress::{BarProgress, PromptConfirm};
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let Session {
        project,
        mut store,
        params,
    } = Session::open(ctx)?;
    let layers = project.select(args.stack.as_deref())?;
    let mut orchestrator = crate::engine::Orchestrator::new(&project, params, &store);

    // Surface every finding before touching anything
    let outcomes = orchestrator.plan_all(&layers);
    let failed = super::report_failures(&outcomes);
    if failed > 0 {
        bail!("{failed} stack(s) could not be planned, nothing applied");
    }

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: usize::from(args.jobs),
    };
    let names: Vec<&String> = layers.iter().flatten().collect();

    for (index, name) in names.iter().enumerate() {
        ui::step(index + 1, names.len(), &format!("Stack '{name}'"));

        let plan = orchestrator.plan_one(name)?;
        let previous = store.applied(name);
        let diffs = compute_diffs(&plan, previous)
            .context("Failed to diff plan against applied state")?;
        ui::display_plan(&plan, &diffs);

        let waiting: Vec<&str> = plan
            .foreign_stacks()
            .into_iter()
            .filter(|foreign| {
                !matches!(
                    orchestrator.registry().state(foreign),
                    Some(SiblingState::Applied(_))
                )
            })
            .collect();
        if args.dry_run && !waiting.is_empty() {
            ui::info(&format!(
                "Dry run - '{name}' waits on {} which would be applied first",
                waiting.join(", ")
            ));
            continue;
        }

        let mut progress = BarProgress::new(plan.len(), ctx.quiet);
        let mut confirm = PromptConfirm::new(args.yes);
        let report = execute(
            &plan,
            orchestrator.registry(),
            previous,
            &opts,
            &LocalProvisioner,
            &mut progress,
            &mut confirm,
        );
        progress.finish();
        let report = report.with_context(|| format!("Failed to apply stack '{name}'"))?;

        if args.dry_run {
            ui::info("Dry run - no changes made");
            continue;
        }
        if was_declined(&report) {
            ui::warn("Aborted");
            return Ok(());
        }

        ui::print_summary(name, &report.summary);
        let fingerprint = plan.fingerprint().context("Failed to fingerprint plan")?;
        store.record(name, fingerprint, report.applied.clone());
        store.save()?;
        orchestrator.mark_applied(name, report.applied);

        if !report.summary.is_success() {
            bail!(
                "Stack '{name}' failed ({} resource(s)), later stacks were not applied",
                report.summary.failed
            );
        }
    }

    if !args.dry_run && !ctx.quiet {
        ui::success(&format!(
            "State saved to {}",
            store.path().display()
        ));
    }
    Ok(())
}

/// Whether the user declined the confirmation prompt
fn was_declined(report: &ExecuteReport) -> bool {
    report.results.iter().any(|(_, result)| {
        matches!(result, ApplyResult::Skipped { reason } if reason == "declined")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ParamArgs;
    use crate::engine::tests::sample_project;
    use crate::state::StateStore;
    use std::path::PathBuf;

    fn context(root: PathBuf) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            project: root,
            params: vec![("stage".to_string(), "prod".to_string())],
        }
    }

    fn apply_args(dry_run: bool) -> ApplyArgs {
        ApplyArgs {
            stack: None,
            dry_run,
            yes: true,
            jobs: 2,
            params: ParamArgs::default(),
        }
    }

    #[test]
    fn test_apply_records_every_stack() {
        let dir = sample_project();
        let ctx = context(dir.path().to_path_buf());
        run(&ctx, &apply_args(false)).unwrap();

        let store = StateStore::load(&dir.path().join(".stackplan").join("state.json")).unwrap();
        let network = store.applied("network").unwrap();
        let vpc_id = network.outputs["VpcId"].clone();
        assert_eq!(vpc_id, serde_json::json!(network.resources["Vpc"].physical_id));

        let database = store.applied("database").unwrap();
        assert_eq!(database.resources["Db"].properties["VpcId"], vpc_id);
        assert_eq!(database.outputs["Endpoint"], serde_json::json!("db-prod"));

        let app = store.applied("app").unwrap();
        assert_eq!(
            app.resources["Server"].properties["Database"],
            serde_json::json!("db-prod")
        );
    }

    #[test]
    fn test_second_apply_changes_nothing() {
        let dir = sample_project();
        let ctx = context(dir.path().to_path_buf());
        run(&ctx, &apply_args(false)).unwrap();
        let path = dir.path().join(".stackplan").join("state.json");
        let first = StateStore::load(&path).unwrap();

        run(&ctx, &apply_args(false)).unwrap();
        let second = StateStore::load(&path).unwrap();
        for name in ["network", "database", "app"] {
            assert_eq!(first.applied(name), second.applied(name));
        }
    }

    #[test]
    fn test_new_output_is_picked_up_by_dependents() {
        let dir = sample_project();
        let ctx = context(dir.path().to_path_buf());
        run(&ctx, &apply_args(false)).unwrap();

        std::fs::write(
            dir.path().join("network").join("stack.toml"),
            r#"
[resources.Vpc]
type = "vpc"
properties = { CidrBlock = "10.0.0.0/16" }

[outputs]
VpcId = { "$ref" = "Vpc" }
Cidr = { "$ref" = "Vpc", "$attr" = "CidrBlock" }
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("database").join("stack.toml"),
            r#"
[settings]
stage = "${param:stage, 'dev'}"

[resources.Db]
type = "db"
[resources.Db.properties]
Name = "db-${self:stage}"
VpcId = "${stack:network:/outputs/VpcId}"
Cidr = "${stack:network:/outputs/Cidr}"

[outputs]
Endpoint = { "$ref" = "Db", "$attr" = "Name" }
"#,
        )
        .unwrap();

        run(&ctx, &apply_args(false)).unwrap();

        let store = StateStore::load(&dir.path().join(".stackplan").join("state.json")).unwrap();
        let network = store.applied("network").unwrap();
        assert_eq!(network.outputs["Cidr"], serde_json::json!("10.0.0.0/16"));
        let database = store.applied("database").unwrap();
        assert_eq!(
            database.resources["Db"].properties["Cidr"],
            serde_json::json!("10.0.0.0/16")
        );
        assert_eq!(database.resources["Db"].properties["VpcId"], network.outputs["VpcId"]);
        assert_eq!(
            store.applied("app").unwrap().resources["Server"].properties["Database"],
            serde_json::json!("db-prod")
        );
    }

    #[test]
    fn test_dry_run_writes_no_state() {
        let dir = sample_project();
        let ctx = context(dir.path().to_path_buf());
        run(&ctx, &apply_args(true)).unwrap();
        assert!(!dir.path().join(".stackplan").join("state.json").exists());
    }
}
