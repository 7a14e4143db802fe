//! Training subcommands: `train`, `plan`, `validate`, `render-apply`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use mb_core::Error;
use mb_tmva::{ApplyOptions, SampleClass, TrainingPlan};

fn load_plan(config: &Path) -> Result<(TrainingPlan, String)> {
    let cfg = mb_tmva::read_training_config(config)
        .with_context(|| format!("failed to read config {}", config.display()))?;
    let plan = TrainingPlan::build(&cfg)
        .with_context(|| format!("invalid training config {}", config.display()))?;
    let fingerprint = plan.fingerprint()?;
    tracing::info!(job = %plan.job_name, %fingerprint, "plan ready");
    Ok((plan, fingerprint))
}

pub(crate) fn cmd_train(config: &Path, out_dir: &Path, program: &str, dry_run: bool) -> Result<()> {
    let (plan, fingerprint) = load_plan(config)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let ident = mb_tmva::macro_ident(&plan.job_name);
    let macro_file = format!("{ident}.C");
    let macro_path = out_dir.join(&macro_file);
    std::fs::write(&macro_path, mb_tmva::render_training_macro(&plan, &fingerprint))
        .with_context(|| format!("failed to write {}", macro_path.display()))?;
    std::fs::write(out_dir.join(format!("{ident}.plan.json")), plan.to_json()?)?;
    std::fs::write(out_dir.join(format!("{ident}.plan.sha256")), format!("{fingerprint}\n"))?;
    tracing::info!(path = %macro_path.display(), "training macro written");

    if dry_run {
        println!("{}", macro_path.display());
        return Ok(());
    }

    // The macro writes the output file and `<dataset>/weights/` relative to
    // its working directory.
    tracing::info!(%program, macro_file = %macro_file, "running training");
    let status = Command::new(program)
        .args(["-l", "-b", "-q", &macro_file])
        .current_dir(out_dir)
        .status()
        .map_err(|source| Error::Spawn { program: program.to_string(), source })?;
    if !status.success() {
        return Err(Error::Process { program: program.to_string(), status: status.to_string() })
            .with_context(|| format!("training macro {} failed", macro_path.display()));
    }
    tracing::info!(
        output = %out_dir.join(&plan.output_file).display(),
        weights = %out_dir.join(plan.weight_file("*")).display(),
        "training finished"
    );
    Ok(())
}

pub(crate) fn cmd_plan(config: &Path, output: Option<&PathBuf>) -> Result<()> {
    let (plan, fingerprint) = load_plan(config)?;
    crate::write_json(
        output,
        serde_json::json!({
            "fingerprint": fingerprint,
            "plan": plan,
        }),
    )
}

pub(crate) fn cmd_validate(config: &Path) -> Result<()> {
    let (plan, fingerprint) = load_plan(config)?;
    let n_signal = plan.samples_of(SampleClass::Signal).count();
    let n_background = plan.samples_of(SampleClass::Background).count();
    println!(
        "ok: {} ({} signal, {} background samples; {} skipped), {} variables, {} spectators, {} methods",
        plan.job_name,
        n_signal,
        n_background,
        plan.skipped_samples.len(),
        plan.variables.len(),
        plan.spectators.len(),
        plan.methods.len()
    );
    println!("fingerprint: {fingerprint}");
    Ok(())
}

pub(crate) fn cmd_render_apply(
    config: &Path,
    methods: Vec<String>,
    branch: String,
    tree: Option<String>,
    default_input: String,
    output: Option<&PathBuf>,
) -> Result<()> {
    let cfg = mb_tmva::read_training_config(config)
        .with_context(|| format!("failed to read config {}", config.display()))?;
    let tree_name = tree.unwrap_or_else(|| cfg.tree_name.clone());
    let plan = TrainingPlan::build(&cfg)
        .with_context(|| format!("invalid training config {}", config.display()))?;
    let fingerprint = plan.fingerprint()?;

    let mut opts = ApplyOptions {
        methods,
        tree_name,
        response_branch: branch,
        default_input,
        ..ApplyOptions::default()
    };
    // ROOT calls the function named after the macro file.
    if let Some(path) = output {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let ident = mb_tmva::macro_ident(stem);
        if ident != stem {
            anyhow::bail!(
                "{}: ROOT runs the function named after the file, and '{stem}' is not a C++ \
                 identifier (try {ident}.C)",
                path.display()
            );
        }
        opts.macro_name = ident;
    }
    let text = mb_tmva::render_apply_macro(&plan, &fingerprint, &opts)?;
    if let Some(path) = output {
        std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            methods = %opts.methods.join(","),
            "scoring macro written"
        );
    } else {
        print!("{text}");
    }
    Ok(())
}
