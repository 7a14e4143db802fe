//! Resolved training plan.
//!
//! A [`TrainingPlan`] is the fully checked, fully computed form of a
//! [`TrainingConfig`]: disabled samples dropped, per-tree weights evaluated,
//! every expression parsed. Building is pure, so the same config always
//! yields the same plan (and the same fingerprint), independent of any
//! training run.

use std::collections::{BTreeSet, HashSet};

use mb_core::{Error, Result};
use mb_expr::{CompiledExpr, Definition};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::{FeatureConfig, MethodKind, SampleClass, TrainingConfig, VarType};
use crate::weight::xsec_weight;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingPlan {
    pub tool_version: String,
    pub job_name: String,
    pub output_file: String,
    pub dataset: String,
    pub factory_options: String,
    pub factory_verbose: bool,
    pub samples: Vec<PlannedSample>,
    /// Names of samples present in the config but disabled.
    pub skipped_samples: Vec<String>,
    pub signal_weight_expression: Option<String>,
    pub background_weight_expression: Option<String>,
    pub variables: Vec<PlannedVariable>,
    pub spectators: Vec<PlannedVariable>,
    pub signal_cut: String,
    pub background_cut: String,
    pub split_options: String,
    pub methods: Vec<PlannedMethod>,
    /// Every branch any expression reads, sorted.
    pub required_branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedSample {
    pub name: String,
    pub class: SampleClass,
    pub file: String,
    pub tree: String,
    pub luminosity_pb: f64,
    pub xsec_pb: f64,
    pub n_generated: f64,
    pub n_negative: f64,
    /// `luminosity × xsec ÷ (n_generated − 2·n_negative)`
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedVariable {
    /// Expression as given to `AddVariable` / `AddSpectator`.
    pub expression: String,
    /// Name TMVA assigns (alias or formula).
    pub name: String,
    /// Right-hand side formula, evaluated per event by the scoring macro.
    pub formula: String,
    pub label: String,
    pub unit: String,
    pub var_type: VarType,
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedMethod {
    pub name: String,
    pub kind: MethodKind,
    pub options: String,
}

impl TrainingPlan {
    /// Validate `cfg` and resolve it into a plan.
    pub fn build(cfg: &TrainingConfig) -> Result<Self> {
        require_name("job_name", &cfg.job_name)?;
        require_name("dataset", &cfg.dataset)?;
        if cfg.output_file.trim().is_empty() {
            return Err(Error::Validation("output_file must not be empty".to_string()));
        }

        let mut branches = BTreeSet::new();

        let (samples, skipped_samples) = plan_samples(cfg)?;

        let variables = plan_variables("feature", &cfg.features, &mut branches)?;
        if variables.is_empty() {
            return Err(Error::Validation("at least one feature is required".to_string()));
        }
        let spectators = plan_variables("spectator", &cfg.spectators, &mut branches)?;
        let mut names = HashSet::new();
        for v in variables.iter().chain(&spectators) {
            if !names.insert(v.name.as_str()) {
                return Err(Error::Validation(format!("duplicate variable name '{}'", v.name)));
            }
        }

        let signal_cut = plan_expression("signal cut", &cfg.cuts.signal, &mut branches)?;
        let background_cut =
            plan_expression("background cut", &cfg.cuts.background, &mut branches)?;
        if signal_cut == background_cut {
            tracing::debug!("signal and background selections are identical");
        }

        let signal_weight_expression = cfg
            .weight_expressions
            .signal
            .as_deref()
            .map(|e| plan_expression("signal weight expression", e, &mut branches))
            .transpose()?;
        let background_weight_expression = cfg
            .weight_expressions
            .background
            .as_deref()
            .map(|e| plan_expression("background weight expression", e, &mut branches))
            .transpose()?;

        if cfg.methods.is_empty() {
            return Err(Error::Validation("at least one method must be booked".to_string()));
        }
        let mut methods = Vec::with_capacity(cfg.methods.len());
        let mut method_names = HashSet::new();
        for m in &cfg.methods {
            require_name("method name", &m.name)?;
            if !method_names.insert(m.name.as_str()) {
                return Err(Error::Validation(format!("method '{}' booked twice", m.name)));
            }
            methods.push(PlannedMethod {
                name: m.name.clone(),
                kind: m.kind,
                options: m.options.render(),
            });
        }

        let plan = TrainingPlan {
            tool_version: mb_core::VERSION.to_string(),
            job_name: cfg.job_name.clone(),
            output_file: cfg.output_file.clone(),
            dataset: cfg.dataset.clone(),
            factory_options: cfg.factory_options.render(),
            factory_verbose: cfg.verbose,
            samples,
            skipped_samples,
            signal_weight_expression,
            background_weight_expression,
            variables,
            spectators,
            signal_cut,
            background_cut,
            split_options: cfg.split.to_options()?.render(),
            methods,
            required_branches: branches.into_iter().collect(),
        };
        tracing::info!(
            samples = plan.samples.len(),
            skipped = plan.skipped_samples.len(),
            variables = plan.variables.len(),
            methods = plan.methods.len(),
            "training plan built"
        );
        Ok(plan)
    }

    /// Samples of one class, in config order.
    pub fn samples_of(&self, class: SampleClass) -> impl Iterator<Item = &PlannedSample> {
        self.samples.iter().filter(move |s| s.class == class)
    }

    /// Weight file TMVA writes for `method`.
    pub fn weight_file(&self, method: &str) -> String {
        format!("{}/weights/{}_{}.weights.xml", self.dataset, self.job_name, method)
    }

    /// Canonical JSON (pretty, field order fixed by the struct layout).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// SHA-256 of the canonical JSON, lowercase hex.
    pub fn fingerprint(&self) -> Result<String> {
        let mut h = Sha256::new();
        h.update(self.to_json()?.as_bytes());
        let out = h.finalize();
        let mut s = String::with_capacity(64);
        for b in out {
            s.push_str(&format!("{:02x}", b));
        }
        Ok(s)
    }
}

fn require_name(what: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || !value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(Error::Validation(format!(
            "{what} '{value}' must be non-empty and use only [A-Za-z0-9_.-]"
        )));
    }
    Ok(())
}

fn plan_samples(cfg: &TrainingConfig) -> Result<(Vec<PlannedSample>, Vec<String>)> {
    let mut seen = HashSet::new();
    let mut samples = Vec::new();
    let mut skipped = Vec::new();
    for s in &cfg.samples {
        if s.name.trim().is_empty() {
            return Err(Error::Validation("sample with empty name".to_string()));
        }
        if !seen.insert(s.name.as_str()) {
            return Err(Error::Validation(format!("duplicate sample name '{}'", s.name)));
        }
        if !s.enabled {
            tracing::debug!(sample = %s.name, "sample disabled, skipping");
            skipped.push(s.name.clone());
            continue;
        }
        if s.file.trim().is_empty() {
            return Err(Error::Validation(format!("sample '{}' has no file", s.name)));
        }
        let lumi = cfg.luminosity.for_class(s.class);
        let weight = xsec_weight(lumi, s.xsec_pb, s.n_generated, s.n_negative)
            .map_err(|e| Error::Validation(format!("sample '{}': {e}", s.name)))?;
        samples.push(PlannedSample {
            name: s.name.clone(),
            class: s.class,
            file: s.file.clone(),
            tree: s.tree.clone().unwrap_or_else(|| cfg.tree_name.clone()),
            luminosity_pb: lumi,
            xsec_pb: s.xsec_pb,
            n_generated: s.n_generated,
            n_negative: s.n_negative,
            weight,
        });
    }
    for class in [SampleClass::Signal, SampleClass::Background] {
        if !samples.iter().any(|s| s.class == class) {
            return Err(Error::Validation(format!("no enabled {} sample", class.as_str())));
        }
    }
    Ok((samples, skipped))
}

fn plan_variables(
    what: &str,
    features: &[FeatureConfig],
    branches: &mut BTreeSet<String>,
) -> Result<Vec<PlannedVariable>> {
    features
        .iter()
        .map(|f| {
            let def = Definition::parse(&f.expression)
                .map_err(|e| Error::Validation(format!("{what} '{}': {e}", f.expression)))?;
            let used: Vec<String> = def.formula.branches().iter().map(|b| b.to_string()).collect();
            branches.extend(used.iter().cloned());
            Ok(PlannedVariable {
                expression: f.expression.trim().to_string(),
                name: def.name().to_string(),
                formula: def.formula.source().to_string(),
                label: f.label.clone(),
                unit: f.unit.clone(),
                var_type: f.var_type,
                branches: used,
            })
        })
        .collect()
}

fn plan_expression(what: &str, text: &str, branches: &mut BTreeSet<String>) -> Result<String> {
    let expr =
        CompiledExpr::compile(text).map_err(|e| Error::Validation(format!("{what}: {e}")))?;
    branches.extend(expr.branches().into_iter().map(str::to_string));
    Ok(expr.source().to_string())
}
