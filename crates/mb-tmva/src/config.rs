//! Training configuration (YAML or JSON).
//!
//! One file describes everything a TMVA classification job needs: the input
//! samples and their cross-section weights, the variables, the selections,
//! the train/test split and the booked methods.

use std::path::Path;

use mb_core::Result;
use serde::{Deserialize, Serialize};

use crate::options::TmvaOptions;

/// Top-level training configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    /// Factory job name; also the weight-file prefix.
    #[serde(default = "default_job_name")]
    pub job_name: String,
    /// Output ROOT file written by the factory.
    #[serde(default = "default_output_file")]
    pub output_file: String,
    /// DataLoader name; weights land in `<dataset>/weights/`.
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// Default tree name for samples that do not override it.
    #[serde(default = "default_tree_name")]
    pub tree_name: String,
    /// Integrated luminosity in pb⁻¹.
    pub luminosity: Luminosity,
    #[serde(default = "default_factory_options")]
    pub factory_options: TmvaOptions,
    /// Switch the factory to verbose output (`Factory::SetVerbose`).
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub weight_expressions: WeightExpressions,
    pub samples: Vec<SampleConfig>,
    pub features: Vec<FeatureConfig>,
    #[serde(default)]
    pub spectators: Vec<FeatureConfig>,
    pub cuts: CutsConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default = "default_methods")]
    pub methods: Vec<MethodConfig>,
}

fn default_job_name() -> String {
    "TMVAClassification".to_string()
}

fn default_output_file() -> String {
    "TMVA.root".to_string()
}

fn default_dataset() -> String {
    "dataset".to_string()
}

fn default_tree_name() -> String {
    "otree".to_string()
}

fn default_factory_options() -> TmvaOptions {
    TmvaOptions::from_items(&[
        "!V",
        "!Silent",
        "Color",
        "DrawProgressBar",
        "Transformations=I",
        "AnalysisType=Classification",
    ])
    .unwrap_or_default()
}

fn default_methods() -> Vec<MethodConfig> {
    vec![MethodConfig::bdtg()]
}

/// Luminosity, either shared by both classes or given per class.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Luminosity {
    Common(f64),
    PerClass { signal: f64, background: f64 },
}

impl Luminosity {
    /// Luminosity applied to samples of `class`.
    pub fn for_class(&self, class: SampleClass) -> f64 {
        match (*self, class) {
            (Luminosity::Common(l), _) => l,
            (Luminosity::PerClass { signal, .. }, SampleClass::Signal) => signal,
            (Luminosity::PerClass { background, .. }, SampleClass::Background) => background,
        }
    }
}

/// Training label of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleClass {
    Signal,
    Background,
}

impl SampleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleClass::Signal => "signal",
            SampleClass::Background => "background",
        }
    }
}

/// One input tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleConfig {
    pub name: String,
    pub class: SampleClass,
    /// Local path or `root://` URL.
    pub file: String,
    /// Overrides the top-level `tree_name`.
    #[serde(default)]
    pub tree: Option<String>,
    /// Cross-section in pb.
    pub xsec_pb: f64,
    /// Generated event count.
    pub n_generated: f64,
    /// Negative-weight events among `n_generated`.
    #[serde(default)]
    pub n_negative: f64,
    /// Disabled samples stay in the file but are not registered.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Per-event weight expressions for each class.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WeightExpressions {
    #[serde(default)]
    pub signal: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
}

/// TMVA variable type character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum VarType {
    #[default]
    F,
    I,
}

impl VarType {
    pub fn as_char(&self) -> char {
        match self {
            VarType::F => 'F',
            VarType::I => 'I',
        }
    }
}

/// Input variable or spectator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureConfig {
    /// Branch name, formula, or `alias := formula`.
    pub expression: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default, rename = "type")]
    pub var_type: VarType,
}

/// Signal and background selections.
///
/// Both are required and kept independent even when they are the same text.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CutsConfig {
    pub signal: String,
    pub background: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum SplitMode {
    #[default]
    Random,
    Alternate,
    Block,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum NormMode {
    None,
    #[default]
    NumEvents,
    EqualNumEvents,
}

/// Options for `PrepareTrainingAndTestTree`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    /// 0 means "half of the available events".
    #[serde(default)]
    pub n_train_signal: u64,
    #[serde(default)]
    pub n_train_background: u64,
    #[serde(default)]
    pub n_test_signal: Option<u64>,
    #[serde(default)]
    pub n_test_background: Option<u64>,
    #[serde(default)]
    pub split_mode: SplitMode,
    #[serde(default)]
    pub norm_mode: NormMode,
    #[serde(default)]
    pub split_seed: Option<u64>,
    #[serde(default)]
    pub verbose: bool,
}

impl SplitConfig {
    /// Render as the TMVA option string.
    pub fn to_options(&self) -> Result<TmvaOptions> {
        let mut items = vec![
            format!("nTrain_Signal={}", self.n_train_signal),
            format!("nTrain_Background={}", self.n_train_background),
        ];
        if let Some(n) = self.n_test_signal {
            items.push(format!("nTest_Signal={n}"));
        }
        if let Some(n) = self.n_test_background {
            items.push(format!("nTest_Background={n}"));
        }
        items.push(format!("SplitMode={:?}", self.split_mode));
        if let Some(seed) = self.split_seed {
            items.push(format!("SplitSeed={seed}"));
        }
        items.push(format!("NormMode={:?}", self.norm_mode));
        items.push(if self.verbose { "V" } else { "!V" }.to_string());
        TmvaOptions::from_items(&items)
    }
}

/// TMVA method families (`TMVA::Types::EMVA`).
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MethodKind {
    BDT,
    Cuts,
    Likelihood,
    PDERS,
    PDEFoam,
    KNN,
    HMatrix,
    LD,
    Fisher,
    FDA,
    MLP,
    DNN,
    SVM,
    RuleFit,
}

impl MethodKind {
    /// C++ enumerator name.
    pub fn tmva_type(&self) -> &'static str {
        match self {
            MethodKind::BDT => "TMVA::Types::kBDT",
            MethodKind::Cuts => "TMVA::Types::kCuts",
            MethodKind::Likelihood => "TMVA::Types::kLikelihood",
            MethodKind::PDERS => "TMVA::Types::kPDERS",
            MethodKind::PDEFoam => "TMVA::Types::kPDEFoam",
            MethodKind::KNN => "TMVA::Types::kKNN",
            MethodKind::HMatrix => "TMVA::Types::kHMatrix",
            MethodKind::LD => "TMVA::Types::kLD",
            MethodKind::Fisher => "TMVA::Types::kFisher",
            MethodKind::FDA => "TMVA::Types::kFDA",
            MethodKind::MLP => "TMVA::Types::kMLP",
            MethodKind::DNN => "TMVA::Types::kDNN",
            MethodKind::SVM => "TMVA::Types::kSVM",
            MethodKind::RuleFit => "TMVA::Types::kRuleFit",
        }
    }
}

/// A booked method.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MethodConfig {
    /// Method title; used in weight-file names.
    pub name: String,
    pub kind: MethodKind,
    #[serde(default)]
    pub options: TmvaOptions,
}

impl MethodConfig {
    /// Gradient-boosted BDT with the hyperparameters of the reference analysis.
    pub fn bdtg() -> Self {
        let options = TmvaOptions::from_items(&[
            "!H",
            "!V",
            "NTrees=1000",
            "MinNodeSize=2.5%",
            "BoostType=Grad",
            "Shrinkage=0.10",
            "UseBaggedBoost",
            "BaggedSampleFraction=0.5",
            "nCuts=20",
            "MaxDepth=2",
            "NegWeightTreatment=Pray",
        ])
        .unwrap_or_default();
        Self { name: "BDTG".to_string(), kind: MethodKind::BDT, options }
    }
}

/// Read a training config. `.json` files use serde_json, everything else YAML.
pub fn read_training_config(path: &Path) -> Result<TrainingConfig> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg: TrainingConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        serde_yaml_ng::from_slice(&bytes)?
    };
    Ok(cfg)
}
