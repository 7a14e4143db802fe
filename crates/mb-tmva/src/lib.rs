//! # mb-tmva
//!
//! TMVA classification jobs described as data.
//!
//! A YAML/JSON [`TrainingConfig`] lists the input samples with their
//! cross-sections, the variables, the selections and the booked methods.
//! [`TrainingPlan::build`] validates it and computes the per-tree weights;
//! [`render_training_macro`] and [`render_apply_macro`] turn the plan into
//! ROOT macros that run the training and score new files.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod apply;
pub mod config;
pub mod options;
pub mod plan;
pub mod render;
pub mod weight;

pub use apply::{ApplyOptions, render_apply_macro};
pub use config::{
    CutsConfig, FeatureConfig, Luminosity, MethodConfig, MethodKind, SampleClass, SampleConfig,
    SplitConfig, TrainingConfig, VarType, WeightExpressions, read_training_config,
};
pub use options::{OptionItem, TmvaOptions};
pub use plan::{PlannedMethod, PlannedSample, PlannedVariable, TrainingPlan};
pub use render::{cpp_string, macro_ident, render_training_macro};
pub use weight::{effective_events, xsec_weight};
