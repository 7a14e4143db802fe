//! ROOT macro rendering for the training job.

use crate::plan::{PlannedVariable, TrainingPlan};
use crate::config::SampleClass;

/// Quote `s` as a C++ string literal.
pub fn cpp_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// C++ identifier for a macro entry point. ROOT requires the function name
/// to equal the macro file stem.
pub fn macro_ident(name: &str) -> String {
    let mut out: String =
        name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Line-oriented source buffer with three-space indentation (ROOT tutorial style).
#[derive(Debug, Default)]
pub(crate) struct MacroWriter {
    buf: String,
    depth: usize,
}

impl MacroWriter {
    pub(crate) fn line(&mut self, s: impl AsRef<str>) {
        let s = s.as_ref();
        if !s.is_empty() {
            for _ in 0..self.depth {
                self.buf.push_str("   ");
            }
            self.buf.push_str(s);
        }
        self.buf.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.buf.push('\n');
    }

    pub(crate) fn open(&mut self, s: impl AsRef<str>) {
        self.line(s);
        self.depth += 1;
    }

    pub(crate) fn close(&mut self, s: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(s);
    }

    pub(crate) fn finish(self) -> String {
        self.buf
    }
}

pub(crate) fn header(w: &mut MacroWriter, fingerprint: &str, includes: &[&str]) {
    w.line(format!("// Generated by mvabatch {}. Do not edit.", mb_core::VERSION));
    w.line(format!("// plan sha256: {fingerprint}"));
    w.blank();
    for inc in includes {
        w.line(format!("#include {inc}"));
    }
    w.blank();
}

fn add_variable(w: &mut MacroWriter, call: &str, v: &PlannedVariable) {
    w.line(format!(
        "dataloader->{call}( {}, {}, {}, '{}' );",
        cpp_string(&v.expression),
        cpp_string(&v.label),
        cpp_string(&v.unit),
        v.var_type.as_char()
    ));
}

/// Render the training macro. `fingerprint` is embedded for traceability.
///
/// The macro opens every input, registers each tree with its precomputed
/// weight, declares variables and selections, books the methods and runs
/// train / test / evaluate. Missing files or trees end the ROOT process with
/// exit code 1.
pub fn render_training_macro(plan: &TrainingPlan, fingerprint: &str) -> String {
    let ident = macro_ident(&plan.job_name);
    let mut w = MacroWriter::default();
    header(
        &mut w,
        fingerprint,
        &[
            "<iostream>",
            "\"TCut.h\"",
            "\"TFile.h\"",
            "\"TString.h\"",
            "\"TSystem.h\"",
            "\"TTree.h\"",
            "\"TMVA/DataLoader.h\"",
            "\"TMVA/Factory.h\"",
            "\"TMVA/Tools.h\"",
        ],
    );

    w.open(format!("static TTree *{ident}_tree(const char *path, const char *name) {{"));
    w.line("TFile *f = TFile::Open(path);");
    w.open("if (!f || f->IsZombie()) {");
    w.line("std::cerr << \"ERROR: could not open \" << path << std::endl;");
    w.line("gSystem->Exit(1);");
    w.close("}");
    w.line("TTree *t = (TTree*)f->Get(name);");
    w.open("if (!t) {");
    w.line("std::cerr << \"ERROR: no tree \" << name << \" in \" << path << std::endl;");
    w.line("gSystem->Exit(1);");
    w.close("}");
    w.line("return t;");
    w.close("}");
    w.blank();

    w.open(format!("int {ident}() {{"));
    w.line("TMVA::Tools::Instance();");
    w.line(format!("std::cout << \"==> Start {ident}\" << std::endl;"));
    w.blank();

    for (i, s) in plan.samples.iter().enumerate() {
        w.line(format!(
            "TTree *tree_{i} = {ident}_tree( {}, {} ); // {}",
            cpp_string(&s.file),
            cpp_string(&s.tree),
            s.name
        ));
    }
    w.blank();

    w.line(format!("TString outfileName( {} );", cpp_string(&plan.output_file)));
    w.line("TFile *outputFile = TFile::Open( outfileName, \"RECREATE\" );");
    w.line(format!(
        "TMVA::Factory *factory = new TMVA::Factory( {}, outputFile, {} );",
        cpp_string(&plan.job_name),
        cpp_string(&plan.factory_options)
    ));
    if plan.factory_verbose {
        w.line("factory->SetVerbose( kTRUE );");
    }
    w.line(format!(
        "TMVA::DataLoader *dataloader = new TMVA::DataLoader( {} );",
        cpp_string(&plan.dataset)
    ));
    w.blank();

    for v in &plan.variables {
        add_variable(&mut w, "AddVariable", v);
    }
    for v in &plan.spectators {
        add_variable(&mut w, "AddSpectator", v);
    }
    w.blank();

    for (i, s) in plan.samples.iter().enumerate() {
        let call = match s.class {
            SampleClass::Signal => "AddSignalTree    ",
            SampleClass::Background => "AddBackgroundTree",
        };
        w.line(format!(
            "dataloader->{call}( tree_{i}, {} ); // {}: {} * {} / ({} - 2*{})",
            s.weight, s.name, s.luminosity_pb, s.xsec_pb, s.n_generated, s.n_negative
        ));
    }
    w.blank();

    if let Some(e) = &plan.signal_weight_expression {
        w.line(format!("dataloader->SetSignalWeightExpression( {} );", cpp_string(e)));
    }
    if let Some(e) = &plan.background_weight_expression {
        w.line(format!("dataloader->SetBackgroundWeightExpression( {} );", cpp_string(e)));
    }
    w.blank();

    w.line(format!("TCut mycuts = {};", cpp_string(&plan.signal_cut)));
    w.line(format!("TCut mycutb = {};", cpp_string(&plan.background_cut)));
    w.line(format!(
        "dataloader->PrepareTrainingAndTestTree( mycuts, mycutb, {} );",
        cpp_string(&plan.split_options)
    ));
    w.blank();

    for m in &plan.methods {
        w.line(format!(
            "factory->BookMethod( dataloader, {}, {}, {} );",
            m.kind.tmva_type(),
            cpp_string(&m.name),
            cpp_string(&m.options)
        ));
    }
    w.blank();

    w.line("factory->TrainAllMethods();");
    w.line("factory->TestAllMethods();");
    w.line("factory->EvaluateAllMethods();");
    w.blank();
    w.line("outputFile->Close();");
    w.line("std::cout << \"==> Wrote root file: \" << outputFile->GetName() << std::endl;");
    w.line(format!("std::cout << \"==> {ident} is done!\" << std::endl;"));
    w.line("delete factory;");
    w.line("delete dataloader;");
    w.line("return 0;");
    w.close("}");
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;

    fn plan() -> TrainingPlan {
        let cfg: TrainingConfig = serde_yaml_ng::from_str(
            r#"
luminosity: 35867.06
weight_expressions:
  signal: "genWeight*LHEWeight[992]/LHEWeight[0]"
  background: genWeight
samples:
  - {name: ewk, class: signal, file: /eos/ewk.root, xsec_pb: 0.9114, n_generated: 1981107}
  - {name: ttw, class: background, file: /eos/ttw.root, xsec_pb: 0.2043, n_generated: 5280251, n_negative: 1282079}
features:
  - {expression: l_pt1, unit: GeV}
  - {expression: "ZeppenfeldWH/DEtajj := ZeppenfeldWH/vbf_maxpt_jj_Deta", label: "ZeppenfeldWH/#Delta#eta_{jj}"}
spectators:
  - {expression: "spec1 := l_pt1*2", label: Spectator 1, unit: units}
cuts:
  signal: "(type==1 || type==0) && (abs(ungroomed_PuppiAK8_jet_eta)<2.4)"
  background: "(type==1 || type==0) && (abs(ungroomed_PuppiAK8_jet_eta)<2.4)"
"#,
        )
        .unwrap();
        TrainingPlan::build(&cfg).unwrap()
    }

    #[test]
    fn cpp_string_escapes() {
        assert_eq!(cpp_string(r#"a "b" \c"#), r#""a \"b\" \\c""#);
    }

    #[test]
    fn macro_ident_sanitizes() {
        assert_eq!(macro_ident("TMVAClassification"), "TMVAClassification");
        assert_eq!(macro_ident("vbs-2017.v2"), "vbs_2017_v2");
        assert_eq!(macro_ident("2017"), "_2017");
    }

    #[test]
    fn training_macro_contains_the_whole_job() {
        let p = plan();
        let src = render_training_macro(&p, "abc123");
        assert!(src.starts_with("// Generated by mvabatch"));
        assert!(src.contains("// plan sha256: abc123"));
        assert!(src.contains("int TMVAClassification()"));
        assert!(src.contains(
            "TTree *tree_0 = TMVAClassification_tree( \"/eos/ewk.root\", \"otree\" ); // ewk"
        ));
        assert!(src.contains(&format!("dataloader->AddSignalTree    ( tree_0, {} );", p.samples[0].weight)));
        assert!(src.contains(&format!("dataloader->AddBackgroundTree( tree_1, {} );", p.samples[1].weight)));
        assert!(src.contains(
            "dataloader->AddVariable( \"ZeppenfeldWH/DEtajj := ZeppenfeldWH/vbf_maxpt_jj_Deta\", \
             \"ZeppenfeldWH/#Delta#eta_{jj}\", \"\", 'F' );"
        ));
        assert!(src.contains("dataloader->AddSpectator( \"spec1 := l_pt1*2\", \"Spectator 1\", \"units\", 'F' );"));
        assert!(src.contains(
            "dataloader->SetSignalWeightExpression( \"genWeight*LHEWeight[992]/LHEWeight[0]\" );"
        ));
        assert!(src.contains("dataloader->SetBackgroundWeightExpression( \"genWeight\" );"));
        assert!(src.contains(
            "dataloader->PrepareTrainingAndTestTree( mycuts, mycutb, \
             \"nTrain_Signal=0:nTrain_Background=0:SplitMode=Random:NormMode=NumEvents:!V\" );"
        ));
        assert!(src.contains("factory->BookMethod( dataloader, TMVA::Types::kBDT, \"BDTG\", \"!H:!V:NTrees=1000"));
        let train = src.find("TrainAllMethods").unwrap();
        let test = src.find("TestAllMethods").unwrap();
        let eval = src.find("EvaluateAllMethods").unwrap();
        assert!(train < test && test < eval);
    }

    #[test]
    fn verbose_factory_is_opt_in() {
        let mut p = plan();
        assert!(!render_training_macro(&p, "x").contains("SetVerbose"));
        p.factory_verbose = true;
        let src = render_training_macro(&p, "x");
        let factory = src.find("TMVA::Factory *factory").unwrap();
        let verbose = src.find("factory->SetVerbose( kTRUE );").unwrap();
        assert!(factory < verbose);
    }

    #[test]
    fn rendering_is_deterministic() {
        let p = plan();
        assert_eq!(render_training_macro(&p, "x"), render_training_macro(&p, "x"));
    }
}
