//! Companion scoring macro: evaluates a trained method on one input file
//! and writes the tree back out with a response branch.

use mb_core::{Error, Result};

use crate::plan::TrainingPlan;
use crate::render::{MacroWriter, cpp_string, header, macro_ident};

/// Knobs of the scoring macro.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Booked methods to evaluate, in branch order.
    pub methods: Vec<String>,
    /// Macro entry point (and file stem).
    pub macro_name: String,
    /// Tree read from each input file.
    pub tree_name: String,
    /// Branch added to the output tree. With several methods it is the
    /// prefix of one `<branch>_<method>` branch per method.
    pub response_branch: String,
    /// Default argument of the macro when run without one.
    pub default_input: String,
    pub hist_bins: u32,
    pub hist_min: f64,
    pub hist_max: f64,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            methods: vec!["BDTG".to_string()],
            macro_name: "TMVAClassificationApplication".to_string(),
            tree_name: "otree".to_string(),
            response_branch: "BDT_response".to_string(),
            default_input: String::new(),
            hist_bins: 100,
            hist_min: -1.0,
            hist_max: 1.0,
        }
    }
}

/// Render the scoring macro for `opts.methods` of `plan`.
///
/// Variables are fed through one `TTreeFormula` per definition, so derived
/// features (ratios, aliases) are computed exactly as the training saw them.
/// The output file is named after the input's last path component.
pub fn render_apply_macro(plan: &TrainingPlan, fingerprint: &str, opts: &ApplyOptions) -> Result<String> {
    if opts.methods.is_empty() {
        return Err(Error::Validation("no method to evaluate".to_string()));
    }
    for (i, method) in opts.methods.iter().enumerate() {
        if !plan.methods.iter().any(|m| &m.name == method) {
            return Err(Error::Validation(format!(
                "method '{method}' is not booked (available: {})",
                plan.methods.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join(", ")
            )));
        }
        if opts.methods[..i].contains(method) {
            return Err(Error::Validation(format!("method '{method}' requested twice")));
        }
    }
    if opts.hist_bins == 0 || opts.hist_min >= opts.hist_max {
        return Err(Error::Validation(format!(
            "bad response histogram: {} bins in [{}, {}]",
            opts.hist_bins, opts.hist_min, opts.hist_max
        )));
    }

    let ident = macro_ident(&opts.macro_name);
    let titles: Vec<String> = opts.methods.iter().map(|m| format!("{m} method")).collect();
    let n_vars = plan.variables.len();
    let n_specs = plan.spectators.len();

    let mut w = MacroWriter::default();
    header(
        &mut w,
        fingerprint,
        &[
            "<cstdlib>",
            "<iostream>",
            "\"TFile.h\"",
            "\"TH1F.h\"",
            "\"TString.h\"",
            "\"TSystem.h\"",
            "\"TTree.h\"",
            "\"TTreeFormula.h\"",
            "\"TMVA/Reader.h\"",
            "\"TMVA/Tools.h\"",
        ],
    );

    w.open(format!("void {ident}( TString fname = {} ) {{", cpp_string(&opts.default_input)));
    w.line("TMVA::Tools::Instance();");
    w.line(format!("std::cout << \"==> Start {ident}\" << std::endl;"));
    w.blank();

    w.line("TMVA::Reader *reader = new TMVA::Reader( \"!Color:!Silent\" );");
    w.line(format!("Float_t var[{}];", n_vars.max(1)));
    for (i, v) in plan.variables.iter().enumerate() {
        w.line(format!("reader->AddVariable( {}, &var[{i}] );", cpp_string(&v.expression)));
    }
    w.line(format!("Float_t spec[{}];", n_specs.max(1)));
    for (i, v) in plan.spectators.iter().enumerate() {
        w.line(format!("reader->AddSpectator( {}, &spec[{i}] );", cpp_string(&v.expression)));
    }
    for (method, title) in opts.methods.iter().zip(&titles) {
        w.line(format!(
            "reader->BookMVA( {}, {} );",
            cpp_string(title),
            cpp_string(&plan.weight_file(method))
        ));
    }
    w.blank();

    w.line("TFile *input = TFile::Open( fname );");
    w.open("if (!input || input->IsZombie()) {");
    w.line("std::cout << \"ERROR: could not open data file : \" << fname << std::endl;");
    w.line("exit(1);");
    w.close("}");
    w.line("std::cout << \"--- Using input file: \" << input->GetName() << std::endl;");
    w.blank();

    w.line("TString tok;");
    w.line("TString outFileName = \"\";");
    w.line("Ssiz_t from = 0;");
    w.line("while (fname.Tokenize(tok, from, \"/\")) outFileName = tok;");
    w.line("std::cout << \"--- Output file name\\t:\\t\" << outFileName << std::endl;");
    w.line("TFile *target = new TFile( outFileName, \"RECREATE\" );");
    w.blank();

    w.line(format!("TTree *theTree = (TTree*)input->Get( {} );", cpp_string(&opts.tree_name)));
    w.open("if (!theTree) {");
    w.line(format!(
        "std::cout << \"ERROR: no tree {} in \" << fname << std::endl;",
        opts.tree_name
    ));
    w.line("exit(1);");
    w.close("}");
    w.line("TTree *outTree = theTree->CloneTree(0);");
    for (i, method) in opts.methods.iter().enumerate() {
        let branch = if opts.methods.len() == 1 {
            opts.response_branch.clone()
        } else {
            format!("{}_{method}", opts.response_branch)
        };
        w.line(format!("Float_t response_{i};"));
        w.line(format!("outTree->Branch( {}, &response_{i} );", cpp_string(&branch)));
        w.line(format!(
            "TH1F *hist_{i} = new TH1F( {0}, {0}, {1}, {2:?}, {3:?} );",
            cpp_string(&format!("MVA_{method}")),
            opts.hist_bins,
            opts.hist_min,
            opts.hist_max
        ));
    }
    w.blank();

    for (i, v) in plan.variables.iter().enumerate() {
        w.line(format!(
            "TTreeFormula *fvar_{i} = new TTreeFormula( \"fvar_{i}\", {}, theTree );",
            cpp_string(&v.formula)
        ));
    }
    for (i, v) in plan.spectators.iter().enumerate() {
        w.line(format!(
            "TTreeFormula *fspec_{i} = new TTreeFormula( \"fspec_{i}\", {}, theTree );",
            cpp_string(&v.formula)
        ));
    }
    w.blank();

    w.line("std::cout << \"--- Processing: \" << theTree->GetEntries() << \" events\" << std::endl;");
    w.open("for (Long64_t ievt = 0; ievt < theTree->GetEntries(); ievt++) {");
    w.line("if (ievt % 50000 == 0) std::cout << \"--- ... Processing event: \" << ievt << std::endl;");
    w.line("theTree->GetEntry(ievt);");
    for i in 0..n_vars {
        w.line(format!("fvar_{i}->GetNdata(); var[{i}] = fvar_{i}->EvalInstance();"));
    }
    for i in 0..n_specs {
        w.line(format!("fspec_{i}->GetNdata(); spec[{i}] = fspec_{i}->EvalInstance();"));
    }
    for (i, title) in titles.iter().enumerate() {
        w.line(format!("response_{i} = reader->EvaluateMVA( {} );", cpp_string(title)));
        w.line(format!("hist_{i}->Fill( response_{i} );"));
    }
    w.line("outTree->Fill();");
    w.close("}");
    w.blank();

    w.line("outTree->Write();");
    for i in 0..titles.len() {
        w.line(format!("hist_{i}->Write();"));
    }
    w.line("target->Close();");
    w.line("std::cout << \"--- Created root file: \\\"\" << outFileName << \"\\\"\" << std::endl;");
    w.line("delete reader;");
    w.line(format!("std::cout << \"==> {ident} is done!\" << std::endl;"));
    w.close("}");
    Ok(w.finish())
}
