//! The fixed command line run once per input file.

use serde::Serialize;

/// A fully expanded command line. Arguments go to the OS as-is; no shell is
/// involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// `<program> <args...> <macro>("<input>")`
///
/// The default is `root -l -b -q TMVAClassificationApplication.C("<input>")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
    pub macro_path: String,
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self {
            program: "root".to_string(),
            args: vec!["-l".to_string(), "-b".to_string(), "-q".to_string()],
            macro_path: "TMVAClassificationApplication.C".to_string(),
        }
    }
}

impl CommandTemplate {
    /// Template running `macro_path` with the default ROOT flags.
    pub fn for_macro(macro_path: impl Into<String>) -> Self {
        Self { macro_path: macro_path.into(), ..Self::default() }
    }

    /// Expand the template for one input path or URL.
    pub fn invocation(&self, input: &str) -> Invocation {
        let mut args = self.args.clone();
        args.push(format!("{}({})", self.macro_path, quote_macro_arg(input)));
        Invocation { program: self.program.clone(), args }
    }
}

/// Quote `s` as the C++ string literal ROOT passes to the macro function.
pub fn quote_macro_arg(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_matches_root_batch_call() {
        let inv = CommandTemplate::default().invocation("/eos/a/ZZ.root");
        assert_eq!(inv.program, "root");
        assert_eq!(
            inv.args,
            vec!["-l", "-b", "-q", "TMVAClassificationApplication.C(\"/eos/a/ZZ.root\")"]
        );
        assert_eq!(
            inv.to_string(),
            "root -l -b -q TMVAClassificationApplication.C(\"/eos/a/ZZ.root\")"
        );
    }

    #[test]
    fn quotes_and_backslashes_are_escaped() {
        assert_eq!(quote_macro_arg(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn urls_pass_through() {
        let t = CommandTemplate::for_macro("score.C");
        let inv = t.invocation("root://cmseos.fnal.gov//store/x.root");
        assert_eq!(inv.args[3], "score.C(\"root://cmseos.fnal.gov//store/x.root\")");
    }
}
