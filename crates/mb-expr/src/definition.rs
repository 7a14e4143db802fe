//! Named expressions in TMVA's `alias := formula` form.

use mb_core::{Error, Result};

use crate::expr::CompiledExpr;

/// A variable definition as passed to `DataLoader::AddVariable`.
///
/// Either a bare formula (`l_pt1`, `a/b`) or an alias bound to a formula
/// (`ZeppenfeldWH/DEtajj := ZeppenfeldWH/vbf_maxpt_jj_Deta`). The alias is an
/// opaque label to TMVA and may itself contain operator characters.
#[derive(Debug, Clone)]
pub struct Definition {
    /// Text left of `:=`, if present.
    pub alias: Option<String>,
    /// Compiled right-hand side.
    pub formula: CompiledExpr,
}

impl Definition {
    /// Parse a definition string.
    pub fn parse(text: &str) -> Result<Self> {
        let (alias, rhs) = match text.split_once(":=") {
            Some((lhs, rhs)) => {
                let lhs = lhs.trim();
                if lhs.is_empty() {
                    return Err(Error::Expression(format!("empty alias in '{}'", text.trim())));
                }
                (Some(lhs.to_string()), rhs)
            }
            None => (None, text),
        };
        let formula = CompiledExpr::compile(rhs)?;
        Ok(Self { alias, formula })
    }

    /// Name TMVA uses for this variable: the alias, or the formula text.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.formula.source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_branch() {
        let d = Definition::parse("l_pt1").unwrap();
        assert_eq!(d.alias, None);
        assert_eq!(d.name(), "l_pt1");
        assert_eq!(d.formula.branches(), vec!["l_pt1"]);
    }

    #[test]
    fn aliased_ratio() {
        let d = Definition::parse("ZeppenfeldWL/DEtajj := ZeppenfeldWL_type0/vbf_maxpt_jj_Deta")
            .unwrap();
        assert_eq!(d.name(), "ZeppenfeldWL/DEtajj");
        assert_eq!(d.formula.branches(), vec!["ZeppenfeldWL_type0", "vbf_maxpt_jj_Deta"]);
    }

    #[test]
    fn unaliased_formula_is_its_own_name() {
        let d = Definition::parse("l_pt1*2").unwrap();
        assert_eq!(d.name(), "l_pt1*2");
        assert_eq!(d.formula.source(), "l_pt1*2");
    }

    #[test]
    fn empty_alias_or_formula_rejected() {
        assert!(Definition::parse(" := x").is_err());
        assert!(Definition::parse("spec1 := ").is_err());
    }
}
