//! Syntax check for TTreeFormula expressions used in TMVA configs.
//!
//! Selections, feature definitions and event-weight expressions are handed to
//! ROOT as text. Here they are only checked for structure (balanced brackets,
//! operands where operators expect them, argument counts of the common
//! built-ins) and scanned for the branches they read.
//!
//! Accepted: numbers, branch names, array subscripts (`LHEWeight[992]`,
//! `w[n-1]`), `+ - * / %`, comparisons, `&& || !`, `c ? a : b`, and function
//! calls. Functions not in the built-in table are passed through with a
//! warning; their arity is left to TTreeFormula.

use mb_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Op {
    /// Left binding power; higher binds tighter.
    fn power(self) -> u8 {
        match self {
            Op::Or => 1,
            Op::And => 2,
            Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => 3,
            Op::Add | Op::Sub => 4,
            Op::Mul | Op::Div | Op::Mod => 5,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Or => "||",
            Op::And => "&&",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
        }
    }
}

const PREFIX_POWER: u8 = 6;

/// Argument count of a TTreeFormula built-in, `None` if not in the table.
fn builtin_arity(name: &str) -> Option<usize> {
    if let Some(f) = name.strip_prefix("TMath::") {
        return match f {
            "Pi" | "TwoPi" | "PiOver2" | "PiOver4" | "E" | "Sqrt2" | "Ln10" => Some(0),
            "Abs" | "Sqrt" | "Log" | "Log10" | "Exp" | "Sin" | "Cos" | "Tan" | "ASin" | "ACos"
            | "ATan" | "SinH" | "CosH" | "TanH" | "Floor" | "Ceil" | "Nint" => Some(1),
            "Power" | "ATan2" | "Min" | "Max" | "Hypot" | "Sign" => Some(2),
            _ => None,
        };
    }
    match name {
        "abs" | "fabs" | "sqrt" | "log" | "log10" | "exp" | "sin" | "cos" | "tan" | "asin"
        | "acos" | "atan" | "sinh" | "cosh" | "tanh" | "floor" | "ceil" | "int" => Some(1),
        "pow" | "atan2" | "fmod" | "min" | "max" => Some(2),
        "Sum$" | "Length$" | "Max$" | "Min$" => Some(1),
        "Alt$" | "MaxIf$" | "MinIf$" => Some(2),
        _ => None,
    }
}

/// Lexer and parser errors; `compile` adds the source text.
type Parse<T> = std::result::Result<T, String>;

/// One value read from the event: a scalar branch or a fixed element of an
/// array branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafRef {
    /// Branch name as stored in the tree.
    pub branch: String,
    /// Constant array subscript, if the expression has one.
    pub index: Option<usize>,
}

impl std::fmt::Display for LeafRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.branch, i),
            None => f.write_str(&self.branch),
        }
    }
}

// ── Checked expression ─────────────────────────────────────────

/// An expression that passed the syntax check, with the event values it reads.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    /// Values the expression reads, ordered by first occurrence.
    pub leaves: Vec<LeafRef>,
}

impl CompiledExpr {
    /// Check `input`. Errors quote the input and the failing column.
    pub fn compile(input: &str) -> Result<Self> {
        let source = input.trim();
        let fail = |msg: String| Error::Expression(format!("{msg} in '{source}'"));

        let tokens = lex(source).map_err(fail)?;
        if tokens.is_empty() {
            return Err(Error::Expression("empty expression".to_string()));
        }
        let mut p = Parser { tokens: &tokens, next: 0, end: source.len(), leaves: Vec::new() };
        p.expr(0).map_err(fail)?;
        if let Some(extra) = p.tokens.get(p.next) {
            return Err(fail(format!(
                "unexpected {} at column {}",
                extra.tok.describe(),
                extra.at + 1
            )));
        }
        Ok(Self { source: source.to_string(), leaves: p.leaves })
    }

    /// The expression text this was compiled from (trimmed).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct branch names the expression reads, ordered by first occurrence.
    pub fn branches(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(self.leaves.len());
        for name in self.leaves.iter().map(|l| l.branch.as_str()) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }
}

// ── Lexer ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Name(String),
    Bin(Op),
    Bang,
    Question,
    Colon,
    Open,
    Close,
    OpenIdx,
    CloseIdx,
    Comma,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Num(v) => format!("number {v}"),
            Tok::Name(n) => format!("name '{n}'"),
            Tok::Bin(op) => format!("'{}'", op.symbol()),
            Tok::Bang => "'!'".to_string(),
            Tok::Question => "'?'".to_string(),
            Tok::Colon => "':'".to_string(),
            Tok::Open => "'('".to_string(),
            Tok::Close => "')'".to_string(),
            Tok::OpenIdx => "'['".to_string(),
            Tok::CloseIdx => "']'".to_string(),
            Tok::Comma => "','".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    /// Byte offset in the trimmed source.
    at: usize,
}

fn lex(src: &str) -> Parse<Vec<Spanned>> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let at = i;
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let two = match (c, next) {
            (b'&', Some(b'&')) => Some(Tok::Bin(Op::And)),
            (b'|', Some(b'|')) => Some(Tok::Bin(Op::Or)),
            (b'=', Some(b'=')) => Some(Tok::Bin(Op::Eq)),
            (b'!', Some(b'=')) => Some(Tok::Bin(Op::Ne)),
            (b'<', Some(b'=')) => Some(Tok::Bin(Op::Le)),
            (b'>', Some(b'=')) => Some(Tok::Bin(Op::Ge)),
            _ => None,
        };
        if let Some(tok) = two {
            out.push(Spanned { tok, at });
            i += 2;
            continue;
        }

        let one = match c {
            b'+' => Some(Tok::Bin(Op::Add)),
            b'-' => Some(Tok::Bin(Op::Sub)),
            b'*' => Some(Tok::Bin(Op::Mul)),
            b'/' => Some(Tok::Bin(Op::Div)),
            b'%' => Some(Tok::Bin(Op::Mod)),
            b'<' => Some(Tok::Bin(Op::Lt)),
            b'>' => Some(Tok::Bin(Op::Gt)),
            b'!' => Some(Tok::Bang),
            b'?' => Some(Tok::Question),
            b':' => Some(Tok::Colon),
            b'(' => Some(Tok::Open),
            b')' => Some(Tok::Close),
            b'[' => Some(Tok::OpenIdx),
            b']' => Some(Tok::CloseIdx),
            b',' => Some(Tok::Comma),
            _ => None,
        };
        if let Some(tok) = one {
            out.push(Spanned { tok, at });
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            i = scan_number(bytes, i);
            let text = &src[at..i];
            let v: f64 = text
                .parse()
                .map_err(|_| format!("invalid number '{text}' at column {}", at + 1))?;
            out.push(Spanned { tok: Tok::Num(v), at });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            i = scan_name(bytes, i);
            out.push(Spanned { tok: Tok::Name(src[at..i].to_string()), at });
            continue;
        }

        let ch = src[at..].chars().next().unwrap_or('?');
        return Err(format!("unexpected character '{ch}' at column {}", at + 1));
    }
    Ok(out)
}

/// End of a numeric literal starting at `i` (digits, one exponent with sign).
fn scan_number(b: &[u8], mut i: usize) -> usize {
    while i < b.len() && (b[i].is_ascii_digit() || b[i] == b'.') {
        i += 1;
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        let mut j = i + 1;
        if j < b.len() && (b[j] == b'+' || b[j] == b'-') {
            j += 1;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            i = j;
            while i < b.len() && b[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    i
}

/// End of an identifier starting at `i`. `::` joins namespace parts
/// (`TMath::Abs`); a trailing `$` marks TTreeFormula specials (`Alt$`).
fn scan_name(b: &[u8], mut i: usize) -> usize {
    let word = |c: u8| c.is_ascii_alphanumeric() || c == b'_';
    loop {
        while i < b.len() && word(b[i]) {
            i += 1;
        }
        if b.get(i) == Some(&b'$') {
            return i + 1;
        }
        let qualified = b.get(i) == Some(&b':')
            && b.get(i + 1) == Some(&b':')
            && b.get(i + 2).is_some_and(|&c| c.is_ascii_alphabetic() || c == b'_');
        if !qualified {
            return i;
        }
        i += 2;
    }
}

// ── Parser (precedence climbing) ───────────────────────────────

struct Parser<'t> {
    tokens: &'t [Spanned],
    next: usize,
    /// Source length, reported as the column of "end of input".
    end: usize,
    leaves: Vec<LeafRef>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.next).map(|s| &s.tok)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.next + ahead).map(|s| &s.tok)
    }

    fn bump(&mut self) -> Option<Spanned> {
        let s = self.tokens.get(self.next).cloned();
        if s.is_some() {
            self.next += 1;
        }
        s
    }

    fn column(&self) -> usize {
        self.tokens.get(self.next).map_or(self.end, |s| s.at) + 1
    }

    fn require(&mut self, want: Tok) -> Parse<()> {
        let col = self.column();
        match self.bump() {
            Some(s) if s.tok == want => Ok(()),
            Some(s) => Err(format!(
                "expected {}, found {} at column {col}",
                want.describe(),
                s.tok.describe()
            )),
            None => Err(format!("expected {} at column {col}, found end of input", want.describe())),
        }
    }

    fn leaf(&mut self, leaf: LeafRef) {
        if !self.leaves.contains(&leaf) {
            self.leaves.push(leaf);
        }
    }

    /// Check operators binding tighter than `min_power`. The conditional
    /// operator binds loosest and groups to the right.
    fn expr(&mut self, min_power: u8) -> Parse<()> {
        self.prefix()?;
        while let Some(&Tok::Bin(op)) = self.peek() {
            if op.power() <= min_power {
                break;
            }
            self.next += 1;
            self.expr(op.power())?;
        }
        if min_power == 0 && self.peek() == Some(&Tok::Question) {
            self.next += 1;
            self.expr(0)?;
            self.require(Tok::Colon)?;
            self.expr(0)?;
        }
        Ok(())
    }

    fn prefix(&mut self) -> Parse<()> {
        match self.peek() {
            Some(Tok::Bin(Op::Sub | Op::Add) | Tok::Bang) => {
                self.next += 1;
                self.expr(PREFIX_POWER)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Parse<()> {
        let col = self.column();
        let Some(Spanned { tok, .. }) = self.bump() else {
            return Err(format!("expected a value at column {col}, found end of input"));
        };
        match tok {
            Tok::Num(_) => Ok(()),
            Tok::Open => {
                self.expr(0)?;
                self.require(Tok::Close)
            }
            Tok::Name(name) => match self.peek() {
                Some(Tok::Open) => self.call(&name, col),
                Some(Tok::OpenIdx) => {
                    self.next += 1;
                    let index = self.subscript(&name)?;
                    self.require(Tok::CloseIdx)?;
                    self.leaf(LeafRef { branch: name, index });
                    Ok(())
                }
                _ if name.contains("::") => {
                    Err(format!("qualified name '{name}' at column {col} is not a function call"))
                }
                // `Entry$`, `Iteration$`: tree state, not a branch
                _ if name.ends_with('$') => Ok(()),
                _ => {
                    self.leaf(LeafRef { branch: name, index: None });
                    Ok(())
                }
            },
            other => Err(format!("expected a value at column {col}, found {}", other.describe())),
        }
    }

    /// A literal subscript must be a non-negative integer; any other
    /// subscript is an expression evaluated per event.
    fn subscript(&mut self, name: &str) -> Parse<Option<usize>> {
        let col = self.column();
        if let (Some(&Tok::Num(v)), Some(Tok::CloseIdx)) = (self.peek(), self.peek_at(1)) {
            if v < 0.0 || v.fract() != 0.0 {
                return Err(format!(
                    "subscript of '{name}' at column {col} must be a non-negative integer"
                ));
            }
            self.next += 1;
            return Ok(Some(v as usize));
        }
        self.expr(0)?;
        Ok(None)
    }

    fn call(&mut self, name: &str, col: usize) -> Parse<()> {
        self.next += 1; // '('
        let mut n_args = 0;
        if self.peek() != Some(&Tok::Close) {
            loop {
                self.expr(0)?;
                n_args += 1;
                if self.peek() == Some(&Tok::Comma) {
                    self.next += 1;
                } else {
                    break;
                }
            }
        }
        self.require(Tok::Close)?;
        match builtin_arity(name) {
            Some(want) if want != n_args => {
                Err(format!("'{name}' at column {col} takes {want} argument(s), got {n_args}"))
            }
            Some(_) => Ok(()),
            None => {
                tracing::warn!(function = name, "unrecognized function passed through to ROOT");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(src: &str) -> CompiledExpr {
        CompiledExpr::compile(src).unwrap_or_else(|e| panic!("{src}: {e}"))
    }

    #[test]
    fn constants_read_no_branches() {
        let e = ok("  2 + 3 * 4 - 6 / 2 / 3 ");
        assert!(e.leaves.is_empty());
        assert_eq!(e.source(), "2 + 3 * 4 - 6 / 2 / 3");
    }

    #[test]
    fn ratio_feature() {
        let e = ok("ZeppenfeldWH/vbf_maxpt_jj_Deta");
        assert_eq!(e.branches(), vec!["ZeppenfeldWH", "vbf_maxpt_jj_Deta"]);
    }

    #[test]
    fn array_subscripts_are_distinct_leaves() {
        let e = ok("genWeight*LHEWeight[992]/LHEWeight[0]");
        assert_eq!(e.leaves.len(), 3);
        assert_eq!(e.leaves[1].to_string(), "LHEWeight[992]");
        assert_eq!(e.leaves[2].to_string(), "LHEWeight[0]");
        assert_eq!(e.branches(), vec!["genWeight", "LHEWeight"]);
    }

    #[test]
    fn expression_subscript_reads_its_branches() {
        let e = ok("jet_pt[njets-1] > 30");
        assert_eq!(e.branches(), vec!["njets", "jet_pt"]);
        assert_eq!(e.leaves[1].index, None);
    }

    #[test]
    fn repeated_leaf_is_recorded_once() {
        let e = ok("(x > -1.0) && (x < 1.0)");
        assert_eq!(e.leaves.len(), 1);
    }

    #[test]
    fn selection_with_abs_and_or() {
        let e = ok("(type==1 || type==0) && (l_pt2<0) && (abs(ungroomed_PuppiAK8_jet_eta)<2.4)");
        assert_eq!(e.branches(), vec!["type", "l_pt2", "ungroomed_PuppiAK8_jet_eta"]);
    }

    #[test]
    fn trigonometry_and_tmath() {
        let e = ok("cos(phi_type0) + TMath::Cos(phi1_type0) * sin(x) - atan2(y, x)");
        assert_eq!(e.branches(), vec!["phi_type0", "phi1_type0", "x", "y"]);
        let e = ok("abs(dphi) < TMath::Pi()/2 && log10(pt) > 1");
        assert_eq!(e.branches(), vec!["dphi", "pt"]);
    }

    #[test]
    fn modulo_and_conditional() {
        assert_eq!(ok("njets%2 == 0").branches(), vec!["njets"]);
        assert_eq!(ok("x > 0 ? x : 0").branches(), vec!["x"]);
        assert_eq!(ok("a ? b : c ? d : e").branches(), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(ok("max(a > 0 ? a : -a, b)").branches(), vec!["a", "b"]);
    }

    #[test]
    fn tree_specials_and_unknown_functions_pass() {
        let e = ok("Alt$(jet_pt[2], 0) + myHelper() + Entry$%2");
        assert_eq!(e.branches(), vec!["jet_pt"]);
    }

    #[test]
    fn prefix_operators() {
        assert_eq!(ok("-x * -2").branches(), vec!["x"]);
        assert_eq!(ok("!(x > 3)").branches(), vec!["x"]);
        assert_eq!(ok("+x").branches(), vec!["x"]);
    }

    #[test]
    fn exponents() {
        assert!(ok("1.5e2 + 3.0E-1 + 2e+1").leaves.is_empty());
    }

    #[test]
    fn unbalanced_parens_report_column() {
        let err = CompiledExpr::compile("(l_pt1>30 && (njets>1)").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected ')'"), "{msg}");
        assert!(msg.contains("column 23"), "{msg}");
        assert!(msg.contains("l_pt1>30"), "{msg}");
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let err = CompiledExpr::compile("x y").unwrap_err();
        assert!(err.to_string().contains("unexpected name 'y' at column 3"), "{err}");
    }

    #[test]
    fn wrong_arity_of_builtin_is_rejected() {
        let err = CompiledExpr::compile("pow(x)").unwrap_err();
        assert!(err.to_string().contains("'pow' at column 1 takes 2 argument(s), got 1"), "{err}");
        assert!(CompiledExpr::compile("TMath::Pi(x)").is_err());
        assert!(CompiledExpr::compile("cos()").is_err());
        assert!(CompiledExpr::compile("TMath::Pi").is_err());
    }

    #[test]
    fn structural_errors_are_rejected() {
        assert!(CompiledExpr::compile("w[1.5]").is_err());
        assert!(CompiledExpr::compile("w[]").is_err());
        assert!(CompiledExpr::compile("x ? y").is_err());
        assert!(CompiledExpr::compile("x : y").is_err());
        assert!(CompiledExpr::compile("f(x,)").is_err());
        let err = CompiledExpr::compile("x $ y").unwrap_err();
        assert!(err.to_string().contains("'$' at column 3"), "{err}");
        assert!(CompiledExpr::compile("   ").is_err());
        assert!(CompiledExpr::compile("x +").is_err());
    }
}
