//! Condition expressions and conditional variables
//!
//! Expressions are parsed once when a template is loaded and evaluated
//! against each job's [`ParameterSet`]:
//!
//! ```text
//! eq(testRunType, 'Unit')
//! in(installationType, 'PipLocal', 'PyPI')
//! and(pinRequirements, not(eq(platform, 'Windows')))
//! ```

use crate::core::domain::{self, ClosedDomain, TargetType};
use crate::core::error::{ExpansionError, ExpansionResult};
use crate::core::params::{ParamValue, ParameterSet};
use std::fmt;

/// A value position inside an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Quoted string literal
    Literal(String),
    /// `true` / `false`
    Bool(bool),
    /// Parameter reference
    Ref(String),
}

/// Parsed condition expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Eq(Operand, Operand),
    Ne(Operand, Operand),
    /// First operand is one of the rest
    In(Operand, Vec<Operand>),
    Value(Operand),
}

/// A condition with its source text kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse an expression
    pub fn parse(source: &str) -> ExpansionResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let expr = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(ExpansionError::malformed(source, "unexpected trailing input"));
        }
        Ok(Condition {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against a parameter set
    pub fn evaluate(&self, params: &ParameterSet) -> ExpansionResult<bool> {
        Evaluator {
            source: &self.source,
            params,
        }
        .eval(&self.expr)
    }

    /// Every parameter name the expression references
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_refs(&self.expr, &mut names);
        names
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Evaluate a condition expression string against a parameter set
pub fn evaluate(expression: &str, params: &ParameterSet) -> ExpansionResult<bool> {
    Condition::parse(expression)?.evaluate(params)
}

fn collect_refs<'a>(expr: &'a Expr, names: &mut Vec<&'a str>) {
    let push = |op: &'a Operand, names: &mut Vec<&'a str>| {
        if let Operand::Ref(name) = op {
            names.push(name.as_str());
        }
    };
    match expr {
        Expr::Not(inner) => collect_refs(inner, names),
        Expr::And(items) | Expr::Or(items) => {
            for item in items {
                collect_refs(item, names);
            }
        }
        Expr::Eq(a, b) | Expr::Ne(a, b) => {
            push(a, names);
            push(b, names);
        }
        Expr::In(needle, haystack) => {
            push(needle, names);
            for op in haystack {
                push(op, names);
            }
        }
        Expr::Value(op) => push(op, names),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Comma,
}

fn tokenize(source: &str) -> ExpansionResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' => {
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '\'' {
                        // '' escapes a single quote
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                            literal.push('\'');
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    literal.push(c);
                }
                if !closed {
                    return Err(ExpansionError::malformed(source, "unterminated string literal"));
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(ExpansionError::malformed(
                    source,
                    format!("unexpected character '{}'", other),
                ));
            }
        }
    }

    if tokens.is_empty() {
        return Err(ExpansionError::malformed(source, "empty expression"));
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> ExpansionResult<()> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            other => Err(ExpansionError::malformed(
                self.source,
                format!("expected {:?}, found {:?}", expected, other),
            )),
        }
    }

    fn expr(&mut self) -> ExpansionResult<Expr> {
        let call = match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
            (Some(Token::Ident(name)), Some(Token::LParen)) => Some(name.clone()),
            _ => None,
        };
        let Some(name) = call else {
            return Ok(Expr::Value(self.operand()?));
        };
        self.pos += 1;
        self.expect(Token::LParen)?;

        let expr = match name.as_str() {
            "not" => Expr::Not(Box::new(self.expr()?)),
            "and" | "or" => {
                let mut items = vec![self.expr()?];
                while self.peek() == Some(&Token::Comma) {
                    self.next();
                    items.push(self.expr()?);
                }
                if items.len() < 2 {
                    return Err(ExpansionError::malformed(
                        self.source,
                        format!("{}() needs at least two arguments", name),
                    ));
                }
                if name == "and" {
                    Expr::And(items)
                } else {
                    Expr::Or(items)
                }
            }
            "eq" | "ne" => {
                let left = self.operand()?;
                self.expect(Token::Comma)?;
                let right = self.operand()?;
                if name == "eq" {
                    Expr::Eq(left, right)
                } else {
                    Expr::Ne(left, right)
                }
            }
            "in" => {
                let needle = self.operand()?;
                let mut haystack = Vec::new();
                while self.peek() == Some(&Token::Comma) {
                    self.next();
                    haystack.push(self.operand()?);
                }
                if haystack.is_empty() {
                    return Err(ExpansionError::malformed(
                        self.source,
                        "in() needs at least one candidate",
                    ));
                }
                Expr::In(needle, haystack)
            }
            other => {
                return Err(ExpansionError::malformed(
                    self.source,
                    format!("unknown function '{}'", other),
                ));
            }
        };

        self.expect(Token::RParen)?;
        Ok(expr)
    }

    fn operand(&mut self) -> ExpansionResult<Operand> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Operand::Literal(s)),
            Some(Token::Ident(ident)) => Ok(match ident.as_str() {
                "true" => Operand::Bool(true),
                "false" => Operand::Bool(false),
                _ => Operand::Ref(ident),
            }),
            other => Err(ExpansionError::malformed(
                self.source,
                format!("expected a value, found {:?}", other),
            )),
        }
    }
}

struct Evaluator<'a> {
    source: &'a str,
    params: &'a ParameterSet,
}

impl<'a> Evaluator<'a> {
    fn eval(&self, expr: &Expr) -> ExpansionResult<bool> {
        match expr {
            Expr::Not(inner) => Ok(!self.eval(inner)?),
            Expr::And(items) => {
                for item in items {
                    if !self.eval(item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Or(items) => {
                for item in items {
                    if self.eval(item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Eq(a, b) => self.equals(a, b),
            Expr::Ne(a, b) => Ok(!self.equals(a, b)?),
            Expr::In(needle, haystack) => {
                let value = self.value(needle)?;
                let mut found = false;
                for candidate in haystack {
                    self.check_domain(needle, candidate)?;
                    if self.value(candidate)? == value {
                        found = true;
                    }
                }
                Ok(found)
            }
            Expr::Value(op) => self.truthy(op),
        }
    }

    fn equals(&self, a: &Operand, b: &Operand) -> ExpansionResult<bool> {
        self.check_domain(a, b)?;
        self.check_domain(b, a)?;
        Ok(self.value(a)? == self.value(b)?)
    }

    /// Comparing a closed-domain parameter against a literal outside that
    /// domain can never be true and is a template authoring error.
    fn check_domain(&self, reference: &Operand, literal: &Operand) -> ExpansionResult<()> {
        if let (Operand::Ref(name), Operand::Literal(value)) = (reference, literal) {
            if let Some(labels) = domain::domain_of(name) {
                if !labels.contains(&value.as_str()) {
                    return Err(ExpansionError::malformed(
                        self.source,
                        format!(
                            "'{}' is not a valid {} (expected one of: {})",
                            value,
                            name,
                            labels.join(", ")
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> ExpansionResult<&'a ParamValue> {
        self.params.get(name).ok_or_else(|| {
            ExpansionError::malformed(
                self.source,
                format!("references undeclared parameter '{}'", name),
            )
        })
    }

    fn value(&self, op: &Operand) -> ExpansionResult<String> {
        match op {
            Operand::Literal(s) => Ok(s.clone()),
            Operand::Bool(b) => Ok(b.to_string()),
            Operand::Ref(name) => Ok(self.lookup(name)?.render()),
        }
    }

    fn truthy(&self, op: &Operand) -> ExpansionResult<bool> {
        match op {
            Operand::Bool(b) => Ok(*b),
            Operand::Ref(name) => self.lookup(name)?.as_bool().ok_or_else(|| {
                ExpansionError::malformed(
                    self.source,
                    format!("parameter '{}' is not a boolean", name),
                )
            }),
            Operand::Literal(s) => Err(ExpansionError::malformed(
                self.source,
                format!("string literal '{}' used as a condition", s),
            )),
        }
    }
}

/// Value source of a variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    Plain(String),
    /// Exactly one branch may match; `default` applies when none does
    Branches {
        branches: Vec<(Condition, String)>,
        default: Option<String>,
    },
}

/// A named variable whose value may depend on conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalVariable {
    pub name: String,
    pub value: VariableValue,
}

impl ConditionalVariable {
    pub fn plain(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: VariableValue::Plain(value.into()),
        }
    }

    /// Pick the raw (not yet interpolated) value for this variable
    ///
    /// Returns `None` when no branch matches and there is no default.
    pub fn select(&self, params: &ParameterSet) -> ExpansionResult<Option<String>> {
        match &self.value {
            VariableValue::Plain(value) => Ok(Some(value.clone())),
            VariableValue::Branches { branches, default } => {
                let mut matched = Vec::new();
                for (condition, value) in branches {
                    if condition.evaluate(params)? {
                        matched.push((condition, value));
                    }
                }
                match matched.len() {
                    0 => Ok(default.clone()),
                    1 => Ok(Some(matched[0].1.clone())),
                    _ => Err(ExpansionError::AmbiguousCondition {
                        variable: self.name.clone(),
                        branches: matched
                            .iter()
                            .map(|(c, _)| c.source().to_string())
                            .collect(),
                    }),
                }
            }
        }
    }

    /// The canonical upload-URL variable, one branch per `targetType`
    pub fn pypi_url() -> ExpansionResult<Self> {
        let branches = TargetType::MEMBERS
            .iter()
            .map(|&target| {
                let when = format!("eq({}, '{}')", domain::TARGET_TYPE, target);
                Ok((Condition::parse(&when)?, domain::pypi_url(target).to_string()))
            })
            .collect::<ExpansionResult<Vec<_>>>()?;
        Ok(Self {
            name: domain::PYPI_URL.to_string(),
            value: VariableValue::Branches {
                branches,
                default: None,
            },
        })
    }

    pub fn referenced_names(&self) -> Vec<&str> {
        match &self.value {
            VariableValue::Plain(_) => Vec::new(),
            VariableValue::Branches { branches, .. } => branches
                .iter()
                .flat_map(|(c, _)| c.referenced_names())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::{resolve, ParameterDefaults, ParameterLayer};

    fn params(pairs: &[(&str, ParamValue)]) -> ParameterSet {
        let overrides: ParameterLayer = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        resolve(&ParameterDefaults::new(), &overrides, &ParameterLayer::new(), "test").unwrap()
    }

    #[test]
    fn test_equality_and_negation() {
        let p = params(&[("testRunType", "Unit".into())]);
        assert!(evaluate("eq(testRunType, 'Unit')", &p).unwrap());
        assert!(!evaluate("eq(testRunType, 'Notebooks')", &p).unwrap());
        assert!(evaluate("not(eq(testRunType, 'Notebooks'))", &p).unwrap());
        assert!(evaluate("ne(testRunType, 'Notebooks')", &p).unwrap());
    }

    #[test]
    fn test_membership() {
        let p = params(&[("installationType", "PyPI".into())]);
        assert!(evaluate("in(installationType, 'PipLocal', 'PyPI')", &p).unwrap());
        assert!(!evaluate("in(installationType, 'None')", &p).unwrap());
    }

    #[test]
    fn test_boolean_parameters_and_combinators() {
        let p = params(&[
            ("pinRequirements", true.into()),
            ("platform", "Linux".into()),
        ]);
        assert!(evaluate("pinRequirements", &p).unwrap());
        assert!(evaluate("and(pinRequirements, eq(platform, 'Linux'))", &p).unwrap());
        assert!(evaluate("or(not(pinRequirements), eq(platform, 'Linux'))", &p).unwrap());
        assert!(!evaluate("and(pinRequirements, false)", &p).unwrap());
    }

    #[test]
    fn test_undeclared_parameter_is_malformed() {
        let p = params(&[("platform", "Linux".into())]);
        let err = evaluate("eq(osName, 'Linux')", &p).unwrap_err();
        assert!(matches!(err, ExpansionError::MalformedCondition { ref reason, .. } if reason.contains("osName")));
    }

    #[test]
    fn test_literal_outside_closed_domain_is_malformed() {
        let p = params(&[("targetType", "Test".into())]);
        assert!(evaluate("eq(targetType, 'Tset')", &p).is_err());
        assert!(evaluate("eq('Prod', targetType)", &p).is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["", "eq(a 'b')", "eq(a, 'b'", "frob(a, 'b')", "'lonely'", "and(true)", "eq(a, 'b') x"] {
            assert!(Condition::parse(bad).is_err() || evaluate(bad, &ParameterSet::default()).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_quote_escape() {
        let p = params(&[("label", "it's".into())]);
        assert!(evaluate("eq(label, 'it''s')", &p).unwrap());
    }

    #[test]
    fn test_referenced_names() {
        let c = Condition::parse("and(eq(platform, 'Linux'), in(matrix.pyVersion, '3.8'))").unwrap();
        assert_eq!(c.referenced_names(), vec!["platform", "matrix.pyVersion"]);
    }

    #[test]
    fn test_pypi_url_variable() {
        let var = ConditionalVariable::pypi_url().unwrap();
        let test = params(&[("targetType", "Test".into())]);
        let prod = params(&[("targetType", "Prod".into())]);
        assert_eq!(var.select(&test).unwrap().as_deref(), Some("https://test.pypi.org/legacy/"));
        assert_eq!(var.select(&prod).unwrap().as_deref(), Some("https://upload.pypi.org/legacy/"));
    }

    #[test]
    fn test_ambiguous_branches() {
        let var = ConditionalVariable {
            name: "feed".to_string(),
            value: VariableValue::Branches {
                branches: vec![
                    (Condition::parse("eq(platform, 'Linux')").unwrap(), "a".to_string()),
                    (Condition::parse("ne(platform, 'Windows')").unwrap(), "b".to_string()),
                ],
                default: None,
            },
        };
        let p = params(&[("platform", "Linux".into())]);
        let err = var.select(&p).unwrap_err();
        assert!(matches!(err, ExpansionError::AmbiguousCondition { ref branches, .. } if branches.len() == 2));
    }

    #[test]
    fn test_no_branch_falls_back_to_default() {
        let var = ConditionalVariable {
            name: "feed".to_string(),
            value: VariableValue::Branches {
                branches: vec![(Condition::parse("eq(platform, 'Linux')").unwrap(), "a".to_string())],
                default: Some("fallback".to_string()),
            },
        };
        let p = params(&[("platform", "MacOS".into())]);
        assert_eq!(var.select(&p).unwrap().as_deref(), Some("fallback"));
    }
}
