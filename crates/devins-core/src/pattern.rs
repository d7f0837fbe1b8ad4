//! Pattern-action pipeline functions
//!
//! A pattern-action such as `/.*\.rs/ { grep("src") | sort | head(3) }`
//! runs a list of lines through a chain of [`PipelineFunc`]s. The pure,
//! line-oriented functions are interpreted here; `cat`, `case` and unknown
//! calls need file access or variable lookup and are handled by the
//! compiler.

use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

/// One stage of a pattern-action pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "func", content = "args", rename_all = "snake_case")]
pub enum PipelineFunc {
    /// Keep lines matching any of the patterns
    Grep(Vec<String>),
    /// Regex replace on every line
    Sed {
        /// Pattern to search
        pattern: String,
        /// Replacement, `$1` style group references allowed
        replacement: String,
    },
    /// Sort lines lexically
    Sort,
    /// Drop consecutive duplicate lines
    Uniq,
    /// Keep the first `n` lines
    Head(usize),
    /// Keep the last `n` lines
    Tail(usize),
    /// Replace the lines with the given texts
    Print(Vec<String>),
    /// Replace the lines with the contents of the given files
    Cat(Vec<String>),
    /// Branch on a subject value
    Case(CaseMatch),
    /// Any function this crate does not interpret
    Call {
        /// Function name
        name: String,
        /// Raw arguments
        args: Vec<String>,
    },
}

impl PipelineFunc {
    /// Build a function from a parsed call
    pub fn from_call(name: &str, args: Vec<String>) -> Self {
        let count = |args: &[String]| args.first().and_then(|n| n.parse().ok()).unwrap_or(10);
        match name {
            "grep" => PipelineFunc::Grep(args),
            "sed" if args.len() == 2 => PipelineFunc::Sed {
                pattern: args[0].clone(),
                replacement: args[1].clone(),
            },
            "sort" => PipelineFunc::Sort,
            "uniq" => PipelineFunc::Uniq,
            "head" => PipelineFunc::Head(count(&args)),
            "tail" => PipelineFunc::Tail(count(&args)),
            "print" => PipelineFunc::Print(args),
            "cat" => PipelineFunc::Cat(args),
            _ => PipelineFunc::Call {
                name: name.to_string(),
                args,
            },
        }
    }

    /// Function name as written in a document
    pub fn name(&self) -> &str {
        match self {
            PipelineFunc::Grep(_) => "grep",
            PipelineFunc::Sed { .. } => "sed",
            PipelineFunc::Sort => "sort",
            PipelineFunc::Uniq => "uniq",
            PipelineFunc::Head(_) => "head",
            PipelineFunc::Tail(_) => "tail",
            PipelineFunc::Print(_) => "print",
            PipelineFunc::Cat(_) => "cat",
            PipelineFunc::Case(_) => "case",
            PipelineFunc::Call { name, .. } => name,
        }
    }

    /// Whether [`apply`] can run this function without outside help
    pub fn is_pure(&self) -> bool {
        !matches!(
            self,
            PipelineFunc::Cat(_) | PipelineFunc::Case(_) | PipelineFunc::Call { .. }
        )
    }
}

fn quoted(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("\"{a}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for PipelineFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineFunc::Grep(args) => write!(f, "grep({})", quoted(args)),
            PipelineFunc::Sed {
                pattern,
                replacement,
            } => write!(f, "sed(\"{pattern}\", \"{replacement}\")"),
            PipelineFunc::Sort => write!(f, "sort"),
            PipelineFunc::Uniq => write!(f, "uniq"),
            PipelineFunc::Head(n) => write!(f, "head({n})"),
            PipelineFunc::Tail(n) => write!(f, "tail({n})"),
            PipelineFunc::Print(args) => write!(f, "print({})", quoted(args)),
            PipelineFunc::Cat(args) => write!(f, "cat({})", quoted(args)),
            PipelineFunc::Case(case) => write!(f, "{case}"),
            PipelineFunc::Call { name, args } if args.is_empty() => write!(f, "{name}"),
            PipelineFunc::Call { name, args } => write!(f, "{name}({})", quoted(args)),
        }
    }
}

/// Join pipeline stages with ` | `
pub fn display_pipeline(funcs: &[PipelineFunc]) -> String {
    funcs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// `case "$1" { "a" { ... } default { ... } }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseMatch {
    /// Subject, may contain `$1` or `$name` references
    pub subject: String,
    /// Arms in source order
    pub arms: Vec<CaseArm>,
}

impl CaseMatch {
    /// Pick the arm for a resolved subject: the first literal match, else
    /// the `default` arm.
    pub fn select(&self, subject: &str) -> Option<&CaseArm> {
        self.arms
            .iter()
            .find(|arm| matches!(&arm.key, CaseKey::Literal(key) if key == subject))
            .or_else(|| self.arms.iter().find(|arm| arm.key == CaseKey::Default))
    }
}

impl fmt::Display for CaseMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "case \"{}\" {{", self.subject)?;
        for arm in &self.arms {
            match &arm.key {
                CaseKey::Literal(key) => write!(f, " \"{key}\"")?,
                CaseKey::Default => write!(f, " default")?,
            }
            write!(f, " {{ {} }}", display_pipeline(&arm.pipeline))?;
        }
        write!(f, " }}")
    }
}

/// One arm of a [`CaseMatch`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseArm {
    /// Literal key or `default`
    pub key: CaseKey,
    /// Pipeline run when the arm is selected
    pub pipeline: Vec<PipelineFunc>,
}

/// Key of a case arm
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKey {
    /// Compared with the subject
    Literal(String),
    /// Fallback arm
    Default,
}

/// Apply one pure function to `lines`.
pub fn apply(func: &PipelineFunc, mut lines: Vec<String>) -> Result<Vec<String>> {
    match func {
        PipelineFunc::Grep(patterns) => {
            let regexes = patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>>>()?;
            Ok(lines
                .into_iter()
                .filter(|line| regexes.iter().any(|re| re.is_match(line)))
                .collect())
        }
        PipelineFunc::Sed {
            pattern,
            replacement,
        } => {
            let re = compile(pattern)?;
            Ok(lines
                .into_iter()
                .map(|line| re.replace_all(&line, replacement.as_str()).into_owned())
                .collect())
        }
        PipelineFunc::Sort => {
            lines.sort();
            Ok(lines)
        }
        PipelineFunc::Uniq => {
            lines.dedup();
            Ok(lines)
        }
        PipelineFunc::Head(n) => {
            lines.truncate(*n);
            Ok(lines)
        }
        PipelineFunc::Tail(n) => {
            let skip = lines.len().saturating_sub(*n);
            Ok(lines.split_off(skip))
        }
        PipelineFunc::Print(texts) => Ok(texts.clone()),
        other => Err(Error::Pipeline {
            function: other.name().to_string(),
            message: "needs a compiler context".to_string(),
        }),
    }
}

/// Compile a regex, mapping failures to [`Error::InvalidRegex`]
pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}
