//! Expression evaluation for `when`, `#if` and `#set`
//!
//! Expressions are written with `$` sigils and C-style boolean operators
//! (`$lang == "rust" && !$draft`). They are translated to minijinja
//! expression syntax and evaluated against the resolved variable table.

use minijinja::Environment;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::variables::VariableTable;

/// Evaluates expressions against a [`VariableTable`]
#[derive(Debug)]
pub struct Evaluator {
    env: Environment<'static>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// Create an evaluator with the default minijinja environment
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// Evaluate `expression` and return its value as JSON
    pub fn evaluate(&self, expression: &str, variables: &VariableTable) -> Result<Value> {
        let translated = translate(expression);
        let to_error = |e: minijinja::Error| Error::Expression {
            expression: expression.to_string(),
            message: e.to_string(),
        };
        let compiled = self.env.compile_expression(&translated).map_err(to_error)?;
        let value = compiled.eval(variables.to_context()).map_err(to_error)?;
        Ok(serde_json::to_value(&value)?)
    }

    /// Evaluate `expression` for truthiness
    pub fn evaluate_condition(&self, expression: &str, variables: &VariableTable) -> Result<bool> {
        let translated = translate(expression);
        let to_error = |e: minijinja::Error| Error::Expression {
            expression: expression.to_string(),
            message: e.to_string(),
        };
        let compiled = self.env.compile_expression(&translated).map_err(to_error)?;
        Ok(compiled
            .eval(variables.to_context())
            .map_err(to_error)?
            .is_true())
    }
}

/// Rewrite `$name`, `&&`, `||` and `!` into minijinja syntax. String
/// literals are copied untouched.
pub fn translate(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let chars: Vec<char> = expression.chars().collect();
    let mut i = 0;
    let mut quote: Option<char> = None;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        if let Some(q) = quote {
            out.push(ch);
            if ch == '\\' {
                if let Some(n) = next {
                    out.push(n);
                    i += 1;
                }
            } else if ch == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match (ch, next) {
            ('"' | '\'', _) => {
                quote = Some(ch);
                out.push(ch);
            }
            ('$', Some('{')) => {
                if let Some(close) = chars[i..].iter().position(|c| *c == '}') {
                    out.extend(&chars[i + 2..i + close]);
                    i += close + 1;
                    continue;
                }
                out.push(ch);
            }
            ('$', Some(n)) if n.is_ascii_alphabetic() || n == '_' => {}
            ('&', Some('&')) => {
                out.push_str(" and ");
                i += 1;
            }
            ('|', Some('|')) => {
                out.push_str(" or ");
                i += 1;
            }
            ('!', n) if n != Some('=') => out.push_str(" not "),
            _ => out.push(ch),
        }
        i += 1;
    }
    out.trim().to_string()
}
