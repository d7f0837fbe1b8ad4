//! Phase 2: residual `$name` substitution
//!
//! After the node walk the output may still hold `$name` tokens that were
//! not part of the document's own syntax: inside code blocks, file contents
//! or command output. This pass substitutes every token whose name is
//! defined, using the same word-boundary rule as the lexer, and leaves the
//! others untouched.

use std::ops::Range;

use devins_core::Accessor;
use devins_core::VariableTable;
use devins_core::lexer::{may_start_variable, scan_variable};
use devins_core::variables::display_value;

/// Outcome of [`TemplateCompiler::render`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateOutput {
    /// Substituted text
    pub text: String,
    /// Number of tokens replaced
    pub substitutions: usize,
    /// Names left in place, first occurrence order
    pub unresolved: Vec<String>,
}

/// Linear `$name` substitution over already compiled text
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateCompiler;

impl TemplateCompiler {
    /// Substitute defined variables in `raw`
    pub fn compile(raw: &str, variables: &VariableTable) -> String {
        Self::render(raw, variables).text
    }

    /// Substitute defined variables in `raw` and report what happened
    pub fn render(raw: &str, variables: &VariableTable) -> TemplateOutput {
        Self::render_protected(raw, variables, &[])
    }

    /// Like [`render`](Self::render), but byte ranges in `protected` are
    /// copied as they are. Ranges must be ordered and must not overlap.
    pub fn render_protected(
        raw: &str,
        variables: &VariableTable,
        protected: &[Range<usize>],
    ) -> TemplateOutput {
        let mut output = TemplateOutput {
            text: String::with_capacity(raw.len()),
            ..TemplateOutput::default()
        };
        let mut pos = 0;
        for range in protected {
            let (Some(open), Some(kept)) = (raw.get(pos..range.start), raw.get(range.clone()))
            else {
                continue;
            };
            substitute_into(&mut output, open, variables);
            output.text.push_str(kept);
            pos = range.end;
        }
        substitute_into(&mut output, raw.get(pos..).unwrap_or_default(), variables);
        output
    }
}

// The boundary check looks at the output, so a second pass sees the same
// neighbours as the first.
fn substitute_into(output: &mut TemplateOutput, segment: &str, variables: &VariableTable) {
    let mut rest = segment;
    while let Some(idx) = rest.find('$') {
        let (before, at) = rest.split_at(idx);
        output.text.push_str(before);

        let scanned = may_start_variable(output.text.chars().next_back())
            .then(|| scan_variable(at))
            .flatten();
        let Some((name, accessors, len)) = scanned else {
            output.text.push('$');
            rest = &at[1..];
            continue;
        };

        let token = &at[..len];
        match interpolate(&name, &accessors, variables) {
            Some(text) => {
                output.text.push_str(&text);
                output.substitutions += 1;
            }
            None => {
                output.text.push_str(token);
                if !output.unresolved.contains(&name) {
                    output.unresolved.push(name);
                }
            }
        }
        rest = &at[len..];
    }
    output.text.push_str(rest);
}

/// Text for a variable reference. Accessors that do not apply to the
/// resolved value are appended as written. `None` when the name is unknown.
pub fn interpolate(name: &str, accessors: &[Accessor], variables: &VariableTable) -> Option<String> {
    let (value, applied) = variables.resolve_path(name, accessors)?;
    let mut text = display_value(&value);
    for accessor in &accessors[applied..] {
        text.push_str(&accessor.to_string());
    }
    Some(text)
}
