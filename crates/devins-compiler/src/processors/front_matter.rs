//! Front-matter processing
//!
//! Runs before the body: option keys override the compile options, every
//! other key registers a variable, and `when` can stop the compile. The
//! parsed header is kept on the result so lifecycle hooks and `functions`
//! stay available to the caller.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;

use devins_core::pattern::{self, PipelineFunc};
use devins_core::{
    CompilerOptions, FrontMatterValue, Node, NodeKind, PatternAction, VariableScope,
    VariableTable,
};

use super::NodeProcessor;
use crate::capability::FileSystem;
use crate::context::CompilerContext;
use crate::result::ProcessResult;
use crate::template::TemplateCompiler;

static CAPTURE_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+)").unwrap());

/// Keys that are neither options nor variables
const RESERVED_KEYS: [&str; 6] = [
    "when",
    "onStreaming",
    "beforeStreaming",
    "onStreamingEnd",
    "afterStreaming",
    "functions",
];

/// Applies the leading front-matter block
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontMatterProcessor;

#[async_trait]
impl NodeProcessor for FrontMatterProcessor {
    fn name(&self) -> &'static str {
        "front_matter"
    }

    fn can_process(&self, node: &Node) -> bool {
        matches!(node.kind, NodeKind::FrontMatter(_))
    }

    async fn process(&self, node: &Node, ctx: &mut CompilerContext) -> ProcessResult {
        let NodeKind::FrontMatter(front_matter) = &node.kind else {
            return ProcessResult::failure("front matter processor got another node");
        };
        ctx.result.front_matter = Some(front_matter.clone());

        let mut errors = Vec::new();
        for entry in &front_matter.entries {
            if let Some(outcome) = option_override(&entry.key, &entry.value, &mut ctx.options) {
                if let Err(message) = outcome {
                    errors.push(message);
                }
                let ceiling = ctx.recursion_ceiling();
                if ctx.options.max_recursion_depth > ceiling {
                    ctx.warn(format!(
                        "'{}' cannot raise the recursion limit above {ceiling}",
                        entry.key
                    ));
                    ctx.options.max_recursion_depth = ceiling;
                }
                continue;
            }
            match (entry.key.as_str(), &entry.value) {
                (key, _) if RESERVED_KEYS.contains(&key) => {}
                ("variables", FrontMatterValue::Object(entries)) => {
                    for variable in entries {
                        register(ctx, &variable.key, &variable.value, &mut errors).await;
                    }
                }
                ("variables", other) => errors.push(format!(
                    "'variables' must be an object, got {}",
                    other.type_name()
                )),
                (key, value) => register(ctx, key, value, &mut errors).await,
            }
        }
        if !errors.is_empty() {
            return ProcessResult::failure(format!("front matter: {}", errors.join("; ")));
        }

        let Some(when) = front_matter.get("when") else {
            return ProcessResult::ok();
        };
        let condition = match when {
            FrontMatterValue::Boolean(value) => Ok(*value),
            other => ctx
                .evaluator()
                .evaluate_condition(&other.to_string(), &ctx.variables),
        };
        match condition {
            Ok(true) => ProcessResult::ok(),
            Ok(false) => {
                tracing::info!(condition = %when, "front matter 'when' is false, skipping body");
                ProcessResult::stop()
            }
            Err(err) => ProcessResult::failure(format!("front matter 'when': {err}")),
        }
    }
}

/// Apply `key` to `options` when it names an option.
///
/// `None` means `key` is not an option; `Some(Err(_))` means it is one but
/// `value` has the wrong type.
pub fn option_override(
    key: &str,
    value: &FrontMatterValue,
    options: &mut CompilerOptions,
) -> Option<Result<(), String>> {
    let flag = |value: &FrontMatterValue| {
        value
            .as_bool()
            .ok_or_else(|| format!("'{key}' expects a boolean, got {}", value.type_name()))
    };
    Some(match key {
        "debug" => flag(value).map(|on| options.debug = on),
        "strict" => flag(value).map(|on| options.strict = on),
        "enableTemplateCompilation" | "enable_template_compilation" => {
            flag(value).map(|on| options.enable_template_compilation = on)
        }
        "keepRawOutput" | "keep_raw_output" => flag(value).map(|on| options.keep_raw_output = on),
        "maxRecursionDepth" | "max_recursion_depth" => match value.as_usize() {
            Some(0) => Err(format!("'{key}' must be at least 1")),
            Some(depth) => {
                options.max_recursion_depth = depth;
                Ok(())
            }
            None => Err(format!(
                "'{key}' expects a positive integer, got {}",
                value.type_name()
            )),
        },
        _ => return None,
    })
}

async fn register(
    ctx: &mut CompilerContext,
    name: &str,
    value: &FrontMatterValue,
    errors: &mut Vec<String>,
) {
    match value {
        FrontMatterValue::VariableRef(target) => match ctx.variables.get(target).cloned() {
            Some(resolved) => ctx.variables.set(name, resolved, VariableScope::UserDefined),
            None => ctx.warn(format!("front matter '{name}' refers to unknown variable '${target}'")),
        },
        FrontMatterValue::Expression(expression) => {
            match ctx.evaluator().evaluate(expression, &ctx.variables) {
                Ok(result) => ctx.variables.set(name, result, VariableScope::Computed),
                Err(err) => errors.push(format!("'{name}': {err}")),
            }
        }
        FrontMatterValue::PatternAction(action) => {
            let fs = ctx.capabilities().file_system.clone();
            let mut pipeline = Pipeline::new(fs.as_ref(), &ctx.variables);
            let outcome = pipeline.pattern_action(action).await;
            let warnings = pipeline.warnings;
            for warning in warnings {
                ctx.warn(format!("front matter '{name}': {warning}"));
            }
            match outcome {
                Ok(lines) => ctx.variables.set(name, lines.join("\n"), VariableScope::Computed),
                Err(message) => errors.push(format!("'{name}': {message}")),
            }
        }
        FrontMatterValue::CaseMatch(case) => {
            let fs = ctx.capabilities().file_system.clone();
            let mut pipeline = Pipeline::new(fs.as_ref(), &ctx.variables);
            let outcome = pipeline
                .run(&[PipelineFunc::Case(case.clone())], Vec::new())
                .await;
            let warnings = pipeline.warnings;
            for warning in warnings {
                ctx.warn(format!("front matter '{name}': {warning}"));
            }
            match outcome {
                Ok(lines) => ctx.variables.set(name, lines.join("\n"), VariableScope::Computed),
                Err(message) => errors.push(format!("'{name}': {message}")),
            }
        }
        other => ctx
            .variables
            .set(name, other.to_value(), VariableScope::UserDefined),
    }
}

// =============================================================================
// Pattern-action pipeline
// =============================================================================

/// Runs pipeline stages that need files or variables. `$1..$n` refer to the
/// capture groups of the first file the pattern matched.
struct Pipeline<'a> {
    fs: &'a dyn FileSystem,
    variables: &'a VariableTable,
    captures: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> Pipeline<'a> {
    fn new(fs: &'a dyn FileSystem, variables: &'a VariableTable) -> Self {
        Self {
            fs,
            variables,
            captures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    async fn pattern_action(&mut self, action: &PatternAction) -> Result<Vec<String>, String> {
        let lines = match &action.pattern {
            Some(pattern) => {
                let regex = pattern::compile(pattern).map_err(|e| e.to_string())?;
                let files = self.fs.list("", true).await.map_err(|e| e.to_string())?;
                let matched: Vec<String> = files
                    .into_iter()
                    .filter(|path| regex.is_match(path))
                    .collect();
                if let Some(captures) = matched.first().and_then(|path| regex.captures(path)) {
                    self.captures = captures
                        .iter()
                        .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                        .collect();
                }
                matched
            }
            None => Vec::new(),
        };
        self.run(&action.pipeline, lines).await
    }

    async fn run(
        &mut self,
        funcs: &[PipelineFunc],
        mut lines: Vec<String>,
    ) -> Result<Vec<String>, String> {
        let mut queue: VecDeque<PipelineFunc> = funcs.iter().cloned().collect();
        while let Some(func) = queue.pop_front() {
            lines = match func {
                PipelineFunc::Print(texts) => texts.iter().map(|text| self.expand(text)).collect(),
                PipelineFunc::Cat(paths) => {
                    let mut out = Vec::new();
                    for path in paths {
                        let path = self.expand(&path);
                        let handle = self
                            .fs
                            .resolve(&path)
                            .ok_or_else(|| format!("cat: file not found: {path}"))?;
                        let content = self
                            .fs
                            .read(&handle)
                            .await
                            .map_err(|e| format!("cat: {e}"))?;
                        out.extend(content.lines().map(str::to_string));
                    }
                    out
                }
                PipelineFunc::Case(case) => {
                    let subject = self.expand(&case.subject);
                    match case.select(&subject) {
                        Some(arm) => {
                            for func in arm.pipeline.iter().rev() {
                                queue.push_front(func.clone());
                            }
                        }
                        None => self
                            .warnings
                            .push(format!("case \"{subject}\" has no matching arm")),
                    }
                    lines
                }
                PipelineFunc::Call { name, .. } => {
                    self.warnings
                        .push(format!("unknown pipeline function '{name}' skipped"));
                    lines
                }
                pure => pattern::apply(&pure, lines).map_err(|e| e.to_string())?,
            };
        }
        Ok(lines)
    }

    fn expand(&self, text: &str) -> String {
        let text = CAPTURE_REF_RE.replace_all(text, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|idx| self.captures.get(idx))
                .cloned()
                .unwrap_or_default()
        });
        TemplateCompiler::compile(&text, self.variables)
    }
}
