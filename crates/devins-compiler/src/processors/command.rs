//! `/command` execution
//!
//! Built-in commands:
//!
//! | Command | Argument | Effect |
//! |---------|----------|--------|
//! | `/file` | `path[#L3-L8]` | file contents (optionally a line range) in a fenced block |
//! | `/write` | `path` | writes the following code block |
//! | `/patch` | `path` | applies the following unified diff code block |
//! | `/dir` | `[path]` | lists a directory |
//! | `/run` | `path` | compiles a `.devin` file in place, runs anything else |
//! | `/shell` | `[command]` | runs the argument, or the following code block |
//! | `/browse`, `/crawl` | `url` | fetches a page |
//! | `/capture` | `path#kind[:lang]` | extracts nodes of one kind from an instruction file |
//! | `/thread` | `path` | compiles an instruction file in the background |
//!
//! Any other name is looked up as `<commands_dir>/<name>.devin` and compiled
//! with `$input` bound to the argument. Capability failures are inlined as
//! `<DevInsError> message`.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use devins_core::patch::apply_patch;
use devins_core::{Node, NodeKind, UsedKind};

use super::NodeProcessor;
use super::agent::nested_failure;
use crate::capability::{FileSystem, ShellRequest, SpawnRequest};
use crate::context::CompilerContext;
use crate::error::{CapabilityError, Error, Result, sentinel};
use crate::result::ProcessResult;

/// Commands understood without a command file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCommand {
    /// `/file:path#L1-L5`
    File,
    /// `/write:path`
    Write,
    /// `/patch:path`
    Patch,
    /// `/dir:path`
    Dir,
    /// `/run:path`
    Run,
    /// `/shell:command`
    Shell,
    /// `/browse:url` or `/crawl:url`
    Browse,
    /// `/capture:path#kind`
    Capture,
    /// `/thread:path`
    Thread,
}

impl BuiltinCommand {
    /// Every built-in command
    pub const ALL: [BuiltinCommand; 9] = [
        BuiltinCommand::File,
        BuiltinCommand::Write,
        BuiltinCommand::Patch,
        BuiltinCommand::Dir,
        BuiltinCommand::Run,
        BuiltinCommand::Shell,
        BuiltinCommand::Browse,
        BuiltinCommand::Capture,
        BuiltinCommand::Thread,
    ];

    /// Look up a command by the name written after `/`
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "file" => BuiltinCommand::File,
            "write" => BuiltinCommand::Write,
            "patch" => BuiltinCommand::Patch,
            "dir" => BuiltinCommand::Dir,
            "run" => BuiltinCommand::Run,
            "shell" => BuiltinCommand::Shell,
            "browse" | "crawl" => BuiltinCommand::Browse,
            "capture" => BuiltinCommand::Capture,
            "thread" => BuiltinCommand::Thread,
            _ => return None,
        })
    }

    /// Canonical name
    pub fn name(self) -> &'static str {
        match self {
            BuiltinCommand::File => "file",
            BuiltinCommand::Write => "write",
            BuiltinCommand::Patch => "patch",
            BuiltinCommand::Dir => "dir",
            BuiltinCommand::Run => "run",
            BuiltinCommand::Shell => "shell",
            BuiltinCommand::Browse => "browse",
            BuiltinCommand::Capture => "capture",
            BuiltinCommand::Thread => "thread",
        }
    }
}

/// Runs built-in and custom commands
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandProcessor;

#[async_trait]
impl NodeProcessor for CommandProcessor {
    fn name(&self) -> &'static str {
        "command"
    }

    fn can_process(&self, node: &Node) -> bool {
        matches!(&node.kind, NodeKind::Used(used) if used.kind == UsedKind::Command)
    }

    async fn process(&self, node: &Node, ctx: &mut CompilerContext) -> ProcessResult {
        let NodeKind::Used(used) = &node.kind else {
            return ProcessResult::failure("command processor got a non-command node");
        };
        let argument = used.argument.as_deref().map(|arg| ctx.substitute(arg));

        let Some(command) = BuiltinCommand::from_name(&used.name) else {
            return run_custom(node, &used.name, argument, ctx).await;
        };

        ctx.result.statistics.command_count += 1;
        tracing::debug!(command = command.name(), argument = ?argument, "running command");

        match execute(command, argument.as_deref(), ctx).await {
            Ok(Some(Emitted::Text(text))) => {
                ctx.emit(&text);
                ProcessResult::ok()
            }
            Ok(Some(Emitted::Compiled(text))) => {
                ctx.emit_verbatim(&text);
                ProcessResult::ok()
            }
            Ok(None) => {
                ctx.emit(node.source_text());
                ctx.warn(format!(
                    "/{} expects a code block after it, left as written",
                    command.name()
                ));
                ProcessResult::ok()
            }
            Err(err) => command_error(ctx, command.name(), err),
        }
    }
}

/// What a command adds to the output
enum Emitted {
    /// Text the template pass may still substitute in
    Text(String),
    /// Output of a nested compile, already substituted
    Compiled(String),
}

/// `Ok(None)`: the command needs a following code block and there is none
async fn execute(
    command: BuiltinCommand,
    argument: Option<&str>,
    ctx: &mut CompilerContext,
) -> Result<Option<Emitted>> {
    let fs = ctx.capabilities().file_system.clone();
    match command {
        BuiltinCommand::File => read_file(fs.as_ref(), required(command, argument)?)
            .await
            .map(Emitted::Text)
            .map(Some),
        BuiltinCommand::Write => {
            let path = required(command, argument)?;
            let Some(block) = ctx.take_next_code_block() else {
                return Ok(None);
            };
            let handle = resolve(fs.as_ref(), path)?;
            fs.write(&handle, &block.body).await?;
            Ok(Some(Emitted::Text(format!("Wrote {}", handle.path))))
        }
        BuiltinCommand::Patch => {
            let path = required(command, argument)?;
            let Some(block) = ctx.take_next_code_block() else {
                return Ok(None);
            };
            let handle = resolve(fs.as_ref(), path)?;
            let original = fs.read(&handle).await?;
            let patched = apply_patch(&original, &block.body)?;
            fs.write(&handle, &patched).await?;
            Ok(Some(Emitted::Text(format!("Patched {}", handle.path))))
        }
        BuiltinCommand::Dir => list_dir(fs.as_ref(), argument.unwrap_or_default())
            .await
            .map(Emitted::Text)
            .map(Some),
        BuiltinCommand::Run => {
            let path = required(command, argument)?;
            if path.ends_with(".devin") {
                let source = read_text(fs.as_ref(), path).await?;
                ctx.compile_nested(path, &source, Vec::new())
                    .await
                    .map(Emitted::Compiled)
                    .map(Some)
            } else {
                run_shell(ctx, path.to_string())
                    .await
                    .map(Emitted::Text)
                    .map(Some)
            }
        }
        BuiltinCommand::Shell => {
            let command_line = match argument {
                Some(arg) => arg.to_string(),
                None => match ctx.take_next_code_block() {
                    Some(block) => block.body,
                    None => return Ok(None),
                },
            };
            run_shell(ctx, command_line)
                .await
                .map(Emitted::Text)
                .map(Some)
        }
        BuiltinCommand::Browse => {
            let url = required(command, argument)?;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::InvalidArgument {
                    command: command.name().to_string(),
                    message: format!("'{url}' is not an http(s) URL"),
                });
            }
            let crawler =
                ctx.capabilities()
                    .crawler
                    .clone()
                    .ok_or_else(|| CapabilityError::Unavailable {
                        capability: "web crawler".to_string(),
                    })?;
            let cancel = ctx.cancellation().clone();
            Ok(Some(Emitted::Text(crawler.fetch(url, &cancel).await?)))
        }
        BuiltinCommand::Capture => capture(fs.as_ref(), required(command, argument)?)
            .await
            .map(Emitted::Text)
            .map(Some),
        BuiltinCommand::Thread => spawn_thread(ctx, required(command, argument)?)
            .await
            .map(Emitted::Text)
            .map(Some),
    }
}

async fn run_custom(
    node: &Node,
    name: &str,
    argument: Option<String>,
    ctx: &mut CompilerContext,
) -> ProcessResult {
    let fs = ctx.capabilities().file_system.clone();
    let path = format!(
        "{}/{name}.devin",
        ctx.capabilities().commands_dir.trim_end_matches('/')
    );
    if !fs.exists(&path).await {
        ctx.emit(node.source_text());
        ctx.warn(format!("unknown command '/{name}', left as written"));
        return ProcessResult::ok();
    }

    ctx.result.statistics.command_count += 1;
    tracing::debug!(command = name, path = %path, "running custom command");
    let source = match read_text(fs.as_ref(), &path).await {
        Ok(source) => source,
        Err(err) => return command_error(ctx, name, err),
    };
    let input = Value::String(argument.unwrap_or_default());
    match ctx
        .compile_nested(&path, &source, vec![("input".to_string(), input)])
        .await
    {
        Ok(output) => {
            ctx.emit_verbatim(&output);
            ProcessResult::ok()
        }
        Err(err) => command_error(ctx, name, err),
    }
}

fn command_error(ctx: &mut CompilerContext, name: &str, err: Error) -> ProcessResult {
    match err {
        Error::Capability(CapabilityError::Cancelled) => nested_failure(ctx, Error::Cancelled),
        Error::Capability(err) => {
            ctx.emit(&err.to_sentinel());
            ctx.warn(format!("/{name}: {err}"));
            ProcessResult::ok()
        }
        err @ (Error::Core(_) | Error::InvalidArgument { .. }) => {
            ctx.emit(&sentinel(&err));
            ctx.warn(format!("/{name}: {err}"));
            ProcessResult::ok()
        }
        other => nested_failure(ctx, other),
    }
}

fn required(command: BuiltinCommand, argument: Option<&str>) -> Result<&str> {
    argument
        .filter(|arg| !arg.is_empty())
        .ok_or_else(|| Error::InvalidArgument {
            command: command.name().to_string(),
            message: "missing argument".to_string(),
        })
}

fn resolve(fs: &dyn FileSystem, path: &str) -> Result<crate::capability::FileHandle> {
    fs.resolve(path).ok_or_else(|| {
        CapabilityError::FileNotFound {
            path: path.to_string(),
        }
        .into()
    })
}

async fn read_text(fs: &dyn FileSystem, path: &str) -> Result<String> {
    let handle = resolve(fs, path)?;
    Ok(fs.read(&handle).await?)
}

async fn read_file(fs: &dyn FileSystem, argument: &str) -> Result<String> {
    let (path, range) = split_line_range(argument);
    let content = read_text(fs, path).await?;
    let content = match range {
        Some((start, end)) => select_lines(&content, start, end),
        None => content.trim_end_matches('\n').to_string(),
    };
    Ok(format!("```{}\n{content}\n```", language_for(path)))
}

async fn list_dir(fs: &dyn FileSystem, dir: &str) -> Result<String> {
    let entries = fs.list(dir, false).await?;
    if entries.is_empty() && !dir.is_empty() && !fs.exists(dir).await {
        return Err(CapabilityError::FileNotFound {
            path: dir.to_string(),
        }
        .into());
    }
    Ok(entries.join("\n"))
}

async fn run_shell(ctx: &mut CompilerContext, command_line: String) -> Result<String> {
    let shell = ctx
        .capabilities()
        .shell
        .clone()
        .ok_or_else(|| CapabilityError::Unavailable {
            capability: "shell executor".to_string(),
        })?;
    let request = ShellRequest::new(command_line.trim(), ctx.capabilities().shell_timeout);
    let cancel = ctx.cancellation().clone();
    let output = shell.execute(request, &cancel).await?;
    if !output.success() {
        let status = output
            .exit_code
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        return Err(CapabilityError::CommandFailed {
            message: format!("exit status {status}: {}", output.text()),
        }
        .into());
    }
    Ok(output.text())
}

async fn capture(fs: &dyn FileSystem, argument: &str) -> Result<String> {
    let invalid = |message: &str| Error::InvalidArgument {
        command: "capture".to_string(),
        message: message.to_string(),
    };
    let (path, selector) = argument
        .rsplit_once('#')
        .ok_or_else(|| invalid("expected 'path#kind'"))?;
    let (kind, language) = match selector.split_once(':') {
        Some((kind, language)) => (kind, Some(language)),
        None => (selector, None),
    };

    let source = read_text(fs, path).await?;
    let document = devins_core::parse(&source).map_err(devins_core::Error::from)?;
    let mut pieces: Vec<String> = Vec::new();
    let mut unknown_kind = false;
    document.walk(&mut |node| match (kind, &node.kind) {
        ("code", NodeKind::CodeBlock(block))
            if language.is_none() || block.language.as_deref() == language =>
        {
            pieces.push(block.body.trim_end_matches('\n').to_string());
        }
        ("text", NodeKind::Text) => pieces.push(node.source_text().to_string()),
        ("command" | "variable" | "agent", NodeKind::Used(used)) if used.kind.name() == kind => {
            pieces.push(node.source_text().to_string());
        }
        ("code" | "text" | "command" | "variable" | "agent", _) => {}
        _ => unknown_kind = true,
    });
    if unknown_kind {
        return Err(invalid(&format!("unknown node kind '{kind}'")));
    }
    Ok(pieces.join("\n"))
}

async fn spawn_thread(ctx: &mut CompilerContext, path: &str) -> Result<String> {
    let depth = ctx.depth() + 1;
    if depth > ctx.options.max_recursion_depth {
        return Err(Error::RecursionLimit {
            max: ctx.options.max_recursion_depth,
        });
    }
    let spawner = ctx
        .capabilities()
        .spawner
        .clone()
        .ok_or_else(|| CapabilityError::Unavailable {
            capability: "task spawner".to_string(),
        })?;
    let fs = ctx.capabilities().file_system.clone();
    let source = read_text(fs.as_ref(), path).await?;
    let request = SpawnRequest {
        name: path.to_string(),
        source,
        compiler: ctx.compiler().clone(),
        options: ctx.options,
        variables: ctx.variables.clone(),
        depth,
        cancel: ctx.cancellation().clone(),
    };
    let id = spawner.spawn(request).await?;
    Ok(format!("Started thread {id} for {path}"))
}

/// `src/a.rs#L3-L8` -> (`src/a.rs`, Some((3, 8))); `#L3` selects one line.
/// A fragment that is not a line range stays part of the path.
fn split_line_range(argument: &str) -> (&str, Option<(usize, usize)>) {
    let Some((path, fragment)) = argument.rsplit_once('#') else {
        return (argument, None);
    };
    let parse = |s: &str| s.strip_prefix('L').and_then(|n| n.parse::<usize>().ok());
    let range = match fragment.split_once('-') {
        Some((start, end)) => parse(start).zip(parse(end)),
        None => parse(fragment).map(|line| (line, line)),
    };
    match range {
        Some(range) => (path, Some(range)),
        None => (argument, None),
    }
}

fn select_lines(content: &str, start: usize, end: usize) -> String {
    let start = start.max(1);
    if end < start {
        return String::new();
    }
    content
        .lines()
        .skip(start - 1)
        .take(end - start + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

fn language_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    match extension {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "kt" | "kts" => "kotlin",
        "java" => "java",
        "go" => "go",
        "md" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "sh" | "bash" => "bash",
        "devin" => "devin",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("src/a.rs#L3-L8", "src/a.rs", Some((3, 8)))]
    #[case("src/a.rs#L4", "src/a.rs", Some((4, 4)))]
    #[case("notes#draft.md", "notes#draft.md", None)]
    #[case("plain.txt", "plain.txt", None)]
    fn test_split_line_range(
        #[case] input: &str,
        #[case] path: &str,
        #[case] range: Option<(usize, usize)>,
    ) {
        assert_eq!(split_line_range(input), (path, range));
    }

    #[test]
    fn test_select_lines() {
        let content = "1\n2\n3\n4\n5";
        assert_eq!(select_lines(content, 2, 4), "2\n3\n4");
        assert_eq!(select_lines(content, 4, 99), "4\n5");
        assert_eq!(select_lines(content, 3, 2), "");
    }

    #[test]
    fn test_builtin_names() {
        for command in BuiltinCommand::ALL {
            assert_eq!(BuiltinCommand::from_name(command.name()), Some(command));
        }
        assert_eq!(BuiltinCommand::from_name("crawl"), Some(BuiltinCommand::Browse));
        assert_eq!(BuiltinCommand::from_name("review"), None);
    }

    #[test]
    fn test_language_for() {
        assert_eq!(language_for("src/main.rs"), "rust");
        assert_eq!(language_for("Makefile"), "");
    }
}
