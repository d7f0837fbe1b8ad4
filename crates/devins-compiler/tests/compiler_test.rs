//! Integration tests for compiling whole instruction documents
//!
//! Covers:
//! - Variable interpolation, statistics and the template pass
//! - Built-in and custom commands against an in-memory file system
//! - Agents, background threads and cancellation
//! - Front matter options, variables and `when`
//! - Strict mode, recursion limits and error containment

use async_trait::async_trait;
use devins_compiler::{
    Agent, AgentRegistry, AgentReply, CancellationToken, Capabilities, CapabilityError,
    CapabilityResult, CompilerOptions, CompilerState, DEVINS_ERROR, DevIns, MemoryFileSystem,
    ShellExecutor, ShellOutput, ShellRequest, SpawnRequest, TaskSpawner, TemplateCompiler,
    VariableTable, builder,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex};

// =============================================================================
// Fakes
// =============================================================================

struct EchoShell;

#[async_trait]
impl ShellExecutor for EchoShell {
    async fn execute(
        &self,
        request: ShellRequest,
        _cancel: &CancellationToken,
    ) -> CapabilityResult<ShellOutput> {
        if request.command.starts_with("fail") {
            return Ok(ShellOutput {
                exit_code: Some(2),
                stdout: String::new(),
                stderr: "boom".to_string(),
            });
        }
        Ok(ShellOutput {
            exit_code: Some(0),
            stdout: format!("ran: {}\n", request.command.trim()),
            stderr: String::new(),
        })
    }
}

/// Cancels the compile from inside a command, like a user pressing stop
struct CancellingShell;

#[async_trait]
impl ShellExecutor for CancellingShell {
    async fn execute(
        &self,
        _request: ShellRequest,
        cancel: &CancellationToken,
    ) -> CapabilityResult<ShellOutput> {
        cancel.cancel();
        Err(CapabilityError::Cancelled)
    }
}

struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    async fn invoke(&self, input: &str, _cancel: &CancellationToken) -> CapabilityResult<AgentReply> {
        Ok(AgentReply::Text(format!("[echo:{input}]")))
    }
}

struct TemplateAgent;

#[async_trait]
impl Agent for TemplateAgent {
    fn name(&self) -> &str {
        "greeter"
    }

    async fn invoke(&self, input: &str, _cancel: &CancellationToken) -> CapabilityResult<AgentReply> {
        Ok(AgentReply::Instruction {
            name: "greeter".to_string(),
            source: "Hello, $input".to_string(),
            variables: vec![("input".to_string(), json!(input))],
        })
    }
}

#[derive(Default)]
struct RecordingSpawner {
    requests: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl TaskSpawner for RecordingSpawner {
    async fn spawn(&self, request: SpawnRequest) -> CapabilityResult<String> {
        let mut requests = self.requests.lock().unwrap();
        requests.push((request.name.clone(), request.depth));
        Ok(format!("t-{}", requests.len()))
    }
}

fn memory(files: &[(&str, &str)]) -> Arc<MemoryFileSystem> {
    Arc::new(MemoryFileSystem::with_files(files.iter().copied()))
}

fn devins_with(fs: Arc<MemoryFileSystem>) -> DevIns {
    DevIns::with_capabilities(
        Capabilities::default()
            .with_file_system(fs)
            .with_shell(Arc::new(EchoShell)),
    )
}

fn strict() -> CompilerOptions {
    CompilerOptions {
        strict: true,
        ..CompilerOptions::default()
    }
}

// =============================================================================
// Variables and the template pass
// =============================================================================

#[tokio::test]
async fn test_hello_world() {
    let result = DevIns::new()
        .compile_with_variables("Hello, $name!", [("name", "World")])
        .await;
    assert_eq!(result.output, "Hello, World!");
    assert_eq!(result.statistics.variable_count, 1);
    assert!(result.is_success());
    assert_eq!(result.state, CompilerState::Done);
}

#[tokio::test]
async fn test_empty_source() {
    let result = DevIns::new().compile("").await;
    assert!(result.is_success());
    assert_eq!(result.output, "");
    assert_eq!(result.statistics.variable_count, 0);
    assert_eq!(result.statistics.command_count, 0);
    assert_eq!(result.statistics.agent_count, 0);
}

#[tokio::test]
async fn test_unicode_values_are_inserted_verbatim() {
    let value = "héllo ✓ \"<&>\" \\n 日本";
    let result = DevIns::new()
        .compile_with_variables("[$v]", [("v", value)])
        .await;
    assert_eq!(result.output, format!("[{value}]"));
}

#[tokio::test]
async fn test_accessors() {
    let result = DevIns::new()
        .compile_with_variables(
            "$user.name likes $user.tags[1]",
            [("user", json!({"name": "Ada", "tags": ["tea", "math"]}))],
        )
        .await;
    assert_eq!(result.output, "Ada likes math");
}

#[tokio::test]
async fn test_unresolved_variable_stays_and_warns() {
    let result = DevIns::new().compile("a $missing b").await;
    assert!(result.is_success());
    assert_eq!(result.output, "a $missing b");
    assert!(result.warnings.iter().any(|w| w.contains("missing")));
}

#[tokio::test]
async fn test_unresolved_variable_warns_once_and_is_not_counted() {
    let result = DevIns::new().compile("a $missing b").await;
    assert_eq!(result.statistics.variable_count, 0);
    assert_eq!(result.warnings.len(), 1);
}

#[tokio::test]
async fn test_substituted_values_are_not_expanded_again() {
    let result = DevIns::new()
        .compile_with_variables("cmd: $cmd", [("cmd", "echo $os")])
        .await;
    assert_eq!(result.output, "cmd: echo $os");
    assert_eq!(result.statistics.variable_count, 1);
}

#[tokio::test]
async fn test_nested_output_is_not_expanded_again() {
    let fs = memory(&[(".devins/commands/show.devin", "[$input]")]);
    let result = devins_with(fs).compile("/show:$os").await;
    let expected = format!("[{}]", std::env::consts::OS);
    assert_eq!(result.output, expected);

    let fs = memory(&[(".devins/commands/quote.devin", "said $input")]);
    let result = devins_with(fs)
        .compile_with_variables("/quote:$text", [("text", "cost is $os")])
        .await;
    assert_eq!(result.output, "said cost is $os");
}

#[tokio::test]
async fn test_unresolved_variable_fails_in_strict_mode() {
    let result = DevIns::new()
        .compile_with("a $missing b", strict(), VariableTable::new())
        .await;
    assert!(result.has_error);
    assert_eq!(result.state, CompilerState::Failed);
    assert!(result.error_message.unwrap().contains("missing"));
    assert!(!result.output.contains(" b"));
}

#[tokio::test]
async fn test_template_pass_reaches_code_blocks() {
    let source = "```\necho $name\n```\n";
    let devins = DevIns::new();
    let vars: VariableTable = [("name", "World")].into_iter().collect();

    let compiled = devins
        .compile_with(source, CompilerOptions::default(), vars.clone())
        .await;
    assert_eq!(compiled.output, "```\necho World\n```\n");
    assert_eq!(compiled.statistics.variable_count, 1);

    let raw_options = CompilerOptions {
        enable_template_compilation: false,
        ..CompilerOptions::default()
    };
    let raw = devins.compile_with(source, raw_options, vars).await;
    assert_eq!(raw.output, source);
}

#[tokio::test]
async fn test_compile_raw_keeps_unconsumed_tokens() {
    let result = DevIns::new().compile_raw("```\n$later\n```").await;
    assert!(result.output.contains("$later"));
}

#[tokio::test]
async fn test_keep_raw_output() {
    let options = CompilerOptions {
        keep_raw_output: true,
        ..CompilerOptions::default()
    };
    let vars: VariableTable = [("x", "1")].into_iter().collect();
    let result = DevIns::new()
        .compile_with("```\n$x\n```", options, vars)
        .await;
    assert_eq!(result.raw_output.as_deref(), Some("```\n$x\n```"));
    assert_eq!(result.output, "```\n1\n```");
}

#[tokio::test]
async fn test_caller_variables_shadow_system_variables() {
    let result = DevIns::new()
        .compile_with_variables("$os", [("os", "plan9")])
        .await;
    assert_eq!(result.output, "plan9");
}

// =============================================================================
// Commands
// =============================================================================

#[tokio::test]
async fn test_missing_file_inlines_sentinel() {
    let result = DevIns::new().compile("See /file:missing.txt now").await;
    assert!(result.is_success());
    assert!(result.output.contains(DEVINS_ERROR));
    assert!(result.output.contains("missing.txt"));
    assert_eq!(result.statistics.command_count, 1);
}

#[tokio::test]
async fn test_file_with_line_range() {
    let fs = memory(&[("src/a.rs", "1\n2\n3\n4\n")]);
    let result = devins_with(fs).compile("/file:src/a.rs#L2-L3").await;
    assert_eq!(result.output, "```rust\n2\n3\n```");
}

#[tokio::test]
async fn test_write_consumes_code_block() {
    let fs = memory(&[]);
    let result = devins_with(fs.clone())
        .compile("/write:notes/out.txt\n```\nhello\n```\n")
        .await;
    assert!(result.is_success());
    assert!(result.output.contains("Wrote notes/out.txt"));
    assert!(!result.output.contains("```"));
    assert_eq!(fs.get("notes/out.txt").await.as_deref(), Some("hello\n"));
}

#[tokio::test]
async fn test_write_without_code_block_is_left_as_written() {
    let result = devins_with(memory(&[])).compile("/write:out.txt").await;
    assert_eq!(result.output, "/write:out.txt");
    assert_eq!(result.warnings.len(), 1);
}

#[tokio::test]
async fn test_patch_applies_diff() {
    let fs = memory(&[("f.txt", "a\nb\nc\n")]);
    let source = "/patch:f.txt\n```diff\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n```\n";
    let result = devins_with(fs.clone()).compile(source).await;
    assert!(result.output.contains("Patched f.txt"), "{}", result.output);
    assert_eq!(fs.get("f.txt").await.as_deref(), Some("a\nB\nc\n"));
}

#[tokio::test]
async fn test_dir_lists_entries() {
    let fs = memory(&[("src/a.rs", ""), ("src/sub/b.rs", "")]);
    let result = devins_with(fs).compile("/dir:src").await;
    assert_eq!(result.output, "src/a.rs\nsrc/sub/");
}

#[tokio::test]
async fn test_shell_argument_and_block() {
    let devins = devins_with(memory(&[]));
    let result = devins.compile("/shell:ls").await;
    assert_eq!(result.output, "ran: ls");

    let result = devins.compile("/shell\n```bash\nmake test\n```\n").await;
    assert!(result.output.contains("ran: make test"));
}

#[tokio::test]
async fn test_failing_shell_command_inlines_sentinel() {
    let result = devins_with(memory(&[])).compile("/shell:fail").await;
    assert!(result.is_success());
    assert!(result.output.starts_with(DEVINS_ERROR));
    assert!(result.output.contains("boom"));
}

#[tokio::test]
async fn test_shell_without_executor_is_sentinel() {
    let result = DevIns::new().compile("/shell:ls").await;
    assert!(result.output.contains(DEVINS_ERROR));
    assert_eq!(result.statistics.command_count, 1);
}

#[tokio::test]
async fn test_capture_code_blocks() {
    let fs = memory(&[(
        "doc.devin",
        "intro\n```rust\nfn a() {}\n```\n```py\nprint(1)\n```\n",
    )]);
    let devins = devins_with(fs);
    let result = devins.compile("/capture:doc.devin#code:rust").await;
    assert_eq!(result.output, "fn a() {}");

    let result = devins.compile("/capture:doc.devin#bogus").await;
    assert!(result.output.contains(DEVINS_ERROR));
}

#[tokio::test]
async fn test_run_devin_file_compiles_in_place() {
    let fs = memory(&[("part.devin", "part for $who")]);
    let result = devins_with(fs)
        .compile_with_variables("/run:part.devin done", [("who", "Ada")])
        .await;
    assert_eq!(result.output, "part for Ada done");
    assert_eq!(result.statistics.command_count, 1);
    assert_eq!(result.statistics.variable_count, 1);
}

#[tokio::test]
async fn test_custom_command_binds_input() {
    let fs = memory(&[(".devins/commands/greet.devin", "Hi $input!")]);
    let result = devins_with(fs).compile("/greet:Bob").await;
    assert_eq!(result.output, "Hi Bob!");
    assert_eq!(result.statistics.command_count, 1);
}

#[tokio::test]
async fn test_unknown_command_is_left_as_written() {
    let result = DevIns::new().compile("try /nope:x here").await;
    assert!(result.is_success());
    assert_eq!(result.output, "try /nope:x here");
    assert_eq!(result.statistics.command_count, 0);
    assert_eq!(result.warnings.len(), 1);
}

#[tokio::test]
async fn test_recursion_limit_fails_closed() {
    let fs = memory(&[(".devins/commands/loop.devin", "again /loop")]);
    let options = CompilerOptions {
        max_recursion_depth: 3,
        ..CompilerOptions::default()
    };
    let result = devins_with(fs)
        .compile_with("/loop", options, VariableTable::new())
        .await;
    assert!(result.has_error);
    assert!(
        result
            .error_message
            .unwrap()
            .contains("maximum recursion depth 3 exceeded")
    );
}

#[tokio::test]
async fn test_nested_front_matter_cannot_raise_recursion_limit() {
    let fs = memory(&[(
        ".devins/commands/loop.devin",
        "---\nmaxRecursionDepth: 40\n---\nx /loop",
    )]);
    let options = CompilerOptions {
        max_recursion_depth: 3,
        ..CompilerOptions::default()
    };
    let result = devins_with(fs)
        .compile_with("/loop", options, VariableTable::new())
        .await;
    assert!(result.has_error);
    assert!(
        result
            .error_message
            .unwrap()
            .contains("maximum recursion depth 3 exceeded")
    );
    assert!(result.statistics.command_count <= 4);
    assert!(result.warnings.iter().any(|w| w.contains("cannot raise")));
}

#[tokio::test]
async fn test_front_matter_can_lower_recursion_limit() {
    let fs = memory(&[(".devins/commands/loop.devin", "again /loop")]);
    let result = devins_with(fs)
        .compile("---\nmaxRecursionDepth: 2\n---\n/loop")
        .await;
    assert!(result.has_error);
    assert!(
        result
            .error_message
            .unwrap()
            .contains("maximum recursion depth 2 exceeded")
    );
}

#[tokio::test]
async fn test_thread_spawns_background_compile() {
    let spawner = Arc::new(RecordingSpawner::default());
    let fs = memory(&[("job.devin", "background work")]);
    let devins = DevIns::with_capabilities(
        Capabilities::default()
            .with_file_system(fs)
            .with_spawner(spawner.clone()),
    );
    let result = devins.compile("/thread:job.devin").await;
    assert_eq!(result.output, "Started thread t-1 for job.devin");
    assert_eq!(
        *spawner.requests.lock().unwrap(),
        vec![("job.devin".to_string(), 1)]
    );
}

// =============================================================================
// Agents
// =============================================================================

#[tokio::test]
async fn test_agent_receives_rest_of_line() {
    let mut agents = AgentRegistry::new();
    agents.register(EchoAgent).register(TemplateAgent);
    let devins = DevIns::with_capabilities(Capabilities::default().with_agents(agents));

    let result = devins.compile("@echo check this\nnext").await;
    assert_eq!(result.output, "[echo:check this] check this\nnext");
    assert_eq!(result.statistics.agent_count, 1);
    assert_eq!(result.agents, vec!["echo"]);

    let result = devins.compile("@greeter Ada").await;
    assert!(result.output.starts_with("Hello, Ada"));
}

#[tokio::test]
async fn test_unknown_agent_is_sentinel() {
    let devins =
        DevIns::with_capabilities(Capabilities::default().with_agents(AgentRegistry::new()));
    let result = devins.compile("@ghost boo").await;
    assert!(result.output.contains(DEVINS_ERROR));
    assert_eq!(result.statistics.agent_count, 1);
}

#[tokio::test]
async fn test_agent_without_registry_is_left_as_written() {
    let result = DevIns::new().compile("ask @ghost").await;
    assert_eq!(result.output, "ask @ghost");
    assert_eq!(result.statistics.agent_count, 0);
}

// =============================================================================
// Front matter and expressions
// =============================================================================

#[tokio::test]
async fn test_front_matter_registers_variables() {
    let fs = memory(&[("src/b.rs", ""), ("src/a.rs", ""), ("README.md", "")]);
    let source = r#"---
name: "demo"
variables:
  "sources": /.*\.rs$/ { sort }
  "total": { 2 + 3 }
---
$name $total
$sources"#;
    let result = devins_with(fs).compile(source).await;
    assert!(result.is_success(), "{:?}", result.error_message);
    assert_eq!(result.output, "demo 5\nsrc/a.rs\nsrc/b.rs");
    assert!(result.front_matter.is_some());
}

#[tokio::test]
async fn test_front_matter_overrides_caller_variables() {
    let result = DevIns::new()
        .compile_with_variables("---\nwho: \"front\"\n---\n$who", [("who", "caller")])
        .await;
    assert_eq!(result.output, "front");
}

#[tokio::test]
async fn test_front_matter_when_false_stops() {
    let source = "---\nwhen: { $lang == \"rust\" }\n---\nRust only";
    let devins = DevIns::new();

    let skipped = devins.compile_with_variables(source, [("lang", "go")]).await;
    assert!(skipped.is_success());
    assert_eq!(skipped.output, "");

    let kept = devins.compile_with_variables(source, [("lang", "rust")]).await;
    assert_eq!(kept.output, "Rust only");
}

#[tokio::test]
async fn test_front_matter_strict_option() {
    let result = DevIns::new().compile("---\nstrict: true\n---\n$missing").await;
    assert!(result.has_error);
}

#[tokio::test]
async fn test_conditional_branches() {
    let source = "#if($n > 1)many #elseif($n == 1)one #else none #end";
    let devins = DevIns::new();
    for (n, expected) in [(3, "many "), (1, "one "), (0, " none ")] {
        let result = devins.compile_with_variables(source, [("n", n)]).await;
        assert_eq!(result.output, expected, "n = {n}");
    }
}

#[tokio::test]
async fn test_set_registers_computed_variable() {
    let result = DevIns::new().compile("#set($y = 2 + 3) y=$y").await;
    assert_eq!(result.output, " y=5");
}

#[tokio::test]
async fn test_branch_depth_counts_toward_limit() {
    let options = CompilerOptions {
        max_recursion_depth: 1,
        ..CompilerOptions::default()
    };
    let result = DevIns::new()
        .compile_with(
            "#if(true) #if(true) deep #end #end",
            options,
            VariableTable::new(),
        )
        .await;
    assert!(result.has_error);
}

// =============================================================================
// Cancellation, builder, to_string
// =============================================================================

#[tokio::test]
async fn test_cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = DevIns::new()
        .compile_cancellable("text", CompilerOptions::default(), VariableTable::new(), cancel)
        .await;
    assert!(result.cancelled);
    assert!(result.has_error);
    assert_eq!(result.output, "");
}

#[tokio::test]
async fn test_cancelled_during_command() {
    let devins = DevIns::with_capabilities(
        Capabilities::default().with_shell(Arc::new(CancellingShell)),
    );
    let result = devins.compile("before /shell:sleep after").await;
    assert!(result.cancelled);
    assert!(result.has_error);
    assert_eq!(result.output, "before ");
}

#[tokio::test]
async fn test_builder_matches_direct_compile() {
    let source = "x is $x, y is $y";
    let built = builder()
        .debug(true)
        .variable("x", "1")
        .compile(source)
        .await;

    let options = CompilerOptions {
        debug: true,
        ..CompilerOptions::default()
    };
    let vars: VariableTable = [("x", "1")].into_iter().collect();
    let direct = DevIns::new().compile_with(source, options, vars).await;
    assert_eq!(built, direct);
}

#[tokio::test]
async fn test_compile_to_string() {
    assert_eq!(
        DevIns::new().compile_to_string("plain").await.unwrap(),
        "plain"
    );
    let err = DevIns::new()
        .with_options(strict())
        .compile_to_string("a $missing")
        .await
        .unwrap_err();
    assert!(err.message.contains("missing"));
    assert_eq!(err.partial_output, "a $missing");
}

#[tokio::test]
async fn test_parse_error_is_failed_result() {
    let source = "---\nwhen: { $a\n---\nbody";
    let result = DevIns::new().compile(source).await;
    assert!(result.has_error);
    assert_eq!(result.input, source);
    assert_eq!(result.state, CompilerState::Failed);
}

#[tokio::test]
async fn test_concurrent_compiles_are_independent() {
    let devins = DevIns::new();
    let (a, b) = tokio::join!(
        devins.compile_with_variables("$v", [("v", "a")]),
        devins.compile_with_variables("$v", [("v", "b")]),
    );
    assert_eq!(a.output, "a");
    assert_eq!(b.output, "b");
}

// =============================================================================
// Properties
// =============================================================================

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn prop_plain_text_round_trips(source in "[a-zA-Z0-9 ,.!?()\n]{0,200}") {
        let result = block_on(DevIns::new().compile(&source));
        prop_assert!(result.is_success());
        prop_assert_eq!(result.statistics.variable_count, 0);
        prop_assert_eq!(result.output, source);
    }

    #[test]
    fn prop_each_distinct_variable_counts_once(
        names in prop::collection::btree_set("[a-z][a-z_]{2,8}", 1..8)
    ) {
        let source = names.iter().map(|n| format!("${n}")).collect::<Vec<_>>().join(" ");
        let vars: VariableTable = names.iter().map(|n| (n.clone(), "v")).collect();
        let result = block_on(
            DevIns::new().compile_with(&source, CompilerOptions::default(), vars),
        );
        prop_assert_eq!(result.statistics.variable_count, names.len());
    }

    #[test]
    fn prop_template_pass_is_idempotent(
        text in "[a-z $.{}\n]{0,120}",
        value in "[a-zA-Z0-9 ]{0,20}",
    ) {
        let vars: VariableTable = [("a", value.as_str()), ("b", "x")].into_iter().collect();
        let once = TemplateCompiler::compile(&text, &vars);
        let twice = TemplateCompiler::compile(&once, &vars);
        prop_assert_eq!(once, twice);
    }
}
