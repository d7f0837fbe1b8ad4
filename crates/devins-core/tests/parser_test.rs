//! Integration tests for parsing whole instruction documents
//!
//! Covers:
//! - Front matter with every value kind
//! - Mixed prose, commands, agents and code blocks
//! - Lossless node text for arbitrary input

use devins_core::{
    CaseKey, FrontMatterValue, NodeKind, PipelineFunc, UsedKind, parse,
};
use proptest::prelude::*;

// =============================================================================
// Front Matter
// =============================================================================

#[test]
fn test_front_matter_value_kinds() {
    let source = r#"---
name: "Summarize"
priority: 3
enabled: true
released: 2024-05-01
tags: [a, b]
owner: $user
when: { $lang == "rust" }
variables:
  "sources": /.*\.rs$/ { grep("src") | sort | head(5) }
  "kind": /(\w+)\.rs$/ {
    case "$1" {
      "main" { print("binary") }
      default { print("library") }
    }
  }
---
Body text
"#;
    let doc = parse(source).unwrap();
    let fm = doc.front_matter().expect("front matter");

    assert_eq!(fm.get("name"), Some(&FrontMatterValue::String("Summarize".into())));
    assert_eq!(fm.get("priority").and_then(|v| v.as_usize()), Some(3));
    assert_eq!(fm.get("enabled").and_then(|v| v.as_bool()), Some(true));
    assert!(matches!(fm.get("released"), Some(FrontMatterValue::Date(_))));
    assert!(matches!(fm.get("tags"), Some(FrontMatterValue::Array(items)) if items.len() == 2));
    assert_eq!(fm.get("owner"), Some(&FrontMatterValue::VariableRef("user".into())));
    assert!(matches!(fm.get("when"), Some(FrontMatterValue::Expression(_))));

    let variables = match fm.get("variables") {
        Some(FrontMatterValue::Object(entries)) => entries,
        other => panic!("Expected object, got {other:?}"),
    };
    assert_eq!(variables.len(), 2);

    match &variables[0].value {
        FrontMatterValue::PatternAction(action) => {
            assert_eq!(action.pattern.as_deref(), Some(r".*\.rs$"));
            assert_eq!(
                action.pipeline,
                vec![
                    PipelineFunc::Grep(vec!["src".into()]),
                    PipelineFunc::Sort,
                    PipelineFunc::Head(5),
                ]
            );
        }
        other => panic!("Expected pattern-action, got {other:?}"),
    }

    match &variables[1].value {
        FrontMatterValue::PatternAction(action) => match &action.pipeline[..] {
            [PipelineFunc::Case(case)] => {
                assert_eq!(case.subject, "$1");
                assert_eq!(case.arms.len(), 2);
                assert_eq!(case.arms[1].key, CaseKey::Default);
            }
            other => panic!("Expected a single case stage, got {other:?}"),
        },
        other => panic!("Expected pattern-action, got {other:?}"),
    }
}

#[test]
fn test_lifecycle_hook_has_no_pattern() {
    let doc = parse("---\nonStreamingEnd: { parseCode | saveFile }\n---\n").unwrap();
    match doc.front_matter().and_then(|fm| fm.get("onStreamingEnd")) {
        Some(FrontMatterValue::PatternAction(action)) => {
            assert!(action.pattern.is_none());
            assert_eq!(action.pipeline.len(), 2);
        }
        other => panic!("Expected pattern-action, got {other:?}"),
    }
}

// =============================================================================
// Body
// =============================================================================

#[test]
fn test_mixed_document() {
    let source = "Review /file:src/lib.rs#L1-L10 with @reviewer\n\
                  ```rust\nfn main() {}\n```\n\
                  Mail bob@example.com or see https://example.com/a/b\n";
    let doc = parse(source).unwrap();

    let used: Vec<(UsedKind, String)> = doc
        .nodes()
        .iter()
        .filter_map(|n| match &n.kind {
            NodeKind::Used(u) => Some((u.kind, u.name.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        used,
        vec![
            (UsedKind::Command, "file".to_string()),
            (UsedKind::Agent, "reviewer".to_string()),
        ]
    );
    assert!(
        doc.nodes()
            .iter()
            .any(|n| matches!(&n.kind, NodeKind::CodeBlock(b) if b.language.as_deref() == Some("rust")))
    );
}

#[test]
fn test_command_argument_keeps_fragment() {
    let doc = parse("/file:src/lib.rs#L1-L10").unwrap();
    match &doc.nodes()[0].kind {
        NodeKind::Used(u) => assert_eq!(u.argument.as_deref(), Some("src/lib.rs#L1-L10")),
        other => panic!("Expected command, got {other:?}"),
    }
}

#[test]
fn test_unclosed_code_block_is_text_with_diagnostic() {
    let doc = parse("before\n```rust\nfn main() {}\n").unwrap();
    assert!(doc.nodes().iter().all(|n| n.is_text()));
    assert_eq!(doc.diagnostics().len(), 1);
}

#[test]
fn test_parse_error_has_position() {
    let err = parse("---\nname: ok\nwhen: { $a\n---\n").unwrap_err();
    assert_eq!(err.position.line, 3);
    assert!(err.to_string().starts_with("parse error at 3:"));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_node_text_is_lossless(source in "[ -~\n]{0,200}") {
        if let Ok(doc) = parse(&source) {
            let rebuilt: String = doc.nodes().iter().map(|n| n.source_text()).collect();
            prop_assert_eq!(rebuilt, source);
        }
    }

    #[test]
    fn prop_plain_prose_is_one_text_node(source in "[a-zA-Z0-9 ,.!?\n]{1,200}") {
        let doc = parse(&source).unwrap();
        prop_assert_eq!(doc.nodes().len(), 1);
        prop_assert!(doc.nodes()[0].is_text());
    }
}
