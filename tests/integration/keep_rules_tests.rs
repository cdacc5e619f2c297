//! Keep rules driving full runs

#[path = "../common/mod.rs"]
mod common;

use classshrink::classfile::access;
use classshrink::graph::CounterSet;
use classshrink::proguard::{KeepRuleError, ProguardKeepRules};
use classshrink::shrinker::{ShrinkOptions, ShrinkSession, ShrinkerLogger};
use common::*;
use std::fs;

fn shrink_with(ws: &Workspace, rules: &ProguardKeepRules) {
    let logger = ShrinkerLogger::new().with_dont_warn(rules.dont_warn().to_vec());
    ShrinkSession::new(&logger, ShrinkOptions::new(ws.output.clone()))
        .with_keep_rules(CounterSet::Shrink, rules)
        .run(&ws.inputs())
        .unwrap();
}

fn shrink(ws: &Workspace, rules: &str) {
    shrink_with(ws, &ProguardKeepRules::parse_str(rules).unwrap());
}

#[test]
fn test_rules_file_with_include() {
    let ws = Workspace::new();
    ws.add_program(&main_class(Vec::new()));
    ws.add_program(
        &ClassBuilder::new("com/example/Plugin")
            .default_constructor()
            .empty_method("start"),
    );
    let dir = ws.temp.path().join("rules");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("plugins.pro"), "-keep class com.example.Plugin { <init>(); }\n").unwrap();
    let main_rules = dir.join("app.pro");
    fs::write(&main_rules, format!("# application\n-include plugins.pro\n{}", KEEP_MAIN)).unwrap();

    let rules = ProguardKeepRules::parse_file(&main_rules).unwrap();
    assert_eq!(rules.rules().len(), 2);
    shrink_with(&ws, &rules);

    let plugin = ws.output_class("com/example/Plugin").unwrap();
    assert_eq!(method_ids(&plugin), vec!["<init>:()V"]);
    assert!(ws.output_path("com/example/Main").exists());
}

#[test]
fn test_keep_class_members_only_apply_to_kept_classes() {
    let ws = Workspace::new();
    ws.add_program(&main_class(construct("com/example/Listener")));
    ws.add_program(
        &ClassBuilder::new("com/example/Listener")
            .default_constructor()
            .empty_method("onSave")
            .empty_method("other"),
    );
    ws.add_program(
        &ClassBuilder::new("com/example/Idle")
            .default_constructor()
            .empty_method("onSave"),
    );

    shrink(
        &ws,
        &format!("{}-keepclassmembers class com.example.** {{ public void onSave(); }}\n", KEEP_MAIN),
    );

    let listener = ws.output_class("com/example/Listener").unwrap();
    assert_eq!(method_ids(&listener), vec!["<init>:()V", "onSave:()V"]);
    assert!(ws.output_class("com/example/Idle").is_none());
}

#[test]
fn test_keep_classes_with_members_requires_match() {
    let ws = Workspace::new();
    ws.add_program(&main_class(Vec::new()));
    ws.add_program(
        &ClassBuilder::new("com/example/NativeBridge")
            .declare(access::PUBLIC | access::NATIVE, "init", "()V")
            .empty_method("helper"),
    );
    ws.add_program(&ClassBuilder::new("com/example/Plain").empty_method("helper"));

    shrink(
        &ws,
        &format!("{}-keepclasseswithmembers class com.example.** {{ native <methods>; }}\n", KEEP_MAIN),
    );

    let bridge = ws.output_class("com/example/NativeBridge").unwrap();
    assert_eq!(method_ids(&bridge), vec!["init:()V"]);
    assert!(ws.output_class("com/example/Plain").is_none());
}

#[test]
fn test_keep_annotated_classes() {
    let ws = Workspace::new();
    ws.add_program(
        &ClassBuilder::new("com/example/Kept")
            .annotated("com/example/Keep")
            .field(access::PRIVATE, "state", "I")
            .default_constructor()
            .empty_method("run"),
    );
    ws.add_program(&ClassBuilder::new("com/example/NotKept").default_constructor());

    shrink(&ws, "-keep @com.example.Keep class ** { *; }\n");

    let kept = ws.output_class("com/example/Kept").unwrap();
    assert_eq!(method_ids(&kept), vec!["<init>:()V", "run:()V"]);
    assert_eq!(field_ids(&kept), vec!["state:I"]);
    assert!(ws.output_class("com/example/NotKept").is_none());
}

#[test]
fn test_keep_subclasses() {
    let ws = Workspace::new();
    ws.add_program(
        &ClassBuilder::new("com/example/Plugin")
            .default_constructor()
            .empty_method("describe"),
    );
    ws.add_program(
        &ClassBuilder::new("com/example/FirstPlugin")
            .extends("com/example/Plugin")
            .default_constructor()
            .empty_method("unused"),
    );

    shrink(&ws, "-keep class ** extends com.example.Plugin { <init>(); }\n");

    let first = ws.output_class("com/example/FirstPlugin").unwrap();
    assert_eq!(method_ids(&first), vec!["<init>:()V"]);
    let plugin = ws.output_class("com/example/Plugin").unwrap();
    assert_eq!(method_ids(&plugin), vec!["<init>:()V"]);
}

#[test]
fn test_keep_named_field() {
    let ws = Workspace::new();
    ws.add_program(
        &ClassBuilder::new("com/example/Config")
            .field(access::PUBLIC | access::STATIC, "version", "I")
            .field(access::PUBLIC | access::STATIC, "name", "Ljava/lang/String;"),
    );

    shrink(&ws, "-keep class com.example.Config { int version; }\n");

    let config = ws.output_class("com/example/Config").unwrap();
    assert_eq!(field_ids(&config), vec!["version:I"]);
    assert!(config.methods.is_empty());
}

#[test]
fn test_allowshrinking_keeps_nothing() {
    let ws = Workspace::new();
    ws.add_program(&main_class(Vec::new()));
    ws.add_program(&ClassBuilder::new("com/example/Plugin").default_constructor());

    shrink(&ws, &format!("{}-keep,allowshrinking class com.example.Plugin\n", KEEP_MAIN));

    assert_eq!(ws.output_files(), vec!["com/example/Main.class"]);
}

#[test]
fn test_rule_errors() {
    assert!(matches!(
        ProguardKeepRules::parse_str("-dontshrink").unwrap_err(),
        KeepRuleError::UnsupportedFlag { .. }
    ));

    let err = ProguardKeepRules::parse_str("-keep class com.example.Main {\n  void run(;\n}").unwrap_err();
    assert!(matches!(err, KeepRuleError::Parse { .. }), "{err}");

    let temp = tempfile::TempDir::new().unwrap();
    let err = ProguardKeepRules::parse_file(&temp.path().join("missing.pro")).unwrap_err();
    assert!(matches!(err, KeepRuleError::Io { .. }));
}
