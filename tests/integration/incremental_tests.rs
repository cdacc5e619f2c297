//! Incremental runs against the snapshot of a previous run

#[path = "../common/mod.rs"]
mod common;

use classshrink::classfile::access;
use classshrink::graph::CounterSet;
use classshrink::proguard::ProguardKeepRules;
use classshrink::shrinker::{RunMode, SessionOutcome, ShrinkOptions, ShrinkSession, ShrinkerLogger};
use common::*;
use std::collections::BTreeMap;

fn run(ws: &Workspace, rules: &str, incremental: bool) -> SessionOutcome {
    let keep = ProguardKeepRules::parse_str(rules).unwrap();
    let logger = ShrinkerLogger::new();
    let mut options = ShrinkOptions::new(ws.output.clone());
    options.state_dir = Some(ws.state.clone());
    options.incremental = incremental;
    ShrinkSession::new(&logger, options)
        .with_keep_rules(CounterSet::Shrink, &keep)
        .with_configuration(&[rules])
        .run(&ws.inputs())
        .unwrap()
}

fn calling(method: &str) -> ClassBuilder {
    let mut ops = construct("com/example/Helper");
    ops.insert(3, Op::virtual_call("com/example/Helper", method, "()V"));
    ops.insert(3, Op::Dup);
    main_class(ops)
}

fn helper() -> ClassBuilder {
    ClassBuilder::new("com/example/Helper")
        .default_constructor()
        .empty_method("first")
        .empty_method("second")
}

/// Method ids of every output class
fn output_members(ws: &Workspace) -> BTreeMap<String, Vec<String>> {
    ws.output_files()
        .into_iter()
        .map(|file| {
            let name = file.trim_end_matches(".class").to_string();
            let class = ws.output_class(&name).unwrap();
            (name, method_ids(&class))
        })
        .collect()
}

#[test]
fn test_first_run_falls_back_without_snapshot() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());

    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Full);
    assert!(outcome.fallback_reason.unwrap().contains("no snapshot"));
    assert!(ws.state.join("shrinker-state.json").exists());
}

#[test]
fn test_unchanged_inputs_write_nothing() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);

    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Incremental);
    assert!(outcome.fallback_reason.is_none());
    assert_eq!(outcome.written, 0);
    assert_eq!(outcome.deleted, 0);
    assert_eq!(ws.output_files(), vec!["com/example/Helper.class", "com/example/Main.class"]);
}

#[test]
fn test_body_change_matches_full_run() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);

    ws.add_program(&calling("second"));
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Incremental);
    assert_eq!(outcome.written, 2);
    let helper_methods = method_ids(&ws.output_class("com/example/Helper").unwrap());
    assert_eq!(helper_methods, vec!["<init>:()V", "second:()V"]);

    let incremental = output_members(&ws);
    run(&ws, KEEP_MAIN, false);
    assert_eq!(output_members(&ws), incremental);
}

#[test]
fn test_dropped_reference_deletes_class() {
    let ws = Workspace::new();
    let mut ops = construct("com/example/Helper");
    ops.extend(construct("com/example/Extra"));
    ws.add_program(&main_class(ops));
    ws.add_program(&helper());
    ws.add_program(&ClassBuilder::new("com/example/Extra").default_constructor());
    run(&ws, KEEP_MAIN, true);
    assert!(ws.output_path("com/example/Extra").exists());

    ws.add_program(&main_class(construct("com/example/Helper")));
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Incremental);
    assert_eq!(outcome.deleted, 1);
    assert!(!ws.output_path("com/example/Extra").exists());
    assert!(ws.output_path("com/example/Helper").exists());
}

#[test]
fn test_new_reference_writes_unchanged_class() {
    let ws = Workspace::new();
    ws.add_program(&main_class(Vec::new()));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);
    assert!(!ws.output_path("com/example/Helper").exists());

    ws.add_program(&calling("first"));
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Incremental);
    let helper = ws.output_class("com/example/Helper").unwrap();
    assert_eq!(method_ids(&helper), vec!["<init>:()V", "first:()V"]);
}

#[test]
fn test_added_method_falls_back() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);

    ws.add_program(&helper().empty_method("third"));
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Full);
    let reason = outcome.fallback_reason.unwrap();
    assert!(reason.contains("com/example/Helper.third:()V added"), "{reason}");
}

#[test]
fn test_changed_modifiers_fall_back() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);

    ws.add_program(
        &ClassBuilder::new("com/example/Helper")
            .default_constructor()
            .empty_method("first")
            .method(access::PUBLIC | access::FINAL, "second", "()V", vec![Op::Return]),
    );
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Full);
    assert!(outcome.fallback_reason.unwrap().contains("modifiers changed"));
}

#[test]
fn test_changed_superclass_falls_back() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    ws.add_program(&ClassBuilder::new("com/example/Base").default_constructor());
    run(&ws, KEEP_MAIN, true);

    ws.add_program(
        &ClassBuilder::new("com/example/Helper")
            .extends("com/example/Base")
            .default_constructor()
            .empty_method("first")
            .empty_method("second"),
    );
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Full);
    assert!(outcome.fallback_reason.unwrap().contains("superclass changed"));
    assert!(ws.output_path("com/example/Base").exists());
}

#[test]
fn test_added_and_removed_files_fall_back() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);

    ws.add_program(&ClassBuilder::new("com/example/Later").default_constructor());
    let outcome = run(&ws, KEEP_MAIN, true);
    assert_eq!(outcome.mode, RunMode::Full);
    assert!(outcome.fallback_reason.unwrap().contains("added"));

    ws.remove_program("com/example/Later");
    let outcome = run(&ws, KEEP_MAIN, true);
    assert_eq!(outcome.mode, RunMode::Full);
    assert!(outcome.fallback_reason.unwrap().contains("removed"));
}

#[test]
fn test_changed_keep_rules_fall_back() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);

    let rules = format!("{}-keep class com.example.Helper {{ *; }}\n", KEEP_MAIN);
    let outcome = run(&ws, &rules, true);

    assert_eq!(outcome.mode, RunMode::Full);
    assert_eq!(outcome.fallback_reason.as_deref(), Some("incremental run impossible: Keep rules changed."));
    let helper = ws.output_class("com/example/Helper").unwrap();
    assert_eq!(method_ids(&helper), vec!["<init>:()V", "first:()V", "second:()V"]);
}

#[test]
fn test_changed_library_falls_back() {
    let ws = Workspace::new();
    ws.add_library(&object_class());
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);

    ws.add_library(&object_class().empty_method("extra"));
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Full);
    assert!(outcome.fallback_reason.unwrap().contains("Library file"));
}

#[test]
fn test_consecutive_incremental_runs() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);

    ws.add_program(&calling("second"));
    assert_eq!(run(&ws, KEEP_MAIN, true).mode, RunMode::Incremental);
    ws.add_program(&calling("first"));
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Incremental);
    let helper = ws.output_class("com/example/Helper").unwrap();
    assert_eq!(method_ids(&helper), vec!["<init>:()V", "first:()V"]);
}

#[test]
fn test_added_field_falls_back() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper());
    run(&ws, KEEP_MAIN, true);

    ws.add_program(&helper().field(access::PRIVATE, "cache", "I"));
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Full);
    let reason = outcome.fallback_reason.unwrap();
    assert!(reason.contains("Field com/example/Helper.cache:I added."), "{reason}");
}

#[test]
fn test_removed_field_falls_back() {
    let ws = Workspace::new();
    ws.add_program(&calling("first"));
    ws.add_program(&helper().field(access::PRIVATE, "cache", "I"));
    run(&ws, KEEP_MAIN, true);

    ws.add_program(&helper());
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Full);
    let reason = outcome.fallback_reason.unwrap();
    assert!(reason.contains("Field com/example/Helper.cache:I removed."), "{reason}");
    assert!(field_ids(&ws.output_class("com/example/Helper").unwrap()).is_empty());
}

#[test]
fn test_new_interface_call_keeps_superclass_implementation() {
    let ws = Workspace::new();
    inherited_interface_method(&ws, false);
    run(&ws, KEEP_MAIN, true);
    let base = ws.output_class("com/example/Base").unwrap();
    assert_eq!(method_ids(&base), vec!["<init>:()V"]);

    inherited_interface_method(&ws, true);
    let outcome = run(&ws, KEEP_MAIN, true);

    assert_eq!(outcome.mode, RunMode::Incremental);
    let base = ws.output_class("com/example/Base").unwrap();
    assert_eq!(method_ids(&base), vec!["<init>:()V", "greet:()V"]);

    let incremental = output_members(&ws);
    run(&ws, KEEP_MAIN, false);
    assert_eq!(output_members(&ws), incremental);
}
