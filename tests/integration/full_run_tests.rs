//! Full shrinking runs over assembled class files

#[path = "../common/mod.rs"]
mod common;

use classshrink::classfile::access;
use classshrink::graph::CounterSet;
use classshrink::proguard::ProguardKeepRules;
use classshrink::report::{main_dex_list, usage_report};
use classshrink::shrinker::{
    RunMode, SessionOutcome, ShrinkOptions, ShrinkSession, ShrinkerError, ShrinkerLogger,
};
use common::*;

fn shrink(ws: &Workspace, rules: &str) -> (SessionOutcome, ShrinkerLogger) {
    let rules = ProguardKeepRules::parse_str(rules).unwrap();
    let logger = ShrinkerLogger::new().with_dont_warn(rules.dont_warn().to_vec());
    let outcome = ShrinkSession::new(&logger, ShrinkOptions::new(ws.output.clone()))
        .with_keep_rules(CounterSet::Shrink, &rules)
        .run(&ws.inputs())
        .unwrap();
    (outcome, logger)
}

/// Main -> Helper.run -> Util.assist, with dead code next to each
fn call_chain(ws: &Workspace) {
    let mut main = construct("com/example/Helper");
    main.insert(3, Op::virtual_call("com/example/Helper", "run", "()V"));
    main.insert(3, Op::Dup);
    ws.add_program(&main_class(main));
    ws.add_program(
        &ClassBuilder::new("com/example/Helper")
            .field(access::PRIVATE, "count", "I")
            .field(access::PRIVATE, "unusedField", "Ljava/lang/String;")
            .default_constructor()
            .method(
                access::PUBLIC,
                "run",
                "()V",
                vec![
                    Op::static_call("com/example/Util", "assist", "()V"),
                    Op::Aload0,
                    Op::get_field("com/example/Helper", "count", "I"),
                    Op::Pop,
                    Op::Return,
                ],
            )
            .empty_method("unused"),
    );
    ws.add_program(
        &ClassBuilder::new("com/example/Util")
            .method(access::PUBLIC | access::STATIC, "assist", "()V", vec![Op::Return])
            .method(access::PUBLIC | access::STATIC, "dead", "()V", vec![Op::Return]),
    );
    ws.add_program(
        &ClassBuilder::new("com/example/Dead")
            .default_constructor()
            .method(
                access::PUBLIC,
                "run",
                "()V",
                vec![Op::static_call("com/example/Util", "dead", "()V"), Op::Return],
            ),
    );
}

#[test]
fn test_keeps_callees_of_kept_method() {
    let ws = Workspace::new();
    call_chain(&ws);

    let (outcome, logger) = shrink(&ws, KEEP_MAIN);

    assert_eq!(outcome.mode, RunMode::Full);
    assert!(outcome.fallback_reason.is_none());
    assert_eq!(outcome.written, 3);
    assert_eq!(
        ws.output_files(),
        vec![
            "com/example/Helper.class",
            "com/example/Main.class",
            "com/example/Util.class",
        ]
    );
    assert_eq!(logger.warning_count(), 0);
}

#[test]
fn test_removes_unreachable_members() {
    let ws = Workspace::new();
    call_chain(&ws);

    shrink(&ws, KEEP_MAIN);

    let main = ws.output_class("com/example/Main").unwrap();
    assert_eq!(method_ids(&main), vec!["main:([Ljava/lang/String;)V"]);

    let helper = ws.output_class("com/example/Helper").unwrap();
    assert_eq!(method_ids(&helper), vec!["<init>:()V", "run:()V"]);
    assert_eq!(field_ids(&helper), vec!["count:I"]);

    let util = ws.output_class("com/example/Util").unwrap();
    assert_eq!(method_ids(&util), vec!["assist:()V"]);
    assert!(ws.output_class("com/example/Dead").is_none());
}

#[test]
fn test_shrunk_class_keeps_its_identity() {
    let ws = Workspace::new();
    call_chain(&ws);

    shrink(&ws, KEEP_MAIN);

    let helper = ws.output_class("com/example/Helper").unwrap();
    assert_eq!(helper.name().unwrap(), "com/example/Helper");
    assert_eq!(helper.super_name().unwrap(), Some("java/lang/Object"));
    assert_eq!(helper.major_version, 52);
}

#[test]
fn test_usage_report_lists_removed_code() {
    let ws = Workspace::new();
    call_chain(&ws);

    let (outcome, _) = shrink(&ws, KEEP_MAIN);
    let usage = usage_report(&outcome.graph, CounterSet::Shrink);

    assert!(usage.contains("com.example.Dead\n"));
    assert!(usage.contains("com.example.Helper\n"));
    assert!(usage.contains("    void unused()\n"));
    assert!(usage.contains("    java.lang.String unusedField\n"));
    assert!(usage.contains("    void dead()\n"));
    assert!(!usage.contains("assist"));
}

#[test]
fn test_library_overrides_are_kept() {
    let ws = Workspace::new();
    ws.add_library(&object_class());
    ws.add_library(
        &ClassBuilder::new("com/lib/Listener")
            .default_constructor()
            .empty_method("onEvent"),
    );

    let mut main = construct("com/example/Handler");
    main.extend(construct("com/example/Widget"));
    ws.add_program(&main_class(main));
    ws.add_program(
        &ClassBuilder::new("com/example/Handler")
            .extends("com/lib/Listener")
            .default_constructor()
            .empty_method("onEvent")
            .empty_method("helper"),
    );
    ws.add_program(
        &ClassBuilder::new("com/example/Widget")
            .default_constructor()
            .method(access::PUBLIC, "toString", "()Ljava/lang/String;", vec![Op::AconstNull, Op::Areturn])
            .method(access::PUBLIC, "equals", "(Ljava/lang/Object;)Z", vec![Op::Iconst0, Op::Ireturn])
            .empty_method("helper"),
    );

    shrink(&ws, KEEP_MAIN);

    let handler = ws.output_class("com/example/Handler").unwrap();
    assert_eq!(method_ids(&handler), vec!["<init>:()V", "onEvent:()V"]);
    let widget = ws.output_class("com/example/Widget").unwrap();
    assert_eq!(
        method_ids(&widget),
        vec![
            "<init>:()V",
            "equals:(Ljava/lang/Object;)Z",
            "toString:()Ljava/lang/String;",
        ]
    );
    assert!(!ws.output_path("java/lang/Object").exists());
}

#[test]
fn test_program_override_kept_with_instantiated_subclass() {
    let ws = Workspace::new();
    let mut main = construct("com/example/Sub");
    main.insert(3, Op::virtual_call("com/example/Base", "run", "()V"));
    main.insert(3, Op::Dup);
    ws.add_program(&main_class(main));
    ws.add_program(
        &ClassBuilder::new("com/example/Base")
            .default_constructor()
            .empty_method("run")
            .empty_method("other"),
    );
    ws.add_program(
        &ClassBuilder::new("com/example/Sub")
            .extends("com/example/Base")
            .default_constructor()
            .empty_method("run"),
    );
    ws.add_program(
        &ClassBuilder::new("com/example/Unused")
            .extends("com/example/Base")
            .default_constructor()
            .empty_method("run"),
    );

    shrink(&ws, KEEP_MAIN);

    let base = ws.output_class("com/example/Base").unwrap();
    assert_eq!(method_ids(&base), vec!["<init>:()V", "run:()V"]);
    let sub = ws.output_class("com/example/Sub").unwrap();
    assert_eq!(method_ids(&sub), vec!["<init>:()V", "run:()V"]);
    assert!(ws.output_class("com/example/Unused").is_none());
}

#[test]
fn test_interface_implementation_reached_through_interface_call() {
    let ws = Workspace::new();
    let mut main = construct("com/example/Task");
    main.insert(3, Op::interface_call("com/example/Runner", "run", "()V"));
    main.insert(3, Op::Dup);
    ws.add_program(&main_class(main));
    ws.add_program(
        &ClassBuilder::interface("com/example/Runner")
            .declare(access::PUBLIC | access::ABSTRACT, "run", "()V"),
    );
    ws.add_program(&ClassBuilder::interface("com/example/Marker"));
    ws.add_program(
        &ClassBuilder::new("com/example/Task")
            .implements("com/example/Runner")
            .implements("com/example/Marker")
            .default_constructor()
            .empty_method("run")
            .empty_method("idle"),
    );

    shrink(&ws, KEEP_MAIN);

    let task = ws.output_class("com/example/Task").unwrap();
    assert_eq!(method_ids(&task), vec!["<init>:()V", "run:()V"]);
    assert_eq!(task.interface_names().unwrap(), vec!["com/example/Runner"]);
    let runner = ws.output_class("com/example/Runner").unwrap();
    assert_eq!(method_ids(&runner), vec!["run:()V"]);
    assert!(ws.output_class("com/example/Marker").is_none());
}

#[test]
fn test_platform_internal_reference_is_tolerated() {
    let ws = Workspace::new();
    ws.add_program(&main_class(vec![
        Op::static_call("sun/misc/Unsafe", "getUnsafe", "()Lsun/misc/Unsafe;"),
        Op::Pop,
    ]));

    let (outcome, logger) = shrink(&ws, KEEP_MAIN);

    assert_eq!(outcome.written, 1);
    assert_eq!(logger.warning_count(), 0);
    assert!(logger.suppressed_count() > 0);
}

#[test]
fn test_unknown_reference_warns_unless_dontwarn() {
    let ws = Workspace::new();
    ws.add_program(&main_class(vec![Op::static_call("com/missing/Thing", "make", "()V")]));

    let (_, logger) = shrink(&ws, KEEP_MAIN);
    assert!(logger.warning_count() > 0);

    let rules = format!("{}-dontwarn com.missing.**\n", KEEP_MAIN);
    let (outcome, logger) = shrink(&ws, &rules);
    assert_eq!(outcome.written, 1);
    assert_eq!(logger.warning_count(), 0);
    assert!(logger.suppressed_count() > 0);
}

#[test]
fn test_class_for_name_keeps_target_class() {
    let ws = Workspace::new();
    ws.add_program(&main_class(vec![
        Op::Ldc("com.example.Plugin".to_string()),
        Op::static_call("java/lang/Class", "forName", "(Ljava/lang/String;)Ljava/lang/Class;"),
        Op::Pop,
    ]));
    ws.add_program(
        &ClassBuilder::new("com/example/Plugin")
            .default_constructor()
            .empty_method("start"),
    );

    shrink(&ws, KEEP_MAIN);

    let plugin = ws.output_class("com/example/Plugin").unwrap();
    assert!(method_ids(&plugin).is_empty());
}

#[test]
fn test_nothing_kept_without_rules() {
    let ws = Workspace::new();
    call_chain(&ws);

    let (outcome, _) = shrink(&ws, "");

    assert_eq!(outcome.written, 0);
    assert!(ws.output_files().is_empty());
}

#[test]
fn test_previous_output_is_cleared() {
    let ws = Workspace::new();
    call_chain(&ws);
    std::fs::create_dir_all(ws.output.join("stale")).unwrap();
    std::fs::write(ws.output.join("stale/Old.class"), b"old").unwrap();

    shrink(&ws, KEEP_MAIN);

    assert!(!ws.output.join("stale/Old.class").exists());
}

#[test]
fn test_main_dex_rules_use_their_own_counters() {
    let ws = Workspace::new();
    call_chain(&ws);
    let rules = ProguardKeepRules::parse_str(KEEP_MAIN).unwrap();
    let main_dex = ProguardKeepRules::parse_str("-keep class com.example.Dead").unwrap();
    let logger = ShrinkerLogger::new();

    let outcome = ShrinkSession::new(&logger, ShrinkOptions::new(ws.output.clone()))
        .with_keep_rules(CounterSet::Shrink, &rules)
        .with_keep_rules(CounterSet::LegacyMultidex, &main_dex)
        .run(&ws.inputs())
        .unwrap();

    assert_eq!(main_dex_list(&outcome.graph), "com/example/Dead.class\n");
    assert!(ws.output_class("com/example/Dead").is_none());
}

#[test]
fn test_superclass_implementation_kept_for_interface_call() {
    let ws = Workspace::new();
    inherited_interface_method(&ws, true);

    shrink(&ws, KEEP_MAIN);

    let base = ws.output_class("com/example/Base").unwrap();
    assert_eq!(method_ids(&base), vec!["<init>:()V", "greet:()V"]);
    let implementation = ws.output_class("com/example/Impl").unwrap();
    assert_eq!(method_ids(&implementation), vec!["<init>:()V"]);
    assert_eq!(implementation.interface_names().unwrap(), vec!["com/example/Greeter"]);
    let greeter = ws.output_class("com/example/Greeter").unwrap();
    assert_eq!(method_ids(&greeter), vec!["greet:()V"]);
}

#[test]
fn test_superclass_implementation_removed_without_interface_call() {
    let ws = Workspace::new();
    inherited_interface_method(&ws, false);

    shrink(&ws, KEEP_MAIN);

    let base = ws.output_class("com/example/Base").unwrap();
    assert_eq!(method_ids(&base), vec!["<init>:()V"]);
    assert!(ws.output_class("com/example/Greeter").is_none());
}

#[test]
fn test_output_overlapping_inputs_is_rejected() {
    let ws = Workspace::new();
    call_chain(&ws);
    let rules = ProguardKeepRules::parse_str(KEEP_MAIN).unwrap();
    let logger = ShrinkerLogger::new();

    for output in [ws.program.clone(), ws.program.join("shrunk"), ws.temp.path().to_path_buf()] {
        let err = ShrinkSession::new(&logger, ShrinkOptions::new(output))
            .with_keep_rules(CounterSet::Shrink, &rules)
            .run(&ws.inputs())
            .unwrap_err();
        assert!(matches!(err, ShrinkerError::OutputOverlapsInput { .. }), "{err}");
    }

    assert_eq!(ws.inputs().program_files().len(), 4);
    assert!(ws.program.join("com/example/Helper.class").exists());
}
