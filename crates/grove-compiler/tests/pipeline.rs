//! End-to-end tests: build units programmatically, run the whole pipeline
//! and inspect the decoded class files

mod common;

use common::*;
use grove_classfile::access::*;
use grove_classfile::{Attribute, Opcode};
use grove_compiler::ast::{BinaryOp, FieldNode, Parameter};
use grove_compiler::{ClassKind, ClassNode, CompileError, CompileUnit, CompilerConfig, MethodNode, Modifiers, TypeRef};

fn method(name: &str, ret: TypeRef) -> MethodNode {
    MethodNode::new(name, Modifiers::PUBLIC, ret)
}

#[test]
fn test_enum_constants_initialized_in_declaration_order() {
    let mut unit = CompileUnit::new();
    let mut color = ClassNode::new("p.Color", ClassKind::Enum);
    for name in ["RED", "GREEN", "BLUE"] {
        color.fields.push(FieldNode::new(
            name,
            TypeRef::class("p.Color"),
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL | Modifiers::ENUM,
        ));
    }
    unit.add_class(color);

    let classes = compile(&mut unit).expect("enum compiles");
    let color = class(&classes, "p/Color");
    assert_ne!(color.access_flags & ACC_ENUM, 0);
    for name in ["RED", "GREEN", "BLUE"] {
        let field = color.field(name).expect("constant field");
        assert_eq!(field.access_flags & (ACC_STATIC | ACC_FINAL | ACC_ENUM), ACC_STATIC | ACC_FINAL | ACC_ENUM);
    }
    assert!(color.method("values", "()[Lp/Color;").is_some());

    let names: Vec<String> = ldc_strings(color, "<clinit>")
        .into_iter()
        .filter(|s| ["RED", "GREEN", "BLUE"].contains(&s.as_str()))
        .collect();
    assert_eq!(names, ["RED", "GREEN", "BLUE"]);
}

#[test]
fn test_closure_shares_captured_local_through_reference() {
    // def run() { def x = 1; def c = { x = x + 1 }; c.call(); return x }
    let mut unit = CompileUnit::new();
    let b = unit.builder();
    let mut a = ClassNode::new("p.A", ClassKind::Class);
    a.source_file = Some("A.groovy".into());
    a.methods.push(method("run", TypeRef::object()).with_body(b.block(vec![
        b.expr_stmt(b.declare("x", TypeRef::object(), Some(b.int(1)))).at(2, 5),
        b.expr_stmt(b.declare(
            "c",
            TypeRef::object(),
            Some(b.closure(
                None,
                b.block(vec![b.expr_stmt(b.assign(b.var("x"), b.binary(BinaryOp::Add, b.var("x"), b.int(1))))]),
            )),
        ))
        .at(3, 5),
        b.expr_stmt(b.call(b.var("c"), "call", vec![])).at(4, 5),
        b.ret(b.var("x")).at(5, 5),
    ])));
    unit.add_class(a);

    let classes = compile(&mut unit).expect("closure compiles");
    let outer = class(&classes, "p/A");
    let closure = class(&classes, "p/A$_run_closure1");

    let run_calls = calls(outer, "run");
    assert!(run_calls.contains(&"groovy/lang/Reference.<init>".to_string()));
    assert!(run_calls.contains(&"groovy/lang/Reference.get".to_string()));
    assert!(run_calls.contains(&"p/A$_run_closure1.<init>".to_string()));

    let field = closure.field("x").expect("captured cell field");
    assert_eq!(field.descriptor, "Lgroovy/lang/Reference;");
    assert_eq!(field.access_flags, ACC_PRIVATE | ACC_SYNTHETIC);
    assert!(closure
        .method(
            "<init>",
            "(Ljava/lang/Object;Ljava/lang/Object;Lgroovy/lang/Reference;)V"
        )
        .is_some());

    let body_calls = calls(closure, "doCall");
    assert!(body_calls.contains(&"groovy/lang/Reference.get".to_string()));
    assert!(body_calls.contains(&"groovy/lang/Reference.set".to_string()));
    let cell_reads = member_refs(closure, "doCall", &[Opcode::Getfield]);
    assert!(cell_reads.iter().all(|r| r.name == "x" && r.descriptor == "Lgroovy/lang/Reference;"));
    assert!(!cell_reads.is_empty());
}

#[test]
fn test_default_parameters_give_one_overload_each() {
    let mut unit = CompileUnit::new();
    let b = unit.builder();
    let mut a = ClassNode::new("p.A", ClassKind::Class);
    a.methods.push(
        method("m", TypeRef::object())
            .with_params(vec![
                Parameter::new("a", TypeRef::object()),
                Parameter::new("b", TypeRef::int()).with_default(b.int(1)),
                Parameter::new("c", TypeRef::object()).with_default(b.string("x")),
            ])
            .with_body(b.block(vec![b.ret(b.var("a"))])),
    );
    unit.add_class(a);

    let classes = compile(&mut unit).expect("defaults compile");
    let a = class(&classes, "p/A");
    let mut descriptors: Vec<&str> = a.methods_named("m").map(|m| m.descriptor.as_str()).collect();
    descriptors.sort();
    assert_eq!(
        descriptors,
        [
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            "(Ljava/lang/Object;I)Ljava/lang/Object;",
            "(Ljava/lang/Object;ILjava/lang/Object;)Ljava/lang/Object;",
        ]
    );
}

#[test]
fn test_final_reassignment_is_rejected() {
    let mut unit = CompileUnit::new();
    let b = unit.builder();
    let mut a = ClassNode::new("p.A", ClassKind::Class);
    a.source_file = Some("A.groovy".into());
    a.methods.push(method("run", TypeRef::void()).with_body(b.block(vec![
        b.expr_stmt(b.declare_final("x", TypeRef::int(), Some(b.int(1)))),
        b.expr_stmt(b.assign(b.var("x"), b.int(2)).at(3, 5)),
    ])));
    unit.add_class(a);

    let err = compile(&mut unit).unwrap_err();
    assert!(matches!(err, CompileError::FinalReassigned { .. }));
    let message = err.to_string();
    assert!(message.starts_with("A.groovy"));
    assert!(message.ends_with(": The variable [x] is declared final but is reassigned"));
    assert!(unit.output.is_empty());
}

/// p1.A declares `protected int x`; p2.B extends it, p1.C shares its
/// package, p2.D shares nothing
fn visibility_unit() -> CompileUnit {
    let mut unit = CompileUnit::new();
    let b = unit.builder();
    let a_ty = TypeRef::class("p1.A");

    let mut a = ClassNode::new("p1.A", ClassKind::Class);
    a.fields.push(FieldNode::new("x", TypeRef::int(), Modifiers::PROTECTED));
    unit.add_class(a);

    let mut sub = ClassNode::new("p2.B", ClassKind::Class).with_super(a_ty.clone());
    sub.methods
        .push(method("read", TypeRef::int()).with_body(b.block(vec![b.ret(b.var("x"))])));
    sub.methods.push(
        method("write", TypeRef::void())
            .with_params(vec![Parameter::new("v", TypeRef::int())])
            .with_body(b.block(vec![b.expr_stmt(b.assign(b.var("x"), b.var("v")))])),
    );
    unit.add_class(sub);

    for name in ["p1.C", "p2.D"] {
        let mut other = ClassNode::new(name, ClassKind::Class);
        other.methods.push(
            method("read", TypeRef::object())
                .with_params(vec![Parameter::new("a", a_ty.clone())])
                .with_body(b.block(vec![b.ret(b.prop(b.var("a"), "x"))])),
        );
        unit.add_class(other);
    }
    unit
}

#[test]
fn test_field_access_follows_visibility() {
    let mut unit = visibility_unit();
    let classes = compile(&mut unit).expect("visibility scenario compiles");
    let direct = |internal: &str| -> Vec<String> {
        member_refs(class(&classes, internal), "read", &[Opcode::Getfield])
            .into_iter()
            .map(|r| format!("{}.{}", r.class, r.name))
            .collect()
    };

    assert_eq!(direct("p2/B"), ["p1/A.x"]);
    assert_eq!(direct("p1/C"), ["p1/A.x"]);
    assert!(direct("p2/D").is_empty());
    let dynamic = calls(class(&classes, "p2/D"), "read");
    assert!(dynamic.contains(&"org/codehaus/groovy/runtime/ScriptBytecodeAdapter.getProperty".to_string()));
}

#[test]
fn test_subclass_writes_inherited_protected_field_directly() {
    let mut unit = visibility_unit();
    let classes = compile(&mut unit).expect("visibility scenario compiles");
    let sub = class(&classes, "p2/B");
    let stores: Vec<String> = member_refs(sub, "write", &[Opcode::Putfield])
        .into_iter()
        .map(|r| format!("{}.{}:{}", r.class, r.name, r.descriptor))
        .collect();
    assert_eq!(stores, ["p1/A.x:I"]);
    assert!(!calls(sub, "write").iter().any(|c| c.starts_with("org/codehaus/groovy/runtime/ScriptBytecodeAdapter")));
}

#[test]
fn test_covariant_override_keeps_both_descriptors() {
    let mut unit = CompileUnit::new();
    let b = unit.builder();
    let mut base = ClassNode::new("p.Base", ClassKind::Class);
    base.methods
        .push(method("make", TypeRef::object()).with_body(b.block(vec![b.ret(b.string("base"))])));
    unit.add_class(base);
    let mut sub = ClassNode::new("p.Sub", ClassKind::Class).with_super(TypeRef::class("p.Base"));
    sub.methods
        .push(method("make", TypeRef::string()).with_body(b.block(vec![b.ret(b.string("sub"))])));
    unit.add_class(sub);

    let classes = compile(&mut unit).expect("covariant override compiles");
    let sub = class(&classes, "p/Sub");
    let mut descriptors: Vec<&str> = sub.methods_named("make").map(|m| m.descriptor.as_str()).collect();
    descriptors.sort();
    assert_eq!(descriptors, ["()Ljava/lang/Object;", "()Ljava/lang/String;"]);

    let bridge = sub.method("make", "()Ljava/lang/Object;").expect("bridge method");
    assert_eq!(bridge.access_flags & (ACC_SYNTHETIC | ACC_BRIDGE), ACC_SYNTHETIC | ACC_BRIDGE);
    assert!(calls(sub, "make").contains(&"p/Sub.make".to_string()));
    let own = sub.method("make", "()Ljava/lang/String;").expect("declared override");
    assert_eq!(own.access_flags & ACC_BRIDGE, 0);
}

fn list_unit(len: i32) -> CompileUnit {
    let mut unit = CompileUnit::new();
    let b = unit.builder();
    let mut a = ClassNode::new("p.Data", ClassKind::Class);
    a.methods.push(
        method("items", TypeRef::object())
            .with_body(b.block(vec![b.ret(b.list((0..len).map(|i| b.int(i)).collect()))])),
    );
    unit.add_class(a);
    unit
}

fn list_helpers(len: i32) -> Vec<String> {
    let mut unit = list_unit(len);
    let classes = compile(&mut unit).expect("list literal compiles");
    let data = class(&classes, "p/Data");
    data.methods
        .iter()
        .filter(|m| m.name.starts_with("$createListEntry_"))
        .map(|m| {
            assert_eq!(m.descriptor, "([Ljava/lang/Object;)V");
            assert_eq!(m.access_flags, ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC);
            m.name.clone()
        })
        .collect()
}

#[test]
fn test_list_of_1000_constants_stays_inline() {
    assert!(list_helpers(1000).is_empty());
}

#[test]
fn test_list_of_1001_constants_is_split() {
    assert_eq!(list_helpers(1001), ["$createListEntry_1", "$createListEntry_2"]);
    let mut unit = list_unit(1001);
    let classes = compile(&mut unit).unwrap();
    let items = calls(class(&classes, "p/Data"), "items");
    let helper_calls: Vec<&String> = items.iter().filter(|c| c.contains("$createListEntry_")).collect();
    assert_eq!(
        helper_calls,
        [&"p/Data.$createListEntry_1".to_string(), &"p/Data.$createListEntry_2".to_string()]
    );
}

#[test]
fn test_list_threshold_is_configurable() {
    let mut unit = list_unit(10);
    let config = CompilerConfig {
        list_split_threshold: 4,
        ..CompilerConfig::default()
    };
    let classes = compile_with(config, &mut unit).unwrap();
    let helpers = class(&classes, "p/Data")
        .methods
        .iter()
        .filter(|m| m.name.starts_with("$createListEntry_"))
        .count();
    assert_eq!(helpers, 3);
}

/// `@interface p.Config { int size() }` used on `p.User`
fn annotated_unit(members: impl FnOnce(&grove_compiler::AstBuilder) -> Vec<(&'static str, grove_compiler::ast::Expr)>) -> CompileUnit {
    let mut unit = CompileUnit::new();
    let b = unit.builder();
    let mut config = ClassNode::new("p.Config", ClassKind::Annotation);
    config.methods.push(MethodNode::new(
        "size",
        Modifiers::PUBLIC | Modifiers::ABSTRACT,
        TypeRef::int(),
    ));
    unit.add_class(config);
    let mut user = ClassNode::new("p.User", ClassKind::Class);
    user.source_file = Some("User.groovy".into());
    user.annotations.push(b.annotation(TypeRef::class("p.Config"), members(&b)));
    unit.add_class(user);
    unit
}

fn failure_text(err: CompileError) -> String {
    match err {
        CompileError::Failed { summary, .. } => summary,
        other => panic!("expected collected errors, got {}", other),
    }
}

#[test]
fn test_missing_mandatory_annotation_attribute() {
    let mut unit = annotated_unit(|_| vec![]);
    let summary = failure_text(compile(&mut unit).unwrap_err());
    assert!(summary.contains("No explicit/default value found for annotation attribute 'size'"));
}

#[test]
fn test_annotation_attribute_type_mismatch() {
    let mut unit = annotated_unit(|b| vec![("size", b.string("big"))]);
    let summary = failure_text(compile(&mut unit).unwrap_err());
    assert!(summary.contains("Attribute 'size' should have type 'java.lang.Integer'; but found type 'java.lang.String'"));
}

#[test]
fn test_valid_annotation_is_written_invisible_by_default() {
    let mut unit = annotated_unit(|b| vec![("size", b.int(4))]);
    let classes = compile(&mut unit).expect("annotated class compiles");
    let user = class(&classes, "p/User");
    match user.attribute("RuntimeInvisibleAnnotations") {
        Some(Attribute::RuntimeInvisibleAnnotations(list)) => {
            assert_eq!(list[0].type_descriptor, "Lp/Config;");
            assert_eq!(list[0].elements[0].0, "size");
        }
        other => panic!("unexpected {:?}", other),
    }
    let config = class(&classes, "p/Config");
    assert_eq!(
        config.access_flags,
        ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT | ACC_ANNOTATION
    );
}

#[test]
fn test_classes_are_written_to_disk() {
    let mut unit = list_unit(3);
    compile(&mut unit).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let written = unit.write_classes(dir.path()).unwrap();
    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with("p/Data.class"));
    let bytes = std::fs::read(&written[0]).unwrap();
    assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
    assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), JAVA_1_5);
}
