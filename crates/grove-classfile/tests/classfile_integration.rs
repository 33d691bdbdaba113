//! Integration tests for class file assembly

use grove_classfile::access::*;
use grove_classfile::{
    compute_max_stack, Annotation, Attribute, ClassFile, CodeAttribute, CodeWriter, ConstElement,
    ElementValue, LineNumber, MemberInfo, Opcode,
};

fn build_getter_class() -> ClassFile {
    let mut class = ClassFile::new("p1/A");
    class.access_flags = ACC_PUBLIC | ACC_SUPER;
    class.fields.push(MemberInfo::new(ACC_PROTECTED, "x", "I"));

    let field = class.pool.field_ref("p1/A", "x", "I").unwrap();
    let mut w = CodeWriter::new();
    w.emit_local(Opcode::Aload, 0).unwrap();
    w.emit_with_index(Opcode::Getfield, field);
    w.emit_opcode(Opcode::Ireturn);
    let code = w.finish().unwrap();
    let max_stack = compute_max_stack(&code, &class.pool, &[]).unwrap();

    let mut getter = MemberInfo::new(ACC_PUBLIC, "getX", "()I");
    getter.attributes.push(Attribute::Code(CodeAttribute {
        max_stack,
        max_locals: 1,
        code,
        exception_table: Vec::new(),
        attributes: vec![Attribute::LineNumberTable(vec![LineNumber {
            start_pc: 0,
            line: 3,
        }])],
    }));
    let mut marker = Annotation::new("Lgroovy/transform/Generated;");
    marker
        .elements
        .push(("value".into(), ElementValue::Const(ConstElement::String("getter".into()))));
    getter
        .attributes
        .push(Attribute::RuntimeVisibleAnnotations(vec![marker]));
    class.methods.push(getter);
    class
}

#[test]
fn test_getter_roundtrip() {
    let bytes = build_getter_class().encode().expect("encode");
    let decoded = ClassFile::decode(&bytes).expect("decode");

    let getter = decoded.method("getX", "()I").expect("getter present");
    let code = getter.code().expect("getter has code");
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.code[0], Opcode::Aload0.to_u8());
    assert_eq!(code.code[1], Opcode::Getfield.to_u8());

    match &code.attributes[0] {
        Attribute::LineNumberTable(lines) => assert_eq!(lines[0].line, 3),
        other => panic!("unexpected attribute {:?}", other),
    }
    match getter.attribute("RuntimeVisibleAnnotations") {
        Some(Attribute::RuntimeVisibleAnnotations(list)) => {
            assert_eq!(list[0].type_descriptor, "Lgroovy/transform/Generated;");
        }
        other => panic!("unexpected attribute {:?}", other),
    }
}

#[test]
fn test_max_stack_recomputed_from_decoded_code() {
    let bytes = build_getter_class().encode().unwrap();
    let decoded = ClassFile::decode(&bytes).unwrap();
    let code = decoded.method("getX", "()I").unwrap().code().unwrap();
    let recomputed = compute_max_stack(&code.code, &decoded.pool, &code.exception_table).unwrap();
    assert_eq!(recomputed, code.max_stack);
}

#[test]
fn test_code_too_large_is_rejected() {
    let mut class = ClassFile::new("p/Big");
    let mut method = MemberInfo::new(ACC_STATIC, "big", "()V");
    method.attributes.push(Attribute::Code(CodeAttribute {
        max_stack: 0,
        max_locals: 0,
        code: vec![Opcode::Nop.to_u8(); 70_000],
        exception_table: Vec::new(),
        attributes: Vec::new(),
    }));
    class.methods.push(method);
    assert!(class.encode().is_err());
}
