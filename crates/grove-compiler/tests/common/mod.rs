//! Helpers shared by the pipeline tests: compile a unit and look inside the
//! decoded class files

#![allow(dead_code)]

use grove_classfile::constants::MemberRef;
use grove_classfile::{ClassFile, Constant, Opcode};
use grove_compiler::{CompileResult, CompileUnit, Compiler, CompilerConfig};

pub fn compile(unit: &mut CompileUnit) -> CompileResult<Vec<ClassFile>> {
    compile_with(CompilerConfig::default(), unit)
}

/// Route pass logs to the test output; `RUST_LOG=grove_compiler=trace` shows them
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn compile_with(config: CompilerConfig, unit: &mut CompileUnit) -> CompileResult<Vec<ClassFile>> {
    init_tracing();
    let classes = Compiler::new(config).compile(unit)?;
    Ok(classes
        .iter()
        .map(|c| ClassFile::decode(&c.bytes).expect("generated class decodes"))
        .collect())
}

pub fn class<'a>(classes: &'a [ClassFile], internal: &str) -> &'a ClassFile {
    classes
        .iter()
        .find(|c| c.this_class == internal)
        .unwrap_or_else(|| panic!("no class {}", internal))
}

/// `(offset, opcode)` of every instruction
pub fn instructions(code: &[u8]) -> Vec<(usize, Opcode)> {
    let mut out = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let op = Opcode::from_u8(code[pc]).expect("known opcode");
        out.push((pc, op));
        pc += 1 + op.operand_width().expect("fixed-width instruction");
    }
    out
}

fn operand(code: &[u8], pc: usize) -> u16 {
    u16::from_be_bytes([code[pc + 1], code[pc + 2]])
}

/// Member references used by `method` with one of `opcodes`, in code order
pub fn member_refs<'a>(class: &'a ClassFile, name: &str, opcodes: &[Opcode]) -> Vec<MemberRef<'a>> {
    let mut out = Vec::new();
    for method in class.methods_named(name) {
        let Some(code) = method.code() else { continue };
        for (pc, op) in instructions(&code.code) {
            if opcodes.contains(&op) {
                let index = operand(&code.code, pc);
                out.push(class.pool.get_member_ref(index).expect("member reference"));
            }
        }
    }
    out
}

/// `owner.name` of every call in `method`
pub fn calls(class: &ClassFile, name: &str) -> Vec<String> {
    use Opcode::*;
    member_refs(class, name, &[Invokevirtual, Invokespecial, Invokestatic, Invokeinterface])
        .into_iter()
        .map(|r| format!("{}.{}", r.class, r.name))
        .collect()
}

/// String constants loaded by `method`, in code order
pub fn ldc_strings(class: &ClassFile, name: &str) -> Vec<String> {
    let mut out = Vec::new();
    for method in class.methods_named(name) {
        let Some(code) = method.code() else { continue };
        for (pc, op) in instructions(&code.code) {
            let index = match op {
                Opcode::Ldc => code.code[pc + 1] as u16,
                Opcode::LdcW => operand(&code.code, pc),
                _ => continue,
            };
            if let Some(Constant::String(utf8)) = class.pool.get(index) {
                out.extend(class.pool.get_utf8(*utf8).map(str::to_string));
            }
        }
    }
    out
}
