//! Instruction-level stack verification
//!
//! Walks every reachable path through a method body, tracking operand stack
//! depth in slots. Produces `max_stack` and rejects code whose depth
//! disagrees at a merge point, underflows, or runs off the end.

use crate::attribute::ExceptionTableEntry;
use crate::constants::{Constant, ConstantPool};
use crate::descriptor::{FieldType, MethodDescriptor};
use crate::opcode::Opcode;
use thiserror::Error;

/// Bytecode verification errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Invalid opcode
    #[error("Invalid opcode {opcode:#x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },

    /// Instruction this verifier does not model
    #[error("Unsupported instruction {0} at offset {1}")]
    Unsupported(&'static str, usize),

    /// Stack underflow
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),

    /// Two paths reach the same instruction with different depths
    #[error("Inconsistent stack depth at offset {offset}: {expected} vs {found}")]
    InconsistentDepth {
        offset: usize,
        expected: u32,
        found: u32,
    },

    /// Invalid jump target
    #[error("Invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget { target: i64, offset: usize },

    /// Invalid constant pool reference
    #[error("Invalid constant pool reference: index {index} at offset {offset}")]
    InvalidConstantRef { index: u16, offset: usize },

    /// Execution falls off end
    #[error("Execution falls off end of method at offset {0}")]
    FallOffEnd(usize),

    /// Stack exceeds 65535 slots
    #[error("Stack overflow at offset {0} (depth: {1})")]
    StackOverflow(usize, u32),
}

/// Compute `max_stack` for a method body
///
/// `handlers` seeds each exception handler with a depth of one (the thrown
/// reference).
pub fn compute_max_stack(
    code: &[u8],
    pool: &ConstantPool,
    handlers: &[ExceptionTableEntry],
) -> Result<u16, VerifyError> {
    if code.is_empty() {
        return Ok(0);
    }
    let mut depth_at: Vec<Option<u32>> = vec![None; code.len()];
    let mut worklist: Vec<(usize, u32)> = vec![(0, 0)];
    for handler in handlers {
        worklist.push((handler.handler_pc as usize, 1));
    }
    let mut max = 0u32;

    while let Some((mut pc, mut depth)) = worklist.pop() {
        loop {
            if pc >= code.len() {
                return Err(VerifyError::FallOffEnd(pc));
            }
            match depth_at[pc] {
                Some(seen) if seen == depth => break,
                Some(seen) => {
                    return Err(VerifyError::InconsistentDepth {
                        offset: pc,
                        expected: seen,
                        found: depth,
                    })
                }
                None => depth_at[pc] = Some(depth),
            }
            // the depth on entry counts even if the instruction only pops
            max = max.max(depth);

            let byte = code[pc];
            let opcode = Opcode::from_u8(byte).ok_or(VerifyError::InvalidOpcode {
                opcode: byte,
                offset: pc,
            })?;
            let width = opcode
                .operand_width()
                .ok_or(VerifyError::Unsupported(opcode.name(), pc))?;
            if pc + 1 + width > code.len() {
                return Err(VerifyError::FallOffEnd(pc));
            }
            let operands = &code[pc + 1..pc + 1 + width];
            let (pops, pushes) = stack_effect(opcode, operands, pool, pc)?;
            if pops > depth {
                return Err(VerifyError::StackUnderflow(pc));
            }
            depth = depth - pops + pushes;
            max = max.max(depth);
            if max > u16::MAX as u32 {
                return Err(VerifyError::StackOverflow(pc, max));
            }

            if opcode.is_branch() {
                let offset = i16::from_be_bytes([operands[0], operands[1]]) as i64;
                let target = pc as i64 + offset;
                if target < 0 || target as usize >= code.len() {
                    return Err(VerifyError::InvalidJumpTarget { target, offset: pc });
                }
                if opcode == Opcode::Goto {
                    pc = target as usize;
                    continue;
                }
                worklist.push((target as usize, depth));
            }
            if opcode.is_terminator() {
                break;
            }
            pc += 1 + width;
        }
    }
    tracing::trace!(max_stack = max, code_len = code.len(), "stack verified");
    Ok(max as u16)
}

fn read_index(operands: &[u8]) -> u16 {
    u16::from_be_bytes([operands[0], operands[1]])
}

fn member_descriptor<'a>(pool: &'a ConstantPool, index: u16, pc: usize) -> Result<&'a str, VerifyError> {
    pool.get_member_ref(index)
        .map(|m| m.descriptor)
        .ok_or(VerifyError::InvalidConstantRef { index, offset: pc })
}

/// `(pops, pushes)` in slots for one instruction
fn stack_effect(
    opcode: Opcode,
    operands: &[u8],
    pool: &ConstantPool,
    pc: usize,
) -> Result<(u32, u32), VerifyError> {
    use Opcode::*;
    let bad_ref = |index: u16| VerifyError::InvalidConstantRef { index, offset: pc };
    let effect = match opcode {
        Nop | Iinc | Goto | Return => (0, 0),
        AconstNull | IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5
        | Fconst0 | Fconst1 | Fconst2 | Bipush | Sipush => (0, 1),
        Lconst0 | Lconst1 | Dconst0 | Dconst1 => (0, 2),
        Ldc | LdcW => {
            let index = if opcode == Ldc {
                operands[0] as u16
            } else {
                read_index(operands)
            };
            match pool.get(index) {
                Some(Constant::Integer(_) | Constant::Float(_) | Constant::String(_) | Constant::Class(_)) => (0, 1),
                _ => return Err(bad_ref(index)),
            }
        }
        Ldc2W => {
            let index = read_index(operands);
            match pool.get(index) {
                Some(Constant::Long(_) | Constant::Double(_)) => (0, 2),
                _ => return Err(bad_ref(index)),
            }
        }
        Iload | Fload | Aload | Iload0 | Iload1 | Iload2 | Iload3 | Fload0 | Fload1 | Fload2
        | Fload3 | Aload0 | Aload1 | Aload2 | Aload3 => (0, 1),
        Lload | Dload | Lload0 | Lload1 | Lload2 | Lload3 | Dload0 | Dload1 | Dload2 | Dload3 => {
            (0, 2)
        }
        Iaload | Faload | Aaload | Baload | Caload | Saload => (2, 1),
        Laload | Daload => (2, 2),
        Istore | Fstore | Astore | Istore0 | Istore1 | Istore2 | Istore3 | Fstore0 | Fstore1
        | Fstore2 | Fstore3 | Astore0 | Astore1 | Astore2 | Astore3 => (1, 0),
        Lstore | Dstore | Lstore0 | Lstore1 | Lstore2 | Lstore3 | Dstore0 | Dstore1 | Dstore2
        | Dstore3 => (2, 0),
        Iastore | Fastore | Aastore | Bastore | Castore | Sastore => (3, 0),
        Lastore | Dastore => (4, 0),
        Pop => (1, 0),
        Pop2 => (2, 0),
        Dup => (1, 2),
        DupX1 => (2, 3),
        DupX2 => (3, 4),
        Dup2 => (2, 4),
        Dup2X1 => (3, 5),
        Dup2X2 => (4, 6),
        Swap => (2, 2),
        Iadd | Fadd | Isub | Fsub | Imul | Fmul | Idiv | Fdiv | Irem | Frem | Ishl | Ishr
        | Iushr | Iand | Ior | Ixor => (2, 1),
        Ladd | Dadd | Lsub | Dsub | Lmul | Dmul | Ldiv | Ddiv | Lrem | Drem | Land | Lor
        | Lxor => (4, 2),
        Lshl | Lshr | Lushr => (3, 2),
        Ineg | Fneg => (1, 1),
        Lneg | Dneg => (2, 2),
        I2f | F2i | I2b | I2c | I2s => (1, 1),
        I2l | I2d | F2l | F2d => (1, 2),
        L2i | L2f | D2i | D2f => (2, 1),
        L2d | D2l => (2, 2),
        Lcmp | Dcmpl | Dcmpg => (4, 1),
        Fcmpl | Fcmpg => (2, 1),
        Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | Ifnull | Ifnonnull => (1, 0),
        IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq | IfAcmpne => {
            (2, 0)
        }
        Ireturn | Freturn | Areturn | Athrow | Monitorenter | Monitorexit => (1, 0),
        Lreturn | Dreturn => (2, 0),
        Getstatic | Putstatic | Getfield | Putfield => {
            let index = read_index(operands);
            let slots = FieldType::parse(member_descriptor(pool, index, pc)?)
                .map_err(|_| bad_ref(index))?
                .slots() as u32;
            match opcode {
                Getstatic => (0, slots),
                Putstatic => (slots, 0),
                Getfield => (1, slots),
                _ => (1 + slots, 0),
            }
        }
        Invokevirtual | Invokespecial | Invokestatic | Invokeinterface => {
            let index = read_index(operands);
            let desc = MethodDescriptor::parse(member_descriptor(pool, index, pc)?)
                .map_err(|_| bad_ref(index))?;
            let receiver = if opcode == Invokestatic { 0 } else { 1 };
            (desc.arg_slots() as u32 + receiver, desc.return_slots() as u32)
        }
        New => (0, 1),
        Newarray | Anewarray | Arraylength | Checkcast | Instanceof => (1, 1),
        Multianewarray => (operands[2] as u32, 1),
        Invokedynamic | Jsr | JsrW | Ret | GotoW | Tableswitch | Lookupswitch | Wide => {
            return Err(VerifyError::Unsupported(opcode.name(), pc))
        }
    };
    Ok(effect)
}
