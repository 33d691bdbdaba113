//! Instruction encoding and big-endian decoding
//!
//! `CodeWriter` builds a method's instruction stream with forward-branch
//! labels; `ByteReader` walks any class file structure.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur while decoding class file bytes
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of input
    #[error("Unexpected end of input at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid modified UTF-8
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#x} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// Invalid constant pool tag
    #[error("Invalid constant pool tag {0} at offset {1}")]
    InvalidTag(u8, usize),

    /// Reference to a constant pool entry of the wrong kind
    #[error("Bad constant pool reference {0}")]
    BadConstantRef(u16),
}

/// Errors raised while assembling code
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A branch target is too far away for a 16-bit offset
    #[error("Branch offset {offset} at {at} does not fit in 16 bits")]
    BranchOffsetOverflow { at: usize, offset: i64 },

    /// A label was used but never placed
    #[error("Label {0} was never placed")]
    UnplacedLabel(u32),

    /// A local slot index exceeds the encodable range
    #[error("Local slot {0} exceeds 255 and wide instructions are not emitted")]
    SlotOutOfRange(u16),
}

/// Branch target placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// A branch awaiting its target
#[derive(Debug, Clone, Copy)]
struct Fixup {
    /// Offset of the branch opcode
    instruction: usize,
    /// Offset of the 16-bit operand
    operand: usize,
    label: Label,
}

/// Code writer for one method body
#[derive(Debug, Default)]
pub struct CodeWriter {
    buffer: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

impl CodeWriter {
    /// Create a new code writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current code buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the current offset (length of code)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (big-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Emit a 16-bit signed integer (big-endian)
    pub fn emit_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit an opcode with a 16-bit constant pool operand
    pub fn emit_with_index(&mut self, opcode: Opcode, index: u16) {
        self.emit_opcode(opcode);
        self.emit_u16(index);
    }

    // ===== Constants =====

    /// Emit the shortest instruction pushing an int constant, falling back
    /// to the given pool index for values outside the `sipush` range
    pub fn emit_int(&mut self, value: i32, pool_index: impl FnOnce() -> u16) {
        match value {
            -1..=5 => {
                let op = Opcode::from_u8((Opcode::Iconst0.to_u8() as i32 + value) as u8)
                    .unwrap_or(Opcode::Iconst0);
                self.emit_opcode(op);
            }
            -128..=127 => {
                self.emit_opcode(Opcode::Bipush);
                self.emit_u8(value as i8 as u8);
            }
            -32768..=32767 => {
                self.emit_opcode(Opcode::Sipush);
                self.emit_i16(value as i16);
            }
            _ => self.emit_ldc(pool_index()),
        }
    }

    /// Emit `ldc` or `ldc_w` depending on the pool index
    pub fn emit_ldc(&mut self, index: u16) {
        if index <= u8::MAX as u16 {
            self.emit_opcode(Opcode::Ldc);
            self.emit_u8(index as u8);
        } else {
            self.emit_with_index(Opcode::LdcW, index);
        }
    }

    // ===== Locals =====

    /// Emit a local load or store, using the `_0`..`_3` forms when possible
    ///
    /// `base` is the long form (`iload`, `astore`, ...).
    pub fn emit_local(&mut self, base: Opcode, slot: u16) -> Result<(), EncodeError> {
        let (short_base, long) = match base {
            Opcode::Iload => (Opcode::Iload0, true),
            Opcode::Lload => (Opcode::Lload0, true),
            Opcode::Fload => (Opcode::Fload0, true),
            Opcode::Dload => (Opcode::Dload0, true),
            Opcode::Aload => (Opcode::Aload0, true),
            Opcode::Istore => (Opcode::Istore0, true),
            Opcode::Lstore => (Opcode::Lstore0, true),
            Opcode::Fstore => (Opcode::Fstore0, true),
            Opcode::Dstore => (Opcode::Dstore0, true),
            Opcode::Astore => (Opcode::Astore0, true),
            other => (other, false),
        };
        if long && slot <= 3 {
            if let Some(op) = Opcode::from_u8(short_base.to_u8() + slot as u8) {
                self.emit_opcode(op);
                return Ok(());
            }
        }
        if slot > u8::MAX as u16 {
            return Err(EncodeError::SlotOutOfRange(slot));
        }
        self.emit_opcode(base);
        self.emit_u8(slot as u8);
        Ok(())
    }

    // ===== Labels & Branches =====

    /// Allocate a new, unplaced label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label((self.labels.len() - 1) as u32)
    }

    /// Bind a label to the current offset
    pub fn place_label(&mut self, label: Label) {
        if let Some(slot) = self.labels.get_mut(label.0 as usize) {
            *slot = Some(self.buffer.len());
        }
    }

    /// Offset a label was bound to, if it has been placed
    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels.get(label.0 as usize).copied().flatten()
    }

    /// Emit a 16-bit branch to a label, patched in `finish`
    pub fn emit_branch(&mut self, opcode: Opcode, label: Label) {
        let instruction = self.buffer.len();
        self.emit_opcode(opcode);
        let operand = self.buffer.len();
        self.emit_i16(0);
        self.fixups.push(Fixup {
            instruction,
            operand,
            label,
        });
    }

    /// Resolve all branches and return the finished code
    pub fn finish(mut self) -> Result<Vec<u8>, EncodeError> {
        for fixup in std::mem::take(&mut self.fixups) {
            let target = self
                .label_offset(fixup.label)
                .ok_or(EncodeError::UnplacedLabel(fixup.label.0))?;
            let offset = target as i64 - fixup.instruction as i64;
            let offset = i16::try_from(offset).map_err(|_| EncodeError::BranchOffsetOverflow {
                at: fixup.instruction,
                offset,
            })?;
            self.buffer[fixup.operand..fixup.operand + 2].copy_from_slice(&offset.to_be_bytes());
        }
        Ok(self.buffer)
    }
}

/// Big-endian reader over class file bytes
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a new reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .buffer
            .get(self.position)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        self.position += 1;
        Ok(byte)
    }

    /// Read a 16-bit unsigned integer
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_array::<2>()?;
        Ok(u16::from_be_bytes(bytes))
    }

    /// Read a 16-bit signed integer
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        let bytes = self.read_array::<2>()?;
        Ok(i16::from_be_bytes(bytes))
    }

    /// Read a 32-bit unsigned integer
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_array::<4>()?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Read a 64-bit unsigned integer
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_array::<8>()?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Read a byte slice
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let slice = &self.buffer[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let slice = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_constant_forms() {
        let mut writer = CodeWriter::new();
        writer.emit_int(-1, || 0);
        writer.emit_int(5, || 0);
        writer.emit_int(100, || 0);
        writer.emit_int(1000, || 0);
        writer.emit_int(100_000, || 7);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], Opcode::IconstM1.to_u8());
        assert_eq!(bytes[1], Opcode::Iconst5.to_u8());
        assert_eq!(&bytes[2..4], &[Opcode::Bipush.to_u8(), 100]);
        assert_eq!(bytes[4], Opcode::Sipush.to_u8());
        assert_eq!(i16::from_be_bytes([bytes[5], bytes[6]]), 1000);
        assert_eq!(&bytes[7..9], &[Opcode::Ldc.to_u8(), 7]);
    }

    #[test]
    fn test_local_short_forms() {
        let mut writer = CodeWriter::new();
        writer.emit_local(Opcode::Aload, 0).unwrap();
        writer.emit_local(Opcode::Istore, 3).unwrap();
        writer.emit_local(Opcode::Dload, 9).unwrap();

        assert_eq!(
            writer.buffer(),
            &[
                Opcode::Aload0.to_u8(),
                Opcode::Istore3.to_u8(),
                Opcode::Dload.to_u8(),
                9
            ]
        );
        assert_eq!(
            writer.emit_local(Opcode::Aload, 300),
            Err(EncodeError::SlotOutOfRange(300))
        );
    }

    #[test]
    fn test_forward_and_backward_branches() {
        let mut writer = CodeWriter::new();
        let top = writer.new_label();
        let end = writer.new_label();
        writer.place_label(top);
        writer.emit_opcode(Opcode::Iconst0);
        writer.emit_branch(Opcode::Ifeq, end);
        writer.emit_branch(Opcode::Goto, top);
        writer.place_label(end);
        writer.emit_opcode(Opcode::Return);

        let code = writer.finish().unwrap();
        // ifeq at 1 jumps to 7
        assert_eq!(i16::from_be_bytes([code[2], code[3]]), 6);
        // goto at 4 jumps back to 0
        assert_eq!(i16::from_be_bytes([code[5], code[6]]), -4);
    }

    #[test]
    fn test_unplaced_label() {
        let mut writer = CodeWriter::new();
        let label = writer.new_label();
        writer.emit_branch(Opcode::Goto, label);
        assert_eq!(writer.finish(), Err(EncodeError::UnplacedLabel(0)));
    }

    #[test]
    fn test_reader_bounds_checking() {
        let bytes = [0x01, 0x02, 0x03];
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert!(reader.read_u16().is_err());
        assert_eq!(reader.read_u8().unwrap(), 0x03);
        assert!(!reader.has_more());
    }
}
