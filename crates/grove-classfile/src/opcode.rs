//! JVM instruction set
//!
//! Every opcode the class file format defines up to `goto_w`/`jsr_w`,
//! with the metadata the encoder and the stack verifier need: mnemonic,
//! fixed operand width and control-flow classification.

macro_rules! define_opcodes {
    ($( $(#[$doc:meta])* $variant:ident = $value:literal => $mnemonic:literal, )*) => {
        /// JVM opcode enumeration
        ///
        /// All opcodes are single-byte instructions. Operands follow the
        /// opcode byte in big-endian order.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $(#[$doc])* $variant = $value, )*
        }

        impl Opcode {
            /// Convert byte to opcode
            ///
            /// Returns None if the byte does not correspond to a valid opcode.
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $( $value => Some(Self::$variant), )*
                    _ => None,
                }
            }

            /// Mnemonic as printed by `javap`
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $mnemonic, )*
                }
            }
        }
    };
}

define_opcodes! {
    // ===== Constants (0x00-0x14) =====
    /// Do nothing
    Nop = 0x00 => "nop",
    /// Push null
    AconstNull = 0x01 => "aconst_null",
    /// Push int -1
    IconstM1 = 0x02 => "iconst_m1",
    /// Push int 0
    Iconst0 = 0x03 => "iconst_0",
    /// Push int 1
    Iconst1 = 0x04 => "iconst_1",
    /// Push int 2
    Iconst2 = 0x05 => "iconst_2",
    /// Push int 3
    Iconst3 = 0x06 => "iconst_3",
    /// Push int 4
    Iconst4 = 0x07 => "iconst_4",
    /// Push int 5
    Iconst5 = 0x08 => "iconst_5",
    /// Push long 0
    Lconst0 = 0x09 => "lconst_0",
    /// Push long 1
    Lconst1 = 0x0A => "lconst_1",
    /// Push float 0
    Fconst0 = 0x0B => "fconst_0",
    /// Push float 1
    Fconst1 = 0x0C => "fconst_1",
    /// Push float 2
    Fconst2 = 0x0D => "fconst_2",
    /// Push double 0
    Dconst0 = 0x0E => "dconst_0",
    /// Push double 1
    Dconst1 = 0x0F => "dconst_1",
    /// Push sign-extended byte (operand: i8)
    Bipush = 0x10 => "bipush",
    /// Push sign-extended short (operand: i16)
    Sipush = 0x11 => "sipush",
    /// Push constant (operand: u8 pool index)
    Ldc = 0x12 => "ldc",
    /// Push constant (operand: u16 pool index)
    LdcW = 0x13 => "ldc_w",
    /// Push long or double constant (operand: u16 pool index)
    Ldc2W = 0x14 => "ldc2_w",

    // ===== Loads (0x15-0x35) =====
    /// Load int from local (operand: u8 slot)
    Iload = 0x15 => "iload",
    /// Load long from local (operand: u8 slot)
    Lload = 0x16 => "lload",
    /// Load float from local (operand: u8 slot)
    Fload = 0x17 => "fload",
    /// Load double from local (operand: u8 slot)
    Dload = 0x18 => "dload",
    /// Load reference from local (operand: u8 slot)
    Aload = 0x19 => "aload",
    Iload0 = 0x1A => "iload_0",
    Iload1 = 0x1B => "iload_1",
    Iload2 = 0x1C => "iload_2",
    Iload3 = 0x1D => "iload_3",
    Lload0 = 0x1E => "lload_0",
    Lload1 = 0x1F => "lload_1",
    Lload2 = 0x20 => "lload_2",
    Lload3 = 0x21 => "lload_3",
    Fload0 = 0x22 => "fload_0",
    Fload1 = 0x23 => "fload_1",
    Fload2 = 0x24 => "fload_2",
    Fload3 = 0x25 => "fload_3",
    Dload0 = 0x26 => "dload_0",
    Dload1 = 0x27 => "dload_1",
    Dload2 = 0x28 => "dload_2",
    Dload3 = 0x29 => "dload_3",
    Aload0 = 0x2A => "aload_0",
    Aload1 = 0x2B => "aload_1",
    Aload2 = 0x2C => "aload_2",
    Aload3 = 0x2D => "aload_3",
    /// Load int from array
    Iaload = 0x2E => "iaload",
    /// Load long from array
    Laload = 0x2F => "laload",
    /// Load float from array
    Faload = 0x30 => "faload",
    /// Load double from array
    Daload = 0x31 => "daload",
    /// Load reference from array
    Aaload = 0x32 => "aaload",
    /// Load byte or boolean from array
    Baload = 0x33 => "baload",
    /// Load char from array
    Caload = 0x34 => "caload",
    /// Load short from array
    Saload = 0x35 => "saload",

    // ===== Stores (0x36-0x56) =====
    /// Store int into local (operand: u8 slot)
    Istore = 0x36 => "istore",
    /// Store long into local (operand: u8 slot)
    Lstore = 0x37 => "lstore",
    /// Store float into local (operand: u8 slot)
    Fstore = 0x38 => "fstore",
    /// Store double into local (operand: u8 slot)
    Dstore = 0x39 => "dstore",
    /// Store reference into local (operand: u8 slot)
    Astore = 0x3A => "astore",
    Istore0 = 0x3B => "istore_0",
    Istore1 = 0x3C => "istore_1",
    Istore2 = 0x3D => "istore_2",
    Istore3 = 0x3E => "istore_3",
    Lstore0 = 0x3F => "lstore_0",
    Lstore1 = 0x40 => "lstore_1",
    Lstore2 = 0x41 => "lstore_2",
    Lstore3 = 0x42 => "lstore_3",
    Fstore0 = 0x43 => "fstore_0",
    Fstore1 = 0x44 => "fstore_1",
    Fstore2 = 0x45 => "fstore_2",
    Fstore3 = 0x46 => "fstore_3",
    Dstore0 = 0x47 => "dstore_0",
    Dstore1 = 0x48 => "dstore_1",
    Dstore2 = 0x49 => "dstore_2",
    Dstore3 = 0x4A => "dstore_3",
    Astore0 = 0x4B => "astore_0",
    Astore1 = 0x4C => "astore_1",
    Astore2 = 0x4D => "astore_2",
    Astore3 = 0x4E => "astore_3",
    /// Store into int array
    Iastore = 0x4F => "iastore",
    /// Store into long array
    Lastore = 0x50 => "lastore",
    /// Store into float array
    Fastore = 0x51 => "fastore",
    /// Store into double array
    Dastore = 0x52 => "dastore",
    /// Store into reference array
    Aastore = 0x53 => "aastore",
    /// Store into byte or boolean array
    Bastore = 0x54 => "bastore",
    /// Store into char array
    Castore = 0x55 => "castore",
    /// Store into short array
    Sastore = 0x56 => "sastore",

    // ===== Stack (0x57-0x5F) =====
    Pop = 0x57 => "pop",
    Pop2 = 0x58 => "pop2",
    Dup = 0x59 => "dup",
    DupX1 = 0x5A => "dup_x1",
    DupX2 = 0x5B => "dup_x2",
    Dup2 = 0x5C => "dup2",
    Dup2X1 = 0x5D => "dup2_x1",
    Dup2X2 = 0x5E => "dup2_x2",
    Swap = 0x5F => "swap",

    // ===== Arithmetic (0x60-0x84) =====
    Iadd = 0x60 => "iadd",
    Ladd = 0x61 => "ladd",
    Fadd = 0x62 => "fadd",
    Dadd = 0x63 => "dadd",
    Isub = 0x64 => "isub",
    Lsub = 0x65 => "lsub",
    Fsub = 0x66 => "fsub",
    Dsub = 0x67 => "dsub",
    Imul = 0x68 => "imul",
    Lmul = 0x69 => "lmul",
    Fmul = 0x6A => "fmul",
    Dmul = 0x6B => "dmul",
    Idiv = 0x6C => "idiv",
    Ldiv = 0x6D => "ldiv",
    Fdiv = 0x6E => "fdiv",
    Ddiv = 0x6F => "ddiv",
    Irem = 0x70 => "irem",
    Lrem = 0x71 => "lrem",
    Frem = 0x72 => "frem",
    Drem = 0x73 => "drem",
    Ineg = 0x74 => "ineg",
    Lneg = 0x75 => "lneg",
    Fneg = 0x76 => "fneg",
    Dneg = 0x77 => "dneg",
    Ishl = 0x78 => "ishl",
    Lshl = 0x79 => "lshl",
    Ishr = 0x7A => "ishr",
    Lshr = 0x7B => "lshr",
    Iushr = 0x7C => "iushr",
    Lushr = 0x7D => "lushr",
    Iand = 0x7E => "iand",
    Land = 0x7F => "land",
    Ior = 0x80 => "ior",
    Lor = 0x81 => "lor",
    Ixor = 0x82 => "ixor",
    Lxor = 0x83 => "lxor",
    /// Increment local (operands: u8 slot, i8 delta)
    Iinc = 0x84 => "iinc",

    // ===== Conversions (0x85-0x93) =====
    I2l = 0x85 => "i2l",
    I2f = 0x86 => "i2f",
    I2d = 0x87 => "i2d",
    L2i = 0x88 => "l2i",
    L2f = 0x89 => "l2f",
    L2d = 0x8A => "l2d",
    F2i = 0x8B => "f2i",
    F2l = 0x8C => "f2l",
    F2d = 0x8D => "f2d",
    D2i = 0x8E => "d2i",
    D2l = 0x8F => "d2l",
    D2f = 0x90 => "d2f",
    I2b = 0x91 => "i2b",
    I2c = 0x92 => "i2c",
    I2s = 0x93 => "i2s",

    // ===== Comparisons (0x94-0xA6) =====
    Lcmp = 0x94 => "lcmp",
    Fcmpl = 0x95 => "fcmpl",
    Fcmpg = 0x96 => "fcmpg",
    Dcmpl = 0x97 => "dcmpl",
    Dcmpg = 0x98 => "dcmpg",
    /// Branch if int == 0 (operand: i16 offset)
    Ifeq = 0x99 => "ifeq",
    Ifne = 0x9A => "ifne",
    Iflt = 0x9B => "iflt",
    Ifge = 0x9C => "ifge",
    Ifgt = 0x9D => "ifgt",
    Ifle = 0x9E => "ifle",
    /// Branch if ints are equal (operand: i16 offset)
    IfIcmpeq = 0x9F => "if_icmpeq",
    IfIcmpne = 0xA0 => "if_icmpne",
    IfIcmplt = 0xA1 => "if_icmplt",
    IfIcmpge = 0xA2 => "if_icmpge",
    IfIcmpgt = 0xA3 => "if_icmpgt",
    IfIcmple = 0xA4 => "if_icmple",
    /// Branch if references are equal (operand: i16 offset)
    IfAcmpeq = 0xA5 => "if_acmpeq",
    IfAcmpne = 0xA6 => "if_acmpne",

    // ===== Control (0xA7-0xB1) =====
    /// Unconditional branch (operand: i16 offset)
    Goto = 0xA7 => "goto",
    Jsr = 0xA8 => "jsr",
    Ret = 0xA9 => "ret",
    Tableswitch = 0xAA => "tableswitch",
    Lookupswitch = 0xAB => "lookupswitch",
    Ireturn = 0xAC => "ireturn",
    Lreturn = 0xAD => "lreturn",
    Freturn = 0xAE => "freturn",
    Dreturn = 0xAF => "dreturn",
    Areturn = 0xB0 => "areturn",
    /// Return void
    Return = 0xB1 => "return",

    // ===== References (0xB2-0xC3) =====
    /// Get static field (operand: u16 field ref)
    Getstatic = 0xB2 => "getstatic",
    /// Set static field (operand: u16 field ref)
    Putstatic = 0xB3 => "putstatic",
    /// Get instance field (operand: u16 field ref)
    Getfield = 0xB4 => "getfield",
    /// Set instance field (operand: u16 field ref)
    Putfield = 0xB5 => "putfield",
    /// Invoke instance method (operand: u16 method ref)
    Invokevirtual = 0xB6 => "invokevirtual",
    /// Invoke constructor, private or super method (operand: u16 method ref)
    Invokespecial = 0xB7 => "invokespecial",
    /// Invoke static method (operand: u16 method ref)
    Invokestatic = 0xB8 => "invokestatic",
    /// Invoke interface method (operands: u16 ref, u8 count, u8 zero)
    Invokeinterface = 0xB9 => "invokeinterface",
    /// Invoke dynamic call site (operands: u16 ref, u16 zero)
    Invokedynamic = 0xBA => "invokedynamic",
    /// Allocate object (operand: u16 class ref)
    New = 0xBB => "new",
    /// Allocate primitive array (operand: u8 array type)
    Newarray = 0xBC => "newarray",
    /// Allocate reference array (operand: u16 class ref)
    Anewarray = 0xBD => "anewarray",
    Arraylength = 0xBE => "arraylength",
    Athrow = 0xBF => "athrow",
    /// Checked cast (operand: u16 class ref)
    Checkcast = 0xC0 => "checkcast",
    /// Type test (operand: u16 class ref)
    Instanceof = 0xC1 => "instanceof",
    Monitorenter = 0xC2 => "monitorenter",
    Monitorexit = 0xC3 => "monitorexit",

    // ===== Extended (0xC4-0xC9) =====
    Wide = 0xC4 => "wide",
    /// Allocate multi-dimensional array (operands: u16 class ref, u8 dimensions)
    Multianewarray = 0xC5 => "multianewarray",
    /// Branch if null (operand: i16 offset)
    Ifnull = 0xC6 => "ifnull",
    /// Branch if not null (operand: i16 offset)
    Ifnonnull = 0xC7 => "ifnonnull",
    GotoW = 0xC8 => "goto_w",
    JsrW = 0xC9 => "jsr_w",
}

/// `newarray` element type codes
pub mod array_type {
    pub const T_BOOLEAN: u8 = 4;
    pub const T_CHAR: u8 = 5;
    pub const T_FLOAT: u8 = 6;
    pub const T_DOUBLE: u8 = 7;
    pub const T_BYTE: u8 = 8;
    pub const T_SHORT: u8 = 9;
    pub const T_INT: u8 = 10;
    pub const T_LONG: u8 = 11;
}

impl Opcode {
    /// Convert opcode to byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Width of the fixed operand bytes following the opcode.
    ///
    /// Returns `None` for the variable-length instructions (`tableswitch`,
    /// `lookupswitch`, `wide`).
    pub fn operand_width(self) -> Option<usize> {
        use Opcode::*;
        Some(match self {
            Bipush | Ldc | Iload | Lload | Fload | Dload | Aload | Istore | Lstore | Fstore
            | Dstore | Astore | Ret | Newarray => 1,
            Sipush | LdcW | Ldc2W | Iinc | Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | IfIcmpeq
            | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq | IfAcmpne
            | Goto | Jsr | Getstatic | Putstatic | Getfield | Putfield | Invokevirtual
            | Invokespecial | Invokestatic | New | Anewarray | Checkcast | Instanceof
            | Ifnull | Ifnonnull => 2,
            Multianewarray => 3,
            Invokeinterface | Invokedynamic | GotoW | JsrW => 4,
            Tableswitch | Lookupswitch | Wide => return None,
            _ => 0,
        })
    }

    /// Check if opcode is a conditional or unconditional branch with a
    /// 16-bit offset
    pub fn is_branch(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Ifeq | Ifne
                | Iflt
                | Ifge
                | Ifgt
                | Ifle
                | IfIcmpeq
                | IfIcmpne
                | IfIcmplt
                | IfIcmpge
                | IfIcmpgt
                | IfIcmple
                | IfAcmpeq
                | IfAcmpne
                | Goto
                | Ifnull
                | Ifnonnull
        )
    }

    /// Check if opcode returns from the method
    pub fn is_return(self) -> bool {
        use Opcode::*;
        matches!(self, Ireturn | Lreturn | Freturn | Dreturn | Areturn | Return)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return() || matches!(self, Opcode::Goto | Opcode::GotoW | Opcode::Athrow)
    }

    /// Check if opcode is a method invocation
    pub fn is_invoke(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Invokevirtual | Invokespecial | Invokestatic | Invokeinterface | Invokedynamic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0x00..=0xC9u8 {
            let op = Opcode::from_u8(byte).expect("every byte up to jsr_w is defined");
            assert_eq!(op.to_u8(), byte);
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0xCA), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::Aload0.name(), "aload_0");
        assert_eq!(Opcode::Invokespecial.name(), "invokespecial");
        assert_eq!(Opcode::IfIcmpge.name(), "if_icmpge");
    }

    #[test]
    fn test_operand_width() {
        assert_eq!(Opcode::Nop.operand_width(), Some(0));
        assert_eq!(Opcode::Bipush.operand_width(), Some(1));
        assert_eq!(Opcode::Invokestatic.operand_width(), Some(2));
        assert_eq!(Opcode::Multianewarray.operand_width(), Some(3));
        assert_eq!(Opcode::Invokeinterface.operand_width(), Some(4));
        assert_eq!(Opcode::Tableswitch.operand_width(), None);
    }

    #[test]
    fn test_terminator_detection() {
        assert!(Opcode::Areturn.is_terminator());
        assert!(Opcode::Athrow.is_terminator());
        assert!(Opcode::Goto.is_terminator());
        assert!(!Opcode::Ifeq.is_terminator());
        assert!(Opcode::Ifeq.is_branch());
    }
}
