//! Representation of the Dalvik bytecodes once operands have been decoded and every
//! constant pool reference resolved.
//!
//! Format variants that only differ by register width (`move`, `move/from16`, `move/16`) or
//! literal width (`const/4`, `const/16`, ...) collapse into one variant; `/range` invokes carry
//! their expanded register list; `/2addr` arithmetic is normalized to three registers.

use std::fmt;

use crate::jvm::Label;
use crate::types::{MethodSignature, TypeSignature};

/// Register class of a move, return or move-result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Single,
    Wide,
    Object,
}

impl MoveKind {
    fn suffix(&self) -> &'static str {
        match self {
            MoveKind::Single => "",
            MoveKind::Wide => "-wide",
            MoveKind::Object => "-object",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareType {
    LessThanFloat,
    GreaterThanFloat,
    LessThanDouble,
    GreaterThanDouble,
    Long,
}

impl CompareType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LessThanFloat => "cmpl-float",
            Self::GreaterThanFloat => "cmpg-float",
            Self::LessThanDouble => "cmpl-double",
            Self::GreaterThanDouble => "cmpg-double",
            Self::Long => "cmp-long",
        }
    }

    pub fn operand_type(&self) -> TypeSignature {
        match self {
            Self::LessThanFloat | Self::GreaterThanFloat => TypeSignature::Float,
            Self::LessThanDouble | Self::GreaterThanDouble => TypeSignature::Double,
            Self::Long => TypeSignature::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    Equal,
    NotEqual,
    LessThan,
    GreaterThanOrEqual,
    GreaterThan,
    LessThanOrEqual,
}

impl TestType {
    pub(crate) const ALL: [TestType; 6] = [
        TestType::Equal,
        TestType::NotEqual,
        TestType::LessThan,
        TestType::GreaterThanOrEqual,
        TestType::GreaterThan,
        TestType::LessThanOrEqual,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Equal => "if-eq",
            Self::NotEqual => "if-ne",
            Self::LessThan => "if-lt",
            Self::GreaterThanOrEqual => "if-ge",
            Self::GreaterThan => "if-gt",
            Self::LessThanOrEqual => "if-le",
        }
    }

    /// Only equality tests are meaningful on references.
    pub fn is_equality(&self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }
}

/// Value class of an array, instance field or static field access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Single,
    Wide,
    Object,
    Boolean,
    Byte,
    Char,
    Short,
}

impl AccessType {
    pub(crate) const ALL: [AccessType; 7] = [
        AccessType::Single,
        AccessType::Wide,
        AccessType::Object,
        AccessType::Boolean,
        AccessType::Byte,
        AccessType::Char,
        AccessType::Short,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            Self::Single => "",
            Self::Wide => "-wide",
            Self::Object => "-object",
            Self::Boolean => "-boolean",
            Self::Byte => "-byte",
            Self::Char => "-char",
            Self::Short => "-short",
        }
    }

    /// Element type implied by the opcode alone; `None` when the opcode is width-only
    /// (`aget`, `aget-wide`) or generic (`aget-object`).
    pub fn implied_type(&self) -> Option<TypeSignature> {
        match self {
            Self::Boolean => Some(TypeSignature::Bool),
            Self::Byte => Some(TypeSignature::Byte),
            Self::Char => Some(TypeSignature::Char),
            Self::Short => Some(TypeSignature::Short),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl InvokeKind {
    pub(crate) const ALL: [InvokeKind; 5] = [
        InvokeKind::Virtual,
        InvokeKind::Super,
        InvokeKind::Direct,
        InvokeKind::Static,
        InvokeKind::Interface,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Virtual => "invoke-virtual",
            Self::Super => "invoke-super",
            Self::Direct => "invoke-direct",
            Self::Static => "invoke-static",
            Self::Interface => "invoke-interface",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperation {
    NegateInt,
    NotInt,
    NegateLong,
    NotLong,
    NegateFloat,
    NegateDouble,
    IntToLong,
    IntToFloat,
    IntToDouble,
    LongToInt,
    LongToFloat,
    LongToDouble,
    FloatToInt,
    FloatToLong,
    FloatToDouble,
    DoubleToInt,
    DoubleToLong,
    DoubleToFloat,
    IntToByte,
    IntToChar,
    IntToShort,
}

impl UnaryOperation {
    /// In opcode order starting at 0x7b.
    pub(crate) const ALL: [UnaryOperation; 21] = [
        Self::NegateInt, Self::NotInt, Self::NegateLong, Self::NotLong, Self::NegateFloat, Self::NegateDouble,
        Self::IntToLong, Self::IntToFloat, Self::IntToDouble, Self::LongToInt, Self::LongToFloat, Self::LongToDouble,
        Self::FloatToInt, Self::FloatToLong, Self::FloatToDouble, Self::DoubleToInt, Self::DoubleToLong, Self::DoubleToFloat,
        Self::IntToByte, Self::IntToChar, Self::IntToShort,
    ];

    /// Operand and result types.
    pub fn types(&self) -> (TypeSignature, TypeSignature) {
        use TypeSignature::*;
        match self {
            Self::NegateInt | Self::NotInt => (Int, Int),
            Self::NegateLong | Self::NotLong => (Long, Long),
            Self::NegateFloat => (Float, Float),
            Self::NegateDouble => (Double, Double),
            Self::IntToLong => (Int, Long),
            Self::IntToFloat => (Int, Float),
            Self::IntToDouble => (Int, Double),
            Self::LongToInt => (Long, Int),
            Self::LongToFloat => (Long, Float),
            Self::LongToDouble => (Long, Double),
            Self::FloatToInt => (Float, Int),
            Self::FloatToLong => (Float, Long),
            Self::FloatToDouble => (Float, Double),
            Self::DoubleToInt => (Double, Int),
            Self::DoubleToLong => (Double, Long),
            Self::DoubleToFloat => (Double, Float),
            Self::IntToByte => (Int, Byte),
            Self::IntToChar => (Int, Char),
            Self::IntToShort => (Int, Short),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperation {
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    RemInt,
    AndInt,
    OrInt,
    XorInt,
    ShlInt,
    ShrInt,
    UshrInt,
    AddLong,
    SubLong,
    MulLong,
    DivLong,
    RemLong,
    AndLong,
    OrLong,
    XorLong,
    ShlLong,
    ShrLong,
    UshrLong,
    AddFloat,
    SubFloat,
    MulFloat,
    DivFloat,
    RemFloat,
    AddDouble,
    SubDouble,
    MulDouble,
    DivDouble,
    RemDouble,
}

impl BinaryOperation {
    /// In opcode order starting at 0x90 (and 0xb0 for `/2addr`).
    pub(crate) const ALL: [BinaryOperation; 32] = [
        Self::AddInt, Self::SubInt, Self::MulInt, Self::DivInt, Self::RemInt, Self::AndInt, Self::OrInt, Self::XorInt,
        Self::ShlInt, Self::ShrInt, Self::UshrInt,
        Self::AddLong, Self::SubLong, Self::MulLong, Self::DivLong, Self::RemLong, Self::AndLong, Self::OrLong, Self::XorLong,
        Self::ShlLong, Self::ShrLong, Self::UshrLong,
        Self::AddFloat, Self::SubFloat, Self::MulFloat, Self::DivFloat, Self::RemFloat,
        Self::AddDouble, Self::SubDouble, Self::MulDouble, Self::DivDouble, Self::RemDouble,
    ];

    /// The literal forms (`/lit16`, `/lit8`) in opcode order; `rsub` takes the `SubInt` slot.
    pub(crate) const LIT: [BinaryOperation; 11] = [
        Self::AddInt, Self::SubInt, Self::MulInt, Self::DivInt, Self::RemInt, Self::AndInt, Self::OrInt, Self::XorInt,
        Self::ShlInt, Self::ShrInt, Self::UshrInt,
    ];

    /// Type of both operands and the result. Shift distances are always int.
    pub fn operand_type(&self) -> TypeSignature {
        match *self as u8 {
            0..=10 => TypeSignature::Int,
            11..=21 => TypeSignature::Long,
            22..=26 => TypeSignature::Float,
            _ => TypeSignature::Double,
        }
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, Self::ShlInt | Self::ShrInt | Self::UshrInt | Self::ShlLong | Self::ShrLong | Self::UshrLong)
    }

    pub fn name(&self) -> &'static str {
        const NAMES: [&str; 32] = [
            "add-int", "sub-int", "mul-int", "div-int", "rem-int", "and-int", "or-int", "xor-int", "shl-int", "shr-int", "ushr-int",
            "add-long", "sub-long", "mul-long", "div-long", "rem-long", "and-long", "or-long", "xor-long", "shl-long", "shr-long", "ushr-long",
            "add-float", "sub-float", "mul-float", "div-float", "rem-float",
            "add-double", "sub-double", "mul-double", "div-double", "rem-double",
        ];
        NAMES[*self as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReference {
    pub class: TypeSignature,
    pub name: String,
    pub type_: TypeSignature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodReference {
    pub class: TypeSignature,
    pub name: String,
    pub signature: MethodSignature,
}

/// The contents of a `fill-array-data-payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayData {
    pub element_width: u16,
    pub data: Vec<u8>,
}

impl ArrayData {
    /// Elements as zero-extended little-endian integers.
    pub fn elements(&self) -> Vec<u64> {
        let width = self.element_width.max(1) as usize;
        self.data
            .chunks_exact(width)
            .map(|chunk| chunk.iter().rev().fold(0u64, |acc, b| (acc << 8) | *b as u64))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DexInstruction {
    Nop,
    Move(MoveKind, u16, u16),
    MoveResult(MoveKind, u16),
    MoveException(u16),
    ReturnVoid,
    Return(MoveKind, u16),
    /// `const/4`, `const/16`, `const`, `const/high16` with the literal already shifted
    Const(u16, i32),
    ConstWide(u16, i64),
    ConstString(u16, String),
    ConstClass(u16, TypeSignature),
    MonitorEnter(u16),
    MonitorExit(u16),
    CheckCast(u16, TypeSignature),
    InstanceOf(u16, u16, TypeSignature),
    ArrayLength(u16, u16),
    NewInstance(u16, TypeSignature),
    NewArray(u16, u16, TypeSignature),
    FilledNewArray(Vec<u16>, TypeSignature),
    FillArrayData(u16, ArrayData),
    Throw(u16),
    Goto(Label),
    /// register, first key, targets, fall-through
    PackedSwitch(u16, i32, Vec<Label>, Label),
    SparseSwitch(u16, Vec<(i32, Label)>, Label),
    Compare(CompareType, u16, u16, u16),
    If(TestType, u16, u16, Label),
    IfZ(TestType, u16, Label),
    /// value register, array register, index register
    ArrayGet(AccessType, u16, u16, u16),
    ArrayPut(AccessType, u16, u16, u16),
    /// value register, object register
    InstanceGet(AccessType, u16, u16, FieldReference),
    InstancePut(AccessType, u16, u16, FieldReference),
    StaticGet(AccessType, u16, FieldReference),
    StaticPut(AccessType, u16, FieldReference),
    Invoke(InvokeKind, Vec<u16>, MethodReference),
    Unary(UnaryOperation, u16, u16),
    /// dest, first operand, second operand
    Binary(BinaryOperation, u16, u16, u16),
    BinaryLit(BinaryOperation, u16, u16, i32),
    /// `rsub-int`: dest = literal - src
    ReverseSubLit(u16, u16, i32),
    /// Valid bytecode the rewriter has no stack-machine equivalent for.
    Unsupported(&'static str),
}

fn registers(regs: &[u16]) -> String {
    regs.iter().map(|r| format!("v{}", r)).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for DexInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nop => write!(f, "nop"),
            Self::Move(k, dest, source) => write!(f, "move{} v{}, v{}", k.suffix(), dest, source),
            Self::MoveResult(k, dest) => write!(f, "move-result{} v{}", k.suffix(), dest),
            Self::MoveException(dest) => write!(f, "move-exception v{}", dest),
            Self::ReturnVoid => write!(f, "return-void"),
            Self::Return(k, r) => write!(f, "return{} v{}", k.suffix(), r),
            Self::Const(dest, literal) => write!(f, "const v{}, #{}", dest, literal),
            Self::ConstWide(dest, literal) => write!(f, "const-wide v{}, #{}", dest, literal),
            Self::ConstString(dest, s) => write!(f, "const-string v{}, {:?}", dest, s),
            Self::ConstClass(dest, t) => write!(f, "const-class v{}, {}", dest, t),
            Self::MonitorEnter(reg) => write!(f, "monitor-enter v{}", reg),
            Self::MonitorExit(reg) => write!(f, "monitor-exit v{}", reg),
            Self::CheckCast(reg, t) => write!(f, "check-cast v{}, {}", reg, t),
            Self::InstanceOf(dest, src, t) => write!(f, "instance-of v{}, v{}, {}", dest, src, t),
            Self::ArrayLength(dest, src) => write!(f, "array-length v{}, v{}", dest, src),
            Self::NewInstance(dest, t) => write!(f, "new-instance v{}, {}", dest, t),
            Self::NewArray(dest, size, t) => write!(f, "new-array v{}, v{}, {}", dest, size, t),
            Self::FilledNewArray(regs, t) => write!(f, "filled-new-array {{{}}}, {}", registers(regs), t),
            Self::FillArrayData(reg, data) => {
                write!(f, "fill-array-data v{}, {} x {} bytes", reg, data.elements().len(), data.element_width)
            }
            Self::Throw(reg) => write!(f, "throw v{}", reg),
            Self::Goto(target) => write!(f, "goto {}", target),
            Self::PackedSwitch(reg, first_key, targets, _) => {
                write!(f, "packed-switch v{}, {}", reg, first_key)?;
                for t in targets {
                    write!(f, " {}", t)?;
                }
                Ok(())
            }
            Self::SparseSwitch(reg, pairs, _) => {
                write!(f, "sparse-switch v{}", reg)?;
                for (k, t) in pairs {
                    write!(f, " {}->{}", k, t)?;
                }
                Ok(())
            }
            Self::Compare(ct, dest, a, b) => write!(f, "{} v{}, v{}, v{}", ct.name(), dest, a, b),
            Self::If(tt, a, b, target) => write!(f, "{} v{}, v{}, {}", tt.name(), a, b, target),
            Self::IfZ(tt, a, target) => write!(f, "{}z v{}, {}", tt.name(), a, target),
            Self::ArrayGet(k, dest, arr, idx) => write!(f, "aget{} v{}, v{}, v{}", k.suffix(), dest, arr, idx),
            Self::ArrayPut(k, src, arr, idx) => write!(f, "aput{} v{}, v{}, v{}", k.suffix(), src, arr, idx),
            Self::InstanceGet(k, dest, obj, field) => {
                write!(f, "iget{} v{}, v{}, {}->{}:{}", k.suffix(), dest, obj, field.class, field.name, field.type_)
            }
            Self::InstancePut(k, src, obj, field) => {
                write!(f, "iput{} v{}, v{}, {}->{}:{}", k.suffix(), src, obj, field.class, field.name, field.type_)
            }
            Self::StaticGet(k, dest, field) => write!(f, "sget{} v{}, {}->{}:{}", k.suffix(), dest, field.class, field.name, field.type_),
            Self::StaticPut(k, src, field) => write!(f, "sput{} v{}, {}->{}:{}", k.suffix(), src, field.class, field.name, field.type_),
            Self::Invoke(kind, regs, m) => {
                write!(f, "{} {{{}}}, {}->{}{}", kind.name(), registers(regs), m.class, m.name, m.signature.to_jni())
            }
            Self::Unary(op, dest, src) => write!(f, "{:?} v{}, v{}", op, dest, src),
            Self::Binary(op, dest, a, b) => write!(f, "{} v{}, v{}, v{}", op.name(), dest, a, b),
            Self::BinaryLit(op, dest, src, literal) => write!(f, "{}/lit v{}, v{}, #{}", op.name(), dest, src, literal),
            Self::ReverseSubLit(dest, src, literal) => write!(f, "rsub-int v{}, v{}, #{}", dest, src, literal),
            Self::Unsupported(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_data_elements_are_little_endian() {
        let data = ArrayData { element_width: 2, data: vec![0x34, 0x12, 0xff, 0xff] };
        assert_eq!(data.elements(), vec![0x1234, 0xffff]);
        let data = ArrayData { element_width: 4, data: vec![0, 0, 0x80, 0x3f] };
        assert_eq!(data.elements(), vec![0x3f80_0000]);
    }

    #[test]
    fn binary_operand_types_follow_opcode_order() {
        assert_eq!(BinaryOperation::UshrInt.operand_type(), TypeSignature::Int);
        assert_eq!(BinaryOperation::AddLong.operand_type(), TypeSignature::Long);
        assert_eq!(BinaryOperation::RemFloat.operand_type(), TypeSignature::Float);
        assert_eq!(BinaryOperation::AddDouble.operand_type(), TypeSignature::Double);
        assert_eq!(BinaryOperation::ALL[14], BinaryOperation::DivLong);
        assert_eq!(BinaryOperation::DivLong.name(), "div-long");
    }

    #[test]
    fn display_uses_smali_syntax() {
        let i = DexInstruction::Move(MoveKind::Wide, 2, 4);
        assert_eq!(i.to_string(), "move-wide v2, v4");
        let i = DexInstruction::IfZ(TestType::NotEqual, 3, Label(7));
        assert_eq!(i.to_string(), "if-nez v3, L7");
        let i = DexInstruction::ArrayGet(AccessType::Char, 0, 1, 2);
        assert_eq!(i.to_string(), "aget-char v0, v1, v2");
    }
}
