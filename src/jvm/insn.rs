//! Stack-machine instructions as emitted by the rewriter.
//!
//! Families of opcodes that differ only by operand type (`iload`/`fload`/..., `iadd`/`ladd`/...)
//! are folded into one variant carrying a [`Kind`], which is what makes it possible to emit a
//! placeholder before a register's type is known and fix the family up afterwards.

use std::fmt;

use crate::dex::error::DexError;
use crate::jvm::Label;
use crate::types::TypeSignature;

/// Computational type of a stack value or local variable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl Kind {
    pub fn is_wide(&self) -> bool {
        matches!(self, Kind::Long | Kind::Double)
    }

    fn prefix(&self) -> char {
        match self {
            Kind::Int => 'i',
            Kind::Long => 'l',
            Kind::Float => 'f',
            Kind::Double => 'd',
            Kind::Reference => 'a',
        }
    }
}

/// Array element access family; booleans share the byte family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

impl ArrayKind {
    pub fn value_kind(&self) -> Kind {
        match self {
            ArrayKind::Long => Kind::Long,
            ArrayKind::Float => Kind::Float,
            ArrayKind::Double => Kind::Double,
            ArrayKind::Reference => Kind::Reference,
            _ => Kind::Int,
        }
    }

    fn prefix(&self) -> char {
        match self {
            ArrayKind::Int => 'i',
            ArrayKind::Long => 'l',
            ArrayKind::Float => 'f',
            ArrayKind::Double => 'd',
            ArrayKind::Reference => 'a',
            ArrayKind::Byte => 'b',
            ArrayKind::Char => 'c',
            ArrayKind::Short => 's',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A class literal, by internal name (or array descriptor)
    Class(String),
    Null,
}

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Comparison {
    fn suffix(&self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Ne => "ne",
            Comparison::Lt => "lt",
            Comparison::Ge => "ge",
            Comparison::Gt => "gt",
            Comparison::Le => "le",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Always,
    /// Compare an int against zero (`ifeq`, `iflt`, ...)
    Zero(Comparison),
    /// Compare two ints (`if_icmpeq`, ...)
    ICmp(Comparison),
    Null,
    NonNull,
    ACmpEq,
    ACmpNe,
}

/// Comparison modes for floating point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,
    /// 1 on NaN
    G,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

impl ArithOp {
    fn name(&self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
            ArithOp::Neg => "neg",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
            ArithOp::Shl => "shl",
            ArithOp::Shr => "shr",
            ArithOp::Ushr => "ushr",
        }
    }
}

/// `i2b`, `i2c`, `i2s`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Narrow {
    Byte,
    Char,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Internal name of the declaring class
    pub owner: String,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Const(Constant),
    Load(Kind, u16),
    Store(Kind, u16),
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    Pop,
    Pop2,
    Dup,
    Arith(ArithOp, Kind),
    Convert(Kind, Kind),
    Narrow(Narrow),
    LCmp,
    FCmp(CompareMode),
    DCmp(CompareMode),
    Jump(Condition, Label),
    /// Keys `low..low + targets.len()` map to `targets`
    TableSwitch { low: i32, default: Label, targets: Vec<Label> },
    LookupSwitch { default: Label, pairs: Vec<(i32, Label)> },
    Return(Option<Kind>),
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeKind, MethodRef),
    New(String),
    /// Creates a one dimensional array of the given element type
    NewArray(TypeSignature),
    ArrayLength,
    AThrow,
    CheckCast(String),
    InstanceOf(String),
    MonitorEnter,
    MonitorExit,
}

impl Insn {
    /// Rewrites a placeholder emitted for an untyped register now that the register's
    /// type is known. Placeholders are always emitted in their int (or long) form.
    pub fn retype(&mut self, ty: &TypeSignature) -> Result<(), DexError> {
        let Some(kind) = ty.kind() else {
            untranslatable!("Register resolved to void");
        };
        match self {
            Insn::Load(k, _) | Insn::Store(k, _) => {
                if k.is_wide() != kind.is_wide() {
                    untranslatable!("Cannot retype a {:?} slot as {}", k, ty);
                }
                *k = kind;
            }
            Insn::Const(c) => {
                let retyped = match (&*c, kind) {
                    (Constant::Int(_), Kind::Int) | (Constant::Long(_), Kind::Long) => return Ok(()),
                    (Constant::Int(v), Kind::Float) => Constant::Float(f32::from_bits(*v as u32)),
                    (Constant::Long(v), Kind::Double) => Constant::Double(f64::from_bits(*v as u64)),
                    (Constant::Int(0), Kind::Reference) => Constant::Null,
                    _ => untranslatable!("Constant {:?} cannot be used as {}", c, ty),
                };
                *c = retyped;
            }
            Insn::Jump(cond, _) => {
                let retyped = match (*cond, kind) {
                    (_, Kind::Int) => return Ok(()),
                    (Condition::Zero(Comparison::Eq), Kind::Reference) => Condition::Null,
                    (Condition::Zero(Comparison::Ne), Kind::Reference) => Condition::NonNull,
                    (Condition::ICmp(Comparison::Eq), Kind::Reference) => Condition::ACmpEq,
                    (Condition::ICmp(Comparison::Ne), Kind::Reference) => Condition::ACmpNe,
                    _ => untranslatable!("Branch {:?} cannot compare {}", cond, ty),
                };
                *cond = retyped;
            }
            _ => untranslatable!("Instruction {} is not retypeable", self),
        }
        Ok(())
    }

    /// True if control never falls through to the next instruction.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Insn::Jump(Condition::Always, _)
                | Insn::TableSwitch { .. }
                | Insn::LookupSwitch { .. }
                | Insn::Return(_)
                | Insn::AThrow
        )
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Insn::Const(c) => match c {
                Constant::Int(v) => write!(f, "ldc {}", v),
                Constant::Long(v) => write!(f, "ldc2_w {}L", v),
                Constant::Float(v) => write!(f, "ldc {:?}F", v),
                Constant::Double(v) => write!(f, "ldc2_w {:?}D", v),
                Constant::String(s) => write!(f, "ldc {:?}", s),
                Constant::Class(c) => write!(f, "ldc {}.class", c),
                Constant::Null => write!(f, "aconst_null"),
            },
            Insn::Load(k, slot) => write!(f, "{}load {}", k.prefix(), slot),
            Insn::Store(k, slot) => write!(f, "{}store {}", k.prefix(), slot),
            Insn::ArrayLoad(k) => write!(f, "{}aload", k.prefix()),
            Insn::ArrayStore(k) => write!(f, "{}astore", k.prefix()),
            Insn::Pop => write!(f, "pop"),
            Insn::Pop2 => write!(f, "pop2"),
            Insn::Dup => write!(f, "dup"),
            Insn::Arith(op, k) => write!(f, "{}{}", k.prefix(), op.name()),
            Insn::Convert(from, to) => write!(f, "{}2{}", from.prefix(), to.prefix()),
            Insn::Narrow(n) => write!(f, "i2{}", match n { Narrow::Byte => 'b', Narrow::Char => 'c', Narrow::Short => 's' }),
            Insn::LCmp => write!(f, "lcmp"),
            Insn::FCmp(m) => write!(f, "fcmp{}", if *m == CompareMode::L { 'l' } else { 'g' }),
            Insn::DCmp(m) => write!(f, "dcmp{}", if *m == CompareMode::L { 'l' } else { 'g' }),
            Insn::Jump(cond, label) => match cond {
                Condition::Always => write!(f, "goto {}", label),
                Condition::Zero(c) => write!(f, "if{} {}", c.suffix(), label),
                Condition::ICmp(c) => write!(f, "if_icmp{} {}", c.suffix(), label),
                Condition::Null => write!(f, "ifnull {}", label),
                Condition::NonNull => write!(f, "ifnonnull {}", label),
                Condition::ACmpEq => write!(f, "if_acmpeq {}", label),
                Condition::ACmpNe => write!(f, "if_acmpne {}", label),
            },
            Insn::TableSwitch { low, default, targets } => {
                write!(f, "tableswitch {}", low)?;
                for t in targets {
                    write!(f, " {}", t)?;
                }
                write!(f, " default: {}", default)
            }
            Insn::LookupSwitch { default, pairs } => {
                write!(f, "lookupswitch")?;
                for (k, t) in pairs {
                    write!(f, " {}: {}", k, t)?;
                }
                write!(f, " default: {}", default)
            }
            Insn::Return(None) => write!(f, "return"),
            Insn::Return(Some(k)) => write!(f, "{}return", k.prefix()),
            Insn::GetStatic(r) => write!(f, "getstatic {}.{} {}", r.owner, r.name, r.desc),
            Insn::PutStatic(r) => write!(f, "putstatic {}.{} {}", r.owner, r.name, r.desc),
            Insn::GetField(r) => write!(f, "getfield {}.{} {}", r.owner, r.name, r.desc),
            Insn::PutField(r) => write!(f, "putfield {}.{} {}", r.owner, r.name, r.desc),
            Insn::Invoke(kind, m) => {
                let name = match kind {
                    InvokeKind::Virtual => "invokevirtual",
                    InvokeKind::Special => "invokespecial",
                    InvokeKind::Static => "invokestatic",
                    InvokeKind::Interface => "invokeinterface",
                };
                write!(f, "{} {}.{}{}", name, m.owner, m.name, m.desc)
            }
            Insn::New(c) => write!(f, "new {}", c),
            Insn::NewArray(t) if t.is_reference() => write!(f, "anewarray {}", t.internal_name()),
            Insn::NewArray(t) => write!(f, "newarray {}", t.to_java()),
            Insn::ArrayLength => write!(f, "arraylength"),
            Insn::AThrow => write!(f, "athrow"),
            Insn::CheckCast(c) => write!(f, "checkcast {}", c),
            Insn::InstanceOf(c) => write!(f, "instanceof {}", c),
            Insn::MonitorEnter => write!(f, "monitorenter"),
            Insn::MonitorExit => write!(f, "monitorexit"),
        }
    }
}
