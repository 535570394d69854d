//! The stack-machine side of the rewrite: instruction model, visitor traits and the
//! in-crate consumers of those traits.

pub mod insn;
pub mod textifier;
pub mod tree;
pub mod visitor;

use std::fmt;

pub use insn::Insn;
pub use visitor::{AnnotationVisitor, ClassVisitor, CodeVisitor, FieldVisitor, MethodVisitor};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_VOLATILE: u16 = 0x0040;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_TRANSIENT: u16 = 0x0080;
pub const ACC_VARARGS: u16 = 0x0080;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_STRICT: u16 = 0x0800;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

/// A position in an emitted method body. Labels are only meaningful within the method
/// that allocated them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Initial value of a static field.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConstantValue::Int(v) => write!(f, "{}", v),
            ConstantValue::Long(v) => write!(f, "{}L", v),
            ConstantValue::Float(v) => write!(f, "{}F", v),
            ConstantValue::Double(v) => write!(f, "{}D", v),
            ConstantValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// Class-file access flags rendered as Java modifiers, in declaration order.
pub fn modifiers(access: u16, method: bool) -> Vec<&'static str> {
    let mut m = vec![];
    if access & ACC_PUBLIC != 0 { m.push("public") };
    if access & ACC_PRIVATE != 0 { m.push("private") };
    if access & ACC_PROTECTED != 0 { m.push("protected") };
    if access & ACC_STATIC != 0 { m.push("static") };
    if access & ACC_FINAL != 0 { m.push("final") };
    if method && access & ACC_SYNCHRONIZED != 0 { m.push("synchronized") };
    if method && access & ACC_BRIDGE != 0 { m.push("bridge") };
    if !method && access & ACC_VOLATILE != 0 { m.push("volatile") };
    if method && access & ACC_VARARGS != 0 { m.push("varargs") };
    if !method && access & ACC_TRANSIENT != 0 { m.push("transient") };
    if access & ACC_NATIVE != 0 { m.push("native") };
    if access & ACC_INTERFACE != 0 { m.push("interface") };
    if access & ACC_ABSTRACT != 0 { m.push("abstract") };
    if access & ACC_STRICT != 0 { m.push("strictfp") };
    if access & ACC_SYNTHETIC != 0 { m.push("synthetic") };
    if access & ACC_ANNOTATION != 0 { m.push("annotation") };
    if access & ACC_ENUM != 0 { m.push("enum") };
    m
}
