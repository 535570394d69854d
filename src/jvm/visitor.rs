//! Visitor traits describing a class file as a sequence of calls.
//!
//! Every method has a do-nothing default, so a consumer only implements what it cares about.
//! Methods that open a nested structure return an optional child visitor: `None` means the
//! consumer is not interested and the producer must skip that subtree.

use crate::jvm::insn::Insn;
use crate::jvm::{ConstantValue, Label};

/// A leaf annotation element value.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
    /// A class literal, by descriptor
    Class(String),
}

pub trait AnnotationVisitor {
    /// `name` is `None` for array entries and annotation default values.
    fn visit(&mut self, _name: Option<&str>, _value: AnnotationValue) {}

    fn visit_enum(&mut self, _name: Option<&str>, _desc: &str, _value: &str) {}

    fn visit_annotation(&mut self, _name: Option<&str>, _desc: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_array(&mut self, _name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_end(&mut self) {}
}

pub trait FieldVisitor {
    fn visit_annotation(&mut self, _desc: &str, _visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_end(&mut self) {}
}

pub trait CodeVisitor {
    /// Called before any label or instruction of the body.
    fn visit_try_catch_block(&mut self, _start: Label, _end: Label, _handler: Label, _catch_type: Option<&str>) {}

    fn visit_label(&mut self, _label: Label) {}

    fn visit_insn(&mut self, _insn: Insn) {}

    fn visit_line_number(&mut self, _line: u32, _start: Label) {}

    fn visit_local_variable(&mut self, _name: &str, _desc: &str, _signature: Option<&str>, _start: Label, _end: Label, _slot: u16) {}

    fn visit_end(&mut self) {}
}

pub trait MethodVisitor {
    fn visit_annotation_default(&mut self) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_annotation(&mut self, _desc: &str, _visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_parameter_annotation(&mut self, _parameter: usize, _desc: &str, _visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    /// Returns `None` to skip the body.
    fn visit_code(&mut self) -> Option<Box<dyn CodeVisitor + '_>> {
        None
    }

    fn visit_end(&mut self) {}
}

pub trait ClassVisitor {
    #[allow(clippy::too_many_arguments)]
    fn visit(&mut self, version: u16, access: u16, name: &str, signature: Option<&str>, super_name: Option<&str>, interfaces: &[String]);

    fn visit_source(&mut self, _source: &str) {}

    fn visit_outer_class(&mut self, _owner: &str, _name: Option<&str>, _desc: Option<&str>) {}

    fn visit_annotation(&mut self, _desc: &str, _visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        None
    }

    fn visit_inner_class(&mut self, _name: &str, _outer_name: Option<&str>, _inner_name: Option<&str>, _access: u16) {}

    fn visit_field(&mut self, _access: u16, _name: &str, _desc: &str, _signature: Option<&str>, _value: Option<ConstantValue>)
        -> Option<Box<dyn FieldVisitor + '_>> {
        None
    }

    fn visit_method(&mut self, _access: u16, _name: &str, _desc: &str, _signature: Option<&str>, _exceptions: &[String])
        -> Option<Box<dyn MethodVisitor + '_>> {
        None
    }

    fn visit_end(&mut self) {}
}

/// A class visitor that serializes what it is fed. The loader drives one of these when the
/// caller wants bytes rather than a tree.
pub trait ClassWriter: ClassVisitor {
    fn into_bytes(self) -> Vec<u8>;
}
