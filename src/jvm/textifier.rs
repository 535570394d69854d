//! Renders the visitor call sequence as a readable listing.

use std::fmt::Write;

use crate::jvm::insn::Insn;
use crate::jvm::visitor::{AnnotationValue, AnnotationVisitor, ClassVisitor, ClassWriter, CodeVisitor, FieldVisitor, MethodVisitor};
use crate::jvm::{modifiers, ConstantValue, Label, ACC_INTERFACE};

#[derive(Debug, Default)]
pub struct Textifier {
    out: String,
}

impl Textifier {
    pub fn new() -> Textifier {
        Textifier::default()
    }

    pub fn text(&self) -> &str {
        &self.out
    }
}

fn prefix(access: u16, method: bool) -> String {
    let mut s = String::new();
    for m in modifiers(access, method) {
        // interface is printed in place of `class`
        if m == "interface" {
            continue;
        }
        s.push_str(m);
        s.push(' ');
    }
    s
}

impl ClassVisitor for Textifier {
    fn visit(&mut self, version: u16, access: u16, name: &str, signature: Option<&str>, super_name: Option<&str>, interfaces: &[String]) {
        let _ = writeln!(self.out, "// class version {}", version);
        if let Some(sig) = signature {
            let _ = writeln!(self.out, "// signature {}", sig);
        }
        let kind = if access & ACC_INTERFACE != 0 { "interface" } else { "class" };
        let _ = write!(self.out, "{}{} {}", prefix(access, false), kind, name);
        if let Some(s) = super_name {
            let _ = write!(self.out, " extends {}", s);
        }
        if !interfaces.is_empty() {
            let _ = write!(self.out, " implements {}", interfaces.join(", "));
        }
        let _ = writeln!(self.out, " {{");
    }

    fn visit_source(&mut self, source: &str) {
        let _ = writeln!(self.out, "  // source: {}", source);
    }

    fn visit_outer_class(&mut self, owner: &str, name: Option<&str>, desc: Option<&str>) {
        let _ = writeln!(self.out, "  OUTERCLASS {} {} {}", owner, name.unwrap_or("null"), desc.unwrap_or("null"));
    }

    fn visit_annotation(&mut self, desc: &str, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        Some(Box::new(AnnotationPrinter::open(&mut self.out, "  ", desc, visible)))
    }

    fn visit_inner_class(&mut self, name: &str, outer_name: Option<&str>, inner_name: Option<&str>, access: u16) {
        let _ = writeln!(
            self.out,
            "  INNERCLASS {} {} {} {}",
            name,
            outer_name.unwrap_or("null"),
            inner_name.unwrap_or("null"),
            prefix(access, false).trim_end()
        );
    }

    fn visit_field(&mut self, access: u16, name: &str, desc: &str, signature: Option<&str>, value: Option<ConstantValue>)
        -> Option<Box<dyn FieldVisitor + '_>> {
        let _ = writeln!(self.out);
        if let Some(sig) = signature {
            let _ = writeln!(self.out, "  // signature {}", sig);
        }
        let _ = write!(self.out, "  {}{} {}", prefix(access, false), desc, name);
        if let Some(v) = value {
            let _ = write!(self.out, " = {}", v);
        }
        let _ = writeln!(self.out);
        Some(Box::new(MemberPrinter { out: &mut self.out }))
    }

    fn visit_method(&mut self, access: u16, name: &str, desc: &str, signature: Option<&str>, exceptions: &[String])
        -> Option<Box<dyn MethodVisitor + '_>> {
        let _ = writeln!(self.out);
        if let Some(sig) = signature {
            let _ = writeln!(self.out, "  // signature {}", sig);
        }
        let _ = write!(self.out, "  {}{}{}", prefix(access, true), name, desc);
        if !exceptions.is_empty() {
            let _ = write!(self.out, " throws {}", exceptions.join(" "));
        }
        let _ = writeln!(self.out);
        Some(Box::new(MemberPrinter { out: &mut self.out }))
    }

    fn visit_end(&mut self) {
        let _ = writeln!(self.out, "}}");
    }
}

impl ClassWriter for Textifier {
    fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }
}

struct MemberPrinter<'a> {
    out: &'a mut String,
}

impl FieldVisitor for MemberPrinter<'_> {
    fn visit_annotation(&mut self, desc: &str, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        Some(Box::new(AnnotationPrinter::open(&mut *self.out, "    ", desc, visible)))
    }
}

impl MethodVisitor for MemberPrinter<'_> {
    fn visit_annotation_default(&mut self) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let _ = write!(self.out, "    default=");
        Some(Box::new(AnnotationPrinter { out: &mut *self.out, first: true, close: "\n" }))
    }

    fn visit_annotation(&mut self, desc: &str, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        Some(Box::new(AnnotationPrinter::open(&mut *self.out, "    ", desc, visible)))
    }

    fn visit_parameter_annotation(&mut self, parameter: usize, desc: &str, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let _ = writeln!(self.out, "    // parameter {}", parameter);
        Some(Box::new(AnnotationPrinter::open(&mut *self.out, "    ", desc, visible)))
    }

    fn visit_code(&mut self) -> Option<Box<dyn CodeVisitor + '_>> {
        Some(Box::new(CodePrinter { out: &mut *self.out }))
    }
}

struct CodePrinter<'a> {
    out: &'a mut String,
}

impl CodeVisitor for CodePrinter<'_> {
    fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) {
        let _ = writeln!(self.out, "    TRYCATCHBLOCK {} {} {} {}", start, end, handler, catch_type.unwrap_or("null"));
    }

    fn visit_label(&mut self, label: Label) {
        let _ = writeln!(self.out, "   {}", label);
    }

    fn visit_insn(&mut self, insn: Insn) {
        let _ = writeln!(self.out, "    {}", insn);
    }

    fn visit_line_number(&mut self, line: u32, start: Label) {
        let _ = writeln!(self.out, "    LINENUMBER {} {}", line, start);
    }

    fn visit_local_variable(&mut self, name: &str, desc: &str, signature: Option<&str>, start: Label, end: Label, slot: u16) {
        let _ = write!(self.out, "    LOCALVARIABLE {} {} {} {} {}", name, desc, start, end, slot);
        if let Some(sig) = signature {
            let _ = write!(self.out, " // signature {}", sig);
        }
        let _ = writeln!(self.out);
    }
}

struct AnnotationPrinter<'a> {
    out: &'a mut String,
    first: bool,
    close: &'static str,
}

impl<'a> AnnotationPrinter<'a> {
    fn open(out: &'a mut String, indent: &str, desc: &str, visible: bool) -> AnnotationPrinter<'a> {
        let _ = write!(out, "{}@{}(", indent, desc);
        let close = if visible { ")\n" } else { ") // invisible\n" };
        AnnotationPrinter { out, first: true, close }
    }

    fn separator(&mut self, name: Option<&str>) {
        if !self.first {
            self.out.push_str(", ");
        }
        self.first = false;
        if let Some(n) = name {
            let _ = write!(self.out, "{}=", n);
        }
    }
}

impl AnnotationVisitor for AnnotationPrinter<'_> {
    fn visit(&mut self, name: Option<&str>, value: AnnotationValue) {
        self.separator(name);
        let _ = match value {
            AnnotationValue::Byte(v) => write!(self.out, "{}B", v),
            AnnotationValue::Short(v) => write!(self.out, "{}S", v),
            AnnotationValue::Char(v) => write!(self.out, "{:?}", char::from_u32(v as u32).unwrap_or('?')),
            AnnotationValue::Int(v) => write!(self.out, "{}", v),
            AnnotationValue::Long(v) => write!(self.out, "{}L", v),
            AnnotationValue::Float(v) => write!(self.out, "{}F", v),
            AnnotationValue::Double(v) => write!(self.out, "{}D", v),
            AnnotationValue::Boolean(v) => write!(self.out, "{}", v),
            AnnotationValue::String(s) => write!(self.out, "{:?}", s),
            AnnotationValue::Class(c) => write!(self.out, "{}.class", c),
        };
    }

    fn visit_enum(&mut self, name: Option<&str>, desc: &str, value: &str) {
        self.separator(name);
        let _ = write!(self.out, "{}.{}", desc, value);
    }

    fn visit_annotation(&mut self, name: Option<&str>, desc: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.separator(name);
        let _ = write!(self.out, "@{}(", desc);
        Some(Box::new(AnnotationPrinter { out: &mut *self.out, first: true, close: ")" }))
    }

    fn visit_array(&mut self, name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.separator(name);
        self.out.push('{');
        Some(Box::new(AnnotationPrinter { out: &mut *self.out, first: true, close: "}" }))
    }

    fn visit_end(&mut self) {
        self.out.push_str(self.close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::ACC_PUBLIC;

    #[test]
    fn prints_a_small_class() {
        let mut t = Textifier::new();
        t.visit(50, ACC_PUBLIC, "a/B", None, Some("java/lang/Object"), &[]);
        {
            let mut av = t.visit_annotation("La/Ann;", true).unwrap();
            av.visit(Some("v"), AnnotationValue::Int(1));
            {
                let mut arr = av.visit_array(Some("xs")).unwrap();
                arr.visit(None, AnnotationValue::Boolean(true));
                arr.visit_end();
            }
            av.visit_end();
        }
        {
            let mut mv = t.visit_method(ACC_PUBLIC, "f", "()V", None, &[]).unwrap();
            {
                let mut cv = mv.visit_code().unwrap();
                cv.visit_label(Label(0));
                cv.visit_insn(Insn::Return(None));
                cv.visit_end();
            }
            mv.visit_end();
        }
        t.visit_end();

        let text = String::from_utf8(t.into_bytes()).unwrap();
        assert!(text.contains("public class a/B extends java/lang/Object {"));
        assert!(text.contains("  @La/Ann;(v=1, xs={true})\n"));
        assert!(text.contains("  public f()V\n   L0\n    return\n"));
        assert!(text.ends_with("}\n"));
    }
}
