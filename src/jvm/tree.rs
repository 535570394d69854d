//! A class visitor that records everything it is fed into plain structs.

use crate::jvm::insn::Insn;
use crate::jvm::visitor::{AnnotationValue, AnnotationVisitor, ClassVisitor, CodeVisitor, FieldVisitor, MethodVisitor};
use crate::jvm::{ConstantValue, Label};

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Value(AnnotationValue),
    Enum { desc: String, value: String },
    Annotation(AnnotationNode),
    Array(Vec<Element>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationNode {
    pub desc: String,
    pub values: Vec<(String, Element)>,
}

impl AnnotationNode {
    pub fn new(desc: &str) -> AnnotationNode {
        AnnotationNode { desc: desc.to_string(), values: vec![] }
    }

    pub fn value(&self, name: &str) -> Option<&Element> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClassNode {
    pub name: String,
    pub outer_name: Option<String>,
    pub inner_name: Option<String>,
    pub access: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OuterClassNode {
    pub owner: String,
    pub name: Option<String>,
    pub desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub value: Option<ConstantValue>,
    pub visible_annotations: Vec<AnnotationNode>,
    pub invisible_annotations: Vec<AnnotationNode>,
}

/// One entry of the body stream: either a label placement or an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeEvent {
    Label(Label),
    Insn(Insn),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryCatchBlock {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub start: Label,
    pub end: Label,
    pub slot: u16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeNode {
    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub events: Vec<CodeEvent>,
    pub line_numbers: Vec<(u32, Label)>,
    pub locals: Vec<LocalVariable>,
}

impl CodeNode {
    pub fn instructions(&self) -> impl Iterator<Item = &Insn> {
        self.events.iter().filter_map(|e| match e {
            CodeEvent::Insn(i) => Some(i),
            CodeEvent::Label(_) => None,
        })
    }

    /// Replays the body. Line numbers follow the label they start at.
    pub fn accept(&self, cv: &mut dyn CodeVisitor) {
        for t in &self.try_catch_blocks {
            cv.visit_try_catch_block(t.start, t.end, t.handler, t.catch_type.as_deref());
        }
        let mut placed = vec![false; self.line_numbers.len()];
        for e in &self.events {
            match e {
                CodeEvent::Label(l) => {
                    cv.visit_label(*l);
                    for (i, (line, start)) in self.line_numbers.iter().enumerate() {
                        if start == l && !placed[i] {
                            cv.visit_line_number(*line, *start);
                            placed[i] = true;
                        }
                    }
                }
                CodeEvent::Insn(i) => cv.visit_insn(i.clone()),
            }
        }
        for (i, (line, start)) in self.line_numbers.iter().enumerate() {
            if !placed[i] {
                cv.visit_line_number(*line, *start);
            }
        }
        for lv in &self.locals {
            cv.visit_local_variable(&lv.name, &lv.desc, lv.signature.as_deref(), lv.start, lv.end, lv.slot);
        }
        cv.visit_end();
    }

    /// Index of a label within the event stream.
    pub fn position(&self, label: Label) -> Option<usize> {
        self.events.iter().position(|e| *e == CodeEvent::Label(label))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub annotation_default: Option<Element>,
    pub visible_annotations: Vec<AnnotationNode>,
    pub invisible_annotations: Vec<AnnotationNode>,
    pub parameter_annotations: Vec<(usize, AnnotationNode, bool)>,
    pub code: Option<CodeNode>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassNode {
    pub version: u16,
    pub access: u16,
    pub name: String,
    pub signature: Option<String>,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub source: Option<String>,
    pub outer_class: Option<OuterClassNode>,
    pub inner_classes: Vec<InnerClassNode>,
    pub visible_annotations: Vec<AnnotationNode>,
    pub invisible_annotations: Vec<AnnotationNode>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
}

impl ClassNode {
    pub fn new() -> ClassNode {
        ClassNode::default()
    }

    pub fn method(&self, name: &str, desc: &str) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.name == name && m.desc == desc)
    }

    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Replays the recorded calls into another visitor.
    pub fn accept(&self, cv: &mut dyn ClassVisitor) {
        cv.visit(self.version, self.access, &self.name, self.signature.as_deref(), self.super_name.as_deref(), &self.interfaces);
        if let Some(source) = &self.source {
            cv.visit_source(source);
        }
        if let Some(outer) = &self.outer_class {
            cv.visit_outer_class(&outer.owner, outer.name.as_deref(), outer.desc.as_deref());
        }
        for (list, visible) in [(&self.visible_annotations, true), (&self.invisible_annotations, false)] {
            for a in list {
                if let Some(mut av) = cv.visit_annotation(&a.desc, visible) {
                    a.accept(av.as_mut());
                }
            }
        }
        for ic in &self.inner_classes {
            cv.visit_inner_class(&ic.name, ic.outer_name.as_deref(), ic.inner_name.as_deref(), ic.access);
        }
        for f in &self.fields {
            if let Some(mut fv) = cv.visit_field(f.access, &f.name, &f.desc, f.signature.as_deref(), f.value.clone()) {
                for (list, visible) in [(&f.visible_annotations, true), (&f.invisible_annotations, false)] {
                    for a in list {
                        if let Some(mut av) = fv.visit_annotation(&a.desc, visible) {
                            a.accept(av.as_mut());
                        }
                    }
                }
                fv.visit_end();
            }
        }
        for m in &self.methods {
            if let Some(mut mv) = cv.visit_method(m.access, &m.name, &m.desc, m.signature.as_deref(), &m.exceptions) {
                m.accept(mv.as_mut());
            }
        }
        cv.visit_end();
    }
}

impl AnnotationNode {
    pub fn accept(&self, av: &mut dyn AnnotationVisitor) {
        for (name, value) in &self.values {
            value.accept(Some(name.as_str()), av);
        }
        av.visit_end();
    }
}

impl Element {
    fn accept(&self, name: Option<&str>, av: &mut dyn AnnotationVisitor) {
        match self {
            Element::Value(v) => av.visit(name, v.clone()),
            Element::Enum { desc, value } => av.visit_enum(name, desc, value),
            Element::Annotation(a) => {
                if let Some(mut nested) = av.visit_annotation(name, &a.desc) {
                    a.accept(nested.as_mut());
                }
            }
            Element::Array(items) => {
                if let Some(mut nested) = av.visit_array(name) {
                    for item in items {
                        item.accept(None, nested.as_mut());
                    }
                    nested.visit_end();
                }
            }
        }
    }
}

impl MethodNode {
    fn accept(&self, mv: &mut dyn MethodVisitor) {
        if let Some(default) = &self.annotation_default {
            if let Some(mut av) = mv.visit_annotation_default() {
                default.accept(None, av.as_mut());
                av.visit_end();
            }
        }
        for (list, visible) in [(&self.visible_annotations, true), (&self.invisible_annotations, false)] {
            for a in list {
                if let Some(mut av) = mv.visit_annotation(&a.desc, visible) {
                    a.accept(av.as_mut());
                }
            }
        }
        for (parameter, a, visible) in &self.parameter_annotations {
            if let Some(mut av) = mv.visit_parameter_annotation(*parameter, &a.desc, *visible) {
                a.accept(av.as_mut());
            }
        }
        if let Some(code) = &self.code {
            if let Some(mut cv) = mv.visit_code() {
                code.accept(cv.as_mut());
            }
        }
        mv.visit_end();
    }
}

impl ClassVisitor for ClassNode {
    fn visit(&mut self, version: u16, access: u16, name: &str, signature: Option<&str>, super_name: Option<&str>, interfaces: &[String]) {
        self.version = version;
        self.access = access;
        self.name = name.to_string();
        self.signature = signature.map(str::to_string);
        self.super_name = super_name.map(str::to_string);
        self.interfaces = interfaces.to_vec();
    }

    fn visit_source(&mut self, source: &str) {
        self.source = Some(source.to_string());
    }

    fn visit_outer_class(&mut self, owner: &str, name: Option<&str>, desc: Option<&str>) {
        self.outer_class = Some(OuterClassNode {
            owner: owner.to_string(),
            name: name.map(str::to_string),
            desc: desc.map(str::to_string),
        });
    }

    fn visit_annotation(&mut self, desc: &str, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let list = if visible { &mut self.visible_annotations } else { &mut self.invisible_annotations };
        list.push(AnnotationNode::new(desc));
        list.last_mut().map(|node| Box::new(AnnotationBuilder { node }) as Box<dyn AnnotationVisitor + '_>)
    }

    fn visit_inner_class(&mut self, name: &str, outer_name: Option<&str>, inner_name: Option<&str>, access: u16) {
        self.inner_classes.push(InnerClassNode {
            name: name.to_string(),
            outer_name: outer_name.map(str::to_string),
            inner_name: inner_name.map(str::to_string),
            access,
        });
    }

    fn visit_field(&mut self, access: u16, name: &str, desc: &str, signature: Option<&str>, value: Option<ConstantValue>)
        -> Option<Box<dyn FieldVisitor + '_>> {
        self.fields.push(FieldNode {
            access,
            name: name.to_string(),
            desc: desc.to_string(),
            signature: signature.map(str::to_string),
            value,
            visible_annotations: vec![],
            invisible_annotations: vec![],
        });
        self.fields.last_mut().map(|f| Box::new(f) as Box<dyn FieldVisitor + '_>)
    }

    fn visit_method(&mut self, access: u16, name: &str, desc: &str, signature: Option<&str>, exceptions: &[String])
        -> Option<Box<dyn MethodVisitor + '_>> {
        self.methods.push(MethodNode {
            access,
            name: name.to_string(),
            desc: desc.to_string(),
            signature: signature.map(str::to_string),
            exceptions: exceptions.to_vec(),
            annotation_default: None,
            visible_annotations: vec![],
            invisible_annotations: vec![],
            parameter_annotations: vec![],
            code: None,
        });
        self.methods.last_mut().map(|m| Box::new(m) as Box<dyn MethodVisitor + '_>)
    }
}

impl FieldVisitor for &mut FieldNode {
    fn visit_annotation(&mut self, desc: &str, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let list = if visible { &mut self.visible_annotations } else { &mut self.invisible_annotations };
        list.push(AnnotationNode::new(desc));
        list.last_mut().map(|node| Box::new(AnnotationBuilder { node }) as Box<dyn AnnotationVisitor + '_>)
    }
}

impl MethodVisitor for &mut MethodNode {
    fn visit_annotation_default(&mut self) -> Option<Box<dyn AnnotationVisitor + '_>> {
        Some(Box::new(DefaultBuilder { slot: &mut self.annotation_default }))
    }

    fn visit_annotation(&mut self, desc: &str, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        let list = if visible { &mut self.visible_annotations } else { &mut self.invisible_annotations };
        list.push(AnnotationNode::new(desc));
        list.last_mut().map(|node| Box::new(AnnotationBuilder { node }) as Box<dyn AnnotationVisitor + '_>)
    }

    fn visit_parameter_annotation(&mut self, parameter: usize, desc: &str, visible: bool) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.parameter_annotations.push((parameter, AnnotationNode::new(desc), visible));
        self.parameter_annotations.last_mut().map(|(_, node, _)| Box::new(AnnotationBuilder { node }) as Box<dyn AnnotationVisitor + '_>)
    }

    fn visit_code(&mut self) -> Option<Box<dyn CodeVisitor + '_>> {
        let code = self.code.insert(CodeNode::default());
        Some(Box::new(code))
    }
}

impl CodeVisitor for &mut CodeNode {
    fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) {
        self.try_catch_blocks.push(TryCatchBlock { start, end, handler, catch_type: catch_type.map(str::to_string) });
    }

    fn visit_label(&mut self, label: Label) {
        self.events.push(CodeEvent::Label(label));
    }

    fn visit_insn(&mut self, insn: Insn) {
        self.events.push(CodeEvent::Insn(insn));
    }

    fn visit_line_number(&mut self, line: u32, start: Label) {
        self.line_numbers.push((line, start));
    }

    fn visit_local_variable(&mut self, name: &str, desc: &str, signature: Option<&str>, start: Label, end: Label, slot: u16) {
        self.locals.push(LocalVariable {
            name: name.to_string(),
            desc: desc.to_string(),
            signature: signature.map(str::to_string),
            start,
            end,
            slot,
        });
    }
}

struct AnnotationBuilder<'a> {
    node: &'a mut AnnotationNode,
}

impl AnnotationVisitor for AnnotationBuilder<'_> {
    fn visit(&mut self, name: Option<&str>, value: AnnotationValue) {
        self.node.values.push((name.unwrap_or_default().to_string(), Element::Value(value)));
    }

    fn visit_enum(&mut self, name: Option<&str>, desc: &str, value: &str) {
        self.node.values.push((
            name.unwrap_or_default().to_string(),
            Element::Enum { desc: desc.to_string(), value: value.to_string() },
        ));
    }

    fn visit_annotation(&mut self, name: Option<&str>, desc: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.node.values.push((name.unwrap_or_default().to_string(), Element::Annotation(AnnotationNode::new(desc))));
        match self.node.values.last_mut() {
            Some((_, Element::Annotation(node))) => Some(Box::new(AnnotationBuilder { node })),
            _ => None,
        }
    }

    fn visit_array(&mut self, name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.node.values.push((name.unwrap_or_default().to_string(), Element::Array(vec![])));
        match self.node.values.last_mut() {
            Some((_, Element::Array(items))) => Some(Box::new(ArrayBuilder { items })),
            _ => None,
        }
    }
}

struct ArrayBuilder<'a> {
    items: &'a mut Vec<Element>,
}

impl AnnotationVisitor for ArrayBuilder<'_> {
    fn visit(&mut self, _name: Option<&str>, value: AnnotationValue) {
        self.items.push(Element::Value(value));
    }

    fn visit_enum(&mut self, _name: Option<&str>, desc: &str, value: &str) {
        self.items.push(Element::Enum { desc: desc.to_string(), value: value.to_string() });
    }

    fn visit_annotation(&mut self, _name: Option<&str>, desc: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.items.push(Element::Annotation(AnnotationNode::new(desc)));
        match self.items.last_mut() {
            Some(Element::Annotation(node)) => Some(Box::new(AnnotationBuilder { node })),
            _ => None,
        }
    }

    fn visit_array(&mut self, _name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        self.items.push(Element::Array(vec![]));
        match self.items.last_mut() {
            Some(Element::Array(items)) => Some(Box::new(ArrayBuilder { items })),
            _ => None,
        }
    }
}

// Records the single unnamed value of an annotation default
struct DefaultBuilder<'a> {
    slot: &'a mut Option<Element>,
}

impl AnnotationVisitor for DefaultBuilder<'_> {
    fn visit(&mut self, _name: Option<&str>, value: AnnotationValue) {
        *self.slot = Some(Element::Value(value));
    }

    fn visit_enum(&mut self, _name: Option<&str>, desc: &str, value: &str) {
        *self.slot = Some(Element::Enum { desc: desc.to_string(), value: value.to_string() });
    }

    fn visit_annotation(&mut self, _name: Option<&str>, desc: &str) -> Option<Box<dyn AnnotationVisitor + '_>> {
        match self.slot.insert(Element::Annotation(AnnotationNode::new(desc))) {
            Element::Annotation(node) => Some(Box::new(AnnotationBuilder { node })),
            _ => None,
        }
    }

    fn visit_array(&mut self, _name: Option<&str>) -> Option<Box<dyn AnnotationVisitor + '_>> {
        match self.slot.insert(Element::Array(vec![])) {
            Element::Array(items) => Some(Box::new(ArrayBuilder { items })),
            _ => None,
        }
    }
}
