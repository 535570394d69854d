//! Drives a [`ClassVisitor`] through one DEX class definition.

use log::{debug, warn};

use crate::dex::annotations::{AnnotationItem, AnnotationsDirectoryItem};
use crate::dex::class_data::{EncodedField, EncodedMethod};
use crate::dex::dex_file::{ClassDef, ACC_DECLARED_SYNCHRONIZED};
use crate::dex::encoded_values::EncodedValue;
use crate::dex::error::DexError;
use crate::dex::DexFile;
use crate::jvm::tree::CodeNode;
use crate::jvm::visitor::{ClassVisitor, MethodVisitor};
use crate::jvm::{ConstantValue, ACC_INTERFACE, ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC, ACC_STATIC, ACC_SUPER, ACC_SYNCHRONIZED};
use crate::settings::{MethodErrorPolicy, Settings};
use crate::translate::annotations::{accept_annotation, accept_value, user_annotations, SystemAnnotations};
use crate::translate::method::{stub, translate_code};
use crate::translate::rewriter::MethodContext;
use crate::types::{MethodSignature, TypeSignature};

/// Class-file flags of a class header. Visibility and `static` of a nested class only live in
/// its inner class record.
pub fn class_access(dex_flags: u32) -> u16 {
    let mut access = (dex_flags & 0xffff) as u16;
    if access & ACC_PROTECTED != 0 {
        access |= ACC_PUBLIC;
    }
    access &= !(ACC_PRIVATE | ACC_PROTECTED | ACC_STATIC);
    if access & ACC_INTERFACE == 0 {
        access |= ACC_SUPER;
    }
    access
}

pub fn method_access(dex_flags: u32) -> u16 {
    let mut access = (dex_flags & 0xffff) as u16;
    if dex_flags & ACC_DECLARED_SYNCHRONIZED != 0 {
        access |= ACC_SYNCHRONIZED;
    }
    access
}

pub fn field_access(dex_flags: u32) -> u16 {
    (dex_flags & 0xffff) as u16
}

fn constant_value(dex: &DexFile, value: &EncodedValue) -> Result<Option<ConstantValue>, DexError> {
    Ok(Some(match value {
        EncodedValue::Byte(v) => ConstantValue::Int(*v as i32),
        EncodedValue::Short(v) => ConstantValue::Int(*v as i32),
        EncodedValue::Char(v) => ConstantValue::Int(*v as i32),
        EncodedValue::Int(v) => ConstantValue::Int(*v),
        EncodedValue::Boolean(v) => ConstantValue::Int(*v as i32),
        EncodedValue::Long(v) => ConstantValue::Long(*v),
        EncodedValue::Float(v) => ConstantValue::Float(*v),
        EncodedValue::Double(v) => ConstantValue::Double(*v),
        EncodedValue::String(idx) => ConstantValue::String(dex.string(*idx)?.to_string()),
        _ => return Ok(None),
    }))
}

fn internal_name(descriptor: &str) -> Result<String, DexError> {
    Ok(TypeSignature::from_descriptor(descriptor)?.internal_name())
}

/// Simple name of a nested class when its own definition is not at hand.
fn simple_name(internal: &str) -> Option<&str> {
    internal.rsplit_once('$').map(|(_, s)| s).filter(|s| !s.is_empty() && !s.starts_with(|c: char| c.is_ascii_digit()))
}

pub struct ClassTranslator<'a> {
    dex: &'a DexFile,
    settings: &'a Settings,
}

impl<'a> ClassTranslator<'a> {
    pub fn new(dex: &'a DexFile, settings: &'a Settings) -> ClassTranslator<'a> {
        ClassTranslator { dex, settings }
    }

    pub fn translate(&self, def: &ClassDef<'_>, cv: &mut dyn ClassVisitor) -> Result<(), DexError> {
        self.visit_class(def, cv).map_err(|e| err!(e, "class {}", def.descriptor))
    }

    fn annotation_set(&self, off: Option<u32>) -> Result<Vec<AnnotationItem>, DexError> {
        match off {
            Some(off) if off != 0 => self.dex.annotation_set(off),
            _ => Ok(vec![]),
        }
    }

    fn visit_class(&self, def: &ClassDef<'_>, cv: &mut dyn ClassVisitor) -> Result<(), DexError> {
        let dex = self.dex;
        let directory = dex.annotations_directory(def)?;
        let class_annotations = self.annotation_set(directory.as_ref().map(|d| d.class_annotations_off))?;
        let sys = SystemAnnotations::read(dex, &class_annotations)?;

        let name = internal_name(def.descriptor)?;
        let super_name = def.superclass.map(internal_name).transpose()?;
        let mut interfaces = vec![];
        for i in &def.interfaces {
            interfaces.push(internal_name(i)?);
        }
        debug!("Translating {}", name);
        cv.visit(self.settings.class_version, class_access(def.access_flags), &name, sys.signature.as_deref(), super_name.as_deref(), &interfaces);

        if let Some(source) = def.source_file {
            cv.visit_source(source);
        }
        if let Some(m) = &sys.enclosing_method {
            cv.visit_outer_class(&m.owner, Some(&m.name), Some(&m.desc));
        } else if let (Some(outer), Some(inner)) = (&sys.enclosing_class, &sys.inner_class) {
            if inner.name.is_none() {
                cv.visit_outer_class(outer, None, None);
            }
        }

        for (desc, visible, annotation) in user_annotations(dex, &class_annotations)? {
            if let Some(mut av) = cv.visit_annotation(desc, visible) {
                accept_annotation(dex, annotation, av.as_mut())?;
            }
        }

        if let Some(inner) = &sys.inner_class {
            // anonymous and local classes have no outer name
            let outer = if sys.enclosing_method.is_none() && inner.name.is_some() { sys.enclosing_class.as_deref() } else { None };
            cv.visit_inner_class(&name, outer, inner.name.as_deref(), inner.access_flags);
        }
        for member in &sys.member_classes {
            let (inner_name, access) = self.member_class(member)?;
            cv.visit_inner_class(member, Some(&name), inner_name.as_deref(), access);
        }

        if let Some(data) = dex.class_data(def)? {
            let values = dex.static_values(def)?;
            for (i, field) in data.static_fields.iter().enumerate() {
                let value = match values.get(i) {
                    Some(v) => constant_value(dex, v)?,
                    None => None,
                };
                self.visit_field(field, value, directory.as_ref(), cv)?;
            }
            for field in &data.instance_fields {
                self.visit_field(field, None, directory.as_ref(), cv)?;
            }
            for method in data.direct_methods.iter().chain(&data.virtual_methods) {
                self.visit_method(def, method, directory.as_ref(), &sys, cv)?;
            }
        }
        cv.visit_end();
        Ok(())
    }

    /// Inner name and flags of a member class, from its own `InnerClass` record when it is
    /// defined in this file.
    fn member_class(&self, internal: &str) -> Result<(Option<String>, u16), DexError> {
        let descriptor = format!("L{};", internal);
        if let Some(def) = self.dex.find_class(&descriptor)? {
            let directory = self.dex.annotations_directory(&def)?;
            let items = self.annotation_set(directory.map(|d| d.class_annotations_off))?;
            if let Some(inner) = SystemAnnotations::read(self.dex, &items)?.inner_class {
                return Ok((inner.name, inner.access_flags));
            }
        }
        Ok((simple_name(internal).map(str::to_string), 0))
    }

    fn visit_field(&self, field: &EncodedField, value: Option<ConstantValue>, directory: Option<&AnnotationsDirectoryItem>, cv: &mut dyn ClassVisitor) -> Result<(), DexError> {
        let dex = self.dex;
        let desc = dex.field(field.field_idx)?;
        let items = self.annotation_set(directory.and_then(|d| d.field(field.field_idx)))?;
        let sys = SystemAnnotations::read(dex, &items)?;
        if let Some(mut fv) = cv.visit_field(field_access(field.access_flags), desc.name, desc.type_, sys.signature.as_deref(), value) {
            for (adesc, visible, annotation) in user_annotations(dex, &items)? {
                if let Some(mut av) = fv.visit_annotation(adesc, visible) {
                    accept_annotation(dex, annotation, av.as_mut())?;
                }
            }
            fv.visit_end();
        }
        Ok(())
    }

    fn visit_method(&self, def: &ClassDef<'_>, method: &EncodedMethod, directory: Option<&AnnotationsDirectoryItem>, class_sys: &SystemAnnotations, cv: &mut dyn ClassVisitor) -> Result<(), DexError> {
        let dex = self.dex;
        let desc = dex.method(method.method_idx)?;
        let descriptor = desc.proto.descriptor();
        let items = self.annotation_set(directory.and_then(|d| d.method(method.method_idx)))?;
        let sys = SystemAnnotations::read(dex, &items)?;

        let Some(mut mv) = cv.visit_method(method_access(method.access_flags), desc.name, &descriptor, sys.signature.as_deref(), &sys.throws) else {
            return Ok(());
        };

        if let Some(defaults) = &class_sys.annotation_default {
            if let Some(value) = defaults.element(desc.name, |idx| dex.string(idx).ok()) {
                if let Some(mut av) = mv.visit_annotation_default() {
                    accept_value(dex, None, value, av.as_mut())?;
                    av.visit_end();
                }
            }
        }
        for (adesc, visible, annotation) in user_annotations(dex, &items)? {
            if let Some(mut av) = mv.visit_annotation(adesc, visible) {
                accept_annotation(dex, annotation, av.as_mut())?;
            }
        }
        if let Some(off) = directory.and_then(|d| d.parameters(method.method_idx)) {
            for (i, set) in dex.annotation_set_ref_list(off)?.iter().enumerate() {
                for (adesc, visible, annotation) in user_annotations(dex, set)? {
                    if let Some(mut av) = mv.visit_parameter_annotation(i, adesc, visible) {
                        accept_annotation(dex, annotation, av.as_mut())?;
                    }
                }
            }
        }

        if method.code_off != 0 {
            let context = MethodContext {
                owner: TypeSignature::from_descriptor(def.descriptor)?,
                is_static: method.access_flags & ACC_STATIC as u32 != 0,
                signature: MethodSignature::from_descriptor(&descriptor)?,
            };
            let code = dex.code_item(method.code_off)?;
            let node = match translate_code(dex, &context, &code, def.source_file, self.settings) {
                Ok(node) => node,
                Err(e) => {
                    let e = err!(e, "{}->{}{}", def.descriptor, desc.name, descriptor);
                    if !e.is_translation() || self.settings.method_errors == MethodErrorPolicy::Fail {
                        return Err(e);
                    }
                    warn!("Replacing body: {}", e);
                    stub(&e.to_string())
                }
            };
            self.visit_code(mv.as_mut(), &node);
        }
        mv.visit_end();
        Ok(())
    }

    fn visit_code(&self, mv: &mut dyn MethodVisitor, node: &CodeNode) {
        if let Some(mut code) = mv.visit_code() {
            node.accept(code.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jvm::{ACC_ABSTRACT, ACC_FINAL};

    #[test]
    fn class_header_drops_member_only_flags() {
        // private static nested class
        assert_eq!(class_access(0x2 | 0x8 | 0x10), ACC_FINAL | ACC_SUPER);
        assert_eq!(class_access(0x4), ACC_PUBLIC | ACC_SUPER);
        assert_eq!(class_access(0x1 | 0x200 | 0x400), ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
    }

    #[test]
    fn constructor_and_declared_synchronized() {
        assert_eq!(method_access(0x1 | 0x10000), ACC_PUBLIC);
        assert_eq!(method_access(0x1 | 0x20000), ACC_PUBLIC | ACC_SYNCHRONIZED);
    }

    #[test]
    fn member_class_names() {
        assert_eq!(simple_name("a/Outer$Inner"), Some("Inner"));
        assert_eq!(simple_name("a/Outer$1"), None);
        assert_eq!(simple_name("a/Plain"), None);
    }
}
