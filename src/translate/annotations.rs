//! DEX annotations as visitor calls, and the `dalvik/annotation` system annotations that
//! carry class file attributes.

use log::{debug, warn};

use crate::dex::annotations::{AnnotationItem, Visibility};
use crate::dex::encoded_values::{EncodedAnnotation, EncodedValue};
use crate::dex::error::DexError;
use crate::dex::DexFile;
use crate::jvm::visitor::{AnnotationValue, AnnotationVisitor};
use crate::types::TypeSignature;

const SIGNATURE: &str = "Ldalvik/annotation/Signature;";
const THROWS: &str = "Ldalvik/annotation/Throws;";
const INNER_CLASS: &str = "Ldalvik/annotation/InnerClass;";
const ENCLOSING_CLASS: &str = "Ldalvik/annotation/EnclosingClass;";
const ENCLOSING_METHOD: &str = "Ldalvik/annotation/EnclosingMethod;";
const MEMBER_CLASSES: &str = "Ldalvik/annotation/MemberClasses;";
const ANNOTATION_DEFAULT: &str = "Ldalvik/annotation/AnnotationDefault;";

/// Annotations that are written to the class file, by descriptor and visibility.
pub fn user_annotations<'a>(dex: &'a DexFile, items: &'a [AnnotationItem]) -> Result<Vec<(&'a str, bool, &'a EncodedAnnotation)>, DexError> {
    let mut out = vec![];
    for item in items {
        let visible = match item.visibility {
            Visibility::Runtime => true,
            Visibility::Build => false,
            Visibility::System => continue,
        };
        out.push((dex.type_descriptor(item.annotation.type_idx)?, visible, &item.annotation));
    }
    Ok(out)
}

/// Feeds the elements of `annotation` to `av` and ends it.
pub fn accept_annotation(dex: &DexFile, annotation: &EncodedAnnotation, av: &mut dyn AnnotationVisitor) -> Result<(), DexError> {
    for element in &annotation.elements {
        let name = dex.string(element.name_idx)?;
        accept_value(dex, Some(name), &element.value, av)?;
    }
    av.visit_end();
    Ok(())
}

pub fn accept_value(dex: &DexFile, name: Option<&str>, value: &EncodedValue, av: &mut dyn AnnotationVisitor) -> Result<(), DexError> {
    let leaf = match value {
        EncodedValue::Byte(v) => AnnotationValue::Byte(*v),
        EncodedValue::Short(v) => AnnotationValue::Short(*v),
        EncodedValue::Char(v) => AnnotationValue::Char(*v),
        EncodedValue::Int(v) => AnnotationValue::Int(*v),
        EncodedValue::Long(v) => AnnotationValue::Long(*v),
        EncodedValue::Float(v) => AnnotationValue::Float(*v),
        EncodedValue::Double(v) => AnnotationValue::Double(*v),
        EncodedValue::Boolean(v) => AnnotationValue::Boolean(*v),
        EncodedValue::String(idx) => AnnotationValue::String(dex.string(*idx)?.to_string()),
        EncodedValue::Type(idx) => AnnotationValue::Class(dex.type_descriptor(*idx)?.to_string()),
        EncodedValue::Enum(idx) => {
            let field = dex.field(*idx)?;
            av.visit_enum(name, field.type_, field.name);
            return Ok(());
        }
        EncodedValue::Annotation(nested) => {
            let desc = dex.type_descriptor(nested.type_idx)?;
            if let Some(mut child) = av.visit_annotation(name, desc) {
                accept_annotation(dex, nested, child.as_mut())?;
            }
            return Ok(());
        }
        EncodedValue::Array(values) => {
            if let Some(mut child) = av.visit_array(name) {
                for v in values {
                    accept_value(dex, None, v, child.as_mut())?;
                }
                child.visit_end();
            }
            return Ok(());
        }
        EncodedValue::Null => {
            debug!("Dropping null annotation value {:?}", name);
            return Ok(());
        }
        other => {
            warn!("Annotation value {:?} has no class file form", other);
            return Ok(());
        }
    };
    av.visit(name, leaf);
    Ok(())
}

/// `dalvik/annotation/InnerClass`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
    pub name: Option<String>,
    pub access_flags: u16,
}

/// `dalvik/annotation/EnclosingMethod`, as an owner internal name, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

/// The system annotations of one class, field or method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemAnnotations {
    pub signature: Option<String>,
    /// Internal names of declared exceptions
    pub throws: Vec<String>,
    pub inner_class: Option<InnerClass>,
    /// Internal name of the enclosing class
    pub enclosing_class: Option<String>,
    pub enclosing_method: Option<EnclosingMethod>,
    /// Internal names of member classes
    pub member_classes: Vec<String>,
    /// Default values of an annotation type's elements
    pub annotation_default: Option<EncodedAnnotation>,
}

fn internal_name(descriptor: &str) -> Result<String, DexError> {
    Ok(TypeSignature::from_descriptor(descriptor)?.internal_name())
}

fn type_names(dex: &DexFile, value: Option<&EncodedValue>) -> Result<Vec<String>, DexError> {
    let mut out = vec![];
    if let Some(EncodedValue::Array(values)) = value {
        for v in values {
            if let EncodedValue::Type(idx) = v {
                out.push(internal_name(dex.type_descriptor(*idx)?)?);
            }
        }
    }
    Ok(out)
}

impl SystemAnnotations {
    pub fn read(dex: &DexFile, items: &[AnnotationItem]) -> Result<SystemAnnotations, DexError> {
        let mut sys = SystemAnnotations::default();
        for item in items.iter().filter(|i| i.visibility == Visibility::System) {
            let ann = &item.annotation;
            let element = |name: &str| ann.element(name, |idx| dex.string(idx).ok());
            let descriptor = dex.type_descriptor(ann.type_idx)?;
            match descriptor {
                SIGNATURE => {
                    // the signature is split into an array of string fragments
                    if let Some(EncodedValue::Array(parts)) = element("value") {
                        let mut s = String::new();
                        for p in parts {
                            if let EncodedValue::String(idx) = p {
                                s.push_str(dex.string(*idx)?);
                            }
                        }
                        sys.signature = Some(s);
                    }
                }
                THROWS => sys.throws = type_names(dex, element("value"))?,
                MEMBER_CLASSES => sys.member_classes = type_names(dex, element("value"))?,
                INNER_CLASS => {
                    let name = match element("name") {
                        Some(EncodedValue::String(idx)) => Some(dex.string(*idx)?.to_string()),
                        _ => None,
                    };
                    let access_flags = match element("accessFlags") {
                        Some(EncodedValue::Int(v)) => *v as u16,
                        _ => 0,
                    };
                    sys.inner_class = Some(InnerClass { name, access_flags });
                }
                ENCLOSING_CLASS => {
                    if let Some(EncodedValue::Type(idx)) = element("value") {
                        sys.enclosing_class = Some(internal_name(dex.type_descriptor(*idx)?)?);
                    }
                }
                ENCLOSING_METHOD => {
                    if let Some(EncodedValue::Method(idx)) = element("value") {
                        let m = dex.method(*idx)?;
                        sys.enclosing_method = Some(EnclosingMethod {
                            owner: internal_name(m.class)?,
                            name: m.name.to_string(),
                            desc: m.proto.descriptor(),
                        });
                    }
                }
                ANNOTATION_DEFAULT => sys.annotation_default = element("value").and_then(|v| v.as_annotation()).cloned(),
                other => debug!("Ignoring system annotation {}", other),
            }
        }
        Ok(sys)
    }
}
