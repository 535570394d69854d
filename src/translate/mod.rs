//! Register-machine to stack-machine translation.
//!
//! [`ClassTranslator`] walks a class definition and feeds a [`ClassVisitor`]; each method body
//! goes through [`MethodRewriter`], which keeps an abstract register file to recover the types
//! Dalvik leaves implicit.

pub mod annotations;
pub mod class;
pub mod frame;
pub mod method;
pub mod registers;
pub mod rewriter;

pub use class::ClassTranslator;
pub use rewriter::{MethodContext, MethodRewriter};

use crate::dex::error::DexError;
use crate::dex::DexFile;
use crate::jvm::tree::ClassNode;
use crate::jvm::visitor::ClassVisitor;
use crate::settings::Settings;

/// Translates the class with the given descriptor into `cv`. Returns `false` when the file
/// does not define it.
pub fn translate_class(dex: &DexFile, descriptor: &str, settings: &Settings, cv: &mut dyn ClassVisitor) -> Result<bool, DexError> {
    let Some(def) = dex.find_class(descriptor)? else {
        return Ok(false);
    };
    ClassTranslator::new(dex, settings).translate(&def, cv)?;
    Ok(true)
}

/// Translates every class in the file into tree form, in definition order.
pub fn translate_all(dex: &DexFile, settings: &Settings) -> Result<Vec<ClassNode>, DexError> {
    let translator = ClassTranslator::new(dex, settings);
    let mut classes = vec![];
    for def in dex.class_defs() {
        let mut node = ClassNode::new();
        translator.translate(&def?, &mut node)?;
        classes.push(node);
    }
    Ok(classes)
}
