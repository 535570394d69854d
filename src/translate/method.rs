//! One method body: label scan, debug info, rewrite, and the local variable table.

use log::debug;

use crate::dex::class_data::CodeItem;
use crate::dex::debug_info::DebugInfo;
use crate::dex::decoder::{decode_method, scan_labels, LabelTable};
use crate::dex::error::DexError;
use crate::dex::DexFile;
use crate::jvm::insn::{Constant, InvokeKind, MethodRef};
use crate::jvm::tree::{CodeEvent, CodeNode, LocalVariable};
use crate::jvm::Insn;
use crate::settings::Settings;
use crate::translate::registers::RegisterMap;
use crate::translate::rewriter::{MethodContext, MethodRewriter};

const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";

pub fn translate_code(dex: &DexFile, method: &MethodContext, code: &CodeItem, source_file: Option<&str>, settings: &Settings) -> Result<CodeNode, DexError> {
    let mut labels = scan_labels(code)?;
    let debug_info = if settings.emit_debug_info && code.debug_info_off != 0 {
        Some(DebugInfo::read(dex, code.debug_info_off, source_file, &mut labels)?)
    } else {
        None
    };

    let mut rewriter = MethodRewriter::new(dex, method, code, &labels)?;
    decode_method(dex, code, &labels, &mut rewriter)?;
    let map = rewriter.register_map();
    let (try_catch_blocks, events) = rewriter.finish()?;

    let mut node = CodeNode { try_catch_blocks, events, line_numbers: vec![], locals: vec![] };
    if let Some(info) = debug_info {
        attach_debug_info(&mut node, info, method, &map, &labels, source_file)?;
    }
    Ok(node)
}

fn attach_debug_info(node: &mut CodeNode, info: DebugInfo, method: &MethodContext, map: &RegisterMap, labels: &LabelTable, source_file: Option<&str>) -> Result<(), DexError> {
    for line in info.lines {
        if line.source_file.is_some() && line.source_file.as_deref() != source_file {
            debug!("Line {} belongs to {:?}, keeping it against the class source", line.line, line.source_file);
        }
        node.line_numbers.push((line.line, line.label));
    }

    let (start, end) = match labels.label_at(0) {
        Some(start) => (start, labels.end_label()),
        None => untranslatable!("Method has no entry label"),
    };
    let mut slot = if method.is_static { 0 } else { 1 };
    for (arg, name) in method.signature.args.iter().zip(&info.parameter_names) {
        if let Some(name) = name {
            node.locals.push(LocalVariable {
                name: name.clone(),
                desc: arg.to_jni(),
                signature: None,
                start,
                end,
                slot,
            });
        }
        slot += arg.slots();
    }

    let parameters = node.locals.len();
    for scope in info.locals {
        let slot = map.slot(scope.register)?;
        let repeats_parameter = node.locals[..parameters].iter().any(|p| p.slot == slot && p.name == scope.name);
        if repeats_parameter {
            continue;
        }
        node.locals.push(LocalVariable {
            name: scope.name,
            desc: scope.descriptor,
            signature: scope.signature,
            start: scope.start,
            end: scope.end,
            slot,
        });
    }
    Ok(())
}

/// A body that throws `RuntimeException` with `message`.
pub fn stub(message: &str) -> CodeNode {
    let insns = vec![
        Insn::New(RUNTIME_EXCEPTION.to_string()),
        Insn::Dup,
        Insn::Const(Constant::String(message.to_string())),
        Insn::Invoke(
            InvokeKind::Special,
            MethodRef { owner: RUNTIME_EXCEPTION.to_string(), name: "<init>".to_string(), desc: "(Ljava/lang/String;)V".to_string() },
        ),
        Insn::AThrow,
    ];
    CodeNode { events: insns.into_iter().map(CodeEvent::Insn).collect(), ..CodeNode::default() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_throws() {
        let node = stub("boom");
        let insns: Vec<&Insn> = node.instructions().collect();
        assert_eq!(insns.len(), 5);
        assert_eq!(insns[0], &Insn::New("java/lang/RuntimeException".to_string()));
        assert_eq!(insns[2], &Insn::Const(Constant::String("boom".to_string())));
        assert_eq!(insns[4], &Insn::AThrow);
        assert!(node.try_catch_blocks.is_empty());
    }
}
