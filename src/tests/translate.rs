use pretty_assertions::assert_eq;

use crate::dex::annotations::Visibility;
use crate::dex::dex_file::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC};
use crate::dex::encoded_values::EncodedValue;
use crate::dex::error::DexError;
use crate::dex::DexFile;
use crate::jvm::insn::{ArithOp, Comparison, Condition, Constant, InvokeKind, Kind, MethodRef};
use crate::jvm::tree::{ClassNode, CodeEvent, CodeNode, Element, LocalVariable};
use crate::jvm::visitor::AnnotationValue;
use crate::jvm::{ConstantValue, Insn, ACC_SUPER};
use crate::settings::{MethodErrorPolicy, Settings};
use crate::tests::fixture::{Code, DebugProgram, DexBuilder, Try};
use crate::translate::{translate_all, translate_class};

const OWNER: &str = "Lcom/example/Sample;";

fn translate(bytes: Vec<u8>, settings: &Settings) -> Result<ClassNode, DexError> {
    let dex = DexFile::from_bytes(bytes)?;
    let mut node = ClassNode::new();
    assert!(translate_class(&dex, OWNER, settings, &mut node)?);
    Ok(node)
}

/// A class with a single public static method `run` of the given descriptor.
fn single_method(descriptor: &str, code: Code) -> Vec<u8> {
    let mut b = DexBuilder::new();
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    b.method_def(c, "run", descriptor, ACC_PUBLIC | ACC_STATIC, Some(code));
    b.build()
}

fn run_body(node: &ClassNode) -> &CodeNode {
    let m = node.methods.iter().find(|m| m.name == "run").unwrap();
    m.code.as_ref().unwrap()
}

fn insns(code: &CodeNode) -> Vec<Insn> {
    code.instructions().cloned().collect()
}

fn float(bits: u32) -> Insn {
    Insn::Const(Constant::Float(f32::from_bits(bits)))
}

#[test]
fn constant_used_as_float_becomes_float() {
    // const/4 v0, 0; add-float v1, v0, v0; return v1
    let bytes = single_method("()F", Code::new(2, 0, &[0x0012, 0x01a6, 0x0000, 0x010f]));
    let node = translate(bytes, &Settings::default()).unwrap();
    assert_eq!(
        insns(run_body(&node)),
        vec![
            float(0),
            Insn::Store(Kind::Float, 0),
            Insn::Load(Kind::Float, 0),
            Insn::Load(Kind::Float, 0),
            Insn::Arith(ArithOp::Add, Kind::Float),
            Insn::Store(Kind::Float, 1),
            Insn::Load(Kind::Float, 1),
            Insn::Return(Some(Kind::Float)),
        ]
    );
}

#[test]
fn constant_used_as_int_stays_int() {
    // const/4 v0, 1; add-int v1, v0, v0; return v1
    let bytes = single_method("()I", Code::new(2, 0, &[0x1012, 0x0190, 0x0000, 0x010f]));
    let node = translate(bytes, &Settings::default()).unwrap();
    let code = insns(run_body(&node));
    assert_eq!(code[0], Insn::Const(Constant::Int(1)));
    assert_eq!(code[1], Insn::Store(Kind::Int, 0));
    assert_eq!(code[4], Insn::Arith(ArithOp::Add, Kind::Int));
}

#[test]
fn untouched_constant_defaults_to_int() {
    // const/4 v0, 5; return-void
    let bytes = single_method("()V", Code::new(1, 0, &[0x5012, 0x000e]));
    let node = translate(bytes, &Settings::default()).unwrap();
    assert_eq!(insns(run_body(&node)), vec![Insn::Const(Constant::Int(5)), Insn::Store(Kind::Int, 0), Insn::Return(None)]);
}

#[test]
fn join_of_untyped_constants_resolves_both() {
    // if-eqz v1, :else; const/high16 v0, 1.0f; goto :end; :else const/high16 v0, 2.0f; :end return v0
    let code = Code::new(2, 1, &[0x0138, 0x0005, 0x0015, 0x3f80, 0x0328, 0x0015, 0x4000, 0x000f]);
    let node = translate(single_method("(I)F", code), &Settings::default()).unwrap();
    let code = insns(run_body(&node));
    assert!(code.contains(&float(0x3f80_0000)));
    assert!(code.contains(&float(0x4000_0000)));
    assert!(!code.iter().any(|i| matches!(i, Insn::Const(Constant::Int(_)))));
    assert_eq!(code.iter().filter(|i| **i == Insn::Store(Kind::Float, 1)).count(), 2);
}

/// Both branches write v0; the one named by `typed_first` also negates it as a float.
fn join_with_one_typed_branch(typed_first: bool) -> Vec<u16> {
    if typed_first {
        // if-eqz v1, :else; const/high16 v0, 1.0f; neg-float v0, v0; goto :end
        // :else const/high16 v0, 2.0f; :end return v0
        vec![0x0138, 0x0006, 0x0015, 0x3f80, 0x007f, 0x0328, 0x0015, 0x4000, 0x000f]
    } else {
        // if-eqz v1, :else; const/high16 v0, 1.0f; goto :end
        // :else const/high16 v0, 2.0f; neg-float v0, v0; :end return v0
        vec![0x0138, 0x0005, 0x0015, 0x3f80, 0x0428, 0x0015, 0x4000, 0x007f, 0x000f]
    }
}

#[test]
fn join_resolves_the_untyped_side_in_either_order() {
    for typed_first in [true, false] {
        let code = Code::new(2, 1, &join_with_one_typed_branch(typed_first));
        let node = translate(single_method("(I)F", code), &Settings::default()).unwrap();
        let code = insns(run_body(&node));
        assert!(code.contains(&float(0x3f80_0000)), "typed_first = {}", typed_first);
        assert!(code.contains(&float(0x4000_0000)), "typed_first = {}", typed_first);
        assert!(code.contains(&Insn::Arith(ArithOp::Neg, Kind::Float)));
        assert_eq!(code.last(), Some(&Insn::Return(Some(Kind::Float))));
    }
}

#[test]
fn conflicting_types_at_a_join_fail_the_class() {
    let mut b = DexBuilder::new();
    let s = b.string("s");
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    // if-eqz v1, :else; const-string v0, "s"; goto :end; :else int-to-float v0, v1; :end return v0
    let code = Code::new(2, 1, &[0x0138, 0x0005, 0x001a, s as u16, 0x0228, 0x1082, 0x000f]);
    b.method_def(c, "run", "(I)I", ACC_PUBLIC | ACC_STATIC, Some(code));
    let e = translate(b.build(), &Settings::default()).unwrap_err();
    assert!(e.is_translation(), "{}", e);
}

#[test]
fn zero_register_return_void() {
    let node = translate(single_method("()V", Code::new(0, 0, &[0x000e])), &Settings::default()).unwrap();
    let code = run_body(&node);
    assert_eq!(code.events.len(), 3);
    assert!(matches!(code.events[0], CodeEvent::Label(_)));
    assert_eq!(code.events[1], CodeEvent::Insn(Insn::Return(None)));
    assert!(matches!(code.events[2], CodeEvent::Label(_)));
    assert!(code.try_catch_blocks.is_empty());
    assert!(code.locals.is_empty());
}

#[test]
fn packed_switch_with_five_targets() {
    let mut insns = vec![
        0x012b, 0x0010, 0x0000, // packed-switch v1, :payload
        0x0012, 0x000f, // const/4 v0, 0; return v0
    ];
    for k in 1..=5u16 {
        insns.extend([(k << 12) | 0x0012, 0x000f]); // const/4 v0, k; return v0
    }
    insns.push(0x0000); // nop, aligns the payload
    insns.extend([0x0100, 5, 0, 0]);
    for target in [5u32, 7, 9, 11, 13] {
        insns.extend([target as u16, (target >> 16) as u16]);
    }
    let node = translate(single_method("(I)I", Code::new(2, 1, &insns)), &Settings::default()).unwrap();
    let code = run_body(&node);

    let Some(Insn::TableSwitch { low, default, targets }) = code.instructions().find(|i| matches!(i, Insn::TableSwitch { .. })) else {
        panic!("no tableswitch in {:?}", code.events);
    };
    assert_eq!(*low, 0);
    assert_eq!(targets.len(), 5);
    let after = |label| code.position(label).map(|p| code.events[p + 1].clone());
    assert_eq!(after(*default), Some(CodeEvent::Insn(Insn::Const(Constant::Int(0)))));
    for (k, t) in targets.iter().enumerate() {
        assert_eq!(after(*t), Some(CodeEvent::Insn(Insn::Const(Constant::Int(k as i32 + 1)))));
    }
}

#[test]
fn catch_all_handler_has_no_type() {
    let mut b = DexBuilder::new();
    let helper = b.method("Lcom/example/Helper;", "work", "()V");
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    // invoke-static {}, work; return-void; move-exception v0; return-void
    let mut code = Code::new(1, 0, &[0x0071, helper as u16, 0x0000, 0x000e, 0x000d, 0x000e]);
    code.tries.push(Try { start: 0, count: 3, handlers: vec![], catch_all: Some(4) });
    b.method_def(c, "run", "()V", ACC_PUBLIC | ACC_STATIC, Some(code));

    let node = translate(b.build(), &Settings::default()).unwrap();
    let code = run_body(&node);
    assert_eq!(code.try_catch_blocks.len(), 1);
    let block = &code.try_catch_blocks[0];
    assert_eq!(block.catch_type, None);
    assert_eq!(code.position(block.start), Some(0));
    // the range ends right before the return-void at 3, which it does not cover
    let end = code.position(block.end).unwrap();
    assert!(matches!(code.events[end - 1], CodeEvent::Insn(Insn::Invoke(..))));
    assert_eq!(code.events[end + 1], CodeEvent::Insn(Insn::Return(None)));
    let handler = code.position(block.handler).unwrap();
    assert_eq!(handler, end + 2);
    assert_eq!(code.events[handler + 1], CodeEvent::Insn(Insn::Store(Kind::Reference, 0)));
}

#[test]
fn constants_reaching_a_handler_keep_their_own_types() {
    let mut b = DexBuilder::new();
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    let mut code = Code::new(
        2,
        0,
        &[
            0x0012, // const/4 v0, 0
            0x0101, // move v1, v0
            0x0015, 0x3f80, // const/high16 v0, 1.0f
            0x01d8, 0x0101, // add-int/lit8 v1, v1, 1
            0x000f, // return v0
            0x000d, // move-exception v0
            0x0027, // throw v0
        ],
    );
    code.tries.push(Try { start: 2, count: 4, handlers: vec![], catch_all: Some(7) });
    b.method_def(c, "run", "()F", ACC_PUBLIC | ACC_STATIC, Some(code));

    let node = translate(b.build(), &Settings::default()).unwrap();
    assert_eq!(
        insns(run_body(&node)),
        vec![
            Insn::Const(Constant::Int(0)),
            Insn::Store(Kind::Int, 0),
            Insn::Load(Kind::Int, 0),
            Insn::Store(Kind::Int, 1),
            float(0x3f80_0000),
            Insn::Store(Kind::Float, 0),
            Insn::Load(Kind::Int, 1),
            Insn::Const(Constant::Int(1)),
            Insn::Arith(ArithOp::Add, Kind::Int),
            Insn::Store(Kind::Int, 1),
            Insn::Load(Kind::Float, 0),
            Insn::Return(Some(Kind::Float)),
            Insn::Store(Kind::Reference, 0),
            Insn::Load(Kind::Reference, 0),
            Insn::AThrow,
        ]
    );
}

#[test]
fn typed_handler_names_the_exception_class() {
    let mut b = DexBuilder::new();
    let helper = b.method("Lcom/example/Helper;", "work", "()V");
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    // invoke-static {}, work; return-void; move-exception v0; throw v0
    let mut code = Code::new(1, 0, &[0x0071, helper as u16, 0x0000, 0x000e, 0x000d, 0x0027]);
    code.tries.push(Try { start: 0, count: 3, handlers: vec![("Ljava/io/IOException;".to_string(), 4)], catch_all: None });
    b.method_def(c, "run", "()V", ACC_PUBLIC | ACC_STATIC, Some(code));

    let node = translate(b.build(), &Settings::default()).unwrap();
    let code = run_body(&node);
    assert_eq!(code.try_catch_blocks[0].catch_type.as_deref(), Some("java/io/IOException"));
    assert_eq!(
        insns(code)[2..],
        [Insn::Store(Kind::Reference, 0), Insn::Load(Kind::Reference, 0), Insn::AThrow]
    );
}

#[test]
fn one_named_parameter_gives_one_local() {
    let mut code = Code::new(1, 1, &[0x000e]);
    code.debug = Some(DebugProgram { line_start: 1, parameter_names: vec![Some("count".to_string())], program: vec![0x00] });
    let node = translate(single_method("(I)V", code), &Settings::default()).unwrap();
    let code = run_body(&node);
    assert_eq!(code.locals.len(), 1);
    let LocalVariable { name, desc, signature, start, end, slot } = &code.locals[0];
    assert_eq!((name.as_str(), desc.as_str(), signature.as_deref(), *slot), ("count", "I", None, 0));
    assert_eq!(code.position(*start), Some(0));
    assert_eq!(code.position(*end), Some(code.events.len() - 1));
}

#[test]
fn debug_info_can_be_switched_off() {
    let mut code = Code::new(1, 1, &[0x000e]);
    code.debug = Some(DebugProgram { line_start: 7, parameter_names: vec![Some("count".to_string())], program: vec![0x0e, 0x00] });
    let bytes = single_method("(I)V", code);

    let node = translate(bytes.clone(), &Settings::default()).unwrap();
    let start = run_body(&node).locals[0].start;
    assert_eq!(run_body(&node).line_numbers, vec![(7, start)]);

    let quiet = Settings { emit_debug_info: false, ..Settings::default() };
    let node = translate(bytes, &quiet).unwrap();
    assert!(run_body(&node).locals.is_empty());
    assert!(run_body(&node).line_numbers.is_empty());
}

#[test]
fn header_keeps_superclass_interfaces_and_signature() {
    let sig = "<T:Ljava/lang/Object;>Ljava/util/AbstractList<TT;>;Ljava/io/Serializable;";
    let mut b = DexBuilder::new();
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/util/AbstractList;"));
    b.interface(c, "Ljava/io/Serializable;");
    b.source_file(c, "Sample.java");
    let item = b.signature(sig);
    b.class_annotation(c, item);

    let node = translate(b.build(), &Settings::default()).unwrap();
    assert_eq!(node.version, 50);
    assert_eq!(node.access, crate::jvm::ACC_PUBLIC | ACC_SUPER);
    assert_eq!(node.name, "com/example/Sample");
    assert_eq!(node.super_name.as_deref(), Some("java/util/AbstractList"));
    assert_eq!(node.interfaces, vec!["java/io/Serializable".to_string()]);
    assert_eq!(node.signature.as_deref(), Some(sig));
    assert_eq!(node.source.as_deref(), Some("Sample.java"));
    // system annotations are consumed, not forwarded
    assert!(node.visible_annotations.is_empty() && node.invisible_annotations.is_empty());
}

#[test]
fn annotations_by_visibility_and_throws() {
    let mut b = DexBuilder::new();
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    let marker = b.annotation(Visibility::Runtime, "Lcom/example/Marker;", vec![("level", EncodedValue::Int(3))]);
    let hidden = b.annotation(Visibility::Build, "Lcom/example/Hidden;", vec![]);
    b.class_annotation(c, marker);
    b.class_annotation(c, hidden);

    let io = b.type_("Ljava/io/IOException;");
    let throws = b.annotation(Visibility::System, "Ldalvik/annotation/Throws;", vec![("value", EncodedValue::Array(vec![EncodedValue::Type(io)]))]);
    let nullable = b.annotation(Visibility::Runtime, "Lcom/example/Nullable;", vec![]);
    let m = b.method_def(c, "read", "(Ljava/lang/String;)V", ACC_PUBLIC, None);
    b.method_annotations(c, m, vec![throws], vec![vec![nullable]]);

    let node = translate(b.build(), &Settings::default()).unwrap();
    assert_eq!(node.visible_annotations.len(), 1);
    assert_eq!(node.visible_annotations[0].desc, "Lcom/example/Marker;");
    assert_eq!(node.visible_annotations[0].value("level"), Some(&Element::Value(AnnotationValue::Int(3))));
    assert_eq!(node.invisible_annotations[0].desc, "Lcom/example/Hidden;");

    let read = node.method("read", "(Ljava/lang/String;)V").unwrap();
    assert_eq!(read.exceptions, vec!["java/io/IOException".to_string()]);
    assert!(read.visible_annotations.is_empty());
    assert_eq!(read.parameter_annotations.len(), 1);
    assert_eq!(read.parameter_annotations[0].0, 0);
    assert_eq!(read.parameter_annotations[0].1.desc, "Lcom/example/Nullable;");
    assert!(read.code.is_none());
}

#[test]
fn static_values_become_constants() {
    let mut b = DexBuilder::new();
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    let name = b.string("sample");
    b.static_field(c, "ANSWER", "I", ACC_PUBLIC | ACC_STATIC | ACC_FINAL, Some(EncodedValue::Int(42)));
    b.static_field(c, "NAME", "Ljava/lang/String;", ACC_PUBLIC | ACC_STATIC | ACC_FINAL, Some(EncodedValue::String(name)));
    b.static_field(c, "FLAG", "Z", ACC_STATIC, Some(EncodedValue::Boolean(true)));
    b.static_field(c, "OTHER", "Ljava/lang/Object;", ACC_STATIC, None);
    b.instance_field(c, "count", "J", 0x2, vec![]);

    let node = translate(b.build(), &Settings::default()).unwrap();
    assert_eq!(node.field("ANSWER").unwrap().value, Some(ConstantValue::Int(42)));
    assert_eq!(node.field("NAME").unwrap().value, Some(ConstantValue::String("sample".to_string())));
    assert_eq!(node.field("FLAG").unwrap().value, Some(ConstantValue::Int(1)));
    assert_eq!(node.field("OTHER").unwrap().value, None);
    assert_eq!(node.field("count").unwrap().desc, "J");
    assert_eq!(node.field("count").unwrap().access, 0x2);
}

#[test]
fn invoke_result_is_stored_or_popped() {
    let mut b = DexBuilder::new();
    let twice = b.method("Lcom/example/Helper;", "twice", "(I)I");
    let wide = b.method("Lcom/example/Helper;", "stamp", "()J");
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    let code = Code::new(
        2,
        1,
        &[
            0x1071, twice as u16, 0x0001, // invoke-static {v1}, twice
            0x000a, // move-result v0
            0x0071, wide as u16, 0x0000, // invoke-static {}, stamp
            0x000f, // return v0
        ],
    );
    b.method_def(c, "run", "(I)I", ACC_PUBLIC | ACC_STATIC, Some(code));

    let node = translate(b.build(), &Settings::default()).unwrap();
    let helper = |name: &str, desc: &str| {
        Insn::Invoke(InvokeKind::Static, MethodRef { owner: "com/example/Helper".to_string(), name: name.to_string(), desc: desc.to_string() })
    };
    assert_eq!(
        insns(run_body(&node)),
        vec![
            Insn::Load(Kind::Int, 0),
            helper("twice", "(I)I"),
            Insn::Store(Kind::Int, 1),
            helper("stamp", "()J"),
            Insn::Pop2,
            Insn::Load(Kind::Int, 1),
            Insn::Return(Some(Kind::Int)),
        ]
    );
}

#[test]
fn int_register_read_as_float_keeps_its_bits() {
    // return v0, with v0 the int parameter of a float method
    let node = translate(single_method("(I)F", Code::new(1, 1, &[0x000f])), &Settings::default()).unwrap();
    assert_eq!(
        insns(run_body(&node)),
        vec![
            Insn::Load(Kind::Int, 0),
            Insn::Invoke(
                InvokeKind::Static,
                MethodRef { owner: "java/lang/Float".to_string(), name: "intBitsToFloat".to_string(), desc: "(I)F".to_string() }
            ),
            Insn::Return(Some(Kind::Float)),
        ]
    );
}

#[test]
fn instance_method_receiver_sits_in_slot_zero() {
    let mut b = DexBuilder::new();
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    // 3 registers, 2 ins: v1 = this, v2 = other; if-ne v1, v2, :ne; return-void; :ne return-void
    let code = Code::new(3, 2, &[0x2133, 0x0003, 0x000e, 0x000e]);
    b.method_def(c, "same", "(Lcom/example/Sample;)V", ACC_PUBLIC, Some(code));

    let node = translate(b.build(), &Settings::default()).unwrap();
    let code = node.method("same", "(Lcom/example/Sample;)V").unwrap().code.as_ref().unwrap();
    let insns = insns(code);
    assert_eq!(insns[0], Insn::Load(Kind::Reference, 0));
    assert_eq!(insns[1], Insn::Load(Kind::Reference, 1));
    assert!(matches!(insns[2], Insn::Jump(Condition::ACmpNe, _)));
}

#[test]
fn zero_test_on_untyped_register_follows_its_use() {
    // const/4 v0, 0; if-eqz v0, :end; :end return v0 as an object
    let bytes = single_method("()Ljava/lang/Object;", Code::new(1, 0, &[0x0012, 0x0038, 0x0002, 0x0011]));
    let node = translate(bytes, &Settings::default()).unwrap();
    let code = insns(run_body(&node));
    assert_eq!(code[0], Insn::Const(Constant::Null));
    assert!(matches!(code[3], Insn::Jump(Condition::Null, _)));
    assert!(!code.iter().any(|i| matches!(i, Insn::Jump(Condition::Zero(Comparison::Eq), _))));
}

fn broken_and_fine() -> Vec<u8> {
    let mut b = DexBuilder::new();
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    // return v0 before anything was written to v0
    b.method_def(c, "broken", "()I", ACC_PUBLIC | ACC_STATIC, Some(Code::new(1, 0, &[0x000f])));
    b.method_def(c, "fine", "()V", ACC_PUBLIC | ACC_STATIC, Some(Code::new(0, 0, &[0x000e])));
    b.build()
}

#[test]
fn failing_method_fails_the_class() {
    let e = translate(broken_and_fine(), &Settings::default()).unwrap_err();
    assert!(e.is_translation());
    assert!(e.to_string().contains("broken"), "{}", e);
}

#[test]
fn failing_method_is_stubbed_when_asked() {
    let settings = Settings { method_errors: MethodErrorPolicy::Stub, ..Settings::default() };
    let node = translate(broken_and_fine(), &settings).unwrap();
    let broken = insns(node.method("broken", "()I").unwrap().code.as_ref().unwrap());
    assert_eq!(broken[0], Insn::New("java/lang/RuntimeException".to_string()));
    assert_eq!(broken.last(), Some(&Insn::AThrow));
    let fine = insns(node.method("fine", "()V").unwrap().code.as_ref().unwrap());
    assert_eq!(fine, vec![Insn::Return(None)]);
}

#[test]
fn translating_twice_gives_the_same_calls() {
    let mut b = DexBuilder::new();
    let c = b.class(OWNER, ACC_PUBLIC, Some("Ljava/lang/Object;"));
    b.static_field(c, "ANSWER", "I", ACC_STATIC, Some(EncodedValue::Int(42)));
    let mut code = Code::new(2, 1, &join_with_one_typed_branch(true));
    code.debug = Some(DebugProgram { line_start: 3, parameter_names: vec![Some("n".to_string())], program: vec![0x0e, 0x2e, 0x00] });
    b.method_def(c, "run", "(I)F", ACC_PUBLIC | ACC_STATIC, Some(code));
    let bytes = b.build();

    let dex = DexFile::from_bytes(bytes).unwrap();
    let first = translate_all(&dex, &Settings::default()).unwrap();
    let second = translate_all(&dex, &Settings::default()).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first, second);

    let mut replayed = ClassNode::new();
    first[0].accept(&mut replayed);
    assert_eq!(replayed, first[0]);
}
