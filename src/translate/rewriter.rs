//! Rewrites one Dalvik method body into stack-machine instructions.
//!
//! Every register operand becomes a load or store of the register's slot. Registers written by
//! `const` and untyped `move` carry a [`Group`] until a consumer reveals whether the value is an
//! int, a float or a null reference; the placeholders emitted so far are then retyped in place.

use std::collections::HashMap;

use log::{debug, trace};
use rangemap::RangeMap;

use crate::dex::class_data::CodeItem;
use crate::dex::decoder::{InstructionSink, LabelTable};
use crate::dex::error::DexError;
use crate::dex::instructions::{
    AccessType, ArrayData, BinaryOperation, CompareType, DexInstruction, FieldReference, InvokeKind, MethodReference,
    MoveKind, TestType, UnaryOperation,
};
use crate::dex::opcodes::Opcode;
use crate::dex::DexFile;
use crate::jvm::insn::{
    ArithOp, ArrayKind, CompareMode, Comparison, Condition, Constant, FieldRef, InvokeKind as JvmInvoke, Kind, MethodRef,
    Narrow,
};
use crate::jvm::tree::{CodeEvent, TryCatchBlock};
use crate::jvm::{Insn, Label};
use crate::translate::frame::{Arrival, Frame, Patches};
use crate::translate::registers::{Group, RegisterMap, RegisterType};
use crate::types::{MethodSignature, TypeSignature};

const THROWABLE: &str = "java/lang/Throwable";

/// The method being rewritten, as far as the rewriter needs to know it.
#[derive(Debug, Clone)]
pub struct MethodContext {
    pub owner: TypeSignature,
    pub is_static: bool,
    pub signature: MethodSignature,
}

pub struct MethodRewriter<'a> {
    method: &'a MethodContext,
    labels: &'a LabelTable,
    map: RegisterMap,
    events: Vec<CodeEvent>,
    patches: Patches,
    frame: Frame,
    joins: HashMap<Label, Frame>,
    /// Handler labels covering each instruction address
    covered: RangeMap<u32, Vec<Label>>,
    /// What a handler finds on the stack when it is entered
    caught: HashMap<Label, TypeSignature>,
    try_catch_blocks: Vec<TryCatchBlock>,
    /// The invoke result or caught exception sitting on the stack, if any
    pending: Option<TypeSignature>,
    /// Whether the previous instruction never falls through
    terminal: bool,
}

impl<'a> MethodRewriter<'a> {
    pub fn new(dex: &DexFile, method: &'a MethodContext, code: &CodeItem, labels: &'a LabelTable) -> Result<MethodRewriter<'a>, DexError> {
        let map = RegisterMap::new(code.registers_size, code.ins_size)?;
        let frame = entry_frame(method, &map)?;

        let mut covered = RangeMap::new();
        let mut caught: HashMap<Label, TypeSignature> = HashMap::new();
        let mut try_catch_blocks = vec![];
        for t in &code.tries {
            let Some(handler) = code.handler_for(t) else {
                untranslatable!("Try block at 0x{:04x} has no handler at offset {}", t.start_addr, t.handler_off);
            };
            let start = label_at(labels, t.start_addr)?;
            let end = label_at(labels, labels.snap(t.end_addr()))?;

            let mut pairs: Vec<(Option<&str>, u32)> = vec![];
            for p in &handler.handlers {
                pairs.push((Some(dex.type_descriptor(p.type_idx)?), p.addr));
            }
            if let Some(addr) = handler.catch_all_addr {
                pairs.push((None, addr));
            }

            let mut targets = vec![];
            for (descriptor, addr) in pairs {
                let label = label_at(labels, addr)?;
                let ty = match descriptor {
                    Some(d) => TypeSignature::from_descriptor(d)?,
                    None => TypeSignature::object(THROWABLE),
                };
                try_catch_blocks.push(TryCatchBlock {
                    start,
                    end,
                    handler: label,
                    catch_type: descriptor.map(|_| ty.internal_name()),
                });
                caught
                    .entry(label)
                    .and_modify(|known| {
                        if *known != ty {
                            *known = TypeSignature::object(THROWABLE);
                        }
                    })
                    .or_insert(ty);
                targets.push(label);
            }
            if t.start_addr < t.end_addr() {
                covered.insert(t.start_addr..t.end_addr(), targets);
            }
        }

        Ok(MethodRewriter {
            method,
            labels,
            map,
            events: vec![],
            patches: Patches::new(),
            frame,
            joins: HashMap::new(),
            covered,
            caught,
            try_catch_blocks,
            pending: None,
            terminal: false,
        })
    }

    pub fn register_map(&self) -> RegisterMap {
        self.map
    }

    /// Types every register nothing constrained and returns the body.
    pub fn finish(mut self) -> Result<(Vec<TryCatchBlock>, Vec<CodeEvent>), DexError> {
        self.patches.resolve_defaults(&mut self.events)?;
        Ok((self.try_catch_blocks, self.events))
    }

    fn emit(&mut self, insn: Insn) -> usize {
        trace!("  {}", insn);
        self.events.push(CodeEvent::Insn(insn));
        self.events.len() - 1
    }

    fn emit_site(&mut self, g: Group, insn: Insn) {
        let site = self.emit(insn);
        self.patches.add_site(g, site);
    }

    fn state(&self, reg: u16) -> Result<RegisterType, DexError> {
        self.frame.get(reg, &self.patches)
    }

    fn arrive(&mut self, label: Label, arrival: Arrival) -> Result<(), DexError> {
        match self.joins.get_mut(&label) {
            Some(stored) => stored.merge(&self.frame, arrival, &mut self.patches, &mut self.events)?,
            None => {
                self.joins.insert(label, self.frame.clone());
            }
        }
        Ok(())
    }

    fn discard_pending(&mut self) {
        if let Some(ty) = self.pending.take() {
            self.emit(if ty.is_wide() { Insn::Pop2 } else { Insn::Pop });
        }
    }

    /// Pushes `reg` as a value of type `ty`, fixing the register's type if it was still open.
    fn load(&mut self, reg: u16, ty: &TypeSignature) -> Result<(), DexError> {
        let want = kind_of(ty)?;
        let slot = self.map.slot(reg)?;
        match self.state(reg)? {
            RegisterType::Unknown => untranslatable!("v{} is read as {} before it holds a value", reg, ty),
            RegisterType::Concrete(have) => {
                let have = kind_of(&have)?;
                self.emit(Insn::Load(have, slot));
                if have != want {
                    self.reinterpret(reg, have, want)?;
                }
            }
            untyped @ (RegisterType::Untyped32(_) | RegisterType::Untyped64(_)) => {
                if untyped.is_wide() != ty.is_wide() {
                    untranslatable!("v{} holds a {} value but is read as {}", reg, untyped, ty);
                }
                if let Some(g) = untyped.group() {
                    self.patches.resolve(g, ty, &mut self.events)?;
                }
                self.emit(Insn::Load(want, slot));
            }
        }
        Ok(())
    }

    /// Pushes `reg` with whatever type it has, emitting a placeholder if the type is open.
    fn load_as_is(&mut self, reg: u16) -> Result<RegisterType, DexError> {
        let slot = self.map.slot(reg)?;
        let state = self.state(reg)?;
        match &state {
            RegisterType::Unknown => untranslatable!("v{} is read before it holds a value", reg),
            RegisterType::Concrete(t) => {
                let k = kind_of(t)?;
                self.emit(Insn::Load(k, slot));
            }
            RegisterType::Untyped32(g) => self.emit_site(*g, Insn::Load(Kind::Int, slot)),
            RegisterType::Untyped64(g) => self.emit_site(*g, Insn::Load(Kind::Long, slot)),
        }
        Ok(state)
    }

    /// Same-width registers used with a different type hold the raw bits of the value.
    fn reinterpret(&mut self, reg: u16, have: Kind, want: Kind) -> Result<(), DexError> {
        let (owner, name, desc) = match (have, want) {
            (Kind::Int, Kind::Float) => ("java/lang/Float", "intBitsToFloat", "(I)F"),
            (Kind::Float, Kind::Int) => ("java/lang/Float", "floatToRawIntBits", "(F)I"),
            (Kind::Long, Kind::Double) => ("java/lang/Double", "longBitsToDouble", "(J)D"),
            (Kind::Double, Kind::Long) => ("java/lang/Double", "doubleToRawLongBits", "(D)J"),
            _ => untranslatable!("v{} holds a {:?} value but is read as {:?}", reg, have, want),
        };
        debug!("Reinterpreting v{} from {:?} to {:?}", reg, have, want);
        self.emit(Insn::Invoke(
            JvmInvoke::Static,
            MethodRef { owner: owner.to_string(), name: name.to_string(), desc: desc.to_string() },
        ));
        Ok(())
    }

    fn store(&mut self, reg: u16, ty: TypeSignature) -> Result<(), DexError> {
        let slot = self.map.slot(reg)?;
        self.emit(Insn::Store(kind_of(&ty)?, slot));
        self.frame.set(reg, RegisterType::Concrete(ty))
    }

    /// Stores the value on the stack, whose state is `state`, into `reg`.
    fn store_as(&mut self, reg: u16, state: RegisterType) -> Result<(), DexError> {
        let slot = self.map.slot(reg)?;
        match &state {
            RegisterType::Concrete(t) => return self.store(reg, t.clone()),
            RegisterType::Untyped32(g) => self.emit_site(*g, Insn::Store(Kind::Int, slot)),
            RegisterType::Untyped64(g) => self.emit_site(*g, Insn::Store(Kind::Long, slot)),
            RegisterType::Unknown => untranslatable!("Cannot store an unknown value into v{}", reg),
        }
        self.frame.set(reg, state)
    }

    fn constant(&mut self, reg: u16, value: Constant, wide: bool) -> Result<(), DexError> {
        let g = self.patches.group(wide);
        self.emit_site(g, Insn::Const(value));
        self.store_as(reg, if wide { RegisterType::Untyped64(g) } else { RegisterType::Untyped32(g) })
    }

    /// The array type held by `reg` for an access of class `access`.
    fn array_type(&self, reg: u16, access: AccessType) -> Result<(TypeSignature, TypeSignature), DexError> {
        match self.state(reg)? {
            RegisterType::Concrete(TypeSignature::Array(element)) => {
                let array = TypeSignature::Array(element.clone());
                Ok((array, *element))
            }
            RegisterType::Concrete(t @ TypeSignature::Object(_)) => match access.implied_type() {
                Some(e) => Ok((TypeSignature::Array(Box::new(e.clone())), e)),
                None => untranslatable!("v{} of type {} is not an array", reg, t),
            },
            other => untranslatable!("v{} is used as an array but holds {}", reg, other),
        }
    }

    fn translate(&mut self, insn: DexInstruction) -> Result<(), DexError> {
        use DexInstruction as D;

        match insn {
            D::Nop => {}
            D::Move(kind, dest, src) => {
                if kind == MoveKind::Object {
                    if let Some(g) = self.state(src)?.group() {
                        self.patches.resolve(g, &TypeSignature::object("java/lang/Object"), &mut self.events)?;
                    }
                }
                let state = self.load_as_is(src)?;
                if state.is_wide() != (kind == MoveKind::Wide) {
                    untranslatable!("move{} of v{} holding {}", if kind == MoveKind::Wide { "-wide" } else { "" }, src, state);
                }
                self.store_as(dest, state)?;
            }
            D::MoveResult(kind, dest) => {
                let Some(ty) = self.pending.take() else {
                    untranslatable!("move-result into v{} without a preceding result", dest);
                };
                if ty.is_wide() != (kind == MoveKind::Wide) || (kind == MoveKind::Object) != ty.is_reference() {
                    untranslatable!("move-result of the wrong width for {}", ty);
                }
                self.store(dest, ty)?;
            }
            D::MoveException(dest) => {
                let Some(ty) = self.pending.take() else {
                    untranslatable!("move-exception into v{} outside of a handler", dest);
                };
                self.store(dest, ty)?;
            }
            D::ReturnVoid => {
                self.emit(Insn::Return(None));
            }
            D::Return(_, reg) => {
                let result = self.method.signature.result.clone();
                self.load(reg, &result)?;
                self.emit(Insn::Return(Some(kind_of(&result)?)));
            }
            D::Const(dest, v) => self.constant(dest, Constant::Int(v), false)?,
            D::ConstWide(dest, v) => self.constant(dest, Constant::Long(v), true)?,
            D::ConstString(dest, s) => {
                self.emit(Insn::Const(Constant::String(s)));
                self.store(dest, TypeSignature::object("java/lang/String"))?;
            }
            D::ConstClass(dest, t) => {
                self.emit(Insn::Const(Constant::Class(t.internal_name())));
                self.store(dest, TypeSignature::object("java/lang/Class"))?;
            }
            D::MonitorEnter(reg) => {
                self.load(reg, &TypeSignature::object("java/lang/Object"))?;
                self.emit(Insn::MonitorEnter);
            }
            D::MonitorExit(reg) => {
                self.load(reg, &TypeSignature::object("java/lang/Object"))?;
                self.emit(Insn::MonitorExit);
            }
            D::CheckCast(reg, t) => {
                self.load(reg, &t)?;
                self.emit(Insn::CheckCast(t.internal_name()));
                self.store(reg, t)?;
            }
            D::InstanceOf(dest, src, t) => {
                self.load(src, &TypeSignature::object("java/lang/Object"))?;
                self.emit(Insn::InstanceOf(t.internal_name()));
                self.store(dest, TypeSignature::Bool)?;
            }
            D::ArrayLength(dest, src) => {
                let (array, _) = self.array_type(src, AccessType::Object)?;
                self.load(src, &array)?;
                self.emit(Insn::ArrayLength);
                self.store(dest, TypeSignature::Int)?;
            }
            D::NewInstance(dest, t) => {
                self.emit(Insn::New(t.internal_name()));
                self.store(dest, t)?;
            }
            D::NewArray(dest, size, t) => {
                let Some(element) = t.element_type().cloned() else {
                    untranslatable!("new-array of non-array type {}", t);
                };
                self.load(size, &TypeSignature::Int)?;
                self.emit(Insn::NewArray(element));
                self.store(dest, t)?;
            }
            D::FilledNewArray(regs, t) => self.filled_new_array(&regs, t)?,
            D::FillArrayData(reg, data) => self.fill_array_data(reg, &data)?,
            D::Throw(reg) => {
                self.load(reg, &TypeSignature::object(THROWABLE))?;
                self.emit(Insn::AThrow);
            }
            D::Goto(target) => {
                self.arrive(target, Arrival::Branch)?;
                self.emit(Insn::Jump(Condition::Always, target));
            }
            D::PackedSwitch(reg, first_key, targets, fallthrough) => {
                self.load(reg, &TypeSignature::Int)?;
                for t in targets.iter().chain(Some(&fallthrough)) {
                    self.arrive(*t, Arrival::Branch)?;
                }
                if targets.is_empty() {
                    self.emit(Insn::LookupSwitch { default: fallthrough, pairs: vec![] });
                } else {
                    self.emit(Insn::TableSwitch { low: first_key, default: fallthrough, targets });
                }
            }
            D::SparseSwitch(reg, pairs, fallthrough) => {
                self.load(reg, &TypeSignature::Int)?;
                for (_, t) in pairs.iter() {
                    self.arrive(*t, Arrival::Branch)?;
                }
                self.arrive(fallthrough, Arrival::Branch)?;
                self.emit(Insn::LookupSwitch { default: fallthrough, pairs });
            }
            D::Compare(ct, dest, a, b) => {
                let ty = ct.operand_type();
                self.load(a, &ty)?;
                self.load(b, &ty)?;
                self.emit(match ct {
                    CompareType::Long => Insn::LCmp,
                    CompareType::LessThanFloat => Insn::FCmp(CompareMode::L),
                    CompareType::GreaterThanFloat => Insn::FCmp(CompareMode::G),
                    CompareType::LessThanDouble => Insn::DCmp(CompareMode::L),
                    CompareType::GreaterThanDouble => Insn::DCmp(CompareMode::G),
                });
                self.store(dest, TypeSignature::Int)?;
            }
            D::If(test, a, b, target) => self.compare_registers(test, a, b, target)?,
            D::IfZ(test, reg, target) => self.compare_zero(test, reg, target)?,
            D::ArrayGet(access, dest, array, index) => {
                let (array_ty, element) = self.array_type(array, access)?;
                self.load(array, &array_ty)?;
                self.load(index, &TypeSignature::Int)?;
                self.emit(Insn::ArrayLoad(array_kind(&element)?));
                self.store(dest, element)?;
            }
            D::ArrayPut(access, value, array, index) => {
                let (array_ty, element) = self.array_type(array, access)?;
                self.load(array, &array_ty)?;
                self.load(index, &TypeSignature::Int)?;
                self.load(value, &element)?;
                self.emit(Insn::ArrayStore(array_kind(&element)?));
            }
            D::InstanceGet(_, dest, object, field) => {
                self.load(object, &field.class)?;
                self.emit(Insn::GetField(field_ref(&field)));
                self.store(dest, field.type_)?;
            }
            D::InstancePut(_, value, object, field) => {
                self.load(object, &field.class)?;
                self.load(value, &field.type_)?;
                self.emit(Insn::PutField(field_ref(&field)));
            }
            D::StaticGet(_, dest, field) => {
                self.emit(Insn::GetStatic(field_ref(&field)));
                self.store(dest, field.type_)?;
            }
            D::StaticPut(_, value, field) => {
                self.load(value, &field.type_)?;
                self.emit(Insn::PutStatic(field_ref(&field)));
            }
            D::Invoke(kind, regs, method) => self.invoke(kind, &regs, &method)?,
            D::Unary(op, dest, src) => self.unary(op, dest, src)?,
            D::Binary(op, dest, a, b) => {
                let ty = op.operand_type();
                let kind = kind_of(&ty)?;
                self.load(a, &ty)?;
                self.load(b, if op.is_shift() { &TypeSignature::Int } else { &ty })?;
                self.emit(Insn::Arith(arith_op(op), kind));
                self.store(dest, ty)?;
            }
            D::BinaryLit(op, dest, src, literal) => {
                self.load(src, &TypeSignature::Int)?;
                self.emit(Insn::Const(Constant::Int(literal)));
                self.emit(Insn::Arith(arith_op(op), Kind::Int));
                self.store(dest, TypeSignature::Int)?;
            }
            D::ReverseSubLit(dest, src, literal) => {
                self.emit(Insn::Const(Constant::Int(literal)));
                self.load(src, &TypeSignature::Int)?;
                self.emit(Insn::Arith(ArithOp::Sub, Kind::Int));
                self.store(dest, TypeSignature::Int)?;
            }
            D::Unsupported(name) => untranslatable!("{} has no stack-machine equivalent", name),
        }
        Ok(())
    }

    fn compare_registers(&mut self, test: TestType, a: u16, b: u16, target: Label) -> Result<(), DexError> {
        let cmp = comparison(test);
        let (sa, sb) = (self.state(a)?, self.state(b)?);
        let reference = [&sa, &sb].into_iter().find_map(|s| match s {
            RegisterType::Concrete(t) if t.is_reference() => Some(t.clone()),
            _ => None,
        });
        if let Some(ty) = reference {
            if !test.is_equality() {
                untranslatable!("{} on references v{}, v{}", test.name(), a, b);
            }
            self.load(a, &ty)?;
            self.load(b, &ty)?;
            self.arrive(target, Arrival::Branch)?;
            self.emit(Insn::Jump(if cmp == Comparison::Eq { Condition::ACmpEq } else { Condition::ACmpNe }, target));
            return Ok(());
        }
        match (sa.group(), sb.group()) {
            // both open: the comparison itself is a placeholder until either side is typed
            (Some(ga), Some(gb)) if test.is_equality() && !sa.is_wide() && !sb.is_wide() => {
                let g = self.patches.union(ga, gb);
                self.load_as_is(a)?;
                self.load_as_is(b)?;
                self.arrive(target, Arrival::Branch)?;
                self.emit_site(g, Insn::Jump(Condition::ICmp(cmp), target));
            }
            _ => {
                self.load(a, &TypeSignature::Int)?;
                self.load(b, &TypeSignature::Int)?;
                self.arrive(target, Arrival::Branch)?;
                self.emit(Insn::Jump(Condition::ICmp(cmp), target));
            }
        }
        Ok(())
    }

    fn compare_zero(&mut self, test: TestType, reg: u16, target: Label) -> Result<(), DexError> {
        let cmp = comparison(test);
        match self.state(reg)? {
            RegisterType::Concrete(t) if t.is_reference() => {
                if !test.is_equality() {
                    untranslatable!("{}z on reference v{}", test.name(), reg);
                }
                self.load(reg, &t)?;
                self.arrive(target, Arrival::Branch)?;
                self.emit(Insn::Jump(if cmp == Comparison::Eq { Condition::Null } else { Condition::NonNull }, target));
            }
            RegisterType::Untyped32(g) if test.is_equality() => {
                self.load_as_is(reg)?;
                self.arrive(target, Arrival::Branch)?;
                self.emit_site(g, Insn::Jump(Condition::Zero(cmp), target));
            }
            _ => {
                self.load(reg, &TypeSignature::Int)?;
                self.arrive(target, Arrival::Branch)?;
                self.emit(Insn::Jump(Condition::Zero(cmp), target));
            }
        }
        Ok(())
    }

    fn invoke(&mut self, kind: InvokeKind, regs: &[u16], method: &MethodReference) -> Result<(), DexError> {
        let mut next = 0usize;
        let operand = |next: &mut usize, slots: u16| -> Result<u16, DexError> {
            let Some(reg) = regs.get(*next).copied() else {
                untranslatable!("{} {}->{} is missing arguments", kind.name(), method.class, method.name);
            };
            *next += slots as usize;
            Ok(reg)
        };
        if kind != InvokeKind::Static {
            let this = operand(&mut next, 1)?;
            self.load(this, &method.class)?;
        }
        for arg in &method.signature.args {
            let reg = operand(&mut next, arg.slots())?;
            self.load(reg, arg)?;
        }
        if next != regs.len() {
            untranslatable!("{} passes {} registers to {}{}", kind.name(), regs.len(), method.name, method.signature.to_jni());
        }
        let jvm_kind = match kind {
            InvokeKind::Virtual => JvmInvoke::Virtual,
            InvokeKind::Super | InvokeKind::Direct => JvmInvoke::Special,
            InvokeKind::Static => JvmInvoke::Static,
            InvokeKind::Interface => JvmInvoke::Interface,
        };
        self.emit(Insn::Invoke(
            jvm_kind,
            MethodRef { owner: method.class.internal_name(), name: method.name.clone(), desc: method.signature.to_jni() },
        ));
        if method.signature.result != TypeSignature::Void {
            self.pending = Some(method.signature.result.clone());
        }
        Ok(())
    }

    fn unary(&mut self, op: UnaryOperation, dest: u16, src: u16) -> Result<(), DexError> {
        use UnaryOperation as U;
        let (from, to) = op.types();
        self.load(src, &from)?;
        match op {
            U::NegateInt | U::NegateLong | U::NegateFloat | U::NegateDouble => {
                self.emit(Insn::Arith(ArithOp::Neg, kind_of(&from)?));
            }
            U::NotInt => {
                self.emit(Insn::Const(Constant::Int(-1)));
                self.emit(Insn::Arith(ArithOp::Xor, Kind::Int));
            }
            U::NotLong => {
                self.emit(Insn::Const(Constant::Long(-1)));
                self.emit(Insn::Arith(ArithOp::Xor, Kind::Long));
            }
            U::IntToByte => {
                self.emit(Insn::Narrow(Narrow::Byte));
            }
            U::IntToChar => {
                self.emit(Insn::Narrow(Narrow::Char));
            }
            U::IntToShort => {
                self.emit(Insn::Narrow(Narrow::Short));
            }
            _ => {
                self.emit(Insn::Convert(kind_of(&from)?, kind_of(&to)?));
            }
        }
        self.store(dest, to)
    }

    /// `filled-new-array` leaves the array on the stack for the following `move-result-object`.
    fn filled_new_array(&mut self, regs: &[u16], array: TypeSignature) -> Result<(), DexError> {
        let Some(element) = array.element_type().cloned() else {
            untranslatable!("filled-new-array of non-array type {}", array);
        };
        let kind = array_kind(&element)?;
        self.emit(Insn::Const(Constant::Int(regs.len() as i32)));
        self.emit(Insn::NewArray(element.clone()));
        for (i, reg) in regs.iter().enumerate() {
            self.emit(Insn::Dup);
            self.emit(Insn::Const(Constant::Int(i as i32)));
            self.load(*reg, &element)?;
            self.emit(Insn::ArrayStore(kind));
        }
        self.pending = Some(array);
        Ok(())
    }

    fn fill_array_data(&mut self, reg: u16, data: &ArrayData) -> Result<(), DexError> {
        let (array, element) = match self.state(reg)? {
            RegisterType::Concrete(TypeSignature::Array(e)) => (TypeSignature::Array(e.clone()), *e),
            other => untranslatable!("fill-array-data on v{} holding {}", reg, other),
        };
        let width = match element {
            TypeSignature::Bool | TypeSignature::Byte => 1,
            TypeSignature::Char | TypeSignature::Short => 2,
            TypeSignature::Int | TypeSignature::Float => 4,
            TypeSignature::Long | TypeSignature::Double => 8,
            _ => untranslatable!("fill-array-data on an array of {}", element),
        };
        if data.element_width != width {
            untranslatable!("fill-array-data with {}-byte elements for an array of {}", data.element_width, element);
        }
        let kind = array_kind(&element)?;
        for (i, bits) in data.elements().into_iter().enumerate() {
            let value = match element {
                TypeSignature::Bool | TypeSignature::Byte => Constant::Int(bits as u8 as i8 as i32),
                TypeSignature::Char => Constant::Int(bits as u16 as i32),
                TypeSignature::Short => Constant::Int(bits as u16 as i16 as i32),
                TypeSignature::Float => Constant::Float(f32::from_bits(bits as u32)),
                TypeSignature::Long => Constant::Long(bits as i64),
                TypeSignature::Double => Constant::Double(f64::from_bits(bits)),
                _ => Constant::Int(bits as u32 as i32),
            };
            self.load(reg, &array)?;
            self.emit(Insn::Const(Constant::Int(i as i32)));
            self.emit(Insn::Const(value));
            self.emit(Insn::ArrayStore(kind));
        }
        Ok(())
    }
}

impl InstructionSink for MethodRewriter<'_> {
    fn label(&mut self, addr: u32, label: Label) -> Result<(), DexError> {
        let branched_to = self.labels.entry(addr).is_some_and(|e| e.jump_target) || self.joins.contains_key(&label);
        if branched_to {
            // nothing may stay on the stack across a join
            self.discard_pending();
        }
        self.events.push(CodeEvent::Label(label));

        match self.joins.get_mut(&label) {
            Some(stored) if self.terminal => self.frame = stored.clone(),
            Some(stored) => {
                stored.merge(&self.frame, Arrival::Branch, &mut self.patches, &mut self.events)?;
                self.frame = stored.clone();
            }
            // only reached by branches further down, assume the types where control left off
            None if branched_to => {
                self.joins.insert(label, self.frame.clone());
            }
            None => {}
        }
        if let Some(ty) = self.caught.get(&label) {
            self.pending = Some(ty.clone());
        }
        self.terminal = false;
        Ok(())
    }

    fn instruction(&mut self, addr: u32, op: &'static Opcode, insn: DexInstruction) -> Result<(), DexError> {
        trace!("{:04x}: {}", addr, insn);
        if !matches!(insn, DexInstruction::MoveResult(..) | DexInstruction::MoveException(_)) {
            self.discard_pending();
        }
        if let Some(handlers) = self.covered.get(&addr).cloned() {
            for h in handlers {
                self.arrive(h, Arrival::Handler)?;
            }
        }
        self.translate(insn).map_err(|e| err!(e, "{} at 0x{:04x}", op.name, addr))?;
        self.terminal = matches!(self.events.last(), Some(CodeEvent::Insn(i)) if i.is_terminal());
        Ok(())
    }
}

fn entry_frame(method: &MethodContext, map: &RegisterMap) -> Result<Frame, DexError> {
    let mut frame = Frame::new(map.registers());
    let mut reg = map.first_in();
    if !method.is_static {
        frame.set(reg, RegisterType::Concrete(method.owner.clone()))?;
        reg += 1;
    }
    for arg in &method.signature.args {
        frame.set(reg, RegisterType::Concrete(arg.clone()))?;
        reg += arg.slots();
    }
    if reg != map.registers() {
        untranslatable!(
            "Method {} declares {} incoming registers but its arguments take {}",
            method.signature.to_jni(),
            map.ins(),
            reg - map.first_in()
        );
    }
    Ok(frame)
}

fn label_at(labels: &LabelTable, addr: u32) -> Result<Label, DexError> {
    match labels.label_at(addr) {
        Some(l) => Ok(l),
        None => untranslatable!("No label at 0x{:04x}", addr),
    }
}

fn kind_of(ty: &TypeSignature) -> Result<Kind, DexError> {
    match ty.kind() {
        Some(k) => Ok(k),
        None => untranslatable!("A register cannot hold {}", ty),
    }
}

fn array_kind(element: &TypeSignature) -> Result<ArrayKind, DexError> {
    match element.array_kind() {
        Some(k) => Ok(k),
        None => untranslatable!("Arrays cannot hold {}", element),
    }
}

fn field_ref(field: &FieldReference) -> FieldRef {
    FieldRef { owner: field.class.internal_name(), name: field.name.clone(), desc: field.type_.to_jni() }
}

fn comparison(test: TestType) -> Comparison {
    match test {
        TestType::Equal => Comparison::Eq,
        TestType::NotEqual => Comparison::Ne,
        TestType::LessThan => Comparison::Lt,
        TestType::GreaterThanOrEqual => Comparison::Ge,
        TestType::GreaterThan => Comparison::Gt,
        TestType::LessThanOrEqual => Comparison::Le,
    }
}

fn arith_op(op: BinaryOperation) -> ArithOp {
    use BinaryOperation as B;
    match op {
        B::AddInt | B::AddLong | B::AddFloat | B::AddDouble => ArithOp::Add,
        B::SubInt | B::SubLong | B::SubFloat | B::SubDouble => ArithOp::Sub,
        B::MulInt | B::MulLong | B::MulFloat | B::MulDouble => ArithOp::Mul,
        B::DivInt | B::DivLong | B::DivFloat | B::DivDouble => ArithOp::Div,
        B::RemInt | B::RemLong | B::RemFloat | B::RemDouble => ArithOp::Rem,
        B::AndInt | B::AndLong => ArithOp::And,
        B::OrInt | B::OrLong => ArithOp::Or,
        B::XorInt | B::XorLong => ArithOp::Xor,
        B::ShlInt | B::ShlLong => ArithOp::Shl,
        B::ShrInt | B::ShrLong => ArithOp::Shr,
        B::UshrInt | B::UshrLong => ArithOp::Ushr,
    }
}
