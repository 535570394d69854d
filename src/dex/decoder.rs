//! Two-pass decoding of a method body.
//!
//! Pass one ([`scan_labels`]) walks the code units with only the format table, places a
//! label at every address something refers to and parses every in-code payload it finds a
//! reference to. Pass two ([`decode_method`]) walks again, decodes operands, resolves pool
//! references and feeds an [`InstructionSink`]. Both passes share [`decode_raw`], so payloads
//! are never decoded as instructions.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::dex::class_data::CodeItem;
use crate::dex::error::DexError;
use crate::dex::instructions::{
    AccessType, ArrayData, BinaryOperation, CompareType, DexInstruction, FieldReference, InvokeKind, MethodReference,
    MoveKind, TestType, UnaryOperation,
};
use crate::dex::opcodes::{opcode, Format, Opcode};
use crate::dex::DexFile;
use crate::jvm::Label;
use crate::types::{MethodSignature, TypeSignature};

const PACKED_SWITCH_IDENT: u16 = 0x0100;
const SPARSE_SWITCH_IDENT: u16 = 0x0200;
const ARRAY_DATA_IDENT: u16 = 0x0300;

/// An in-code data block. Switch targets are stored as absolute addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    PackedSwitch { first_key: i32, targets: Vec<u32> },
    SparseSwitch { keys: Vec<i32>, targets: Vec<u32> },
    ArrayData(ArrayData),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::PackedSwitch { .. } => "packed-switch-payload",
            Payload::SparseSwitch { .. } => "sparse-switch-payload",
            Payload::ArrayData(_) => "fill-array-data-payload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub label: Label,
    pub jump_target: bool,
    pub payload: Option<Payload>,
}

/// One label per code address, created on demand.
#[derive(Debug, Clone)]
pub struct LabelTable {
    entries: BTreeMap<u32, LabelEntry>,
    starts: BTreeSet<u32>,
    end: u32,
    next: u32,
}

impl LabelTable {
    fn new(end: u32) -> LabelTable {
        LabelTable { entries: BTreeMap::new(), starts: BTreeSet::new(), end, next: 0 }
    }

    pub fn get_or_create(&mut self, addr: u32) -> Label {
        if let Some(e) = self.entries.get(&addr) {
            return e.label;
        }
        let label = Label(self.next);
        self.next += 1;
        self.entries.insert(addr, LabelEntry { label, jump_target: false, payload: None });
        label
    }

    fn mark_jump_target(&mut self, addr: u32) -> Label {
        let label = self.get_or_create(addr);
        if let Some(e) = self.entries.get_mut(&addr) {
            e.jump_target = true;
        }
        label
    }

    /// A label bound to no address, for code the rewriter synthesizes.
    pub fn fresh(&mut self) -> Label {
        let label = Label(self.next);
        self.next += 1;
        label
    }

    pub fn label_at(&self, addr: u32) -> Option<Label> {
        self.entries.get(&addr).map(|e| e.label)
    }

    pub fn entry(&self, addr: u32) -> Option<&LabelEntry> {
        self.entries.get(&addr)
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, &LabelEntry)> {
        self.entries.iter().map(|(a, e)| (*a, e))
    }

    pub fn is_instruction_start(&self, addr: u32) -> bool {
        self.starts.contains(&addr)
    }

    /// The first instruction start at or after `addr`, or the end address.
    pub fn snap(&self, addr: u32) -> u32 {
        self.starts.range(addr..).next().copied().unwrap_or(self.end)
    }

    pub fn end_address(&self) -> u32 {
        self.end
    }

    pub fn end_label(&self) -> Label {
        self.entries.get(&self.end).map(|e| e.label).unwrap_or(Label(u32::MAX))
    }
}

/// Receives the decoded body of a method in address order.
pub trait InstructionSink {
    /// Called before the instruction at `addr`, and once with the end address after the
    /// last instruction.
    fn label(&mut self, addr: u32, label: Label) -> Result<(), DexError>;

    fn instruction(&mut self, addr: u32, op: &'static Opcode, insn: DexInstruction) -> Result<(), DexError>;
}

/// Operands of one instruction as laid out by its format, before any pool lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Raw {
    pub op: &'static Opcode,
    pub regs: Vec<u16>,
    /// Literal, branch offset or payload offset, sign extended
    pub literal: i64,
    pub index: u32,
    pub proto: u32,
}

#[inline] fn a8(inst: u16) -> u16 { inst >> 8 }
#[inline] fn a4(inst: u16) -> u16 { (inst >> 8) & 0x0f }
#[inline] fn b4(inst: u16) -> u16 { inst >> 12 }
#[inline] fn s4(inst: u16) -> i64 { ((inst as i16) >> 12) as i64 }
#[inline] fn s8(x: u16) -> i64 { (x as u8 as i8) as i64 }
#[inline] fn s16(x: u16) -> i64 { (x as i16) as i64 }
#[inline] fn u32_at(code: &[u16], pc: usize) -> u32 { code[pc] as u32 | (code[pc + 1] as u32) << 16 }

#[inline]
fn require_cu(code: &[u16], pc: usize, need: usize, what: &str) -> Result<(), DexError> {
    if pc + need > code.len() {
        untranslatable!("Truncated {} at 0x{:04x}: need {} code units, have {}", what, pc, need, code.len().saturating_sub(pc));
    }
    Ok(())
}

/// Width in code units of the payload starting at `pc`, if there is one.
fn payload_units(code: &[u16], pc: usize) -> Result<Option<usize>, DexError> {
    let units = match code[pc] {
        PACKED_SWITCH_IDENT => {
            require_cu(code, pc, 2, "packed-switch-payload")?;
            4 + code[pc + 1] as usize * 2
        }
        SPARSE_SWITCH_IDENT => {
            require_cu(code, pc, 2, "sparse-switch-payload")?;
            2 + code[pc + 1] as usize * 4
        }
        ARRAY_DATA_IDENT => {
            require_cu(code, pc, 4, "fill-array-data-payload")?;
            let width = code[pc + 1] as usize;
            let size = u32_at(code, pc + 2) as usize;
            4 + (width * size).div_ceil(2)
        }
        _ => return Ok(None),
    };
    Ok(Some(units))
}

pub(crate) fn decode_raw(code: &[u16], pc: usize) -> Result<Raw, DexError> {
    let inst = code[pc];
    let Some(op) = opcode((inst & 0xff) as u8) else {
        untranslatable!("Unknown opcode 0x{:02x} at 0x{:04x}", inst & 0xff, pc);
    };
    require_cu(code, pc, op.format.units(), op.name)?;

    let mut raw = Raw { op, regs: vec![], literal: 0, index: 0, proto: 0 };
    match op.format {
        Format::Format10x => {}
        Format::Format10t => raw.literal = s8(a8(inst)),
        Format::Format11n => {
            raw.regs = vec![a4(inst)];
            raw.literal = s4(inst);
        }
        Format::Format11x => raw.regs = vec![a8(inst)],
        Format::Format12x => raw.regs = vec![a4(inst), b4(inst)],
        Format::Format20t => raw.literal = s16(code[pc + 1]),
        Format::Format21c => {
            raw.regs = vec![a8(inst)];
            raw.index = code[pc + 1] as u32;
        }
        Format::Format21ih => {
            raw.regs = vec![a8(inst)];
            raw.literal = ((code[pc + 1] as u32) << 16) as i32 as i64;
        }
        Format::Format21lh => {
            raw.regs = vec![a8(inst)];
            raw.literal = ((code[pc + 1] as u64) << 48) as i64;
        }
        Format::Format21s | Format::Format21t => {
            raw.regs = vec![a8(inst)];
            raw.literal = s16(code[pc + 1]);
        }
        Format::Format22b => {
            raw.regs = vec![a8(inst), code[pc + 1] & 0xff];
            raw.literal = s8(code[pc + 1] >> 8);
        }
        Format::Format22c => {
            raw.regs = vec![a4(inst), b4(inst)];
            raw.index = code[pc + 1] as u32;
        }
        Format::Format22s | Format::Format22t => {
            raw.regs = vec![a4(inst), b4(inst)];
            raw.literal = s16(code[pc + 1]);
        }
        Format::Format22x => raw.regs = vec![a8(inst), code[pc + 1]],
        Format::Format23x => raw.regs = vec![a8(inst), code[pc + 1] & 0xff, code[pc + 1] >> 8],
        Format::Format30t => raw.literal = u32_at(code, pc + 1) as i32 as i64,
        Format::Format31c => {
            raw.regs = vec![a8(inst)];
            raw.index = u32_at(code, pc + 1);
        }
        Format::Format31i | Format::Format31t => {
            raw.regs = vec![a8(inst)];
            raw.literal = u32_at(code, pc + 1) as i32 as i64;
        }
        Format::Format32x => raw.regs = vec![code[pc + 1], code[pc + 2]],
        Format::Format35c | Format::Format45cc => {
            let count = b4(inst) as usize;
            if count > 5 {
                untranslatable!("{} at 0x{:04x} has {} registers", op.name, pc, count);
            }
            let packed = code[pc + 2];
            let all = [packed & 0xf, (packed >> 4) & 0xf, (packed >> 8) & 0xf, packed >> 12, a4(inst)];
            raw.regs = all[..count].to_vec();
            raw.index = code[pc + 1] as u32;
            if op.format == Format::Format45cc {
                raw.proto = code[pc + 3] as u32;
            }
        }
        Format::Format3rc | Format::Format4rcc => {
            let count = a8(inst);
            let first = code[pc + 2];
            raw.regs = (0..count).map(|i| first.wrapping_add(i)).collect();
            raw.index = code[pc + 1] as u32;
            if op.format == Format::Format4rcc {
                raw.proto = code[pc + 3] as u32;
            }
        }
        Format::Format51l => {
            raw.regs = vec![a8(inst)];
            raw.literal = (u32_at(code, pc + 1) as u64 | (u32_at(code, pc + 3) as u64) << 32) as i64;
        }
    }
    Ok(raw)
}

fn target(pc: usize, offset: i64, code_len: usize) -> Result<u32, DexError> {
    let t = pc as i64 + offset;
    if t < 0 || t > code_len as i64 {
        untranslatable!("Target {} of instruction at 0x{:04x} is outside the method", t, pc);
    }
    Ok(t as u32)
}

fn parse_payload(code: &[u16], at: usize, switch_pc: usize) -> Result<Payload, DexError> {
    let Some(units) = payload_units(code, at)? else {
        untranslatable!("No payload at 0x{:04x} for instruction at 0x{:04x}", at, switch_pc);
    };
    require_cu(code, at, units, "payload")?;
    let read_i32s = |from: usize, n: usize| -> Vec<i32> { (0..n).map(|i| u32_at(code, from + i * 2) as i32).collect() };
    // switch targets are relative to the switch instruction, not the payload
    let absolute = |rel: Vec<i32>| -> Result<Vec<u32>, DexError> {
        rel.into_iter().map(|r| target(switch_pc, r as i64, code.len())).collect()
    };

    Ok(match code[at] {
        PACKED_SWITCH_IDENT => {
            let size = code[at + 1] as usize;
            Payload::PackedSwitch { first_key: u32_at(code, at + 2) as i32, targets: absolute(read_i32s(at + 4, size))? }
        }
        SPARSE_SWITCH_IDENT => {
            let size = code[at + 1] as usize;
            let keys = read_i32s(at + 2, size);
            if keys.windows(2).any(|w| w[0] >= w[1]) {
                untranslatable!("Sparse switch keys at 0x{:04x} are not sorted", at);
            }
            Payload::SparseSwitch { keys, targets: absolute(read_i32s(at + 2 + size * 2, size))? }
        }
        _ => {
            let element_width = code[at + 1];
            let len = element_width as usize * u32_at(code, at + 2) as usize;
            let data = code[at + 4..at + units]
                .iter()
                .flat_map(|cu| cu.to_le_bytes())
                .take(len)
                .collect();
            Payload::ArrayData(ArrayData { element_width, data })
        }
    })
}

/// First pass: every instruction start, branch/switch target, try boundary and handler gets a
/// label; every referenced payload is parsed and attached to the label at its address.
pub fn scan_labels(code: &CodeItem) -> Result<LabelTable, DexError> {
    let insns = &code.insns;
    let end = insns.len() as u32;
    let mut table = LabelTable::new(end);
    let mut payload_refs: Vec<(usize, usize)> = vec![];
    let mut targets: Vec<u32> = vec![];

    table.get_or_create(0);
    let mut pc = 0usize;
    while pc < insns.len() {
        if let Some(units) = payload_units(insns, pc)? {
            pc += units;
            continue;
        }
        let raw = decode_raw(insns, pc)?;
        table.starts.insert(pc as u32);
        let next = pc + raw.op.format.units();
        match raw.op.format {
            Format::Format10t | Format::Format20t | Format::Format30t | Format::Format21t | Format::Format22t => {
                targets.push(target(pc, raw.literal, insns.len())?);
            }
            Format::Format31t => {
                let at = target(pc, raw.literal, insns.len())? as usize;
                if at >= insns.len() {
                    untranslatable!("Payload offset of instruction at 0x{:04x} points past the code", pc);
                }
                payload_refs.push((pc, at));
                if raw.op.name != "fill-array-data" {
                    // the fall-through address doubles as the default target
                    targets.push(next as u32);
                }
            }
            _ => {}
        }
        pc = next;
    }
    if pc != insns.len() {
        untranslatable!("Last payload runs past the end of the code");
    }

    for (switch_pc, at) in payload_refs {
        let payload = parse_payload(insns, at, switch_pc)?;
        let expected = match opcode((insns[switch_pc] & 0xff) as u8).map(|o| o.name) {
            Some("packed-switch") => "packed-switch-payload",
            Some("sparse-switch") => "sparse-switch-payload",
            _ => "fill-array-data-payload",
        };
        if payload.kind() != expected {
            untranslatable!("Instruction at 0x{:04x} expects a {} but 0x{:04x} holds a {}", switch_pc, expected, at, payload.kind());
        }
        match &payload {
            Payload::PackedSwitch { targets: t, .. } | Payload::SparseSwitch { targets: t, .. } => targets.extend(t),
            Payload::ArrayData(_) => {}
        }
        table.get_or_create(at as u32);
        if let Some(e) = table.entries.get_mut(&(at as u32)) {
            e.payload = Some(payload);
        }
    }

    for t in targets {
        if t != end && !table.is_instruction_start(t) {
            untranslatable!("Branch target 0x{:04x} is not an instruction", t);
        }
        table.mark_jump_target(t);
    }

    for t in &code.tries {
        if !table.is_instruction_start(t.start_addr) {
            untranslatable!("Try block start 0x{:04x} is not an instruction", t.start_addr);
        }
        if t.end_addr() > end {
            untranslatable!("Try block at 0x{:04x} runs past the end of the code", t.start_addr);
        }
        table.get_or_create(t.start_addr);
        // a try block may end where in-code data begins
        let end_addr = table.snap(t.end_addr());
        table.get_or_create(end_addr);
        if let Some(h) = code.handler_for(t) {
            let addrs = h.handlers.iter().map(|p| p.addr).chain(h.catch_all_addr);
            for addr in addrs {
                if !table.is_instruction_start(addr) {
                    untranslatable!("Handler 0x{:04x} is not an instruction", addr);
                }
                table.mark_jump_target(addr);
            }
        }
    }

    table.get_or_create(end);
    Ok(table)
}

fn move_kind(name: &str) -> MoveKind {
    if name.contains("wide") {
        MoveKind::Wide
    } else if name.contains("object") {
        MoveKind::Object
    } else {
        MoveKind::Single
    }
}

fn resolve_type(dex: &DexFile, idx: u32) -> Result<TypeSignature, DexError> {
    TypeSignature::from_descriptor(dex.type_descriptor(idx)?)
}

fn resolve_field(dex: &DexFile, idx: u32) -> Result<FieldReference, DexError> {
    let f = dex.field(idx)?;
    Ok(FieldReference {
        class: TypeSignature::from_descriptor(f.class)?,
        name: f.name.to_string(),
        type_: TypeSignature::from_descriptor(f.type_)?,
    })
}

fn resolve_method(dex: &DexFile, idx: u32) -> Result<MethodReference, DexError> {
    let m = dex.method(idx)?;
    Ok(MethodReference {
        class: TypeSignature::from_descriptor(m.class)?,
        name: m.name.to_string(),
        signature: MethodSignature::from_descriptor(&m.proto.descriptor())?,
    })
}

fn label_for(labels: &LabelTable, addr: u32) -> Result<Label, DexError> {
    match labels.entry(addr) {
        Some(e) if e.payload.is_none() => Ok(e.label),
        Some(_) => untranslatable!("Branch to 0x{:04x} lands on in-code data", addr),
        None => untranslatable!("No label at 0x{:04x}", addr),
    }
}

fn payload_for<'a>(labels: &'a LabelTable, addr: u32) -> Result<&'a Payload, DexError> {
    match labels.entry(addr).and_then(|e| e.payload.as_ref()) {
        Some(p) => Ok(p),
        None => untranslatable!("Label at 0x{:04x} carries no payload", addr),
    }
}

fn resolve(dex: &DexFile, labels: &LabelTable, pc: usize, raw: Raw) -> Result<DexInstruction, DexError> {
    let value = raw.op.value;
    let name = raw.op.name;
    let r = |i: usize| raw.regs[i];
    let here = pc as u32;
    let code_len = labels.end_address() as usize;
    let next = here + raw.op.format.units() as u32;

    Ok(match value {
        0x00 => DexInstruction::Nop,
        0x01..=0x09 => DexInstruction::Move(move_kind(name), r(0), r(1)),
        0x0a..=0x0c => DexInstruction::MoveResult(move_kind(name), r(0)),
        0x0d => DexInstruction::MoveException(r(0)),
        0x0e => DexInstruction::ReturnVoid,
        0x0f => DexInstruction::Return(MoveKind::Single, r(0)),
        0x10 => DexInstruction::Return(MoveKind::Wide, r(0)),
        0x11 => DexInstruction::Return(MoveKind::Object, r(0)),
        0x12..=0x15 => DexInstruction::Const(r(0), raw.literal as i32),
        0x16..=0x19 => DexInstruction::ConstWide(r(0), raw.literal),
        0x1a | 0x1b => DexInstruction::ConstString(r(0), dex.string(raw.index)?.to_string()),
        0x1c => DexInstruction::ConstClass(r(0), resolve_type(dex, raw.index)?),
        0x1d => DexInstruction::MonitorEnter(r(0)),
        0x1e => DexInstruction::MonitorExit(r(0)),
        0x1f => DexInstruction::CheckCast(r(0), resolve_type(dex, raw.index)?),
        0x20 => DexInstruction::InstanceOf(r(0), r(1), resolve_type(dex, raw.index)?),
        0x21 => DexInstruction::ArrayLength(r(0), r(1)),
        0x22 => DexInstruction::NewInstance(r(0), resolve_type(dex, raw.index)?),
        0x23 => DexInstruction::NewArray(r(0), r(1), resolve_type(dex, raw.index)?),
        0x24 | 0x25 => DexInstruction::FilledNewArray(raw.regs.clone(), resolve_type(dex, raw.index)?),
        0x26 => match payload_for(labels, target(pc, raw.literal, code_len)?)? {
            Payload::ArrayData(data) => DexInstruction::FillArrayData(r(0), data.clone()),
            _ => untranslatable!("fill-array-data at 0x{:04x} refers to a switch table", pc),
        },
        0x27 => DexInstruction::Throw(r(0)),
        0x28..=0x2a => DexInstruction::Goto(label_for(labels, target(pc, raw.literal, code_len)?)?),
        0x2b => match payload_for(labels, target(pc, raw.literal, code_len)?)? {
            Payload::PackedSwitch { first_key, targets } => {
                let cases = targets.iter().map(|t| label_for(labels, *t)).collect::<Result<Vec<_>, _>>()?;
                DexInstruction::PackedSwitch(r(0), *first_key, cases, label_for(labels, next)?)
            }
            _ => untranslatable!("packed-switch at 0x{:04x} refers to the wrong payload kind", pc),
        },
        0x2c => match payload_for(labels, target(pc, raw.literal, code_len)?)? {
            Payload::SparseSwitch { keys, targets } => {
                let pairs = keys
                    .iter()
                    .zip(targets)
                    .map(|(k, t)| Ok((*k, label_for(labels, *t)?)))
                    .collect::<Result<Vec<_>, DexError>>()?;
                DexInstruction::SparseSwitch(r(0), pairs, label_for(labels, next)?)
            }
            _ => untranslatable!("sparse-switch at 0x{:04x} refers to the wrong payload kind", pc),
        },
        0x2d..=0x31 => {
            let ct = match value {
                0x2d => CompareType::LessThanFloat,
                0x2e => CompareType::GreaterThanFloat,
                0x2f => CompareType::LessThanDouble,
                0x30 => CompareType::GreaterThanDouble,
                _ => CompareType::Long,
            };
            DexInstruction::Compare(ct, r(0), r(1), r(2))
        }
        0x32..=0x37 => {
            let t = label_for(labels, target(pc, raw.literal, code_len)?)?;
            DexInstruction::If(TestType::ALL[(value - 0x32) as usize], r(0), r(1), t)
        }
        0x38..=0x3d => {
            let t = label_for(labels, target(pc, raw.literal, code_len)?)?;
            DexInstruction::IfZ(TestType::ALL[(value - 0x38) as usize], r(0), t)
        }
        0x44..=0x4a => DexInstruction::ArrayGet(AccessType::ALL[(value - 0x44) as usize], r(0), r(1), r(2)),
        0x4b..=0x51 => DexInstruction::ArrayPut(AccessType::ALL[(value - 0x4b) as usize], r(0), r(1), r(2)),
        0x52..=0x58 => DexInstruction::InstanceGet(AccessType::ALL[(value - 0x52) as usize], r(0), r(1), resolve_field(dex, raw.index)?),
        0x59..=0x5f => DexInstruction::InstancePut(AccessType::ALL[(value - 0x59) as usize], r(0), r(1), resolve_field(dex, raw.index)?),
        0x60..=0x66 => DexInstruction::StaticGet(AccessType::ALL[(value - 0x60) as usize], r(0), resolve_field(dex, raw.index)?),
        0x67..=0x6d => DexInstruction::StaticPut(AccessType::ALL[(value - 0x67) as usize], r(0), resolve_field(dex, raw.index)?),
        0x6e..=0x72 => DexInstruction::Invoke(InvokeKind::ALL[(value - 0x6e) as usize], raw.regs.clone(), resolve_method(dex, raw.index)?),
        0x74..=0x78 => DexInstruction::Invoke(InvokeKind::ALL[(value - 0x74) as usize], raw.regs.clone(), resolve_method(dex, raw.index)?),
        0x7b..=0x8f => DexInstruction::Unary(UnaryOperation::ALL[(value - 0x7b) as usize], r(0), r(1)),
        0x90..=0xaf => DexInstruction::Binary(BinaryOperation::ALL[(value - 0x90) as usize], r(0), r(1), r(2)),
        0xb0..=0xcf => DexInstruction::Binary(BinaryOperation::ALL[(value - 0xb0) as usize], r(0), r(0), r(1)),
        0xd1 | 0xd9 => DexInstruction::ReverseSubLit(r(0), r(1), raw.literal as i32),
        0xd0..=0xd7 => DexInstruction::BinaryLit(BinaryOperation::LIT[(value - 0xd0) as usize], r(0), r(1), raw.literal as i32),
        0xd8..=0xe2 => DexInstruction::BinaryLit(BinaryOperation::LIT[(value - 0xd8) as usize], r(0), r(1), raw.literal as i32),
        _ => DexInstruction::Unsupported(name),
    })
}

/// Second pass: decodes every instruction, resolves its references and hands it to `sink`,
/// preceded by the label at its address if there is one.
pub fn decode_method(dex: &DexFile, code: &CodeItem, labels: &LabelTable, sink: &mut dyn InstructionSink) -> Result<(), DexError> {
    let insns = &code.insns;
    let mut pc = 0usize;
    while pc < insns.len() {
        if let Some(units) = payload_units(insns, pc)? {
            pc += units;
            continue;
        }
        if let Some(e) = labels.entry(pc as u32) {
            sink.label(pc as u32, e.label)?;
        }
        let raw = decode_raw(insns, pc)?;
        let op = raw.op;
        let units = op.format.units();
        let insn = resolve(dex, labels, pc, raw).map_err(|e| err!(e, "{} at 0x{:04x}", op.name, pc))?;
        trace!("0x{:04x}: {}", pc, insn);
        sink.instruction(pc as u32, op, insn)?;
        pc += units;
    }
    sink.label(labels.end_address(), labels.end_label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::class_data::{EncodedCatchHandler, EncodedTypeAddrPair, TryItem};

    fn code(insns: Vec<u16>) -> CodeItem {
        CodeItem {
            registers_size: 4,
            ins_size: 0,
            outs_size: 0,
            debug_info_off: 0,
            insns,
            tries: vec![],
            handlers: BTreeMap::new(),
        }
    }

    #[test]
    fn decodes_register_and_literal_formats() {
        // const/4 v1, #-1
        let raw = decode_raw(&[0xf112], 0).unwrap();
        assert_eq!(raw.regs, vec![1]);
        assert_eq!(raw.literal, -1);

        // const/high16 v0, #0x3f80 << 16
        let raw = decode_raw(&[0x0015, 0x3f80], 0).unwrap();
        assert_eq!(raw.literal as i32 as u32, 0x3f80_0000);

        // add-int/lit8 v0, v1, #-2
        let raw = decode_raw(&[0x00d8, 0xfe01], 0).unwrap();
        assert_eq!(raw.regs, vec![0, 1]);
        assert_eq!(raw.literal, -2);

        // invoke-static {v2, v3}, method@7
        let raw = decode_raw(&[0x2071, 0x0007, 0x0032], 0).unwrap();
        assert_eq!(raw.regs, vec![2, 3]);
        assert_eq!(raw.index, 7);

        // invoke-virtual/range {v4 .. v6}
        let raw = decode_raw(&[0x0374, 0x0001, 0x0004], 0).unwrap();
        assert_eq!(raw.regs, vec![4, 5, 6]);
    }

    #[test]
    fn truncated_instruction_is_rejected() {
        let e = decode_raw(&[0x0014, 0x0001], 0).unwrap_err();
        assert!(e.is_translation());
        assert!(decode_raw(&[0x003e], 0).is_err());
    }

    #[test]
    fn labels_for_branches_and_end() {
        // 0: if-eqz v0, +3 ; 2: const/4 v0, 1 ; 3: return-void
        let c = code(vec![0x0038, 0x0003, 0x1012, 0x000e]);
        let t = scan_labels(&c).unwrap();
        assert!(t.label_at(0).is_some());
        assert!(t.entry(3).unwrap().jump_target);
        assert!(t.label_at(2).is_none());
        assert_eq!(t.end_address(), 4);
        assert_eq!(t.end_label(), t.label_at(4).unwrap());
        assert!(t.is_instruction_start(2));
        assert_eq!(t.snap(1), 2);
    }

    #[test]
    fn packed_switch_targets_are_relative_to_the_switch() {
        // 0: nop
        // 1: packed-switch v0, +5 (payload at 6)
        // 4: return-void
        // 5: return-void
        // 6: payload: first_key 0, two targets +3 (4) and +4 (5)
        let c = code(vec![
            0x0000,
            0x002b, 0x0005, 0x0000,
            0x000e,
            0x000e,
            0x0100, 0x0002, 0x0000, 0x0000, 0x0003, 0x0000, 0x0004, 0x0000,
        ]);
        let t = scan_labels(&c).unwrap();
        match &t.entry(6).unwrap().payload {
            Some(Payload::PackedSwitch { first_key, targets }) => {
                assert_eq!(*first_key, 0);
                assert_eq!(targets, &vec![4, 5]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(t.entry(5).unwrap().jump_target);
        assert!(!t.is_instruction_start(6));
    }

    #[test]
    fn wrong_payload_kind_is_a_translation_error() {
        // fill-array-data v0, +3 pointing at a packed-switch payload
        let c = code(vec![0x0026, 0x0003, 0x0000, 0x0100, 0x0000, 0x0000, 0x0000]);
        let e = scan_labels(&c).unwrap_err();
        assert!(e.is_translation());
    }

    #[test]
    fn array_payload_is_skipped_and_parsed() {
        // 0: fill-array-data v0, +4 ; 3: return-void ; 4: payload width 2, 3 elements
        let c = code(vec![0x0026, 0x0004, 0x0000, 0x000e, 0x0300, 0x0002, 0x0003, 0x0000, 0x0001, 0x0002, 0xffff]);
        let t = scan_labels(&c).unwrap();
        match &t.entry(4).unwrap().payload {
            Some(Payload::ArrayData(data)) => assert_eq!(data.elements(), vec![1, 2, 0xffff]),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(t.end_address(), 11);
        assert!(!t.is_instruction_start(4));
    }

    #[test]
    fn branch_into_the_middle_of_an_instruction_fails() {
        // 0: goto +3 ; 1: const/16 v0, 5 ; 3: return-void -- then goto +2 lands inside const/16
        let c = code(vec![0x0228, 0x0013, 0x0005, 0x000e]);
        assert!(scan_labels(&c).is_err());
    }

    #[test]
    fn try_boundaries_and_handlers_get_labels() {
        let mut c = code(vec![0x0012, 0x0012, 0x000e, 0x000e]);
        c.tries = vec![TryItem { start_addr: 1, insn_count: 1, handler_off: 1 }];
        c.handlers.insert(1, EncodedCatchHandler {
            handlers: vec![EncodedTypeAddrPair { type_idx: 0, addr: 3 }],
            catch_all_addr: None,
        });
        let t = scan_labels(&c).unwrap();
        assert!(t.label_at(1).is_some());
        assert!(t.label_at(2).is_some());
        assert!(t.entry(3).unwrap().jump_target);
    }
}
