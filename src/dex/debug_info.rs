//! The `debug_info_item` state machine.

use std::collections::HashMap;

use log::{debug, warn};

use crate::dex::decoder::LabelTable;
use crate::dex::error::DexError;
use crate::dex::{read_sleb128, read_u1, read_uleb128, read_uleb128p1, DexFile};
use crate::jvm::Label;

const DBG_END_SEQUENCE: u8 = 0x00;
const DBG_ADVANCE_PC: u8 = 0x01;
const DBG_ADVANCE_LINE: u8 = 0x02;
const DBG_START_LOCAL: u8 = 0x03;
const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
const DBG_END_LOCAL: u8 = 0x05;
const DBG_RESTART_LOCAL: u8 = 0x06;
const DBG_SET_PROLOGUE_END: u8 = 0x07;
const DBG_SET_EPILOGUE_BEGIN: u8 = 0x08;
const DBG_SET_FILE: u8 = 0x09;
const DBG_FIRST_SPECIAL: u8 = 0x0a;
const DBG_LINE_BASE: i64 = -4;
const DBG_LINE_RANGE: u8 = 15;

/// A local variable live between two labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalScope {
    pub register: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub start: Label,
    pub end: Label,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub line: u32,
    pub source_file: Option<String>,
    pub label: Label,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    /// One entry per declared parameter, `this` excluded.
    pub parameter_names: Vec<Option<String>>,
    pub locals: Vec<LocalScope>,
    pub lines: Vec<LineNumber>,
}

#[derive(Debug, Clone)]
struct Variable {
    name: String,
    descriptor: String,
    signature: Option<String>,
}

/// What a register currently holds. Unnamed scopes are tracked so that their
/// `DBG_END_LOCAL` is not mistaken for a stray one.
enum Open {
    Named(Variable, Label),
    Unnamed,
}

impl DebugInfo {
    /// Runs the program at `off`. Addresses become labels in `labels`, which must already hold
    /// the instruction starts of the method.
    pub fn read(dex: &DexFile, off: u32, source_file: Option<&str>, labels: &mut LabelTable) -> Result<DebugInfo, DexError> {
        let string = |idx: u32| dex.string(idx).map(str::to_string);
        let type_ = |idx: u32| dex.type_descriptor(idx).map(str::to_string);
        run(dex.bytes(), off as usize, source_file, labels, &string, &type_)
            .map_err(|e| if e.is_translation() { e } else { DexError::translation(&format!("Bad debug info: {}", e)) })
            .map_err(|e| err!(e, "debug_info_item at 0x{:x}", off))
    }
}

fn optional(idx: i32, resolve: &dyn Fn(u32) -> Result<String, DexError>) -> Result<Option<String>, DexError> {
    if idx < 0 { Ok(None) } else { resolve(idx as u32).map(Some) }
}

fn label_for(labels: &mut LabelTable, addr: u32) -> Label {
    let end = labels.end_address();
    let addr = if addr > end {
        warn!("Debug address 0x{:04x} is past the end of the method", addr);
        end
    } else if addr != end && !labels.is_instruction_start(addr) {
        let snapped = labels.snap(addr);
        warn!("Debug address 0x{:04x} is not an instruction, using 0x{:04x}", addr, snapped);
        snapped
    } else {
        addr
    };
    labels.get_or_create(addr)
}

fn run(
    bytes: &[u8],
    off: usize,
    source_file: Option<&str>,
    labels: &mut LabelTable,
    string: &dyn Fn(u32) -> Result<String, DexError>,
    type_: &dyn Fn(u32) -> Result<String, DexError>,
) -> Result<DebugInfo, DexError> {
    let mut ix = off;
    let mut line = read_uleb128(bytes, &mut ix)? as i64;
    let parameters_size = read_uleb128(bytes, &mut ix)?;
    let mut info = DebugInfo::default();
    for _ in 0..parameters_size {
        let idx = read_uleb128p1(bytes, &mut ix)?;
        info.parameter_names.push(optional(idx, string)?);
    }

    let mut address = 0u32;
    let mut file = source_file.map(str::to_string);
    let mut open: HashMap<u16, Open> = HashMap::new();
    let mut closed: HashMap<u16, Variable> = HashMap::new();

    fn close(register: u16, scope: Open, end: Label, info: &mut DebugInfo, closed: &mut HashMap<u16, Variable>) {
        if let Open::Named(var, start) = scope {
            info.locals.push(LocalScope {
                register,
                name: var.name.clone(),
                descriptor: var.descriptor.clone(),
                signature: var.signature.clone(),
                start,
                end,
            });
            closed.insert(register, var);
        }
    }

    loop {
        if ix >= bytes.len() {
            untranslatable!("Debug program ran out of bytes before DBG_END_SEQUENCE");
        }
        let opcode = read_u1(bytes, &mut ix)?;
        match opcode {
            DBG_END_SEQUENCE => {
                let end = labels.end_label();
                let mut remaining: Vec<_> = open.drain().collect();
                remaining.sort_by_key(|(r, _)| *r);
                for (register, scope) in remaining {
                    close(register, scope, end, &mut info, &mut closed);
                }
                return Ok(info);
            }
            DBG_ADVANCE_PC => {
                let delta = read_uleb128(bytes, &mut ix)?;
                let Some(next) = address.checked_add(delta) else {
                    untranslatable!("DBG_ADVANCE_PC by {} overflows address 0x{:04x}", delta, address);
                };
                address = next;
            }
            DBG_ADVANCE_LINE => line += read_sleb128(bytes, &mut ix)? as i64,
            DBG_START_LOCAL | DBG_START_LOCAL_EXTENDED => {
                let register = read_uleb128(bytes, &mut ix)? as u16;
                let name = optional(read_uleb128p1(bytes, &mut ix)?, string)?;
                let descriptor = optional(read_uleb128p1(bytes, &mut ix)?, type_)?;
                let signature = if opcode == DBG_START_LOCAL_EXTENDED {
                    optional(read_uleb128p1(bytes, &mut ix)?, string)?
                } else {
                    None
                };
                let here = label_for(labels, address);
                if let Some(prev) = open.remove(&register) {
                    close(register, prev, here, &mut info, &mut closed);
                }
                let scope = match (name, descriptor) {
                    (Some(name), Some(descriptor)) => Open::Named(Variable { name, descriptor, signature }, here),
                    _ => {
                        debug!("Skipping unnamed local in v{} at 0x{:04x}", register, address);
                        Open::Unnamed
                    }
                };
                open.insert(register, scope);
            }
            DBG_END_LOCAL => {
                let register = read_uleb128(bytes, &mut ix)? as u16;
                let Some(scope) = open.remove(&register) else {
                    untranslatable!("DBG_END_LOCAL for v{} at 0x{:04x} with no open local", register, address);
                };
                let here = label_for(labels, address);
                close(register, scope, here, &mut info, &mut closed);
            }
            DBG_RESTART_LOCAL => {
                let register = read_uleb128(bytes, &mut ix)? as u16;
                match closed.get(&register).cloned() {
                    Some(var) => {
                        let here = label_for(labels, address);
                        if let Some(prev) = open.insert(register, Open::Named(var, here)) {
                            // restarting over a live scope ends it first
                            close(register, prev, here, &mut info, &mut closed);
                        }
                    }
                    None => warn!("DBG_RESTART_LOCAL for v{} at 0x{:04x} with nothing to restart", register, address),
                }
            }
            DBG_SET_PROLOGUE_END | DBG_SET_EPILOGUE_BEGIN => {}
            DBG_SET_FILE => file = optional(read_uleb128p1(bytes, &mut ix)?, string)?,
            special => {
                let adjusted = special - DBG_FIRST_SPECIAL;
                let Some(next) = address.checked_add((adjusted / DBG_LINE_RANGE) as u32) else {
                    untranslatable!("Special opcode 0x{:02x} overflows address 0x{:04x}", special, address);
                };
                address = next;
                line += DBG_LINE_BASE + (adjusted % DBG_LINE_RANGE) as i64;
                let Ok(number) = u32::try_from(line) else {
                    untranslatable!("Line number {} at 0x{:04x} is negative", line, address);
                };
                let label = label_for(labels, address);
                info.lines.push(LineNumber { line: number, source_file: file.clone(), label });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dex::class_data::CodeItem;
    use crate::dex::decoder::scan_labels;
    use crate::dex::{write_sleb128, write_u1, write_uleb128, write_uleb128p1};

    const STRINGS: [&str; 4] = ["x", "count", "Foo.java", "TT;"];
    const TYPES: [&str; 2] = ["I", "Ljava/lang/Object;"];

    fn labels() -> LabelTable {
        // const/4 v0, 0 ; const/16 v1, 1 ; const/4 v2, 0 ; return-void
        let code = CodeItem {
            registers_size: 3,
            ins_size: 0,
            outs_size: 0,
            debug_info_off: 0,
            insns: vec![0x0012, 0x0113, 0x0001, 0x0212, 0x000e],
            tries: vec![],
            handlers: BTreeMap::new(),
        };
        scan_labels(&code).unwrap()
    }

    fn decode(program: &[u8], labels: &mut LabelTable) -> Result<DebugInfo, DexError> {
        let string = |i: u32| -> Result<String, DexError> { Ok(STRINGS[i as usize].to_string()) };
        let type_ = |i: u32| -> Result<String, DexError> { Ok(TYPES[i as usize].to_string()) };
        run(program, 0, Some("Main.java"), labels, &string, &type_)
    }

    fn header(line: u32, params: &[i32]) -> Vec<u8> {
        let mut b = vec![];
        write_uleb128(&mut b, line);
        write_uleb128(&mut b, params.len() as u32);
        for p in params {
            write_uleb128p1(&mut b, *p);
        }
        b
    }

    #[test]
    fn special_opcodes_advance_address_and_line() {
        let mut b = header(10, &[0, -1]);
        // line 10, addr 0
        write_u1(&mut b, DBG_FIRST_SPECIAL + 4);
        // addr +1, line +1
        write_u1(&mut b, DBG_FIRST_SPECIAL + 15 + 5);
        write_u1(&mut b, DBG_ADVANCE_LINE);
        write_sleb128(&mut b, -3);
        write_u1(&mut b, DBG_SET_FILE);
        write_uleb128p1(&mut b, 2);
        // addr +2, line +0
        write_u1(&mut b, DBG_FIRST_SPECIAL + 30 + 4);
        write_u1(&mut b, DBG_END_SEQUENCE);

        let mut t = labels();
        let info = decode(&b, &mut t).unwrap();
        assert_eq!(info.parameter_names, vec![Some("x".to_string()), None]);
        let lines: Vec<_> = info.lines.iter().map(|l| (l.line, l.source_file.as_deref())).collect();
        assert_eq!(lines, vec![(10, Some("Main.java")), (11, Some("Main.java")), (8, Some("Foo.java"))]);
        assert_eq!(info.lines[2].label, t.label_at(3).unwrap());
    }

    #[test]
    fn address_inside_an_instruction_snaps_forward() {
        let mut b = header(1, &[]);
        write_u1(&mut b, DBG_ADVANCE_PC);
        write_uleb128(&mut b, 2);
        write_u1(&mut b, DBG_FIRST_SPECIAL + 4);
        write_u1(&mut b, DBG_END_SEQUENCE);

        let mut t = labels();
        let info = decode(&b, &mut t).unwrap();
        assert_eq!(info.lines[0].label, t.label_at(3).unwrap());
    }

    #[test]
    fn locals_are_closed_restarted_and_ended() {
        let mut b = header(1, &[]);
        write_u1(&mut b, DBG_START_LOCAL);
        write_uleb128(&mut b, 0);
        write_uleb128p1(&mut b, 1);
        write_uleb128p1(&mut b, 0);
        write_u1(&mut b, DBG_START_LOCAL_EXTENDED);
        write_uleb128(&mut b, 1);
        write_uleb128p1(&mut b, 0);
        write_uleb128p1(&mut b, 1);
        write_uleb128p1(&mut b, 3);
        write_u1(&mut b, DBG_ADVANCE_PC);
        write_uleb128(&mut b, 1);
        write_u1(&mut b, DBG_END_LOCAL);
        write_uleb128(&mut b, 0);
        write_u1(&mut b, DBG_ADVANCE_PC);
        write_uleb128(&mut b, 2);
        write_u1(&mut b, DBG_RESTART_LOCAL);
        write_uleb128(&mut b, 0);
        write_u1(&mut b, DBG_END_SEQUENCE);

        let mut t = labels();
        let info = decode(&b, &mut t).unwrap();
        let summary: Vec<_> = info
            .locals
            .iter()
            .map(|l| (l.register, l.name.as_str(), l.descriptor.as_str(), l.signature.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "count", "I", None),
                (0, "count", "I", None),
                (1, "x", "Ljava/lang/Object;", Some("TT;")),
            ]
        );
        assert_eq!(info.locals[0].start, t.label_at(0).unwrap());
        assert_eq!(info.locals[0].end, t.label_at(1).unwrap());
        assert_eq!(info.locals[1].start, t.label_at(3).unwrap());
        assert_eq!(info.locals[1].end, t.end_label());
    }

    #[test]
    fn stray_end_local_is_a_translation_error() {
        let mut b = header(1, &[]);
        write_u1(&mut b, DBG_END_LOCAL);
        write_uleb128(&mut b, 2);
        write_u1(&mut b, DBG_END_SEQUENCE);
        let e = decode(&b, &mut labels()).unwrap_err();
        assert!(e.is_translation());
    }

    #[test]
    fn unterminated_program_is_a_translation_error() {
        let mut b = header(1, &[]);
        write_u1(&mut b, DBG_FIRST_SPECIAL);
        let e = decode(&b, &mut labels()).unwrap_err();
        assert!(e.is_translation());
    }

    #[test]
    fn address_overflow_is_a_translation_error() {
        let mut b = header(1, &[]);
        write_u1(&mut b, DBG_ADVANCE_PC);
        write_uleb128(&mut b, u32::MAX);
        write_u1(&mut b, DBG_ADVANCE_PC);
        write_uleb128(&mut b, 5);
        write_u1(&mut b, DBG_END_SEQUENCE);
        let e = decode(&b, &mut labels()).unwrap_err();
        assert!(e.is_translation());
        assert!(e.message().contains("overflows"), "{}", e);

        let mut b = header(1, &[]);
        write_u1(&mut b, DBG_ADVANCE_PC);
        write_uleb128(&mut b, u32::MAX);
        write_u1(&mut b, DBG_FIRST_SPECIAL + 15);
        write_u1(&mut b, DBG_END_SEQUENCE);
        assert!(decode(&b, &mut labels()).unwrap_err().is_translation());
    }

    #[test]
    fn unnamed_local_is_skipped_but_can_be_ended() {
        let mut b = header(1, &[]);
        write_u1(&mut b, DBG_START_LOCAL);
        write_uleb128(&mut b, 2);
        write_uleb128p1(&mut b, -1);
        write_uleb128p1(&mut b, 0);
        write_u1(&mut b, DBG_END_LOCAL);
        write_uleb128(&mut b, 2);
        write_u1(&mut b, DBG_END_SEQUENCE);
        let info = decode(&b, &mut labels()).unwrap();
        assert!(info.locals.is_empty());
    }
}
