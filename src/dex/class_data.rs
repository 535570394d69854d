//! `class_data_item` and `code_item`

use std::collections::BTreeMap;

use log::warn;

use crate::dex::error::DexError;
use crate::dex::{read_sleb128, read_u2, read_u4, read_uleb128};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedField
{
    pub field_idx: u32,
    pub access_flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMethod
{
    pub method_idx: u32,
    pub access_flags: u32,
    /// Offset of the `code_item`, zero for abstract and native methods.
    pub code_off: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassData {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

impl ClassData
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<ClassData, DexError>
    {
        let static_fields_size = read_uleb128(bytes, ix)?;
        let instance_fields_size = read_uleb128(bytes, ix)?;
        let direct_methods_size = read_uleb128(bytes, ix)?;
        let virtual_methods_size = read_uleb128(bytes, ix)?;

        Ok(ClassData {
            static_fields: read_fields(bytes, ix, static_fields_size)?,
            instance_fields: read_fields(bytes, ix, instance_fields_size)?,
            direct_methods: read_methods(bytes, ix, direct_methods_size)?,
            virtual_methods: read_methods(bytes, ix, virtual_methods_size)?,
        })
    }
}

// Indices are delta encoded against the previous entry of the same list
fn read_fields(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<EncodedField>, DexError>
{
    let mut v = vec![];
    let mut field_idx = 0u32;
    for _ in 0..count {
        field_idx = field_idx.wrapping_add(read_uleb128(bytes, ix)?);
        v.push(EncodedField { field_idx, access_flags: read_uleb128(bytes, ix)? });
    }
    Ok(v)
}

fn read_methods(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<EncodedMethod>, DexError>
{
    let mut v = vec![];
    let mut method_idx = 0u32;
    for _ in 0..count {
        method_idx = method_idx.wrapping_add(read_uleb128(bytes, ix)?);
        let access_flags = read_uleb128(bytes, ix)?;
        let code_off = read_uleb128(bytes, ix)?;
        v.push(EncodedMethod { method_idx, access_flags, code_off });
    }
    Ok(v)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    /// Byte offset of the handler, relative to the start of the handler list.
    pub handler_off: u16,
}

impl TryItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<TryItem, DexError> {
        Ok(TryItem {
            start_addr: read_u4(bytes, ix)?,
            insn_count: read_u2(bytes, ix)?,
            handler_off: read_u2(bytes, ix)?,
        })
    }

    pub fn end_addr(&self) -> u32 {
        self.start_addr + self.insn_count as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTypeAddrPair {
    pub type_idx: u32,
    pub addr: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCatchHandler {
    pub handlers: Vec<EncodedTypeAddrPair>,
    pub catch_all_addr: Option<u32>,
}

impl EncodedCatchHandler {
    /// A positive size is the number of typed handlers; zero or negative additionally
    /// means a catch-all address follows them.
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedCatchHandler, DexError> {
        let size = read_sleb128(bytes, ix)?;
        let count = size.unsigned_abs();
        let mut handlers = Vec::with_capacity(count.min(0x100) as usize);
        for _ in 0..count {
            let type_idx = read_uleb128(bytes, ix)?;
            let addr = read_uleb128(bytes, ix)?;
            handlers.push(EncodedTypeAddrPair { type_idx, addr });
        }
        let catch_all_addr = if size <= 0 { Some(read_uleb128(bytes, ix)?) } else { None };
        Ok(EncodedCatchHandler { handlers, catch_all_addr })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeItem
{
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub debug_info_off: u32,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    /// Handlers keyed by their byte offset within the handler list.
    pub handlers: BTreeMap<u16, EncodedCatchHandler>,
}

impl CodeItem
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<CodeItem, DexError>
    {
        let code_item_start = *ix;
        let registers_size = read_u2(bytes, ix)?;
        let ins_size = read_u2(bytes, ix)?;
        let outs_size = read_u2(bytes, ix)?;
        let tries_size = read_u2(bytes, ix)?;
        let debug_info_off = read_u4(bytes, ix)?;

        if ins_size > registers_size {
            fail!("ins_size {} exceeds registers_size {} in code_item at 0x{:x}", ins_size, registers_size, code_item_start);
        }

        let insns_size = read_u4(bytes, ix)? as usize;
        if *ix + insns_size * 2 > bytes.len() {
            fail!("Instructions of code_item at 0x{:x} run past the end of the file", code_item_start);
        }
        let mut insns = Vec::with_capacity(insns_size);
        for _ in 0..insns_size { insns.push(read_u2(bytes, ix)?); }

        let mut tries = vec![];
        let mut handlers = BTreeMap::new();
        if tries_size > 0 {
            if insns_size & 1 != 0 {
                let padding = read_u2(bytes, ix)?;
                if padding != 0 {
                    warn!("Non-zero padding 0x{:04x} in code_item at 0x{:x}", padding, code_item_start);
                }
            }
            for _ in 0..tries_size { tries.push(TryItem::read(bytes, ix)?); }

            let list_start = *ix;
            let list_size = read_uleb128(bytes, ix)?;
            for i in 0..list_size {
                let rel = *ix - list_start;
                let h = EncodedCatchHandler::read(bytes, ix)
                    .map_err(|e| err!(e, "catch handler {} of code_item at 0x{:x}", i, code_item_start))?;
                handlers.insert(rel as u16, h);
            }

            for t in &tries {
                if !handlers.contains_key(&t.handler_off) {
                    fail!("Try at 0x{:x} references missing handler offset {} in code_item at 0x{:x}", t.start_addr, t.handler_off, code_item_start);
                }
                if t.end_addr() as usize > insns_size {
                    fail!("Try at 0x{:x} extends past the end of code_item at 0x{:x}", t.start_addr, code_item_start);
                }
            }
        }

        Ok(CodeItem { registers_size, ins_size, outs_size, debug_info_off, insns, tries, handlers })
    }

    pub fn handler_for(&self, t: &TryItem) -> Option<&EncodedCatchHandler>
    {
        self.handlers.get(&t.handler_off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::{write_sleb128, write_u2, write_u4, write_uleb128};

    #[test]
    fn zero_sized_handler_is_catch_all_only()
    {
        let mut buf = vec![];
        write_sleb128(&mut buf, 0);
        write_uleb128(&mut buf, 0x12);
        let mut ix = 0;
        let h = EncodedCatchHandler::read(&buf, &mut ix).unwrap();
        assert!(h.handlers.is_empty());
        assert_eq!(h.catch_all_addr, Some(0x12));
    }

    #[test]
    fn negative_size_has_typed_handlers_and_catch_all()
    {
        let mut buf = vec![];
        write_sleb128(&mut buf, -1);
        write_uleb128(&mut buf, 3);
        write_uleb128(&mut buf, 0x8);
        write_uleb128(&mut buf, 0x10);
        let mut ix = 0;
        let h = EncodedCatchHandler::read(&buf, &mut ix).unwrap();
        assert_eq!(h.handlers, vec![EncodedTypeAddrPair { type_idx: 3, addr: 0x8 }]);
        assert_eq!(h.catch_all_addr, Some(0x10));
        assert_eq!(ix, buf.len());
    }

    #[test]
    fn reads_code_item_with_padding_and_tries()
    {
        let mut buf = vec![];
        write_u2(&mut buf, 2); // registers
        write_u2(&mut buf, 1); // ins
        write_u2(&mut buf, 0); // outs
        write_u2(&mut buf, 1); // tries
        write_u4(&mut buf, 0); // debug info
        write_u4(&mut buf, 3);
        for cu in [0x0012u16, 0x0000, 0x000e] { write_u2(&mut buf, cu); }
        write_u2(&mut buf, 0); // padding
        write_u4(&mut buf, 0);
        write_u2(&mut buf, 2);
        write_u2(&mut buf, 1);
        write_uleb128(&mut buf, 1);
        write_sleb128(&mut buf, 0);
        write_uleb128(&mut buf, 2);

        let mut ix = 0;
        let code = CodeItem::read(&buf, &mut ix).unwrap();
        assert_eq!(code.insns, vec![0x0012, 0x0000, 0x000e]);
        assert_eq!(code.tries.len(), 1);
        let h = code.handler_for(&code.tries[0]).unwrap();
        assert_eq!(h.catch_all_addr, Some(2));
    }

    #[test]
    fn delta_encoded_indices_accumulate()
    {
        let mut buf = vec![];
        for v in [0u32, 0, 2, 0] { write_uleb128(&mut buf, v); }
        for v in [4u32, 0x1, 0x30, 3, 0x10001, 0] { write_uleb128(&mut buf, v); }
        let mut ix = 0;
        let data = ClassData::read(&buf, &mut ix).unwrap();
        assert_eq!(data.direct_methods[0].method_idx, 4);
        assert_eq!(data.direct_methods[1].method_idx, 7);
        assert_eq!(data.direct_methods[1].code_off, 0);
    }
}
