/* Dex file format structures */

use std::collections::HashMap;

use log::debug;

use crate::dex::annotations::{AnnotationItem, AnnotationSetItem, AnnotationSetRefList, AnnotationsDirectoryItem};
use crate::dex::class_data::{ClassData, CodeItem};
use crate::dex::encoded_values::{read_encoded_array, EncodedValue};
use crate::dex::error::DexError;
use crate::dex::{read_u1, read_u2, read_u4, read_uleb128, read_x};

/* Constants */
pub const DEX_FILE_MAGIC: [u8; 4] = [0x64, 0x65, 0x78, 0x0a];
pub const HEADER_SIZE: u32 = 0x70;
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;
pub const NO_INDEX: u32 = 0xffffffff;

/* Access flags */
pub const ACC_PUBLIC: u32 = 0x1;
pub const ACC_PRIVATE: u32 = 0x2;
pub const ACC_PROTECTED: u32 = 0x4;
pub const ACC_STATIC: u32 = 0x8;
pub const ACC_FINAL: u32 = 0x10;
pub const ACC_SYNCHRONIZED: u32 = 0x20;
pub const ACC_VOLATILE: u32 = 0x40;
pub const ACC_BRIDGE: u32 = 0x40;
pub const ACC_TRANSIENT: u32 = 0x80;
pub const ACC_VARARGS: u32 = 0x80;
pub const ACC_NATIVE: u32 = 0x100;
pub const ACC_INTERFACE: u32 = 0x200;
pub const ACC_ABSTRACT: u32 = 0x400;
pub const ACC_STRICT: u32 = 0x800;
pub const ACC_SYNTHETIC: u32 = 0x1000;
pub const ACC_ANNOTATION: u32 = 0x2000;
pub const ACC_ENUM: u32 = 0x4000;
pub const ACC_CONSTRUCTOR: u32 = 0x10000;
pub const ACC_DECLARED_SYNCHRONIZED: u32 = 0x20000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl Header
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<Header, DexError>
    {
        if bytes.len() < HEADER_SIZE as usize {
            fail!("Not enough bytes for header: {} < 0x{:x}", bytes.len(), HEADER_SIZE);
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&read_x(bytes, ix, 8)?);
        if magic[..4] != DEX_FILE_MAGIC || magic[7] != 0 || !magic[4..7].iter().all(u8::is_ascii_digit) {
            fail!("Invalid magic value {:02x?} at offset 0x0", magic);
        }

        let checksum = read_u4(bytes, ix)?;
        let mut signature = [0u8; 20];
        signature.copy_from_slice(&read_x(bytes, ix, 20)?);
        let file_size = read_u4(bytes, ix)?;
        let header_size = read_u4(bytes, ix)?;
        let endian_tag = read_u4(bytes, ix)?;
        match endian_tag
        {
            ENDIAN_CONSTANT => {}
            REVERSE_ENDIAN_CONSTANT => fail!("Byte-swapped DEX files are not supported (endian tag 0x{:08x} at offset 0x28)", endian_tag),
            _ => fail!("Invalid endian tag 0x{:08x} at offset 0x28", endian_tag),
        }
        if header_size != HEADER_SIZE {
            fail!("Unexpected header size 0x{:x} at offset 0x24", header_size);
        }
        if file_size as usize > bytes.len() {
            fail!("Declared file size 0x{:x} exceeds buffer length 0x{:x}", file_size, bytes.len());
        }

        Ok(Header {
            magic,
            checksum,
            signature,
            file_size,
            header_size,
            endian_tag,
            link_size: read_u4(bytes, ix)?,
            link_off: read_u4(bytes, ix)?,
            map_off: read_u4(bytes, ix)?,
            string_ids_size: read_u4(bytes, ix)?,
            string_ids_off: read_u4(bytes, ix)?,
            type_ids_size: read_u4(bytes, ix)?,
            type_ids_off: read_u4(bytes, ix)?,
            proto_ids_size: read_u4(bytes, ix)?,
            proto_ids_off: read_u4(bytes, ix)?,
            field_ids_size: read_u4(bytes, ix)?,
            field_ids_off: read_u4(bytes, ix)?,
            method_ids_size: read_u4(bytes, ix)?,
            method_ids_off: read_u4(bytes, ix)?,
            class_defs_size: read_u4(bytes, ix)?,
            class_defs_off: read_u4(bytes, ix)?,
            data_size: read_u4(bytes, ix)?,
            data_off: read_u4(bytes, ix)?,
        })
    }

    /// The three digit format version from the magic, e.g. 35 for `dex\n035\0`.
    pub fn version(&self) -> u32
    {
        self.magic[4..7].iter().fold(0, |acc, d| acc * 10 + (d - b'0') as u32)
    }
}

/// Reads a `string_data_item`: a uleb128 UTF-16 length followed by NUL terminated MUTF-8.
pub(crate) fn read_string_data(bytes: &[u8], ix: &mut usize) -> Result<String, DexError>
{
    let start = *ix;
    let utf16_size = read_uleb128(bytes, ix)? as usize;
    let mut v = vec![];
    loop
    {
        let u = read_u1(bytes, ix)?;
        if u == 0 { break; }
        v.push(u);
    }

    let s = match cesu8::from_java_cesu8(v.as_slice())
    {
        Ok(s) => s.into_owned(),
        Err(_) => fail!("Malformed MUTF-8 string data at offset 0x{:x}", start),
    };
    let decoded_len = s.encode_utf16().count();
    if decoded_len != utf16_size {
        fail!("String length mismatch at offset 0x{:x}: declared {}, decoded {}", start, utf16_size, decoded_len);
    }
    Ok(s)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoIdItem {
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub parameters_off: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIdItem {
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: u32,
}

impl FieldIdItem
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<FieldIdItem, DexError>
    {
        Ok(FieldIdItem {
            class_idx: read_u2(bytes, ix)?,
            type_idx: read_u2(bytes, ix)?,
            name_idx: read_u4(bytes, ix)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodIdItem {
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: u32,
}

impl MethodIdItem
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<MethodIdItem, DexError>
    {
        Ok(MethodIdItem {
            class_idx: read_u2(bytes, ix)?,
            proto_idx: read_u2(bytes, ix)?,
            name_idx: read_u4(bytes, ix)?,
        })
    }
}

/// Raw `class_def_item`. The offsets are only followed when the class is actually used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefItem {
    pub class_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: u32,
    pub interfaces_off: u32,
    pub source_file_idx: u32,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

impl ClassDefItem
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<ClassDefItem, DexError>
    {
        Ok(ClassDefItem {
            class_idx: read_u4(bytes, ix)?,
            access_flags: read_u4(bytes, ix)?,
            superclass_idx: read_u4(bytes, ix)?,
            interfaces_off: read_u4(bytes, ix)?,
            source_file_idx: read_u4(bytes, ix)?,
            annotations_off: read_u4(bytes, ix)?,
            class_data_off: read_u4(bytes, ix)?,
            static_values_off: read_u4(bytes, ix)?,
        })
    }
}

/// A method prototype with every index resolved to its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proto<'a> {
    pub shorty: &'a str,
    pub return_type: &'a str,
    pub parameters: Vec<&'a str>,
}

impl Proto<'_>
{
    /// The JVM method descriptor, e.g. `(ILjava/lang/String;)V`.
    pub fn descriptor(&self) -> String
    {
        let mut s = String::from("(");
        for p in &self.parameters {
            s.push_str(p);
        }
        s.push(')');
        s.push_str(self.return_type);
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc<'a> {
    pub class: &'a str,
    pub name: &'a str,
    pub type_: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDesc<'a> {
    pub class: &'a str,
    pub name: &'a str,
    pub proto: Proto<'a>,
}

/// A class definition with its names resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef<'a> {
    pub descriptor: &'a str,
    pub access_flags: u32,
    pub superclass: Option<&'a str>,
    pub interfaces: Vec<&'a str>,
    pub source_file: Option<&'a str>,
    pub item: &'a ClassDefItem,
}

/// A parsed DEX container.
///
/// The id tables are parsed and range checked up front; everything reachable from a
/// class definition (class data, code, debug info, annotations, static values) is
/// decoded from the buffer each time it is asked for.
#[derive(Debug)]
pub struct DexFile {
    pub header: Header,
    bytes: Vec<u8>,
    strings: Vec<String>,
    types: Vec<u32>,
    protos: Vec<ProtoIdItem>,
    fields: Vec<FieldIdItem>,
    methods: Vec<MethodIdItem>,
    class_defs: Vec<ClassDefItem>,
    class_index: HashMap<String, usize>,
}

impl DexFile
{
    pub fn from_bytes(bytes: Vec<u8>) -> Result<DexFile, DexError>
    {
        let mut ix = 0;
        let header = Header::read(&bytes, &mut ix)?;
        debug!("DEX version {:03}, {} classes, checksum 0x{:08x}", header.version(), header.class_defs_size, header.checksum);

        check_table(&bytes, "string_ids", header.string_ids_off, header.string_ids_size, 4)?;
        check_table(&bytes, "type_ids", header.type_ids_off, header.type_ids_size, 4)?;
        check_table(&bytes, "proto_ids", header.proto_ids_off, header.proto_ids_size, 12)?;
        check_table(&bytes, "field_ids", header.field_ids_off, header.field_ids_size, 8)?;
        check_table(&bytes, "method_ids", header.method_ids_off, header.method_ids_size, 8)?;
        check_table(&bytes, "class_defs", header.class_defs_off, header.class_defs_size, 32)?;

        // Strings
        let mut strings = Vec::with_capacity(header.string_ids_size as usize);
        ix = header.string_ids_off as usize;
        for i in 0..header.string_ids_size
        {
            let mut data_off = read_u4(&bytes, &mut ix)? as usize;
            let s = read_string_data(&bytes, &mut data_off)
                .map_err(|e| err!(e, "string_ids[{}]", i))?;
            strings.push(s);
        }

        // Types, resolved eagerly
        let mut types = Vec::with_capacity(header.type_ids_size as usize);
        ix = header.type_ids_off as usize;
        for i in 0..header.type_ids_size
        {
            let descriptor_idx = read_u4(&bytes, &mut ix)?;
            match strings.get(descriptor_idx as usize)
            {
                Some(s) if !s.is_empty() => types.push(descriptor_idx),
                Some(_) => fail!("Empty type descriptor for type_ids[{}] at offset 0x{:x}", i, ix - 4),
                None => fail!("String index {} out of range for type_ids[{}] at offset 0x{:x}", descriptor_idx, i, ix - 4),
            }
        }

        // Prototypes
        let mut protos = Vec::with_capacity(header.proto_ids_size as usize);
        ix = header.proto_ids_off as usize;
        for i in 0..header.proto_ids_size
        {
            let at = ix;
            let p = ProtoIdItem {
                shorty_idx: read_u4(&bytes, &mut ix)?,
                return_type_idx: read_u4(&bytes, &mut ix)?,
                parameters_off: read_u4(&bytes, &mut ix)?,
            };
            check_index("string", p.shorty_idx, strings.len(), at).map_err(|e| err!(e, "proto_ids[{}]", i))?;
            check_index("type", p.return_type_idx, types.len(), at).map_err(|e| err!(e, "proto_ids[{}]", i))?;
            protos.push(p);
        }

        // Field ids
        let mut fields = Vec::with_capacity(header.field_ids_size as usize);
        ix = header.field_ids_off as usize;
        for i in 0..header.field_ids_size
        {
            let at = ix;
            let f = FieldIdItem::read(&bytes, &mut ix)?;
            check_index("type", f.class_idx as u32, types.len(), at)
                .and_then(|_| check_index("type", f.type_idx as u32, types.len(), at))
                .and_then(|_| check_index("string", f.name_idx, strings.len(), at))
                .map_err(|e| err!(e, "field_ids[{}]", i))?;
            fields.push(f);
        }

        // Method ids
        let mut methods = Vec::with_capacity(header.method_ids_size as usize);
        ix = header.method_ids_off as usize;
        for i in 0..header.method_ids_size
        {
            let at = ix;
            let m = MethodIdItem::read(&bytes, &mut ix)?;
            check_index("type", m.class_idx as u32, types.len(), at)
                .and_then(|_| check_index("proto", m.proto_idx as u32, protos.len(), at))
                .and_then(|_| check_index("string", m.name_idx, strings.len(), at))
                .map_err(|e| err!(e, "method_ids[{}]", i))?;
            methods.push(m);
        }

        // Class defs
        let mut class_defs = Vec::with_capacity(header.class_defs_size as usize);
        let mut class_index = HashMap::new();
        ix = header.class_defs_off as usize;
        for i in 0..header.class_defs_size
        {
            let at = ix;
            let c = ClassDefItem::read(&bytes, &mut ix)?;
            check_index("type", c.class_idx, types.len(), at).map_err(|e| err!(e, "class_defs[{}]", i))?;
            if c.superclass_idx != NO_INDEX {
                check_index("type", c.superclass_idx, types.len(), at).map_err(|e| err!(e, "class_defs[{}]", i))?;
            }
            if c.source_file_idx != NO_INDEX {
                check_index("string", c.source_file_idx, strings.len(), at).map_err(|e| err!(e, "class_defs[{}]", i))?;
            }
            let name = strings[types[c.class_idx as usize] as usize].clone();
            if class_index.insert(name.clone(), class_defs.len()).is_some() {
                fail!("Duplicate class definition {} at offset 0x{:x}", name, at);
            }
            class_defs.push(c);
        }

        Ok(DexFile { header, bytes, strings, types, protos, fields, methods, class_defs, class_index })
    }

    pub fn bytes(&self) -> &[u8]
    {
        &self.bytes
    }

    pub fn string(&self, idx: u32) -> Result<&str, DexError>
    {
        match self.strings.get(idx as usize)
        {
            Some(s) => Ok(s),
            None => fail!("String index {} out of range ({} strings)", idx, self.strings.len()),
        }
    }

    /// Resolves a type index to its descriptor, e.g. `Ljava/lang/String;`.
    pub fn type_descriptor(&self, idx: u32) -> Result<&str, DexError>
    {
        match self.types.get(idx as usize)
        {
            Some(s) => Ok(&self.strings[*s as usize]),
            None => fail!("Type index {} out of range ({} types)", idx, self.types.len()),
        }
    }

    pub fn proto(&self, idx: u32) -> Result<Proto<'_>, DexError>
    {
        let Some(p) = self.protos.get(idx as usize) else {
            fail!("Proto index {} out of range ({} protos)", idx, self.protos.len());
        };
        Ok(Proto {
            shorty: self.string(p.shorty_idx)?,
            return_type: self.type_descriptor(p.return_type_idx)?,
            parameters: self.type_list(p.parameters_off)?,
        })
    }

    pub fn field(&self, idx: u32) -> Result<FieldDesc<'_>, DexError>
    {
        let Some(f) = self.fields.get(idx as usize) else {
            fail!("Field index {} out of range ({} fields)", idx, self.fields.len());
        };
        Ok(FieldDesc {
            class: self.type_descriptor(f.class_idx as u32)?,
            name: self.string(f.name_idx)?,
            type_: self.type_descriptor(f.type_idx as u32)?,
        })
    }

    pub fn method(&self, idx: u32) -> Result<MethodDesc<'_>, DexError>
    {
        let Some(m) = self.methods.get(idx as usize) else {
            fail!("Method index {} out of range ({} methods)", idx, self.methods.len());
        };
        Ok(MethodDesc {
            class: self.type_descriptor(m.class_idx as u32)?,
            name: self.string(m.name_idx)?,
            proto: self.proto(m.proto_idx as u32)?,
        })
    }

    /// Reads a `type_list`; offset zero is the empty list.
    pub fn type_list(&self, off: u32) -> Result<Vec<&str>, DexError>
    {
        if off == 0 {
            return Ok(vec![]);
        }
        let mut ix = off as usize;
        let size = read_u4(&self.bytes, &mut ix)?;
        let mut v = Vec::with_capacity(size.min(0x1000) as usize);
        for _ in 0..size {
            let t = read_u2(&self.bytes, &mut ix)?;
            v.push(self.type_descriptor(t as u32).map_err(|e| err!(e, "type_list at 0x{:x}", off))?);
        }
        Ok(v)
    }

    pub fn class_defs_len(&self) -> usize
    {
        self.class_defs.len()
    }

    pub fn class_def(&self, i: usize) -> Result<ClassDef<'_>, DexError>
    {
        let Some(item) = self.class_defs.get(i) else {
            fail!("Class def index {} out of range ({} classes)", i, self.class_defs.len());
        };
        let superclass = if item.superclass_idx == NO_INDEX { None } else { Some(self.type_descriptor(item.superclass_idx)?) };
        let source_file = if item.source_file_idx == NO_INDEX { None } else { Some(self.string(item.source_file_idx)?) };
        Ok(ClassDef {
            descriptor: self.type_descriptor(item.class_idx)?,
            access_flags: item.access_flags,
            superclass,
            interfaces: self.type_list(item.interfaces_off)?,
            source_file,
            item,
        })
    }

    pub fn class_defs(&self) -> impl Iterator<Item = Result<ClassDef<'_>, DexError>> + '_
    {
        (0..self.class_defs.len()).map(move |i| self.class_def(i))
    }

    /// Looks a class up by descriptor (`Lfoo/Bar;`).
    pub fn find_class(&self, descriptor: &str) -> Result<Option<ClassDef<'_>>, DexError>
    {
        match self.class_index.get(descriptor)
        {
            Some(i) => Ok(Some(self.class_def(*i)?)),
            None => Ok(None),
        }
    }

    pub fn class_data(&self, def: &ClassDef<'_>) -> Result<Option<ClassData>, DexError>
    {
        if def.item.class_data_off == 0 {
            return Ok(None);
        }
        let mut ix = def.item.class_data_off as usize;
        ClassData::read(&self.bytes, &mut ix)
            .map(Some)
            .map_err(|e| err!(e, "class_data of {}", def.descriptor))
    }

    pub fn code_item(&self, off: u32) -> Result<CodeItem, DexError>
    {
        let mut ix = off as usize;
        CodeItem::read(&self.bytes, &mut ix)
    }

    pub fn static_values(&self, def: &ClassDef<'_>) -> Result<Vec<EncodedValue>, DexError>
    {
        if def.item.static_values_off == 0 {
            return Ok(vec![]);
        }
        let mut ix = def.item.static_values_off as usize;
        read_encoded_array(&self.bytes, &mut ix).map_err(|e| err!(e, "static_values of {}", def.descriptor))
    }

    pub fn annotations_directory(&self, def: &ClassDef<'_>) -> Result<Option<AnnotationsDirectoryItem>, DexError>
    {
        if def.item.annotations_off == 0 {
            return Ok(None);
        }
        let mut ix = def.item.annotations_off as usize;
        AnnotationsDirectoryItem::read(&self.bytes, &mut ix)
            .map(Some)
            .map_err(|e| err!(e, "annotations_directory of {}", def.descriptor))
    }

    /// Reads every `annotation_item` of the set at `off`; offset zero is the empty set.
    pub fn annotation_set(&self, off: u32) -> Result<Vec<AnnotationItem>, DexError>
    {
        if off == 0 {
            return Ok(vec![]);
        }
        let mut ix = off as usize;
        let set = AnnotationSetItem::read(&self.bytes, &mut ix)?;
        let mut items = Vec::with_capacity(set.entries.len());
        for entry_off in set.entries {
            let mut j = entry_off as usize;
            items.push(AnnotationItem::read(&self.bytes, &mut j).map_err(|e| err!(e, "annotation_item at 0x{:x}", entry_off))?);
        }
        Ok(items)
    }

    pub fn annotation_set_ref_list(&self, off: u32) -> Result<Vec<Vec<AnnotationItem>>, DexError>
    {
        let mut ix = off as usize;
        let list = AnnotationSetRefList::read(&self.bytes, &mut ix)?;
        list.list.iter().map(|set_off| self.annotation_set(*set_off)).collect()
    }
}

fn check_table(bytes: &[u8], name: &str, off: u32, size: u32, entry_size: u64) -> Result<(), DexError>
{
    let end = off as u64 + size as u64 * entry_size;
    if size > 0 && end > bytes.len() as u64 {
        fail!("Table {} at offset 0x{:x} with {} entries runs past the end of the file", name, off, size);
    }
    Ok(())
}

fn check_index(kind: &str, idx: u32, len: usize, at: usize) -> Result<(), DexError>
{
    if idx as usize >= len {
        fail!("{} index {} out of range ({} entries) at offset 0x{:x}", kind, idx, len, at);
    }
    Ok(())
}
