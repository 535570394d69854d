//! The Dalvik opcode table: name, encoding format, reference kind and control flags for
//! every opcode value. Built once on first use and never mutated.

use bitflags::bitflags;
use once_cell::sync::Lazy;

/// Kind of constant pool reference an opcode carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    None,
    String,
    Type,
    Field,
    Method,
    CallSite,
    MethodProto,
    MethodHandle,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpcodeFlags: u32 {
        const CAN_THROW = 0x1;
        const CAN_CONTINUE = 0x4;
        const SETS_RESULT = 0x8;
        const SETS_REGISTER = 0x10;
        const SETS_WIDE_REGISTER = 0x20;
    }
}

/// Instruction encoding formats, named after the Dalvik format ids
/// (`<units><registers><kind>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Format10t,
    Format10x,
    Format11n,
    Format11x,
    Format12x,
    Format20t,
    Format21c,
    Format21ih,
    Format21lh,
    Format21s,
    Format21t,
    Format22b,
    Format22c,
    Format22s,
    Format22t,
    Format22x,
    Format23x,
    Format30t,
    Format31c,
    Format31i,
    Format31t,
    Format32x,
    Format35c,
    Format3rc,
    Format45cc,
    Format4rcc,
    Format51l,
}

impl Format {
    /// Width of the instruction in 16-bit code units.
    pub const fn units(&self) -> usize {
        match self {
            Format::Format10t
            | Format::Format10x
            | Format::Format11n
            | Format::Format11x
            | Format::Format12x => 1,

            Format::Format20t
            | Format::Format21c
            | Format::Format21ih
            | Format::Format21lh
            | Format::Format21s
            | Format::Format21t
            | Format::Format22b
            | Format::Format22c
            | Format::Format22s
            | Format::Format22t
            | Format::Format22x
            | Format::Format23x => 2,

            Format::Format30t
            | Format::Format31c
            | Format::Format31i
            | Format::Format31t
            | Format::Format32x
            | Format::Format35c
            | Format::Format3rc => 3,

            Format::Format45cc | Format::Format4rcc => 4,

            Format::Format51l => 5,
        }
    }
}

#[derive(PartialEq, Eq)]
pub struct Opcode {
    pub value: u8,
    pub name: &'static str,
    pub format: Format,
    pub reference_type: ReferenceType,
    pub flags: OpcodeFlags,
}

impl Opcode {
    pub fn can_throw(&self) -> bool {
        self.flags.contains(OpcodeFlags::CAN_THROW)
    }

    pub fn can_continue(&self) -> bool {
        self.flags.contains(OpcodeFlags::CAN_CONTINUE)
    }

    pub fn sets_result(&self) -> bool {
        self.flags.contains(OpcodeFlags::SETS_RESULT)
    }

    pub fn sets_register(&self) -> bool {
        self.flags.contains(OpcodeFlags::SETS_REGISTER)
    }

    pub fn sets_wide_register(&self) -> bool {
        self.flags.contains(OpcodeFlags::SETS_WIDE_REGISTER)
    }
}

impl std::fmt::Debug for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(0x{:02x})", self.name, self.value)
    }
}

/// Looks an opcode up by its byte value; unused values return `None`.
pub fn opcode(value: u8) -> Option<&'static Opcode> {
    OPCODES[value as usize].as_ref()
}

const CONT: OpcodeFlags = OpcodeFlags::CAN_CONTINUE;
const THROW: OpcodeFlags = OpcodeFlags::CAN_THROW;
const REG: OpcodeFlags = OpcodeFlags::SETS_REGISTER;
const WIDE: OpcodeFlags = OpcodeFlags::SETS_REGISTER.union(OpcodeFlags::SETS_WIDE_REGISTER);
const RESULT: OpcodeFlags = OpcodeFlags::SETS_RESULT;
const NONE: OpcodeFlags = OpcodeFlags::empty();

static OPCODES: Lazy<Vec<Option<Opcode>>> = Lazy::new(|| {
    use Format::*;
    use ReferenceType as R;

    let mut table: Vec<Option<Opcode>> = (0..256).map(|_| None).collect();
    let mut put = |value: u8, name: &'static str, format: Format, reference_type: ReferenceType, flags: OpcodeFlags| {
        table[value as usize] = Some(Opcode { value, name, format, reference_type, flags });
    };

    put(0x00, "nop", Format10x, R::None, CONT);
    put(0x01, "move", Format12x, R::None, CONT | REG);
    put(0x02, "move/from16", Format22x, R::None, CONT | REG);
    put(0x03, "move/16", Format32x, R::None, CONT | REG);
    put(0x04, "move-wide", Format12x, R::None, CONT | WIDE);
    put(0x05, "move-wide/from16", Format22x, R::None, CONT | WIDE);
    put(0x06, "move-wide/16", Format32x, R::None, CONT | WIDE);
    put(0x07, "move-object", Format12x, R::None, CONT | REG);
    put(0x08, "move-object/from16", Format22x, R::None, CONT | REG);
    put(0x09, "move-object/16", Format32x, R::None, CONT | REG);
    put(0x0a, "move-result", Format11x, R::None, CONT | REG);
    put(0x0b, "move-result-wide", Format11x, R::None, CONT | WIDE);
    put(0x0c, "move-result-object", Format11x, R::None, CONT | REG);
    put(0x0d, "move-exception", Format11x, R::None, CONT | REG);
    put(0x0e, "return-void", Format10x, R::None, NONE);
    put(0x0f, "return", Format11x, R::None, NONE);
    put(0x10, "return-wide", Format11x, R::None, NONE);
    put(0x11, "return-object", Format11x, R::None, NONE);
    put(0x12, "const/4", Format11n, R::None, CONT | REG);
    put(0x13, "const/16", Format21s, R::None, CONT | REG);
    put(0x14, "const", Format31i, R::None, CONT | REG);
    put(0x15, "const/high16", Format21ih, R::None, CONT | REG);
    put(0x16, "const-wide/16", Format21s, R::None, CONT | WIDE);
    put(0x17, "const-wide/32", Format31i, R::None, CONT | WIDE);
    put(0x18, "const-wide", Format51l, R::None, CONT | WIDE);
    put(0x19, "const-wide/high16", Format21lh, R::None, CONT | WIDE);
    put(0x1a, "const-string", Format21c, R::String, CONT | THROW | REG);
    put(0x1b, "const-string/jumbo", Format31c, R::String, CONT | THROW | REG);
    put(0x1c, "const-class", Format21c, R::Type, CONT | THROW | REG);
    put(0x1d, "monitor-enter", Format11x, R::None, CONT | THROW);
    put(0x1e, "monitor-exit", Format11x, R::None, CONT | THROW);
    put(0x1f, "check-cast", Format21c, R::Type, CONT | THROW | REG);
    put(0x20, "instance-of", Format22c, R::Type, CONT | THROW | REG);
    put(0x21, "array-length", Format12x, R::None, CONT | THROW | REG);
    put(0x22, "new-instance", Format21c, R::Type, CONT | THROW | REG);
    put(0x23, "new-array", Format22c, R::Type, CONT | THROW | REG);
    put(0x24, "filled-new-array", Format35c, R::Type, CONT | THROW | RESULT);
    put(0x25, "filled-new-array/range", Format3rc, R::Type, CONT | THROW | RESULT);
    put(0x26, "fill-array-data", Format31t, R::None, CONT | THROW);
    put(0x27, "throw", Format11x, R::None, THROW);
    put(0x28, "goto", Format10t, R::None, NONE);
    put(0x29, "goto/16", Format20t, R::None, NONE);
    put(0x2a, "goto/32", Format30t, R::None, NONE);
    put(0x2b, "packed-switch", Format31t, R::None, CONT);
    put(0x2c, "sparse-switch", Format31t, R::None, CONT);

    for (i, name) in ["cmpl-float", "cmpg-float", "cmpl-double", "cmpg-double", "cmp-long"].into_iter().enumerate() {
        put(0x2d + i as u8, name, Format23x, R::None, CONT | REG);
    }
    for (i, name) in ["if-eq", "if-ne", "if-lt", "if-ge", "if-gt", "if-le"].into_iter().enumerate() {
        put(0x32 + i as u8, name, Format22t, R::None, CONT);
    }
    for (i, name) in ["if-eqz", "if-nez", "if-ltz", "if-gez", "if-gtz", "if-lez"].into_iter().enumerate() {
        put(0x38 + i as u8, name, Format21t, R::None, CONT);
    }

    const ACCESS_SUFFIXES: [&str; 7] = ["", "-wide", "-object", "-boolean", "-byte", "-char", "-short"];
    let names: &'static [&'static str] = &[
        "aget", "aget-wide", "aget-object", "aget-boolean", "aget-byte", "aget-char", "aget-short",
        "aput", "aput-wide", "aput-object", "aput-boolean", "aput-byte", "aput-char", "aput-short",
        "iget", "iget-wide", "iget-object", "iget-boolean", "iget-byte", "iget-char", "iget-short",
        "iput", "iput-wide", "iput-object", "iput-boolean", "iput-byte", "iput-char", "iput-short",
        "sget", "sget-wide", "sget-object", "sget-boolean", "sget-byte", "sget-char", "sget-short",
        "sput", "sput-wide", "sput-object", "sput-boolean", "sput-byte", "sput-char", "sput-short",
    ];
    for (i, name) in names.iter().enumerate() {
        let value = 0x44 + i as u8;
        let is_get = i % 14 < 7;
        let wide = ACCESS_SUFFIXES[i % 7] == "-wide";
        let sets = match (is_get, wide) { (true, true) => WIDE, (true, false) => REG, _ => NONE };
        let (format, reference_type) = match i / 14 {
            0 => (Format23x, R::None),
            1 => (Format22c, R::Field),
            _ => (Format21c, R::Field),
        };
        put(value, name, format, reference_type, CONT | THROW | sets);
    }

    for (i, name) in ["invoke-virtual", "invoke-super", "invoke-direct", "invoke-static", "invoke-interface"].into_iter().enumerate() {
        put(0x6e + i as u8, name, Format35c, R::Method, CONT | THROW | RESULT);
    }
    for (i, name) in [
        "invoke-virtual/range", "invoke-super/range", "invoke-direct/range", "invoke-static/range", "invoke-interface/range",
    ].into_iter().enumerate() {
        put(0x74 + i as u8, name, Format3rc, R::Method, CONT | THROW | RESULT);
    }

    let unops: [(&'static str, bool); 21] = [
        ("neg-int", false), ("not-int", false), ("neg-long", true), ("not-long", true),
        ("neg-float", false), ("neg-double", true), ("int-to-long", true), ("int-to-float", false),
        ("int-to-double", true), ("long-to-int", false), ("long-to-float", false), ("long-to-double", true),
        ("float-to-int", false), ("float-to-long", true), ("float-to-double", true), ("double-to-int", false),
        ("double-to-long", true), ("double-to-float", false), ("int-to-byte", false), ("int-to-char", false),
        ("int-to-short", false),
    ];
    for (i, (name, wide)) in unops.into_iter().enumerate() {
        put(0x7b + i as u8, name, Format12x, R::None, CONT | if wide { WIDE } else { REG });
    }

    let binops: [&'static str; 32] = [
        "add-int", "sub-int", "mul-int", "div-int", "rem-int", "and-int", "or-int", "xor-int", "shl-int", "shr-int", "ushr-int",
        "add-long", "sub-long", "mul-long", "div-long", "rem-long", "and-long", "or-long", "xor-long", "shl-long", "shr-long", "ushr-long",
        "add-float", "sub-float", "mul-float", "div-float", "rem-float",
        "add-double", "sub-double", "mul-double", "div-double", "rem-double",
    ];
    let binops_2addr: [&'static str; 32] = [
        "add-int/2addr", "sub-int/2addr", "mul-int/2addr", "div-int/2addr", "rem-int/2addr", "and-int/2addr",
        "or-int/2addr", "xor-int/2addr", "shl-int/2addr", "shr-int/2addr", "ushr-int/2addr",
        "add-long/2addr", "sub-long/2addr", "mul-long/2addr", "div-long/2addr", "rem-long/2addr", "and-long/2addr",
        "or-long/2addr", "xor-long/2addr", "shl-long/2addr", "shr-long/2addr", "ushr-long/2addr",
        "add-float/2addr", "sub-float/2addr", "mul-float/2addr", "div-float/2addr", "rem-float/2addr",
        "add-double/2addr", "sub-double/2addr", "mul-double/2addr", "div-double/2addr", "rem-double/2addr",
    ];
    for i in 0..32 {
        let wide = binops[i].contains("long") || binops[i].contains("double");
        let sets = if wide { WIDE } else { REG };
        // only integer division can throw
        let throws = if binops[i].starts_with("div-int") || binops[i].starts_with("rem-int")
            || binops[i].starts_with("div-long") || binops[i].starts_with("rem-long") { THROW } else { NONE };
        put(0x90 + i as u8, binops[i], Format23x, R::None, CONT | sets | throws);
        put(0xb0 + i as u8, binops_2addr[i], Format12x, R::None, CONT | sets | throws);
    }

    for (i, name) in [
        "add-int/lit16", "rsub-int", "mul-int/lit16", "div-int/lit16", "rem-int/lit16", "and-int/lit16", "or-int/lit16", "xor-int/lit16",
    ].into_iter().enumerate() {
        let throws = if i == 3 || i == 4 { THROW } else { NONE };
        put(0xd0 + i as u8, name, Format22s, R::None, CONT | REG | throws);
    }
    for (i, name) in [
        "add-int/lit8", "rsub-int/lit8", "mul-int/lit8", "div-int/lit8", "rem-int/lit8", "and-int/lit8",
        "or-int/lit8", "xor-int/lit8", "shl-int/lit8", "shr-int/lit8", "ushr-int/lit8",
    ].into_iter().enumerate() {
        let throws = if i == 3 || i == 4 { THROW } else { NONE };
        put(0xd8 + i as u8, name, Format22b, R::None, CONT | REG | throws);
    }

    put(0xfa, "invoke-polymorphic", Format45cc, R::Method, CONT | THROW | RESULT);
    put(0xfb, "invoke-polymorphic/range", Format4rcc, R::Method, CONT | THROW | RESULT);
    put(0xfc, "invoke-custom", Format35c, R::CallSite, CONT | THROW | RESULT);
    put(0xfd, "invoke-custom/range", Format3rc, R::CallSite, CONT | THROW | RESULT);
    put(0xfe, "const-method-handle", Format21c, R::MethodHandle, CONT | THROW | REG);
    put(0xff, "const-method-type", Format21c, R::MethodProto, CONT | THROW | REG);

    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_the_instruction_set()
    {
        let defined = (0..=255u8).filter_map(opcode).count();
        // 0x3e-0x43, 0x73, 0x79-0x7a and 0xe3-0xf9 are unused
        assert_eq!(defined, 256 - 6 - 1 - 2 - 23);
        for value in 0..=255u8 {
            if let Some(op) = opcode(value) {
                assert_eq!(op.value, value);
            }
        }
    }

    #[test]
    fn spot_check_entries()
    {
        let op = opcode(0x2b).unwrap();
        assert_eq!(op.name, "packed-switch");
        assert_eq!(op.format, Format::Format31t);

        assert_eq!(opcode(0x52).unwrap().name, "iget");
        assert_eq!(opcode(0x53).unwrap().name, "iget-wide");
        assert!(opcode(0x53).unwrap().sets_wide_register());
        assert_eq!(opcode(0x6d).unwrap().name, "sput-short");
        assert_eq!(opcode(0x60).unwrap().format, Format::Format21c);
        assert_eq!(opcode(0x8f).unwrap().name, "int-to-short");
        assert_eq!(opcode(0xaf).unwrap().name, "rem-double");
        assert_eq!(opcode(0xcf).unwrap().name, "rem-double/2addr");
        assert_eq!(opcode(0xe2).unwrap().name, "ushr-int/lit8");
        assert!(opcode(0x73).is_none());
        assert!(!opcode(0x28).unwrap().can_continue());
        assert!(opcode(0x71).unwrap().sets_result());
    }

    #[test]
    fn format_widths()
    {
        assert_eq!(Format::Format10x.units(), 1);
        assert_eq!(Format::Format35c.units(), 3);
        assert_eq!(Format::Format51l.units(), 5);
    }
}
