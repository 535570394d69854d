use crate::dex::error::DexError;
use crate::dex::{read_u1, read_uleb128};

#[derive(Debug, PartialEq, Clone)]
pub struct EncodedAnnotation {
    pub type_idx: u32,
    pub elements: Vec<AnnotationElement>,
}

impl EncodedAnnotation {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedAnnotation, DexError> {
        let type_idx = read_uleb128(bytes, ix)?;
        let size = read_uleb128(bytes, ix)? as usize;
        let mut elements = Vec::with_capacity(size.min(0x100));

        for _ in 0..size {
            let name_idx = read_uleb128(bytes, ix)?;
            let value = EncodedValue::read(bytes, ix)?;
            elements.push(AnnotationElement { name_idx, value });
        }

        Ok(EncodedAnnotation { type_idx, elements })
    }

    /// Finds an element by name using the string pool resolver.
    pub fn element<'a>(&'a self, name: &str, resolve: impl Fn(u32) -> Option<&'a str>) -> Option<&'a EncodedValue>
    {
        self.elements.iter().find(|e| resolve(e.name_idx) == Some(name)).map(|e| &e.value)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct AnnotationElement {
    pub name_idx: u32,
    pub value: EncodedValue,
}

#[derive(Debug, PartialEq, Clone)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    MethodType(u32),
    MethodHandle(u32),
    String(u32),
    Type(u32),
    Field(u32),
    Method(u32),
    Enum(u32),
    Array(Vec<EncodedValue>),
    Annotation(EncodedAnnotation),
    Null,
    Boolean(bool),
}

impl EncodedValue
{
    #[inline]
    pub fn as_annotation(&self) -> Option<&EncodedAnnotation> {
        match self {
            EncodedValue::Annotation(ann) => Some(ann),
            _ => None,
        }
    }

    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedValue, DexError> {
        let at = *ix;
        let header_byte = read_u1(bytes, ix)?;
        let value_arg = header_byte >> 5;
        let value_type = header_byte & 0x1F;
        let size = (value_arg + 1) as usize;

        let check_size = |max: usize| -> Result<(), DexError> {
            if size > max {
                fail!("Encoded value type 0x{:02x} with size {} at offset 0x{:x}", value_type, size, at);
            }
            Ok(())
        };

        match value_type {
            0x00 => {
                check_size(1)?;
                Ok(EncodedValue::Byte(read_u1(bytes, ix)? as i8))
            },
            0x02 => {
                check_size(2)?;
                Ok(EncodedValue::Short(read_signed(bytes, ix, size)? as i16))
            },
            0x03 => {
                check_size(2)?;
                Ok(EncodedValue::Char(read_unsigned(bytes, ix, size)? as u16))
            },
            0x04 => {
                check_size(4)?;
                Ok(EncodedValue::Int(read_signed(bytes, ix, size)? as i32))
            },
            0x06 => {
                check_size(8)?;
                Ok(EncodedValue::Long(read_signed(bytes, ix, size)?))
            },
            0x10 => {
                check_size(4)?;
                let bits = read_right_zero_extended(bytes, ix, size, 4)?;
                Ok(EncodedValue::Float(f32::from_bits(bits as u32)))
            },
            0x11 => {
                check_size(8)?;
                let bits = read_right_zero_extended(bytes, ix, size, 8)?;
                Ok(EncodedValue::Double(f64::from_bits(bits)))
            },
            0x15..=0x1B => {
                check_size(4)?;
                let val = read_unsigned(bytes, ix, size)? as u32;
                Ok(match value_type {
                    0x15 => EncodedValue::MethodType(val),
                    0x16 => EncodedValue::MethodHandle(val),
                    0x17 => EncodedValue::String(val),
                    0x18 => EncodedValue::Type(val),
                    0x19 => EncodedValue::Field(val),
                    0x1A => EncodedValue::Method(val),
                    _ => EncodedValue::Enum(val),
                })
            },
            0x1C => Ok(EncodedValue::Array(read_encoded_array(bytes, ix)?)),
            0x1D => Ok(EncodedValue::Annotation(EncodedAnnotation::read(bytes, ix)?)),
            0x1E => Ok(EncodedValue::Null),
            0x1F => Ok(EncodedValue::Boolean(value_arg != 0)),
            _ => fail!("Unknown encoded value type 0x{:02x} at offset 0x{:x}", value_type, at),
        }
    }
}

fn read_unsigned(bytes: &[u8], ix: &mut usize, size: usize) -> Result<u64, DexError> {
    let mut result = 0u64;
    for i in 0..size {
        result |= (read_u1(bytes, ix)? as u64) << (8 * i);
    }
    Ok(result)
}

fn read_signed(bytes: &[u8], ix: &mut usize, size: usize) -> Result<i64, DexError> {
    let raw = read_unsigned(bytes, ix, size)?;
    let shift = 64 - 8 * size as u32;
    Ok(((raw << shift) as i64) >> shift)
}

// Floating point values drop their low order zero bytes
fn read_right_zero_extended(bytes: &[u8], ix: &mut usize, size: usize, width: usize) -> Result<u64, DexError> {
    let raw = read_unsigned(bytes, ix, size)?;
    Ok(raw << (8 * (width - size)))
}

pub fn read_encoded_array(bytes: &[u8], ix: &mut usize) -> Result<Vec<EncodedValue>, DexError>
{
    let size = read_uleb128(bytes, ix)? as usize;

    let mut values = Vec::with_capacity(size.min(0x1000));
    for _ in 0..size
    {
        values.push(EncodedValue::read(bytes, ix)?);
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(bytes: &[u8]) -> EncodedValue
    {
        let mut ix = 0;
        let v = EncodedValue::read(bytes, &mut ix).expect("Failed to read EncodedValue");
        assert_eq!(ix, bytes.len());
        v
    }

    #[test]
    fn test_encoded_value_byte() {
        assert_eq!(read(&[0x00, 0x7F]), EncodedValue::Byte(127));
        assert_eq!(read(&[0x00, 0x80]), EncodedValue::Byte(-128));
    }

    #[test]
    fn short_and_int_are_sign_extended() {
        assert_eq!(read(&[0x02, 0xff]), EncodedValue::Short(-1));
        assert_eq!(read(&[0x24, 0xfe, 0xff]), EncodedValue::Int(-2));
        assert_eq!(read(&[0x64, 0x78, 0x56, 0x34, 0x12]), EncodedValue::Int(0x12345678));
        assert_eq!(read(&[0x06, 0x80]), EncodedValue::Long(-128));
    }

    #[test]
    fn char_is_zero_extended() {
        assert_eq!(read(&[0x03, 0xff]), EncodedValue::Char(0xff));
        assert_eq!(read(&[0x23, 0x34, 0x12]), EncodedValue::Char(0x1234));
    }

    #[test]
    fn floats_are_right_zero_extended() {
        // 1.0f is 0x3f800000, encoded as its two high bytes
        assert_eq!(read(&[0x30, 0x80, 0x3f]), EncodedValue::Float(1.0));
        // 2.0 is 0x4000000000000000
        assert_eq!(read(&[0x11, 0x40]), EncodedValue::Double(2.0));
    }

    #[test]
    fn test_encoded_value_null_and_boolean() {
        assert_eq!(read(&[0x1E]), EncodedValue::Null);
        assert_eq!(read(&[0x1F | (1 << 5)]), EncodedValue::Boolean(true));
        assert_eq!(read(&[0x1F]), EncodedValue::Boolean(false));
    }

    #[test]
    fn rejects_oversized_values() {
        let mut ix = 0;
        assert!(EncodedValue::read(&[0x84, 0, 0, 0, 0, 0], &mut ix).is_err());
        let mut ix = 0;
        assert!(EncodedValue::read(&[0x08], &mut ix).is_err());
    }

    #[test]
    fn test_encoded_annotation_read() {
        // type 1, two elements: name 2 = true, name 3 = int 42
        let bytes = [0x01, 0x02, 0x02, 0x3f, 0x03, 0x04, 0x2a];
        let mut ix = 0;
        let annotation = EncodedAnnotation::read(&bytes, &mut ix).expect("Failed to read EncodedAnnotation");
        assert_eq!(annotation.type_idx, 1);
        assert_eq!(annotation.elements, vec![
            AnnotationElement { name_idx: 2, value: EncodedValue::Boolean(true) },
            AnnotationElement { name_idx: 3, value: EncodedValue::Int(42) },
        ]);
        let names = |i: u32| match i { 2 => Some("flag"), 3 => Some("count"), _ => None };
        assert_eq!(annotation.element("count", names), Some(&EncodedValue::Int(42)));
    }
}
