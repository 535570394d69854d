#[macro_use]
pub mod error;

pub mod annotations;
pub mod class_data;
pub mod debug_info;
pub mod decoder;
pub mod dex_file;
pub mod encoded_values;
pub mod instructions;
pub(crate) mod leb;
pub mod opcodes;

use crate::dex::error::DexError;
use crate::dex::leb::{decode_sleb128, decode_uleb128, decode_uleb128p1};

pub use crate::dex::dex_file::DexFile;

// Basic type reading
pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, DexError>
{
    if bytes.len() < *ix + 1
    {
        fail!("Unexpected end of stream reading u1 at offset 0x{:x}", *ix);
    }
    let result = bytes[*ix];
    *ix += 1;
    Ok(result)
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError>
{
    if bytes.len() < *ix + 2
    {
        fail!("Unexpected end of stream reading u2 at offset 0x{:x}", *ix);
    }
    let result = u16::from_le_bytes([bytes[*ix], bytes[*ix + 1]]);
    *ix += 2;
    Ok(result)
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    if bytes.len() < *ix + 4
    {
        fail!("Unexpected end of stream reading u4 at offset 0x{:x}", *ix);
    }
    let result = u32::from_le_bytes([bytes[*ix], bytes[*ix + 1], bytes[*ix + 2], bytes[*ix + 3]]);
    *ix += 4;
    Ok(result)
}

pub(crate) fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    let Some((val, size)) = decode_uleb128(bytes.get(*ix..).unwrap_or_default()) else {
        fail!("Unexpected end of stream reading uleb128 at offset 0x{:x}", *ix);
    };
    *ix += size;
    Ok(val)
}

pub(crate) fn read_sleb128(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    let Some((val, size)) = decode_sleb128(bytes.get(*ix..).unwrap_or_default()) else {
        fail!("Unexpected end of stream reading sleb128 at offset 0x{:x}", *ix);
    };
    *ix += size;
    Ok(val)
}

pub(crate) fn read_uleb128p1(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    let Some((val, size)) = decode_uleb128p1(bytes.get(*ix..).unwrap_or_default()) else {
        fail!("Unexpected end of stream reading uleb128p1 at offset 0x{:x}", *ix);
    };
    *ix += size;
    Ok(val)
}

pub(crate) fn read_x(bytes: &[u8], ix: &mut usize, length: usize) -> Result<Vec<u8>, DexError>
{
    match bytes.get(*ix..).filter(|rest| rest.len() >= length)
    {
        Some(rest) =>
        {
            let v = rest[..length].to_vec();
            *ix += length;
            Ok(v)
        }
        None => fail!("Buffer too short reading {} bytes at offset 0x{:x}", length, *ix),
    }
}

#[cfg(test)]
pub(crate) fn write_u1(buffer: &mut Vec<u8>, val: u8) -> usize
{
    buffer.push(val);
    1
}

#[cfg(test)]
pub(crate) fn write_u2(buffer: &mut Vec<u8>, val: u16) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    2
}

#[cfg(test)]
pub(crate) fn write_u4(buffer: &mut Vec<u8>, val: u32) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    4
}

#[cfg(test)]
pub(crate) fn write_uleb128(buffer: &mut Vec<u8>, val: u32) -> usize
{
    let encoded = leb::encode_uleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

#[cfg(test)]
pub(crate) fn write_sleb128(buffer: &mut Vec<u8>, val: i32) -> usize
{
    let encoded = leb::encode_sleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

#[cfg(test)]
pub(crate) fn write_uleb128p1(buffer: &mut Vec<u8>, val: i32) -> usize
{
    let encoded = leb::encode_uleb128p1(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_words()
    {
        let bytes = [0x78, 0x56, 0x34, 0x12, 0xcd, 0xab];
        let mut ix = 0;
        assert_eq!(read_u4(&bytes, &mut ix).unwrap(), 0x12345678);
        assert_eq!(read_u2(&bytes, &mut ix).unwrap(), 0xabcd);
        assert_eq!(ix, 6);
        assert!(read_u1(&bytes, &mut ix).is_err());
    }

    #[test]
    fn truncated_reads_name_the_offset()
    {
        let bytes = [0x01, 0x02, 0x03];
        let mut ix = 1;
        let e = read_u4(&bytes, &mut ix).unwrap_err();
        assert_eq!(e.to_string(), "Unexpected end of stream reading u4 at offset 0x1");
        assert_eq!(ix, 1);

        let mut ix = 2;
        assert!(read_x(&bytes, &mut ix, 2).is_err());
        let mut ix = 5;
        assert!(read_uleb128(&bytes, &mut ix).is_err());
    }
}
