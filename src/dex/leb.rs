/// Decodes an unsigned LEB128 value. Returns the value and the number of bytes consumed,
/// or `None` when the input ends before the terminating byte.
pub(crate) fn decode_uleb128(encoded: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    let mut shift: u32 = 0;

    for (count, &byte) in encoded.iter().enumerate() {
        let low = (byte & 0x7F) as u32;
        if shift < 32 {
            value |= low.wrapping_shl(shift);
        }
        shift += 7;

        // DEX uleb128 values are 32-bit, valid encodings are at most 5 bytes
        if byte & 0x80 == 0 || count == 4 {
            return Some((value, count + 1));
        }
    }

    None
}

pub(crate) fn decode_sleb128(encoded: &[u8]) -> Option<(i32, usize)> {
    let mut value: i32 = 0;
    let mut shift: u32 = 0;

    for (count, &byte) in encoded.iter().enumerate() {
        let low = (byte & 0x7F) as i32;
        if shift < 32 {
            value |= low.wrapping_shl(shift);
        }
        shift += 7;

        if byte & 0x80 == 0 || count == 4 {
            if (byte & 0x40) != 0 && shift < 32 {
                value |= (-1i32).wrapping_shl(shift);
            }
            return Some((value, count + 1));
        }
    }

    None
}

pub(crate) fn decode_uleb128p1(encoded: &[u8]) -> Option<(i32, usize)> {
    decode_uleb128(encoded).map(|(v, c)| (v as i32 - 1, c))
}

#[cfg(test)]
pub(crate) fn encode_uleb128(value: u32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut remaining = value;
    loop {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining != 0 {
            byte |= 0x80;
        }
        result.push(byte);
        if remaining == 0 {
            return result;
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_sleb128(value: i32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut remaining = value;

    loop {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;

        let done = (remaining == 0 && (byte & 0x40) == 0) || (remaining == -1 && (byte & 0x40) != 0);
        if !done {
            byte |= 0x80;
        }
        result.push(byte);
        if done {
            return result;
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_uleb128p1(value: i32) -> Vec<u8> {
    encode_uleb128((value + 1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16256, vec![0x80, 0x7F]),
            (624485, vec![0xE5, 0x8E, 0x26]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_uleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_uleb128() {
        let cases = vec![
            (vec![0x00], 0, 1),
            (vec![0x7F], 127, 1),
            (vec![0x80, 0x01], 128, 2),
            (vec![0xE5, 0x8E, 0x26, 0xff], 624485, 3),
            (vec![0xff, 0xff, 0xff, 0xff, 0x0f], u32::MAX, 5),
        ];

        for (encoded, expected, size) in cases {
            assert_eq!(decode_uleb128(&encoded), Some((expected, size)));
        }
    }

    #[test]
    fn truncated_uleb128_is_rejected() {
        assert_eq!(decode_uleb128(&[0x80, 0x80]), None);
        assert_eq!(decode_uleb128(&[]), None);
    }

    #[test]
    fn test_sleb128() {
        let cases = vec![
            (vec![0x00], 0),
            (vec![0x01], 1),
            (vec![0x7F], -1),
            (vec![0xFF, 0x00], 127),
            (vec![0x80, 0x7F], -128),
            (vec![0xC0, 0xBB, 0x78], -123456),
        ];

        for (encoded, expected) in cases {
            assert_eq!(decode_sleb128(&encoded).map(|(v, _)| v), Some(expected));
            assert_eq!(encode_sleb128(expected), encoded);
        }
    }

    #[test]
    fn uleb128p1_maps_zero_to_no_index() {
        assert_eq!(decode_uleb128p1(&[0x00]), Some((-1, 1)));
        assert_eq!(encode_uleb128p1(-1), vec![0x00]);
        assert_eq!(decode_uleb128p1(&encode_uleb128p1(41)), Some((41, 1)));
    }
}
