use crate::error::NanonisError;
use crate::types::{NanonisValue, TypeTag};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Bounds-checked cursor over a received byte buffer.
///
/// Every read checks the remaining length first, so a short buffer turns
/// into `NanonisError::Protocol` instead of a panic or an IO error.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], NanonisError> {
        if n > self.remaining() {
            return Err(NanonisError::Protocol(format!(
                "Buffer too short: need {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u16(&mut self) -> Result<u16, NanonisError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, NanonisError> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, NanonisError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, NanonisError> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, NanonisError> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64, NanonisError> {
        Ok(BigEndian::read_f64(self.take(8)?))
    }

    /// Read a u32 length/count prefix and check it against the remaining
    /// bytes, given the minimum encoded size of one element.
    fn read_prefix(&mut self, element_size: usize) -> Result<usize, NanonisError> {
        let count = self.read_u32()? as usize;
        self.check_fits(count, element_size)?;
        Ok(count)
    }

    fn check_fits(&self, count: usize, element_size: usize) -> Result<(), NanonisError> {
        let needed = count.checked_mul(element_size).ok_or_else(|| {
            NanonisError::Protocol(format!("Length prefix {count} overflows"))
        })?;
        if needed > self.remaining() {
            return Err(NanonisError::Protocol(format!(
                "Length prefix {} needs at least {} bytes, {} left",
                count,
                needed,
                self.remaining()
            )));
        }
        Ok(())
    }

    fn read_string(&mut self, len: usize) -> Result<String, NanonisError> {
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn length_prefix(len: usize) -> Result<u32, NanonisError> {
    u32::try_from(len)
        .map_err(|_| NanonisError::Type(format!("Length {len} does not fit a u32 prefix")))
}

/// Serialize a value according to its wire type, appending to `buffer`.
///
/// Count-from-previous types are written without prefix, the caller is
/// responsible for sending the count as the preceding argument.
pub fn encode_into(
    tag: &TypeTag,
    value: &NanonisValue,
    buffer: &mut Vec<u8>,
) -> Result<(), NanonisError> {
    match (value, tag) {
        (NanonisValue::U16(v), TypeTag::U16) => buffer.write_u16::<BigEndian>(*v)?,
        (NanonisValue::I16(v), TypeTag::I16) => buffer.write_i16::<BigEndian>(*v)?,
        (NanonisValue::U32(v), TypeTag::U32) => buffer.write_u32::<BigEndian>(*v)?,
        (NanonisValue::I32(v), TypeTag::I32) => buffer.write_i32::<BigEndian>(*v)?,
        (NanonisValue::F32(v), TypeTag::F32) => buffer.write_f32::<BigEndian>(*v)?,
        (NanonisValue::F64(v), TypeTag::F64) => buffer.write_f64::<BigEndian>(*v)?,

        (NanonisValue::String(s), TypeTag::String) => {
            buffer.write_u32::<BigEndian>(length_prefix(s.len())?)?;
            buffer.extend_from_slice(s.as_bytes());
        }
        (NanonisValue::String(s), TypeTag::CountedString) => {
            buffer.extend_from_slice(s.as_bytes());
        }

        (NanonisValue::Array(_), TypeTag::Array(inner)) if inner.is_counted() => {
            return Err(NanonisError::Type(format!(
                "Count-from-previous type inside prefixed array: {tag}"
            )));
        }
        (NanonisValue::Array(items), TypeTag::Array(inner)) => {
            buffer.write_u32::<BigEndian>(length_prefix(items.len())?)?;
            for item in items {
                encode_into(inner, item, buffer)?;
            }
        }
        (NanonisValue::Array(items), TypeTag::Counted(inner)) => {
            for item in items {
                encode_into(inner, item, buffer)?;
            }
        }

        _ => {
            return Err(NanonisError::Type(format!(
                "Unsupported type combination: {value:?} with {tag}"
            )))
        }
    }
    Ok(())
}

pub fn encode(tag: &TypeTag, value: &NanonisValue) -> Result<Vec<u8>, NanonisError> {
    let mut buffer = Vec::new();
    encode_into(tag, value, &mut buffer)?;
    Ok(buffer)
}

/// Decode one self-describing value from the reader.
///
/// Count-from-previous types need context and go through [`decode_counted`].
pub fn decode_from(tag: &TypeTag, reader: &mut ByteReader<'_>) -> Result<NanonisValue, NanonisError> {
    let value = match tag {
        TypeTag::U16 => NanonisValue::U16(reader.read_u16()?),
        TypeTag::I16 => NanonisValue::I16(reader.read_i16()?),
        TypeTag::U32 => NanonisValue::U32(reader.read_u32()?),
        TypeTag::I32 => NanonisValue::I32(reader.read_i32()?),
        TypeTag::F32 => NanonisValue::F32(reader.read_f32()?),
        TypeTag::F64 => NanonisValue::F64(reader.read_f64()?),

        TypeTag::String => {
            let len = reader.read_prefix(1)?;
            NanonisValue::String(reader.read_string(len)?)
        }

        TypeTag::Array(inner) => {
            let len = reader.read_prefix(inner.min_encoded_len().max(1))?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_from(inner, reader)?);
            }
            NanonisValue::Array(items)
        }

        TypeTag::Counted(_) | TypeTag::CountedString => {
            return Err(NanonisError::Protocol(format!(
                "Type {tag} needs a count from the preceding value"
            )))
        }
    };
    Ok(value)
}

/// Decode a count-from-previous value given the count read earlier.
pub fn decode_counted(
    tag: &TypeTag,
    count: usize,
    reader: &mut ByteReader<'_>,
) -> Result<NanonisValue, NanonisError> {
    match tag {
        TypeTag::CountedString => {
            reader.check_fits(count, 1)?;
            Ok(NanonisValue::String(reader.read_string(count)?))
        }
        TypeTag::Counted(inner) => {
            reader.check_fits(count, inner.min_encoded_len().max(1))?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_from(inner, reader)?);
            }
            Ok(NanonisValue::Array(items))
        }
        other => decode_from(other, reader),
    }
}

/// Decode one value from the front of `bytes`, returning it with the number
/// of bytes consumed.
pub fn decode(tag: &TypeTag, bytes: &[u8]) -> Result<(NanonisValue, usize), NanonisError> {
    let mut reader = ByteReader::new(bytes);
    let value = decode_from(tag, &mut reader)?;
    Ok((value, reader.position()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(tag: TypeTag, value: NanonisValue) {
        let bytes = encode(&tag, &value).unwrap();
        let (decoded, consumed) = decode(&tag, &bytes).unwrap();
        assert_eq!(decoded, value, "round trip of {tag}");
        assert_eq!(consumed, bytes.len(), "consumed bytes of {tag}");
    }

    #[test]
    fn test_scalar_boundaries_round_trip() {
        for v in [0, i16::MIN, i16::MAX] {
            round_trip(TypeTag::I16, NanonisValue::I16(v));
        }
        for v in [0, u16::MAX] {
            round_trip(TypeTag::U16, NanonisValue::U16(v));
        }
        for v in [0, i32::MIN, i32::MAX] {
            round_trip(TypeTag::I32, NanonisValue::I32(v));
        }
        for v in [0, u32::MAX] {
            round_trip(TypeTag::U32, NanonisValue::U32(v));
        }
        for v in [0.0, -1.0, f32::MAX, f32::MIN_POSITIVE, f32::INFINITY] {
            round_trip(TypeTag::F32, NanonisValue::F32(v));
        }
        for v in [0.0, 1e-12, f64::MIN, f64::NEG_INFINITY] {
            round_trip(TypeTag::F64, NanonisValue::F64(v));
        }
    }

    #[test]
    fn test_nan_is_bit_exact() {
        let bytes = encode(&TypeTag::F64, &NanonisValue::F64(f64::NAN)).unwrap();
        let (decoded, _) = decode(&TypeTag::F64, &bytes).unwrap();
        assert_eq!(decoded.as_f64().unwrap().to_bits(), f64::NAN.to_bits());
    }

    #[test]
    fn test_big_endian_layout() {
        assert_eq!(
            encode(&TypeTag::F32, &NanonisValue::F32(-1.0)).unwrap(),
            vec![0xBF, 0x80, 0x00, 0x00]
        );
        assert_eq!(
            encode(&TypeTag::U16, &NanonisValue::U16(0x0102)).unwrap(),
            vec![0x01, 0x02]
        );
        assert_eq!(
            encode(&TypeTag::I32, &NanonisValue::I32(-2)).unwrap(),
            vec![0xFF, 0xFF, 0xFF, 0xFE]
        );
    }

    #[test]
    fn test_string_and_array_prefixes() {
        assert_eq!(
            encode(&TypeTag::String, &"ab".into()).unwrap(),
            vec![0, 0, 0, 2, b'a', b'b']
        );
        assert_eq!(
            encode(&TypeTag::array(TypeTag::U16), &vec![1u16, 2].into()).unwrap(),
            vec![0, 0, 0, 2, 0, 1, 0, 2]
        );
        assert_eq!(
            encode(&TypeTag::counted(TypeTag::U16), &vec![1u16].into()).unwrap(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_variable_length_round_trip() {
        round_trip(TypeTag::String, "".into());
        round_trip(TypeTag::String, "C:\\data\\scan_001.sxm".into());
        round_trip(TypeTag::array(TypeTag::F32), NanonisValue::Array(vec![]));
        round_trip(TypeTag::array(TypeTag::F64), vec![1.5f64, -2.0].into());
        round_trip(TypeTag::array(TypeTag::String), vec!["a", "", "bc"].into());

        let nested = TypeTag::array(TypeTag::array(TypeTag::I32));
        round_trip(nested.clone(), NanonisValue::Array(vec![]));
        round_trip(nested.clone(), vec![Vec::<i32>::new()].into());
        round_trip(nested, vec![vec![1i32, -1], vec![7]].into());
    }

    #[test]
    fn test_mismatched_value_is_type_error() {
        let err = encode(&TypeTag::F32, &NanonisValue::F64(1.0));
        assert!(matches!(err, Err(NanonisError::Type(_))));
        let err = encode(&TypeTag::array(TypeTag::F32), &vec![1i32].into());
        assert!(matches!(err, Err(NanonisError::Type(_))));
    }

    #[test]
    fn test_counted_inside_prefixed_array_is_rejected() {
        let tag = TypeTag::array(TypeTag::counted(TypeTag::F32));
        let value: NanonisValue = vec![vec![1.0f32]].into();
        assert!(matches!(encode(&tag, &value), Err(NanonisError::Type(_))));
    }

    #[test]
    fn test_truncated_input_is_protocol_error() {
        let cases = [
            (TypeTag::F64, NanonisValue::F64(3.0)),
            (TypeTag::String, "hello".into()),
            (TypeTag::array(TypeTag::I32), vec![1i32, 2, 3].into()),
            (
                TypeTag::array(TypeTag::array(TypeTag::F32)),
                vec![vec![1.0f32], vec![2.0]].into(),
            ),
        ];
        for (tag, value) in cases {
            let bytes = encode(&tag, &value).unwrap();
            for cut in 1..=bytes.len() {
                let result = decode(&tag, &bytes[..bytes.len() - cut]);
                assert!(
                    matches!(result, Err(NanonisError::Protocol(_))),
                    "{tag} truncated by {cut}"
                );
            }
        }
    }

    #[test]
    fn test_oversized_count_rejected_before_allocation() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 1];
        let result = decode(&TypeTag::array(TypeTag::F64), &bytes);
        assert!(matches!(result, Err(NanonisError::Protocol(_))));
        let result = decode(&TypeTag::String, &bytes);
        assert!(matches!(result, Err(NanonisError::Protocol(_))));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let bytes = [0, 5, 0xAA, 0xBB];
        let (value, consumed) = decode(&TypeTag::U16, &bytes).unwrap();
        assert_eq!(value, NanonisValue::U16(5));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_decode_counted() {
        let bytes = [0x3F, 0x80, 0, 0, 0x40, 0, 0, 0];
        let mut reader = ByteReader::new(&bytes);
        let value = decode_counted(&TypeTag::counted(TypeTag::F32), 2, &mut reader).unwrap();
        assert_eq!(value, NanonisValue::from(vec![1.0f32, 2.0]));

        let mut reader = ByteReader::new(b"abc");
        let value = decode_counted(&TypeTag::CountedString, 3, &mut reader).unwrap();
        assert_eq!(value, NanonisValue::from("abc"));

        let mut reader = ByteReader::new(b"ab");
        assert!(decode_counted(&TypeTag::CountedString, 3, &mut reader).is_err());
    }
}
