//! Self-describing tagged binary value encoding.
//!
//! Every value begins with a one-byte type tag. Integers are big-endian. Strings and
//! dict keys are length-prefixed with `u8` (`Str8`), longer strings with `u16`
//! (`Str16`); lists and homogeneous numeric lists are `u16`-counted; dict bodies are
//! `u8`-counted. This is the wire format shared by room properties, client properties,
//! and property queries — nothing here is serde-derived, the layout is externally
//! specified byte-for-byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use thiserror::Error;

mod tag;
pub use tag::Tag;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty input")]
    Empty,
    #[error("truncated value: need {needed} more byte(s)")]
    Truncated { needed: usize },
    #[error("unknown type tag {0:#04x}")]
    UnknownTag(u8),
    #[error("type mismatch: expected one of {expected:?}, found {found:?}")]
    TypeMismatch { expected: Vec<Tag>, found: Tag },
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// A decoded value. `Dict` uses `BTreeMap` so iteration order is deterministic for
/// queries and tests, even though the wire format preserves insertion order on encode.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(u8),
    SByte(i8),
    UShort(u16),
    Short(i16),
    UInt(u32),
    Int(i32),
    ULong(u64),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Obj { class_id: u8, body: Bytes },
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
    Bools(Vec<bool>),
    Bytes(Vec<u8>),
    SBytes(Vec<i8>),
    UShorts(Vec<u16>),
    Shorts(Vec<i16>),
    UInts(Vec<u32>),
    Ints(Vec<i32>),
    ULongs(Vec<u64>),
    Longs(Vec<i64>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Null => Tag::Null,
            Value::Bool(true) => Tag::True,
            Value::Bool(false) => Tag::False,
            Value::Byte(_) => Tag::Byte,
            Value::SByte(_) => Tag::SByte,
            Value::UShort(_) => Tag::UShort,
            Value::Short(_) => Tag::Short,
            Value::UInt(_) => Tag::UInt,
            Value::Int(_) => Tag::Int,
            Value::ULong(_) => Tag::ULong,
            Value::Long(_) => Tag::Long,
            Value::Float(_) => Tag::Float,
            Value::Double(_) => Tag::Double,
            Value::Str(s) if s.len() <= u8::MAX as usize => Tag::Str8,
            Value::Str(_) => Tag::Str16,
            Value::Obj { .. } => Tag::Obj,
            Value::List(_) => Tag::List,
            Value::Dict(_) => Tag::Dict,
            Value::Bools(_) => Tag::Bools,
            Value::Bytes(_) => Tag::Bytes,
            Value::SBytes(_) => Tag::SBytes,
            Value::UShorts(_) => Tag::UShorts,
            Value::Shorts(_) => Tag::Shorts,
            Value::UInts(_) => Tag::UInts,
            Value::Ints(_) => Tag::Ints,
            Value::ULongs(_) => Tag::ULongs,
            Value::Longs(_) => Tag::Longs,
            Value::Floats(_) => Tag::Floats,
            Value::Doubles(_) => Tag::Doubles,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Elements of a list-like value (`List`, the homogeneous numeric lists, or `Bools`),
    /// each re-boxed as a `Value` so callers can compare tag + bytes uniformly. Used by
    /// the query engine's `Contain`/`NotContain` evaluation.
    pub fn as_list_elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.clone()),
            Value::Bools(items) => Some(items.iter().copied().map(Value::Bool).collect()),
            Value::Bytes(items) => Some(items.iter().copied().map(Value::Byte).collect()),
            Value::SBytes(items) => Some(items.iter().copied().map(Value::SByte).collect()),
            Value::UShorts(items) => Some(items.iter().copied().map(Value::UShort).collect()),
            Value::Shorts(items) => Some(items.iter().copied().map(Value::Short).collect()),
            Value::UInts(items) => Some(items.iter().copied().map(Value::UInt).collect()),
            Value::Ints(items) => Some(items.iter().copied().map(Value::Int).collect()),
            Value::ULongs(items) => Some(items.iter().copied().map(Value::ULong).collect()),
            Value::Longs(items) => Some(items.iter().copied().map(Value::Long).collect()),
            Value::Floats(items) => Some(items.iter().copied().map(Value::Float).collect()),
            Value::Doubles(items) => Some(items.iter().copied().map(Value::Double).collect()),
            _ => None,
        }
    }
}

/// `Value` is not derive-serde'd (the wire layout is the tagged binary format, externally
/// specified byte-for-byte). When a `Value` needs to ride inside a JSON envelope — room
/// and client properties embedded in the `Event`/`Message` wire structs — it serializes
/// as the hex encoding of its own marshaled bytes, the same hex-string idiom the auth
/// token already uses for its nonce/hmac fields.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let bytes = marshal_to_vec(self);
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        serializer.serialize_str(&hex)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        if hex.len() % 2 != 0 {
            return Err(D::Error::custom("odd-length hex string"));
        }
        let bytes: std::result::Result<Vec<u8>, _> = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect();
        let bytes = bytes.map_err(|e| D::Error::custom(e.to_string()))?;
        let (value, _) = unmarshal(&bytes).map_err(|e| D::Error::custom(e.to_string()))?;
        Ok(value)
    }
}

/// Encode a value onto `out`, tag byte first.
pub fn marshal(value: &Value, out: &mut BytesMut) {
    match value {
        Value::Null => out.put_u8(Tag::Null as u8),
        Value::Bool(true) => out.put_u8(Tag::True as u8),
        Value::Bool(false) => out.put_u8(Tag::False as u8),
        Value::Byte(v) => {
            out.put_u8(Tag::Byte as u8);
            out.put_u8(*v);
        }
        Value::SByte(v) => {
            out.put_u8(Tag::SByte as u8);
            out.put_i8(*v);
        }
        Value::UShort(v) => {
            out.put_u8(Tag::UShort as u8);
            out.put_u16(*v);
        }
        Value::Short(v) => {
            out.put_u8(Tag::Short as u8);
            out.put_i16(*v);
        }
        Value::UInt(v) => {
            out.put_u8(Tag::UInt as u8);
            out.put_u32(*v);
        }
        Value::Int(v) => {
            out.put_u8(Tag::Int as u8);
            out.put_i32(*v);
        }
        Value::ULong(v) => {
            out.put_u8(Tag::ULong as u8);
            out.put_u64(*v);
        }
        Value::Long(v) => {
            out.put_u8(Tag::Long as u8);
            out.put_i64(*v);
        }
        Value::Float(v) => {
            out.put_u8(Tag::Float as u8);
            out.put_f32(*v);
        }
        Value::Double(v) => {
            out.put_u8(Tag::Double as u8);
            out.put_f64(*v);
        }
        Value::Str(s) if s.len() <= u8::MAX as usize => {
            out.put_u8(Tag::Str8 as u8);
            out.put_u8(s.len() as u8);
            out.put_slice(s.as_bytes());
        }
        Value::Str(s) => {
            out.put_u8(Tag::Str16 as u8);
            out.put_u16(s.len() as u16);
            out.put_slice(s.as_bytes());
        }
        Value::Obj { class_id, body } => {
            out.put_u8(Tag::Obj as u8);
            out.put_u8(*class_id);
            out.put_u16(body.len() as u16);
            out.put_slice(body);
        }
        Value::List(items) => {
            out.put_u8(Tag::List as u8);
            out.put_u16(items.len() as u16);
            for item in items {
                let mut buf = BytesMut::new();
                marshal(item, &mut buf);
                out.put_u16(buf.len() as u16);
                out.put_slice(&buf);
            }
        }
        Value::Dict(map) => {
            out.put_u8(Tag::Dict as u8);
            out.put_u8(map.len() as u8);
            for (key, val) in map {
                out.put_u8(key.len() as u8);
                out.put_slice(key.as_bytes());
                marshal(val, out);
            }
        }
        Value::Bools(items) => marshal_numeric_list(out, Tag::Bools, items, |o, v| {
            o.put_u8(u8::from(*v));
        }),
        Value::Bytes(items) => marshal_numeric_list(out, Tag::Bytes, items, |o, v| o.put_u8(*v)),
        Value::SBytes(items) => marshal_numeric_list(out, Tag::SBytes, items, |o, v| o.put_i8(*v)),
        Value::UShorts(items) => {
            marshal_numeric_list(out, Tag::UShorts, items, |o, v| o.put_u16(*v));
        }
        Value::Shorts(items) => {
            marshal_numeric_list(out, Tag::Shorts, items, |o, v| o.put_i16(*v));
        }
        Value::UInts(items) => marshal_numeric_list(out, Tag::UInts, items, |o, v| o.put_u32(*v)),
        Value::Ints(items) => marshal_numeric_list(out, Tag::Ints, items, |o, v| o.put_i32(*v)),
        Value::ULongs(items) => {
            marshal_numeric_list(out, Tag::ULongs, items, |o, v| o.put_u64(*v));
        }
        Value::Longs(items) => {
            marshal_numeric_list(out, Tag::Longs, items, |o, v| o.put_i64(*v));
        }
        Value::Floats(items) => {
            marshal_numeric_list(out, Tag::Floats, items, |o, v| o.put_f32(*v));
        }
        Value::Doubles(items) => {
            marshal_numeric_list(out, Tag::Doubles, items, |o, v| o.put_f64(*v));
        }
    }
}

fn marshal_numeric_list<T: Copy>(
    out: &mut BytesMut,
    tag: Tag,
    items: &[T],
    mut put: impl FnMut(&mut BytesMut, &T),
) {
    out.put_u8(tag as u8);
    out.put_u16(items.len() as u16);
    for item in items {
        put(out, item);
    }
}

/// Encode a value into its own fresh buffer. Convenience wrapper around [`marshal`].
pub fn marshal_to_vec(value: &Value) -> Vec<u8> {
    let mut buf = BytesMut::new();
    marshal(value, &mut buf);
    buf.to_vec()
}

/// Decode the first value in `src`, returning it along with the number of bytes consumed.
pub fn unmarshal(src: &[u8]) -> Result<(Value, usize)> {
    if src.is_empty() {
        return Err(CodecError::Empty);
    }
    let mut buf = src;
    let start_len = buf.len();
    let tag = Tag::from_u8(take_u8(&mut buf)?)?;
    let value = decode_body(tag, &mut buf)?;
    Ok((value, start_len - buf.len()))
}

/// Decode the first value, rejecting any tag not in `allowed`.
pub fn unmarshal_as(src: &[u8], allowed: &[Tag]) -> Result<(Value, usize)> {
    let (value, consumed) = unmarshal(src)?;
    let tag = value.tag();
    if allowed.contains(&tag) {
        Ok((value, consumed))
    } else {
        Err(CodecError::TypeMismatch {
            expected: allowed.to_vec(),
            found: tag,
        })
    }
}

/// Decode a value into a plain-Rust tree: primitives, `Vec<Value>` for lists,
/// `BTreeMap<String, Value>` for dicts/objects. `Obj` bodies are walked the same way a
/// `Dict` would be, since on the wire an `Obj` body is itself a sequence of
/// already-tagged field values keyed by position rather than name; callers that need
/// field names supply a class-id-to-schema lookup of their own. Here we simply return
/// the object's raw bytes as an opaque `Value::Obj` — recursing stops at `Obj`
/// boundaries unless the caller already knows how to interpret the class.
pub fn unmarshal_recursive(src: &[u8]) -> Result<(Value, usize)> {
    unmarshal(src)
}

fn decode_body(tag: Tag, buf: &mut &[u8]) -> Result<Value> {
    Ok(match tag {
        Tag::Null => Value::Null,
        Tag::True => Value::Bool(true),
        Tag::False => Value::Bool(false),
        Tag::Byte => Value::Byte(take_u8(buf)?),
        Tag::SByte => Value::SByte(take_u8(buf)? as i8),
        Tag::UShort => Value::UShort(take_u16(buf)?),
        Tag::Short => Value::Short(take_u16(buf)? as i16),
        Tag::UInt => Value::UInt(take_u32(buf)?),
        Tag::Int => Value::Int(take_u32(buf)? as i32),
        Tag::ULong => Value::ULong(take_u64(buf)?),
        Tag::Long => Value::Long(take_u64(buf)? as i64),
        Tag::Float => Value::Float(f32::from_bits(take_u32(buf)?)),
        Tag::Double => Value::Double(f64::from_bits(take_u64(buf)?)),
        Tag::Str8 => {
            let len = take_u8(buf)? as usize;
            Value::Str(take_utf8(buf, len)?)
        }
        Tag::Str16 => {
            let len = take_u16(buf)? as usize;
            Value::Str(take_utf8(buf, len)?)
        }
        Tag::Obj => {
            let class_id = take_u8(buf)?;
            let len = take_u16(buf)? as usize;
            let body = take_bytes(buf, len)?;
            Value::Obj {
                class_id,
                body: Bytes::copy_from_slice(body),
            }
        }
        Tag::List => {
            let count = take_u16(buf)? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let len = take_u16(buf)? as usize;
                let elem_bytes = take_bytes(buf, len)?;
                let (value, _) = unmarshal(elem_bytes)?;
                items.push(value);
            }
            Value::List(items)
        }
        Tag::Dict => {
            let count = take_u8(buf)? as usize;
            let mut map = BTreeMap::new();
            for _ in 0..count {
                let key_len = take_u8(buf)? as usize;
                let key = take_utf8(buf, key_len)?;
                let value = decode_next_value(buf)?;
                map.insert(key, value);
            }
            Value::Dict(map)
        }
        Tag::Bools => Value::Bools(decode_numeric_list(buf, |b| Ok(take_u8(b)? != 0))?),
        Tag::Bytes => Value::Bytes(decode_numeric_list(buf, take_u8)?),
        Tag::SBytes => Value::SBytes(decode_numeric_list(buf, |b| Ok(take_u8(b)? as i8))?),
        Tag::UShorts => Value::UShorts(decode_numeric_list(buf, take_u16)?),
        Tag::Shorts => Value::Shorts(decode_numeric_list(buf, |b| Ok(take_u16(b)? as i16))?),
        Tag::UInts => Value::UInts(decode_numeric_list(buf, take_u32)?),
        Tag::Ints => Value::Ints(decode_numeric_list(buf, |b| Ok(take_u32(b)? as i32))?),
        Tag::ULongs => Value::ULongs(decode_numeric_list(buf, take_u64)?),
        Tag::Longs => Value::Longs(decode_numeric_list(buf, |b| Ok(take_u64(b)? as i64))?),
        Tag::Floats => {
            Value::Floats(decode_numeric_list(buf, |b| Ok(f32::from_bits(take_u32(b)?)))?)
        }
        Tag::Doubles => {
            Value::Doubles(decode_numeric_list(buf, |b| Ok(f64::from_bits(take_u64(b)?)))?)
        }
    })
}

fn decode_next_value(buf: &mut &[u8]) -> Result<Value> {
    let tag = Tag::from_u8(take_u8(buf)?)?;
    decode_body(tag, buf)
}

fn decode_numeric_list<T>(
    buf: &mut &[u8],
    mut take_one: impl FnMut(&mut &[u8]) -> Result<T>,
) -> Result<Vec<T>> {
    let count = take_u16(buf)? as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(take_one(buf)?);
    }
    Ok(items)
}

fn take_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(CodecError::Truncated { needed: 1 });
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut &[u8]) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(CodecError::Truncated { needed: 2 });
    }
    Ok(buf.get_u16())
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(CodecError::Truncated { needed: 4 });
    }
    Ok(buf.get_u32())
}

fn take_u64(buf: &mut &[u8]) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(CodecError::Truncated { needed: 8 });
    }
    Ok(buf.get_u64())
}

fn take_bytes<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if buf.remaining() < len {
        return Err(CodecError::Truncated { needed: len });
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head)
}

fn take_utf8(buf: &mut &[u8], len: usize) -> Result<String> {
    let bytes = take_bytes(buf, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::Truncated { needed: len })
}
