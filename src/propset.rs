//! Decoding of typed property-set streams (summary information and friends).

use std::collections::BTreeMap;

use crate::defect::{DefectSink, Severity};
use crate::error::{OleError, Result};
use crate::header::{format_clsid, le_u16, le_u32, le_u64};

// Variant type tags (OLE VT_* constants).
const VT_I2: u32 = 2;
const VT_I4: u32 = 3;
const VT_BSTR: u32 = 8;
const VT_ERROR: u32 = 10;
const VT_UI1: u32 = 17;
const VT_UI2: u32 = 18;
const VT_UI4: u32 = 19;
const VT_LPSTR: u32 = 30;
const VT_LPWSTR: u32 = 31;
const VT_FILETIME: u32 = 64;
const VT_BLOB: u32 = 65;
const VT_CF: u32 = 71;
const VT_CLSID: u32 = 72;

/// Seconds between the FILETIME epoch (1601-01-01) and the Unix epoch.
const FILETIME_UNIX_OFFSET: u64 = 11_644_473_600;

/// One decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Byte(u8),
    /// 8-bit string (VT_BSTR / VT_LPSTR), decoded byte-per-char.
    Ansi(String),
    /// UTF-16 string (VT_LPWSTR).
    Unicode(String),
    /// Opaque bytes (VT_BLOB / VT_CF).
    Blob(Vec<u8>),
    Clsid(String),
    /// FILETIME converted to Unix epoch seconds (0 for pre-1970 values).
    FileTime(u64),
    /// A tag this parser does not decode; the raw tag is kept.
    Unsupported(u32),
}

/// Decode the property dictionary from a property-set stream's bytes.
///
/// Unknown type tags and records whose offsets escape the section decode to
/// [`PropertyValue::Unsupported`] rather than failing the whole parse.
pub fn decode_properties(
    data: &[u8],
    defects: &mut DefectSink,
) -> Result<BTreeMap<u32, PropertyValue>> {
    // 28-byte preamble plus one 20-byte section descriptor.
    if data.len() < 48 {
        return Err(OleError::Format(format!(
            "property stream too short ({} bytes)",
            data.len()
        )));
    }
    let section_offset = le_u32(data, 44) as usize;
    let Some(section_head) = section_offset
        .checked_add(8)
        .and_then(|end| data.get(section_offset..end))
    else {
        return Err(OleError::Format(format!(
            "property section offset {section_offset} out of range"
        )));
    };
    let declared = le_u32(section_head, 0) as usize;
    let count = le_u32(section_head, 4) as usize;
    if declared > data.len() - section_offset {
        defects.raise(
            Severity::Potential,
            OleError::Format(format!(
                "property section claims {declared} bytes, {} available",
                data.len() - section_offset
            )),
        )?;
    }
    let end = section_offset.saturating_add(declared).min(data.len());
    let section = &data[section_offset..end];

    let mut properties = BTreeMap::new();
    for i in 0..count {
        let off = 8 + i * 8;
        let (Some(id), Some(value_off)) = (get_u32(section, off), get_u32(section, off + 4))
        else {
            defects.raise(
                Severity::Potential,
                OleError::Format(format!("property table truncated at entry {i}")),
            )?;
            break;
        };
        let value = decode_value(section, value_off as usize, defects)?;
        properties.insert(id, value);
    }
    Ok(properties)
}

fn decode_value(
    section: &[u8],
    off: usize,
    defects: &mut DefectSink,
) -> Result<PropertyValue> {
    let Some(tag) = get_u32(section, off) else {
        defects.raise(
            Severity::Potential,
            OleError::Format(format!("property value offset {off} out of range")),
        )?;
        return Ok(PropertyValue::Unsupported(0));
    };
    let v = off + 4;
    let value = match tag {
        VT_I2 => get_u16(section, v).map(|x| PropertyValue::Int16(x as i16)),
        VT_UI2 => get_u16(section, v).map(PropertyValue::UInt16),
        VT_I4 | VT_ERROR => get_u32(section, v).map(|x| PropertyValue::Int32(x as i32)),
        VT_UI4 => get_u32(section, v).map(PropertyValue::UInt32),
        VT_UI1 => section.get(v).copied().map(PropertyValue::Byte),
        VT_BSTR | VT_LPSTR => get_u32(section, v).and_then(|count| {
            // the count includes the terminator
            let n = (count as usize).saturating_sub(1);
            get_bytes(section, v + 4, n)
                .map(|b| PropertyValue::Ansi(b.iter().map(|&c| c as char).collect()))
        }),
        VT_BLOB | VT_CF => get_u32(section, v).and_then(|count| {
            get_bytes(section, v + 4, count as usize).map(|b| PropertyValue::Blob(b.to_vec()))
        }),
        VT_LPWSTR => get_u32(section, v).and_then(|count| {
            get_bytes(section, v + 4, (count as usize).saturating_mul(2)).map(|b| {
                let units: Vec<u16> = b
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                let s = String::from_utf16_lossy(&units);
                PropertyValue::Unicode(s.trim_end_matches('\0').to_string())
            })
        }),
        VT_FILETIME => get_u64(section, v).map(|ticks| {
            PropertyValue::FileTime((ticks / 10_000_000).saturating_sub(FILETIME_UNIX_OFFSET))
        }),
        VT_CLSID => get_bytes(section, v, 16).map(|b| PropertyValue::Clsid(format_clsid(b))),
        _ => return Ok(PropertyValue::Unsupported(tag)),
    };
    match value {
        Some(value) => Ok(value),
        None => {
            defects.raise(
                Severity::Potential,
                OleError::Format(format!(
                    "property value at offset {off} escapes its section"
                )),
            )?;
            Ok(PropertyValue::Unsupported(tag))
        }
    }
}

fn get_bytes(s: &[u8], off: usize, len: usize) -> Option<&[u8]> {
    s.get(off..off.checked_add(len)?)
}

fn get_u16(s: &[u8], off: usize) -> Option<u16> {
    get_bytes(s, off, 2).map(|b| le_u16(b, 0))
}

fn get_u32(s: &[u8], off: usize) -> Option<u32> {
    get_bytes(s, off, 4).map(|b| le_u32(b, 0))
}

fn get_u64(s: &[u8], off: usize) -> Option<u64> {
    get_bytes(s, off, 8).map(|b| le_u64(b, 0))
}
