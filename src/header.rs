//! The 512-byte compound file header and on-disk constants.

use crate::defect::{DefectSink, Severity};
use crate::error::{OleError, Result};

/// 8-byte signature at offset 0 of every compound file.
pub const MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

// Sector id sentinels (from the AAF specification).
pub const MAXREGSECT: u32 = 0xFFFF_FFFA;
pub const DIFSECT: u32 = 0xFFFF_FFFC;
pub const FATSECT: u32 = 0xFFFF_FFFD;
pub const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
pub const FREESECT: u32 = 0xFFFF_FFFF;

// Directory entry id sentinels.
pub const MAXREGSID: u32 = 0xFFFF_FFFA;
pub const NOSTREAM: u32 = 0xFFFF_FFFF;

pub const HEADER_SIZE: usize = 512;

pub(crate) fn le_u16(b: &[u8], o: usize) -> u16 {
    u16::from_le_bytes([b[o], b[o + 1]])
}

pub(crate) fn le_u32(b: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

pub(crate) fn le_u64(b: &[u8], o: usize) -> u64 {
    u64::from_le_bytes([
        b[o],
        b[o + 1],
        b[o + 2],
        b[o + 3],
        b[o + 4],
        b[o + 5],
        b[o + 6],
        b[o + 7],
    ])
}

/// Check whether a byte slice starts with the OLE2 signature.
pub fn is_ole_file(data: &[u8]) -> bool {
    data.len() >= MAGIC.len() && data[..MAGIC.len()] == MAGIC
}

/// Render a 16-byte CLSID in registry form; all-zero becomes "".
pub(crate) fn format_clsid(raw: &[u8]) -> String {
    if raw.iter().all(|&b| b == 0) {
        return String::new();
    }
    format!(
        "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        le_u32(raw, 0),
        le_u16(raw, 4),
        le_u16(raw, 6),
        raw[8],
        raw[9],
        raw[10],
        raw[11],
        raw[12],
        raw[13],
        raw[14],
        raw[15],
    )
}

/// Parsed compound file header.
#[derive(Debug, Clone)]
pub struct Header {
    pub minor_version: u16,
    pub major_version: u16,
    /// 512 for version 3, 4096 for version 4.
    pub sector_size: u64,
    /// Always 64 in well-formed files.
    pub mini_sector_size: u64,
    pub dir_sector_count: u32,
    pub fat_sector_count: u32,
    pub dir_start: u32,
    /// Streams smaller than this live in the mini-stream.
    pub mini_cutoff: u32,
    pub minifat_start: u32,
    pub minifat_sector_count: u32,
    pub difat_start: u32,
    pub difat_sector_count: u32,
    /// The 109 FAT sector pointers embedded in the header.
    pub difat: [u32; 109],
}

/// Parse and validate the 512-byte header record.
pub fn parse_header(buf: &[u8], defects: &mut DefectSink) -> Result<Header> {
    if buf.len() < HEADER_SIZE || buf[..8] != MAGIC {
        return Err(OleError::NotOle("missing OLE2 signature".into()));
    }
    if buf[8..24].iter().any(|&b| b != 0) {
        defects.raise(
            Severity::Incorrect,
            OleError::Format("non-zero CLSID in header".into()),
        )?;
    }

    let minor_version = le_u16(buf, 24);
    let major_version = le_u16(buf, 26);
    if major_version != 3 && major_version != 4 {
        defects.raise(
            Severity::Incorrect,
            OleError::Format(format!("unsupported format version {major_version}")),
        )?;
    }

    let byte_order = le_u16(buf, 28);
    if byte_order != 0xFFFE {
        // Big-endian documents were never produced in practice.
        return Err(OleError::NotOle(format!(
            "unsupported byte order mark {byte_order:#06X}"
        )));
    }

    let sector_shift = le_u16(buf, 30);
    let sector_size = match 1u64.checked_shl(sector_shift.into()) {
        Some(size) if sector_shift < 32 => size,
        _ => return Err(OleError::Format(format!("sector shift {sector_shift} out of range"))),
    };
    if sector_size != 512 && sector_size != 4096 {
        defects.raise(
            Severity::Incorrect,
            OleError::Format(format!("unsupported sector size {sector_size}")),
        )?;
    }
    if (major_version == 3 && sector_size != 512) || (major_version == 4 && sector_size != 4096) {
        defects.raise(
            Severity::Incorrect,
            OleError::Format(format!(
                "sector size {sector_size} does not match format version {major_version}"
            )),
        )?;
    }

    let mini_sector_shift = le_u16(buf, 32);
    let mini_sector_size = match 1u64.checked_shl(mini_sector_shift.into()) {
        Some(size) if mini_sector_shift < 32 => size,
        _ => {
            return Err(OleError::Format(format!(
                "mini sector shift {mini_sector_shift} out of range"
            )))
        }
    };
    if mini_sector_size != 64 {
        defects.raise(
            Severity::Incorrect,
            OleError::Format(format!("unsupported mini sector size {mini_sector_size}")),
        )?;
    }

    if le_u16(buf, 34) != 0 || le_u32(buf, 36) != 0 {
        defects.raise(
            Severity::Incorrect,
            OleError::Format("non-zero reserved fields in header".into()),
        )?;
    }

    let dir_sector_count = le_u32(buf, 40);
    if sector_size == 512 && dir_sector_count != 0 {
        defects.raise(
            Severity::Incorrect,
            OleError::Format(format!(
                "directory sector count {dir_sector_count} must be zero for 512-byte sectors"
            )),
        )?;
    }

    let fat_sector_count = le_u32(buf, 44);
    let dir_start = le_u32(buf, 48);

    // Transaction signature: should be zero, but some producers write junk.
    let signature = le_u32(buf, 52);
    if signature != 0 {
        defects.raise(
            Severity::Potential,
            OleError::Format(format!("non-zero transaction signature {signature:#X}")),
        )?;
    }

    let mini_cutoff = le_u32(buf, 56);
    let minifat_start = le_u32(buf, 60);
    let minifat_sector_count = le_u32(buf, 64);
    let difat_start = le_u32(buf, 68);
    let difat_sector_count = le_u32(buf, 72);

    let mut difat = [FREESECT; 109];
    for (i, slot) in difat.iter_mut().enumerate() {
        *slot = le_u32(buf, 76 + i * 4);
    }

    Ok(Header {
        minor_version,
        major_version,
        sector_size,
        mini_sector_size,
        dir_sector_count,
        fat_sector_count,
        dir_start,
        mini_cutoff,
        minifat_start,
        minifat_sector_count,
        difat_start,
        difat_sector_count,
        difat,
    })
}
