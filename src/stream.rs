//! Sector-chain materialization.

use crate::error::{OleError, Result};
use crate::header::ENDOFCHAIN;
use crate::sector::SectorSource;

/// Walk a sector chain and concatenate its payload into one buffer.
///
/// `size` is the declared stream size, or `None` when the caller does not
/// know it (the directory stream declares none); an unknown size is bounded
/// by the table length and a premature end-of-chain simply ends the stream.
///
/// The walk runs for exactly `ceil(size / sector_size)` hops and then
/// requires the end-of-chain marker, so a cyclic or otherwise malformed
/// table can neither loop forever nor grow the buffer without bound.
pub fn materialize<S: SectorSource>(
    source: &mut S,
    start: u32,
    size: Option<u64>,
    table: &[u32],
) -> Result<Vec<u8>> {
    let sector_size = source.sector_size() as u64;
    let (size, unknown_size) = match size {
        Some(s) => (s, false),
        None => (table.len() as u64 * sector_size, true),
    };
    let nb_sectors = (size + sector_size - 1) / sector_size;
    if nb_sectors > table.len() as u64 {
        return Err(OleError::StreamTooLarge {
            sectors: nb_sectors,
            fat_len: table.len(),
        });
    }
    if size == 0 && start != ENDOFCHAIN {
        return Err(OleError::Structural(format!(
            "empty stream with first sector {start:#010X}"
        )));
    }

    let mut data = Vec::with_capacity(size as usize);
    let mut sect = start;
    for _ in 0..nb_sectors {
        if sect == ENDOFCHAIN {
            if unknown_size {
                break;
            }
            return Err(OleError::IncompleteStream(format!(
                "end of chain after {} of {} bytes",
                data.len(),
                size
            )));
        }
        if sect as usize >= table.len() {
            return Err(OleError::SectorOutOfRange { sector: sect });
        }
        let payload = source.read_sector(sect)?;
        // Only the backing store's very last sector may be short.
        if payload.len() != sector_size as usize && sect as usize != table.len() - 1 {
            return Err(OleError::TruncatedSector {
                sector: sect,
                got: payload.len(),
            });
        }
        data.extend_from_slice(&payload);
        sect = table[sect as usize];
    }
    if sect != ENDOFCHAIN {
        return Err(OleError::IncorrectChainTermination { last: sect });
    }

    if data.len() as u64 >= size {
        data.truncate(size as usize);
    } else if !unknown_size {
        return Err(OleError::IncompleteStream(format!(
            "read {} bytes of a declared {}",
            data.len(),
            size
        )));
    }
    Ok(data)
}
