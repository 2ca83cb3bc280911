//! Loading of the allocation tables: FAT, DIFAT overflow, and MiniFAT.

use std::io::{Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::defect::{DefectSink, Severity};
use crate::error::{OleError, Result};
use crate::header::{Header, DIFSECT, ENDOFCHAIN, FATSECT, FREESECT};
use crate::sector::{SectorFile, SectorSource};
use crate::stream;

/// Reinterpret raw sector bytes as little-endian sector pointers.
pub(crate) fn sector_to_entries(data: &[u8]) -> Vec<u32> {
    let mut rdr = data;
    let mut entries = Vec::with_capacity(data.len() / 4);
    while let Ok(value) = rdr.read_u32::<LittleEndian>() {
        entries.push(value);
    }
    entries
}

/// Append the FAT sectors named by `pointers`, stopping at the first
/// end-of-chain or free marker.
fn load_fat_pointers<R: Read + Seek>(
    sectors: &mut SectorFile<R>,
    pointers: &[u32],
    fat: &mut Vec<u32>,
) -> Result<()> {
    for &isect in pointers {
        if isect == ENDOFCHAIN || isect == FREESECT {
            break;
        }
        let data = sectors.read_sector_exact(isect)?;
        fat.extend(sector_to_entries(&data));
    }
    Ok(())
}

/// Load the main FAT: the header's 109 embedded pointers plus any
/// DIFAT-chained overflow sectors, truncated to the file's sector count.
pub fn load_fat<R: Read + Seek>(
    sectors: &mut SectorFile<R>,
    header: &Header,
    defects: &mut DefectSink,
) -> Result<Vec<u32>> {
    let mut fat = Vec::new();
    load_fat_pointers(sectors, &header.difat, &mut fat)?;

    if header.difat_sector_count != 0 {
        // A DIFAT only exists once the FAT outgrows the 109 header slots.
        if header.fat_sector_count <= 109 {
            defects.raise(
                Severity::Incorrect,
                OleError::MalformedDifat(format!(
                    "{} DIFAT sectors declared for only {} FAT sectors",
                    header.difat_sector_count, header.fat_sector_count
                )),
            )?;
        }
        let nb_sect = sectors.sector_count();
        if header.difat_start as u64 >= nb_sect {
            defects.raise(
                Severity::Fatal,
                OleError::MalformedDifat(format!(
                    "first DIFAT sector {} out of range ({nb_sect} sectors in file)",
                    header.difat_start
                )),
            )?;
        }
        // Each DIFAT sector holds pointers to FAT sectors plus one pointer to
        // the next DIFAT sector (127 + 1 with 512-byte sectors).
        let per_difat = (sectors.sector_size() / 4).saturating_sub(1) as u32;
        if per_difat == 0 {
            return Err(OleError::MalformedDifat(
                "sector size too small to hold a DIFAT sector".into(),
            ));
        }
        let nb_difat =
            (header.fat_sector_count.saturating_sub(109) + per_difat - 1) / per_difat;
        if header.difat_sector_count != nb_difat {
            return Err(OleError::MalformedDifat(format!(
                "declared {} DIFAT sectors, geometry implies {nb_difat}",
                header.difat_sector_count
            )));
        }
        let mut isect_difat = header.difat_start;
        for _ in 0..nb_difat {
            let data = sectors.read_sector_exact(isect_difat)?;
            let entries = sector_to_entries(&data);
            let Some((&next, body)) = entries.split_last() else {
                return Err(OleError::MalformedDifat("empty DIFAT sector".into()));
            };
            load_fat_pointers(sectors, body, &mut fat)?;
            isect_difat = next;
        }
        if isect_difat != ENDOFCHAIN && isect_difat != FREESECT {
            return Err(OleError::MalformedDifat(format!(
                "chain ends with {isect_difat:#010X} instead of a terminal marker"
            )));
        }
    }

    // The last table sector may carry padding entries past the end of the file.
    let nb_sect = sectors.sector_count() as usize;
    if fat.len() > nb_sect {
        log::debug!("FAT shrunk from {} to {nb_sect} entries", fat.len());
        fat.truncate(nb_sect);
    }
    Ok(fat)
}

/// Load the MiniFAT, truncated to the entry count implied by the root
/// entry's mini-stream size.
pub fn load_minifat<R: Read + Seek>(
    sectors: &mut SectorFile<R>,
    header: &Header,
    fat: &[u32],
    root_stream_size: u64,
    defects: &mut DefectSink,
) -> Result<Vec<u32>> {
    // Two lengths matter: the allocated one from the header's sector count,
    // and the used one derived from the mini-stream size. Only the used
    // prefix may be followed, or chains would escape the mini-stream.
    let allocated = header.minifat_sector_count as u64 * sectors.sector_size() as u64;
    let nb_minisectors =
        (root_stream_size + header.mini_sector_size - 1) / header.mini_sector_size;
    let used = nb_minisectors * 4;
    if used > allocated {
        defects.raise(
            Severity::Potential,
            OleError::Structural(format!(
                "mini-stream needs {used} MiniFAT bytes but only {allocated} are allocated"
            )),
        )?;
    }

    let data = stream::materialize(sectors, header.minifat_start, Some(allocated), fat)?;
    let mut minifat = sector_to_entries(&data);
    if minifat.len() as u64 > nb_minisectors {
        minifat.truncate(nb_minisectors as usize);
    }
    log::debug!(
        "MiniFAT loaded: {} entries for {nb_minisectors} mini-sectors",
        minifat.len()
    );
    Ok(minifat)
}

/// Tracks the first sector of every known stream so that two directory
/// entries claiming the same chain are caught.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    fat_firsts: Vec<u32>,
    mini_firsts: Vec<u32>,
}

impl StreamRegistry {
    /// Record a stream's first sector; a repeat registration means two
    /// entries reference the same chain.
    pub fn register(
        &mut self,
        first_sect: u32,
        mini: bool,
        defects: &mut DefectSink,
    ) -> Result<()> {
        let used = if mini {
            &mut self.mini_firsts
        } else {
            // Sentinel values are not real chain starts.
            if matches!(first_sect, DIFSECT | FATSECT | ENDOFCHAIN | FREESECT) {
                return Ok(());
            }
            &mut self.fat_firsts
        };
        if used.contains(&first_sect) {
            defects.raise(
                Severity::Incorrect,
                OleError::Structural(format!(
                    "stream starting at sector {first_sect} referenced twice"
                )),
            )?;
        } else {
            used.push(first_sect);
        }
        Ok(())
    }
}
