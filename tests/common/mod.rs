//! In-memory compound-file image builder shared by the integration tests.
//!
//! The base image uses 512-byte sectors and holds this hierarchy:
//!
//!   Root Entry                      (mini-stream at sector 12, 512 bytes)
//!   +-- storage_1
//!   |   +-- storage_1.2
//!   |       +-- stream              (80 bytes, MiniFAT)
//!   +-- big                         (4600 bytes, FAT)
//!   +-- small                       (100 bytes, MiniFAT)
//!   +-- \x05SummaryInformation      (property set, 224 bytes, MiniFAT)
//!
//! Sector map: 0 FAT, 1-2 directory, 3-11 "big", 12 mini-stream, 13 MiniFAT.
//! The `with_*` variants mutate the base image into specific malformations.

pub const SECTOR: usize = 512;

const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FREESECT: u32 = 0xFFFF_FFFF;
const FATSECT: u32 = 0xFFFF_FFFD;
const NOSTREAM: u32 = 0xFFFF_FFFF;

const FAT_SECTOR: usize = 0;
const DIR_SECTOR_1: usize = 1;
const BIG_START: usize = 3;
const BIG_SECTOR_COUNT: usize = 9;
const MINISTREAM_SECTOR: usize = 12;
const MINIFAT_SECTOR: usize = 13;
const TOTAL_SECTORS: usize = 14;

pub const BIG_SIZE: usize = 4600;
pub const STREAM_SIZE: usize = 80;
pub const SMALL_SIZE: usize = 100;
pub const PROPS_SIZE: usize = 224;

pub fn big_content() -> Vec<u8> {
    (0..BIG_SIZE).map(|i| (i % 251) as u8).collect()
}

pub fn stream_content() -> Vec<u8> {
    (0..STREAM_SIZE).map(|i| (i as u8) ^ 0x5A).collect()
}

pub fn small_content() -> Vec<u8> {
    (0..SMALL_SIZE).map(|i| (200 - i) as u8).collect()
}

fn put_u16(img: &mut [u8], off: usize, v: u16) {
    img[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(img: &mut [u8], off: usize, v: u32) {
    img[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn fat_entry_offset(i: usize) -> usize {
    (FAT_SECTOR + 1) * SECTOR + i * 4
}

fn dir_entry_offset(sid: usize) -> usize {
    (DIR_SECTOR_1 + 1) * SECTOR + sid * 128
}

#[allow(clippy::too_many_arguments)]
fn write_dir_entry(
    img: &mut [u8],
    sid: usize,
    name: &str,
    entry_type: u8,
    left: u32,
    right: u32,
    child: u32,
    start: u32,
    size: u32,
) {
    let off = dir_entry_offset(sid);
    img[off..off + 128].fill(0);
    let units: Vec<u16> = name.encode_utf16().collect();
    for (i, u) in units.iter().enumerate() {
        put_u16(img, off + i * 2, *u);
    }
    put_u16(img, off + 64, ((units.len() + 1) * 2) as u16);
    img[off + 66] = entry_type;
    img[off + 67] = 1; // color: red; the reader rebuilds the tree anyway
    put_u32(img, off + 68, left);
    put_u32(img, off + 72, right);
    put_u32(img, off + 76, child);
    put_u32(img, off + 116, start);
    put_u32(img, off + 120, size);
}

/// Property-set stream bytes: one section with a representative type mix,
/// padded to exactly four mini-sectors.
pub fn property_stream() -> Vec<u8> {
    fn record(tag: u32, payload: &[u8]) -> Vec<u8> {
        let mut r = tag.to_le_bytes().to_vec();
        r.extend_from_slice(payload);
        r
    }

    let mut lpstr = 6u32.to_le_bytes().to_vec();
    lpstr.extend_from_slice(b"hello\0");
    let mut lpwstr = 5u32.to_le_bytes().to_vec();
    for u in "wide\0".encode_utf16() {
        lpwstr.extend_from_slice(&u.to_le_bytes());
    }
    let filetime = (1_451_606_400u64 + 11_644_473_600) * 10_000_000;
    let clsid = [
        0x01u8, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06,
        0x07, 0x08,
    ];
    let props: Vec<(u32, Vec<u8>)> = vec![
        (2, record(30, &lpstr)),                                // VT_LPSTR
        (3, record(2, &(-3i16).to_le_bytes())),                 // VT_I2
        (4, record(19, &3_000_000_000u32.to_le_bytes())),       // VT_UI4
        (5, record(3, &(-123_456i32).to_le_bytes())),           // VT_I4
        (6, record(64, &filetime.to_le_bytes())),               // VT_FILETIME
        (7, record(72, &clsid)),                                // VT_CLSID
        (8, record(0x1234, &[])),                               // unsupported
        (9, record(31, &lpwstr)),                               // VT_LPWSTR
    ];

    let mut out = Vec::new();
    out.extend_from_slice(&0xFFFEu16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0x0002_0005u32.to_le_bytes());
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&[0u8; 16]); // FMTID, not interpreted by the reader
    out.extend_from_slice(&48u32.to_le_bytes());

    let table_len = 8 + props.len() * 8;
    let mut values = Vec::new();
    let mut offsets = Vec::new();
    for (_, rec) in &props {
        offsets.push(table_len + values.len());
        values.extend_from_slice(rec);
        while values.len() % 4 != 0 {
            values.push(0);
        }
    }
    out.extend_from_slice(&((table_len + values.len()) as u32).to_le_bytes());
    out.extend_from_slice(&(props.len() as u32).to_le_bytes());
    for ((id, _), off) in props.iter().zip(&offsets) {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(*off as u32).to_le_bytes());
    }
    out.extend_from_slice(&values);

    assert!(out.len() <= PROPS_SIZE, "property fixture outgrew its mini chain");
    out.resize(PROPS_SIZE, 0);
    out
}

/// Build the well-formed base image.
pub fn build_image() -> Vec<u8> {
    let mut img = vec![0u8; (TOTAL_SECTORS + 1) * SECTOR];

    // header
    img[0..8].copy_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
    put_u16(&mut img, 24, 0x3E); // minor version
    put_u16(&mut img, 26, 3); // major version: 512-byte sectors
    put_u16(&mut img, 28, 0xFFFE);
    put_u16(&mut img, 30, 9); // sector shift
    put_u16(&mut img, 32, 6); // mini sector shift
    put_u32(&mut img, 44, 1); // FAT sector count
    put_u32(&mut img, 48, DIR_SECTOR_1 as u32);
    put_u32(&mut img, 56, 4096); // mini stream cutoff
    put_u32(&mut img, 60, MINIFAT_SECTOR as u32);
    put_u32(&mut img, 64, 1); // MiniFAT sector count
    put_u32(&mut img, 68, ENDOFCHAIN); // no DIFAT
    put_u32(&mut img, 72, 0);
    put_u32(&mut img, 76, FAT_SECTOR as u32);
    for i in 1..109 {
        put_u32(&mut img, 76 + i * 4, FREESECT);
    }

    // FAT (sector 0)
    let mut fat = [FREESECT; 128];
    fat[FAT_SECTOR] = FATSECT;
    fat[DIR_SECTOR_1] = DIR_SECTOR_1 as u32 + 1;
    fat[DIR_SECTOR_1 + 1] = ENDOFCHAIN;
    for i in 0..BIG_SECTOR_COUNT {
        fat[BIG_START + i] = if i == BIG_SECTOR_COUNT - 1 {
            ENDOFCHAIN
        } else {
            (BIG_START + i + 1) as u32
        };
    }
    fat[MINISTREAM_SECTOR] = ENDOFCHAIN;
    fat[MINIFAT_SECTOR] = ENDOFCHAIN;
    for (i, e) in fat.iter().enumerate() {
        put_u32(&mut img, fat_entry_offset(i), *e);
    }

    // directory (sectors 1-2)
    let props = property_stream();
    write_dir_entry(&mut img, 0, "Root Entry", 5, NOSTREAM, NOSTREAM, 1, MINISTREAM_SECTOR as u32, 512);
    write_dir_entry(&mut img, 1, "storage_1", 1, 4, 5, 2, 0, 0);
    write_dir_entry(&mut img, 2, "storage_1.2", 1, NOSTREAM, NOSTREAM, 3, 0, 0);
    write_dir_entry(&mut img, 3, "stream", 2, NOSTREAM, NOSTREAM, NOSTREAM, 0, STREAM_SIZE as u32);
    write_dir_entry(&mut img, 4, "big", 2, NOSTREAM, NOSTREAM, NOSTREAM, BIG_START as u32, BIG_SIZE as u32);
    write_dir_entry(&mut img, 5, "small", 2, NOSTREAM, 6, NOSTREAM, 2, SMALL_SIZE as u32);
    write_dir_entry(&mut img, 6, "\u{5}SummaryInformation", 2, NOSTREAM, NOSTREAM, NOSTREAM, 4, props.len() as u32);

    // "big" stream payload (sectors 3-11)
    for (i, chunk) in big_content().chunks(SECTOR).enumerate() {
        let off = (BIG_START + i + 1) * SECTOR;
        img[off..off + chunk.len()].copy_from_slice(chunk);
    }

    // mini-stream (sector 12): mini-sectors 0-1 stream, 2-3 small, 4-7 props
    let ms = (MINISTREAM_SECTOR + 1) * SECTOR;
    let sc = stream_content();
    img[ms..ms + sc.len()].copy_from_slice(&sc);
    let sm = small_content();
    img[ms + 128..ms + 128 + sm.len()].copy_from_slice(&sm);
    img[ms + 256..ms + 256 + props.len()].copy_from_slice(&props);

    // MiniFAT (sector 13)
    let mf = (MINIFAT_SECTOR + 1) * SECTOR;
    let mut minifat = [FREESECT; 128];
    minifat[0] = 1;
    minifat[1] = ENDOFCHAIN;
    minifat[2] = 3;
    minifat[3] = ENDOFCHAIN;
    minifat[4] = 5;
    minifat[5] = 6;
    minifat[6] = 7;
    minifat[7] = ENDOFCHAIN;
    for (i, e) in minifat.iter().enumerate() {
        put_u32(&mut img, mf + i * 4, *e);
    }

    img
}

/// "big" begins a chain that points back at itself.
pub fn with_fat_self_loop() -> Vec<u8> {
    let mut img = build_image();
    put_u32(&mut img, fat_entry_offset(BIG_START), BIG_START as u32);
    img
}

/// "big"'s chain ends two sectors in, well before its declared size.
pub fn with_premature_end() -> Vec<u8> {
    let mut img = build_image();
    put_u32(&mut img, fat_entry_offset(BIG_START + 1), ENDOFCHAIN);
    img
}

/// storage_1's left sibling pointer points back at storage_1.
pub fn with_sibling_cycle() -> Vec<u8> {
    let mut img = build_image();
    put_u32(&mut img, dir_entry_offset(1) + 68, 1);
    img
}

/// storage_1.2 claims itself as its own child subtree.
pub fn with_self_child() -> Vec<u8> {
    let mut img = build_image();
    put_u32(&mut img, dir_entry_offset(2) + 76, 2);
    img
}

/// "small" renamed to "BIG": differs from its sibling "big" only by case.
pub fn with_case_duplicate() -> Vec<u8> {
    let mut img = build_image();
    write_dir_entry(&mut img, 5, "BIG", 2, NOSTREAM, 6, NOSTREAM, 2, SMALL_SIZE as u32);
    img
}

/// "big" claims the directory stream's first sector as its own.
pub fn with_duplicate_first_sector() -> Vec<u8> {
    let mut img = build_image();
    put_u32(&mut img, dir_entry_offset(4) + 116, DIR_SECTOR_1 as u32);
    img
}

/// Root entry declares a mini-stream larger than the MiniFAT covers: the
/// used MiniFAT length (129 entries) exceeds the single allocated sector.
pub fn with_minifat_overflow() -> Vec<u8> {
    let mut img = build_image();
    img.resize((30 + 1) * SECTOR, 0);
    // stretch the mini-stream chain to 17 sectors: 12, 14, 15, ..., 29
    put_u32(&mut img, fat_entry_offset(MINISTREAM_SECTOR), 14);
    for s in 14..29 {
        put_u32(&mut img, fat_entry_offset(s), s as u32 + 1);
    }
    put_u32(&mut img, fat_entry_offset(29), ENDOFCHAIN);
    put_u32(&mut img, dir_entry_offset(0) + 120, 8256); // 129 mini-sectors
    img
}

/// Header claims format version 4 while keeping 512-byte sectors.
pub fn with_version_mismatch() -> Vec<u8> {
    let mut img = build_image();
    put_u16(&mut img, 26, 4);
    img
}
