//! Directory entries and the rebuilt storage hierarchy.

use crate::alloc::StreamRegistry;
use crate::defect::{DefectSink, Severity};
use crate::error::{OleError, Result};
use crate::header::{format_clsid, le_u16, le_u32, le_u64, NOSTREAM};

/// Size of one directory entry record.
pub const DIRENTRY_SIZE: usize = 128;

/// On-disk type tag of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Empty,
    Storage,
    Stream,
    LockBytes,
    Property,
    Root,
}

impl EntryType {
    fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntryType::Empty),
            1 => Some(EntryType::Storage),
            2 => Some(EntryType::Stream),
            3 => Some(EntryType::LockBytes),
            4 => Some(EntryType::Property),
            5 => Some(EntryType::Root),
            _ => None,
        }
    }
}

/// Kind of node reachable through the public path API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Stream,
    Storage,
    Root,
}

/// One decoded directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub sid: u32,
    pub name: String,
    pub entry_type: EntryType,
    /// Red-black color as stored; the tree is rebuilt, never rebalanced,
    /// so this is informational only.
    pub color: u8,
    pub sid_left: u32,
    pub sid_right: u32,
    pub sid_child: u32,
    pub clsid: String,
    pub user_flags: u32,
    /// Raw FILETIME ticks (100 ns since 1601-01-01), zero if unset.
    pub created: u64,
    pub modified: u64,
    pub start_sector: u32,
    pub size: u64,
    /// Children in name order, filled in while the tree is rebuilt.
    pub kids: Vec<u32>,
}

/// Decode one 128-byte directory entry record.
pub(crate) fn parse_direntry(
    raw: &[u8],
    sid: u32,
    sector_size: u64,
    defects: &mut DefectSink,
) -> Result<DirEntry> {
    let mut name_len = le_u16(raw, 64) as usize;
    let type_raw = raw[66];
    let entry_type = match EntryType::from_raw(type_raw) {
        Some(t) => t,
        None => {
            defects.raise(
                Severity::Incorrect,
                OleError::Structural(format!("entry {sid}: unknown entry type {type_raw}")),
            )?;
            EntryType::Empty
        }
    };
    if matches!(entry_type, EntryType::LockBytes | EntryType::Property) {
        defects.raise(
            Severity::Incorrect,
            OleError::Structural(format!("entry {sid}: unhandled storage type {type_raw}")),
        )?;
    }
    // Only the first entry can, and must, be the root.
    if entry_type == EntryType::Root && sid != 0 {
        defects.raise(
            Severity::Incorrect,
            OleError::Structural(format!("entry {sid}: duplicate root entry")),
        )?;
    }
    if sid == 0 && entry_type != EntryType::Root {
        defects.raise(
            Severity::Incorrect,
            OleError::Structural("entry 0 is not the root".into()),
        )?;
    }

    // Name: at most 31 UTF-16 characters plus the terminator.
    if name_len > 64 {
        defects.raise(
            Severity::Incorrect,
            OleError::Structural(format!("entry {sid}: name length {name_len} exceeds 64")),
        )?;
        name_len = 64;
    }
    let take = name_len.saturating_sub(2);
    let take = take - take % 2;
    let units: Vec<u16> = raw[..take]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let name = String::from_utf16_lossy(&units);

    let color = raw[67];
    let sid_left = le_u32(raw, 68);
    let sid_right = le_u32(raw, 72);
    let sid_child = le_u32(raw, 76);
    let clsid = format_clsid(&raw[80..96]);
    let user_flags = le_u32(raw, 96);
    let created = le_u64(raw, 100);
    let modified = le_u64(raw, 108);
    let start_sector = le_u32(raw, 116);

    let size_low = le_u32(raw, 120);
    let size_high = le_u32(raw, 124);
    let size = if sector_size == 512 {
        // The high dword should be zero with 512-byte sectors, but some
        // writers store 0xFFFFFFFF or garbage there.
        if size_high != 0 && size_high != 0xFFFF_FFFF {
            defects.raise(
                Severity::Unsure,
                OleError::Structural(format!(
                    "entry {sid}: non-zero size high dword {size_high:#010X}"
                )),
            )?;
        }
        size_low as u64
    } else {
        size_low as u64 | ((size_high as u64) << 32)
    };
    if entry_type == EntryType::Storage && size != 0 {
        defects.raise(
            Severity::Potential,
            OleError::Structural(format!("entry {sid}: storage with size {size}")),
        )?;
    }

    Ok(DirEntry {
        sid,
        name,
        entry_type,
        color,
        sid_left,
        sid_right,
        sid_child,
        clsid,
        user_flags,
        created,
        modified,
        start_sector,
        size,
        kids: Vec::new(),
    })
}

pub(crate) struct DirContext<'a> {
    pub sector_size: u64,
    pub mini_cutoff: u32,
    pub registry: &'a mut StreamRegistry,
    pub defects: &'a mut DefectSink,
}

/// The rebuilt storage hierarchy.
///
/// Entries are decoded lazily from the directory stream and memoized in an
/// index arena. The on-disk sibling pointers are only used for discovery:
/// children end up sorted by name, and an entry visited twice stops the
/// walk, so broken red-black trees cannot cause unbounded recursion.
#[derive(Debug)]
pub struct DirectoryTree {
    data: Vec<u8>,
    entries: Vec<Option<DirEntry>>,
}

impl DirectoryTree {
    pub(crate) fn load(data: Vec<u8>, cx: &mut DirContext<'_>) -> Result<Self> {
        let max_entries = data.len() / DIRENTRY_SIZE;
        if max_entries == 0 {
            return Err(OleError::Structural(
                "directory stream holds no entries".into(),
            ));
        }
        log::debug!("directory: {max_entries} entry slots");
        let mut tree = Self {
            data,
            entries: (0..max_entries).map(|_| None).collect(),
        };
        tree.load_entry(0, cx)?;
        tree.build_storage_tree(0, cx)?;
        Ok(tree)
    }

    pub fn max_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, sid: u32) -> Option<&DirEntry> {
        self.entries.get(sid as usize).and_then(|e| e.as_ref())
    }

    /// Decode an entry, memoized. Returns `false` when the entry was already
    /// decoded: that is a double reference, and the caller must not traverse
    /// through it again.
    fn load_entry(&mut self, sid: u32, cx: &mut DirContext<'_>) -> Result<bool> {
        if sid as usize >= self.entries.len() {
            cx.defects
                .raise(Severity::Fatal, OleError::EntryOutOfRange { sid })?;
            return Ok(false);
        }
        if self.entries[sid as usize].is_some() {
            cx.defects.raise(
                Severity::Incorrect,
                OleError::Structural(format!("directory entry {sid} referenced more than once")),
            )?;
            return Ok(false);
        }
        let offset = sid as usize * DIRENTRY_SIZE;
        let entry = parse_direntry(
            &self.data[offset..offset + DIRENTRY_SIZE],
            sid,
            cx.sector_size,
            cx.defects,
        )?;
        if matches!(entry.entry_type, EntryType::Root | EntryType::Stream) && entry.size > 0 {
            // Only streams below the cutoff live in the mini-stream; the
            // mini-stream itself (the root entry) is a normal FAT chain.
            let mini =
                entry.entry_type == EntryType::Stream && entry.size < cx.mini_cutoff as u64;
            cx.registry
                .register(entry.start_sector, mini, cx.defects)?;
        }
        self.entries[sid as usize] = Some(entry);
        Ok(true)
    }

    /// Collect and sort the children of a storage entry, then recurse.
    fn build_storage_tree(&mut self, sid: u32, cx: &mut DirContext<'_>) -> Result<()> {
        let child = match self.entry(sid) {
            Some(e) => e.sid_child,
            None => return Ok(()),
        };
        if child == NOSTREAM {
            return Ok(());
        }
        self.append_kids(sid, child, cx)?;

        // Stored sibling order is (length, name); sort on name alone for a
        // deterministic listing that does not trust the on-disk tree.
        let mut kids = match self.entries.get_mut(sid as usize).and_then(|e| e.as_mut()) {
            Some(e) => std::mem::take(&mut e.kids),
            None => return Ok(()),
        };
        kids.sort_by(|&a, &b| {
            let an = self.entry(a).map(|e| e.name.as_str()).unwrap_or("");
            let bn = self.entry(b).map(|e| e.name.as_str()).unwrap_or("");
            an.cmp(bn)
        });
        if let Some(e) = self.entries.get_mut(sid as usize).and_then(|e| e.as_mut()) {
            e.kids = kids;
        }
        Ok(())
    }

    /// In-order walk over one storage's sibling tree.
    fn append_kids(&mut self, parent: u32, child_sid: u32, cx: &mut DirContext<'_>) -> Result<()> {
        if child_sid == NOSTREAM {
            return Ok(());
        }
        if !self.load_entry(child_sid, cx)? {
            // Already visited: the defect was raised above; stopping here is
            // what keeps sibling-pointer cycles from recursing forever.
            return Ok(());
        }
        let (left, right, name) = match self.entry(child_sid) {
            Some(e) => (e.sid_left, e.sid_right, e.name.clone()),
            None => return Ok(()),
        };

        self.append_kids(parent, left, cx)?;

        let lower = name.to_lowercase();
        let duplicate = self
            .entry(parent)
            .map(|p| {
                p.kids.iter().any(|&k| {
                    self.entry(k)
                        .map(|e| e.name.to_lowercase() == lower)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);
        if duplicate {
            cx.defects.raise(
                Severity::Incorrect,
                OleError::Structural(format!("duplicate name \"{name}\" in storage")),
            )?;
        }
        if let Some(p) = self.entries.get_mut(parent as usize).and_then(|e| e.as_mut()) {
            p.kids.push(child_sid);
        }

        self.append_kids(parent, right, cx)?;

        // A child that is itself a storage carries its own subtree.
        self.build_storage_tree(child_sid, cx)
    }

    /// Resolve root-relative name components, case-insensitively.
    pub fn find(&self, components: &[&str]) -> Option<u32> {
        let mut sid = 0u32;
        for comp in components {
            let comp_lower = comp.to_lowercase();
            let kids = &self.entry(sid)?.kids;
            sid = *kids.iter().find(|&&k| {
                self.entry(k)
                    .map(|e| e.name.to_lowercase() == comp_lower)
                    .unwrap_or(false)
            })?;
        }
        Some(sid)
    }

    /// Paths of all leaf entries, each exactly once.
    pub fn list_streams(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_leaves(0, &mut prefix, &mut out);
        out
    }

    fn collect_leaves(&self, sid: u32, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        let Some(node) = self.entry(sid) else { return };
        for &kid_sid in &node.kids {
            let Some(kid) = self.entry(kid_sid) else {
                continue;
            };
            if kid.kids.is_empty() {
                let mut path = prefix.clone();
                path.push(kid.name.clone());
                out.push(path);
            } else {
                prefix.push(kid.name.clone());
                self.collect_leaves(kid_sid, prefix, out);
                prefix.pop();
            }
        }
    }
}
