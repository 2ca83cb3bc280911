//! The public compound-file reader.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};

use crate::alloc::{self, StreamRegistry};
use crate::defect::{Defect, DefectSink, Severity};
use crate::directory::{DirContext, DirEntry, DirectoryTree, EntryKind, EntryType};
use crate::error::{OleError, Result};
use crate::header::{self, Header, HEADER_SIZE};
use crate::propset::{self, PropertyValue};
use crate::sector::{MiniStream, SectorFile};
use crate::stream;

/// Read-only view of one OLE2 compound file.
///
/// The header, FAT and directory are parsed once at open time; the MiniFAT
/// and the mini-stream backing small streams are loaded lazily on first
/// access. Every returned stream is an independent, fully buffered `Vec<u8>`.
#[derive(Debug)]
pub struct OleReader<R> {
    sectors: SectorFile<R>,
    header: Header,
    fat: Vec<u32>,
    minifat: Option<Vec<u32>>,
    ministream: Option<Vec<u8>>,
    tree: DirectoryTree,
    defects: DefectSink,
}

impl OleReader<std::fs::File> {
    /// Open a compound file on disk.
    pub fn open_path(
        path: impl AsRef<std::path::Path>,
        strictness: Severity,
    ) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::open(file, strictness)
    }
}

impl<R: Read + Seek> OleReader<R> {
    /// Open a compound file from any seekable reader.
    ///
    /// `strictness` is the minimum defect severity that aborts parsing.
    /// `Severity::Fatal` tolerates everything short of unparseable
    /// structure, which is what most real-world files need;
    /// `Severity::Incorrect` rejects any specification violation.
    pub fn open(mut reader: R, strictness: Severity) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size < HEADER_SIZE as u64 {
            return Err(OleError::NotOle(format!("file is only {file_size} bytes")));
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut head = [0u8; HEADER_SIZE];
        reader.read_exact(&mut head)?;

        let mut defects = DefectSink::new(strictness);
        let header = header::parse_header(&head, &mut defects)?;
        let mut sectors = SectorFile::new(reader, header.sector_size, file_size);
        log::debug!(
            "opened compound file: {} bytes, {}-byte sectors, {} data sectors",
            file_size,
            header.sector_size,
            sectors.sector_count()
        );

        let mut registry = StreamRegistry::default();
        registry.register(header.dir_start, false, &mut defects)?;
        if header.minifat_sector_count > 0 {
            registry.register(header.minifat_start, false, &mut defects)?;
        }
        if header.difat_sector_count > 0 {
            registry.register(header.difat_start, false, &mut defects)?;
        }

        let fat = alloc::load_fat(&mut sectors, &header, &mut defects)?;

        // The directory stream's size is declared nowhere; walk it with an
        // unknown size, always over the main FAT.
        let dir_data = stream::materialize(&mut sectors, header.dir_start, None, &fat)?;
        let mut cx = DirContext {
            sector_size: header.sector_size,
            mini_cutoff: header.mini_cutoff,
            registry: &mut registry,
            defects: &mut defects,
        };
        let tree = DirectoryTree::load(dir_data, &mut cx)?;

        Ok(Self {
            sectors,
            header,
            fat,
            minifat: None,
            ministream: None,
            tree,
            defects,
        })
    }

    /// Resolve a `/`-separated, root-relative path, case-insensitively.
    fn lookup(&self, path: &str) -> Option<&DirEntry> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let sid = self.tree.find(&components)?;
        self.tree.entry(sid)
    }

    /// Paths of all leaves in the storage hierarchy, each exactly once.
    pub fn list_streams(&self) -> Vec<Vec<String>> {
        self.tree.list_streams()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    /// What kind of node a path names, or `None` if it does not exist.
    pub fn entry_kind(&self, path: &str) -> Option<EntryKind> {
        match self.lookup(path)?.entry_type {
            EntryType::Root => Some(EntryKind::Root),
            EntryType::Storage => Some(EntryKind::Storage),
            EntryType::Stream => Some(EntryKind::Stream),
            _ => None,
        }
    }

    /// Declared size of a stream.
    pub fn stream_size(&self, path: &str) -> Result<u64> {
        let entry = self
            .lookup(path)
            .ok_or_else(|| OleError::NotFound(path.into()))?;
        if entry.entry_type != EntryType::Stream {
            return Err(OleError::NotAStream(path.into()));
        }
        Ok(entry.size)
    }

    /// Materialize a stream's full contents.
    pub fn open_stream(&mut self, path: &str) -> Result<Vec<u8>> {
        let (start, size) = {
            let entry = self
                .lookup(path)
                .ok_or_else(|| OleError::NotFound(path.into()))?;
            if entry.entry_type != EntryType::Stream {
                return Err(OleError::NotAStream(path.into()));
            }
            (entry.start_sector, entry.size)
        };
        self.read_stream(start, size)
    }

    /// Decode a property-set stream into an id → value map.
    pub fn read_properties(&mut self, path: &str) -> Result<BTreeMap<u32, PropertyValue>> {
        let data = self.open_stream(path)?;
        propset::decode_properties(&data, &mut self.defects)
    }

    /// Name of the root storage entry (usually "Root Entry").
    pub fn root_name(&self) -> &str {
        self.tree.entry(0).map(|e| e.name.as_str()).unwrap_or("")
    }

    /// Defects tolerated under the configured strictness, in detection order.
    pub fn defects(&self) -> &[Defect] {
        self.defects.recorded()
    }

    pub fn sector_size(&self) -> u64 {
        self.header.sector_size
    }

    fn read_stream(&mut self, start: u32, size: u64) -> Result<Vec<u8>> {
        if size < self.header.mini_cutoff as u64 {
            self.ensure_ministream()?;
            let minifat = self.minifat.as_deref().unwrap_or(&[]);
            let ministream = self.ministream.as_deref().unwrap_or(&[]);
            let mut source = MiniStream::new(ministream, self.header.mini_sector_size);
            stream::materialize(&mut source, start, Some(size), minifat)
        } else {
            stream::materialize(&mut self.sectors, start, Some(size), &self.fat)
        }
    }

    /// Load the MiniFAT and mini-stream on first use. The mini-stream is the
    /// root entry's own FAT chain; mini-sector chains index into it.
    fn ensure_ministream(&mut self) -> Result<()> {
        if self.minifat.is_some() {
            return Ok(());
        }
        let (root_start, root_size) = {
            let root = self
                .tree
                .entry(0)
                .ok_or_else(|| OleError::Structural("missing root entry".into()))?;
            (root.start_sector, root.size)
        };
        let minifat = alloc::load_minifat(
            &mut self.sectors,
            &self.header,
            &self.fat,
            root_size,
            &mut self.defects,
        )?;
        let ministream =
            stream::materialize(&mut self.sectors, root_start, Some(root_size), &self.fat)?;
        self.minifat = Some(minifat);
        self.ministream = Some(ministream);
        Ok(())
    }
}
