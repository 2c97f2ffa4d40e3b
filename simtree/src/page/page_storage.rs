//! Disk storage layer of the disk page file.
//!
//! Reads and writes single pages at `page_id * page_size`. Page 0 holds the
//! file header.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::page_types::{FileHeader, FreePage, PageWithChecksum};
use crate::tree::tree_types::{IndexError, IndexResult, PageId};

/// Bytes read to decode a header before the page size is known
const HEADER_PROBE_BYTES: u64 = 512;

/// Handles reading/writing individual pages to disk.
pub struct Storage {
    file: Mutex<File>,
    path: PathBuf,
    page_size: usize,
}

impl Storage {
    /// Create a new storage file, truncating an existing one
    pub fn create(path: &Path, page_size: usize) -> IndexResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            page_size,
        })
    }

    /// Open an existing storage file, returning it with its header
    pub fn open(path: &Path) -> IndexResult<(Self, FileHeader)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let probe = file.metadata()?.len().min(HEADER_PROBE_BYTES) as usize;
        let mut buffer = vec![0u8; probe];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer)?;
        let header: FileHeader = decode(&buffer)?;
        header.validate()?;

        let storage = Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            page_size: header.page_size as usize,
        };
        Ok((storage, header))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Write header to page 0
    pub fn write_header(&self, header: &FileHeader) -> IndexResult<()> {
        let bytes = encode(header)?;
        self.write_raw(0, bytes)
    }

    /// Read a single node page and verify its checksum
    pub fn read_page<N: DeserializeOwned + Serialize>(&self, page_id: PageId) -> IndexResult<N> {
        let buffer = self.read_raw(page_id)?;
        let page: PageWithChecksum<N> = decode(&buffer)?;
        page.into_node()
    }

    /// Write a single node page with checksum
    pub fn write_page<N: Serialize>(&self, page_id: PageId, node: &N) -> IndexResult<()> {
        let checksum = PageWithChecksum::calculate_checksum(node)?;
        let page = PageWithChecksum { checksum, node };
        let bytes = encode(&page)?;

        if bytes.len() > self.page_size {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Node too large: {} bytes (max {})",
                    bytes.len(),
                    self.page_size
                ),
            )));
        }
        self.write_raw(page_id, bytes)
    }

    /// Read the free list link stored in a freed page
    pub fn read_free_page(&self, page_id: PageId) -> IndexResult<FreePage> {
        let buffer = self.read_raw(page_id)?;
        decode(&buffer)
    }

    pub fn write_free_page(&self, page_id: PageId, free_page: &FreePage) -> IndexResult<()> {
        let bytes = encode(free_page)?;
        self.write_raw(page_id, bytes)
    }

    /// Sync file to disk
    pub fn sync(&self) -> IndexResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn read_raw(&self, page_id: PageId) -> IndexResult<Vec<u8>> {
        if page_id == 0 {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Cannot read page 0 (reserved for header)",
            )));
        }

        let offset = page_id * self.page_size as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; self.page_size];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_raw(&self, page_id: PageId, mut bytes: Vec<u8>) -> IndexResult<()> {
        bytes.resize(self.page_size, 0);
        let offset = page_id * self.page_size as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> IndexResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map_err(|e| IndexError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> IndexResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| IndexError::Serialization(e.to_string()))
}
