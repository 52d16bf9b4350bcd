use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::common::{ArborError, PageId, Result, PAGE_SIZE};

/// DiskManager is the block store underneath the buffer pool.
/// It manages a single page file made of fixed-size blocks and tracks how
/// many blocks the file holds. Blocks past the end of the file do not exist
/// until they are appended.
pub struct DiskManager {
    /// The page file
    db_file: Mutex<File>,
    /// Path to the page file
    db_path: String,
    /// Number of pages currently in the file
    num_pages: AtomicU32,
    /// Number of block reads performed
    num_reads: AtomicU32,
    /// Number of block writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Creates a page file holding a single zero-filled page.
    /// An existing file at the same path is truncated.
    pub fn create<P: AsRef<Path>>(db_path: P) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(db_path.as_ref())?;

        file.write_all(&[0u8; PAGE_SIZE])
            .map_err(|_| ArborError::WriteFailed(PageId::new(0)))?;
        file.sync_all()?;

        debug!("Created page file {}", db_path.as_ref().display());
        Ok(())
    }

    /// Opens an existing page file.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&db_path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ArborError::FileNotFound(path_str.clone()),
                _ => ArborError::Io(e),
            })?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            db_file: Mutex::new(file),
            db_path: path_str,
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Closes the page file, syncing it first.
    pub fn close(self) -> Result<()> {
        self.sync()
    }

    /// Removes a page file from disk.
    pub fn destroy<P: AsRef<Path>>(db_path: P) -> Result<()> {
        fs::remove_file(db_path.as_ref()).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ArborError::FileNotFound(db_path.as_ref().to_string_lossy().to_string())
            }
            _ => ArborError::Io(e),
        })?;

        debug!("Destroyed page file {}", db_path.as_ref().display());
        Ok(())
    }

    /// Reads a page from disk into the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let num_pages = self.get_num_pages();
        if page_id.as_u32() >= num_pages {
            return Err(ArborError::ReadPastEnd { page_id, num_pages });
        }

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id.offset()))?;
        file.read_exact(data)?;

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    /// The page must already exist in the file.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        if page_id.as_u32() >= self.get_num_pages() {
            return Err(ArborError::WriteFailed(page_id));
        }

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id.offset()))?;
        file.write_all(data)
            .map_err(|_| ArborError::WriteFailed(page_id))?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Appends one zero-filled page to the end of the file and returns its ID.
    pub fn append_empty_block(&self) -> Result<PageId> {
        let mut file = self.db_file.lock();
        let page_id = PageId::new(self.num_pages.load(Ordering::SeqCst));

        file.seek(SeekFrom::Start(page_id.offset()))?;
        file.write_all(&[0u8; PAGE_SIZE])
            .map_err(|_| ArborError::WriteFailed(page_id))?;
        file.flush()?;

        self.num_pages.fetch_add(1, Ordering::SeqCst);
        Ok(page_id)
    }

    /// Grows the file with empty pages until it holds at least `min_pages`.
    pub fn ensure_capacity(&self, min_pages: u32) -> Result<()> {
        while self.get_num_pages() < min_pages {
            self.append_empty_block()?;
        }
        Ok(())
    }

    /// Returns the number of pages currently in the file.
    pub fn get_num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    /// Returns the number of block reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of block writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the page file.
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }

    /// Flushes any buffered writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.db_file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.db_file.get_mut();
        let _ = file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("test.bin");
        DiskManager::create(&path).unwrap();
        path
    }

    #[test]
    fn test_disk_manager_create() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir);
        let dm = DiskManager::open(&path).unwrap();
        assert_eq!(dm.get_num_pages(), 1);

        let mut data = [1u8; PAGE_SIZE];
        dm.read_page(PageId::new(0), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_open_missing() {
        let dir = TempDir::new().unwrap();
        let result = DiskManager::open(dir.path().join("missing.bin"));
        assert!(matches!(result, Err(ArborError::FileNotFound(_))));
    }

    #[test]
    fn test_disk_manager_append_page() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::open(create_file(&dir)).unwrap();

        let page_id = dm.append_empty_block().unwrap();
        assert_eq!(page_id, PageId::new(1));
        assert_eq!(dm.get_num_pages(), 2);

        dm.ensure_capacity(5).unwrap();
        assert_eq!(dm.get_num_pages(), 5);

        // Never shrinks
        dm.ensure_capacity(2).unwrap();
        assert_eq!(dm.get_num_pages(), 5);
    }

    #[test]
    fn test_disk_manager_read_write() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::open(create_file(&dir)).unwrap();
        let page_id = dm.append_empty_block().unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_data).unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
        assert_eq!(dm.get_num_reads(), 1);
        assert_eq!(dm.get_num_writes(), 1);
    }

    #[test]
    fn test_disk_manager_past_end() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::open(create_file(&dir)).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        assert!(matches!(
            dm.read_page(PageId::new(1), &mut data),
            Err(ArborError::ReadPastEnd { num_pages: 1, .. })
        ));
        assert!(matches!(
            dm.write_page(PageId::new(3), &data),
            Err(ArborError::WriteFailed(_))
        ));
    }

    #[test]
    fn test_disk_manager_destroy() {
        let dir = TempDir::new().unwrap();
        let path = create_file(&dir);

        DiskManager::destroy(&path).unwrap();
        assert!(!path.exists());
        assert!(matches!(
            DiskManager::destroy(&path),
            Err(ArborError::FileNotFound(_))
        ));
    }
}
