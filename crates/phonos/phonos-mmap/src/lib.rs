use memmap2::MmapMut;
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

/// Directory backing POSIX shared memory objects on Linux.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Resolve a well-known segment name (with or without a leading `/`, as
/// `shm_open` accepts it) to the file that backs it inside `dir`.
pub fn segment_path<D: AsRef<Path>>(dir: D, name: &str) -> PathBuf {
    dir.as_ref().join(name.trim_start_matches('/'))
}

/// A read-write shared mapping of a whole file.
///
/// The file descriptor lives exactly as long as the mapping; dropping the
/// value unmaps the region and closes the descriptor.
pub struct MmapFileMut {
    _file: File,
    mmap: MmapMut,
}

impl MmapFileMut {
    /// Create a new file to `size_bytes` and map it read-write
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Open an existing file and map it to read and write
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        // An empty file cannot be mapped; report it the same way as a short one.
        if file.metadata()?.len() == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "cannot map an empty file",
            ));
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { _file: file, mmap })
    }

    /// Return raw pointer to start of memory mapped file data
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}
