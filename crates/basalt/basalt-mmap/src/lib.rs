use memmap2::{MmapMut, MmapOptions};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A read-write memory mapping of a file region.
///
/// Keeps the backing `File` alive for the lifetime of the mapping. The mapped
/// base address is page aligned, which satisfies the alignment requirements of
/// 64-bit atomic access on every supported target.
#[derive(Debug)]
pub struct MmapFileMut {
    _file: File,
    mmap: MmapMut,
}

impl MmapFileMut {
    /// Create a new file of `size_bytes` and map it read-write
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

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { _file: file, mmap })
    }

    /// Map `[offset, offset + length)` of an existing file read-write.
    ///
    /// `offset == 0 && length == 0` maps the whole file. A misaligned offset
    /// is rejected by the kernel and surfaces as an `io::Error`, as do a
    /// missing file or insufficient permissions.
    pub fn map_existing<P: AsRef<Path>>(path: P, offset: u64, length: usize) -> io::Result<Self> {
        if offset == 0 && length == 0 {
            return Self::open_rw(path);
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapOptions::new().offset(offset).len(length).map_mut(&file)? };

        Ok(Self { _file: file, mmap })
    }

    /// Size of a file in bytes, without mapping it.
    pub fn file_size<P: AsRef<Path>>(path: P) -> io::Result<u64> {
        std::fs::metadata(path).map(|m| m.len())
    }

    /// Return raw pointer to start of memory mapped file data
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }

    /// Flush dirty pages back to the file.
    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }

    /// Flush and release the mapping. Dropping the value unmaps as well; this
    /// form exists so callers can observe flush failures.
    pub fn close(self) -> io::Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path(tag: &str) -> String {
        format!("/tmp/basalt_mmap_{}_{}", tag, std::process::id())
    }

    #[test]
    fn create_and_reopen_round_trip() {
        let path = test_path("roundtrip");
        {
            let mut mm = MmapFileMut::create_rw(&path, 4096).expect("create");
            assert_eq!(mm.len(), 4096);
            unsafe { mm.as_mut_ptr().write(0xAB) };
            mm.close().expect("close");
        }
        {
            let mut mm = MmapFileMut::open_rw(&path).expect("open");
            assert_eq!(unsafe { mm.as_mut_ptr().read() }, 0xAB);
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn map_existing_with_offset_sees_tail_of_file() {
        let path = test_path("offset");
        let page = 4096u64;
        {
            let mut mm = MmapFileMut::create_rw(&path, page * 2).expect("create");
            unsafe { mm.as_mut_ptr().add(page as usize).write(0x7F) };
            mm.close().expect("close");
        }
        {
            let mut mm = MmapFileMut::map_existing(&path, page, page as usize).expect("map");
            assert_eq!(mm.len(), page as usize);
            assert_eq!(unsafe { mm.as_mut_ptr().read() }, 0x7F);
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn map_missing_file_fails() {
        let err = MmapFileMut::map_existing("/tmp/basalt_mmap_no_such_file", 0, 0)
            .expect_err("should fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn file_size_reports_length() {
        let path = test_path("size");
        MmapFileMut::create_rw(&path, 12345).expect("create");
        assert_eq!(MmapFileMut::file_size(&path).expect("size"), 12345);
        let _ = std::fs::remove_file(&path);
    }
}
