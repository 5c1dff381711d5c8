//! Shared helpers for the basalt benchmarks.

use basalt_buffers::AtomicBuffer;
use basalt_mmap::MmapFileMut;

/// Unique `/tmp` path per process so parallel bench runs never collide.
pub fn temp_shm_path(tag: &str) -> String {
    format!("/tmp/basalt_perf_{}_{}", tag, std::process::id())
}

/// A file-backed region sized `len`, mapped read-write. Returns the mapping
/// (keep it alive) and a view over it.
pub fn file_backed_region(path: &str, len: usize) -> (MmapFileMut, AtomicBuffer) {
    let mut mmap = MmapFileMut::create_rw(path, len as u64).expect("failed to create region");
    // SAFETY: mmap bases are page aligned; the caller keeps the mapping.
    let buffer = unsafe { AtomicBuffer::wrap(mmap.as_mut_ptr(), mmap.len()) };
    (mmap, buffer)
}
