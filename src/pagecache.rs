//! Best-effort OS page-cache eviction between the warmup and timed phases.
//!
//! Without it the timed phase would partially benefit from pages left
//! resident by warmup, invalidating the cold-read measurement. Only Linux
//! offers the `posix_fadvise(POSIX_FADV_DONTNEED)` advisory this relies on;
//! elsewhere the whole operation is a no-op reporting zero files.

use crate::BenchResult;
use std::path::Path;

/// What the eviction pass touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheDropStats {
    pub files: u64,
    pub bytes: u64,
}

/// Recursively advise the kernel to evict every file under `path`.
///
/// Per-file failures (permissions, transient I/O) are swallowed: the advisory
/// is best-effort and must never abort the run. Only enumeration of the root
/// itself is allowed to fail.
#[cfg(target_os = "linux")]
pub fn drop_cache(path: &Path) -> BenchResult<CacheDropStats> {
    let mut stats = CacheDropStats::default();
    walk(path, &mut stats)?;
    Ok(stats)
}

#[cfg(target_os = "linux")]
fn walk(dir: &Path, stats: &mut CacheDropStats) -> BenchResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            if let Err(e) = walk(&path, stats) {
                tracing::debug!(dir = %path.display(), error = %e, "skipping unreadable dir");
            }
        } else if let Some(len) = advise_dontneed(&path) {
            stats.files += 1;
            stats.bytes += len;
        }
    }
    Ok(())
}

/// Open read-only and issue POSIX_FADV_DONTNEED for the whole file.
/// Returns the file length on success, None if the file could not be advised.
#[cfg(target_os = "linux")]
fn advise_dontneed(path: &Path) -> Option<u64> {
    use std::os::unix::io::AsRawFd;

    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(file = %path.display(), error = %e, "cannot open for cache drop");
            return None;
        }
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    let ret = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_DONTNEED) };
    if ret != 0 {
        tracing::debug!(file = %path.display(), errno = ret, "posix_fadvise failed");
        return None;
    }
    Some(len)
}

/// Unsupported platform: report zero files processed, not an error.
#[cfg(not(target_os = "linux"))]
pub fn drop_cache(_path: &Path) -> BenchResult<CacheDropStats> {
    Ok(CacheDropStats::default())
}
