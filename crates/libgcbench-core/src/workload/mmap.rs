use std::io;

use super::{WorkerBody, Workload};
use crate::config::WorkloadKind;
use crate::error::{BenchError, Result};

/// Size of each anonymous mapping: 100 pages
pub const REGION_LEN: usize = 4096 * 100;

/// Map and immediately unmap an anonymous private region every iteration
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryMap;

impl Workload for MemoryMap {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::MemoryMap
    }

    fn prepare(&self, _worker_id: usize) -> Result<Box<dyn WorkerBody>> {
        Ok(Box::new(MemoryMapBody))
    }
}

struct MemoryMapBody;

impl WorkerBody for MemoryMapBody {
    fn iterate(&mut self) -> Result<()> {
        let region = map_anonymous(REGION_LEN)?;
        unmap(region, REGION_LEN)
    }
}

#[cfg(unix)]
fn map_anonymous(len: usize) -> Result<*mut libc::c_void> {
    // SAFETY: anonymous mapping with no fd; the kernel picks the address
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(BenchError::workload("mmap", io::Error::last_os_error()));
    }
    Ok(addr)
}

#[cfg(unix)]
fn unmap(addr: *mut libc::c_void, len: usize) -> Result<()> {
    // SAFETY: addr and len describe exactly one live mapping made by
    // map_anonymous, and nothing borrows from it
    if unsafe { libc::munmap(addr, len) } != 0 {
        return Err(BenchError::workload("munmap", io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn map_anonymous(_len: usize) -> Result<*mut std::ffi::c_void> {
    Err(BenchError::workload(
        "mmap",
        io::Error::new(io::ErrorKind::Unsupported, "anonymous mappings need a unix host"),
    ))
}

#[cfg(not(unix))]
fn unmap(_addr: *mut std::ffi::c_void, _len: usize) -> Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_map_unmap_cycle() {
        let mut body = MemoryMap.prepare(0).unwrap();
        for _ in 0..100 {
            body.iterate().unwrap();
        }
        body.finish().unwrap();
    }

    #[test]
    fn test_region_is_writable() {
        let addr = map_anonymous(REGION_LEN).unwrap();
        // SAFETY: the mapping is REGION_LEN bytes of read/write memory we own
        let bytes = unsafe { std::slice::from_raw_parts_mut(addr.cast::<u8>(), REGION_LEN) };
        bytes[0] = 1;
        bytes[REGION_LEN - 1] = 2;
        assert_eq!(bytes[0] + bytes[REGION_LEN - 1], 3);
        unmap(addr, REGION_LEN).unwrap();
    }

    #[test]
    fn test_zero_length_mapping_fails() {
        let err = map_anonymous(0).unwrap_err();
        assert_eq!(err.operation(), Some("mmap"));
    }
}
