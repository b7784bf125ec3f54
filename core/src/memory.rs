//! Memory engine: 32-bit and block memory I/O over MEM-AP with
//! auto-increment `TAR`, chunked at each 1 KiB wrap boundary and moved
//! through `DAP_TransferBlock` for throughput.

use crate::arm::{ap, DapSession};
use crate::error::{CoreError, Result};

/// One `TAR` auto-increment wrap boundary, in words (1 KiB / 4 bytes).
const TAR_WRAP_WORDS: usize = 256;

/// Programs `CSW`/`TAR`/`DRW` against MEM-AP #0.
pub struct MemoryEngine;

impl MemoryEngine {
    pub fn new() -> Self {
        Self
    }

    fn require_aligned(address: u32) -> Result<()> {
        if address % 4 != 0 {
            return Err(CoreError::invalid_data(format!(
                "address {address:#010x} is not 4-byte aligned"
            )));
        }
        Ok(())
    }

    /// Reads one aligned 32-bit word.
    pub fn read_u32(&self, session: &mut DapSession, address: u32) -> Result<u32> {
        Self::require_aligned(address)?;
        let result = (|| {
            session.write_csw_if_changed(ap::Csw::auto_increment_32())?;
            session.write_ap(ap::MEM_AP_SEL, ap::mem_ap::TAR, address)?;
            session.read_ap(ap::MEM_AP_SEL, ap::mem_ap::DRW)
        })();
        self.clear_on_failure(session, &result);
        result
    }

    /// Writes one aligned 32-bit word.
    pub fn write_u32(&self, session: &mut DapSession, address: u32, value: u32) -> Result<()> {
        Self::require_aligned(address)?;
        let result = (|| {
            session.write_csw_if_changed(ap::Csw::auto_increment_32())?;
            session.write_ap(ap::MEM_AP_SEL, ap::mem_ap::TAR, address)?;
            session.write_ap(ap::MEM_AP_SEL, ap::mem_ap::DRW, value)
        })();
        self.clear_on_failure(session, &result);
        result
    }

    /// Reads `words.len()` consecutive words starting at `address`,
    /// re-arming `TAR` at each 1-KiB auto-increment wrap boundary (spec
    /// §4.3).
    pub fn read_block(&self, session: &mut DapSession, address: u32, words: &mut [u32]) -> Result<()> {
        Self::require_aligned(address)?;
        let result = self.chunked_transfer(session, address, words.len(), |session, addr, chunk| {
            session.transfer_block(ap::MEM_AP_SEL, ap::mem_ap::DRW, true, chunk)
        }, words);
        result
    }

    /// Writes `words` starting at `address`, re-arming `TAR` at each 1-KiB
    /// wrap boundary.
    pub fn write_block(&self, session: &mut DapSession, address: u32, words: &[u32]) -> Result<()> {
        Self::require_aligned(address)?;
        let mut scratch = words.to_vec();
        let len = scratch.len();
        self.chunked_transfer(session, address, len, |session, _addr, chunk| {
            session.transfer_block(ap::MEM_AP_SEL, ap::mem_ap::DRW, false, chunk)
        }, &mut scratch)
    }

    fn chunked_transfer(
        &self,
        session: &mut DapSession,
        address: u32,
        len: usize,
        mut op: impl FnMut(&mut DapSession, u32, &mut [u32]) -> Result<()>,
        words: &mut [u32],
    ) -> Result<()> {
        debug_assert_eq!(len, words.len());
        let result = (|| {
            session.write_csw_if_changed(ap::Csw::auto_increment_32())?;
            let mut offset = 0usize;
            let mut addr = address;
            while offset < len {
                let words_to_wrap =
                    TAR_WRAP_WORDS - ((addr / 4) as usize % TAR_WRAP_WORDS);
                let chunk_len = words_to_wrap.min(len - offset);
                session.write_ap(ap::MEM_AP_SEL, ap::mem_ap::TAR, addr)?;
                op(session, addr, &mut words[offset..offset + chunk_len])?;
                offset += chunk_len;
                addr = addr.wrapping_add((chunk_len as u32) * 4);
            }
            Ok(())
        })();
        self.clear_on_failure(session, &result);
        result
    }

    /// On any `TRANSFER_FAILED`, clears DP errors and surfaces the error to
    /// the caller; never silently retries.
    fn clear_on_failure<T>(&self, session: &mut DapSession, result: &Result<T>) {
        if let Err(e) = result {
            if e.code() == crate::error::ErrorCode::TransferFailed {
                session.clear_errors();
            }
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A fully simulated session is out of scope here (DapSession owns a real
    // ProbeHandle) — the TAR-wrap chunking arithmetic is exercised directly.
    #[test]
    fn wrap_boundary_chunking_covers_exact_multiple() {
        let len = 512usize; // two 1 KiB pages
        let mut offset = 0usize;
        let mut addr: u32 = 0x3F00; // 0x3F00..0x4000 is 64 words to the boundary
        let mut chunks = vec![];
        while offset < len {
            let words_to_wrap = TAR_WRAP_WORDS - ((addr / 4) as usize % TAR_WRAP_WORDS);
            let chunk_len = words_to_wrap.min(len - offset);
            chunks.push(chunk_len);
            offset += chunk_len;
            addr = addr.wrapping_add((chunk_len as u32) * 4);
        }
        assert_eq!(chunks.iter().sum::<usize>(), len);
        assert_eq!(chunks[0], 64);
    }
}
