// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/blob.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file handles block template blob surgery for the CN stratum pool,
// located in the core subdirectory. The pool splices its instance nonce into
// the template's reserved slot and the miner's nonce at the coin's fixed
// offset before hashing or submitting a block.
//
// Tree Location:
// - src/core/blob.rs (template blob manipulation)
// - Depends on: thiserror

use thiserror::Error;

/// Length of the miner nonce field in a CryptoNote header
pub const WORKER_NONCE_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("template blob is empty")]
    Empty,
    #[error("offset {offset} out of range for blob of {len} bytes")]
    OffsetOutOfRange { offset: usize, len: usize },
}

/// Splice the pool's instance nonce into the reserved slot (little-endian u32)
pub fn splice_instance_nonce(
    blob: &mut [u8],
    reserved_offset: usize,
    instance_nonce: u32,
) -> Result<(), BlobError> {
    write_at(blob, reserved_offset, &instance_nonce.to_le_bytes())
}

/// Splice the miner's 4-byte nonce at the coin's nonce offset
pub fn splice_worker_nonce(
    blob: &mut [u8],
    nonce_offset: usize,
    nonce: &[u8; WORKER_NONCE_LEN],
) -> Result<(), BlobError> {
    write_at(blob, nonce_offset, nonce)
}

/// Read the instance nonce back out of a blob
pub fn read_instance_nonce(blob: &[u8], reserved_offset: usize) -> Result<u32, BlobError> {
    let bytes = read_at(blob, reserved_offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read the miner nonce back out of a blob
pub fn read_worker_nonce(
    blob: &[u8],
    nonce_offset: usize,
) -> Result<[u8; WORKER_NONCE_LEN], BlobError> {
    let bytes = read_at(blob, nonce_offset, WORKER_NONCE_LEN)?;
    Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Hard-fork version lives in the leading varint of the blob
/// All deployed versions fit in one byte, so the first byte is enough
pub fn major_version(blob: &[u8]) -> Result<u8, BlobError> {
    blob.first().copied().ok_or(BlobError::Empty)
}

fn write_at(blob: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), BlobError> {
    if blob.is_empty() {
        return Err(BlobError::Empty);
    }
    let end = offset.checked_add(bytes.len()).ok_or(BlobError::OffsetOutOfRange {
        offset,
        len: blob.len(),
    })?;
    if end > blob.len() {
        return Err(BlobError::OffsetOutOfRange { offset, len: blob.len() });
    }
    blob[offset..end].copy_from_slice(bytes);
    Ok(())
}

fn read_at(blob: &[u8], offset: usize, len: usize) -> Result<&[u8], BlobError> {
    let end = offset.checked_add(len).ok_or(BlobError::OffsetOutOfRange {
        offset,
        len: blob.len(),
    })?;
    if end > blob.len() {
        return Err(BlobError::OffsetOutOfRange { offset, len: blob.len() });
    }
    Ok(&blob[offset..end])
}


// Changelog:
// - v1.0.0 (2025-07-12): Initial blob surgery.
//   - Purpose: Splices the instance nonce into the reserved slot and the
//     miner nonce at the coin offset, with bounds-checked read-back used by
//     the validator and the round-trip tests.
