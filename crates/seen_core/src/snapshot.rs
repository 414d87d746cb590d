//! Snapshot file format & IO
//!
//! Header (LE, 24 bytes):
//!   magic[4]   = "SEEN"
//!   version[2] = 1
//!   rsv[2]     = 0
//!   hasher[4]  = FlowHasher::TAG
//!   k[4]       = number of arrays
//!   n[4]       = bits per array
//!   bytes[4]   = packed bytes per array, ceil(n/8)
//!
//! Body: k * bytes packed arrays (LSB-first), then crc32(body)[4].

use crate::bits::BitArray;
use crate::config::FilterConfig;
use crate::consts::{CRC_SIZE, HDR_SIZE, MAGIC_SNAP, VERSION};
use crate::errors::{Result, SeenError};
use crate::filter::MultiHashBloomFilter;
use crate::hash::{FlowHasher, Xxh3Hasher};
use crate::utils::{crc32, read_u16, read_u32, write_u16, write_u32};
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
fn fsync_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let f = std::fs::OpenOptions::new().read(true).custom_flags(libc::O_DIRECTORY).open(dir)?;
    f.sync_all()
}
#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> std::io::Result<()> { Ok(()) }

/// Header fields, readable without loading the arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub hasher: u32,
    pub num_hashes: u32,
    pub num_entries: u32,
    pub bytes_per_array: u32,
}

impl SnapshotHeader {
    fn encode(&self) -> Vec<u8> {
        let mut hdr = Vec::with_capacity(HDR_SIZE);
        hdr.extend_from_slice(MAGIC_SNAP);
        // Vec<u8> writes are infallible
        let _ = write_u16(&mut hdr, VERSION);
        let _ = write_u16(&mut hdr, 0);
        let _ = write_u32(&mut hdr, self.hasher);
        let _ = write_u32(&mut hdr, self.num_hashes);
        let _ = write_u32(&mut hdr, self.num_entries);
        let _ = write_u32(&mut hdr, self.bytes_per_array);
        hdr
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HDR_SIZE || &buf[0..4] != MAGIC_SNAP { return Err(SeenError::BadHeader); }
        let mut cur = &buf[4..HDR_SIZE];
        if read_u16(&mut cur)? != VERSION { return Err(SeenError::BadHeader); }
        let _rsv = read_u16(&mut cur)?;
        Ok(Self {
            hasher: read_u32(&mut cur)?,
            num_hashes: read_u32(&mut cur)?,
            num_entries: read_u32(&mut cur)?,
            bytes_per_array: read_u32(&mut cur)?,
        })
    }

    pub fn config(&self) -> FilterConfig {
        FilterConfig::new(self.num_entries as usize, self.num_hashes as usize)
    }
}

/// Writes `filter` to `path`: temp file in the same directory, fsync, then
/// atomic rename.
pub fn save<H: FlowHasher>(filter: &MultiHashBloomFilter<H>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path_final = path.as_ref().to_path_buf();
    let dir = match path_final.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let cfg = filter.config();
    let header = SnapshotHeader {
        hasher: H::TAG,
        num_hashes: cfg.num_hashes as u32,
        num_entries: cfg.num_entries as u32,
        bytes_per_array: cfg.num_entries.div_ceil(8) as u32,
    };

    let mut body = Vec::with_capacity(cfg.num_hashes * header.bytes_per_array as usize);
    for arr in filter.arrays() {
        body.extend_from_slice(arr.as_bytes());
    }

    let mut tmp = tempfile::Builder::new().prefix("seen_snap_").tempfile_in(dir)?;
    {
        let f = tmp.as_file_mut();
        f.write_all(&header.encode())?;
        f.write_all(&body)?;
        write_u32(f, crc32(&body))?;
        f.sync_all()?;
    }
    tmp.persist(&path_final)?;
    let _ = fsync_dir(&path_final);
    tracing::debug!(path = %path_final.display(), k = header.num_hashes, n = header.num_entries, "snapshot saved");
    Ok(path_final)
}

fn map(path: &Path) -> Result<Mmap> {
    let f = File::open(path)?;
    // SAFETY: snapshots are only replaced by rename, never rewritten in place
    let mmap = unsafe { Mmap::map(&f)? };
    Ok(mmap)
}

pub fn read_header(path: impl AsRef<Path>) -> Result<SnapshotHeader> {
    let mmap = map(path.as_ref())?;
    SnapshotHeader::decode(&mmap)
}

/// Loads a snapshot written with the default xxh3 hasher.
pub fn load(path: impl AsRef<Path>) -> Result<MultiHashBloomFilter<Xxh3Hasher>> {
    load_with(path, Xxh3Hasher)
}

pub fn load_with<H: FlowHasher>(path: impl AsRef<Path>, hasher: H) -> Result<MultiHashBloomFilter<H>> {
    let path = path.as_ref();
    let mmap = map(path)?;
    let hdr = SnapshotHeader::decode(&mmap)?;
    if hdr.hasher != H::TAG {
        tracing::warn!(path = %path.display(), "snapshot written with another hasher");
        return Err(SeenError::HasherMismatch { expected: H::TAG, found: hdr.hasher });
    }
    let cfg = hdr.config();
    cfg.validate()?;
    let bpa = hdr.bytes_per_array as usize;
    if bpa != cfg.num_entries.div_ceil(8) { return Err(SeenError::Corrupt); }

    let body_len = cfg.num_hashes.checked_mul(bpa).ok_or(SeenError::Corrupt)?;
    if mmap.len() != HDR_SIZE + body_len + CRC_SIZE {
        tracing::warn!(path = %path.display(), len = mmap.len(), "snapshot length mismatch");
        return Err(SeenError::Corrupt);
    }
    let body = &mmap[HDR_SIZE..HDR_SIZE + body_len];
    let mut crc_bytes = &mmap[HDR_SIZE + body_len..];
    if read_u32(&mut crc_bytes)? != crc32(body) {
        tracing::warn!(path = %path.display(), "snapshot checksum mismatch");
        return Err(SeenError::Corrupt);
    }

    let arrays = body
        .chunks_exact(bpa)
        .map(|chunk| BitArray::from_bytes(cfg.num_entries, chunk.to_vec()).ok_or(SeenError::Corrupt))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(path = %path.display(), k = cfg.num_hashes, n = cfg.num_entries, "snapshot loaded");
    Ok(MultiHashBloomFilter::from_parts(cfg, arrays, hasher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Blake3Hasher;
    use crate::key::FlowKey;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_preserves_membership() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("f.seen");
        let mut f = MultiHashBloomFilter::new(FilterConfig::new(100, 4)).unwrap();
        f.insert(&FlowKey::new(80, 8080));
        f.insert(&FlowKey::new(443, 50000));
        save(&f, &p).unwrap();

        let g = load(&p).unwrap();
        assert_eq!(g.config(), f.config());
        assert_eq!(g.arrays(), f.arrays());
        assert!(g.query(&FlowKey::new(80, 8080)));

        let hdr = read_header(&p).unwrap();
        assert_eq!((hdr.num_hashes, hdr.num_entries, hdr.bytes_per_array), (4, 100, 13));
    }

    #[test]
    fn hasher_tag_is_checked() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("b.seen");
        let f = MultiHashBloomFilter::with_hasher(FilterConfig::default(), Blake3Hasher).unwrap();
        save(&f, &p).unwrap();
        assert!(matches!(load(&p), Err(SeenError::HasherMismatch { .. })));
        assert!(load_with(&p, Blake3Hasher).is_ok());
    }

    #[test]
    fn bad_magic() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("x.seen");
        std::fs::write(&p, b"NOPE0000000000000000000000000000").unwrap();
        assert!(matches!(load(&p), Err(SeenError::BadHeader)));
        std::fs::write(&p, b"SEE").unwrap();
        assert!(matches!(load(&p), Err(SeenError::BadHeader)));
    }

    #[test]
    fn flipped_bit_detected() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("c.seen");
        let f = MultiHashBloomFilter::new(FilterConfig::default()).unwrap();
        save(&f, &p).unwrap();
        let mut raw = std::fs::read(&p).unwrap();
        raw[HDR_SIZE + 3] ^= 0x10;
        std::fs::write(&p, &raw).unwrap();
        assert!(matches!(load(&p), Err(SeenError::Corrupt)));
    }

    #[test]
    fn truncated_detected() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("t.seen");
        let f = MultiHashBloomFilter::new(FilterConfig::default()).unwrap();
        save(&f, &p).unwrap();
        let raw = std::fs::read(&p).unwrap();
        std::fs::write(&p, &raw[..raw.len() - 1]).unwrap();
        assert!(matches!(load(&p), Err(SeenError::Corrupt)));
    }
}
