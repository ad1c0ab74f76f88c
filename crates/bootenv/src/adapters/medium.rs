//! Raw access to the medium holding one U-Boot environment copy
//!
//! Regular files and block devices (including `/dev/mtdblock*`) are read
//! and written at the configured offset. MTD character devices need
//! erase-before-write and, on NAND, skipping of bad erase blocks inside the
//! reserved window.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bootstate_uboot_format::EnvDevice;
use tracing::debug;

use crate::atomic::write_atomic;
use crate::error::EnvError;

/// Read `env_size` bytes of the copy described by `dev`
///
/// A medium shorter than the copy is padded with `0xff`, which never passes
/// CRC validation.
pub(crate) fn read_copy(dev: &EnvDevice) -> Result<Vec<u8>, EnvError> {
    if is_mtd(&dev.path) {
        return mtd::read(dev);
    }

    let path = dev.path.as_path();
    let mut file = File::open(path).map_err(|e| EnvError::io(path, e))?;
    file.seek(SeekFrom::Start(dev.offset))
        .map_err(|e| EnvError::io(path, e))?;

    let mut raw = Vec::with_capacity(dev.env_size);
    file.take(to_u64(dev.env_size))
        .read_to_end(&mut raw)
        .map_err(|e| EnvError::io(path, e))?;
    if raw.len() < dev.env_size {
        debug!(path = %path.display(), read = raw.len(), "Short environment copy");
        raw.resize(dev.env_size, 0xff);
    }
    Ok(raw)
}

/// Write one encoded copy
///
/// With `replace_file` set, a regular file holding exactly this copy is
/// replaced atomically instead of being overwritten in place.
pub(crate) fn write_copy(dev: &EnvDevice, raw: &[u8], replace_file: bool) -> Result<(), EnvError> {
    if is_mtd(&dev.path) {
        return mtd::write(dev, raw);
    }

    let path = dev.path.as_path();
    if replace_file && dev.offset == 0 && is_whole_file(path, raw.len()) {
        return write_atomic(path, raw, ".tmp");
    }

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| EnvError::io(path, e))?;
    file.seek(SeekFrom::Start(dev.offset))
        .map_err(|e| EnvError::io(path, e))?;
    file.write_all(raw).map_err(|e| EnvError::io(path, e))?;
    file.sync_data().map_err(|e| EnvError::io(path, e))?;
    debug!(path = %path.display(), offset = dev.offset, len = raw.len(), "Wrote environment copy in place");
    Ok(())
}

fn is_whole_file(path: &Path, len: usize) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() == to_u64(len))
}

/// MTD devices are the character devices; `mtdblock` nodes and other
/// block devices take the plain file path
#[cfg(unix)]
fn is_mtd(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;

    std::fs::metadata(path).is_ok_and(|meta| meta.file_type().is_char_device())
}

#[cfg(not(unix))]
fn is_mtd(_path: &Path) -> bool {
    false
}

fn to_u64(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Erase blocks holding a copy
///
/// Starting at the block containing `offset`, the first `needed` blocks for
/// which `is_bad` is false are taken, searching at most `window` blocks.
pub(crate) fn plan_blocks(
    offset: u64,
    erase_size: u64,
    window: u64,
    needed: u64,
    mut is_bad: impl FnMut(u64) -> Result<bool, EnvError>,
) -> Result<Vec<u64>, EnvError> {
    if erase_size == 0 {
        return Err(EnvError::Config("erase block size is zero".to_string()));
    }
    let first = offset.saturating_sub(offset % erase_size);
    let window = window.max(needed);

    let mut blocks = Vec::new();
    for index in 0..window {
        if to_u64(blocks.len()) == needed {
            break;
        }
        let block = index
            .checked_mul(erase_size)
            .and_then(|rel| rel.checked_add(first))
            .ok_or_else(|| EnvError::Config("environment window exceeds device".to_string()))?;
        if is_bad(block)? {
            debug!(block = format_args!("{block:#x}"), "Skipping bad erase block");
            continue;
        }
        blocks.push(block);
    }

    if to_u64(blocks.len()) < needed {
        return Err(EnvError::Corrupt(format!(
            "only {} good erase blocks in a window of {window}, {needed} needed",
            blocks.len()
        )));
    }
    Ok(blocks)
}

#[cfg(target_os = "linux")]
mod mtd {
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::FileExt;

    use bootstate_uboot_format::EnvDevice;
    use tracing::debug;

    use super::{plan_blocks, to_u64};
    use crate::error::EnvError;
    use crate::sys;

    struct Geometry {
        erase_size: u64,
        nand: bool,
        /// Offset of the copy inside its first erase block
        skew: usize,
        blocks: Vec<u64>,
    }

    fn geometry(file: &File, dev: &EnvDevice) -> Result<Geometry, EnvError> {
        let info = sys::mtd_get_info(file).map_err(|e| EnvError::io(&dev.path, e))?;
        debug!(
            path = %dev.path.display(),
            kind = info.kind,
            flags = info.flags,
            size = info.size,
            erasesize = info.erasesize,
            writesize = info.writesize,
            oobsize = info.oobsize,
            "MTD geometry"
        );

        let erase_size = u64::from(info.erasesize);
        if erase_size == 0 {
            return Err(EnvError::Config(format!(
                "{}: erase block size is zero",
                dev.path.display()
            )));
        }
        let nand = matches!(info.kind, sys::MTD_NANDFLASH | sys::MTD_MLCNANDFLASH);
        let skew = dev.offset % erase_size;
        if nand && skew != 0 {
            return Err(EnvError::Config(format!(
                "{}: offset {:#x} is not erase-block aligned",
                dev.path.display(),
                dev.offset
            )));
        }

        let span = skew.saturating_add(to_u64(dev.env_size));
        let needed = span.div_ceil(erase_size);
        let window = to_u64(dev.sector_size)
            .saturating_mul(u64::from(dev.sectors))
            .div_ceil(erase_size);

        let blocks = plan_blocks(dev.offset, erase_size, window, needed, |block| {
            if nand {
                sys::mtd_is_bad_block(file, block).map_err(|e| EnvError::io(&dev.path, e))
            } else {
                Ok(false)
            }
        })?;

        Ok(Geometry {
            erase_size,
            nand,
            skew: usize::try_from(skew)
                .map_err(|e| EnvError::Config(format!("offset out of range: {e}")))?,
            blocks,
        })
    }

    fn read_blocks(file: &File, dev: &EnvDevice, geo: &Geometry) -> Result<Vec<u8>, EnvError> {
        let block_len = usize::try_from(geo.erase_size)
            .map_err(|e| EnvError::Config(format!("erase block size out of range: {e}")))?;
        let mut buf = vec![0u8; block_len.saturating_mul(geo.blocks.len())];
        for (chunk, &block) in buf.chunks_mut(block_len).zip(&geo.blocks) {
            file.read_exact_at(chunk, block)
                .map_err(|e| EnvError::io(&dev.path, e))?;
        }
        Ok(buf)
    }

    pub(super) fn read(dev: &EnvDevice) -> Result<Vec<u8>, EnvError> {
        let file = File::open(&dev.path).map_err(|e| EnvError::io(&dev.path, e))?;
        let geo = geometry(&file, dev)?;
        let buf = read_blocks(&file, dev, &geo)?;
        buf.get(geo.skew..geo.skew.saturating_add(dev.env_size))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| EnvError::Corrupt("MTD read shorter than environment".to_string()))
    }

    pub(super) fn write(dev: &EnvDevice, raw: &[u8]) -> Result<(), EnvError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&dev.path)
            .map_err(|e| EnvError::io(&dev.path, e))?;
        let geo = geometry(&file, dev)?;

        // Read-modify-write keeps whatever shares the erase blocks with the copy
        let mut buf = read_blocks(&file, dev, &geo)?;
        buf.get_mut(geo.skew..geo.skew.saturating_add(raw.len()))
            .ok_or_else(|| EnvError::Corrupt("MTD window shorter than environment".to_string()))?
            .copy_from_slice(raw);

        let block_len = usize::try_from(geo.erase_size)
            .map_err(|e| EnvError::Config(format!("erase block size out of range: {e}")))?;
        let erase_len = u32::try_from(geo.erase_size)
            .map_err(|e| EnvError::Config(format!("erase block size out of range: {e}")))?;
        for (chunk, &block) in buf.chunks(block_len).zip(&geo.blocks) {
            let start = u32::try_from(block)
                .map_err(|e| EnvError::Config(format!("erase block {block:#x} beyond 4 GiB: {e}")))?;
            sys::mtd_erase(&file, start, erase_len).map_err(|e| EnvError::io(&dev.path, e))?;
            file.write_all_at(chunk, block)
                .map_err(|e| EnvError::io(&dev.path, e))?;
        }
        file.sync_data().map_err(|e| EnvError::io(&dev.path, e))?;

        debug!(
            path = %dev.path.display(),
            blocks = geo.blocks.len(),
            nand = geo.nand,
            "Wrote environment copy to MTD"
        );
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod mtd {
    use bootstate_uboot_format::EnvDevice;

    use crate::error::EnvError;

    fn unsupported(dev: &EnvDevice) -> EnvError {
        EnvError::Config(format!(
            "{}: MTD devices are only supported on Linux",
            dev.path.display()
        ))
    }

    pub(super) fn read(dev: &EnvDevice) -> Result<Vec<u8>, EnvError> {
        Err(unsupported(dev))
    }

    pub(super) fn write(dev: &EnvDevice, _raw: &[u8]) -> Result<(), EnvError> {
        Err(unsupported(dev))
    }
}
