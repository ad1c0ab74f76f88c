//! Linux ioctls used by the MTD and efivarfs paths
//!
//! Request numbers use the generic `_IOC` encoding (x86, Arm, RISC-V).

#![expect(unsafe_code, reason = "ioctl(2) has no safe wrapper in std")]

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | ((ty as u32) << 8) | nr as u32
}

/// `struct mtd_info_user` from `<mtd/mtd-abi.h>`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MtdInfoUser {
    /// `MTD_NORFLASH`, `MTD_NANDFLASH`, ...
    pub kind: u8,
    /// Capability flags
    pub flags: u32,
    /// Total device size
    pub size: u32,
    /// Erase block size
    pub erasesize: u32,
    /// Minimal writable unit (page size on NAND)
    pub writesize: u32,
    /// Out-of-band bytes per page
    pub oobsize: u32,
    _padding: u64,
}

#[repr(C)]
struct EraseInfoUser {
    start: u32,
    length: u32,
}

/// `MTD_NANDFLASH`
pub const MTD_NANDFLASH: u8 = 4;
/// `MTD_MLCNANDFLASH`
pub const MTD_MLCNANDFLASH: u8 = 8;

const MEMGETINFO: u32 = ioc(IOC_READ, b'M', 1, std::mem::size_of::<MtdInfoUser>());
const MEMERASE: u32 = ioc(IOC_WRITE, b'M', 2, std::mem::size_of::<EraseInfoUser>());
const MEMGETBADBLOCK: u32 = ioc(IOC_WRITE, b'M', 11, std::mem::size_of::<i64>());

const FS_IOC_GETFLAGS: u32 = ioc(IOC_READ, b'f', 1, std::mem::size_of::<libc::c_long>());
const FS_IOC_SETFLAGS: u32 = ioc(IOC_WRITE, b'f', 2, std::mem::size_of::<libc::c_long>());
const FS_IMMUTABLE_FL: libc::c_int = 0x0000_0010;

fn check(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

/// Query MTD geometry
pub fn mtd_get_info(file: &File) -> io::Result<MtdInfoUser> {
    let mut info = MtdInfoUser::default();
    // SAFETY: MEMGETINFO writes exactly one `mtd_info_user` through the pointer,
    // which refers to a live, properly aligned `#[repr(C)]` value.
    check(unsafe { libc::ioctl(file.as_raw_fd(), MEMGETINFO as libc::Ioctl, &mut info) })?;
    Ok(info)
}

/// Erase `length` bytes starting at `start` (both erase-block aligned)
pub fn mtd_erase(file: &File, start: u32, length: u32) -> io::Result<()> {
    let erase = EraseInfoUser { start, length };
    // SAFETY: MEMERASE only reads one `erase_info_user` from the pointer.
    check(unsafe { libc::ioctl(file.as_raw_fd(), MEMERASE as libc::Ioctl, &erase) })?;
    Ok(())
}

/// Whether the erase block at `offset` is marked bad
pub fn mtd_is_bad_block(file: &File, offset: u64) -> io::Result<bool> {
    let offset = i64::try_from(offset).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: MEMGETBADBLOCK only reads one `loff_t` from the pointer.
    let rc = check(unsafe {
        libc::ioctl(file.as_raw_fd(), MEMGETBADBLOCK as libc::Ioctl, &offset)
    })?;
    Ok(rc > 0)
}

/// Clear the immutable inode flag (efivarfs sets it on every variable)
///
/// Filesystems without inode flags report `ENOTTY`, which is not an error
/// here.
pub fn clear_immutable(file: &File) -> io::Result<()> {
    let mut flags: libc::c_int = 0;
    // SAFETY: FS_IOC_GETFLAGS writes one `int` through the pointer.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_GETFLAGS as libc::Ioctl, &mut flags) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        return match err.raw_os_error() {
            Some(libc::ENOTTY) | Some(libc::EOPNOTSUPP) => Ok(()),
            _ => Err(err),
        };
    }
    if flags & FS_IMMUTABLE_FL == 0 {
        return Ok(());
    }

    flags &= !FS_IMMUTABLE_FL;
    // SAFETY: FS_IOC_SETFLAGS reads one `int` from the pointer.
    check(unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_SETFLAGS as libc::Ioctl, &flags) })?;
    Ok(())
}
