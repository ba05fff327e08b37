use super::EcIo;
use crate::error::{Error, Result};
use crate::sysfs::SysfsRoot;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

/// Mailbox index port: the register offset is written here.
pub const EC_MAILBOX_PORT_ADDR: u16 = 0x200;
/// Mailbox data port: the register value is read back from here.
pub const EC_MAILBOX_PORT_DATA: u16 = 0x201;

/// Two-port index/data mailbox over `/dev/port`.
///
/// A write at file position `p` is an `outb` to I/O port `p`, a read is an
/// `inb`. Needs root (CAP_SYS_RAWIO).
#[derive(Debug)]
pub struct PortIo {
    file: File,
    path: PathBuf,
}

impl PortIo {
    pub fn open(sysfs: &SysfsRoot) -> Result<Self> {
        Self::open_path(sysfs.path("dev/port"))
    }

    pub fn open_path(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::EcAccess {
                path: path.clone(),
                source: e,
            })?;
        Ok(Self { file, path })
    }

    fn access_error(&self, source: std::io::Error) -> Error {
        Error::EcAccess {
            path: self.path.clone(),
            source,
        }
    }
}

impl EcIo for PortIo {
    fn read(&mut self, offset: u8) -> Result<u8> {
        self.file
            .write_all_at(&[offset], EC_MAILBOX_PORT_ADDR as u64)
            .map_err(|e| self.access_error(e))?;
        let mut value = [0u8; 1];
        self.file
            .read_exact_at(&mut value, EC_MAILBOX_PORT_DATA as u64)
            .map_err(|e| self.access_error(e))?;
        Ok(value[0])
    }
}
