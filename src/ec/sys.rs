use super::EcIo;
use crate::error::{Error, Result};
use crate::sysfs::SysfsRoot;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

const EC_SYS_IO: &str = "sys/kernel/debug/ec/ec0/io";

/// The kernel's own EC read primitive, exposed by the `ec_sys` module as a
/// 256-byte debugfs file where byte `n` is register `n`.
#[derive(Debug)]
pub struct EcSysIo {
    file: File,
    path: PathBuf,
}

impl EcSysIo {
    pub fn open(sysfs: &SysfsRoot) -> Result<Self> {
        let path = sysfs.path(EC_SYS_IO);
        let file = File::open(&path).map_err(|e| Error::EcAccess {
            path: path.clone(),
            source: e,
        })?;
        Ok(Self { file, path })
    }
}

impl EcIo for EcSysIo {
    fn read(&mut self, offset: u8) -> Result<u8> {
        let mut value = [0u8; 1];
        self.file
            .read_exact_at(&mut value, offset as u64)
            .map_err(|e| Error::EcAccess {
                path: self.path.clone(),
                source: e,
            })?;
        Ok(value[0])
    }
}
