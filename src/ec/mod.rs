pub mod memory;
pub mod port;
pub mod sys;

pub use memory::MemoryIo;
pub use port::PortIo;
pub use sys::EcSysIo;

use crate::error::Result;
use crate::sysfs::SysfsRoot;
use std::sync::{Arc, Mutex, MutexGuard};

/// A raw channel into an EC address space: 8-bit offset in, 8-bit value out.
///
/// Reads may have side effects in the controller, so they take `&mut self`
/// and are never cached or retried.
pub trait EcIo: Send + std::fmt::Debug {
    fn read(&mut self, offset: u8) -> Result<u8>;
}

/// Which of the controller's two address spaces a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// ACPI EC RAM, through the kernel's EC primitive. Holds the fan period.
    Acpi,
    /// Vendor mailbox at ports 0x200/0x201. Holds the battery CT number.
    Mailbox,
}

#[derive(Debug)]
struct Channels {
    acpi: Box<dyn EcIo>,
    mailbox: Box<dyn EcIo>,
}

impl Channels {
    fn get(&mut self, channel: Channel) -> &mut dyn EcIo {
        match channel {
            Channel::Acpi => self.acpi.as_mut(),
            Channel::Mailbox => self.mailbox.as_mut(),
        }
    }
}

/// Both EC channels behind one mutex.
///
/// The mailbox index write and data read are a pair, and the ACPI EC
/// handshake shares the same controller; a reader on either channel holds
/// the lock for its whole access.
#[derive(Debug)]
pub struct Ec {
    io: Mutex<Channels>,
}

pub type SharedEc = Arc<Ec>;

impl Ec {
    pub fn new(acpi: impl EcIo + 'static, mailbox: impl EcIo + 'static) -> Self {
        Self {
            io: Mutex::new(Channels {
                acpi: Box::new(acpi),
                mailbox: Box::new(mailbox),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        // A panic mid-read leaves no state behind worth protecting.
        self.io.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn read(&self, channel: Channel, offset: u8) -> Result<u8> {
        self.lock().get(channel).read(offset)
    }

    /// Fill `buf` from consecutive offsets starting at `base`, strictly
    /// ascending, holding the lock for the whole run.
    pub fn read_run(&self, channel: Channel, base: u8, buf: &mut [u8]) -> Result<()> {
        let mut channels = self.lock();
        let io = channels.get(channel);
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = io.read(base.wrapping_add(i as u8))?;
        }
        Ok(())
    }
}

pub fn shared(acpi: impl EcIo + 'static, mailbox: impl EcIo + 'static) -> SharedEc {
    Arc::new(Ec::new(acpi, mailbox))
}

/// Open `ec_sys` for ACPI EC RAM and `/dev/port` for the mailbox.
pub fn open(sysfs: &SysfsRoot) -> Result<SharedEc> {
    tracing::debug!("opening EC channels under {}", sysfs.root().display());
    let acpi = EcSysIo::open(sysfs)?;
    let mailbox = PortIo::open(sysfs)?;
    Ok(shared(acpi, mailbox))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_read_passes_through() {
        let acpi = MemoryIo::new();
        acpi.set(0x2E, 0x80);
        let ec = Ec::new(acpi.clone(), MemoryIo::new());
        assert_eq!(ec.read(Channel::Acpi, 0x2E).unwrap(), 0x80);
        assert_eq!(acpi.access_log(), vec![0x2E]);
    }

    #[test]
    fn test_channels_are_separate_spaces() {
        let acpi = MemoryIo::new();
        let mailbox = MemoryIo::new();
        acpi.set(0x2E, 0x11);
        mailbox.set(0x2E, 0x22);
        let ec = Ec::new(acpi.clone(), mailbox.clone());

        assert_eq!(ec.read(Channel::Acpi, 0x2E).unwrap(), 0x11);
        assert_eq!(ec.read(Channel::Mailbox, 0x2E).unwrap(), 0x22);
        assert_eq!(acpi.access_log(), vec![0x2E]);
        assert_eq!(mailbox.access_log(), vec![0x2E]);
    }

    #[test]
    fn test_read_run_ascending() {
        let mailbox = MemoryIo::new();
        mailbox.load(0xA1, b"ABCD");
        let acpi = MemoryIo::new();
        let ec = Ec::new(acpi.clone(), mailbox.clone());

        let mut buf = [0u8; 4];
        ec.read_run(Channel::Mailbox, 0xA1, &mut buf).unwrap();
        assert_eq!(&buf, b"ABCD");
        assert_eq!(mailbox.access_log(), vec![0xA1, 0xA2, 0xA3, 0xA4]);
        assert!(acpi.access_log().is_empty());
    }

    #[test]
    fn test_runs_do_not_interleave() {
        // One space behind both channels, so the log shows every read in order.
        let mem = MemoryIo::new();
        let ec = shared(mem.clone(), mem.clone());

        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let ec = Arc::clone(&ec);
                let channel = if t % 2 == 0 { Channel::Acpi } else { Channel::Mailbox };
                thread::spawn(move || {
                    let mut buf = [0u8; 14];
                    for _ in 0..25 {
                        ec.read_run(channel, t * 0x20, &mut buf).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let log = mem.access_log();
        assert_eq!(log.len(), 4 * 25 * 14);
        for run in log.chunks(14) {
            for pair in run.windows(2) {
                assert_eq!(pair[1], pair[0] + 1);
            }
        }
    }

    #[test]
    fn test_error_propagates() {
        let mailbox = MemoryIo::new();
        mailbox.fail_at(0xA3);
        let ec = Ec::new(MemoryIo::new(), mailbox.clone());

        let mut buf = [0u8; 14];
        assert!(ec.read_run(Channel::Mailbox, 0xA1, &mut buf).is_err());
        // No retry after the failing offset.
        assert_eq!(mailbox.access_log(), vec![0xA1, 0xA2, 0xA3]);
    }

    #[test]
    fn test_open_needs_both_channels() {
        let tmp = tempfile::tempdir().unwrap();
        let ec0 = tmp.path().join("sys/kernel/debug/ec/ec0");
        std::fs::create_dir_all(&ec0).unwrap();
        std::fs::write(ec0.join("io"), [0u8; 256]).unwrap();
        let sysfs = SysfsRoot::new(tmp.path());
        assert!(open(&sysfs).is_err());

        std::fs::create_dir_all(tmp.path().join("dev")).unwrap();
        std::fs::write(tmp.path().join("dev/port"), vec![0u8; 0x202]).unwrap();
        assert!(open(&sysfs).is_ok());
    }
}
