use super::EcIo;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct State {
    space: [u8; 256],
    log: Vec<u8>,
    fail_at: Option<u8>,
}

/// In-memory EC address space with an access log.
///
/// Clones share the same space, so a caller can keep a handle to inspect
/// or change registers after passing one into an [`super::Ec`].
#[derive(Debug, Clone)]
pub struct MemoryIo {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryIo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIo {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                space: [0; 256],
                log: Vec::new(),
                fail_at: None,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn set(&self, offset: u8, value: u8) {
        self.with(|s| s.space[offset as usize] = value);
    }

    /// Write `bytes` at consecutive offsets from `base`.
    pub fn load(&self, base: u8, bytes: &[u8]) {
        self.with(|s| {
            for (i, b) in bytes.iter().enumerate() {
                s.space[base.wrapping_add(i as u8) as usize] = *b;
            }
        });
    }

    /// Make reads of `offset` fail with an I/O error.
    pub fn fail_at(&self, offset: u8) {
        self.with(|s| s.fail_at = Some(offset));
    }

    /// Offsets read so far, in order.
    pub fn access_log(&self) -> Vec<u8> {
        self.with(|s| s.log.clone())
    }
}

impl EcIo for MemoryIo {
    fn read(&mut self, offset: u8) -> Result<u8> {
        self.with(|s| {
            s.log.push(offset);
            if s.fail_at == Some(offset) {
                return Err(Error::EcAccess {
                    path: PathBuf::from("memory"),
                    source: std::io::Error::other(format!("read of 0x{:02X} failed", offset)),
                });
            }
            Ok(s.space[offset as usize])
        })
    }
}
