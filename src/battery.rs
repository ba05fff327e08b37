use crate::ec::{Channel, SharedEc};
use crate::error::{Error, Result};
use crate::power_supply::PowerSupply;
use std::fmt;
use std::sync::Arc;

/// First mailbox offset of the CT number.
pub const EC_MAILBOX_INDEX_CT_NUMBER: u8 = 0xA1;
pub const CT_NUMBER_LEN: usize = 14;
/// The only battery this platform has.
pub const BATTERY_NAME: &str = "BATT";
pub const HOOK_NAME: &str = "HP Vendor Battery Extension";

/// Raw CT number bytes followed by a newline, exactly as the EC reported them.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CtNumber {
    buf: [u8; CT_NUMBER_LEN + 1],
}

impl CtNumber {
    fn from_payload(payload: [u8; CT_NUMBER_LEN]) -> Self {
        let mut buf = [0u8; CT_NUMBER_LEN + 1];
        buf[..CT_NUMBER_LEN].copy_from_slice(&payload);
        buf[CT_NUMBER_LEN] = b'\n';
        Self { buf }
    }

    /// The 14 payload bytes and the trailing newline.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[..CT_NUMBER_LEN]
    }

    /// Payload as text, invalid UTF-8 replaced.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.payload()).into_owned()
    }
}

impl fmt::Debug for CtNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CtNumber({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for CtNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// Read the CT number through the EC mailbox, one read per byte in ascending
/// order. Never cached.
pub fn read_ct_number(ec: &SharedEc) -> Result<CtNumber> {
    let mut payload = [0u8; CT_NUMBER_LEN];
    ec.read_run(Channel::Mailbox, EC_MAILBOX_INDEX_CT_NUMBER, &mut payload)?;
    Ok(CtNumber::from_payload(payload))
}

/// A read-only attribute a hook hangs off a device.
pub trait DeviceAttribute: Send + Sync {
    fn name(&self) -> &str;

    fn mode(&self) -> u16 {
        0o444
    }

    /// Bytes a read of the attribute file returns.
    fn show(&self) -> Result<Vec<u8>>;
}

pub type AttributeGroup = Vec<Arc<dyn DeviceAttribute>>;

/// Extra attributes for power-supply devices whose name passes [`BatteryHook::matches`].
pub trait BatteryHook: Send + Sync {
    fn name(&self) -> &str;

    fn matches(&self, battery: &PowerSupply) -> bool;

    /// Attributes to attach to `battery`, or [`Error::NoDevice`] when it is not ours.
    fn add_battery(&self, battery: &PowerSupply) -> Result<AttributeGroup>;

    /// Called before the host drops the attributes. Safe for batteries never added.
    fn remove_battery(&self, battery: &PowerSupply);
}

pub struct CtNumberAttribute {
    ec: SharedEc,
}

impl DeviceAttribute for CtNumberAttribute {
    fn name(&self) -> &str {
        "battery_ct_number"
    }

    fn show(&self) -> Result<Vec<u8>> {
        Ok(read_ct_number(&self.ec)?.as_bytes().to_vec())
    }
}

pub struct HpBatteryHook {
    ec: SharedEc,
}

impl HpBatteryHook {
    pub fn new(ec: SharedEc) -> Self {
        Self { ec }
    }
}

impl BatteryHook for HpBatteryHook {
    fn name(&self) -> &str {
        HOOK_NAME
    }

    fn matches(&self, battery: &PowerSupply) -> bool {
        battery.name == BATTERY_NAME
    }

    fn add_battery(&self, battery: &PowerSupply) -> Result<AttributeGroup> {
        if !self.matches(battery) {
            return Err(Error::NoDevice);
        }
        tracing::debug!(battery = %battery.name, "attaching battery_ct_number");
        Ok(vec![Arc::new(CtNumberAttribute {
            ec: Arc::clone(&self.ec),
        })])
    }

    fn remove_battery(&self, battery: &PowerSupply) {
        tracing::debug!(battery = %battery.name, "detaching battery attributes");
    }
}
