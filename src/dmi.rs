use crate::sysfs::SysfsRoot;
use serde::Serialize;

/// Firmware identity strings as reported under `/sys/class/dmi/id`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DmiInfo {
    pub board_vendor: Option<String>,
    pub board_name: Option<String>,
    pub product_name: Option<String>,
    pub bios_version: Option<String>,
}

impl DmiInfo {
    pub fn detect(sysfs: &SysfsRoot) -> Self {
        Self {
            board_vendor: sysfs.read_optional("sys/class/dmi/id/board_vendor").unwrap_or(None),
            board_name: sysfs.read_optional("sys/class/dmi/id/board_name").unwrap_or(None),
            product_name: sysfs.read_optional("sys/class/dmi/id/product_name").unwrap_or(None),
            bios_version: sysfs.read_optional("sys/class/dmi/id/bios_version").unwrap_or(None),
        }
    }
}

/// One supported machine, matched on exact board vendor and board name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDescriptor {
    pub ident: &'static str,
    pub board_vendor: &'static str,
    pub board_name: &'static str,
}

impl PlatformDescriptor {
    pub fn matches(&self, dmi: &DmiInfo) -> bool {
        dmi.board_vendor.as_deref() == Some(self.board_vendor)
            && dmi.board_name.as_deref() == Some(self.board_name)
    }
}

pub const SUPPORTED_PLATFORMS: &[PlatformDescriptor] = &[PlatformDescriptor {
    ident: "HP Dev One",
    board_vendor: "HP",
    board_name: "8A78",
}];

/// First table entry matching the live firmware identity.
pub fn check_system(dmi: &DmiInfo) -> Option<&'static PlatformDescriptor> {
    check_system_in(SUPPORTED_PLATFORMS, dmi)
}

pub fn check_system_in<'a>(
    table: &'a [PlatformDescriptor],
    dmi: &DmiInfo,
) -> Option<&'a PlatformDescriptor> {
    table.iter().find(|p| p.matches(dmi))
}

pub fn is_supported(dmi: &DmiInfo) -> bool {
    check_system(dmi).is_some()
}
