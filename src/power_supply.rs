use crate::sysfs::SysfsRoot;
use serde::Serialize;

const PS_BASE: &str = "sys/class/power_supply";

/// One entry under `/sys/class/power_supply`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PowerSupply {
    pub name: String,
    pub supply_type: Option<String>,
    pub present: Option<bool>,
    pub online: Option<bool>,
    pub status: Option<String>,
    pub capacity_percent: Option<u32>,
}

impl PowerSupply {
    /// Build a supply by name, without touching sysfs.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn detect(sysfs: &SysfsRoot, name: &str) -> Self {
        let base = format!("{}/{}", PS_BASE, name);
        let flag = |attr: &str| {
            sysfs
                .read_optional(format!("{}/{}", base, attr))
                .unwrap_or(None)
                .map(|v| v == "1")
        };

        Self {
            name: name.to_string(),
            supply_type: sysfs.read_optional(format!("{}/type", base)).unwrap_or(None),
            present: flag("present"),
            online: flag("online"),
            status: sysfs.read_optional(format!("{}/status", base)).unwrap_or(None),
            capacity_percent: sysfs
                .read_optional(format!("{}/capacity", base))
                .unwrap_or(None)
                .and_then(|v| v.parse().ok()),
        }
    }

    /// All supplies, sorted by name. A missing class directory means none.
    pub fn detect_all(sysfs: &SysfsRoot) -> Vec<Self> {
        match sysfs.list_dir(PS_BASE) {
            Ok(entries) => entries.iter().map(|n| Self::detect(sysfs, n)).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn is_battery(&self) -> bool {
        self.supply_type.as_deref() == Some("Battery")
    }

    pub fn is_mains(&self) -> bool {
        self.supply_type.as_deref() == Some("Mains")
    }
}

/// Whether the first mains adapter reports online. None without an adapter.
pub fn ac_online(supplies: &[PowerSupply]) -> Option<bool> {
    supplies.iter().find(|s| s.is_mains()).and_then(|s| s.online)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture(root: &std::path::Path) {
        let bat = root.join("sys/class/power_supply/BATT");
        fs::create_dir_all(&bat).unwrap();
        fs::write(bat.join("type"), "Battery\n").unwrap();
        fs::write(bat.join("present"), "1\n").unwrap();
        fs::write(bat.join("status"), "Charging\n").unwrap();
        fs::write(bat.join("capacity"), "81\n").unwrap();

        let ac = root.join("sys/class/power_supply/ACAD");
        fs::create_dir_all(&ac).unwrap();
        fs::write(ac.join("type"), "Mains\n").unwrap();
        fs::write(ac.join("online"), "1\n").unwrap();
    }

    #[test]
    fn test_detect_all() {
        let tmp = tempfile::tempdir().unwrap();
        fixture(tmp.path());
        let supplies = PowerSupply::detect_all(&SysfsRoot::new(tmp.path()));

        assert_eq!(supplies.len(), 2);
        assert_eq!(supplies[0].name, "ACAD");
        assert!(supplies[0].is_mains());
        let batt = &supplies[1];
        assert!(batt.is_battery());
        assert_eq!(batt.present, Some(true));
        assert_eq!(batt.status.as_deref(), Some("Charging"));
        assert_eq!(batt.capacity_percent, Some(81));
        assert_eq!(batt.online, None);
        assert_eq!(ac_online(&supplies), Some(true));
    }

    #[test]
    fn test_no_class_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let supplies = PowerSupply::detect_all(&SysfsRoot::new(tmp.path()));
        assert!(supplies.is_empty());
        assert_eq!(ac_online(&supplies), None);
    }
}
