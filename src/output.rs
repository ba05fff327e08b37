use crate::dmi::{self, DmiInfo};
use crate::hwmon;
use crate::platform::Registry;
use crate::power_supply::{self, PowerSupply};
use colored::Colorize;
use serde::Serialize;

const LABEL_W: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct AttributeValue {
    pub name: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttributeValue {
    fn from_result(name: &str, mode: u16, result: crate::error::Result<String>) -> Self {
        let (value, error) = match result {
            Ok(v) => (Some(v.trim_end_matches('\n').to_string()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            name: name.to_string(),
            mode: format!("{:04o}", mode),
            value,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChipReport {
    pub device: String,
    pub name: String,
    pub parent: String,
    pub attributes: Vec<AttributeValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatteryReport {
    pub name: String,
    pub status: Option<String>,
    pub capacity_percent: Option<u32>,
    pub attributes: Vec<AttributeValue>,
}

/// Everything the driver exposes, read once.
#[derive(Debug, Clone, Serialize)]
pub struct SensorReport {
    pub timestamp: String,
    pub dmi: DmiInfo,
    pub platform: Option<String>,
    pub hwmon: Vec<ChipReport>,
    pub batteries: Vec<BatteryReport>,
    pub ac_online: Option<bool>,
}

impl SensorReport {
    pub fn collect(registry: &Registry, firmware: &DmiInfo) -> Self {
        let hwmon = registry
            .hwmon_chips()
            .into_iter()
            .map(|(device, name, parent, ops)| {
                let attributes = hwmon::visible_attributes(ops.as_ref())
                    .iter()
                    .map(|a| AttributeValue::from_result(&a.name, a.mode, hwmon::show(ops.as_ref(), a)))
                    .collect();
                ChipReport {
                    device,
                    name,
                    parent,
                    attributes,
                }
            })
            .collect();

        let supplies = PowerSupply::detect_all(registry.sysfs());
        let batteries = registry
            .bound_batteries()
            .into_iter()
            .map(|battery| {
                let live = PowerSupply::detect(registry.sysfs(), &battery.name);
                let attributes = registry
                    .battery_attributes(&battery.name)
                    .iter()
                    .map(|a| {
                        let shown = a
                            .show()
                            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
                        AttributeValue::from_result(a.name(), a.mode(), shown)
                    })
                    .collect();
                BatteryReport {
                    name: battery.name.clone(),
                    status: live.status,
                    capacity_percent: live.capacity_percent,
                    attributes,
                }
            })
            .collect();

        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            dmi: firmware.clone(),
            platform: dmi::check_system(firmware).map(|p| p.ident.to_string()),
            hwmon,
            batteries,
            ac_online: power_supply::ac_online(&supplies),
        }
    }
}

fn row(indent: &str, label: &str, value: impl std::fmt::Display) {
    let padded = format!("{:<w$}", label, w = LABEL_W);
    println!("{}{}{}", indent, padded.dimmed(), value);
}

pub fn print_detect(firmware: &DmiInfo) {
    let board = format!(
        "{} {}",
        firmware.board_vendor.as_deref().unwrap_or("Unknown"),
        firmware.board_name.as_deref().unwrap_or("")
    );
    row("  ", "Board", board);
    row(
        "  ",
        "Product",
        firmware.product_name.as_deref().unwrap_or("Unknown"),
    );
    match dmi::check_system(firmware) {
        Some(p) => row("  ", "Supported", p.ident.green()),
        None => row("  ", "Supported", "no".yellow()),
    }
}

pub fn print_detect_json(firmware: &DmiInfo) {
    let output = serde_json::json!({
        "board_vendor": firmware.board_vendor,
        "board_name": firmware.board_name,
        "product_name": firmware.product_name,
        "bios_version": firmware.bios_version,
        "supported": dmi::is_supported(firmware),
        "platform": dmi::check_system(firmware).map(|p| p.ident),
    });
    print_json(&output);
}

fn print_attributes(attributes: &[AttributeValue]) {
    for a in attributes {
        let value = match (&a.value, &a.error) {
            (Some(v), _) => v.normal(),
            (None, Some(e)) => e.red(),
            (None, None) => "".normal(),
        };
        row("    ", &a.name, value);
    }
}

pub fn print_report(report: &SensorReport) {
    let title = report.platform.as_deref().unwrap_or("Unknown platform");
    println!("── {} {}", title.bold(), "─".repeat(48usize.saturating_sub(title.len())));

    for chip in &report.hwmon {
        println!("  {} ({})", chip.device.cyan(), chip.name);
        print_attributes(&chip.attributes);
    }

    for battery in &report.batteries {
        let status = battery.status.as_deref().unwrap_or("Unknown");
        let capacity = battery
            .capacity_percent
            .map(|c| format!(", {}%", c))
            .unwrap_or_default();
        println!("  {} ({}{})", battery.name.cyan(), status, capacity);
        print_attributes(&battery.attributes);
    }

    let ac = match report.ac_online {
        Some(true) => "online".green(),
        Some(false) => "offline".yellow(),
        None => "N/A".dimmed(),
    };
    row("  ", "AC adapter", ac);
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => tracing::error!("failed to serialize output: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_attribute_value_strips_newline() {
        let v = AttributeValue::from_result("fan1_input", 0o444, Ok("1920\n".into()));
        assert_eq!(v.value.as_deref(), Some("1920"));
        assert_eq!(v.mode, "0444");
        assert!(v.error.is_none());
    }

    #[test]
    fn test_attribute_value_error() {
        let v = AttributeValue::from_result("fan1_input", 0o444, Err(Error::NotSupported));
        assert!(v.value.is_none());
        assert_eq!(v.error.as_deref(), Some("operation not supported"));

        let json = serde_json::to_value(&v).unwrap();
        assert!(json.get("value").is_none());
        assert_eq!(json["error"], "operation not supported");
    }
}
