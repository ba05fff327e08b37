use crate::ec::{Channel, SharedEc};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Offset of the fan period byte in ACPI EC RAM.
pub const EC_INDEX_FAN_SPEED: u8 = 0x2E;
/// EC tick rate relating the period byte to revolutions per minute.
pub const EC_FAN_SPEED_MODIFIER: i64 = 245760;
pub const FAN_LABEL: &str = "CPU FAN";
pub const CHIP_NAME: &str = "hp_vendor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Temp,
    In,
    Curr,
    Power,
    Fan,
    Pwm,
}

impl SensorType {
    pub fn prefix(self) -> &'static str {
        match self {
            SensorType::Temp => "temp",
            SensorType::In => "in",
            SensorType::Curr => "curr",
            SensorType::Power => "power",
            SensorType::Fan => "fan",
            SensorType::Pwm => "pwm",
        }
    }

    /// `in` channels are numbered from 0, everything else from 1.
    fn first_index(self) -> usize {
        match self {
            SensorType::In => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Input,
    Label,
    Min,
    Max,
    Target,
}

impl Attribute {
    pub const ALL: [Attribute; 5] = [
        Attribute::Input,
        Attribute::Label,
        Attribute::Min,
        Attribute::Max,
        Attribute::Target,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Attribute::Input => "input",
            Attribute::Label => "label",
            Attribute::Min => "min",
            Attribute::Max => "max",
            Attribute::Target => "target",
        }
    }

    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn is_string(self) -> bool {
        self == Attribute::Label
    }
}

pub const HWMON_F_INPUT: u32 = Attribute::Input.bit();
pub const HWMON_F_LABEL: u32 = Attribute::Label.bit();

/// Read-only permission bits, as a sysfs attribute would carry.
pub const MODE_RO: u16 = 0o444;

/// Attribute masks for every channel of one sensor type; `config[i]` is channel `i`.
#[derive(Debug, Clone, Copy)]
pub struct ChannelInfo {
    pub sensor_type: SensorType,
    pub config: &'static [u32],
}

#[derive(Debug, Clone, Copy)]
pub struct ChipInfo {
    pub name: &'static str,
    pub channels: &'static [ChannelInfo],
}

/// Callbacks a sensor chip provides to the host.
///
/// Combinations the chip does not expose return [`Error::NotSupported`],
/// never a zero value.
pub trait HwmonOps: Send + Sync {
    fn info(&self) -> &ChipInfo;

    /// Permission bits for an attribute, 0 when hidden.
    fn is_visible(&self, sensor_type: SensorType, attr: Attribute, channel: usize) -> u16;

    fn read(&self, sensor_type: SensorType, attr: Attribute, channel: usize) -> Result<i64>;

    fn read_string(
        &self,
        sensor_type: SensorType,
        attr: Attribute,
        channel: usize,
    ) -> Result<&'static str>;
}

/// One attribute file the host materialises for a chip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorAttribute {
    pub name: String,
    pub sensor_type: SensorType,
    pub attr: Attribute,
    pub channel: usize,
    pub mode: u16,
}

impl fmt::Display for SensorAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// `(Fan, Input, 0)` -> `fan1_input`
pub fn attribute_name(sensor_type: SensorType, attr: Attribute, channel: usize) -> String {
    format!(
        "{}{}_{}",
        sensor_type.prefix(),
        channel + sensor_type.first_index(),
        attr.suffix()
    )
}

/// Every attribute declared in the chip's channel info that `is_visible` lets through.
pub fn visible_attributes(ops: &dyn HwmonOps) -> Vec<SensorAttribute> {
    let mut out = Vec::new();
    for info in ops.info().channels {
        for (channel, mask) in info.config.iter().enumerate() {
            for attr in Attribute::ALL {
                if mask & attr.bit() == 0 {
                    continue;
                }
                let mode = ops.is_visible(info.sensor_type, attr, channel);
                if mode == 0 {
                    continue;
                }
                out.push(SensorAttribute {
                    name: attribute_name(info.sensor_type, attr, channel),
                    sensor_type: info.sensor_type,
                    attr,
                    channel,
                    mode,
                });
            }
        }
    }
    out
}

/// Render an attribute the way a sysfs read would: value plus newline.
pub fn show(ops: &dyn HwmonOps, attribute: &SensorAttribute) -> Result<String> {
    if attribute.attr.is_string() {
        let s = ops.read_string(attribute.sensor_type, attribute.attr, attribute.channel)?;
        Ok(format!("{}\n", s))
    } else {
        let v = ops.read(attribute.sensor_type, attribute.attr, attribute.channel)?;
        Ok(format!("{}\n", v))
    }
}

/// Convert the raw fan period byte to RPM. 0x00 and 0xFF mean "no reading".
pub fn decode_fan_speed(raw: u8) -> i64 {
    match raw {
        0x00 | 0xFF => 0,
        r => EC_FAN_SPEED_MODIFIER / r as i64,
    }
}

static FAN_CHANNELS: [ChannelInfo; 1] = [ChannelInfo {
    sensor_type: SensorType::Fan,
    config: &[HWMON_F_INPUT | HWMON_F_LABEL],
}];

pub static FAN_CHIP_INFO: ChipInfo = ChipInfo {
    name: CHIP_NAME,
    channels: &FAN_CHANNELS,
};

/// Single CPU fan, read from ACPI EC RAM on every request.
pub struct FanSensor {
    ec: SharedEc,
}

impl FanSensor {
    pub fn new(ec: SharedEc) -> Self {
        Self { ec }
    }

    pub fn rpm(&self) -> Result<i64> {
        let raw = self.ec.read(Channel::Acpi, EC_INDEX_FAN_SPEED)?;
        let rpm = decode_fan_speed(raw);
        tracing::trace!(raw, rpm, "fan speed");
        Ok(rpm)
    }
}

fn is_cpu_fan(sensor_type: SensorType, channel: usize) -> bool {
    sensor_type == SensorType::Fan && channel == 0
}

impl HwmonOps for FanSensor {
    fn info(&self) -> &ChipInfo {
        &FAN_CHIP_INFO
    }

    fn is_visible(&self, sensor_type: SensorType, _attr: Attribute, channel: usize) -> u16 {
        if is_cpu_fan(sensor_type, channel) {
            MODE_RO
        } else {
            0
        }
    }

    fn read(&self, sensor_type: SensorType, attr: Attribute, channel: usize) -> Result<i64> {
        if is_cpu_fan(sensor_type, channel) && attr == Attribute::Input {
            return self.rpm();
        }
        Err(Error::NotSupported)
    }

    fn read_string(
        &self,
        sensor_type: SensorType,
        attr: Attribute,
        channel: usize,
    ) -> Result<&'static str> {
        if is_cpu_fan(sensor_type, channel) && attr == Attribute::Label {
            return Ok(FAN_LABEL);
        }
        Err(Error::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec::{self, MemoryIo};

    fn fan_with_raw(raw: u8) -> (FanSensor, MemoryIo) {
        let mem = MemoryIo::new();
        mem.set(EC_INDEX_FAN_SPEED, raw);
        (FanSensor::new(ec::shared(mem.clone(), MemoryIo::new())), mem)
    }

    #[test]
    fn test_fan_reads_acpi_channel_only() {
        let acpi = MemoryIo::new();
        let mailbox = MemoryIo::new();
        acpi.set(EC_INDEX_FAN_SPEED, 0x80);
        mailbox.set(EC_INDEX_FAN_SPEED, 0x01);
        let fan = FanSensor::new(ec::shared(acpi.clone(), mailbox.clone()));

        assert_eq!(fan.rpm().unwrap(), 1920);
        assert_eq!(acpi.access_log(), vec![EC_INDEX_FAN_SPEED]);
        assert!(mailbox.access_log().is_empty());
    }

    #[test]
    fn test_decode_all_periods() {
        for r in 1u8..=254 {
            assert_eq!(decode_fan_speed(r), 245760 / r as i64, "raw {}", r);
            assert!(decode_fan_speed(r) >= 0);
        }
    }

    #[test]
    fn test_decode_known_points() {
        assert_eq!(decode_fan_speed(1), 245760);
        assert_eq!(decode_fan_speed(0x80), 1920);
        assert_eq!(decode_fan_speed(100), 2457);
        assert_eq!(decode_fan_speed(254), 967);
    }

    #[test]
    fn test_sentinels_read_as_zero_not_unsupported() {
        for raw in [0x00, 0xFF] {
            let (fan, _) = fan_with_raw(raw);
            assert_eq!(fan.read(SensorType::Fan, Attribute::Input, 0).unwrap(), 0);
        }
    }

    #[test]
    fn test_read_is_not_cached() {
        let (fan, mem) = fan_with_raw(0x80);
        assert_eq!(fan.rpm().unwrap(), 1920);
        mem.set(EC_INDEX_FAN_SPEED, 0x40);
        assert_eq!(fan.rpm().unwrap(), 3840);
        assert_eq!(mem.access_log(), vec![EC_INDEX_FAN_SPEED; 2]);
    }

    #[test]
    fn test_other_channels_unsupported() {
        let (fan, mem) = fan_with_raw(0x80);
        assert!(matches!(
            fan.read(SensorType::Fan, Attribute::Input, 1),
            Err(Error::NotSupported)
        ));
        assert!(matches!(
            fan.read(SensorType::Temp, Attribute::Input, 0),
            Err(Error::NotSupported)
        ));
        assert!(matches!(
            fan.read(SensorType::Fan, Attribute::Max, 0),
            Err(Error::NotSupported)
        ));
        assert!(matches!(
            fan.read_string(SensorType::Pwm, Attribute::Label, 0),
            Err(Error::NotSupported)
        ));
        assert!(matches!(
            fan.read_string(SensorType::Fan, Attribute::Input, 0),
            Err(Error::NotSupported)
        ));
        // Unsupported requests never touch the EC.
        assert!(mem.access_log().is_empty());
    }

    #[test]
    fn test_visibility() {
        let (fan, _) = fan_with_raw(0);
        assert_eq!(fan.is_visible(SensorType::Fan, Attribute::Input, 0), 0o444);
        assert_eq!(fan.is_visible(SensorType::Fan, Attribute::Label, 0), 0o444);
        assert_eq!(fan.is_visible(SensorType::Fan, Attribute::Input, 1), 0);
        assert_eq!(fan.is_visible(SensorType::Temp, Attribute::Input, 0), 0);
    }

    #[test]
    fn test_label() {
        let (fan, _) = fan_with_raw(0);
        assert_eq!(
            fan.read_string(SensorType::Fan, Attribute::Label, 0).unwrap(),
            "CPU FAN"
        );
    }

    #[test]
    fn test_visible_attributes() {
        let (fan, _) = fan_with_raw(0);
        let names: Vec<String> = visible_attributes(&fan)
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["fan1_input", "fan1_label"]);
    }

    #[test]
    fn test_show() {
        let (fan, _) = fan_with_raw(0x80);
        let attrs = visible_attributes(&fan);
        assert_eq!(show(&fan, &attrs[0]).unwrap(), "1920\n");
        assert_eq!(show(&fan, &attrs[1]).unwrap(), "CPU FAN\n");
    }

    #[test]
    fn test_attribute_name() {
        assert_eq!(attribute_name(SensorType::Fan, Attribute::Input, 0), "fan1_input");
        assert_eq!(attribute_name(SensorType::Temp, Attribute::Label, 2), "temp3_label");
        assert_eq!(attribute_name(SensorType::In, Attribute::Input, 0), "in0_input");
    }
}
