use crate::battery::BATTERY_NAME;
use crate::cli::{print_completions, Cli, Command};
use crate::config::{self, Config};
use crate::dmi::{self, DmiInfo};
use crate::ec;
use crate::error::Error;
use crate::hwmon::{self, Attribute, SensorType};
use crate::output::{self, SensorReport};
use crate::platform::{HpVendor, InitOptions, Registry};
use crate::sysfs::SysfsRoot;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

/// Load configuration and dispatch one subcommand.
pub fn run(cli: Cli) -> Result<()> {
    let config = config::load(cli.config.as_ref());
    let sysfs = SysfsRoot::new(&cli.root);

    match cli.command {
        Command::Detect => cmd_detect(&sysfs, cli.json),
        Command::Fan => cmd_fan(&sysfs, &config, cli.json)?,
        Command::Battery => cmd_battery(&sysfs, &config, cli.json)?,
        Command::Sensors => cmd_sensors(&sysfs, &config, cli.json)?,
        Command::Completions { shell } => print_completions(shell),
    }

    Ok(())
}

/// Register the driver against an in-process registry, run `f`, tear down.
///
/// `Ok(None)` when the platform is not supported.
fn with_driver<T>(
    sysfs: &SysfsRoot,
    config: &Config,
    f: impl FnOnce(&Registry, &DmiInfo) -> Result<T>,
) -> Result<Option<T>> {
    let firmware = DmiInfo::detect(sysfs);
    let mut registry = Registry::new(sysfs.clone());

    if sysfs.root() == Path::new("/")
        && dmi::is_supported(&firmware)
        && !nix::unistd::geteuid().is_root()
    {
        anyhow::bail!("Must run as root to access the embedded controller: sudo hp-vendor");
    }

    let init = HpVendor::init(&mut registry, &firmware, InitOptions::from(config), || {
        ec::open(sysfs)
    });
    let mut driver = match init {
        Ok(driver) => driver,
        Err(Error::NoDevice) => return Ok(None),
        Err(e) => return Err(e).context("failed to initialize the embedded controller"),
    };

    let result = f(&registry, &firmware);
    driver.exit(&mut registry);
    result.map(Some)
}

fn print_unsupported(sysfs: &SysfsRoot) {
    let firmware = DmiInfo::detect(sysfs);
    println!(
        "  {} This system does not need this driver ({} {}).",
        "Note:".yellow(),
        firmware.board_vendor.as_deref().unwrap_or("Unknown"),
        firmware.board_name.as_deref().unwrap_or("")
    );
}

fn cmd_detect(sysfs: &SysfsRoot, json: bool) {
    let firmware = DmiInfo::detect(sysfs);
    if json {
        output::print_detect_json(&firmware);
    } else {
        output::print_detect(&firmware);
    }
}

fn cmd_fan(sysfs: &SysfsRoot, config: &Config, json: bool) -> Result<()> {
    let reading = with_driver(sysfs, config, |registry, _| {
        let chips = registry.hwmon_chips();
        let (_, _, _, ops) = chips
            .into_iter()
            .find(|(_, name, _, _)| name == hwmon::CHIP_NAME)
            .context("fan chip not registered")?;
        let rpm = ops.read(SensorType::Fan, Attribute::Input, 0)?;
        let label = ops.read_string(SensorType::Fan, Attribute::Label, 0)?;
        Ok((label, rpm))
    })?;

    let Some((label, rpm)) = reading else {
        anyhow::bail!("Unsupported platform. Run `hp-vendor detect` for details.");
    };

    if json {
        output::print_json(&serde_json::json!({ "label": label, "rpm": rpm }));
    } else {
        println!("{}: {} RPM", label.bold(), rpm);
    }
    Ok(())
}

fn cmd_battery(sysfs: &SysfsRoot, config: &Config, json: bool) -> Result<()> {
    if !config.battery.enabled {
        anyhow::bail!("Battery support is disabled in the configuration.");
    }

    let reading = with_driver(sysfs, config, |registry, _| {
        let attrs = registry.battery_attributes(BATTERY_NAME);
        let attr = attrs
            .iter()
            .find(|a| a.name() == "battery_ct_number")
            .with_context(|| format!("no {} power supply found", BATTERY_NAME))?;
        let bytes = attr.show()?;
        Ok(String::from_utf8_lossy(&bytes).trim_end_matches('\n').to_string())
    })?;

    let Some(ct_number) = reading else {
        anyhow::bail!("Unsupported platform. Run `hp-vendor detect` for details.");
    };

    if json {
        output::print_json(&serde_json::json!({
            "battery": BATTERY_NAME,
            "ct_number": ct_number,
        }));
    } else {
        println!("{}: {}", "CT number".bold(), ct_number);
    }
    Ok(())
}

/// An unsupported machine is not an error here: print a note and succeed.
fn cmd_sensors(sysfs: &SysfsRoot, config: &Config, json: bool) -> Result<()> {
    let report = with_driver(sysfs, config, |registry, firmware| {
        Ok(SensorReport::collect(registry, firmware))
    })?;

    match report {
        Some(report) if json => output::print_json(&report),
        Some(report) => output::print_report(&report),
        None if json => output::print_json(&serde_json::json!({ "supported": false })),
        None => print_unsupported(sysfs),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    fn write_dmi(root: &Path, vendor: &str, board: &str) {
        let dmi = root.join("sys/class/dmi/id");
        fs::create_dir_all(&dmi).unwrap();
        fs::write(dmi.join("board_vendor"), format!("{}\n", vendor)).unwrap();
        fs::write(dmi.join("board_name"), format!("{}\n", board)).unwrap();
    }

    fn write_battery(root: &Path, name: &str) {
        let bat = root.join("sys/class/power_supply").join(name);
        fs::create_dir_all(&bat).unwrap();
        fs::write(bat.join("type"), "Battery\n").unwrap();
    }

    fn write_ec(root: &Path) {
        let ec0 = root.join("sys/kernel/debug/ec/ec0");
        fs::create_dir_all(&ec0).unwrap();
        let mut space = [0u8; 256];
        space[hwmon::EC_INDEX_FAN_SPEED as usize] = 0x80;
        fs::write(ec0.join("io"), space).unwrap();

        fs::create_dir_all(root.join("dev")).unwrap();
        let mut image = vec![0u8; 0x202];
        image[0x201] = b'A';
        fs::write(root.join("dev/port"), &image).unwrap();
    }

    fn dev_one(batteries: &[&str]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        write_dmi(tmp.path(), "HP", "8A78");
        for b in batteries {
            write_battery(tmp.path(), b);
        }
        write_ec(tmp.path());
        tmp
    }

    fn other_laptop() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        write_dmi(tmp.path(), "Framework", "FRANMDCP16");
        write_battery(tmp.path(), "BAT0");
        tmp
    }

    #[test]
    fn test_unsupported_sensors_succeeds() {
        let tmp = other_laptop();
        let sysfs = SysfsRoot::new(tmp.path());
        let config = Config::default();

        assert!(cmd_sensors(&sysfs, &config, false).is_ok());
        assert!(cmd_sensors(&sysfs, &config, true).is_ok());
    }

    #[test]
    fn test_unsupported_fan_and_battery_fail() {
        let tmp = other_laptop();
        let sysfs = SysfsRoot::new(tmp.path());
        let config = Config::default();

        let err = cmd_fan(&sysfs, &config, false).unwrap_err();
        assert!(err.to_string().contains("Unsupported platform"));
        let err = cmd_battery(&sysfs, &config, true).unwrap_err();
        assert!(err.to_string().contains("Unsupported platform"));
    }

    #[test]
    fn test_supported_commands_succeed() {
        let tmp = dev_one(&["BATT"]);
        let sysfs = SysfsRoot::new(tmp.path());
        let config = Config::default();

        assert!(cmd_fan(&sysfs, &config, false).is_ok());
        assert!(cmd_fan(&sysfs, &config, true).is_ok());
        assert!(cmd_battery(&sysfs, &config, false).is_ok());
        assert!(cmd_sensors(&sysfs, &config, true).is_ok());
    }

    #[test]
    fn test_battery_without_batt_fails() {
        let tmp = dev_one(&["BAT0"]);
        let sysfs = SysfsRoot::new(tmp.path());

        let err = cmd_battery(&sysfs, &Config::default(), false).unwrap_err();
        assert!(err.to_string().contains("no BATT power supply found"));
        // The fan chip does not depend on the battery.
        assert!(cmd_fan(&sysfs, &Config::default(), false).is_ok());
    }

    #[test]
    fn test_battery_disabled_fails() {
        let tmp = dev_one(&["BATT"]);
        let sysfs = SysfsRoot::new(tmp.path());
        let mut config = Config::default();
        config.battery.enabled = false;

        let err = cmd_battery(&sysfs, &config, false).unwrap_err();
        assert!(err.to_string().contains("disabled"));
        assert!(cmd_sensors(&sysfs, &config, false).is_ok());
    }

    #[test]
    fn test_missing_ec_fails_on_supported_machine() {
        let tmp = dev_one(&["BATT"]);
        fs::remove_file(tmp.path().join("sys/kernel/debug/ec/ec0/io")).unwrap();
        let sysfs = SysfsRoot::new(tmp.path());

        // Supported hardware with no EC access is a hard error, even for sensors.
        assert!(cmd_sensors(&sysfs, &Config::default(), false).is_err());
        assert!(cmd_fan(&sysfs, &Config::default(), false).is_err());
    }

    #[test]
    fn test_run_dispatches_with_root() {
        let tmp = other_laptop();
        let root = tmp.path().to_str().unwrap();
        let missing_config = tmp.path().join("none.toml");
        let missing_config = missing_config.to_str().unwrap();

        let cli = Cli::parse_from(["hp-vendor", "--root", root, "--config", missing_config, "sensors"]);
        assert!(run(cli).is_ok());

        let cli = Cli::parse_from(["hp-vendor", "--root", root, "--config", missing_config, "fan"]);
        assert!(run(cli).is_err());

        let cli = Cli::parse_from(["hp-vendor", "--root", root, "detect", "--json"]);
        assert!(run(cli).is_ok());
    }
}
