pub mod battery;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dmi;
pub mod ec;
pub mod error;
pub mod hwmon;
pub mod output;
pub mod platform;
pub mod power_supply;
pub mod sysfs;
