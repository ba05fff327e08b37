use crate::battery::{AttributeGroup, BatteryHook, DeviceAttribute, HpBatteryHook};
use crate::config::Config;
use crate::dmi::{self, DmiInfo};
use crate::ec::SharedEc;
use crate::error::{Error, Result};
use crate::hwmon::{self, FanSensor, HwmonOps};
use crate::power_supply::PowerSupply;
use crate::sysfs::SysfsRoot;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DRIVER_NAME: &str = "hp_vendor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeviceId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HwmonId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HookId(u64);

/// Registration services the driver consumes.
pub trait Host {
    fn register_platform_device(&mut self, name: &str) -> Result<DeviceId>;
    fn unregister_platform_device(&mut self, id: DeviceId);

    fn register_hwmon(
        &mut self,
        parent: DeviceId,
        name: &str,
        ops: Arc<dyn HwmonOps>,
    ) -> Result<HwmonId>;
    fn unregister_hwmon(&mut self, id: HwmonId);

    fn register_battery_hook(&mut self, hook: Arc<dyn BatteryHook>) -> Result<HookId>;
    fn unregister_battery_hook(&mut self, id: HookId);
}

#[derive(Debug, Clone, Copy)]
pub struct InitOptions {
    pub battery: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self { battery: true }
    }
}

impl From<&Config> for InitOptions {
    fn from(config: &Config) -> Self {
        Self {
            battery: config.battery.enabled,
        }
    }
}

/// Everything a successful [`HpVendor::init`] registered.
///
/// The driver lifecycle: `init` binds the fan chip and battery hook into a
/// [`Host`], `exit` tears them down again.
#[derive(Debug, Default)]
pub struct HpVendor {
    platform: Option<DeviceId>,
    hwmon: Option<HwmonId>,
    hook: Option<HookId>,
}

impl HpVendor {
    /// Check the platform, open the EC and register with `host`.
    ///
    /// Returns [`Error::NoDevice`] on unsupported hardware before anything
    /// is opened or registered. A registration failure unwinds whatever
    /// was already registered.
    pub fn init<H, F>(
        host: &mut H,
        firmware: &DmiInfo,
        options: InitOptions,
        open_ec: F,
    ) -> Result<Self>
    where
        H: Host + ?Sized,
        F: FnOnce() -> Result<SharedEc>,
    {
        match dmi::check_system(firmware) {
            Some(platform) => info!("Found supported system: {}", platform.ident),
            None => {
                info!("System does not need this driver");
                return Err(Error::NoDevice);
            }
        }

        let ec = open_ec()?;

        let mut this = HpVendor::default();
        if let Err(e) = this.register(host, ec, options) {
            this.exit(host);
            return Err(e);
        }
        Ok(this)
    }

    fn register<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        ec: SharedEc,
        options: InitOptions,
    ) -> Result<()> {
        let device = host.register_platform_device(DRIVER_NAME)?;
        self.platform = Some(device);

        let fan: Arc<dyn HwmonOps> = Arc::new(FanSensor::new(Arc::clone(&ec)));
        self.hwmon = Some(host.register_hwmon(device, hwmon::CHIP_NAME, fan)?);

        if options.battery {
            self.hook = Some(host.register_battery_hook(Arc::new(HpBatteryHook::new(ec)))?);
        }
        Ok(())
    }

    /// Unregister in reverse order. Calling it again is a no-op.
    pub fn exit<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(hook) = self.hook.take() {
            host.unregister_battery_hook(hook);
        }
        if let Some(hwmon) = self.hwmon.take() {
            host.unregister_hwmon(hwmon);
        }
        if let Some(device) = self.platform.take() {
            host.unregister_platform_device(device);
        }
    }

    pub fn is_registered(&self) -> bool {
        self.platform.is_some()
    }

    pub fn has_battery_hook(&self) -> bool {
        self.hook.is_some()
    }
}

/// Which registration [`Registry`] should reject next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    PlatformDevice,
    Hwmon,
    BatteryHook,
}

/// A host registration or removal, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PlatformRegistered(String),
    PlatformUnregistered(String),
    HwmonRegistered(String),
    HwmonUnregistered(String),
    HookRegistered(String),
    HookUnregistered(String),
    BatteryBound { hook: String, battery: String },
    BatteryUnbound { hook: String, battery: String },
}

struct Chip {
    name: String,
    parent: DeviceId,
    index: usize,
    ops: Arc<dyn HwmonOps>,
}

struct Binding {
    hook: HookId,
    battery: PowerSupply,
    group: AttributeGroup,
}

/// In-process host that keeps registrations in memory, discovering
/// batteries from `sys/class/power_supply`.
pub struct Registry {
    sysfs: SysfsRoot,
    next_id: u64,
    next_hwmon_index: usize,
    devices: BTreeMap<DeviceId, String>,
    chips: BTreeMap<HwmonId, Chip>,
    hooks: BTreeMap<HookId, Arc<dyn BatteryHook>>,
    batteries: Vec<PowerSupply>,
    bindings: Vec<Binding>,
    fail: Option<FailPoint>,
    events: Vec<Event>,
}

impl Registry {
    pub fn new(sysfs: SysfsRoot) -> Self {
        let batteries = PowerSupply::detect_all(&sysfs)
            .into_iter()
            .filter(PowerSupply::is_battery)
            .collect();
        Self {
            sysfs,
            next_id: 1,
            next_hwmon_index: 0,
            devices: BTreeMap::new(),
            chips: BTreeMap::new(),
            hooks: BTreeMap::new(),
            batteries,
            bindings: Vec::new(),
            fail: None,
            events: Vec::new(),
        }
    }

    pub fn sysfs(&self) -> &SysfsRoot {
        &self.sysfs
    }

    /// Reject the next registration at `point`.
    pub fn fail_next(&mut self, point: FailPoint) {
        self.fail = Some(point);
    }

    fn check_fail(&mut self, point: FailPoint) -> Result<()> {
        if self.fail == Some(point) {
            self.fail = None;
            return Err(Error::Registration(format!("{:?} rejected", point)));
        }
        Ok(())
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn hook_name(&self, id: HookId) -> String {
        self.hooks
            .get(&id)
            .map(|h| h.name().to_string())
            .unwrap_or_default()
    }

    /// Offer `battery` to one hook. Not-applicable errors mean "skip".
    fn bind(&mut self, id: HookId, battery: &PowerSupply) -> Result<()> {
        let Some(hook) = self.hooks.get(&id).cloned() else {
            return Ok(());
        };
        match hook.add_battery(battery) {
            Ok(group) => {
                self.events.push(Event::BatteryBound {
                    hook: hook.name().to_string(),
                    battery: battery.name.clone(),
                });
                self.bindings.push(Binding {
                    hook: id,
                    battery: battery.clone(),
                    group,
                });
                Ok(())
            }
            Err(e) if e.is_not_applicable() => {
                debug!(hook = hook.name(), battery = %battery.name, "battery not handled by hook");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn unbind_where(&mut self, pred: impl Fn(&Binding) -> bool) {
        let (gone, kept): (Vec<_>, Vec<_>) = self.bindings.drain(..).partition(|b| pred(b));
        self.bindings = kept;
        for binding in gone {
            let name = self.hook_name(binding.hook);
            if let Some(hook) = self.hooks.get(&binding.hook) {
                hook.remove_battery(&binding.battery);
            }
            self.events.push(Event::BatteryUnbound {
                hook: name,
                battery: binding.battery.name.clone(),
            });
        }
    }

    /// A battery appeared: offer it to every registered hook.
    pub fn add_battery(&mut self, battery: PowerSupply) {
        let ids: Vec<HookId> = self.hooks.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.bind(id, &battery) {
                warn!("extension failed to load for {}: {}", battery.name, e);
            }
        }
        self.batteries.push(battery);
    }

    /// A battery went away: detach every hook's attributes from it.
    pub fn remove_battery(&mut self, name: &str) {
        self.unbind_where(|b| b.battery.name == name);
        self.batteries.retain(|b| b.name != name);
    }

    pub fn platform_device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn hwmon_count(&self) -> usize {
        self.chips.len()
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Nothing left registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
            && self.chips.is_empty()
            && self.hooks.is_empty()
            && self.bindings.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Registered chips as `(hwmonN, chip name, parent device name, ops)`.
    pub fn hwmon_chips(&self) -> Vec<(String, String, String, Arc<dyn HwmonOps>)> {
        self.chips
            .values()
            .map(|c| {
                (
                    format!("hwmon{}", c.index),
                    c.name.clone(),
                    self.devices.get(&c.parent).cloned().unwrap_or_default(),
                    Arc::clone(&c.ops),
                )
            })
            .collect()
    }

    /// Attributes attached to the named battery by any hook.
    pub fn battery_attributes(&self, battery: &str) -> Vec<Arc<dyn DeviceAttribute>> {
        self.bindings
            .iter()
            .filter(|b| b.battery.name == battery)
            .flat_map(|b| b.group.iter().cloned())
            .collect()
    }

    /// Batteries that currently carry extra attributes.
    pub fn bound_batteries(&self) -> Vec<&PowerSupply> {
        let mut out: Vec<&PowerSupply> = Vec::new();
        for b in &self.bindings {
            if !out.iter().any(|p| p.name == b.battery.name) {
                out.push(&b.battery);
            }
        }
        out
    }
}

impl Host for Registry {
    fn register_platform_device(&mut self, name: &str) -> Result<DeviceId> {
        self.check_fail(FailPoint::PlatformDevice)?;
        let id = DeviceId(self.alloc_id());
        self.devices.insert(id, name.to_string());
        self.events.push(Event::PlatformRegistered(name.to_string()));
        Ok(id)
    }

    fn unregister_platform_device(&mut self, id: DeviceId) {
        // Children go with their parent.
        let orphans: Vec<HwmonId> = self
            .chips
            .iter()
            .filter(|(_, c)| c.parent == id)
            .map(|(k, _)| *k)
            .collect();
        for chip in orphans {
            self.unregister_hwmon(chip);
        }
        if let Some(name) = self.devices.remove(&id) {
            self.events.push(Event::PlatformUnregistered(name));
        }
    }

    fn register_hwmon(
        &mut self,
        parent: DeviceId,
        name: &str,
        ops: Arc<dyn HwmonOps>,
    ) -> Result<HwmonId> {
        self.check_fail(FailPoint::Hwmon)?;
        if !self.devices.contains_key(&parent) {
            return Err(Error::Registration(format!("hwmon {} has no parent device", name)));
        }
        let id = HwmonId(self.alloc_id());
        let index = self.next_hwmon_index;
        self.next_hwmon_index += 1;
        self.chips.insert(
            id,
            Chip {
                name: name.to_string(),
                parent,
                index,
                ops,
            },
        );
        self.events.push(Event::HwmonRegistered(name.to_string()));
        Ok(id)
    }

    fn unregister_hwmon(&mut self, id: HwmonId) {
        if let Some(chip) = self.chips.remove(&id) {
            self.events.push(Event::HwmonUnregistered(chip.name));
        }
    }

    fn register_battery_hook(&mut self, hook: Arc<dyn BatteryHook>) -> Result<HookId> {
        self.check_fail(FailPoint::BatteryHook)?;
        let id = HookId(self.alloc_id());
        let name = hook.name().to_string();
        self.hooks.insert(id, hook);
        self.events.push(Event::HookRegistered(name.clone()));

        let batteries = self.batteries.clone();
        for battery in &batteries {
            if let Err(e) = self.bind(id, battery) {
                warn!("extension failed to load: {}", name);
                self.unregister_battery_hook(id);
                return Err(Error::Registration(format!("{}: {}", name, e)));
            }
        }
        info!("new extension: {}", name);
        Ok(id)
    }

    fn unregister_battery_hook(&mut self, id: HookId) {
        self.unbind_where(|b| b.hook == id);
        if let Some(hook) = self.hooks.remove(&id) {
            self.events.push(Event::HookUnregistered(hook.name().to_string()));
        }
    }
}
