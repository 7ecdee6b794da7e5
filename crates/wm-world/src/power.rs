//! Power items and the process-wide power manager.
//!
//! Every powered block carries at most one [`PowerItem`], registered with the
//! [`PowerManager`] and wired into a parent/child delivery tree. Device kinds
//! form a closed enum: trigger devices carry their own subtype, everything
//! else is identified by its variant alone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;
use wm_error::{RepairError, Result};
use wm_types::{BlockPos, PowerItemId};

// ── Declared device type ────────────────────────────────────────────────────

/// Device type as declared by a carrier or reported by a power item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerItemType {
    /// Generic default every powered block starts with.
    #[default]
    Consumer,
    ConsumerToggle,
    Trigger,
    Timer,
    Generator,
    SolarPanel,
    BatteryBank,
    RangedTrap,
    ElectricWireRelay,
    TripWireRelay,
    PressurePlate,
}

impl fmt::Display for PowerItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Consumer => "Consumer",
            Self::ConsumerToggle => "ConsumerToggle",
            Self::Trigger => "Trigger",
            Self::Timer => "Timer",
            Self::Generator => "Generator",
            Self::SolarPanel => "SolarPanel",
            Self::BatteryBank => "BatteryBank",
            Self::RangedTrap => "RangedTrap",
            Self::ElectricWireRelay => "ElectricWireRelay",
            Self::TripWireRelay => "TripWireRelay",
            Self::PressurePlate => "PressurePlate",
        };
        f.write_str(name)
    }
}

// ── Trigger subtypes ────────────────────────────────────────────────────────

/// Subtype declared by trigger blocks and trigger devices.
///
/// Saved worlds may contain raw values newer than this build knows about;
/// those are kept verbatim as `Unrecognized` instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Switch,
    PressurePlate,
    TimerRelay,
    Motion,
    TripWire,
    Unrecognized(u8),
}

impl TriggerType {
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Switch,
            1 => Self::PressurePlate,
            2 => Self::TimerRelay,
            3 => Self::Motion,
            4 => Self::TripWire,
            other => Self::Unrecognized(other),
        }
    }

    #[must_use]
    pub fn raw(self) -> u8 {
        match self {
            Self::Switch => 0,
            Self::PressurePlate => 1,
            Self::TimerRelay => 2,
            Self::Motion => 3,
            Self::TripWire => 4,
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Switch => f.write_str("Switch"),
            Self::PressurePlate => f.write_str("PressurePlate"),
            Self::TimerRelay => f.write_str("TimerRelay"),
            Self::Motion => f.write_str("Motion"),
            Self::TripWire => f.write_str("TripWire"),
            Self::Unrecognized(raw) => write!(f, "Unrecognized({raw})"),
        }
    }
}

/// Concrete device class within the trigger category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerClass {
    /// Plain trigger, used by switches and motion sensors.
    Trigger,
    PressurePlate,
    TimerRelay,
    TripWireRelay,
}

impl TriggerClass {
    /// Class a trigger block instantiates for its subtype when it creates a
    /// fresh power item. Unrecognized subtypes fall back to the plain class.
    #[must_use]
    pub fn for_new_device(trigger_type: TriggerType) -> Self {
        match trigger_type {
            TriggerType::PressurePlate => Self::PressurePlate,
            TriggerType::TimerRelay => Self::TimerRelay,
            TriggerType::TripWire => Self::TripWireRelay,
            TriggerType::Switch | TriggerType::Motion | TriggerType::Unrecognized(_) => {
                Self::Trigger
            }
        }
    }

    #[must_use]
    pub fn item_type(self) -> PowerItemType {
        match self {
            Self::Trigger => PowerItemType::Trigger,
            Self::PressurePlate => PowerItemType::PressurePlate,
            Self::TimerRelay => PowerItemType::Timer,
            Self::TripWireRelay => PowerItemType::TripWireRelay,
        }
    }
}

impl fmt::Display for TriggerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trigger => "PowerTrigger",
            Self::PressurePlate => "PowerPressurePlate",
            Self::TimerRelay => "PowerTimerRelay",
            Self::TripWireRelay => "PowerTripWireRelay",
        };
        f.write_str(name)
    }
}

// ── Devices ─────────────────────────────────────────────────────────────────

/// What a power item actually is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PowerDevice {
    Consumer,
    ConsumerToggle,
    Generator,
    SolarPanel,
    BatteryBank,
    RangedTrap,
    ElectricWireRelay,
    Trigger {
        class: TriggerClass,
        trigger_type: TriggerType,
    },
}

impl PowerDevice {
    /// The device a non-trigger block creates for its declared type.
    ///
    /// Declared trigger-family types produce the matching trigger class with
    /// its canonical subtype, so `for_item_type(t).item_type() == t` for
    /// every `t`.
    #[must_use]
    pub fn for_item_type(item_type: PowerItemType) -> Self {
        match item_type {
            PowerItemType::Consumer => Self::Consumer,
            PowerItemType::ConsumerToggle => Self::ConsumerToggle,
            PowerItemType::Generator => Self::Generator,
            PowerItemType::SolarPanel => Self::SolarPanel,
            PowerItemType::BatteryBank => Self::BatteryBank,
            PowerItemType::RangedTrap => Self::RangedTrap,
            PowerItemType::ElectricWireRelay => Self::ElectricWireRelay,
            PowerItemType::Trigger => Self::Trigger {
                class: TriggerClass::Trigger,
                trigger_type: TriggerType::Switch,
            },
            PowerItemType::Timer => Self::Trigger {
                class: TriggerClass::TimerRelay,
                trigger_type: TriggerType::TimerRelay,
            },
            PowerItemType::PressurePlate => Self::Trigger {
                class: TriggerClass::PressurePlate,
                trigger_type: TriggerType::PressurePlate,
            },
            PowerItemType::TripWireRelay => Self::Trigger {
                class: TriggerClass::TripWireRelay,
                trigger_type: TriggerType::TripWire,
            },
        }
    }

    /// The device a trigger block creates for its declared subtype.
    #[must_use]
    pub fn for_trigger_type(trigger_type: TriggerType) -> Self {
        Self::Trigger {
            class: TriggerClass::for_new_device(trigger_type),
            trigger_type,
        }
    }

    /// Device type this item reports about itself.
    #[must_use]
    pub fn item_type(self) -> PowerItemType {
        match self {
            Self::Consumer => PowerItemType::Consumer,
            Self::ConsumerToggle => PowerItemType::ConsumerToggle,
            Self::Generator => PowerItemType::Generator,
            Self::SolarPanel => PowerItemType::SolarPanel,
            Self::BatteryBank => PowerItemType::BatteryBank,
            Self::RangedTrap => PowerItemType::RangedTrap,
            Self::ElectricWireRelay => PowerItemType::ElectricWireRelay,
            Self::Trigger { class, .. } => class.item_type(),
        }
    }

    #[must_use]
    pub fn is_trigger(self) -> bool {
        matches!(self, Self::Trigger { .. })
    }
}

impl fmt::Display for PowerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consumer => f.write_str("PowerConsumer"),
            Self::ConsumerToggle => f.write_str("PowerConsumerToggle"),
            Self::Generator => f.write_str("PowerGenerator"),
            Self::SolarPanel => f.write_str("PowerSolarPanel"),
            Self::BatteryBank => f.write_str("PowerBatteryBank"),
            Self::RangedTrap => f.write_str("PowerRangedTrap"),
            Self::ElectricWireRelay => f.write_str("PowerElectricWireRelay"),
            Self::Trigger { class, .. } => class.fmt(f),
        }
    }
}

/// One node in the power delivery graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerItem {
    id: PowerItemId,
    position: BlockPos,
    device: PowerDevice,
    parent: Option<PowerItemId>,
    children: Vec<PowerItemId>,
}

impl PowerItem {
    #[must_use]
    pub fn id(&self) -> PowerItemId {
        self.id
    }

    #[must_use]
    pub fn position(&self) -> BlockPos {
        self.position
    }

    #[must_use]
    pub fn device(&self) -> PowerDevice {
        self.device
    }

    #[must_use]
    pub fn parent(&self) -> Option<PowerItemId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[PowerItemId] {
        &self.children
    }

    /// True if this item has any wire to another item.
    #[must_use]
    pub fn is_wired(&self) -> bool {
        self.parent.is_some() || !self.children.is_empty()
    }
}

// ── Manager ─────────────────────────────────────────────────────────────────

/// Registry of all power items in the world.
#[derive(Debug, Default)]
pub struct PowerManager {
    next_id: u64,
    items: BTreeMap<PowerItemId, PowerItem>,
}

impl PowerManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, unwired power item.
    pub fn add_item(&mut self, position: BlockPos, device: PowerDevice) -> PowerItemId {
        self.next_id += 1;
        let id = PowerItemId(self.next_id);
        self.items.insert(
            id,
            PowerItem {
                id,
                position,
                device,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    #[must_use]
    pub fn get(&self, id: PowerItemId) -> Option<&PowerItem> {
        self.items.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: PowerItemId) -> bool {
        self.items.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Overwrite what an item is, keeping its identity and wiring.
    ///
    /// This is how a save-file load materializes items whose class no longer
    /// agrees with the block that owns them.
    pub fn set_device(&mut self, id: PowerItemId, device: PowerDevice) -> Result<()> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or(RepairError::PowerItemMissing { id: id.0 })?;
        item.device = device;
        Ok(())
    }

    /// Wire `child` to draw power from `parent`, replacing any previous parent.
    pub fn wire(&mut self, parent: PowerItemId, child: PowerItemId) -> Result<()> {
        if !self.items.contains_key(&parent) {
            return Err(RepairError::PowerItemMissing { id: parent.0 });
        }
        let previous = {
            let item = self
                .items
                .get_mut(&child)
                .ok_or(RepairError::PowerItemMissing { id: child.0 })?;
            item.parent.replace(parent)
        };
        if let Some(old) = previous.and_then(|old| self.items.get_mut(&old)) {
            old.children.retain(|&c| c != child);
        }
        if let Some(p) = self.items.get_mut(&parent) {
            p.children.push(child);
        }
        Ok(())
    }

    /// Remove a node and cut every wire that touches it.
    ///
    /// Children stay registered but lose their parent. Returns the removed
    /// item as it was before the cut, or `None` if it was not registered.
    pub fn remove_node(&mut self, id: PowerItemId) -> Option<PowerItem> {
        let removed = self.items.remove(&id)?;
        if let Some(parent) = removed.parent.and_then(|p| self.items.get_mut(&p)) {
            parent.children.retain(|&c| c != id);
        }
        for child in &removed.children {
            if let Some(item) = self.items.get_mut(child) {
                item.parent = None;
            }
        }
        debug!(
            target: "wm::world::power",
            item = %id,
            device = %removed.device,
            children_cut = removed.children.len(),
            "power node removed"
        );
        Some(removed)
    }
}
