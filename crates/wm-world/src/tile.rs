//! Tile entities: typed objects attached to a single block inside a chunk.

use serde::{Deserialize, Serialize};
use std::fmt;
use wm_types::{BlockPos, LocalPos, PowerItemId};

use crate::power::{PowerDevice, PowerItemType, PowerManager, TriggerType};

/// Concrete tile entity subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileEntityType {
    Loot,
    SecureLoot,
    Workstation,
    Sign,
    /// Powered block: lamps, doors, consumers in general.
    Powered,
    PowerSource,
    PowerRangedTrap,
    /// Powered trigger: switches, plates, timers, motion sensors, trip wires.
    Trigger,
}

impl TileEntityType {
    /// Declared device type a freshly placed block of this subtype starts with.
    #[must_use]
    pub fn default_item_type(self) -> Option<PowerItemType> {
        match self {
            Self::Powered | Self::Trigger => Some(PowerItemType::Consumer),
            Self::PowerSource => Some(PowerItemType::Generator),
            Self::PowerRangedTrap => Some(PowerItemType::RangedTrap),
            Self::Loot | Self::SecureLoot | Self::Workstation | Self::Sign => None,
        }
    }

    #[must_use]
    pub fn is_powered(self) -> bool {
        self.default_item_type().is_some()
    }
}

impl fmt::Display for TileEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loot => "TileEntityLootContainer",
            Self::SecureLoot => "TileEntitySecureLootContainer",
            Self::Workstation => "TileEntityWorkstation",
            Self::Sign => "TileEntitySign",
            Self::Powered => "TileEntityPoweredBlock",
            Self::PowerSource => "TileEntityPowerSource",
            Self::PowerRangedTrap => "TileEntityPoweredRangedTrap",
            Self::Trigger => "TileEntityPoweredTrigger",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: String,
    pub count: u32,
}

/// Power-related state of a powered block.
///
/// `trigger_type` is `Some` exactly for trigger carriers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoweredCarrier {
    declared_type: PowerItemType,
    trigger_type: Option<TriggerType>,
    power_item: Option<PowerItemId>,
}

impl PoweredCarrier {
    #[must_use]
    pub fn new(declared_type: PowerItemType) -> Self {
        Self {
            declared_type,
            trigger_type: None,
            power_item: None,
        }
    }

    #[must_use]
    pub fn new_trigger(declared_type: PowerItemType, trigger_type: TriggerType) -> Self {
        Self {
            declared_type,
            trigger_type: Some(trigger_type),
            power_item: None,
        }
    }

    #[must_use]
    pub fn declared_type(&self) -> PowerItemType {
        self.declared_type
    }

    pub fn set_declared_type(&mut self, declared_type: PowerItemType) {
        self.declared_type = declared_type;
    }

    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.trigger_type.is_some()
    }

    #[must_use]
    pub fn trigger_type(&self) -> Option<TriggerType> {
        self.trigger_type
    }

    /// Change the declared subtype. No-op on non-trigger carriers.
    pub fn set_trigger_type(&mut self, trigger_type: TriggerType) {
        if self.trigger_type.is_some() {
            self.trigger_type = Some(trigger_type);
        }
    }

    #[must_use]
    pub fn power_item(&self) -> Option<PowerItemId> {
        self.power_item
    }

    pub fn bind(&mut self, id: PowerItemId) {
        self.power_item = Some(id);
    }

    pub fn unbind(&mut self) -> Option<PowerItemId> {
        self.power_item.take()
    }

    /// Create and bind a fresh, unwired power item from the declared state.
    ///
    /// Triggers derive the device from their subtype; every other carrier
    /// derives it from the declared device type.
    pub fn initialize_power_data(
        &mut self,
        position: BlockPos,
        power: &mut PowerManager,
    ) -> PowerItemId {
        let device = match self.trigger_type {
            Some(trigger_type) => PowerDevice::for_trigger_type(trigger_type),
            None => PowerDevice::for_item_type(self.declared_type),
        };
        let id = power.add_item(position, device);
        self.power_item = Some(id);
        id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TileEntityState {
    Container { items: Vec<ItemStack> },
    Sign { text: String },
    Powered(PoweredCarrier),
}

/// A block-attached object owned by one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEntity {
    tile_type: TileEntityType,
    local_pos: LocalPos,
    state: TileEntityState,
    modified_check_disabled: bool,
}

impl TileEntity {
    /// A fresh tile entity of `tile_type` in its default state.
    #[must_use]
    pub fn instantiate(tile_type: TileEntityType, local_pos: LocalPos) -> Self {
        let state = match tile_type {
            TileEntityType::Loot | TileEntityType::SecureLoot | TileEntityType::Workstation => {
                TileEntityState::Container { items: Vec::new() }
            }
            TileEntityType::Sign => TileEntityState::Sign {
                text: String::new(),
            },
            TileEntityType::Trigger => TileEntityState::Powered(PoweredCarrier::new_trigger(
                PowerItemType::Consumer,
                TriggerType::Switch,
            )),
            TileEntityType::Powered
            | TileEntityType::PowerSource
            | TileEntityType::PowerRangedTrap => TileEntityState::Powered(PoweredCarrier::new(
                tile_type
                    .default_item_type()
                    .unwrap_or(PowerItemType::Consumer),
            )),
        };
        Self {
            tile_type,
            local_pos,
            state,
            modified_check_disabled: false,
        }
    }

    #[must_use]
    pub fn tile_type(&self) -> TileEntityType {
        self.tile_type
    }

    #[must_use]
    pub fn local_pos(&self) -> LocalPos {
        self.local_pos
    }

    #[must_use]
    pub fn state(&self) -> &TileEntityState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TileEntityState {
        &mut self.state
    }

    #[must_use]
    pub fn powered(&self) -> Option<&PoweredCarrier> {
        match &self.state {
            TileEntityState::Powered(carrier) => Some(carrier),
            _ => None,
        }
    }

    pub fn powered_mut(&mut self) -> Option<&mut PoweredCarrier> {
        match &mut self.state {
            TileEntityState::Powered(carrier) => Some(carrier),
            _ => None,
        }
    }

    /// Stop this entity from queueing client updates when it changes.
    pub fn set_disable_modified_check(&mut self, disabled: bool) {
        self.modified_check_disabled = disabled;
    }

    #[must_use]
    pub fn modified_check_disabled(&self) -> bool {
        self.modified_check_disabled
    }
}
