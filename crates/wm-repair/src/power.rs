//! Power topology validation.
//!
//! A powered carrier and the power item it is bound to must agree on what
//! the device is. The checks below run in a fixed order and the first one
//! that fails decides the verdict; later checks rely on earlier ones having
//! passed (the class check, for instance, only runs once the item is known
//! to be a trigger device).

use std::fmt;
use tracing::{debug, warn};
use wm_world::{PowerDevice, PowerItem, PowerItemType, PoweredCarrier, TriggerClass, TriggerType};

/// Why a carrier disagrees with its power item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDefect {
    /// A trigger block is bound to a device outside the trigger family.
    NotTriggerDevice { device: PowerDevice },
    /// The block's declared device type differs from the item's.
    DeclaredTypeMismatch {
        declared: PowerItemType,
        actual: PowerItemType,
    },
    /// A trigger device of the wrong class for the block's subtype.
    TriggerClassMismatch {
        trigger_type: TriggerType,
        expected: TriggerClass,
        actual: TriggerClass,
    },
    /// Block and device declare different trigger subtypes.
    TriggerTypeMismatch {
        carrier: TriggerType,
        device: TriggerType,
    },
}

impl fmt::Display for PowerDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotTriggerDevice { device } => {
                write!(f, "trigger block is bound to non-trigger device {device}")
            }
            Self::DeclaredTypeMismatch { declared, actual } => {
                write!(f, "declared power item type {declared} but item is {actual}")
            }
            Self::TriggerClassMismatch {
                trigger_type,
                expected,
                actual,
            } => write!(
                f,
                "trigger type {trigger_type} expects {expected} but item is {actual}"
            ),
            Self::TriggerTypeMismatch { carrier, device } => write!(
                f,
                "block declares trigger type {carrier} but item declares {device}"
            ),
        }
    }
}

/// Outcome of validating one powered carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerVerdict {
    /// No power item bound; nothing to compare.
    Unbound,
    /// Carrier and item agree.
    Valid,
    /// The carrier's trigger subtype is newer than this engine. Accepted
    /// without a class check.
    UnknownSubtype(TriggerType),
    Corrupt(PowerDefect),
}

impl PowerVerdict {
    #[must_use]
    pub fn is_valid(self) -> bool {
        match self {
            Self::Unbound | Self::Valid | Self::UnknownSubtype(_) => true,
            Self::Corrupt(_) => false,
        }
    }

    #[must_use]
    pub fn defect(self) -> Option<PowerDefect> {
        match self {
            Self::Corrupt(defect) => Some(defect),
            Self::Unbound | Self::Valid | Self::UnknownSubtype(_) => None,
        }
    }
}

/// Device class a trigger subtype must be bound to.
///
/// Returns `None` for subtypes this engine does not know. Adding a subtype
/// to [`TriggerType`] fails to compile here until it is classified.
#[must_use]
pub fn expected_trigger_class(trigger_type: TriggerType) -> Option<TriggerClass> {
    match trigger_type {
        TriggerType::Switch | TriggerType::Motion => Some(TriggerClass::Trigger),
        TriggerType::PressurePlate => Some(TriggerClass::PressurePlate),
        TriggerType::TimerRelay => Some(TriggerClass::TimerRelay),
        TriggerType::TripWire => Some(TriggerClass::TripWireRelay),
        TriggerType::Unrecognized(_) => None,
    }
}

/// Validate a carrier against the power item it resolves to.
///
/// `item` is the already-resolved binding: `None` when the carrier has no
/// power item. A binding that points at an item the power manager no longer
/// knows is a separate defect and must be handled before calling this.
#[must_use]
pub fn check_powered(carrier: &PoweredCarrier, item: Option<&PowerItem>) -> PowerVerdict {
    let Some(item) = item else {
        return PowerVerdict::Unbound;
    };
    let device = item.device();
    let declared = carrier.declared_type();

    let Some(carrier_trigger) = carrier.trigger_type() else {
        let actual = device.item_type();
        if declared != actual {
            debug!(
                target: "wm::repair::power",
                item = %item.id(),
                %declared,
                %actual,
                "power item type mismatch"
            );
            return PowerVerdict::Corrupt(PowerDefect::DeclaredTypeMismatch { declared, actual });
        }
        return PowerVerdict::Valid;
    };

    let PowerDevice::Trigger {
        class,
        trigger_type: device_trigger,
    } = device
    else {
        debug!(
            target: "wm::repair::power",
            item = %item.id(),
            %device,
            "trigger block bound to non-trigger item"
        );
        return PowerVerdict::Corrupt(PowerDefect::NotTriggerDevice { device });
    };

    // Trigger blocks historically saved the generic consumer type here.
    let actual = device.item_type();
    if declared != actual && declared != PowerItemType::Consumer {
        debug!(
            target: "wm::repair::power",
            item = %item.id(),
            %declared,
            %actual,
            "trigger item type mismatch"
        );
        return PowerVerdict::Corrupt(PowerDefect::DeclaredTypeMismatch { declared, actual });
    }

    let Some(expected) = expected_trigger_class(carrier_trigger) else {
        warn!(
            target: "wm::repair::power",
            item = %item.id(),
            trigger_type = %carrier_trigger,
            "unknown trigger type; power item class left unchecked"
        );
        return PowerVerdict::UnknownSubtype(carrier_trigger);
    };
    if class != expected {
        debug!(
            target: "wm::repair::power",
            item = %item.id(),
            trigger_type = %carrier_trigger,
            %expected,
            actual = %class,
            "trigger item class mismatch"
        );
        return PowerVerdict::Corrupt(PowerDefect::TriggerClassMismatch {
            trigger_type: carrier_trigger,
            expected,
            actual: class,
        });
    }

    if carrier_trigger != device_trigger {
        debug!(
            target: "wm::repair::power",
            item = %item.id(),
            carrier = %carrier_trigger,
            device = %device_trigger,
            "trigger subtype mismatch"
        );
        return PowerVerdict::Corrupt(PowerDefect::TriggerTypeMismatch {
            carrier: carrier_trigger,
            device: device_trigger,
        });
    }

    PowerVerdict::Valid
}

/// Boolean form of [`check_powered`].
#[must_use]
pub fn is_valid_powered(carrier: &PoweredCarrier, item: Option<&PowerItem>) -> bool {
    check_powered(carrier, item).is_valid()
}
