//! Destroy-and-recreate repair for corrupted tile entities.
//!
//! The corrupted entity and its power item are discarded. A fresh entity of
//! the same type takes its place and keeps only the declared device type
//! and, for triggers, the declared trigger subtype. Wiring is not carried
//! over; the old power graph is not trusted.
//!
//! A trigger's subtype decides which device it instantiates. When the
//! declared device type contradicts that subtype no device can satisfy
//! both, so the declared type is reset to the one the subtype produces.

use tracing::{debug, warn};
use wm_error::{RepairError, Result};
use wm_types::{LocalPos, PowerItemId};
use wm_world::{
    Chunk, PowerItem, PowerItemType, PoweredCarrier, TileEntity, TileEntityType, TriggerClass,
    World,
};

/// What a rebuild replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub tile_type: TileEntityType,
    /// The old power item as it was removed, if it was still registered.
    pub removed_item: Option<PowerItem>,
    /// The power item bound to the new entity, if it is powered.
    pub new_item: Option<PowerItemId>,
    /// Declared type that contradicted the trigger subtype and was replaced.
    pub reset_declared_type: Option<PowerItemType>,
}

/// Declared type a rebuilt trigger must carry instead of `declared`, if any.
///
/// `Consumer` is the legacy trigger value and always stands.
#[must_use]
pub fn conflicting_declared_type(carrier: &PoweredCarrier) -> Option<PowerItemType> {
    let trigger_type = carrier.trigger_type()?;
    let produced = TriggerClass::for_new_device(trigger_type).item_type();
    let declared = carrier.declared_type();
    (declared != produced && declared != PowerItemType::Consumer).then_some(produced)
}

/// Replace the tile entity at `pos` with a freshly constructed one.
///
/// The caller holds the chunk's lock; this function takes the power manager
/// lock itself and must not be called while it is already held. Nothing is
/// touched when an error is returned.
pub fn rebuild_tile_entity(
    world: &World,
    chunk: &mut Chunk,
    pos: LocalPos,
) -> Result<RebuildOutcome> {
    let key = chunk.key();
    let missing = || RepairError::TileEntityMissing {
        chunk: key.0,
        pos: pos.to_string(),
    };
    let world_pos = chunk.world_pos(pos);

    let current = chunk.tile_entity(pos).ok_or_else(missing)?;
    let mut fresh = TileEntity::instantiate(current.tile_type(), pos);
    if current.powered().is_some() != fresh.powered().is_some() {
        return Err(RepairError::RepairFailed(format!(
            "{} at {world_pos} changes power capability on rebuild",
            current.tile_type()
        )));
    }

    // Swapping must not queue a client update for the old entity.
    chunk
        .tile_entity_mut(pos)
        .ok_or_else(missing)?
        .set_disable_modified_check(true);
    let old = chunk.remove_tile_entity(pos).ok_or_else(missing)?;

    let mut power = world.power();
    let removed_item = old
        .powered()
        .and_then(PoweredCarrier::power_item)
        .and_then(|id| power.remove_node(id));

    let mut reset_declared_type = None;
    let new_item = match (old.powered(), fresh.powered_mut()) {
        (Some(old_carrier), Some(new_carrier)) => {
            new_carrier.set_declared_type(old_carrier.declared_type());
            if let Some(trigger_type) = old_carrier.trigger_type() {
                new_carrier.set_trigger_type(trigger_type);
            }
            if let Some(produced) = conflicting_declared_type(new_carrier) {
                warn!(
                    target: "wm::repair::rebuild",
                    %world_pos,
                    declared = %new_carrier.declared_type(),
                    %produced,
                    "declared power item type contradicts trigger type; reset"
                );
                reset_declared_type = Some(new_carrier.declared_type());
                new_carrier.set_declared_type(produced);
            }
            Some(new_carrier.initialize_power_data(world_pos, &mut power))
        }
        _ => None,
    };
    drop(power);

    debug!(
        target: "wm::repair::rebuild",
        chunk = %chunk.coord(),
        %pos,
        tile_type = %old.tile_type(),
        old_item = ?removed_item.as_ref().map(PowerItem::id),
        new_item = ?new_item,
        "tile entity replaced"
    );

    let tile_type = fresh.tile_type();
    chunk.add_tile_entity(fresh);

    Ok(RebuildOutcome {
        tile_type,
        removed_item,
        new_item,
        reset_declared_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wm_types::ChunkCoord;
    use wm_world::{PowerDevice, TileEntityState, TriggerType};

    fn local() -> LocalPos {
        LocalPos::new(3, 64, 7).expect("valid local pos")
    }

    fn place_trigger(
        world: &World,
        chunk: &mut Chunk,
        declared: PowerItemType,
        trigger: TriggerType,
    ) -> PowerItemId {
        let mut te = TileEntity::instantiate(TileEntityType::Trigger, local());
        let carrier = te.powered_mut().expect("trigger is powered");
        *carrier = PoweredCarrier::new_trigger(declared, trigger);
        let id = carrier.initialize_power_data(chunk.world_pos(local()), &mut world.power());
        chunk.add_tile_entity(te);
        id
    }

    #[test]
    fn rebuild_preserves_declared_state_and_drops_wiring() {
        let world = World::default();
        let mut chunk = Chunk::new(ChunkCoord::new(1, 1), 0);
        let old_id =
            place_trigger(&world, &mut chunk, PowerItemType::Timer, TriggerType::TimerRelay);
        {
            let mut pm = world.power();
            let source = pm.add_item(wm_types::BlockPos::new(0, 64, 0), PowerDevice::Generator);
            let lamp = pm.add_item(wm_types::BlockPos::new(2, 64, 0), PowerDevice::Consumer);
            pm.wire(source, old_id).expect("wire source");
            pm.wire(old_id, lamp).expect("wire lamp");
            // Corrupt the item the way a bad load does.
            pm.set_device(old_id, PowerDevice::for_trigger_type(TriggerType::Switch))
                .expect("registered");
        }
        chunk.drain_pending_sync();

        let outcome = rebuild_tile_entity(&world, &mut chunk, local()).expect("rebuild");
        assert_eq!(outcome.tile_type, TileEntityType::Trigger);
        assert_eq!(outcome.removed_item.as_ref().map(PowerItem::id), Some(old_id));

        let te = chunk.tile_entity(local()).expect("replacement present");
        let carrier = te.powered().expect("powered");
        assert_eq!(carrier.declared_type(), PowerItemType::Timer);
        assert_eq!(carrier.trigger_type(), Some(TriggerType::TimerRelay));
        let new_id = carrier.power_item().expect("bound");
        assert_eq!(Some(new_id), outcome.new_item);
        assert_ne!(new_id, old_id);

        let pm = world.power();
        assert!(!pm.contains(old_id));
        let item = pm.get(new_id).expect("registered");
        assert!(!item.is_wired());
        assert_eq!(
            item.device(),
            PowerDevice::Trigger {
                class: TriggerClass::TimerRelay,
                trigger_type: TriggerType::TimerRelay
            }
        );
        assert!(!te.modified_check_disabled());
        assert_eq!(outcome.reset_declared_type, None);
    }

    #[test]
    fn declared_type_contradicting_subtype_is_reset() {
        let world = World::default();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0), 0);
        place_trigger(&world, &mut chunk, PowerItemType::Timer, TriggerType::Switch);

        let outcome = rebuild_tile_entity(&world, &mut chunk, local()).expect("rebuild");
        assert_eq!(outcome.reset_declared_type, Some(PowerItemType::Timer));

        let carrier = chunk
            .tile_entity(local())
            .and_then(TileEntity::powered)
            .expect("powered");
        assert_eq!(carrier.declared_type(), PowerItemType::Trigger);
        assert_eq!(carrier.trigger_type(), Some(TriggerType::Switch));
        let pm = world.power();
        let item = outcome.new_item.and_then(|id| pm.get(id));
        assert!(crate::power::is_valid_powered(carrier, item));
    }

    #[test]
    fn consumer_declared_trigger_keeps_legacy_type() {
        let carrier = PoweredCarrier::new_trigger(PowerItemType::Consumer, TriggerType::TripWire);
        assert_eq!(conflicting_declared_type(&carrier), None);
        let carrier = PoweredCarrier::new_trigger(PowerItemType::Generator, TriggerType::TripWire);
        assert_eq!(
            conflicting_declared_type(&carrier),
            Some(PowerItemType::TripWireRelay)
        );
        assert_eq!(
            conflicting_declared_type(&PoweredCarrier::new(PowerItemType::Generator)),
            None
        );
    }

    #[test]
    fn capability_change_leaves_chunk_untouched() {
        let world = World::default();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0), 0);
        let mut te = TileEntity::instantiate(TileEntityType::Sign, local());
        let mut carrier = PoweredCarrier::new(PowerItemType::Consumer);
        let id = carrier.initialize_power_data(chunk.world_pos(local()), &mut world.power());
        *te.state_mut() = TileEntityState::Powered(carrier);
        chunk.add_tile_entity(te);

        let err = rebuild_tile_entity(&world, &mut chunk, local()).expect_err("sign is unpowered");
        assert!(matches!(err, RepairError::RepairFailed(_)));
        let kept = chunk.tile_entity(local()).expect("entity kept");
        assert_eq!(kept.powered().and_then(PoweredCarrier::power_item), Some(id));
        assert!(!kept.modified_check_disabled());
        assert!(world.power().contains(id));
    }

    #[test]
    fn removal_is_silent_but_insertion_syncs() {
        let world = World::default();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0), 0);
        place_trigger(&world, &mut chunk, PowerItemType::Consumer, TriggerType::Motion);
        chunk.drain_pending_sync();

        rebuild_tile_entity(&world, &mut chunk, local()).expect("rebuild");
        assert_eq!(
            chunk.drain_pending_sync(),
            vec![wm_world::TileEntitySync::Added(local())]
        );
    }

    #[test]
    fn dangling_binding_is_rebuilt_without_removal() {
        let world = World::default();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0), 0);
        let mut te = TileEntity::instantiate(TileEntityType::PowerSource, local());
        te.powered_mut().expect("powered").bind(PowerItemId(777));
        chunk.add_tile_entity(te);

        let outcome = rebuild_tile_entity(&world, &mut chunk, local()).expect("rebuild");
        assert_eq!(outcome.removed_item, None);
        let id = outcome.new_item.expect("new item");
        assert_eq!(world.power().get(id).expect("registered").device(), PowerDevice::Generator);
    }

    #[test]
    fn unpowered_entities_rebuild_empty() {
        let world = World::default();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0), 0);
        let mut te = TileEntity::instantiate(TileEntityType::Sign, local());
        *te.state_mut() = TileEntityState::Sign {
            text: "keep out".to_owned(),
        };
        chunk.add_tile_entity(te);

        let outcome = rebuild_tile_entity(&world, &mut chunk, local()).expect("rebuild");
        assert_eq!(outcome.new_item, None);
        assert_eq!(
            chunk.tile_entity(local()).expect("present").state(),
            &TileEntityState::Sign {
                text: String::new()
            }
        );
    }

    #[test]
    fn missing_entity_is_an_error() {
        let world = World::default();
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0), 0);
        let err = rebuild_tile_entity(&world, &mut chunk, local()).expect_err("nothing there");
        assert!(matches!(err, RepairError::TileEntityMissing { .. }));
    }
}
