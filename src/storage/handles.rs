use crate::errors::EngineError;
use crate::values::KeyValue;

use super::store::RowAddress;

/// An external reference to one row of a table.
///
/// A handle holds no data, only a ticket into the owning table's registry;
/// every read and write goes back through the table. Handles survive
/// structural mutation: when a row earlier in a sequential store is deleted,
/// the registry shifts this handle's position down with the row it refers
/// to. A handle whose own row is deleted (or invalidated by a reload) stays
/// safe to use but answers [`EngineError::StaleHandle`] from then on.
///
/// Handles are deliberately not cloneable; aliases to the same row come from
/// asking the table again. Pass a handle to [`Table::release`] when done
/// with it so its registry slot can be reused.
///
/// [`Table::release`]: super::Table::release
#[derive(Debug)]
pub struct RowHandle {
    slot: usize,
    generation: u64,
}

enum SlotState {
    Vacant,
    Live(RowAddress),
    Dead,
}

struct HandleSlot {
    generation: u64,
    state: SlotState,
}

/// The registry of live row handles for one table.
///
/// Slots are generation-counted so a released slot can be reused without a
/// stale handle ever resolving to the wrong row. Dead slots (row deleted or
/// invalidated) linger until their handle is released; traversals skip them.
pub(crate) struct HandleRegistry {
    slots: Vec<HandleSlot>,
    free: Vec<usize>,
}

impl HandleRegistry {
    pub(crate) fn new() -> HandleRegistry {
        HandleRegistry {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, address: RowAddress) -> RowHandle {
        if let Some(slot) = self.free.pop() {
            self.slots[slot].state = SlotState::Live(address);
            RowHandle {
                slot,
                generation: self.slots[slot].generation,
            }
        } else {
            self.slots.push(HandleSlot {
                generation: 0,
                state: SlotState::Live(address),
            });
            RowHandle {
                slot: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    pub(crate) fn address(&self, handle: &RowHandle) -> Result<RowAddress, EngineError> {
        match self.slots.get(handle.slot) {
            Some(entry) if entry.generation == handle.generation => match &entry.state {
                SlotState::Live(address) => Ok(address.clone()),
                _ => Err(EngineError::StaleHandle),
            },
            _ => Err(EngineError::StaleHandle),
        }
    }

    pub(crate) fn release(&mut self, handle: RowHandle) {
        //! Give a handle's slot back for reuse. Releasing a stale handle is
        //! a silent no-op, matching the pruning of reclaimed references.

        if let Some(entry) = self.slots.get_mut(handle.slot) {
            if entry.generation == handle.generation && !matches!(entry.state, SlotState::Vacant) {
                entry.generation += 1;
                entry.state = SlotState::Vacant;
                self.free.push(handle.slot);
            }
        }
    }

    pub(crate) fn on_delete(&mut self, deleted: usize, new_length: usize) {
        //! Remap every live position handle after a sequential deletion.
        //! Must run after the physical removal: `new_length` is the
        //! post-removal length and only bounds the shifted positions.

        for entry in self.slots.iter_mut() {
            if let SlotState::Live(RowAddress::Position(pos)) = &mut entry.state {
                if *pos == deleted {
                    entry.state = SlotState::Dead;
                } else if *pos > deleted {
                    *pos -= 1;
                    debug_assert!(*pos < new_length);
                }
            }
        }
    }

    pub(crate) fn kill_key(&mut self, key: &KeyValue) {
        for entry in self.slots.iter_mut() {
            if let SlotState::Live(RowAddress::Key(held)) = &entry.state {
                if held == key {
                    entry.state = SlotState::Dead;
                }
            }
        }
    }

    pub(crate) fn invalidate_positions(&mut self) {
        //! A sequential reload gives positions new meanings; every live
        //! position handle goes stale.

        for entry in self.slots.iter_mut() {
            if matches!(entry.state, SlotState::Live(RowAddress::Position(_))) {
                entry.state = SlotState::Dead;
            }
        }
    }

    pub(crate) fn invalidate_missing<F>(&mut self, contains: F)
    where
        F: Fn(&KeyValue) -> bool,
    {
        //! After an associative reload, handles re-bind by key: those whose
        //! key survived stay valid, the rest go stale.

        for entry in self.slots.iter_mut() {
            if let SlotState::Live(RowAddress::Key(held)) = &entry.state {
                if !contains(held) {
                    entry.state = SlotState::Dead;
                }
            }
        }
    }
}
