//! Priority ordering: validation, moves, repair and derived indices.
//!
//! Every operation keeps priorities dense and unique. A move whose
//! destination would break a dependency is clamped to the nearest legal
//! slot, and the result never loads a plugin before one of its masters.

use crate::event::PluginEvent;
use crate::id::{FileName, PluginId};
use crate::plugin::CompileIndex;
use crate::plugin_list::{PluginList, PluginListError};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Highest regular compile index the engines can address.
const MAX_REGULAR_INDEX: usize = 0xFD;

/// Light plugins addressable per light slot.
const LIGHT_SLOT_SIZE: u32 = 0x1000;

/// Why a requested move is not allowed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderingViolation {
    #[error("{plugin} has a fixed load position")]
    Immovable { plugin: FileName },

    #[error("{later} must load after {earlier}")]
    Dependency { later: FileName, earlier: FileName },
}

impl PluginList {
    /// Plugin names in priority order.
    pub fn load_order(&self) -> Vec<FileName> {
        self.by_priority
            .iter()
            .map(|id| self.plugins[id.0].name.clone())
            .collect()
    }

    /// Names of enabled plugins in load order.
    pub fn active_load_order(&self) -> Vec<FileName> {
        self.by_priority
            .iter()
            .map(|id| &self.plugins[id.0])
            .filter(|plugin| plugin.enabled)
            .map(|plugin| plugin.name.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check that moving `ids` so they land before the plugin currently at
    /// `priority` keeps every dependency on a non-moving plugin intact.
    ///
    /// Ids not in the list are ignored.
    pub fn validate_move(&self, ids: &[PluginId], priority: usize) -> Result<(), OrderingViolation> {
        let priority = priority.min(self.by_priority.len());
        let moving: HashSet<PluginId> = ids.iter().copied().collect();

        for &id in ids {
            let Some(plugin) = self.plugins.get(id.0) else {
                continue;
            };
            let old = plugin.priority;

            if plugin.force_loaded {
                let (min, max) = (old.min(priority), old.max(priority));
                if self.by_priority[min..max].iter().any(|p| !moving.contains(p)) {
                    return Err(OrderingViolation::Immovable {
                        plugin: plugin.name.clone(),
                    });
                }
            }

            for &other_id in &self.by_priority[priority.min(old)..old] {
                let other = &self.plugins[other_id.0];
                if !moving.contains(&other_id) && plugin.must_load_after(other) {
                    return Err(OrderingViolation::Dependency {
                        later: plugin.name.clone(),
                        earlier: other.name.clone(),
                    });
                }
            }

            if old + 1 < priority {
                for &other_id in &self.by_priority[old + 1..priority] {
                    let other = &self.plugins[other_id.0];
                    if !moving.contains(&other_id) && other.must_load_after(plugin) {
                        return Err(OrderingViolation::Dependency {
                            later: other.name.clone(),
                            earlier: plugin.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn can_move_to_priority(&self, ids: &[PluginId], priority: usize) -> bool {
        self.validate_move(ids, priority).is_ok()
    }

    // -----------------------------------------------------------------------
    // Moves
    // -----------------------------------------------------------------------

    /// Move `ids` so they land before the plugin currently at `destination`.
    ///
    /// Each plugin stops short of the first non-moving plugin it would have
    /// to pass but may not. With `disjoint` every plugin aims for
    /// `destination` independently; otherwise each one lands next to the
    /// previous. Either way the moved plugins keep their relative order.
    /// Clamping one mover can strand another ahead of its master, so the
    /// result is repaired before indices are refreshed.
    ///
    /// One [`PluginEvent::Moved`] is emitted per requested plugin whose
    /// priority changed, and per plugin the repair pulled forward: those
    /// that moved down by descending old priority, then those that moved up
    /// by ascending old priority.
    pub fn move_to_priority(&mut self, ids: &[PluginId], destination: usize, disjoint: bool) {
        let mut ids: Vec<PluginId> = ids
            .iter()
            .copied()
            .filter(|id| id.0 < self.plugins.len())
            .collect();
        ids.sort_by_key(|id| Reverse(self.plugins[id.0].priority));
        ids.dedup();
        if ids.is_empty() {
            return;
        }

        let destination = destination.min(self.by_priority.len());
        if disjoint {
            // Plugins moving down all land just above `destination`, so the
            // lowest goes first and each later one pushes it further up.
            let split = ids.partition_point(|id| self.plugins[id.0].priority >= destination);
            ids[split..].reverse();
        }
        let moving: HashSet<PluginId> = ids.iter().copied().collect();
        let old_priorities: Vec<usize> = self.plugins.iter().map(|plugin| plugin.priority).collect();

        let mut next = destination;
        for &id in &ids {
            let priority = self.plugins[id.0].priority;

            if next < priority {
                for i in (next..priority).rev() {
                    let other = self.by_priority[i];
                    if !moving.contains(&other)
                        && self.plugins[id.0].must_load_after(&self.plugins[other.0])
                    {
                        next = i + 1;
                        break;
                    }
                }
                for i in (next + 1..=priority).rev() {
                    self.by_priority[i] = self.by_priority[i - 1];
                    let shifted = self.by_priority[i];
                    self.plugins[shifted.0].set_priority(i);
                }
                self.by_priority[next] = id;
                self.plugins[id.0].set_priority(next);
            } else if next > priority {
                for i in priority + 1..next {
                    let other = self.by_priority[i];
                    if !moving.contains(&other)
                        && self.plugins[other.0].must_load_after(&self.plugins[id.0])
                    {
                        next = i;
                        break;
                    }
                }
                next -= 1;
                for i in priority..next {
                    self.by_priority[i] = self.by_priority[i + 1];
                    let shifted = self.by_priority[i];
                    self.plugins[shifted.0].set_priority(i);
                }
                self.by_priority[next] = id;
                self.plugins[id.0].set_priority(next);
            }

            if disjoint {
                next = destination;
            }
        }

        let mut pulled = Vec::new();
        if self.repair_collecting(&mut pulled) {
            debug!(count = pulled.len(), "repaired order after clamped move");
        }
        self.refresh_derived();

        let mut moved_up = BTreeMap::new();
        let mut moved_down = BTreeMap::new();
        for id in ids.into_iter().chain(pulled) {
            let old = old_priorities[id.0];
            let plugin = &self.plugins[id.0];
            if plugin.priority < old {
                moved_up.insert(old, (plugin.name.clone(), plugin.priority));
            } else if plugin.priority > old {
                moved_down.insert(Reverse(old), (plugin.name.clone(), plugin.priority));
            }
        }
        for (Reverse(old_priority), (name, new_priority)) in moved_down {
            self.events.emit(PluginEvent::Moved {
                name,
                old_priority,
                new_priority,
            });
        }
        for (old_priority, (name, new_priority)) in moved_up {
            self.events.emit(PluginEvent::Moved {
                name,
                old_priority,
                new_priority,
            });
        }
        self.events.deliver();
    }

    /// Move `ids` as a block by `offset` slots relative to the block's edge.
    pub fn shift_priority(&mut self, ids: &[PluginId], offset: isize) {
        let priorities = ids
            .iter()
            .filter_map(|id| self.plugins.get(id.0))
            .map(|plugin| plugin.priority);
        if offset < 0 {
            let Some(min) = priorities.min() else {
                return;
            };
            self.move_to_priority(ids, min.saturating_sub(offset.unsigned_abs()), false);
        } else if offset > 0 {
            let Some(max) = priorities.max() else {
                return;
            };
            self.move_to_priority(ids, max + 1 + offset.unsigned_abs(), false);
        }
    }

    /// Move one plugin so that it ends up at `priority`, if its
    /// dependencies allow.
    pub fn set_priority(&mut self, name: &str, priority: usize) -> Result<(), PluginListError> {
        let count = self.by_priority.len();
        if priority >= count {
            warn!(plugin = name, priority, "requested priority out of range");
            return Err(PluginListError::PriorityOutOfRange { priority, count });
        }
        let id = self.require(name)?;
        let old = self.plugins[id.0].priority;
        let destination = if priority > old { priority + 1 } else { priority };
        self.move_to_priority(&[id], destination, false);
        Ok(())
    }

    /// Reorder to `names`; unlisted plugins keep their relative order after
    /// the listed ones. The result is then repaired.
    pub fn set_load_order<S: AsRef<str>>(&mut self, names: &[S]) {
        let mut order: Vec<PluginId> = Vec::with_capacity(self.plugins.len());
        let mut placed = vec![false; self.plugins.len()];
        for name in names {
            match self.find(name.as_ref()) {
                Some(id) if !placed[id.0] => {
                    placed[id.0] = true;
                    order.push(id);
                }
                Some(_) => {}
                None => debug!(plugin = name.as_ref(), "load order names an unknown plugin"),
            }
        }
        for &id in &self.by_priority {
            if !placed[id.0] {
                order.push(id);
            }
        }
        self.by_priority = order;
        self.reassign_priorities();
        self.repair_in_place();
        self.refresh_derived();
        self.events.emit(PluginEvent::Refreshed);
        self.events.deliver();
    }

    // -----------------------------------------------------------------------
    // Repair
    // -----------------------------------------------------------------------

    /// Reorder so that no plugin sits before one it must load after.
    ///
    /// Returns `true` if anything moved.
    pub fn repair_order(&mut self) -> bool {
        let changed = self.repair_in_place();
        if changed {
            self.refresh_derived();
            self.events.emit(PluginEvent::Refreshed);
            self.events.deliver();
        }
        changed
    }

    /// Pull each blocking plugin in front of the plugin it blocks, then
    /// rescan from the same slot. A slot that keeps receiving new occupants
    /// is part of a cycle and is left as is.
    pub(crate) fn repair_in_place(&mut self) -> bool {
        self.repair_collecting(&mut Vec::new())
    }

    /// [`repair_in_place`](Self::repair_in_place), recording every plugin
    /// pulled forward.
    fn repair_collecting(&mut self, pulled: &mut Vec<PluginId>) -> bool {
        let n = self.by_priority.len();
        let mut changed = false;
        for i in 0..n {
            let mut rotations = 0;
            let mut j = i + 1;
            while j < n {
                let first = &self.plugins[self.by_priority[i].0];
                let second = &self.plugins[self.by_priority[j].0];
                if !first.must_load_after(second) {
                    j += 1;
                    continue;
                }
                if rotations > n - i {
                    warn!(
                        plugin = %first.name,
                        "load order constraints form a cycle; leaving it in place"
                    );
                    break;
                }
                rotations += 1;
                if !pulled.contains(&self.by_priority[j]) {
                    pulled.push(self.by_priority[j]);
                }
                self.by_priority[i..=j].rotate_right(1);
                changed = true;
                j = i + 1;
            }
        }
        if changed {
            self.reassign_priorities();
        }
        changed
    }

    pub(crate) fn reassign_priorities(&mut self) {
        for (priority, id) in self.by_priority.iter().enumerate() {
            let plugin = &mut self.plugins[id.0];
            if plugin.priority != priority {
                plugin.set_priority(priority);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Derived indices
    // -----------------------------------------------------------------------

    /// Assign engine compile indices in priority order. Disabled plugins get
    /// none; light plugins share slots from `0xFE`; overlay plugins take no
    /// slot.
    pub fn compute_compile_indices(&mut self) {
        let light = self.settings.light_plugins_supported();
        let overlay = self.settings.overlay_plugins_supported();
        let mut regular = 0usize;
        let mut small = 0u32;

        for &id in &self.by_priority {
            let plugin = &mut self.plugins[id.0];
            plugin.compile_index = if !plugin.enabled {
                None
            } else if light && plugin.is_small_file() {
                let index = CompileIndex::Light {
                    slot: 0xFE + (small / LIGHT_SLOT_SIZE) as u16,
                    sub: (small % LIGHT_SLOT_SIZE) as u16,
                };
                small += 1;
                Some(index)
            } else if overlay && plugin.metadata.overlay_flagged {
                Some(CompileIndex::Overlay)
            } else {
                if regular == MAX_REGULAR_INDEX + 1 {
                    warn!(plugin = %plugin.name, "more regular plugins enabled than the engine can load");
                }
                let index = CompileIndex::Regular(regular.min(u16::MAX as usize) as u16);
                regular += 1;
                Some(index)
            };
        }
    }

    /// Sequential positions among enabled plugins.
    pub(crate) fn refresh_load_order(&mut self) {
        let mut next = 0;
        for &id in &self.by_priority {
            let plugin = &mut self.plugins[id.0];
            plugin.load_order = if plugin.enabled {
                next += 1;
                Some(next - 1)
            } else {
                None
            };
        }
    }

    /// Declared masters that are not enabled, per plugin.
    pub fn recompute_missing_masters(&mut self) {
        let enabled: HashSet<FileName> = self
            .plugins
            .iter()
            .filter(|plugin| plugin.enabled)
            .map(|plugin| plugin.name.clone())
            .collect();
        for plugin in &mut self.plugins {
            plugin.missing_masters = plugin
                .metadata
                .masters
                .iter()
                .filter(|master| !enabled.contains(*master))
                .cloned()
                .collect();
        }
    }
}
