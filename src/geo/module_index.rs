//! Mapping between external (detector, local index) module addresses and
//! the contiguous global layer index used inside the setup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{KfError, KfResult};

/// Bidirectional module index map. Global indices follow the z order of the
/// modules. Serialized as the ordered (det, loc) list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(i32, i32)>", into = "Vec<(i32, i32)>")]
pub struct ModuleIndexMap {
    global_to_local: Vec<(i32, i32)>,
    local_to_global: HashMap<(i32, i32), usize>,
}

impl From<Vec<(i32, i32)>> for ModuleIndexMap {
    fn from(global_to_local: Vec<(i32, i32)>) -> Self {
        Self::from_ordered(global_to_local)
    }
}

impl From<ModuleIndexMap> for Vec<(i32, i32)> {
    fn from(map: ModuleIndexMap) -> Self {
        map.global_to_local
    }
}

impl ModuleIndexMap {
    fn from_ordered(global_to_local: Vec<(i32, i32)>) -> Self {
        let local_to_global = global_to_local
            .iter()
            .enumerate()
            .map(|(i, &key)| (key, i))
            .collect();
        Self {
            global_to_local,
            local_to_global,
        }
    }

    pub fn n_layers(&self) -> usize {
        self.global_to_local.len()
    }

    pub fn local_to_global(&self, det: i32, loc: i32) -> KfResult<usize> {
        self.local_to_global
            .get(&(det, loc))
            .copied()
            .ok_or(KfError::UnknownComponent { det, loc })
    }

    pub fn global_to_local(&self, i_layer: usize) -> KfResult<(i32, i32)> {
        self.global_to_local
            .get(i_layer)
            .copied()
            .ok_or(KfError::IndexOutOfRange(i_layer))
    }

    pub fn is_active(&self, det: i32, loc: i32) -> bool {
        self.local_to_global.contains_key(&(det, loc))
    }

    /// Removes a module; the global indices of the modules downstream of it
    /// shift down by one. Returns the removed global index.
    pub fn disable(&mut self, det: i32, loc: i32) -> KfResult<usize> {
        let i_layer = self.local_to_global(det, loc)?;
        self.global_to_local.remove(i_layer);
        *self = Self::from_ordered(std::mem::take(&mut self.global_to_local));
        Ok(i_layer)
    }
}

#[derive(Clone, Copy, Debug)]
struct Component {
    det: i32,
    loc: i32,
    z: f64,
}

/// Collects module registrations and produces a [`ModuleIndexMap`].
#[derive(Clone, Debug, Default)]
pub struct ModuleIndexMapFactory {
    components: Vec<Component>,
}

impl ModuleIndexMapFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_component(&mut self, det: i32, loc: i32, z: f64) -> KfResult<()> {
        if self.components.iter().any(|c| c.det == det && c.loc == loc) {
            return Err(KfError::DuplicateComponent { det, loc });
        }
        self.components.push(Component { det, loc, z });
        Ok(())
    }

    pub fn reset(&mut self) {
        self.components.clear();
    }

    pub fn make_index_map(&self) -> ModuleIndexMap {
        let mut ordered = self.components.clone();
        ordered.sort_by(|a, b| a.z.total_cmp(&b.z));
        ModuleIndexMap::from_ordered(ordered.iter().map(|c| (c.det, c.loc)).collect())
    }
}
