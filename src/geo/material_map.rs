//! Radiation-thickness map of one material layer.

use serde::{Deserialize, Serialize};

use crate::error::{KfError, KfResult};
use crate::types::Scalar;

/// Rays per bin and axis when one map is projected onto another
const N_RAYS_PER_DIM: usize = 3;

/// Square grid of radiation thicknesses (in units of X0) transverse to z.
///
/// Bins cover [-xy_max, xy_max) along both axes; the table is stored row by
/// row with x as the outer index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialMap {
    n_bins: usize,
    xy_max: f64,
    /// Bins per cm
    factor: f64,
    z_ref: f64,
    z_min: f64,
    z_max: f64,
    table: Vec<f32>,
}

impl MaterialMap {
    pub fn new(n_bins: i32, xy_max: f64, z_ref: f64, z_min: f64, z_max: f64) -> KfResult<Self> {
        if n_bins < 1 {
            return Err(KfError::InvalidMaterialMap(format!(
                "number of bins must be positive, got {n_bins}"
            )));
        }
        if !(xy_max > 0.0) {
            return Err(KfError::InvalidMaterialMap(format!(
                "transverse half-size must be positive, got {xy_max}"
            )));
        }
        if !(z_min <= z_ref && z_ref <= z_max) {
            return Err(KfError::InconsistentZ { z_min, z_ref, z_max });
        }
        let n = n_bins as usize;
        Ok(Self {
            n_bins: n,
            xy_max,
            factor: 0.5 * n as f64 / xy_max,
            z_ref,
            z_min,
            z_max,
            table: vec![0.0; n * n],
        })
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn xy_max(&self) -> f64 {
        self.xy_max
    }

    pub fn z_ref(&self) -> f64 {
        self.z_ref
    }

    pub fn z_min(&self) -> f64 {
        self.z_min
    }

    pub fn z_max(&self) -> f64 {
        self.z_max
    }

    fn axis_bin(&self, v: f64) -> Option<usize> {
        let i = ((v + self.xy_max) * self.factor).floor();
        if i >= 0.0 && i < self.n_bins as f64 {
            Some(i as usize)
        } else {
            None
        }
    }

    /// Flat bin index at (x, y), or -1 outside the map.
    pub fn get_bin(&self, x: f64, y: f64) -> i32 {
        match (self.axis_bin(x), self.axis_bin(y)) {
            (Some(ix), Some(iy)) => (ix * self.n_bins + iy) as i32,
            _ => -1,
        }
    }

    /// Thickness at (x, y). A coordinate outside the map is replaced by the
    /// central bin of its axis.
    pub fn get_thickness_x0<T: Scalar>(&self, x: T, y: T) -> T {
        let center = self.n_bins / 2;
        let ix = self.axis_bin(x.as_f64()).unwrap_or(center);
        let iy = self.axis_bin(y.as_f64()).unwrap_or(center);
        T::cst(self.table[ix * self.n_bins + iy] as f64)
    }

    pub fn get_bin_thickness(&self, i_bin: usize) -> f32 {
        self.table[i_bin]
    }

    pub fn get_rad_thick_vec(&self) -> &[f32] {
        &self.table
    }

    pub fn set_rad_thick_bin(&mut self, ix: usize, iy: usize, thickness: f64) -> KfResult<()> {
        if ix >= self.n_bins || iy >= self.n_bins {
            return Err(KfError::IndexOutOfRange(ix.max(iy)));
        }
        self.table[ix * self.n_bins + iy] = thickness as f32;
        Ok(())
    }

    pub fn thickness_max(&self) -> f64 {
        self.table.iter().copied().fold(f32::MIN, f32::max) as f64
    }

    pub fn thickness_min(&self) -> f64 {
        self.table.iter().copied().fold(f32::MAX, f32::min) as f64
    }

    pub fn thickness_mean(&self) -> f64 {
        self.table.iter().map(|&v| v as f64).sum::<f64>() / self.table.len() as f64
    }

    /// Adds the material of `other` by casting rays through every bin.
    ///
    /// With a finite `z_target` the rays come from the target point, so the
    /// sample positions are scaled by the ratio of the distances to it.
    /// Otherwise the rays run parallel to z.
    pub fn add(&mut self, other: &MaterialMap, z_target: f64) {
        let scale = if z_target.is_finite() {
            (other.z_ref - z_target) / (self.z_ref - z_target)
        } else {
            1.0
        };
        let bin_size = 2.0 * self.xy_max / self.n_bins as f64;
        let d = 1.0 / N_RAYS_PER_DIM as f64;
        let n_rays = (N_RAYS_PER_DIM * N_RAYS_PER_DIM) as f64;

        for ix in 0..self.n_bins {
            for iy in 0..self.n_bins {
                let mut sum = 0.0;
                for rx in 0..N_RAYS_PER_DIM {
                    for ry in 0..N_RAYS_PER_DIM {
                        let x = -self.xy_max + (ix as f64 + d * (rx as f64 + 0.5)) * bin_size;
                        let y = -self.xy_max + (iy as f64 + d * (ry as f64 + 0.5)) * bin_size;
                        sum += other.get_thickness_x0(scale * x, scale * y);
                    }
                }
                self.table[ix * self.n_bins + iy] += (sum / n_rays) as f32;
            }
        }
        self.z_min = self.z_min.min(other.z_min);
        self.z_max = self.z_max.max(other.z_max);
    }

    /// Merges groups of `n_groups`×`n_groups` bins into one, averaging the
    /// thickness. The last group on an axis may be narrower.
    pub fn rebin(&mut self, n_groups: usize) -> KfResult<()> {
        if n_groups == 0 {
            return Err(KfError::InvalidMaterialMap("rebin factor must be positive".into()));
        }
        self.merge_bins(n_groups);
        Ok(())
    }

    /// `n_groups` must be positive.
    fn merge_bins(&mut self, n_groups: usize) {
        let n_groups = n_groups.min(self.n_bins);
        let n_new = self.n_bins.div_ceil(n_groups);
        let mut table = vec![0.0f32; n_new * n_new];
        let mut counts = vec![0u32; n_new * n_new];
        for ix in 0..self.n_bins {
            for iy in 0..self.n_bins {
                let j = (ix / n_groups) * n_new + iy / n_groups;
                table[j] += self.table[ix * self.n_bins + iy];
                counts[j] += 1;
            }
        }
        for (v, &c) in table.iter_mut().zip(counts.iter()) {
            *v /= c as f32;
        }
        // keep the bin width uniform over [-xy_max, xy_max)
        self.xy_max *= (n_new * n_groups) as f64 / self.n_bins as f64;
        self.n_bins = n_new;
        self.factor = 0.5 * n_new as f64 / self.xy_max;
        self.table = table;
    }

    /// Table of thicknesses in percent of X0, rebinned to at most
    /// `max_bins` per axis.
    pub fn to_string_table(&self, indent: usize, max_bins: usize) -> String {
        let mut map = self.clone();
        if max_bins > 0 && map.n_bins > max_bins {
            map.merge_bins(self.n_bins.div_ceil(max_bins));
        }
        let pad = " ".repeat(indent);
        let mut s = format!(
            "{pad}Material map: z = {:.2} [{:.2}, {:.2}] cm, |x|,|y| < {:.1} cm, {}x{} bins\n",
            map.z_ref, map.z_min, map.z_max, map.xy_max, map.n_bins, map.n_bins
        );
        s += &format!(
            "{pad}x/X0 [%]: min {:.3}, mean {:.3}, max {:.3}\n",
            100.0 * self.thickness_min(),
            100.0 * self.thickness_mean(),
            100.0 * self.thickness_max()
        );
        for iy in (0..map.n_bins).rev() {
            s.push_str(&pad);
            for ix in 0..map.n_bins {
                s += &format!("{:7.3}", 100.0 * map.table[ix * map.n_bins + iy]);
            }
            s.push('\n');
        }
        s
    }
}

/// Source of material maps for detector layers.
pub trait MaterialMapFactory: Send + Sync {
    fn generate_material_map(
        &self,
        z_ref: f64,
        z_min: f64,
        z_max: f64,
        xy_max: f64,
        n_bins: i32,
    ) -> KfResult<MaterialMap>;
}

/// Homogeneous slab filling the whole [z_min, z_max] range of every layer.
#[derive(Clone, Debug)]
pub struct HomogeneousMaterialFactory {
    /// Radiation length of the slab [cm]
    pub rad_len: f64,
    /// Projection origin; reference z is kept downstream of it
    pub target_z: Option<f64>,
}

impl HomogeneousMaterialFactory {
    pub fn new(rad_len: f64) -> Self {
        Self {
            rad_len,
            target_z: None,
        }
    }

    pub fn with_target(mut self, target_z: f64) -> Self {
        self.target_z = Some(target_z);
        self
    }
}

impl MaterialMapFactory for HomogeneousMaterialFactory {
    fn generate_material_map(
        &self,
        mut z_ref: f64,
        mut z_min: f64,
        mut z_max: f64,
        xy_max: f64,
        n_bins: i32,
    ) -> KfResult<MaterialMap> {
        if let Some(z_target) = self.target_z {
            if z_target + 0.05 >= z_ref {
                log::warn!(
                    "HomogeneousMaterialFactory: material reference z = {} is too close to the target z = {}, shifting it downstream",
                    z_ref,
                    z_target
                );
            }
            z_ref = z_ref.max(z_target + 0.05);
            z_min = z_min.max(z_target);
            z_max = z_max.max(z_ref + 0.05);
        }
        let mut map = MaterialMap::new(n_bins, xy_max, z_ref, z_min, z_max)?;
        let thickness = (z_max - z_min) / self.rad_len;
        map.table.iter_mut().for_each(|v| *v = thickness as f32);
        log::debug!(
            "HomogeneousMaterialFactory: map at z = {} with x/X0 = {:.5}",
            z_ref,
            thickness
        );
        Ok(map)
    }
}
