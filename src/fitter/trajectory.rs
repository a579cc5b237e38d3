use serde::{Deserialize, Serialize};

use crate::data::{MeasurementTime, MeasurementXy, TrackParam};

/// Material crossed at a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum NodeMaterial {
    #[default]
    None,
    /// Thickness looked up in the material map of a setup layer
    Layer(usize),
    /// Fixed thickness [X0]
    Fixed(f64),
}

/// One z position along a track: an optional hit, optional material and the
/// fitted states on both sides of the material.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryNode {
    pub z: f64,
    pub mxy: Option<MeasurementXy<f64>>,
    pub mt: Option<MeasurementTime<f64>>,
    pub material: NodeMaterial,
    /// Thickness used by the last fit [X0]
    pub rad_thick: f64,

    /// State on the upstream side of the node material
    pub param_up: TrackParam<f64>,
    /// State on the downstream side of the node material
    pub param_dn: TrackParam<f64>,
    pub is_fitted: bool,

    /// External address of the module, if any
    pub reference: Option<(i32, i32)>,
}

impl TrajectoryNode {
    pub fn new(z: f64) -> Self {
        Self {
            z,
            ..Default::default()
        }
    }

    pub fn with_hit(mut self, mxy: MeasurementXy<f64>) -> Self {
        self.mxy = Some(mxy);
        self
    }

    pub fn with_time(mut self, mt: MeasurementTime<f64>) -> Self {
        self.mt = Some(mt);
        self
    }

    pub fn with_material(mut self, material: NodeMaterial) -> Self {
        self.material = material;
        if let NodeMaterial::Fixed(x) = material {
            self.rad_thick = x;
        }
        self
    }

    pub fn with_reference(mut self, det: i32, loc: i32) -> Self {
        self.reference = Some((det, loc));
        self
    }

    pub fn has_hit(&self) -> bool {
        self.mxy.is_some()
    }
}

/// Nodes of one track, normally ordered in z.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub nodes: Vec<TrajectoryNode>,
    /// The nodes hold a fit that the next fit may linearize around
    pub is_fitted: bool,
}

impl Trajectory {
    pub fn new(nodes: Vec<TrajectoryNode>) -> Self {
        Self {
            nodes,
            is_fitted: false,
        }
    }

    /// Stable sort of the nodes in z.
    pub fn order_nodes_in_z(&mut self) {
        self.nodes.sort_by(|a, b| a.z.total_cmp(&b.z));
    }

    pub fn is_ordered_in_z(&self) -> bool {
        self.nodes.windows(2).all(|w| w[0].z <= w[1].z)
    }

    /// Indices of the first and the last node with a hit.
    pub fn hit_range(&self) -> Option<(usize, usize)> {
        let first = self.nodes.iter().position(|n| n.has_hit())?;
        let last = self.nodes.iter().rposition(|n| n.has_hit())?;
        Some((first, last))
    }

    pub fn n_hits(&self) -> usize {
        self.nodes.iter().filter(|n| n.has_hit()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(z: f64) -> TrajectoryNode {
        TrajectoryNode::new(z).with_hit(MeasurementXy::from_resolution(0.0, 0.0, 0.01, 0.01))
    }

    #[test]
    fn test_order_nodes_in_z() {
        let mut t = Trajectory::new(vec![hit(30.0), TrajectoryNode::new(5.0), hit(10.0), hit(20.0)]);
        assert!(!t.is_ordered_in_z());
        t.order_nodes_in_z();
        assert!(t.is_ordered_in_z());
        let zs: Vec<f64> = t.nodes.iter().map(|n| n.z).collect();
        assert_eq!(zs, vec![5.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_hit_range() {
        let t = Trajectory::new(vec![
            TrajectoryNode::new(0.0),
            hit(10.0),
            TrajectoryNode::new(15.0),
            hit(20.0),
            TrajectoryNode::new(40.0),
        ]);
        assert_eq!(t.hit_range(), Some((1, 3)));
        assert_eq!(t.n_hits(), 2);
        assert_eq!(Trajectory::new(vec![TrajectoryNode::new(1.0)]).hit_range(), None);
    }

    #[test]
    fn test_fixed_material_sets_thickness() {
        let n = TrajectoryNode::new(1.0).with_material(NodeMaterial::Fixed(0.004));
        assert_eq!(n.rad_thick, 0.004);
        let n = TrajectoryNode::new(1.0).with_material(NodeMaterial::Layer(2));
        assert_eq!(n.rad_thick, 0.0);
    }
}
