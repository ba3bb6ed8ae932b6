// Standard pick-and-place program
//
// Approach above the part, descend, grip, lift, carry to the drop point,
// descend, release, lift and park.

use serde::{Deserialize, Serialize};

use crate::messages::{GripperState, Waypoint};

pub const PLACE_X_M: f64 = 0.15;
pub const PLACE_Y_M: f64 = -0.25;
pub const PICK_DEPTH_MM: f64 = -7.0;
pub const PLACE_DEPTH_MM: f64 = -20.0;
/// Wrist orientation while carrying (degrees).
pub const CARRY_PHI_DEG: f64 = 90.0;
pub const REST_X_M: f64 = 0.15;
pub const REST_Y_M: f64 = -0.15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickAndPlace {
    pub pick_x: f64,
    pub pick_y: f64,
    /// Wrist orientation at the pick point (degrees).
    pub pick_phi_deg: f64,
    pub place_x: f64,
    pub place_y: f64,
    pub pick_z: f64,
    pub place_z: f64,
    pub rest: Waypoint,
}

impl PickAndPlace {
    pub fn new(pick_x: f64, pick_y: f64) -> Self {
        Self {
            pick_x,
            pick_y,
            pick_phi_deg: 0.0,
            place_x: PLACE_X_M,
            place_y: PLACE_Y_M,
            pick_z: PICK_DEPTH_MM,
            place_z: PLACE_DEPTH_MM,
            rest: Waypoint::new(REST_X_M, REST_Y_M, 0.0, 0.0, GripperState::Closed),
        }
    }

    pub fn pick_phi(mut self, phi_deg: f64) -> Self {
        self.pick_phi_deg = phi_deg;
        self
    }

    pub fn place_at(mut self, x: f64, y: f64) -> Self {
        self.place_x = x;
        self.place_y = y;
        self
    }

    pub fn depths(mut self, pick_z: f64, place_z: f64) -> Self {
        self.pick_z = pick_z;
        self.place_z = place_z;
        self
    }

    pub fn rest_at(mut self, rest: Waypoint) -> Self {
        self.rest = rest;
        self
    }

    pub fn waypoints(&self) -> Vec<Waypoint> {
        use GripperState::{Closed, Open};
        let (px, py, phi) = (self.pick_x, self.pick_y, self.pick_phi_deg);
        let (dx, dy) = (self.place_x, self.place_y);

        vec![
            Waypoint::new(px, py, 0.0, phi, Open),
            Waypoint::new(px, py, 0.0, 0.0, Open),
            Waypoint::new(px, py, self.pick_z, phi, Open),
            Waypoint::new(px, py, self.pick_z, phi, Closed),
            Waypoint::new(px, py, 0.0, CARRY_PHI_DEG, Closed),
            Waypoint::new(dx, dy, 0.0, CARRY_PHI_DEG, Closed),
            Waypoint::new(dx, dy, self.place_z, CARRY_PHI_DEG, Closed),
            Waypoint::new(dx, dy, self.place_z, CARRY_PHI_DEG, Open),
            Waypoint::new(dx, dy, 0.0, 0.0, Closed),
            self.rest,
        ]
    }
}
