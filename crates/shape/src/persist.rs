//! JSON persistence of a shape.
//!
//! A [`ShapeSnapshot`] carries everything needed to continue editing:
//! control points with their ids, the center, surface points, the
//! representation (model, topology and physics), the mode and every version
//! counter. Point scratch fields, the geometry cache and the fit stack are
//! transient; the fit stack is rebuilt by the first refit after loading.

use constraints::validate_constraints;
use glam::DVec3;
use morpho_config::ShapeConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ShapeError;
use crate::mode::{Mode, Versions};
use crate::point::{Point, PointId, PointSlots};
use crate::representation::Representation;
use crate::state::ShapeState;

/// Serializable shape contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeSnapshot {
    pub control_points: Vec<Point>,
    pub control_ids: Vec<PointId>,
    pub next_point_id: u64,
    pub center: DVec3,
    pub surface_points: Vec<Point>,
    pub representation: Option<Representation>,
    pub mode: Mode,
    pub versions: Versions,
}

impl ShapeSnapshot {
    pub fn to_json(&self) -> Result<String, ShapeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ShapeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reject snapshots whose parts disagree with each other.
    fn check(&self) -> Result<(), ShapeError> {
        let Some(rep) = &self.representation else {
            if self.mode == Mode::Discrete {
                return Err(ShapeError::NoRepresentation);
            }
            return Ok(());
        };
        rep.topology.validate()?;

        let Some(physics) = &rep.physics else {
            if self.mode == Mode::Discrete {
                return Err(ShapeError::MissingPhysics);
            }
            return Ok(());
        };
        let internal = rep.model.internal_points().len();
        let checks = [
            ("surface particle", self.surface_points.len(), physics.surface_count),
            ("internal particle", internal, physics.internal_count),
            ("topology vertex", physics.particle_count(), rep.topology.vertex_count()),
        ];
        for (what, expected, found) in checks {
            if expected != found {
                return Err(ShapeError::CountMismatch { what, expected, found });
            }
        }
        physics.check_ranges()?;
        validate_constraints(&physics.constraints, physics.particle_count())?;
        Ok(())
    }
}

impl ShapeState {
    pub fn snapshot(&self) -> ShapeSnapshot {
        let (control, center, surface, representation, mode, versions) = self.parts();
        ShapeSnapshot {
            control_points: control.points().to_vec(),
            control_ids: control.ids().to_vec(),
            next_point_id: control.next_id(),
            center,
            surface_points: surface.to_vec(),
            representation: representation.map(Representation::without_cache),
            mode,
            versions,
        }
    }

    /// New state under `config` holding the contents of `snapshot`.
    pub fn from_snapshot(config: ShapeConfig, snapshot: ShapeSnapshot) -> Result<Self, ShapeError> {
        snapshot.check()?;
        let control = PointSlots::from_parts(snapshot.control_points, snapshot.control_ids, snapshot.next_point_id)?;

        let mut state = Self::new(config)?;
        debug!(
            "from_snapshot: {} control points, {} surface points, {:?}",
            control.len(),
            snapshot.surface_points.len(),
            snapshot.mode
        );
        state.restore(
            control,
            snapshot.center,
            snapshot.surface_points,
            snapshot.representation,
            snapshot.mode,
            snapshot.versions,
        );
        Ok(state)
    }

    pub fn to_json(&self) -> Result<String, ShapeError> {
        self.snapshot().to_json()
    }

    pub fn from_json(config: ShapeConfig, json: &str) -> Result<Self, ShapeError> {
        Self::from_snapshot(config, ShapeSnapshot::from_json(json)?)
    }
}
