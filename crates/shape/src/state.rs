//! Shape state: control points, surface points and everything derived
//! from them.
//!
//! ## Edit discipline
//!
//! - Control-point edits use swap-to-end and truncate the fit stack to the
//!   first changed slot, so the next fit only re-applies the edited suffix.
//! - Surface-point edits in discrete mode never reorder (topology is index
//!   bound) and only write through to the mirrored particle.
//! - Every structural change bumps a version counter and clears the caches
//!   keyed by it.
//! - While a [`PhysicsView`] is open every other mutation fails with
//!   [`ShapeError::PendingCommit`].

use std::fmt;
use std::time::Instant;

use constraints::{
    build_physics, refresh_constraints, refresh_shape_matching, BendingSource, ConstraintRequest, MaterialQuery,
    PhysicsState, TierCounts,
};
use fitting::basis::{elliptic_fourier, spherical_harmonics};
use fitting::{fit_incremental_1d, fit_linear, FitStack};
use glam::{DVec2, DVec3};
use meshing::{assemble_volume, pack_bubbles, triangulate_surface, PackingResult, RadialBoundary, RadialOcclusion, Topology};
use morpho_config::{Material, ShapeConfig};
use tracing::{debug, trace, warn};

use crate::boundary::{IdealShape, OutlineBoundary};
use crate::error::ShapeError;
use crate::geometry::{self, PlaneKey, Segment};
use crate::mode::{Mode, Versions};
use crate::point::{swap_to_end, Point, PointId, PointSlots};
use crate::representation::{
    EfdCoefficients, Representation, ShCoefficients, ShapeKind, ShapeModel, VolumeSource, VolumeSourceKind,
};
use crate::view::PhysicsView;

/// Condition estimates above this are reported as near-singular fits.
const ILL_CONDITIONED: f64 = 1e12;

/// Control points closer than this count as the same point.
const DISTINCT_EPSILON: f64 = 1e-12;

/// Uniform config material, or a caller-supplied query.
enum MaterialSource {
    Uniform(Material),
    Query(Box<dyn MaterialQuery + Send + Sync>),
}

impl MaterialQuery for MaterialSource {
    fn material_at(&self, position: DVec3) -> Material {
        match self {
            Self::Uniform(material) => *material,
            Self::Query(query) => query.material_at(position),
        }
    }
}

impl fmt::Debug for MaterialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform(material) => f.debug_tuple("Uniform").field(material).finish(),
            Self::Query(_) => f.write_str("Query(..)"),
        }
    }
}

/// What the last fit was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FitKey {
    kind: ShapeKind,
    order: usize,
    control: u64,
    center: u64,
}

/// The control-point / surface-point / representation aggregate.
#[derive(Debug)]
pub struct ShapeState {
    config: ShapeConfig,
    material: MaterialSource,
    control: PointSlots,
    surface: Vec<Point>,
    center: DVec3,
    representation: Option<Representation>,
    mode: Mode,
    versions: Versions,
    fit_stack: FitStack,
    fit_key: Option<FitKey>,
    pending_commit: bool,
}

impl ShapeState {
    pub fn new(config: ShapeConfig) -> Result<Self, ShapeError> {
        config.validate()?;
        Ok(Self {
            material: MaterialSource::Uniform(config.physics.material),
            config,
            control: PointSlots::new(),
            surface: Vec::new(),
            center: DVec3::ZERO,
            representation: None,
            mode: Mode::Parametric,
            versions: Versions::default(),
            fit_stack: FitStack::new(),
            fit_key: None,
            pending_commit: false,
        })
    }

    /// Use `query` instead of the uniform config material for particles
    /// and constraints built from now on.
    pub fn set_material_query(&mut self, query: impl MaterialQuery + Send + Sync + 'static) {
        self.material = MaterialSource::Query(Box::new(query));
    }

    pub fn config(&self) -> &ShapeConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    pub fn versions(&self) -> Versions {
        self.versions
    }

    pub fn control_points(&self) -> &[Point] {
        self.control.points()
    }

    pub fn control_ids(&self) -> &[PointId] {
        self.control.ids()
    }

    /// Current slot of a control point.
    pub fn control_slot_of(&self, id: PointId) -> Option<usize> {
        self.control.slot_of(id)
    }

    pub fn surface_points(&self) -> &[Point] {
        &self.surface
    }

    /// Surface points as raw bytes for an external renderer.
    pub fn surface_point_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.surface)
    }

    pub fn representation(&self) -> Option<&Representation> {
        self.representation.as_ref()
    }

    pub fn internal_points(&self) -> &[DVec3] {
        self.representation
            .as_ref()
            .map_or(&[][..], |rep| rep.model.internal_points())
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.representation.as_ref().map(|rep| &rep.topology)
    }

    /// Physics state; only trustworthy in discrete mode.
    pub fn physics(&self) -> Option<&PhysicsState> {
        self.representation.as_ref().and_then(|rep| rep.physics.as_ref())
    }

    pub fn fit_stack(&self) -> &FitStack {
        &self.fit_stack
    }

    pub fn has_pending_commit(&self) -> bool {
        self.pending_commit
    }

    /// Ideal radius of the fitted shape along `direction`.
    pub fn ideal_radius(&self, direction: DVec3) -> Option<f64> {
        self.representation
            .as_ref()
            .and_then(|rep| rep.model.ideal_radius(direction, self.center, &self.config))
    }

    // --- Control-point edits ---------------------------------------------

    /// Replace every control point and recenter on their centroid.
    pub fn set_control_points(&mut self, positions: &[DVec3]) -> Result<(), ShapeError> {
        self.ensure_no_pending()?;
        if positions.is_empty() {
            return Err(ShapeError::EmptyPointSet);
        }
        self.control = PointSlots::from_positions(positions);
        self.center = positions.iter().copied().sum::<DVec3>() / positions.len() as f64;
        self.versions.bump_control();
        self.versions.bump_center();
        self.fit_stack.clear();
        self.fit_key = None;
        self.clear_cached_angles();
        trace!("set_control_points: {} points, center {:?}", positions.len(), self.center);
        Ok(())
    }

    /// Append a control point into the hot slot; earlier fit rows stay valid.
    pub fn add_control_point(&mut self, position: DVec3) -> Result<PointId, ShapeError> {
        self.ensure_no_pending()?;
        let id = self.control.push(Point::from_position(position));
        self.versions.bump_control();
        Ok(id)
    }

    /// Move control point `slot`; returns its new slot (always the last).
    pub fn update_control_point(&mut self, slot: usize, position: DVec3) -> Result<usize, ShapeError> {
        self.ensure_no_pending()?;
        let edit = self.control.update(slot, position)?;
        self.fit_stack.truncate(edit.first_changed);
        self.versions.bump_control();
        Ok(edit.slot)
    }

    pub fn update_control_point_by_id(&mut self, id: PointId, position: DVec3) -> Result<usize, ShapeError> {
        let slot = self.control.slot_of(id).ok_or(ShapeError::InvalidPointId(id))?;
        self.update_control_point(slot, position)
    }

    /// Remove control point `slot`; the last point takes its place.
    pub fn remove_control_point(&mut self, slot: usize) -> Result<Point, ShapeError> {
        self.ensure_no_pending()?;
        let (_, point, first_changed) = self.control.remove(slot)?;
        self.fit_stack.truncate(first_changed);
        self.versions.bump_control();
        Ok(point)
    }

    /// Move the fitting center. Every fit row depends on it, so the fit
    /// stack and cached particle angles are dropped.
    pub fn set_center(&mut self, center: DVec3) -> Result<(), ShapeError> {
        self.ensure_no_pending()?;
        self.center = center;
        self.versions.bump_center();
        self.fit_stack.clear();
        self.fit_key = None;
        self.clear_cached_angles();
        Ok(())
    }

    // --- Generation and fitting ------------------------------------------

    /// Replace the representation with a freshly generated `kind`.
    ///
    /// The new representation starts in parametric mode without physics.
    pub fn generate(&mut self, kind: ShapeKind) -> Result<(), ShapeError> {
        self.ensure_no_pending()?;
        if self.control.is_empty() {
            return Err(ShapeError::EmptyPointSet);
        }
        let start = Instant::now();
        let order = self.basis_order(kind);

        let (model, surface) = match kind {
            ShapeKind::Points => (ShapeModel::Points, self.control.points().to_vec()),
            ShapeKind::Line => (ShapeModel::Line, self.control.points().to_vec()),
            ShapeKind::SphericalHarmonics => {
                let sh = self.fit_sh(order)?;
                let surface = self.sh_surface(&sh);
                (ShapeModel::SphericalHarmonics(sh), surface)
            }
            ShapeKind::EllipticFourier2D => {
                let efd = self.fit_efd(order)?;
                let surface = self.efd_surface(&efd);
                (ShapeModel::EllipticFourier2D(efd), surface)
            }
            ShapeKind::Volumetric(VolumeSourceKind::SphericalHarmonics) => {
                let sh = self.fit_sh(order)?;
                let packed = self.pack_sh(&sh)?;
                let surface = packed.surface.iter().copied().map(Point::from_position).collect();
                let model = ShapeModel::Volumetric {
                    source: VolumeSource::SphericalHarmonics(sh),
                    internal: packed.internal,
                };
                (model, surface)
            }
            ShapeKind::Volumetric(VolumeSourceKind::EllipticFourier2D) => {
                let efd = self.fit_efd(order)?;
                let packed = self.pack_efd(&efd)?;
                let surface = packed.surface.iter().copied().map(Point::from_position).collect();
                let model = ShapeModel::Volumetric {
                    source: VolumeSource::EllipticFourier2D(efd),
                    internal: packed.internal,
                };
                (model, surface)
            }
            ShapeKind::Cloth => {
                let (columns, rows) = (self.config.physics.cloth_columns, self.config.physics.cloth_rows);
                (ShapeModel::Cloth { columns, rows }, self.cloth_grid(columns, rows))
            }
        };

        let internal_count = model.internal_points().len();
        self.representation = Some(Representation::new(model, surface.len()));
        self.surface = surface;
        self.mode = Mode::Parametric;
        self.fit_key = Some(self.fit_key_for(kind, order));
        self.versions.bump_surface();
        debug!(
            "generate: {:?}, {} surface, {} internal points in {:?}",
            kind,
            self.surface.len(),
            internal_count,
            start.elapsed()
        );
        Ok(())
    }

    /// Re-fit the current representation to the control points.
    ///
    /// Returns `false` when nothing changed since the last fit. In
    /// parametric mode the surface is regenerated; in discrete mode the
    /// surface keeps its particles and only the shape-matching targets
    /// follow the new ideal shape.
    pub fn refit(&mut self) -> Result<bool, ShapeError> {
        self.ensure_no_pending()?;
        let kind = self
            .representation
            .as_ref()
            .ok_or(ShapeError::NoRepresentation)?
            .model
            .kind();
        let order = self.basis_order(kind);
        let key = self.fit_key_for(kind, order);
        if self.fit_key == Some(key) {
            trace!("refit: {:?} unchanged since last fit", kind);
            return Ok(false);
        }
        if self.control.is_empty() {
            return Err(ShapeError::EmptyPointSet);
        }
        let start = Instant::now();

        // Radial fractions are taken against the shape before it changes
        self.cache_particle_angles();

        let sh = match kind {
            ShapeKind::SphericalHarmonics | ShapeKind::Volumetric(VolumeSourceKind::SphericalHarmonics) => {
                Some(self.fit_sh(order)?)
            }
            _ => None,
        };
        let efd = match kind {
            ShapeKind::EllipticFourier2D | ShapeKind::Volumetric(VolumeSourceKind::EllipticFourier2D) => {
                Some(self.fit_efd(order)?)
            }
            _ => None,
        };

        let regenerated = if self.mode == Mode::Discrete {
            None
        } else {
            Some(match kind {
                ShapeKind::Points | ShapeKind::Line => self.control.points().to_vec(),
                ShapeKind::SphericalHarmonics => sh.as_ref().map(|sh| self.sh_surface(sh)).unwrap_or_default(),
                ShapeKind::EllipticFourier2D => efd.as_ref().map(|efd| self.efd_surface(efd)).unwrap_or_default(),
                ShapeKind::Cloth => {
                    let (columns, rows) = (self.config.physics.cloth_columns, self.config.physics.cloth_rows);
                    self.cloth_grid(columns, rows)
                }
                // Packed surfaces change only by regeneration
                ShapeKind::Volumetric(_) => self.surface.clone(),
            })
        };

        let rep = self.representation.as_mut().ok_or(ShapeError::NoRepresentation)?;
        match &mut rep.model {
            ShapeModel::SphericalHarmonics(current)
            | ShapeModel::Volumetric { source: VolumeSource::SphericalHarmonics(current), .. } => {
                if let Some(sh) = sh {
                    *current = sh;
                }
            }
            ShapeModel::EllipticFourier2D(current)
            | ShapeModel::Volumetric { source: VolumeSource::EllipticFourier2D(current), .. } => {
                if let Some(efd) = efd {
                    *current = efd;
                }
            }
            ShapeModel::Points | ShapeModel::Line | ShapeModel::Cloth { .. } => {}
        }
        rep.cache.clear();

        let retargeted = match regenerated {
            Some(surface) => {
                if surface.len() != self.surface.len() {
                    rep.topology = Topology::new(surface.len() + rep.model.internal_points().len());
                }
                self.surface = surface;
                0
            }
            None => self.retarget_shape_matching(),
        };

        self.fit_key = Some(key);
        self.versions.bump_surface();
        debug!(
            "refit: {:?} order {}, {} shape-matching targets updated in {:?}",
            kind,
            order,
            retargeted,
            start.elapsed()
        );
        Ok(true)
    }

    fn basis_order(&self, kind: ShapeKind) -> usize {
        match kind {
            ShapeKind::SphericalHarmonics | ShapeKind::Volumetric(VolumeSourceKind::SphericalHarmonics) => {
                self.config.fitting.sh_order
            }
            ShapeKind::EllipticFourier2D | ShapeKind::Volumetric(VolumeSourceKind::EllipticFourier2D) => {
                self.config.fitting.efd_order
            }
            ShapeKind::Points | ShapeKind::Line | ShapeKind::Cloth => 0,
        }
    }

    fn fit_key_for(&self, kind: ShapeKind, order: usize) -> FitKey {
        FitKey {
            kind,
            order,
            control: self.versions.control,
            center: self.versions.center,
        }
    }

    fn fit_sh(&mut self, order: usize) -> Result<ShCoefficients, ShapeError> {
        let positions = self.control.positions();
        let (matrix, targets) = spherical_harmonics::build_system(&positions, self.center, order)?;

        if !self.config.fitting.incremental {
            let fit = fit_linear(&matrix, &targets)?;
            self.check_condition(fit.condition);
            return Ok(ShCoefficients {
                order,
                coefficients: fit.coefficients,
            });
        }

        if self.fit_stack.ensure_basis_order(order) {
            trace!("fit_sh: basis order changed to {}, fit stack cleared", order);
        }
        let coefficients = match fit_incremental_1d(&matrix, &targets, &mut self.fit_stack) {
            Ok(fit) => {
                trace!(
                    "fit_sh: {} rows reused, {} rows added",
                    fit.rows_reused,
                    fit.rows_added
                );
                self.check_condition(fit.condition);
                fit.coefficients
            }
            Err(err) => {
                self.report_degeneracy(format_args!("incremental fit failed ({err}), refitting from scratch"));
                self.fit_stack.clear();
                let fit = fit_linear(&matrix, &targets)?;
                self.check_condition(fit.condition);
                fit.coefficients
            }
        };
        Ok(ShCoefficients { order, coefficients })
    }

    fn fit_efd(&self, order: usize) -> Result<EfdCoefficients, ShapeError> {
        let outline: Vec<DVec2> = self.control.points().iter().map(|p| p.position().truncate()).collect();
        let system = elliptic_fourier::build_system(&outline, order)?;
        let x = fit_linear(&system.matrix, &system.x)?;
        let y = fit_linear(&system.matrix, &system.y)?;
        self.check_condition(x.condition);
        Ok(EfdCoefficients {
            order,
            x: x.coefficients,
            y: y.coefficients,
            plane_z: self.center.z,
        })
    }

    fn check_condition(&self, condition: f64) {
        if !(condition < ILL_CONDITIONED) {
            self.report_degeneracy(format_args!("fit is ill-conditioned (condition {condition:.3e})"));
        }
    }

    fn report_degeneracy(&self, message: fmt::Arguments<'_>) {
        if self.config.verbose {
            warn!("{}", message);
        } else {
            trace!("{}", message);
        }
    }

    fn sh_surface(&self, sh: &ShCoefficients) -> Vec<Point> {
        let min_radius = self.config.fitting.min_radius;
        let mut clamped = 0;
        let points = spherical_harmonics::fibonacci_directions(self.config.fitting.surface_samples)
            .into_iter()
            .map(|dir| {
                let sample = spherical_harmonics::evaluate_direction(dir, &sh.coefficients, min_radius);
                if sample.clamped {
                    clamped += 1;
                }
                Point::from_position(self.center + dir * sample.radius)
            })
            .collect();
        if clamped > 0 {
            self.report_degeneracy(format_args!("{clamped} surface radii clamped to {min_radius}"));
        }
        points
    }

    fn efd_surface(&self, efd: &EfdCoefficients) -> Vec<Point> {
        efd.outline_points(self.config.fitting.efd_samples)
            .into_iter()
            .map(Point::from_position)
            .collect()
    }

    fn pack_sh(&self, sh: &ShCoefficients) -> Result<PackingResult, ShapeError> {
        let min_radius = self.config.fitting.min_radius;
        let radius = |dir: DVec3| spherical_harmonics::evaluate_direction(dir, &sh.coefficients, min_radius).radius;
        let half_extent = spherical_harmonics::fibonacci_directions(self.config.fitting.surface_samples)
            .into_iter()
            .fold(DVec3::ZERO, |acc, dir| acc.max(dir.abs() * radius(dir)));

        let boundary = RadialBoundary::new(self.center, radius);
        Ok(pack_bubbles(&boundary, self.center, half_extent, &self.config.packing)?)
    }

    fn pack_efd(&self, efd: &EfdCoefficients) -> Result<PackingResult, ShapeError> {
        let center = self.center.truncate().extend(efd.plane_z);
        let boundary = OutlineBoundary {
            center,
            outline: efd.outline(self.config.fitting.efd_samples),
            plane_z: efd.plane_z,
            half_thickness: self.config.topology.efd_half_thickness,
            min_radius: self.config.fitting.min_radius,
        };
        let planar_extent = boundary
            .outline
            .iter()
            .fold(DVec2::ZERO, |acc, &p| acc.max((p - center.truncate()).abs()));
        let half_extent = planar_extent.extend(boundary.half_thickness);

        let mut packed = pack_bubbles(&boundary, center, half_extent, &self.config.packing)?;
        // Ring topology follows the outline, so order by polar angle
        let angle = |p: &DVec3| (p.y - center.y).atan2(p.x - center.x);
        packed.surface.sort_by(|a, b| angle(a).total_cmp(&angle(b)));
        Ok(packed)
    }

    /// Grid over the control points' XY bounds at their mean height.
    fn cloth_grid(&self, columns: usize, rows: usize) -> Vec<Point> {
        let positions = self.control.positions();
        let first = positions.first().copied().unwrap_or(self.center);
        let distinct = positions.iter().any(|p| p.distance(first) > DISTINCT_EPSILON);

        let (mid, size, z) = if distinct {
            let (min, max) = positions.iter().fold(
                (DVec2::splat(f64::INFINITY), DVec2::splat(f64::NEG_INFINITY)),
                |(min, max), p| (min.min(p.truncate()), max.max(p.truncate())),
            );
            let mut size = max - min;
            // Points spread along one axis (or only in z) still get an area
            let span = size.max_element();
            let fill = if span > DISTINCT_EPSILON { span } else { 1.0 };
            if size.x <= DISTINCT_EPSILON {
                size.x = fill;
            }
            if size.y <= DISTINCT_EPSILON {
                size.y = fill;
            }
            let z = positions.iter().map(|p| p.z).sum::<f64>() / positions.len() as f64;
            ((min + max) * 0.5, size, z)
        } else {
            (first.truncate(), DVec2::ONE, first.z)
        };

        let origin = mid - size * 0.5;
        let step = |i: usize, n: usize| if n > 1 { i as f64 / (n - 1) as f64 } else { 0.5 };
        let mut grid = Vec::with_capacity(columns * rows);
        for r in 0..rows {
            for c in 0..columns {
                let p = origin + size * DVec2::new(step(c, columns), step(r, rows));
                grid.push(Point::new(p.x, p.y, z));
            }
        }
        grid
    }

    // --- Physics ----------------------------------------------------------

    /// Build (or refresh) topology and physics, entering discrete mode.
    ///
    /// With `force == false` and existing physics, topology and particle
    /// identity are kept and only rest values and materials are refreshed;
    /// counts that no longer line up fail with [`ShapeError::CountMismatch`].
    pub fn rebuild_physics_topology(&mut self, force: bool) -> Result<(), ShapeError> {
        self.ensure_no_pending()?;
        let start = Instant::now();
        let has_physics = self
            .representation
            .as_ref()
            .ok_or(ShapeError::NoRepresentation)?
            .physics
            .is_some();

        let incremental = has_physics && !force;
        if incremental {
            self.refresh_physics()?;
        } else {
            let (topology, physics) = self.derive_physics()?;
            let rep = self.representation.as_mut().ok_or(ShapeError::NoRepresentation)?;
            rep.topology = topology;
            rep.physics = Some(physics);
        }

        let rep = self.representation.as_mut().ok_or(ShapeError::NoRepresentation)?;
        rep.cache.clear();
        self.mode = Mode::Discrete;
        self.versions.bump_surface();

        let (particles, counts) = rep
            .physics
            .as_ref()
            .map(|p| (p.particle_count(), TierCounts::of(&p.constraints)))
            .unwrap_or_default();
        debug!(
            "rebuild_physics_topology: {} ({} particles, {} structural, {} bending, {} shape-matching) in {:?}",
            if incremental { "refreshed" } else { "rebuilt" },
            particles,
            counts.structural,
            counts.bending,
            counts.shape_matching,
            start.elapsed()
        );
        Ok(())
    }

    fn derive_physics(&self) -> Result<(Topology, PhysicsState), ShapeError> {
        let rep = self.representation.as_ref().ok_or(ShapeError::NoRepresentation)?;
        let surface: Vec<DVec3> = self.surface.iter().map(Point::position).collect();
        let n = surface.len();

        let (topology, bending, shape_matching) = match &rep.model {
            ShapeModel::Points => (Topology::new(n), BendingSource::None, false),
            ShapeModel::SphericalHarmonics(_) => (self.triangulate(&rep.model, &surface)?, BendingSource::Triangles, false),
            ShapeModel::EllipticFourier2D(_) => (Topology::ring(n), BendingSource::Chain { closed: true }, false),
            ShapeModel::Cloth { columns, rows } => {
                if columns * rows != n {
                    return Err(ShapeError::CountMismatch {
                        what: "cloth grid vertex",
                        expected: columns * rows,
                        found: n,
                    });
                }
                (Topology::grid(*columns, *rows)?, BendingSource::Triangles, false)
            }
            ShapeModel::Line => (Topology::polyline(n), BendingSource::Chain { closed: false }, false),
            ShapeModel::Volumetric { source, internal } => {
                let (shell, bending) = match source {
                    VolumeSource::SphericalHarmonics(_) => {
                        (self.triangulate(&rep.model, &surface)?, BendingSource::Triangles)
                    }
                    VolumeSource::EllipticFourier2D(_) => (Topology::ring(n), BendingSource::Chain { closed: true }),
                };
                let (topology, stats) = assemble_volume(&shell, &surface, internal, &self.config.topology)?;
                trace!(
                    "derive_physics: {} skeleton edges, {} links",
                    stats.skeleton_edges,
                    stats.links
                );
                (topology, bending, true)
            }
        };

        let mut positions = surface;
        positions.extend_from_slice(rep.model.internal_points());
        let request = ConstraintRequest {
            topology: &topology,
            positions: &positions,
            surface_count: n,
            bending,
            shape_matching,
        };
        let mut physics = build_physics(&request, &self.material, &self.config.physics)?;

        if let Some(ideal) = rep.model.ideal_shape(self.center, &self.config) {
            for particle in &mut physics.particles {
                particle.angles(self.center, self.versions.center, |dir| ideal.radius(dir));
            }
        }
        Ok((topology, physics))
    }

    fn triangulate(&self, model: &ShapeModel, surface: &[DVec3]) -> Result<Topology, ShapeError> {
        let Some(ideal) = model.ideal_shape(self.center, &self.config) else {
            return Ok(Topology::new(surface.len()));
        };
        let occlusion = RadialOcclusion {
            center: self.center,
            ratio: self.config.topology.occlusion_ratio,
            ideal_radius: |dir: DVec3| ideal.radius(dir),
        };
        Ok(triangulate_surface(surface, self.center, &occlusion, &self.config.topology)?)
    }

    fn refresh_physics(&mut self) -> Result<(), ShapeError> {
        let rep = self.representation.as_mut().ok_or(ShapeError::NoRepresentation)?;
        let physics = rep.physics.as_mut().ok_or(ShapeError::MissingPhysics)?;

        let expected_internal = rep.model.internal_points().len();
        let checks = [
            ("surface particle", self.surface.len(), physics.surface_count),
            ("internal particle", expected_internal, physics.internal_count),
            ("topology vertex", physics.particle_count(), rep.topology.vertex_count()),
        ];
        for (what, expected, found) in checks {
            if expected != found {
                return Err(ShapeError::CountMismatch { what, expected, found });
            }
        }
        let structural = TierCounts::of(&physics.constraints).structural;
        if structural != rep.topology.edges().len() {
            return Err(ShapeError::CountMismatch {
                what: "structural constraint",
                expected: rep.topology.edges().len(),
                found: structural,
            });
        }

        let internal = physics
            .particles
            .get(physics.internal_range())
            .ok_or(ShapeError::CountMismatch {
                what: "internal particle range",
                expected: physics.particle_count(),
                found: physics.internal_range().end,
            })?;

        // Rest pose: surface points as edited, internal particles as they are
        let mut rest: Vec<DVec3> = self.surface.iter().map(Point::position).collect();
        rest.extend(internal.iter().map(|p| p.position));

        refresh_constraints(&mut physics.constraints, &rep.topology, &rest, &self.material, &self.config.physics)?;
        physics.apply_material(&self.material);
        Ok(())
    }

    /// Make sure every particle has angles for the current center version.
    fn cache_particle_angles(&mut self) {
        let Some(rep) = self.representation.as_mut() else {
            return;
        };
        let Some(ideal) = rep.model.ideal_shape(self.center, &self.config) else {
            return;
        };
        if let Some(physics) = rep.physics.as_mut() {
            for particle in &mut physics.particles {
                particle.angles(self.center, self.versions.center, |dir| ideal.radius(dir));
            }
        }
    }

    /// Point shape-matching offsets at the current ideal shape.
    fn retarget_shape_matching(&mut self) -> usize {
        let Some(rep) = self.representation.as_mut() else {
            return 0;
        };
        let Some(ideal) = rep.model.ideal_shape(self.center, &self.config) else {
            return 0;
        };
        let Some(physics) = rep.physics.as_mut() else {
            return 0;
        };
        let targets = ideal_targets(physics, &ideal, self.center, self.versions.center);
        let masses = physics.masses();
        let internal = physics.internal_range();
        refresh_shape_matching(&mut physics.constraints, &targets, &masses, internal)
    }

    fn clear_cached_angles(&mut self) {
        if let Some(physics) = self.representation.as_mut().and_then(|rep| rep.physics.as_mut()) {
            physics.clear_cached_angles();
        }
    }

    /// Move surface point `index`; returns its index afterwards.
    ///
    /// Discrete mode writes in place through to the mirrored particle.
    /// Parametric edits also stay in place for models whose topology
    /// follows point order (outlines, lines, cloth); any other point moves
    /// to the last slot.
    pub fn set_surface_point(&mut self, index: usize, position: DVec3) -> Result<usize, ShapeError> {
        self.ensure_no_pending()?;
        if index >= self.surface.len() {
            return Err(ShapeError::IndexOutOfRange {
                index,
                len: self.surface.len(),
            });
        }

        let ordered = self
            .representation
            .as_ref()
            .is_some_and(|rep| rep.model.ordered_surface());
        let slot = if self.mode == Mode::Discrete || ordered {
            self.surface[index].set_position(position);
            if self.mode == Mode::Discrete {
                if let Some(physics) = self.representation.as_mut().and_then(|rep| rep.physics.as_mut()) {
                    if let Some(particle) = physics.particles.get_mut(physics.surface_start + index) {
                        particle.teleport(position);
                    }
                }
            }
            index
        } else {
            let mut point = self.surface[index];
            point.set_position(position);
            swap_to_end(&mut self.surface, index, point);
            self.surface.len() - 1
        };

        self.versions.bump_surface();
        if let Some(rep) = self.representation.as_mut() {
            rep.cache.clear();
        }
        Ok(slot)
    }

    /// Pin or release particle `index`.
    pub fn set_particle_fixed(&mut self, index: usize, fixed: bool) -> Result<(), ShapeError> {
        self.ensure_no_pending()?;
        let physics = self.discrete_physics_mut()?;
        let len = physics.particle_count();
        let particle = physics
            .particles
            .get_mut(index)
            .ok_or(ShapeError::IndexOutOfRange { index, len })?;
        particle.set_fixed(fixed);
        Ok(())
    }

    /// Hand the physics state to an integrator until [`PhysicsView::commit`].
    pub fn physics_view(&mut self) -> Result<PhysicsView<'_>, ShapeError> {
        self.ensure_no_pending()?;
        self.discrete_physics_mut()?;
        self.pending_commit = true;
        Ok(PhysicsView::new(self))
    }

    /// Write surface particle positions back into the surface points.
    pub fn commit_physics(&mut self) -> Result<(), ShapeError> {
        let surface_len = self.surface.len();
        let physics = self.discrete_physics_mut()?;
        if physics.surface_count != surface_len {
            return Err(ShapeError::CountMismatch {
                what: "surface particle",
                expected: surface_len,
                found: physics.surface_count,
            });
        }
        let range = physics.surface_range();
        let positions: Vec<DVec3> = physics
            .particles
            .get(range.clone())
            .ok_or(ShapeError::CountMismatch {
                what: "surface particle range",
                expected: physics.particle_count(),
                found: range.end,
            })?
            .iter()
            .map(|p| p.position)
            .collect();

        for (point, position) in self.surface.iter_mut().zip(positions) {
            point.set_position(position);
        }
        self.pending_commit = false;
        self.versions.bump_surface();
        if let Some(rep) = self.representation.as_mut() {
            rep.cache.clear();
        }
        trace!("commit_physics: {} surface points written back", surface_len);
        Ok(())
    }

    pub(crate) fn discrete_physics_mut(&mut self) -> Result<&mut PhysicsState, ShapeError> {
        if self.mode != Mode::Discrete {
            return Err(ShapeError::InvalidMode {
                expected: Mode::Discrete,
                found: self.mode,
            });
        }
        self.representation
            .as_mut()
            .and_then(|rep| rep.physics.as_mut())
            .ok_or(ShapeError::MissingPhysics)
    }

    fn ensure_no_pending(&self) -> Result<(), ShapeError> {
        if self.pending_commit {
            Err(ShapeError::PendingCommit)
        } else {
            Ok(())
        }
    }

    // --- Geometry ---------------------------------------------------------

    /// Enclosed volume: signed tetrahedral sum over the surface triangles,
    /// or quadrature of the fitted radius when there are none.
    pub fn volume(&mut self) -> Result<f64, ShapeError> {
        let rep = self.representation.as_mut().ok_or(ShapeError::NoRepresentation)?;
        rep.cache.sync(self.versions.surface);
        let (model, topology, surface, center, config) = (&rep.model, &rep.topology, &self.surface, self.center, &self.config);

        Ok(rep.cache.volume_or_insert_with(|| {
            if !topology.triangles().is_empty() {
                let positions: Vec<DVec3> = surface.iter().map(Point::position).collect();
                return geometry::mesh_volume(&positions, topology.triangles(), center);
            }
            match (model.sh(), model.ideal_shape(center, config)) {
                (Some(_), Some(ideal)) => {
                    let directions = spherical_harmonics::fibonacci_directions(config.fitting.surface_samples);
                    geometry::radial_volume(&directions, |dir| ideal.radius(dir))
                }
                _ => 0.0,
            }
        }))
    }

    /// Surface area: triangle sum, the outline's shoelace area for planar
    /// models, or quadrature of the fitted radius.
    pub fn surface_area(&mut self) -> Result<f64, ShapeError> {
        let rep = self.representation.as_mut().ok_or(ShapeError::NoRepresentation)?;
        rep.cache.sync(self.versions.surface);
        let (model, topology, surface, center, config) = (&rep.model, &rep.topology, &self.surface, self.center, &self.config);

        Ok(rep.cache.surface_area_or_insert_with(|| {
            let positions: Vec<DVec3> = surface.iter().map(Point::position).collect();
            if !topology.triangles().is_empty() {
                return geometry::mesh_area(&positions, topology.triangles());
            }
            if model.efd().is_some() {
                return geometry::outline_area(&positions);
            }
            match (model.sh(), model.ideal_shape(center, config)) {
                (Some(_), Some(ideal)) => {
                    let directions = spherical_harmonics::fibonacci_directions(config.fitting.surface_samples);
                    geometry::radial_area(&directions, |dir| ideal.radius(dir))
                }
                _ => 0.0,
            }
        }))
    }

    /// Segments where the surface triangles cross `normal · p = offset`.
    pub fn plane_section(&mut self, normal: DVec3, offset: f64) -> Result<Vec<Segment>, ShapeError> {
        let rep = self.representation.as_mut().ok_or(ShapeError::NoRepresentation)?;
        rep.cache.sync(self.versions.surface);
        let (topology, surface) = (&rep.topology, &self.surface);

        let segments = rep.cache.section_or_insert_with(PlaneKey::new(normal, offset), || {
            let positions: Vec<DVec3> = surface.iter().map(Point::position).collect();
            geometry::plane_section(&positions, topology.triangles(), normal, offset)
        });
        Ok(segments.to_vec())
    }

    // --- Persistence hooks ------------------------------------------------

    pub(crate) fn parts(&self) -> (&PointSlots, DVec3, &[Point], Option<&Representation>, Mode, Versions) {
        (
            &self.control,
            self.center,
            &self.surface,
            self.representation.as_ref(),
            self.mode,
            self.versions,
        )
    }

    pub(crate) fn restore(
        &mut self,
        control: PointSlots,
        center: DVec3,
        surface: Vec<Point>,
        representation: Option<Representation>,
        mode: Mode,
        versions: Versions,
    ) {
        self.control = control;
        self.center = center;
        self.surface = surface;
        self.representation = representation;
        self.mode = mode;
        self.versions = versions;
        self.fit_stack.clear();
        self.fit_key = None;
        self.pending_commit = false;
    }
}

/// Ideal position for every particle: its cached direction and radial
/// fraction applied to `ideal`.
fn ideal_targets(physics: &mut PhysicsState, ideal: &IdealShape<'_>, center: DVec3, center_version: u64) -> Vec<DVec3> {
    physics
        .particles
        .iter_mut()
        .map(|particle| {
            let angles = particle.angles(center, center_version, |dir| ideal.radius(dir));
            let dir = angles.direction();
            center + dir * (angles.radial_fraction * ideal.radius(dir))
        })
        .collect()
}
