//! Bubble packing: relaxation-based volumetric sampling of a shape.
//!
//! 1. Scatter `target_count` points in a padded box around the center,
//!    rejection-sampling against the boundary
//! 2. For `iterations` rounds, push apart pairs closer than `spacing`
//!    (damped), then project against the boundary
//! 3. Classify the remaining points surface/internal
//! 4. Promote the internal points nearest the boundary until the surface
//!    quota `surface_ratio × target_count` is met
//!
//! The result is fully determined by the seed: neighbor lists come back
//! sorted from the octree and every pass reads the previous round's
//! positions only.

use std::time::Instant;

use glam::DVec3;
use morpho_config::PackingConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::boundary::{BoundarySample, BoundaryTest};
use crate::error::MeshError;
use crate::spatial::{Aabb, PointOctree};

/// Pairs closer than this have no usable push direction.
const MIN_PAIR_DISTANCE: f64 = 1e-12;

/// Blend weight above which a pulled point counts as surface.
const SURFACE_BLEND: f64 = 0.5;

/// Counters describing one packing run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackingStats {
    /// Points that never landed inside during scatter and were projected
    pub scatter_fallbacks: usize,
    /// Internal points promoted to meet the surface quota
    pub promoted: usize,
    pub iterations: usize,
}

/// Packed points, surface first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackingResult {
    pub surface: Vec<DVec3>,
    pub internal: Vec<DVec3>,
    pub stats: PackingStats,
}

impl PackingResult {
    pub fn len(&self) -> usize {
        self.surface.len() + self.internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Surface points followed by internal points.
    pub fn all_points(&self) -> Vec<DVec3> {
        self.surface.iter().chain(&self.internal).copied().collect()
    }

    /// Fraction of points classified as surface.
    pub fn surface_fraction(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.surface.len() as f64 / self.len() as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bubble {
    position: DVec3,
    surface: bool,
}

/// Hermite smoothstep on `[0, 1]`.
fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn uniform_in(rng: &mut StdRng, bounds: &Aabb) -> DVec3 {
    let size = bounds.size();
    bounds.min
        + DVec3::new(
            size.x * rng.random::<f64>(),
            size.y * rng.random::<f64>(),
            size.z * rng.random::<f64>(),
        )
}

fn validate(config: &PackingConfig) -> Result<(), MeshError> {
    if config.target_count == 0 {
        return Err(MeshError::InvalidParameter {
            name: "target_count",
            reason: "must be non-zero",
        });
    }
    if !(config.spacing > 0.0) || !config.spacing.is_finite() {
        return Err(MeshError::InvalidParameter {
            name: "spacing",
            reason: "must be positive and finite",
        });
    }
    if !(config.surface_threshold > 0.0 && config.surface_threshold < 1.0) {
        return Err(MeshError::InvalidParameter {
            name: "surface_threshold",
            reason: "must be in (0, 1)",
        });
    }
    Ok(())
}

/// Pack `config.target_count` bubbles into the body described by `boundary`.
///
/// `half_extent` is the half-size of the box that encloses the body around
/// `center`; it is scaled by `config.box_padding` before scattering. A zero
/// component packs a flat slab.
pub fn pack_bubbles<B>(
    boundary: &B,
    center: DVec3,
    half_extent: DVec3,
    config: &PackingConfig,
) -> Result<PackingResult, MeshError>
where
    B: BoundaryTest,
{
    validate(config)?;
    let start = Instant::now();
    let mut stats = PackingStats::default();
    let bounds = Aabb::from_center(center, half_extent.abs() * config.box_padding.max(1.0));

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut bubbles: Vec<Bubble> = (0..config.target_count)
        .map(|_| scatter_one(boundary, &bounds, config.max_scatter_attempts, &mut rng, &mut stats))
        .collect();

    for iteration in 0..config.iterations {
        let displacements = repulsion(&bubbles, config.spacing);
        let mut moved = 0;
        for (bubble, d) in bubbles.iter_mut().zip(displacements) {
            if d != DVec3::ZERO {
                bubble.position += d * config.damping;
                moved += 1;
            }
        }

        for bubble in &mut bubbles {
            let sample = boundary.test(bubble.position);
            apply_boundary(bubble, &sample, config.surface_threshold);
        }
        trace!("pack_bubbles: iteration {} moved {} points", iteration, moved);
        stats.iterations += 1;
    }

    // Final classification against the settled positions
    let mut ratios = Vec::with_capacity(bubbles.len());
    for bubble in &mut bubbles {
        let sample = boundary.test(bubble.position);
        if !sample.inside {
            bubble.position = sample.projected;
            bubble.surface = true;
        } else if sample.surface {
            bubble.surface = true;
        }
        ratios.push((sample.distance_ratio, sample.projected));
    }

    let quota = (config.surface_ratio * config.target_count as f64).ceil() as usize;
    let surface_count = bubbles.iter().filter(|b| b.surface).count();
    if surface_count < quota {
        let mut candidates: Vec<usize> = (0..bubbles.len()).filter(|&i| !bubbles[i].surface).collect();
        candidates.sort_by(|&a, &b| ratios[b].0.total_cmp(&ratios[a].0).then(a.cmp(&b)));
        for &i in candidates.iter().take(quota - surface_count) {
            bubbles[i].position = ratios[i].1;
            bubbles[i].surface = true;
            stats.promoted += 1;
        }
    }

    let (surface, internal): (Vec<Bubble>, Vec<Bubble>) = bubbles.into_iter().partition(|b| b.surface);
    let result = PackingResult {
        surface: surface.into_iter().map(|b| b.position).collect(),
        internal: internal.into_iter().map(|b| b.position).collect(),
        stats,
    };

    debug!(
        "pack_bubbles: {} surface + {} internal ({} promoted, {} scatter fallbacks) in {:?}",
        result.surface.len(),
        result.internal.len(),
        result.stats.promoted,
        result.stats.scatter_fallbacks,
        start.elapsed()
    );
    Ok(result)
}

fn scatter_one<B: BoundaryTest>(
    boundary: &B,
    bounds: &Aabb,
    attempts: usize,
    rng: &mut StdRng,
    stats: &mut PackingStats,
) -> Bubble {
    let mut candidate = bounds.center();
    for _ in 0..attempts.max(1) {
        candidate = uniform_in(rng, bounds);
        if boundary.test(candidate).inside {
            return Bubble {
                position: candidate,
                surface: false,
            };
        }
    }
    stats.scatter_fallbacks += 1;
    Bubble {
        position: boundary.test(candidate).projected,
        surface: true,
    }
}

/// Pull a bubble toward the boundary and update its surface flag.
fn apply_boundary(bubble: &mut Bubble, sample: &BoundarySample, threshold: f64) {
    if !sample.inside {
        bubble.position = sample.projected;
        bubble.surface = true;
        return;
    }
    if sample.distance_ratio >= threshold {
        let ramp = smoothstep((sample.distance_ratio - threshold) / (1.0 - threshold));
        bubble.position = bubble.position.lerp(sample.projected, ramp);
        bubble.surface = ramp > SURFACE_BLEND;
    } else {
        bubble.surface = false;
    }
}

fn displacement(index: usize, bubbles: &[Bubble], octree: &PointOctree, spacing: f64) -> DVec3 {
    let p = bubbles[index].position;
    let mut push = DVec3::ZERO;
    for j in octree.query_sphere(p, spacing) {
        if j == index {
            continue;
        }
        let offset = p - bubbles[j].position;
        let dist = offset.length();
        if dist < MIN_PAIR_DISTANCE || dist >= spacing {
            continue;
        }
        push += offset * ((spacing - dist) / dist * 0.5);
    }
    push
}

/// Per-bubble repulsion displacement from the current positions.
fn repulsion(bubbles: &[Bubble], spacing: f64) -> Vec<DVec3> {
    let positions: Vec<DVec3> = bubbles.iter().map(|b| b.position).collect();
    let octree = PointOctree::from_points(&positions);

    #[cfg(feature = "parallel")]
    let displacements = (0..bubbles.len())
        .into_par_iter()
        .map(|i| displacement(i, bubbles, &octree, spacing))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let displacements = (0..bubbles.len())
        .map(|i| displacement(i, bubbles, &octree, spacing))
        .collect();

    displacements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::sphere_boundary;

    fn unit_sphere_config() -> PackingConfig {
        PackingConfig {
            target_count: 200,
            spacing: 0.1,
            ..Default::default()
        }
    }

    #[test]
    fn test_unit_sphere_surface_fraction() {
        let boundary = sphere_boundary(DVec3::ZERO, 1.0);
        let result = pack_bubbles(&boundary, DVec3::ZERO, DVec3::ONE, &unit_sphere_config()).unwrap();

        assert_eq!(result.len(), 200);
        let fraction = result.surface_fraction();
        assert!((0.2..=0.5).contains(&fraction), "surface fraction {fraction}");
    }

    #[test]
    fn test_points_stay_inside() {
        let boundary = sphere_boundary(DVec3::new(1.0, 2.0, 3.0), 0.5);
        let config = PackingConfig {
            target_count: 120,
            spacing: 0.08,
            ..Default::default()
        };
        let result = pack_bubbles(&boundary, DVec3::new(1.0, 2.0, 3.0), DVec3::splat(0.5), &config).unwrap();

        for p in result.all_points() {
            assert!(p.distance(DVec3::new(1.0, 2.0, 3.0)) <= 0.5 + 1e-9);
        }
        for p in &result.surface {
            assert!((p.distance(DVec3::new(1.0, 2.0, 3.0)) - 0.5).abs() < 0.05);
        }
    }

    #[test]
    fn test_same_seed_same_packing() {
        let boundary = sphere_boundary(DVec3::ZERO, 1.0);
        let config = unit_sphere_config();
        let a = pack_bubbles(&boundary, DVec3::ZERO, DVec3::ONE, &config).unwrap();
        let b = pack_bubbles(&boundary, DVec3::ZERO, DVec3::ONE, &config).unwrap();
        assert_eq!(a, b);

        let other = PackingConfig { seed: 7, ..config };
        let c = pack_bubbles(&boundary, DVec3::ZERO, DVec3::ONE, &other).unwrap();
        assert_ne!(a.all_points(), c.all_points());
    }

    #[test]
    fn test_quota_promotes_internal_points() {
        let boundary = sphere_boundary(DVec3::ZERO, 1.0);
        let config = PackingConfig {
            target_count: 100,
            iterations: 0,
            surface_ratio: 0.8,
            ..Default::default()
        };
        let result = pack_bubbles(&boundary, DVec3::ZERO, DVec3::ONE, &config).unwrap();
        assert!(result.surface.len() >= 80);
        assert!(result.stats.promoted > 0);
        for p in &result.surface {
            assert!((p.length() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_repulsion_separates_close_pair() {
        let bubbles = [
            Bubble { position: DVec3::ZERO, surface: false },
            Bubble { position: DVec3::new(0.04, 0.0, 0.0), surface: false },
        ];
        let d = repulsion(&bubbles, 0.1);
        assert!(d[0].x < 0.0 && d[1].x > 0.0);
        assert!((d[0].x + d[1].x).abs() < 1e-15);
    }

    #[test]
    fn test_flat_slab_packing() {
        let boundary = |p: DVec3| {
            let flat = DVec3::new(p.x, p.y, 0.0);
            let r = flat.length();
            let dir = if r > 1e-12 { flat / r } else { DVec3::X };
            BoundarySample {
                inside: r <= 1.0,
                projected: dir,
                surface: (r - 1.0).abs() < 1e-9,
                distance_ratio: r,
            }
        };
        let config = PackingConfig {
            target_count: 50,
            ..Default::default()
        };
        let result = pack_bubbles(&boundary, DVec3::ZERO, DVec3::new(1.0, 1.0, 0.0), &config).unwrap();
        assert_eq!(result.len(), 50);
        assert!(result.all_points().iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let boundary = sphere_boundary(DVec3::ZERO, 1.0);
        let config = PackingConfig {
            target_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            pack_bubbles(&boundary, DVec3::ZERO, DVec3::ONE, &config),
            Err(MeshError::InvalidParameter { name: "target_count", .. })
        ));
    }
}
