//! Material lookup for constraint and particle generation.

use glam::DVec3;
use morpho_config::Material;

/// Material response at a point in space.
pub trait MaterialQuery {
    fn material_at(&self, position: DVec3) -> Material;
}

/// A single material everywhere.
impl MaterialQuery for Material {
    fn material_at(&self, _position: DVec3) -> Material {
        *self
    }
}

impl<F> MaterialQuery for F
where
    F: Fn(DVec3) -> Material,
{
    fn material_at(&self, position: DVec3) -> Material {
        self(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_material() {
        let material = Material::default();
        assert_eq!(material.material_at(DVec3::splat(3.0)).stiffness, 1000.0);
    }

    #[test]
    fn test_graded_material() {
        let graded = |p: DVec3| Material {
            stiffness: 100.0 + p.x,
            ..Material::default()
        };
        assert_eq!(graded.material_at(DVec3::X * 5.0).stiffness, 105.0);
    }
}
