//! Shape points and the control-point slot arena.
//!
//! - [`Point`] - GPU-friendly position plus transient scratch fields
//! - [`PointId`] - stable identity that survives swap-to-end reordering
//! - [`PointSlots`] - ordered slots whose last entry is the hot edit slot
//!
//! Editing slot `i` moves it to the end of the arena. Fit rows for slots
//! `[0, i)` are untouched by the edit, which is what lets the fit stack
//! keep that prefix.

use std::collections::HashMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::ShapeError;

/// A shape point.
///
/// The layout is `#[repr(C)]` without padding so point slices can be handed
/// to a renderer as raw bytes. Scratch fields belong to whoever renders or
/// simulates the current frame and are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Projected screen position
    #[serde(skip)]
    pub screen: [f32; 2],
    #[serde(skip)]
    pub depth: f32,
    #[serde(skip)]
    pub flags: u32,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::default()
        }
    }

    pub fn from_position(position: DVec3) -> Self {
        Self::new(position.x, position.y, position.z)
    }

    pub fn position(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    /// Move the point, keeping its scratch fields.
    pub fn set_position(&mut self, position: DVec3) {
        self.x = position.x;
        self.y = position.y;
        self.z = position.z;
    }
}

impl From<DVec3> for Point {
    fn from(position: DVec3) -> Self {
        Self::from_position(position)
    }
}

/// Stable identity of a control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointId(pub u64);

/// Where an edited point ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEdit {
    /// Slot now holding the edited point
    pub slot: usize,
    /// Rows from this slot onward changed; fit state for the prefix holds
    pub first_changed: usize,
}

/// Write `value` at `index` by moving it to the last slot.
///
/// The previous occupant of the last slot takes `index`. Returns the first
/// index whose content changed.
pub fn swap_to_end<T>(items: &mut [T], index: usize, value: T) -> usize {
    let last = items.len() - 1;
    if index != last {
        items.swap(index, last);
    }
    items[last] = value;
    index
}

/// Ordered control points with stable ids.
#[derive(Debug, Clone, Default)]
pub struct PointSlots {
    points: Vec<Point>,
    ids: Vec<PointId>,
    slot_of: HashMap<PointId, usize>,
    next_id: u64,
}

impl PointSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots for `positions` in order, with fresh ids.
    pub fn from_positions(positions: &[DVec3]) -> Self {
        let mut slots = Self::new();
        for &p in positions {
            slots.push(Point::from_position(p));
        }
        slots
    }

    /// Rebuild from persisted parts, checking id consistency.
    pub fn from_parts(points: Vec<Point>, ids: Vec<PointId>, next_id: u64) -> Result<Self, ShapeError> {
        if points.len() != ids.len() {
            return Err(ShapeError::CountMismatch {
                what: "control point ids",
                expected: points.len(),
                found: ids.len(),
            });
        }
        let mut slot_of = HashMap::with_capacity(ids.len());
        for (slot, &id) in ids.iter().enumerate() {
            if id.0 >= next_id || slot_of.insert(id, slot).is_some() {
                return Err(ShapeError::InvalidPointId(id));
            }
        }
        Ok(Self {
            points,
            ids,
            slot_of,
            next_id,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn ids(&self) -> &[PointId] {
        &self.ids
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn get(&self, slot: usize) -> Option<&Point> {
        self.points.get(slot)
    }

    pub fn id_at(&self, slot: usize) -> Option<PointId> {
        self.ids.get(slot).copied()
    }

    /// Current slot of `id`.
    pub fn slot_of(&self, id: PointId) -> Option<usize> {
        self.slot_of.get(&id).copied()
    }

    pub fn positions(&self) -> Vec<DVec3> {
        self.points.iter().map(Point::position).collect()
    }

    /// Append into the hot slot.
    pub fn push(&mut self, point: Point) -> PointId {
        let id = PointId(self.next_id);
        self.next_id += 1;
        self.slot_of.insert(id, self.points.len());
        self.points.push(point);
        self.ids.push(id);
        id
    }

    /// Move slot `slot` to the end and give it `position`.
    pub fn update(&mut self, slot: usize, position: DVec3) -> Result<SlotEdit, ShapeError> {
        self.check(slot)?;
        let mut point = self.points[slot];
        point.set_position(position);
        let id = self.ids[slot];

        let first_changed = swap_to_end(&mut self.points, slot, point);
        swap_to_end(&mut self.ids, slot, id);
        self.reindex(slot);
        Ok(SlotEdit {
            slot: self.points.len() - 1,
            first_changed,
        })
    }

    /// Remove slot `slot`; the last point fills the hole.
    ///
    /// Returns the removed id and point plus the first changed slot.
    pub fn remove(&mut self, slot: usize) -> Result<(PointId, Point, usize), ShapeError> {
        self.check(slot)?;
        let point = self.points.swap_remove(slot);
        let id = self.ids.swap_remove(slot);
        self.slot_of.remove(&id);
        if slot < self.ids.len() {
            self.reindex(slot);
        }
        Ok((id, point, slot))
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.ids.clear();
        self.slot_of.clear();
    }

    fn check(&self, slot: usize) -> Result<(), ShapeError> {
        if slot < self.points.len() {
            Ok(())
        } else {
            Err(ShapeError::IndexOutOfRange {
                index: slot,
                len: self.points.len(),
            })
        }
    }

    fn reindex(&mut self, slot: usize) {
        self.slot_of.insert(self.ids[slot], slot);
        if let Some(&last) = self.ids.last() {
            self.slot_of.insert(last, self.ids.len() - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_point_layout_has_no_padding() {
        assert_eq!(std::mem::size_of::<Point>(), 40);
        let points = [Point::new(1.0, 2.0, 3.0)];
        let bytes: &[u8] = bytemuck::cast_slice(&points);
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[..8], &1.0f64.to_ne_bytes());
    }

    #[test]
    fn test_scratch_fields_not_serialized() {
        let mut point = Point::new(1.0, 2.0, 3.0);
        point.depth = 0.5;
        point.flags = 7;
        let json = serde_json::to_string(&point).unwrap();
        assert!(!json.contains("depth"));
        let parsed: Point = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Point::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_update_moves_to_end() {
        let mut slots = PointSlots::from_positions(&[DVec3::X, DVec3::Y, DVec3::Z]);
        let id = slots.id_at(0).unwrap();
        let edit = slots.update(0, DVec3::ONE).unwrap();
        assert_eq!(edit, SlotEdit { slot: 2, first_changed: 0 });
        assert_eq!(slots.slot_of(id), Some(2));
        assert_eq!(slots.get(2).unwrap().position(), DVec3::ONE);
        assert_eq!(slots.get(0).unwrap().position(), DVec3::Z);

        let edit = slots.update(2, DVec3::NEG_ONE).unwrap();
        assert_eq!(edit, SlotEdit { slot: 2, first_changed: 2 });
        assert!(slots.update(3, DVec3::ZERO).is_err());
    }

    #[test]
    fn test_update_keeps_scratch() {
        let mut slots = PointSlots::new();
        let mut point = Point::new(0.0, 0.0, 0.0);
        point.flags = 3;
        slots.push(point);
        slots.push(Point::new(1.0, 0.0, 0.0));
        slots.update(0, DVec3::Y).unwrap();
        assert_eq!(slots.get(1).unwrap().flags, 3);
    }

    #[test]
    fn test_remove_fills_hole_with_last() {
        let mut slots = PointSlots::from_positions(&[DVec3::X, DVec3::Y, DVec3::Z]);
        let last_id = slots.id_at(2).unwrap();
        let (removed, point, first_changed) = slots.remove(0).unwrap();
        assert_eq!(removed, PointId(0));
        assert_eq!(point.position(), DVec3::X);
        assert_eq!(first_changed, 0);
        assert_eq!(slots.slot_of(last_id), Some(0));
        assert_eq!(slots.slot_of(removed), None);

        let (_, _, first_changed) = slots.remove(1).unwrap();
        assert_eq!(first_changed, 1);
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn test_swap_to_end_preserves_membership() {
        for seed in 0..6 {
            let mut rng = StdRng::seed_from_u64(seed);
            let start: Vec<DVec3> = (0..12).map(|i| DVec3::splat(i as f64)).collect();
            let mut slots = PointSlots::from_positions(&start);
            // Reference model keyed by id, never reordered
            let mut reference: HashMap<PointId, DVec3> =
                slots.ids().iter().copied().zip(start.iter().copied()).collect();

            for step in 0..40 {
                let slot = rng.random_range(0..slots.len());
                let id = slots.id_at(slot).unwrap();
                let value = DVec3::new(step as f64, seed as f64, rng.random());
                slots.update(slot, value).unwrap();
                reference.insert(id, value);
            }

            for (slot, &id) in slots.ids().iter().enumerate() {
                assert_eq!(slots.slot_of(id), Some(slot));
                assert_eq!(slots.get(slot).unwrap().position(), reference[&id]);
            }
            assert_eq!(slots.len(), reference.len());
        }
    }

    #[test]
    fn test_from_parts_rejects_bad_ids() {
        let points = vec![Point::default(); 2];
        assert!(PointSlots::from_parts(points.clone(), vec![PointId(0)], 2).is_err());
        assert!(PointSlots::from_parts(points.clone(), vec![PointId(0), PointId(0)], 2).is_err());
        assert!(PointSlots::from_parts(points.clone(), vec![PointId(0), PointId(5)], 2).is_err());
        let slots = PointSlots::from_parts(points, vec![PointId(1), PointId(0)], 2).unwrap();
        assert_eq!(slots.slot_of(PointId(1)), Some(0));
    }
}
