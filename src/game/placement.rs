//! Spawn placement - finds positions for ships and hazards that keep clear of
//! everything already in the arena

use std::f32::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{PlacementSettings, MAX_PLACEMENT_BOUND};

use super::roster::PlayerKey;

pub type ObjectId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Projection onto the arena plane
    pub fn xy(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

impl From<Vec2> for Vec3 {
    fn from(v: Vec2) -> Self {
        Vec3::new(v.x, v.y, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Ship,
    /// Planets and other obstacles
    Hazard,
}

/// Anything placed in the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub position: Vec3,
    pub radius: f32,
    /// Player piloting the object, for ships
    pub owner: Option<PlayerKey>,
}

/// Circle on the arena plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

impl Circle {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self {
            center: Vec2::new(x, y),
            radius,
        }
    }
}

/// Result of a placement request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Vec3,
    /// No clear location was found within the attempt budget; `position` is
    /// the least overlapping candidate seen
    pub degraded: bool,
}

/// Sightline constraint for ship placement
#[derive(Debug, Clone, Default)]
pub struct Sightline {
    /// Ships the new ship must be able to see
    pub ships: Vec<Vec2>,
    /// Hazards inflated by the required clearance
    pub hazards: Vec<Circle>,
}

impl Sightline {
    /// Count (ship, hazard) pairs where the hazard blocks the view from `from`
    pub fn blocked_count(&self, from: Vec2) -> usize {
        self.ships
            .iter()
            .map(|ship| {
                self.hazards
                    .iter()
                    .filter(|hazard| blocks_segment(from, *ship, hazard))
                    .count()
            })
            .sum()
    }
}

/// Strictly inside, the boundary counts as clear
pub fn is_inside_circle(target: Vec2, circle: &Circle) -> bool {
    let dx = target.x - circle.center.x;
    let dy = target.y - circle.center.y;
    dx * dx + dy * dy < circle.radius * circle.radius
}

/// Length of the chord the horizontal line at `y` cuts through the circle
pub fn circle_length_along_x_on_y(circle: &Circle, y: f32) -> f32 {
    let dy = y - circle.center.y;
    let rest = circle.radius * circle.radius - dy * dy;
    if rest <= 0.0 {
        0.0
    } else {
        2.0 * rest.sqrt()
    }
}

/// Map a position along the free (unblocked) part of a horizontal line back
/// to an actual x coordinate. `blocked` must be sorted and non-overlapping.
pub fn calculate_actual_coord(relative: f32, min_x: f32, blocked: &[(f32, f32)]) -> f32 {
    let mut x = min_x + relative;
    for &(start, end) in blocked {
        if x >= start {
            x += end - start;
        } else {
            break;
        }
    }
    x
}

/// Chords of every circle on the line `y`, clipped to `[min_x, max_x]`, merged and sorted
fn blocked_intervals(circles: &[Circle], y: f32, min_x: f32, max_x: f32) -> Vec<(f32, f32)> {
    let mut chords: Vec<(f32, f32)> = circles
        .iter()
        .filter_map(|c| {
            let half = circle_length_along_x_on_y(c, y) / 2.0;
            if half <= 0.0 {
                return None;
            }
            let start = (c.center.x - half).max(min_x);
            let end = (c.center.x + half).min(max_x);
            (start < end).then_some((start, end))
        })
        .collect();

    chords.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f32, f32)> = Vec::with_capacity(chords.len());
    for (start, end) in chords {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Whether `hazard` sits across the segment between `a` and `b`.
///
/// The hazard is moved into a frame where the segment lies on the x axis
/// from 0 to its length; it blocks when its chord on that axis overlaps the
/// segment.
fn blocks_segment(a: Vec2, b: Vec2, hazard: &Circle) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length = (dx * dx + dy * dy).sqrt();
    if length <= f32::EPSILON {
        return is_inside_circle(a, hazard);
    }

    let hx = hazard.center.x - a.x;
    let hy = hazard.center.y - a.y;
    let along = (hx * dx + hy * dy) / length;
    let across = (dx * hy - dy * hx) / length;

    let local = Circle::new(along, across, hazard.radius);
    let chord = circle_length_along_x_on_y(&local, 0.0);
    if chord <= 0.0 {
        return false;
    }

    let start = along - chord / 2.0;
    let end = along + chord / 2.0;
    start < length && end > 0.0
}

/// How far `point` reaches into the deepest circle (0 when clear)
fn overlap_depth(point: Vec2, circles: &[Circle]) -> f32 {
    circles
        .iter()
        .map(|c| c.radius - point.distance(c.center))
        .fold(0.0, f32::max)
}

/// Placement engine. The bounding area grows as the arena fills up and is
/// kept between calls.
pub struct PlacementEngine {
    settings: PlacementSettings,
    rng: ChaCha8Rng,
    bound: f32,
}

impl PlacementEngine {
    pub fn new(settings: PlacementSettings, seed: u64) -> Self {
        let bound = settings.default_bound.min(MAX_PLACEMENT_BOUND);
        Self {
            settings,
            rng: ChaCha8Rng::seed_from_u64(seed),
            bound,
        }
    }

    pub fn settings(&self) -> &PlacementSettings {
        &self.settings
    }

    /// Half extent of the current square bounding area
    pub fn bound(&self) -> f32 {
        self.bound
    }

    pub fn reset_bound(&mut self) {
        self.bound = self.settings.default_bound.min(MAX_PLACEMENT_BOUND);
    }

    fn separation_factor(&self, a: ObjectKind, b: ObjectKind) -> f32 {
        match (a, b) {
            (ObjectKind::Ship, ObjectKind::Ship) => self.settings.ship_separation_factor,
            _ => self.settings.separation_factor,
        }
    }

    /// Circles a new object's center must stay out of
    pub fn exclusion_circles(
        &self,
        objects: &[ArenaObject],
        kind: ObjectKind,
        radius: f32,
    ) -> Vec<Circle> {
        objects
            .iter()
            .map(|o| {
                let factor = self.separation_factor(o.kind, kind);
                Circle::new(o.position.x, o.position.y, (o.radius + radius) * factor)
            })
            .collect()
    }

    /// Place a planet of `radius` clear of every existing object
    pub fn find_good_planet_position(&mut self, objects: &[ArenaObject], radius: f32) -> Placement {
        let circles = self.exclusion_circles(objects, ObjectKind::Hazard, radius);
        self.find_good_spawn_location(&circles, None)
    }

    /// Place a ship clear of every existing object, with no hazard blocking
    /// its view of the other ships
    pub fn find_good_player_position(&mut self, objects: &[ArenaObject]) -> Placement {
        let radius = self.settings.ship_radius;
        let circles = self.exclusion_circles(objects, ObjectKind::Ship, radius);

        let clearance = self.settings.line_of_sight_clearance;
        let sightline = Sightline {
            ships: objects
                .iter()
                .filter(|o| o.kind == ObjectKind::Ship)
                .map(|o| o.position.xy())
                .collect(),
            hazards: objects
                .iter()
                .filter(|o| o.kind == ObjectKind::Hazard)
                .map(|o| Circle::new(o.position.x, o.position.y, o.radius + clearance))
                .collect(),
        };

        self.find_good_spawn_location(&circles, Some(&sightline))
    }

    /// Whether a ship at `position` can see every other ship past the hazards
    pub fn location_has_line_of_sight_to_other_ship(
        &self,
        position: Vec3,
        objects: &[ArenaObject],
    ) -> bool {
        let clearance = self.settings.line_of_sight_clearance;
        let from = position.xy();
        objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Ship)
            .all(|ship| {
                objects
                    .iter()
                    .filter(|o| o.kind == ObjectKind::Hazard)
                    .all(|h| {
                        let hazard = Circle::new(h.position.x, h.position.y, h.radius + clearance);
                        !blocks_segment(from, ship.position.xy(), &hazard)
                    })
            })
    }

    /// Random location inside the bounding area and outside every circle.
    ///
    /// Samples a line, then a point on the free part of that line. After
    /// `attempts_per_bound` misses the bounding area grows. Growth to fit the
    /// circles and growth after misses share one `max_bound_growths` budget;
    /// once it is spent the least overlapping candidate is returned as a
    /// degraded placement.
    pub fn find_good_spawn_location(
        &mut self,
        circles: &[Circle],
        sightline: Option<&Sightline>,
    ) -> Placement {
        let mut growths = self.grow_to_fit(circles);

        let mut best: Option<(f32, usize, Vec2)> = None;

        loop {
            for _ in 0..self.settings.attempts_per_bound {
                let candidate = match self.sample(circles) {
                    Some(candidate) => candidate,
                    None => self.random_point(),
                };

                let clear = !circles.iter().any(|c| is_inside_circle(candidate, c));
                let blocked = sightline.map_or(0, |s| s.blocked_count(candidate));
                if clear && blocked == 0 {
                    return Placement {
                        position: candidate.into(),
                        degraded: false,
                    };
                }

                let depth = if clear { 0.0 } else { overlap_depth(candidate, circles) };
                let better = match best {
                    None => true,
                    Some((best_depth, best_blocked, _)) => {
                        depth < best_depth || (depth == best_depth && blocked < best_blocked)
                    }
                };
                if better {
                    best = Some((depth, blocked, candidate));
                }
            }

            if growths >= self.settings.max_bound_growths || !self.grow_bound() {
                break;
            }
            growths += 1;
            debug!(bound = self.bound, "Growing spawn bounding area");
        }

        let (depth, blocked, position) = best.unwrap_or((0.0, 0, Vec2::default()));
        warn!(
            overlap = depth,
            blocked_sightlines = blocked,
            bound = self.bound,
            "Placement degraded, no clear location within attempt budget"
        );

        Placement {
            position: position.into(),
            degraded: true,
        }
    }

    /// Grow the bounding area until it is clearly larger than the area the
    /// circles cover. Returns the growths spent.
    fn grow_to_fit(&mut self, circles: &[Circle]) -> u32 {
        let covered: f32 = circles.iter().map(|c| PI * c.radius * c.radius).sum();
        let mut growths = 0;
        while covered >= self.area() * 0.5
            && growths < self.settings.max_bound_growths
            && self.grow_bound()
        {
            growths += 1;
        }
        if growths > 0 {
            debug!(bound = self.bound, covered, "Bounding area grown to fit arena objects");
        }
        growths
    }

    /// Scale the bound up, never past `MAX_PLACEMENT_BOUND`. False once it can't grow.
    fn grow_bound(&mut self) -> bool {
        let grown = (self.bound * self.settings.bound_growth_factor).min(MAX_PLACEMENT_BOUND);
        if !grown.is_finite() || grown <= self.bound {
            return false;
        }
        self.bound = grown;
        true
    }

    fn area(&self) -> f32 {
        let side = 2.0 * self.bound;
        side * side
    }

    /// Sample a point on the free part of a random horizontal line, if that line has any
    fn sample(&mut self, circles: &[Circle]) -> Option<Vec2> {
        let min = -self.bound;
        let max = self.bound;
        let range = max - min;

        let y = self.rng.gen_range(min..max);
        let blocked = blocked_intervals(circles, y, min, max);
        let free = range - blocked.iter().map(|(s, e)| e - s).sum::<f32>();
        if free <= f32::EPSILON {
            return None;
        }

        let relative = self.rng.gen_range(0.0..free);
        let x = calculate_actual_coord(relative, min, &blocked);
        Some(Vec2::new(x, y))
    }

    fn random_point(&mut self) -> Vec2 {
        let x = self.rng.gen_range(-self.bound..self.bound);
        let y = self.rng.gen_range(-self.bound..self.bound);
        Vec2::new(x, y)
    }
}
