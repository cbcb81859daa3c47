//! Stamped Transform Frame (TF) buffer.
//!
//! Maintains a directed graph of named reference frames and the latest 3-D
//! rigid-body transform (translation + quaternion rotation) relating each
//! parent/child pair, together with the time at which that transform was
//! published.  Given any two frame names the buffer composes the chain of
//! transforms via BFS and reports the combined [`Transform3D`] stamped with
//! the oldest edge on the chain.
//!
//! # Example
//!
//! ```rust
//! use robomech_perception::source::LookupTime;
//! use robomech_perception::transform::{Quaternion, TfBuffer, Transform3D, Vec3};
//!
//! let mut tf = TfBuffer::new();
//!
//! // odom is 1 m forward of map, same orientation.
//! tf.set_transform("map", "odom",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()), 4.0);
//!
//! // base_link is 0.5 m forward of odom, same orientation.
//! tf.set_transform("odom", "base_link",
//!     Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()), 4.5);
//!
//! let t = tf.lookup("map", "base_link", LookupTime::Latest).unwrap();
//! assert!((t.transform.translation.x - 1.5).abs() < 1e-9);
//! assert_eq!(t.stamp, 4.0);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::{Add, Div, Mul, Sub};

use crate::source::{LookupError, LookupTime};

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (translation, displacement or velocity).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Euclidean length.
    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    fn mul(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

impl Div<f64> for Vec3 {
    type Output = Vec3;

    fn div(self, k: f64) -> Self {
        Self::new(self.x / k, self.y / k, self.z / k)
    }
}

/// A rotation quaternion (w, x, y, z convention).
///
/// Values coming off a transform source are only *nearly* unit length, so
/// every consumer goes through [`Quaternion::normalized`] first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  No normalization is applied here.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// A pure rotation of `yaw` radians about +Z.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = 0.5 * yaw;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Four-dimensional Euclidean norm.
    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Scale to unit length.
    ///
    /// A zero or non-finite quaternion carries no rotation information and
    /// normalizes to the identity.
    pub fn normalized(self) -> Self {
        let n = self.norm();
        if !n.is_finite() || n < f64::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// The opposite rotation.  The input is normalized first.
    pub fn inverse(self) -> Self {
        self.normalized().conjugate()
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self * p * self.conjugate();
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Roll-pitch-yaw decomposition (static X-Y-Z axes) of the normalized
    /// rotation, in radians.
    pub fn to_euler(self) -> (f64, f64, f64) {
        let q = self.normalized();

        let roll = (2.0 * (q.w * q.x + q.y * q.z)).atan2(1.0 - 2.0 * (q.x * q.x + q.y * q.y));
        // Clamp guards asin against |arg| creeping past 1 near gimbal lock.
        let pitch = (2.0 * (q.w * q.y - q.z * q.x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (q.w * q.z + q.x * q.y)).atan2(1.0 - 2.0 * (q.y * q.y + q.z * q.z));

        (roll, pitch, yaw)
    }

    /// Heading about +Z, in (-π, π].
    pub fn yaw(self) -> f64 {
        self.to_euler().2
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Hamilton product: compose two rotations.
impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: translation followed by rotation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    /// Create a transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let rotation = self.rotation.normalized();
        let translated = self.translation + rotation.rotate(other.translation);
        let rotated = (rotation * other.rotation.normalized()).normalized();
        Self::new(translated, rotated)
    }
}

/// A [`Transform3D`] together with the time (seconds) it is valid for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampedTransform {
    pub transform: Transform3D,
    pub stamp: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

/// Default allowed distance (seconds) between a requested lookup time and
/// the stamps held in the buffer.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// A directed graph of named reference frames and the latest
/// [`StampedTransform`] published for each edge.
///
/// Frames are identified by arbitrary string names (e.g. `"map"`,
/// `"base_link"`).  Edges are directional: adding `"A" → "B"` does not
/// automatically create the inverse.  Only the most recent transform per
/// edge is retained.
#[derive(Debug)]
pub struct TfBuffer {
    /// `edges[from][to] = StampedTransform`
    edges: HashMap<String, HashMap<String, StampedTransform>>,
    frames: HashSet<String>,
    tolerance: f64,
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self {
            edges: HashMap::new(),
            frames: HashSet::new(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl TfBuffer {
    /// Create an empty buffer with [`DEFAULT_TOLERANCE`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the extrapolation tolerance used by [`LookupTime::At`] lookups.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    /// Register or update the transform from `parent_frame` to `child_frame`.
    pub fn set_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: f64,
    ) {
        self.frames.insert(parent_frame.to_string());
        self.frames.insert(child_frame.to_string());
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), StampedTransform { transform, stamp });
    }

    /// `true` once `frame` has appeared on either end of any transform.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.frames.contains(frame)
    }

    /// Compute the composed transform giving the pose of `target_frame`
    /// expressed in `source_frame`.
    ///
    /// The result is stamped with the oldest edge on the chain.
    ///
    /// # Errors
    ///
    /// - [`LookupError::UnknownFrame`] if either frame was never published.
    /// - [`LookupError::Connectivity`] if no directed chain links them.
    /// - [`LookupError::Extrapolation`] if `at` is a fixed time and every
    ///   chain reaching the target has an edge stamp further than the
    ///   tolerance from it.  Edges off the chain are never checked.
    pub fn lookup(
        &self,
        source_frame: &str,
        target_frame: &str,
        at: LookupTime,
    ) -> Result<StampedTransform, LookupError> {
        for frame in [source_frame, target_frame] {
            if !self.has_frame(frame) {
                return Err(LookupError::UnknownFrame(frame.to_string()));
            }
        }

        if source_frame == target_frame {
            let stamp = match at {
                LookupTime::At(t) => t,
                LookupTime::Latest => 0.0,
            };
            return Ok(StampedTransform {
                transform: Transform3D::identity(),
                stamp,
            });
        }

        // BFS over the directed graph; each queue item carries the composed
        // transform and the stamp range accumulated from source_frame.
        // Tolerance only applies to chains that actually reach the target.
        let mut queue: VecDeque<(String, Transform3D, f64, f64)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut extrapolation = None;

        queue.push_back((
            source_frame.to_string(),
            Transform3D::identity(),
            f64::INFINITY,
            f64::NEG_INFINITY,
        ));
        visited.insert(source_frame.to_string());

        while let Some((current, accumulated, oldest, newest)) = queue.pop_front() {
            let Some(neighbours) = self.edges.get(&current) else {
                continue;
            };
            for (next, edge) in neighbours {
                if visited.contains(next) {
                    continue;
                }
                let composed = accumulated.compose(edge.transform);
                let oldest = oldest.min(edge.stamp);
                let newest = newest.max(edge.stamp);
                if next == target_frame {
                    match self.out_of_tolerance(at, oldest, newest) {
                        Some(err) => extrapolation = Some(err),
                        None => {
                            return Ok(StampedTransform {
                                transform: composed,
                                stamp: oldest,
                            });
                        }
                    }
                    continue;
                }
                visited.insert(next.clone());
                queue.push_back((next.clone(), composed, oldest, newest));
            }
        }

        if let Some(err) = extrapolation {
            return Err(err);
        }
        Err(LookupError::Connectivity {
            from: source_frame.to_string(),
            to: target_frame.to_string(),
        })
    }

    /// `Some(Extrapolation)` when a fixed-time lookup lies further than the
    /// tolerance from either end of the chain's `[oldest, newest]` stamps.
    fn out_of_tolerance(&self, at: LookupTime, oldest: f64, newest: f64) -> Option<LookupError> {
        let LookupTime::At(t) = at else {
            return None;
        };
        let available = if (t - oldest).abs() > self.tolerance {
            oldest
        } else if (t - newest).abs() > self.tolerance {
            newest
        } else {
            return None;
        };
        Some(LookupError::Extrapolation {
            requested: t,
            available,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, PI};

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let r = Quaternion::identity().rotate(Vec3::new(1.0, 2.0, 3.0));
        assert!((r.x - 1.0).abs() < 1e-12);
        assert!((r.y - 2.0).abs() < 1e-12);
        assert!((r.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-12, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-12, "y should be ~1, got {}", r.y);
        assert!(r.z.abs() < 1e-12);
    }

    #[test]
    fn quaternion_inverse_undoes_rotation() {
        let q = Quaternion::from_yaw(0.7);
        let v = Vec3::new(0.3, -1.2, 0.4);
        let back = q.inverse().rotate(q.rotate(v));
        assert!((back - v).norm() < 1e-12);
    }

    #[test]
    fn normalized_rescales_near_unit_values() {
        let q = Quaternion::new(1.02, 0.0, 0.0, 0.0).normalized();
        assert!((q.norm() - 1.0).abs() < 1e-12);
        assert_eq!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalized(), Quaternion::identity());
        assert_eq!(
            Quaternion::new(f64::NAN, 0.0, 0.0, 0.0).normalized(),
            Quaternion::identity()
        );
    }

    #[test]
    fn inverse_of_unnormalized_quaternion_is_still_a_rotation() {
        // Scaled by 2: rotate() on the raw value would stretch the vector.
        let q = Quaternion::from_yaw(FRAC_PI_2);
        let scaled = Quaternion::new(q.w * 2.0, q.x * 2.0, q.y * 2.0, q.z * 2.0);
        let r = scaled.inverse().rotate(Vec3::new(0.0, 1.0, 0.0));
        assert!((r.x - 1.0).abs() < 1e-12);
        assert!(r.y.abs() < 1e-12);
    }

    #[test]
    fn yaw_round_trips_through_from_yaw() {
        for yaw in [-3.0, -1.0, 0.0, 0.1, 1.5, 3.0] {
            assert!((Quaternion::from_yaw(yaw).yaw() - yaw).abs() < 1e-12, "yaw {yaw}");
        }
    }

    #[test]
    fn euler_discards_nothing_for_pure_roll() {
        let half = 0.25_f64;
        let q = Quaternion::new(half.cos(), half.sin(), 0.0, 0.0);
        let (roll, pitch, yaw) = q.to_euler();
        assert!((roll - 0.5).abs() < 1e-12);
        assert!(pitch.abs() < 1e-12);
        assert!(yaw.abs() < 1e-12);
    }

    #[test]
    fn yaw_of_half_turn_is_pi() {
        assert!((Quaternion::from_yaw(PI).yaw().abs() - PI).abs() < 1e-12);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn transform_identity_compose_is_noop() {
        let t = Transform3D::new(Vec3::new(1.0, 2.0, 3.0), Quaternion::identity());
        let composed = Transform3D::identity().compose(t);
        assert!((composed.translation - t.translation).norm() < 1e-12);
    }

    #[test]
    fn transform_compose_translations_add() {
        let t1 = Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        let t2 = Transform3D::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::identity());
        assert!((t1.compose(t2).translation.x - 3.0).abs() < 1e-12);
    }

    // ── TfBuffer ────────────────────────────────────────────────────────────

    fn buffer_with_base(stamp: f64) -> TfBuffer {
        let mut tf = TfBuffer::new();
        tf.set_transform(
            "map",
            "base_link",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
            stamp,
        );
        tf
    }

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = buffer_with_base(1.0);
        let t = tf.lookup("map", "map", LookupTime::Latest).unwrap();
        assert_eq!(t.transform, Transform3D::identity());
    }

    #[test]
    fn lookup_direct_edge_carries_stamp() {
        let tf = buffer_with_base(2.5);
        let t = tf.lookup("map", "base_link", LookupTime::Latest).unwrap();
        assert!((t.transform.translation.x - 1.0).abs() < 1e-12);
        assert_eq!(t.stamp, 2.5);
    }

    #[test]
    fn lookup_chain_uses_oldest_stamp() {
        let mut tf = buffer_with_base(3.0);
        tf.set_transform(
            "base_link",
            "laser",
            Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()),
            1.0,
        );
        let t = tf.lookup("map", "laser", LookupTime::Latest).unwrap();
        assert!((t.transform.translation.x - 1.5).abs() < 1e-12);
        assert_eq!(t.stamp, 1.0);
    }

    #[test]
    fn lookup_unknown_frame() {
        let tf = buffer_with_base(0.0);
        assert_eq!(
            tf.lookup("map", "ghost", LookupTime::Latest),
            Err(LookupError::UnknownFrame("ghost".to_string()))
        );
        assert!(matches!(
            TfBuffer::new().lookup("map", "base_link", LookupTime::Latest),
            Err(LookupError::UnknownFrame(_))
        ));
    }

    #[test]
    fn lookup_against_edge_direction_is_connectivity_error() {
        let tf = buffer_with_base(0.0);
        assert!(matches!(
            tf.lookup("base_link", "map", LookupTime::Latest),
            Err(LookupError::Connectivity { .. })
        ));
    }

    #[test]
    fn lookup_at_time_outside_tolerance_is_extrapolation() {
        let tf = buffer_with_base(5.0).with_tolerance(0.05);
        assert!(tf.lookup("map", "base_link", LookupTime::At(5.04)).is_ok());
        assert_eq!(
            tf.lookup("map", "base_link", LookupTime::At(5.5)),
            Err(LookupError::Extrapolation {
                requested: 5.5,
                available: 5.0
            })
        );
    }

    #[test]
    fn stale_sibling_edges_do_not_affect_timed_lookup() {
        let mut tf = buffer_with_base(10.0).with_tolerance(0.05);
        for i in 0..20 {
            tf.set_transform(
                "map",
                &format!("stale_{i}"),
                Transform3D::identity(),
                0.0,
            );
        }
        for _ in 0..20 {
            let t = tf.lookup("map", "base_link", LookupTime::At(10.0)).unwrap();
            assert_eq!(t.stamp, 10.0);
        }
    }

    #[test]
    fn stale_edge_anywhere_on_chain_is_extrapolation() {
        let mut tf = buffer_with_base(10.0).with_tolerance(0.05);
        tf.set_transform(
            "base_link",
            "laser",
            Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()),
            9.0,
        );
        assert_eq!(
            tf.lookup("map", "laser", LookupTime::At(10.0)),
            Err(LookupError::Extrapolation {
                requested: 10.0,
                available: 9.0
            })
        );
        assert!(tf.lookup("map", "laser", LookupTime::Latest).is_ok());
    }

    #[test]
    fn set_transform_overrides_previous() {
        let mut tf = buffer_with_base(0.0);
        tf.set_transform(
            "map",
            "base_link",
            Transform3D::new(Vec3::new(5.0, 0.0, 0.0), Quaternion::identity()),
            1.0,
        );
        let t = tf.lookup("map", "base_link", LookupTime::Latest).unwrap();
        assert!((t.transform.translation.x - 5.0).abs() < 1e-12);
        assert_eq!(t.stamp, 1.0);
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        // base_link sits at the origin yawed 90°; laser is 1 m ahead of it.
        let mut tf = TfBuffer::new();
        tf.set_transform(
            "map",
            "base_link",
            Transform3D::new(Vec3::zero(), Quaternion::from_yaw(FRAC_PI_2)),
            0.0,
        );
        tf.set_transform(
            "base_link",
            "laser",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
            0.0,
        );

        let t = tf.lookup("map", "laser", LookupTime::Latest).unwrap().transform;
        assert!(t.translation.x.abs() < 1e-12, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-12, "y={}", t.translation.y);
        assert!((t.rotation.yaw() - FRAC_PI_2).abs() < 1e-12);
    }
}
