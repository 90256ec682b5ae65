//! Pose and gesture classification from face-tracking transforms.
//!
//! A [`FaceFrame`] carries the raw 4×4 transforms produced once per tracking
//! tick. [`PoseSample::from_frame`] reduces one frame to unified pitch/yaw/roll
//! angles plus the left/right eye depth separation, and a [`GestureWindow`]
//! accumulates threshold crossings into hit flags while it is open.
//!
//! Hit flags are a cumulative OR over all samples observed during the window:
//! once set, a flag is never cleared by a later contradicting sample, only by
//! an explicit window reset. This tolerates brief overshoot/return motion
//! during a deliberate head gesture.

use nalgebra::{Matrix4, Point3, Rotation3};
use serde::{Deserialize, Serialize};

/// Cardinal response direction for a head gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// All four directions in a fixed canonical order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

/// One face-tracking sample: raw transforms, produced once per sensor tick.
///
/// Axis convention follows the face anchor: +x right, +y up, +z toward the
/// camera. Eye transforms are expressed relative to the face anchor.
#[derive(Debug, Clone)]
pub struct FaceFrame {
    /// Capture timestamp in microseconds.
    pub ts_us: i64,
    /// Face anchor transform in world coordinates.
    pub face: Matrix4<f32>,
    /// Left-eye sub-transform, relative to the face anchor.
    pub left_eye: Matrix4<f32>,
    /// Right-eye sub-transform, relative to the face anchor.
    pub right_eye: Matrix4<f32>,
    /// Camera transform in world coordinates.
    pub camera: Matrix4<f32>,
}

impl FaceFrame {
    /// World-space position of the left eye center.
    pub fn left_eye_position(&self) -> Point3<f32> {
        transform_origin(&(self.face * self.left_eye))
    }

    /// World-space position of the right eye center.
    pub fn right_eye_position(&self) -> Point3<f32> {
        transform_origin(&(self.face * self.right_eye))
    }
}

fn transform_origin(m: &Matrix4<f32>) -> Point3<f32> {
    Point3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Interpupillary distance in millimeters for one frame.
///
/// Distance between the eye-center translations; rigid face motion cancels,
/// so face-local and world-space separations are identical.
pub fn pupil_distance_mm(frame: &FaceFrame) -> f32 {
    let l = transform_origin(&frame.left_eye);
    let r = transform_origin(&frame.right_eye);
    (r - l).norm() * 1000.0
}

/// Derived per-frame pose: unified angles plus eye depth separation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    /// Head yaw in degrees, folded into [-90, 90].
    pub yaw_deg: f32,
    /// Head pitch in degrees, folded into [-90, 90]. Up is positive.
    pub pitch_deg: f32,
    /// Head roll in degrees, folded into [-90, 90].
    pub roll_deg: f32,
    /// Right-eye depth minus left-eye depth, meters. Positive when the head
    /// is turned so the right eye sits closer to the camera.
    pub delta_z: f32,
}

impl PoseSample {
    /// Classify one frame. Pure: no state is carried between frames.
    pub fn from_frame(frame: &FaceFrame) -> Self {
        let rot = Rotation3::from_matrix_unchecked(
            frame.face.fixed_view::<3, 3>(0, 0).into_owned(),
        );
        // nalgebra decomposes as rotations about x, y, z in that order; about-x
        // is the nod axis in the face-anchor convention.
        let (rx, ry, rz) = rot.euler_angles();
        PoseSample {
            pitch_deg: fold_deg(rx.to_degrees()),
            yaw_deg: fold_deg(ry.to_degrees()),
            roll_deg: fold_deg(rz.to_degrees()),
            delta_z: frame.right_eye[(2, 3)] - frame.left_eye[(2, 3)],
        }
    }
}

/// Fold a raw decomposed angle into [-90, 90] degrees.
///
/// atan2-derived decompositions are double-valued near the vertical: the same
/// physical nod can surface as e.g. +170° instead of +10° depending on which
/// quadrant the solver picked. Shifting by 180° until the angle lies in
/// [-90, 90] removes the ambiguity so "up" is always positive.
pub fn fold_deg(mut angle: f32) -> f32 {
    while angle > 90.0 {
        angle -= 180.0;
    }
    while angle < -90.0 {
        angle += 180.0;
    }
    angle
}

/// Signed thresholds for the four gesture directions.
///
/// `up_deg` is positive and `down_deg` negative; `right_m`/`left_m` bound the
/// eye depth separation in meters. The two stock sets are deliberately
/// different: practice thresholds are looser so early trials build user
/// confidence, formal thresholds are tuned per direction and may be
/// asymmetric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureThresholds {
    pub up_deg: f32,
    pub down_deg: f32,
    pub right_m: f32,
    pub left_m: f32,
}

impl GestureThresholds {
    /// Loose thresholds for the practice phase.
    pub fn practice() -> Self {
        Self {
            up_deg: 10.0,
            down_deg: -10.0,
            right_m: 0.006,
            left_m: -0.006,
        }
    }

    /// Formal test thresholds. The up allowance is larger than down: chin
    /// lifts read smaller on the nod axis than chin drops of the same effort.
    pub fn formal() -> Self {
        Self {
            up_deg: 16.0,
            down_deg: -12.0,
            right_m: 0.010,
            left_m: -0.010,
        }
    }

    /// Sanity check used by config validation.
    pub fn is_valid(&self) -> bool {
        self.up_deg > 0.0 && self.down_deg < 0.0 && self.right_m > 0.0 && self.left_m < 0.0
    }
}

/// A listening window that accumulates gesture hits.
///
/// The window itself holds no timer; the orchestrator owns the deadline and
/// calls [`GestureWindow::close`] when it fires. Observations against a closed
/// window are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct GestureWindow {
    open: bool,
    deadline_us: i64,
    pub hit_up: bool,
    pub hit_down: bool,
    pub hit_left: bool,
    pub hit_right: bool,
}

impl GestureWindow {
    /// Open a fresh window (all flags cleared) with the given deadline.
    pub fn open_until(deadline_us: i64) -> Self {
        GestureWindow {
            open: true,
            deadline_us,
            ..Default::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn deadline_us(&self) -> i64 {
        self.deadline_us
    }

    /// Accumulate threshold crossings from one pose sample.
    ///
    /// Flags only ever go from false to true here; a sample that has returned
    /// to neutral does not undo an earlier crossing.
    pub fn observe(&mut self, pose: &PoseSample, th: &GestureThresholds) {
        if !self.open {
            return;
        }
        if pose.pitch_deg >= th.up_deg {
            self.hit_up = true;
        }
        if pose.pitch_deg <= th.down_deg {
            self.hit_down = true;
        }
        if pose.delta_z >= th.right_m {
            self.hit_right = true;
        }
        if pose.delta_z <= th.left_m {
            self.hit_left = true;
        }
    }

    /// Whether the given direction has been hit within this window.
    pub fn hit(&self, dir: Direction) -> bool {
        match dir {
            Direction::Up => self.hit_up,
            Direction::Down => self.hit_down,
            Direction::Left => self.hit_left,
            Direction::Right => self.hit_right,
        }
    }

    pub fn any_hit(&self) -> bool {
        self.hit_up || self.hit_down || self.hit_left || self.hit_right
    }

    /// Close the window; accumulated flags stay readable.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Explicit reset: close and clear all flags.
    pub fn reset(&mut self) {
        *self = GestureWindow::default();
    }
}
