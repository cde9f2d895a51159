//! Rigid transform (rotation + translation).

use crate::spatial::{Direction3, Point3, Vector3};

use super::trait_::SpatialTransform;

/// Rigid transform with a fixed center of rotation.
///
/// `T(x) = R(x − c) + c + t` where `R` composes Euler angles in ZYX order:
/// `R = R_z(γ) · R_y(β) · R_x(α)`.
///
/// Parameters are ordered `[α, β, γ, tx, ty, tz]` (rotations in radians
/// first, then translations).
#[derive(Debug, Clone)]
pub struct RigidTransform {
    rotation: Vector3,
    translation: Vector3,
    center: Point3,
    // Rotation matrix and its three angle partials, rebuilt on parameter
    // changes so point mapping stays allocation- and trig-free.
    matrix: Direction3,
    angle_partials: [Direction3; 3],
}

impl RigidTransform {
    /// Create a rigid transform from Euler angles and a translation.
    pub fn new(rotation: Vector3, translation: Vector3, center: Point3) -> Self {
        let mut transform = Self {
            rotation,
            translation,
            center,
            matrix: Direction3::identity(),
            angle_partials: [Direction3::zeros(); 3],
        };
        transform.update_matrices();
        transform
    }

    /// Identity transform rotating about `center`.
    pub fn identity(center: Point3) -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros(), center)
    }

    pub fn rotation(&self) -> &Vector3 {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3 {
        &self.translation
    }

    pub fn center(&self) -> &Point3 {
        &self.center
    }

    /// The composed rotation matrix.
    pub fn matrix(&self) -> &Direction3 {
        &self.matrix
    }

    fn update_matrices(&mut self) {
        let (sx, cx) = self.rotation[0].sin_cos();
        let (sy, cy) = self.rotation[1].sin_cos();
        let (sz, cz) = self.rotation[2].sin_cos();

        let rx = Direction3::new(1.0, 0.0, 0.0, 0.0, cx, -sx, 0.0, sx, cx);
        let ry = Direction3::new(cy, 0.0, sy, 0.0, 1.0, 0.0, -sy, 0.0, cy);
        let rz = Direction3::new(cz, -sz, 0.0, sz, cz, 0.0, 0.0, 0.0, 1.0);

        let drx = Direction3::new(0.0, 0.0, 0.0, 0.0, -sx, -cx, 0.0, cx, -sx);
        let dry = Direction3::new(-sy, 0.0, cy, 0.0, 0.0, 0.0, -cy, 0.0, -sy);
        let drz = Direction3::new(-sz, -cz, 0.0, cz, -sz, 0.0, 0.0, 0.0, 0.0);

        self.matrix = rz * ry * rx;
        self.angle_partials = [rz * ry * drx, rz * dry * rx, drz * ry * rx];
    }
}

impl SpatialTransform for RigidTransform {
    fn parameter_count(&self) -> usize {
        6
    }

    fn parameters(&self) -> Vec<f64> {
        vec![
            self.rotation[0],
            self.rotation[1],
            self.rotation[2],
            self.translation[0],
            self.translation[1],
            self.translation[2],
        ]
    }

    fn set_parameters(&mut self, parameters: &[f64]) {
        assert_eq!(parameters.len(), 6, "rigid transform expects 6 parameters");
        self.rotation = Vector3::new(parameters[0], parameters[1], parameters[2]);
        self.translation = Vector3::new(parameters[3], parameters[4], parameters[5]);
        self.update_matrices();
    }

    fn transform_point(&self, point: &Point3) -> Point3 {
        self.center + self.matrix * (point - self.center) + self.translation
    }

    fn parameter_jacobian(&self, point: &Point3, jacobian: &mut Vec<Vector3>) {
        jacobian.clear();
        let centered = point - self.center;
        for partial in &self.angle_partials {
            jacobian.push(partial * centered);
        }
        jacobian.push(Vector3::x());
        jacobian.push(Vector3::y());
        jacobian.push(Vector3::z());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_maps_points_unchanged() {
        let transform = RigidTransform::identity(Point3::new(5.0, 5.0, 5.0));
        let point = Point3::new(1.0, 2.0, 3.0);
        let mapped = transform.transform_point(&point);
        assert_relative_eq!(mapped[0], 1.0);
        assert_relative_eq!(mapped[1], 2.0);
        assert_relative_eq!(mapped[2], 3.0);
    }

    #[test]
    fn test_pure_translation() {
        let mut transform = RigidTransform::identity(Point3::origin());
        transform.set_parameters(&[0.0, 0.0, 0.0, 1.0, -2.0, 0.5]);
        let mapped = transform.transform_point(&Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(mapped[0], 2.0);
        assert_relative_eq!(mapped[1], -1.0);
        assert_relative_eq!(mapped[2], 1.5);
    }

    #[test]
    fn test_rotation_about_z() {
        let mut transform = RigidTransform::identity(Point3::origin());
        transform.set_parameters(&[0.0, 0.0, std::f64::consts::FRAC_PI_2, 0.0, 0.0, 0.0]);
        // 90 degrees about z maps +x to +y.
        let mapped = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(mapped[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(mapped[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(mapped[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_respects_center() {
        let center = Point3::new(1.0, 0.0, 0.0);
        let mut transform = RigidTransform::identity(center);
        transform.set_parameters(&[0.0, 0.0, std::f64::consts::PI, 0.0, 0.0, 0.0]);
        // The center is a fixed point of a pure rotation.
        let mapped = transform.transform_point(&center);
        assert_relative_eq!(mapped[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(mapped[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let mut transform = RigidTransform::identity(Point3::new(2.0, -1.0, 0.5));
        let params = [0.3, -0.2, 0.1, 1.0, 2.0, 3.0];
        transform.set_parameters(&params);

        let point = Point3::new(4.0, 1.0, -2.0);
        let mut jacobian = Vec::new();
        transform.parameter_jacobian(&point, &mut jacobian);
        assert_eq!(jacobian.len(), 6);

        let h = 1e-6;
        for p in 0..6 {
            let mut plus = params;
            plus[p] += h;
            let mut minus = params;
            minus[p] -= h;

            let mut t = transform.clone();
            t.set_parameters(&plus);
            let fp = t.transform_point(&point);
            t.set_parameters(&minus);
            let fm = t.transform_point(&point);

            for axis in 0..3 {
                let numeric = (fp[axis] - fm[axis]) / (2.0 * h);
                assert_relative_eq!(jacobian[p][axis], numeric, epsilon = 1e-6);
            }
        }
    }
}
