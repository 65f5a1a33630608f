use crate::{length, normalize, Mat4, Vec3, F};

use std::f64::consts::{PI, TAU};

/// returns each row of the matrix representing a quaternion
pub fn quat_to_mat([x, y, z, w]: [F; 4]) -> [[F; 3]; 3] {
    let qxx = x * x;
    let qyy = y * y;
    let qzz = z * z;
    let qxz = x * z;
    let qxy = x * y;
    let qyz = y * z;
    let qwx = w * x;
    let qwy = w * y;
    let qwz = w * z;

    [
        [1. - 2. * (qyy + qzz), 2. * (qxy - qwz), 2. * (qxz + qwy)],
        [2. * (qxy + qwz), 1. - 2. * (qxx + qzz), 2. * (qyz - qwx)],
        [2. * (qxz - qwy), 2. * (qyz + qwx), 1. - 2. * (qxx + qyy)],
    ]
}

/// XYZ-order Euler angles (radians) of a pure rotation given by rows.
/// Near the gimbal singularity the Z angle collapses to 0.
pub fn euler_xyz_from_rows(m: [[F; 3]; 3]) -> Vec3 {
    let y = m[0][2].clamp(-1., 1.).asin();
    if m[0][2].abs() < 0.999_999_9 {
        [(-m[1][2]).atan2(m[2][2]), y, (-m[0][1]).atan2(m[0][0])]
    } else {
        [m[2][1].atan2(m[1][1]), y, 0.]
    }
}

/// XYZ-order Euler angles of a unit quaternion.
pub fn quat_to_euler_xyz(q: [F; 4]) -> Vec3 {
    euler_xyz_from_rows(quat_to_mat(normalize(q)))
}

/// Shifts `e` by one whole turn per axis where it jumped across the
/// principal branch relative to `prev`, keeping successive keys within pi.
pub fn unwind_euler(prev: Vec3, mut e: Vec3) -> Vec3 {
    for i in 0..3 {
        let d = e[i] - prev[i];
        if d.abs() > PI {
            e[i] -= d.signum() * TAU;
        }
    }
    e
}

/// Splits an affine transform into translation, XYZ Euler rotation and
/// scale. Mirror transforms fold the flip into the X scale.
pub fn decompose(m: Mat4) -> (Vec3, Vec3, Vec3) {
    let t = [m[3][0], m[3][1], m[3][2]];
    let cols: [Vec3; 3] = std::array::from_fn(|c| [m[c][0], m[c][1], m[c][2]]);
    let mut s = cols.map(length);

    let det = crate::dot(cols[0], crate::cross(cols[1], cols[2]));
    if det < 0. {
        s[0] = -s[0];
    }

    let rows: [[F; 3]; 3] = std::array::from_fn(|r| std::array::from_fn(|c| m[c][r] / s[c]));
    (t, euler_xyz_from_rows(rows), s)
}

#[test]
fn test_quat_to_euler_axis_aligned() {
    let h = std::f64::consts::FRAC_PI_4;
    // 90 degrees about X
    let e = quat_to_euler_xyz([h.sin(), 0., 0., h.cos()]);
    assert!((e[0] - 2. * h).abs() < 1e-10, "{e:?}");
    assert!(e[1].abs() < 1e-10 && e[2].abs() < 1e-10, "{e:?}");

    // 90 degrees about Z
    let e = quat_to_euler_xyz([0., 0., h.sin(), h.cos()]);
    assert!((e[2] - 2. * h).abs() < 1e-10, "{e:?}");
}

#[test]
fn test_euler_identity() {
    assert_eq!(quat_to_euler_xyz([0., 0., 0., 1.]), [0.; 3]);
}

#[test]
fn test_unwind_euler() {
    let prev = [3.0, 0., 0.];
    let next = [-3.0, 0., 0.];
    let un = unwind_euler(prev, next);
    assert!((un[0] - (TAU - 3.0)).abs() < 1e-12, "{un:?}");
    assert!((un[0] - prev[0]).abs() < PI);

    // within-branch keys pass through untouched
    assert_eq!(unwind_euler([0.1, 0., 0.], [0.4, 0., 0.]), [0.4, 0., 0.]);
}

#[test]
fn test_decompose_trs() {
    let h = std::f64::consts::FRAC_PI_2;
    let (s, c) = (h.sin(), h.cos());
    // rotate 90 about Z, scale 2, translate (1,2,3)
    let m: Mat4 = [
        [2. * c, 2. * s, 0., 0.],
        [-2. * s, 2. * c, 0., 0.],
        [0., 0., 2., 0.],
        [1., 2., 3., 1.],
    ];
    let (t, e, sc) = decompose(m);
    assert_eq!(t, [1., 2., 3.]);
    assert!((e[2] - h).abs() < 1e-10, "{e:?}");
    for v in sc {
        assert!((v - 2.).abs() < 1e-10, "{sc:?}");
    }
}
