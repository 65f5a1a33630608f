use crate::build::{p70, p_number_a, p_time};
use crate::collect::{Collected, Connection, ObjKind, Registry};
use crate::export::ExportOptions;
use crate::quat::{quat_to_euler_xyz, unwind_euler};
use crate::scene::{Scene, Track};
use crate::util::{name_with_class, normalize_bone_name};
use crate::writer::{Data, FbxNode};
use crate::{deg, kmul, Vec3, F};

use log::debug;

use std::collections::HashMap;

/// FBX time unit: one second in KTime ticks, divisible by every common
/// frame rate.
pub(crate) const KTIME_PER_SECOND: i64 = 46_186_158_000;

pub(crate) fn to_ktime(seconds: F) -> i64 {
    (seconds * KTIME_PER_SECOND as F).round() as i64
}

struct Channel {
    /// Curve-node name and key attribute kind: "T", "R" or "S".
    attr: &'static str,
    /// Property the curve node animates on the bone model.
    target: &'static str,
    /// One XYZ triple per key, in output units.
    keys: Vec<Vec3>,
}

/// Converts a track's raw values into an FBX channel, or `None` for
/// properties this exporter does not keyframe.
fn convert_track(track: &Track, scale: F) -> Option<Channel> {
    let (_, prop) = track.name.rsplit_once('.')?;
    match prop {
        "position" => Some(Channel {
            attr: "T",
            target: "Lcl Translation",
            keys: track
                .values
                .chunks_exact(3)
                .map(|c| kmul(scale, [c[0], c[1], c[2]]))
                .collect(),
        }),
        "scale" => Some(Channel {
            attr: "S",
            target: "Lcl Scaling",
            keys: track
                .values
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        }),
        "quaternion" => {
            let mut keys: Vec<Vec3> = vec![];
            let mut prev: Option<Vec3> = None;
            for q in track.values.chunks_exact(4) {
                let mut e = quat_to_euler_xyz([q[0], q[1], q[2], q[3]]);
                if let Some(prev) = prev {
                    e = unwind_euler(prev, e);
                }
                prev = Some(e);
                keys.push(e.map(deg));
            }
            Some(Channel {
                attr: "R",
                target: "Lcl Rotation",
                keys,
            })
        }
        _ => None,
    }
}

fn curve_node(id: i64, attr: &str, default: Vec3) -> FbxNode {
    FbxNode::new(
        "AnimationCurveNode",
        vec![
            Data::I64(id),
            Data::String(name_with_class(attr, "AnimCurveNode")),
            Data::str(""),
        ],
    )
    .add(p70(vec![
        p_number_a("d|X", default[0]),
        p_number_a("d|Y", default[1]),
        p_number_a("d|Z", default[2]),
    ]))
}

fn curve(id: i64, times: &[i64], values: Vec<f32>) -> FbxNode {
    let n = values.len();
    FbxNode::new(
        "AnimationCurve",
        vec![
            Data::I64(id),
            Data::String(name_with_class("", "AnimCurve")),
            Data::str(""),
        ],
    )
    .add(FbxNode::new("Default", vec![Data::F64(0.)]))
    .add(FbxNode::new("KeyVer", vec![Data::I32(4008)]))
    .add(FbxNode::new("KeyTime", vec![Data::I64Arr(times.to_vec())]))
    .add(FbxNode::new("KeyValueFloat", vec![Data::F32Arr(values)]))
    .add(FbxNode::new("KeyAttrFlags", vec![Data::I32Arr(vec![256; n])]))
    .add(FbxNode::new(
        "KeyAttrDataFloat",
        vec![Data::F32Arr(vec![0.; 4 * n])],
    ))
    .add(FbxNode::new("KeyAttrRefCount", vec![Data::I32Arr(vec![1; n])]))
}

const AXIS_PROPS: [&str; 3] = ["d|X", "d|Y", "d|Z"];

pub(crate) fn animations(
    scene: &Scene,
    opts: &ExportOptions,
    col: &Collected,
    reg: &mut Registry,
    objects: &mut Vec<FbxNode>,
    conns: &mut Vec<Connection>,
) {
    if opts.animations.is_empty() {
        return;
    }

    // tracks address bones by normalized name
    let mut bones = HashMap::new();
    for obj in &col.objects {
        if obj.kind == ObjKind::Limb {
            bones.insert(
                normalize_bone_name(&scene.nodes[obj.node].name),
                reg.models[&obj.node],
            );
        }
    }

    for clip in &opts.animations {
        let stack_id = reg.ids.next();
        let layer_id = reg.ids.next();
        let stop = to_ktime(clip.duration);

        objects.push(
            FbxNode::new(
                "AnimationStack",
                vec![
                    Data::I64(stack_id),
                    Data::String(name_with_class(&clip.name, "AnimStack")),
                    Data::str(""),
                ],
            )
            .add(p70(vec![
                p_time("LocalStop", stop),
                p_time("ReferenceStop", stop),
            ])),
        );
        objects.push(FbxNode::new(
            "AnimationLayer",
            vec![
                Data::I64(layer_id),
                Data::String(name_with_class(&clip.name, "AnimLayer")),
                Data::str(""),
            ],
        ));
        conns.push(Connection::OO(layer_id, stack_id));

        for track in &clip.tracks {
            let Some((bone, _)) = track.name.rsplit_once('.') else {
                debug!("track {:?} has no property suffix, skipping", track.name);
                continue;
            };
            let Some(&bone_id) = bones.get(&normalize_bone_name(bone)) else {
                debug!("track {:?} targets an unknown bone, skipping", track.name);
                continue;
            };
            let Some(mut ch) = convert_track(track, opts.scale) else {
                debug!("track {:?} has an unsupported property, skipping", track.name);
                continue;
            };
            // malformed tracks keep times and values parallel
            let n = ch.keys.len().min(track.times.len());
            ch.keys.truncate(n);
            if ch.keys.is_empty() {
                continue;
            }

            let times = track
                .times
                .iter()
                .take(n)
                .map(|&t| to_ktime(t))
                .collect::<Vec<i64>>();

            let cn_id = reg.ids.next();
            objects.push(curve_node(cn_id, ch.attr, ch.keys[0]));
            conns.push(Connection::OO(cn_id, layer_id));
            conns.push(Connection::OP(cn_id, bone_id, ch.target));

            for (axis, prop) in AXIS_PROPS.into_iter().enumerate() {
                let curve_id = reg.ids.next();
                let values = ch.keys.iter().map(|k| k[axis] as f32).collect();
                objects.push(curve(curve_id, &times, values));
                conns.push(Connection::OP(curve_id, cn_id, prop));
            }
        }
    }
}

#[test]
fn test_to_ktime_rounds() {
    assert_eq!(to_ktime(0.), 0);
    assert_eq!(to_ktime(1.), KTIME_PER_SECOND);
    assert_eq!(to_ktime(0.5), KTIME_PER_SECOND / 2);
    // rounding, not truncation
    assert_eq!(to_ktime(1e-11), 0);
    assert_eq!(to_ktime(1.5e-11), 1);
}

#[test]
fn test_convert_track_position_scales() {
    let t = Track {
        name: "Hips.position".into(),
        times: vec![0., 1.],
        values: vec![1., 2., 3., 4., 5., 6.],
    };
    let ch = convert_track(&t, 100.).unwrap();
    assert_eq!(ch.attr, "T");
    assert_eq!(ch.keys, vec![[100., 200., 300.], [400., 500., 600.]]);
}

#[test]
fn test_convert_track_quaternion_continuity() {
    use std::f64::consts::PI;
    // rotation about Z sweeping across the pi branch cut
    let angles = [3.0, 3.3, 3.6];
    let values = angles
        .iter()
        .flat_map(|a: &f64| [0., 0., (a / 2.).sin(), (a / 2.).cos()])
        .collect::<Vec<F>>();
    let t = Track {
        name: "Hips.quaternion".into(),
        times: vec![0., 0.5, 1.],
        values,
    };
    let ch = convert_track(&t, 100.).unwrap();
    assert_eq!(ch.attr, "R");
    assert_eq!(ch.keys.len(), 3);
    for w in ch.keys.windows(2) {
        for i in 0..3 {
            assert!(
                (w[1][i] - w[0][i]).abs() < deg(PI),
                "euler jump between {:?} and {:?}",
                w[0],
                w[1]
            );
        }
    }
}

#[test]
fn test_convert_track_unknown_property() {
    let t = Track {
        name: "Hips.visibility".into(),
        times: vec![0.],
        values: vec![1.],
    };
    assert!(convert_track(&t, 1.).is_none());
}
