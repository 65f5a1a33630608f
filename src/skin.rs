use crate::collect::{Collected, Connection, Registry};
use crate::export::ExportOptions;
use crate::scene::{NodeKind, Scene};
use crate::util::{name_with_class, normalize_bone_name};
use crate::writer::{Data, FbxNode};
use crate::{affine_inverse, mat_to_flat, matmul, Mat4, F};

fn scale_translation(mut m: Mat4, k: F) -> Mat4 {
    for i in 0..3 {
        m[3][i] *= k;
    }
    m
}

fn mat_data(m: Mat4, scale: F) -> Data {
    Data::F64Arr(mat_to_flat(scale_translation(m, scale)).to_vec())
}

fn pose_node(model_id: i64, world: Mat4, scale: F) -> FbxNode {
    FbxNode::leaf("PoseNode")
        .add(FbxNode::new("Node", vec![Data::I64(model_id)]))
        .add(FbxNode::new("Matrix", vec![mat_data(world, scale)]))
}

/// Emits a `Skin` deformer, one `Cluster` per bone, and the `BindPose`
/// for every skinned mesh.
pub(crate) fn skins(
    scene: &Scene,
    opts: &ExportOptions,
    col: &Collected,
    reg: &mut Registry,
    objects: &mut Vec<FbxNode>,
    conns: &mut Vec<Connection>,
) {
    for &mesh_node in &col.skinned {
        let n = &scene.nodes[mesh_node];
        let NodeKind::Mesh(mi) = n.kind else {
            continue;
        };
        let mesh = &scene.meshes[mi];
        // mesh still exports without its skin when the vertex attributes
        // are missing
        if mesh.joint_idxs.is_empty() || mesh.joint_weights.is_empty() {
            continue;
        }
        let Some(si) = mesh.skeleton else { continue };
        let skeleton = &scene.skeletons[si];

        let skin_id = reg.ids.next();
        objects.push(
            FbxNode::new(
                "Deformer",
                vec![
                    Data::I64(skin_id),
                    Data::String(name_with_class(&n.name, "Deformer")),
                    Data::str("Skin"),
                ],
            )
            .add(FbxNode::new("Version", vec![Data::I32(101)]))
            .add(FbxNode::new("Link_DeformAcuracy", vec![Data::F64(50.)])),
        );
        conns.push(Connection::OO(skin_id, reg.geos[&mesh_node]));

        let mesh_bind = n.world;

        for (bi, &bone) in skeleton.bones.iter().enumerate() {
            let mut idxs = vec![];
            let mut weights = vec![];
            for (vi, slots) in mesh.joint_idxs.iter().enumerate() {
                for (s, &joint) in slots.iter().enumerate() {
                    let w = mesh.joint_weights[vi][s];
                    if joint as usize == bi && w > 0. {
                        idxs.push(vi as i32);
                        weights.push(w);
                        // one entry per vertex even if slots repeat the bone
                        break;
                    }
                }
            }

            let transform_link = match skeleton.bone_inverses.get(bi) {
                Some(&Some(inv)) => matmul(mesh_bind, affine_inverse(inv)),
                // no bind inverse recorded: the bone's current world
                // matrix stands in
                _ => scene.nodes[bone].world,
            };

            let cluster_id = reg.ids.next();
            objects.push(
                FbxNode::new(
                    "Deformer",
                    vec![
                        Data::I64(cluster_id),
                        Data::String(name_with_class(
                            &normalize_bone_name(&scene.nodes[bone].name),
                            "Deformer",
                        )),
                        Data::str("Cluster"),
                    ],
                )
                .add(FbxNode::new("Version", vec![Data::I32(100)]))
                .add(FbxNode::new(
                    "UserData",
                    vec![Data::str(""), Data::str("")],
                ))
                .add(FbxNode::new("Indexes", vec![Data::I32Arr(idxs)]))
                .add(FbxNode::new("Weights", vec![Data::F64Arr(weights)]))
                .add(FbxNode::new("Transform", vec![mat_data(mesh_bind, opts.scale)]))
                .add(FbxNode::new(
                    "TransformLink",
                    vec![mat_data(transform_link, opts.scale)],
                ))
                .add(FbxNode::new("Mode", vec![Data::str("Normalize")])),
            );
            conns.push(Connection::OO(cluster_id, skin_id));
            conns.push(Connection::OO(reg.models[&bone], cluster_id));
        }

        // bind pose snapshot: armature, the mesh, then every bone
        let pose_id = reg.ids.next();
        let mut pose = FbxNode::new(
            "Pose",
            vec![
                Data::I64(pose_id),
                Data::String(name_with_class(&n.name, "Pose")),
                Data::str("BindPose"),
            ],
        )
        .add(FbxNode::new("Type", vec![Data::str("BindPose")]))
        .add(FbxNode::new("Version", vec![Data::I32(100)]));

        let mut nodes = vec![];
        if let Some(arm) = &reg.armature {
            nodes.push(pose_node(arm.id, arm.world, opts.scale));
        }
        nodes.push(pose_node(reg.models[&mesh_node], mesh_bind, opts.scale));
        for &bone in &skeleton.bones {
            nodes.push(pose_node(
                reg.models[&bone],
                scene.nodes[bone].world,
                opts.scale,
            ));
        }

        pose.children
            .push(FbxNode::new("NbPoseNodes", vec![Data::I32(nodes.len() as i32)]));
        pose.children.extend(nodes);
        objects.push(pose);
    }
}

#[test]
fn test_scale_translation_only_touches_last_column() {
    let m: Mat4 = [
        [1., 0., 0., 0.],
        [0., 1., 0., 0.],
        [0., 0., 1., 0.],
        [2., 3., 4., 1.],
    ];
    let s = scale_translation(m, 100.);
    assert_eq!(s[3], [200., 300., 400., 1.]);
    assert_eq!(s[0], m[0]);
}
