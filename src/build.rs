use crate::collect::{Collected, Connection, ObjKind, Registry};
use crate::export::ExportOptions;
use crate::scene::{NodeKind, RotationOrder, Scene};
use crate::util::{name_with_class, normalize_bone_name, sanitize_texture_name};
use crate::writer::{Data, FbxNode};
use crate::{deg, kmul, quat, Vec3, F};

use log::warn;

const CREATOR: &str = concat!("fbxport ", env!("CARGO_PKG_VERSION"));

/// Fixed creation stamp; exports are deterministic for identical inputs.
const CREATION_TIME: &str = "1970-01-01 00:00:00:000";

const FILE_ID: [u8; 16] = [
    0x28, 0xb3, 0x2a, 0xeb, 0xb6, 0x24, 0xcc, 0xc2, 0xbf, 0xc8, 0xb0, 0x2a, 0xa9, 0x2b, 0xfc, 0xf1,
];

// ---- Properties70 rows ----

pub(crate) fn p70(children: Vec<FbxNode>) -> FbxNode {
    FbxNode {
        name: "Properties70".into(),
        props: vec![],
        children,
    }
}

fn p_row(name: &str, ty: &str, ty2: &str, flags: &str, vals: &[Data]) -> FbxNode {
    let mut props = vec![Data::str(name), Data::str(ty), Data::str(ty2), Data::str(flags)];
    props.extend_from_slice(vals);
    FbxNode::new("P", props)
}

fn p_int(name: &str, v: i32) -> FbxNode {
    p_row(name, "int", "Integer", "", &[Data::I32(v)])
}

fn p_enum(name: &str, v: i32) -> FbxNode {
    p_row(name, "enum", "", "", &[Data::I32(v)])
}

fn p_bool(name: &str, v: bool) -> FbxNode {
    p_row(name, "bool", "", "", &[Data::I32(v as i32)])
}

fn p_double(name: &str, v: F) -> FbxNode {
    p_row(name, "double", "Number", "", &[Data::F64(v)])
}

pub(crate) fn p_number_a(name: &str, v: F) -> FbxNode {
    p_row(name, "Number", "", "A", &[Data::F64(v)])
}

fn p_color(name: &str, [r, g, b]: Vec3) -> FbxNode {
    p_row(name, "Color", "", "A", &[Data::F64(r), Data::F64(g), Data::F64(b)])
}

fn p_vec(name: &str, ty: &str, [x, y, z]: Vec3) -> FbxNode {
    p_row(name, ty, "", "A", &[Data::F64(x), Data::F64(y), Data::F64(z)])
}

fn p_str(name: &str, v: &str) -> FbxNode {
    p_row(name, "KString", "", "", &[Data::str(v)])
}

fn p_url(name: &str, v: &str) -> FbxNode {
    p_row(name, "KString", "XRefUrl", "", &[Data::str(v)])
}

pub(crate) fn p_time(name: &str, ticks: i64) -> FbxNode {
    p_row(name, "KTime", "Time", "", &[Data::I64(ticks)])
}

fn i32_leaf(name: &str, v: i32) -> FbxNode {
    FbxNode::new(name, vec![Data::I32(v)])
}

fn str_leaf(name: &str, v: &str) -> FbxNode {
    FbxNode::new(name, vec![Data::str(v)])
}

// ---- Document scaffolding ----

pub(crate) fn file_id() -> FbxNode {
    FbxNode::new("FileId", vec![Data::Binary(FILE_ID.to_vec())])
}

pub(crate) fn creation_time() -> FbxNode {
    str_leaf("CreationTime", CREATION_TIME)
}

pub(crate) fn creator() -> FbxNode {
    str_leaf("Creator", CREATOR)
}

pub(crate) fn header_extension() -> FbxNode {
    let stamp = FbxNode::leaf("CreationTimeStamp")
        .add(i32_leaf("Version", 1000))
        .add(i32_leaf("Year", 1970))
        .add(i32_leaf("Month", 1))
        .add(i32_leaf("Day", 1))
        .add(i32_leaf("Hour", 0))
        .add(i32_leaf("Minute", 0))
        .add(i32_leaf("Second", 0))
        .add(i32_leaf("Millisecond", 0));

    let meta = FbxNode::leaf("MetaData")
        .add(i32_leaf("Version", 100))
        .add(str_leaf("Title", ""))
        .add(str_leaf("Subject", ""))
        .add(str_leaf("Author", ""))
        .add(str_leaf("Keywords", ""))
        .add(str_leaf("Revision", ""))
        .add(str_leaf("Comment", ""));

    let scene_info = FbxNode::new(
        "SceneInfo",
        vec![
            Data::String(name_with_class("GlobalInfo", "SceneInfo")),
            Data::str("UserData"),
        ],
    )
    .add(str_leaf("Type", "UserData"))
    .add(i32_leaf("Version", 100))
    .add(meta)
    .add(p70(vec![
        p_url("DocumentUrl", "/untitled.fbx"),
        p_url("SrcDocumentUrl", "/untitled.fbx"),
        p_str("Original|ApplicationName", "fbxport"),
        p_str("Original|ApplicationVersion", env!("CARGO_PKG_VERSION")),
    ]));

    FbxNode::leaf("FBXHeaderExtension")
        .add(i32_leaf("FBXHeaderVersion", 1003))
        .add(i32_leaf("FBXVersion", crate::writer::VERSION as i32))
        .add(i32_leaf("EncryptionType", 0))
        .add(stamp)
        .add(str_leaf("Creator", CREATOR))
        .add(scene_info)
}

pub(crate) fn global_settings() -> FbxNode {
    FbxNode::leaf("GlobalSettings")
        .add(i32_leaf("Version", 1000))
        .add(p70(vec![
            p_int("UpAxis", 1),
            p_int("UpAxisSign", 1),
            p_int("FrontAxis", 2),
            p_int("FrontAxisSign", 1),
            p_int("CoordAxis", 0),
            p_int("CoordAxisSign", 1),
            p_int("OriginalUpAxis", -1),
            p_int("OriginalUpAxisSign", 1),
            p_double("UnitScaleFactor", 1.),
            p_double("OriginalUnitScaleFactor", 1.),
            p_color("AmbientColor", [0., 0., 0.]),
            p_str("DefaultCamera", "Producer Perspective"),
            p_enum("TimeMode", 17),
            p_time("TimeSpanStart", 0),
            p_time("TimeSpanStop", crate::anim::KTIME_PER_SECOND),
            p_double("CustomFrameRate", -1.),
        ]))
}

pub(crate) fn documents(reg: &mut Registry) -> FbxNode {
    let doc = FbxNode::new(
        "Document",
        vec![Data::I64(reg.ids.next()), Data::str("Scene"), Data::str("Scene")],
    )
    .add(p70(vec![
        p_row("SourceObject", "object", "", "", &[]),
        p_str("ActiveAnimStackName", ""),
    ]))
    .add(FbxNode::new("RootNode", vec![Data::I64(0)]));

    FbxNode::leaf("Documents").add(i32_leaf("Count", 1)).add(doc)
}

pub(crate) fn references() -> FbxNode {
    FbxNode::leaf("References")
}

/// Object-type counts are derived from what was actually emitted.
pub(crate) fn definitions(objects: &[FbxNode]) -> FbxNode {
    const TYPES: &[&str] = &[
        "Model",
        "NodeAttribute",
        "Geometry",
        "Material",
        "Texture",
        "Video",
        "Deformer",
        "Pose",
        "AnimationStack",
        "AnimationLayer",
        "AnimationCurveNode",
        "AnimationCurve",
    ];

    let mut out = FbxNode::leaf("Definitions")
        .add(i32_leaf("Version", 100))
        .add(FbxNode::new(
            "ObjectType",
            vec![Data::str("GlobalSettings")],
        ).add(i32_leaf("Count", 1)));
    let mut total = 1;

    for ty in TYPES {
        let count = objects.iter().filter(|o| o.name == *ty).count() as i32;
        if count == 0 {
            continue;
        }
        total += count;
        out.children.push(
            FbxNode::new("ObjectType", vec![Data::str(ty)]).add(i32_leaf("Count", count)),
        );
    }
    out.children.insert(1, i32_leaf("Count", total));
    out
}

// ---- Objects ----

fn model_node(
    id: i64,
    name: &str,
    kind: ObjKind,
    translation: Vec3,
    rotation_deg: Vec3,
    scale: Vec3,
    order: RotationOrder,
    bone: bool,
) -> FbxNode {
    let mut props = vec![
        p_vec("Lcl Translation", "Lcl Translation", translation),
        p_vec("Lcl Rotation", "Lcl Rotation", rotation_deg),
        p_vec("Lcl Scaling", "Lcl Scaling", scale),
        p_enum("RotationOrder", order.to_fbx()),
        p_enum("InheritType", 1),
    ];
    if bone {
        props.push(p_bool("RotationActive", true));
        props.push(p_bool("SegmentScaleCompensate", true));
    }

    FbxNode::new(
        "Model",
        vec![
            Data::I64(id),
            Data::String(name_with_class(name, "Model")),
            Data::str(kind.class()),
        ],
    )
    .add(i32_leaf("Version", 232))
    .add(p70(props))
    .add(FbxNode::new("Shading", vec![Data::Bool(true)]))
    .add(str_leaf("Culling", "CullingOff"))
}

fn node_attribute(id: i64, name: &str, class: &str, type_flags: &str) -> FbxNode {
    FbxNode::new(
        "NodeAttribute",
        vec![
            Data::I64(id),
            Data::String(name_with_class(name, "NodeAttribute")),
            Data::str(class),
        ],
    )
    .add(str_leaf("TypeFlags", type_flags))
}

/// The armature root is the non-bone parent of the first skinned mesh's
/// first root bone; disjoint skeletons share it.
fn detect_armature(scene: &Scene, col: &Collected, parents: &[Option<usize>]) -> Option<usize> {
    let &mesh_node = col.skinned.first()?;
    let NodeKind::Mesh(mi) = scene.nodes[mesh_node].kind else {
        return None;
    };
    let si = scene.meshes[mi].skeleton?;
    for &b in &scene.skeletons[si].bones {
        let Some(p) = parents[b] else { continue };
        if scene.nodes[p].kind != NodeKind::Bone {
            return Some(p);
        }
    }
    None
}

fn parent_model_id(
    scene: &Scene,
    parents: &[Option<usize>],
    reg: &Registry,
    node: usize,
    kind: ObjKind,
) -> i64 {
    let mut at = parents[node];
    while let Some(p) = at {
        let parent_is_bone = scene.nodes[p].kind == NodeKind::Bone;
        if let Some(&id) = reg.models.get(&p) {
            if kind != ObjKind::Limb || parent_is_bone {
                return id;
            }
        }
        if kind == ObjKind::Limb && !parent_is_bone {
            break;
        }
        at = parents[p];
    }
    if kind == ObjKind::Limb {
        if let Some(a) = &reg.armature {
            return a.id;
        }
    }
    0
}

pub(crate) fn models(
    scene: &Scene,
    opts: &ExportOptions,
    col: &Collected,
    reg: &mut Registry,
    objects: &mut Vec<FbxNode>,
    conns: &mut Vec<Connection>,
) {
    let parents = scene.parents();

    if opts.export_skin {
        if let Some(root) = detect_armature(scene, col, &parents) {
            let id = reg.ids.next();
            let attr_id = reg.ids.next();
            let world = scene.nodes[root].world;
            let (t, e, s) = quat::decompose(world);
            objects.push(model_node(
                id,
                "Armature",
                ObjKind::Null,
                kmul(opts.scale, t),
                e.map(deg),
                s,
                RotationOrder::XYZ,
                false,
            ));
            objects.push(node_attribute(attr_id, "Armature", "Null", "Null"));
            conns.push(Connection::OO(id, 0));
            conns.push(Connection::OO(attr_id, id));
            reg.armature = Some(crate::collect::Armature { id, world });
        }
    }

    for obj in &col.objects {
        let n = &scene.nodes[obj.node];
        let id = reg.ids.next();
        reg.models.insert(obj.node, id);

        let bone = obj.kind == ObjKind::Limb;
        let name = if bone {
            normalize_bone_name(&n.name)
        } else {
            n.name.clone()
        };

        objects.push(model_node(
            id,
            &name,
            obj.kind,
            kmul(opts.scale, n.translation),
            n.rotation.map(deg),
            n.scale,
            n.rotation_order,
            bone,
        ));

        if bone {
            let attr_id = reg.ids.next();
            objects.push(node_attribute(attr_id, &name, "LimbNode", "Skeleton"));
            conns.push(Connection::OO(attr_id, id));
        }
    }

    // parent edges once every model id exists
    for obj in &col.objects {
        let id = reg.models[&obj.node];
        let dst = parent_model_id(scene, &parents, reg, obj.node, obj.kind);
        conns.push(Connection::OO(id, dst));
    }
}

fn layer_element(kind: &str) -> FbxNode {
    FbxNode::leaf("LayerElement")
        .add(str_leaf("Type", kind))
        .add(i32_leaf("TypedIndex", 0))
}

pub(crate) fn geometries(
    scene: &Scene,
    opts: &ExportOptions,
    col: &Collected,
    reg: &mut Registry,
    objects: &mut Vec<FbxNode>,
    conns: &mut Vec<Connection>,
) {
    for obj in &col.objects {
        if obj.kind != ObjKind::Mesh {
            continue;
        }
        let n = &scene.nodes[obj.node];
        let NodeKind::Mesh(mi) = n.kind else {
            continue;
        };
        let mesh = &scene.meshes[mi];

        let geo_id = reg.ids.next();
        reg.geos.insert(obj.node, geo_id);

        let verts = mesh
            .v
            .iter()
            .flat_map(|v| v.map(|c| c * opts.scale))
            .collect::<Vec<F>>();

        // the last index of each triangle is stored as -(i + 1)
        let idxs = mesh
            .f
            .iter()
            .flat_map(|&[a, b, c]| [a as i32, b as i32, -(c as i32) - 1])
            .collect::<Vec<i32>>();

        let mut geo = FbxNode::new(
            "Geometry",
            vec![
                Data::I64(geo_id),
                Data::String(name_with_class(&n.name, "Geometry")),
                Data::str("Mesh"),
            ],
        )
        .add(i32_leaf("GeometryVersion", 124))
        .add(FbxNode::new("Vertices", vec![Data::F64Arr(verts)]))
        .add(FbxNode::new("PolygonVertexIndex", vec![Data::I32Arr(idxs)]));

        let mut layer = FbxNode::new("Layer", vec![Data::I32(0)]).add(i32_leaf("Version", 100));

        if !mesh.n.is_empty() {
            let normals = mesh
                .f
                .iter()
                .flat_map(|f| f.iter().flat_map(|&vi| mesh.n[vi]))
                .collect::<Vec<F>>();
            geo.children.push(
                FbxNode::new("LayerElementNormal", vec![Data::I32(0)])
                    .add(i32_leaf("Version", 101))
                    .add(str_leaf("Name", ""))
                    .add(str_leaf("MappingInformationType", "ByPolygonVertex"))
                    .add(str_leaf("ReferenceInformationType", "Direct"))
                    .add(FbxNode::new("Normals", vec![Data::F64Arr(normals)])),
            );
            layer.children.push(layer_element("LayerElementNormal"));
        }

        if !mesh.uv.is_empty() {
            let uvs = mesh
                .f
                .iter()
                .flat_map(|f| f.iter().flat_map(|&vi| mesh.uv[vi]))
                .collect::<Vec<F>>();
            geo.children.push(
                FbxNode::new("LayerElementUV", vec![Data::I32(0)])
                    .add(i32_leaf("Version", 101))
                    .add(str_leaf("Name", ""))
                    .add(str_leaf("MappingInformationType", "ByPolygonVertex"))
                    .add(str_leaf("ReferenceInformationType", "Direct"))
                    .add(FbxNode::new("UV", vec![Data::F64Arr(uvs)])),
            );
            layer.children.push(layer_element("LayerElementUV"));
        }

        // a single material slot per mesh
        geo.children.push(
            FbxNode::new("LayerElementMaterial", vec![Data::I32(0)])
                .add(i32_leaf("Version", 101))
                .add(str_leaf("Name", ""))
                .add(str_leaf("MappingInformationType", "ByPolygon"))
                .add(str_leaf("ReferenceInformationType", "IndexToDirect"))
                .add(FbxNode::new(
                    "Materials",
                    vec![Data::I32Arr(vec![0; mesh.f.len()])],
                )),
        );
        layer.children.push(layer_element("LayerElementMaterial"));

        geo.children.push(layer);

        if opts.export_skin && col.skinned.contains(&obj.node) {
            if let Some(si) = mesh.skeleton {
                let names = scene.skeletons[si]
                    .bones
                    .iter()
                    .map(|&b| Data::String(normalize_bone_name(&scene.nodes[b].name)))
                    .collect::<Vec<_>>();
                geo.children.push(FbxNode::new("VertexGroups", names));
            }
        }

        objects.push(geo);
        conns.push(Connection::OO(geo_id, reg.models[&obj.node]));
    }
}

fn material_node(id: i64, name: &str, diffuse: Vec3, transparency: F) -> FbxNode {
    FbxNode::new(
        "Material",
        vec![
            Data::I64(id),
            Data::String(name_with_class(name, "Material")),
            Data::str(""),
        ],
    )
    .add(i32_leaf("Version", 102))
    .add(str_leaf("ShadingModel", "Lambert"))
    .add(i32_leaf("MultiLayer", 0))
    .add(p70(vec![
        p_color("DiffuseColor", diffuse),
        p_number_a("TransparencyFactor", transparency),
    ]))
}

pub(crate) fn materials(
    scene: &Scene,
    opts: &ExportOptions,
    col: &Collected,
    reg: &mut Registry,
    objects: &mut Vec<FbxNode>,
    conns: &mut Vec<Connection>,
) {
    if !opts.export_materials {
        return;
    }

    for &mat_idx in &col.materials {
        let mat = &scene.materials[mat_idx];
        let id = reg.ids.next();
        reg.mats.insert(mat_idx, id);
        objects.push(material_node(
            id,
            &mat.name,
            mat.diffuse.unwrap_or([0.5; 3]),
            1. - mat.opacity,
        ));
    }

    for obj in &col.objects {
        if obj.kind != ObjKind::Mesh {
            continue;
        }
        let NodeKind::Mesh(mi) = scene.nodes[obj.node].kind else {
            continue;
        };
        let model_id = reg.models[&obj.node];
        let mats = &scene.meshes[mi].materials;
        if mats.is_empty() {
            // meshes that request materials but carry none get a gray
            // Lambert of their own
            let id = reg.ids.next();
            objects.push(material_node(id, "Default", [0.5; 3], 0.));
            conns.push(Connection::OO(id, model_id));
        } else {
            for mat_idx in mats {
                conns.push(Connection::OO(reg.mats[mat_idx], model_id));
            }
        }
    }
}

/// Resolves the bytes to embed for a texture, downscaling when a size
/// limit is configured. `None` means the texture must be omitted.
fn texture_content(name: &str, png: Option<&Vec<u8>>, max_size: Option<u32>) -> Option<Vec<u8>> {
    let Some(png) = png else {
        warn!("texture {name:?} has no readable image, omitting");
        return None;
    };
    let Some(max) = max_size else {
        return Some(png.clone());
    };
    let img = match image::load_from_memory(png) {
        Ok(img) => img,
        Err(e) => {
            warn!("texture {name:?} could not be decoded ({e}), omitting");
            return None;
        }
    };
    if img.width() <= max && img.height() <= max {
        return Some(png.clone());
    }
    let img = img.resize(max, max, image::imageops::FilterType::Triangle);
    let mut out = std::io::Cursor::new(Vec::new());
    match img.write_to(&mut out, image::ImageFormat::Png) {
        Ok(()) => Some(out.into_inner()),
        Err(e) => {
            warn!("texture {name:?} could not be re-encoded ({e}), omitting");
            None
        }
    }
}

pub(crate) fn textures(
    scene: &Scene,
    opts: &ExportOptions,
    col: &Collected,
    reg: &mut Registry,
    objects: &mut Vec<FbxNode>,
    conns: &mut Vec<Connection>,
) {
    for &tex_idx in &col.textures {
        let tex = &scene.textures[tex_idx];
        let content = if opts.embed_images {
            match texture_content(&tex.name, tex.png.as_ref(), opts.max_texture_size) {
                Some(c) => Some(c),
                // unreadable image: no Texture, no Video, no connections
                None => continue,
            }
        } else {
            None
        };

        let tex_id = reg.ids.next();
        let mut name = sanitize_texture_name(&tex.name);
        if name.is_empty() {
            name = format!("Texture_{tex_id}");
        }
        let filename = format!("{name}.png");

        objects.push(
            FbxNode::new(
                "Texture",
                vec![
                    Data::I64(tex_id),
                    Data::String(name_with_class(&name, "Texture")),
                    Data::str(""),
                ],
            )
            .add(str_leaf("Type", "TextureVideoClip"))
            .add(i32_leaf("Version", 202))
            .add(str_leaf("TextureName", &name_with_class(&name, "Texture")))
            .add(str_leaf("Media", &name_with_class(&name, "Video")))
            .add(str_leaf("FileName", &filename))
            .add(str_leaf("RelativeFilename", &filename)),
        );

        if let Some(bytes) = content {
            let id = reg.ids.next();
            objects.push(
                FbxNode::new(
                    "Video",
                    vec![
                        Data::I64(id),
                        Data::String(name_with_class(&name, "Video")),
                        Data::str("Clip"),
                    ],
                )
                .add(str_leaf("Type", "Clip"))
                .add(p70(vec![p_url("Path", &filename)]))
                .add(i32_leaf("UseMipMap", 0))
                .add(str_leaf("Filename", &filename))
                .add(str_leaf("RelativeFilename", &filename))
                .add(FbxNode::new("Content", vec![Data::Binary(bytes)])),
            );
            conns.push(Connection::OO(id, tex_id));
        }

        for &mat_idx in &col.materials {
            if scene.materials[mat_idx].texture == Some(tex_idx) {
                conns.push(Connection::OP(tex_id, reg.mats[&mat_idx], "DiffuseColor"));
            }
        }
    }
}

pub(crate) fn connections(conns: &[Connection]) -> FbxNode {
    let mut out = FbxNode::leaf("Connections");
    for c in conns {
        let props = match c {
            Connection::OO(src, dst) => vec![Data::str("OO"), Data::I64(*src), Data::I64(*dst)],
            Connection::OP(src, dst, prop) => vec![
                Data::str("OP"),
                Data::I64(*src),
                Data::I64(*dst),
                Data::str(prop),
            ],
        };
        out.children.push(FbxNode::new("C", props));
    }
    out
}

#[test]
fn test_definitions_counts() {
    let objects = vec![
        FbxNode::leaf("Model"),
        FbxNode::leaf("Model"),
        FbxNode::leaf("Geometry"),
    ];
    let defs = definitions(&objects);
    let total = defs.find("Count").unwrap().props[0].as_i32().copied();
    assert_eq!(total, Some(4));
    let models = defs
        .children
        .iter()
        .find(|c| c.name == "ObjectType" && c.props[0].as_str() == Some("Model"))
        .unwrap();
    assert_eq!(models.find("Count").unwrap().props[0], Data::I32(2));
}

#[test]
fn test_model_node_shape() {
    let m = model_node(
        10,
        "Bone",
        ObjKind::Limb,
        [1., 2., 3.],
        [0.; 3],
        [1.; 3],
        RotationOrder::ZYX,
        true,
    );
    assert_eq!(m.props[1].as_str().unwrap().as_bytes(), b"Bone\x00\x01Model");
    assert_eq!(m.props[2], Data::str("LimbNode"));
    let p70 = m.find("Properties70").unwrap();
    let order = p70
        .children
        .iter()
        .find(|p| p.props[0].as_str() == Some("RotationOrder"))
        .unwrap();
    assert_eq!(*order.props.last().unwrap(), Data::I32(5));
    assert!(p70
        .children
        .iter()
        .any(|p| p.props[0].as_str() == Some("RotationActive")));
}
