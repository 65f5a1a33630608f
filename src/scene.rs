use crate::{identity, Mat4, Vec2, Vec3, F};

/// Euler application order for a node's local rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationOrder {
    #[default]
    XYZ,
    XZY,
    YXZ,
    YZX,
    ZXY,
    ZYX,
}

impl RotationOrder {
    pub(crate) fn to_fbx(self) -> i32 {
        use RotationOrder::*;
        match self {
            XYZ => 0,
            XZY => 1,
            YXZ => 2,
            YZX => 3,
            ZXY => 4,
            ZYX => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    /// Group or empty transform.
    #[default]
    Empty,
    /// References a mesh in `Scene::meshes`.
    Mesh(usize),
    /// Skeletal joint.
    Bone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<usize>,

    pub translation: Vec3,
    /// Euler angles in radians, applied in `rotation_order`.
    pub rotation: Vec3,
    pub rotation_order: RotationOrder,
    pub scale: Vec3,

    pub world: Mat4,

    pub visible: bool,
    /// Opt-out flag carried in the source scene's user data.
    pub export: bool,
    /// Marks skeleton visualization helpers, which are never exported.
    pub helper: bool,
}

impl Default for Node {
    fn default() -> Self {
        Node {
            name: String::new(),
            kind: NodeKind::Empty,
            children: vec![],
            translation: [0.; 3],
            rotation: [0.; 3],
            rotation_order: RotationOrder::XYZ,
            scale: [1.; 3],
            world: identity(),
            visible: true,
            export: true,
            helper: false,
        }
    }
}

/// Triangulated mesh data. Normals and UVs are per vertex and may be empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub v: Vec<Vec3>,
    pub f: Vec<[usize; 3]>,

    pub n: Vec<Vec3>,
    pub uv: Vec<Vec2>,

    /// 1-1 relation between vertices and joint idxs/weights.
    pub joint_idxs: Vec<[u16; 4]>,
    pub joint_weights: Vec<[F; 4]>,

    /// Indices into `Scene::materials`.
    pub materials: Vec<usize>,
    /// Index into `Scene::skeletons` for skinned meshes.
    pub skeleton: Option<usize>,
}

/// Ordered bone list with parallel inverse bind matrices.
/// A `None` inverse falls back to the bone's current world matrix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Skeleton {
    pub bones: Vec<usize>,
    pub bone_inverses: Vec<Option<Mat4>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse: Option<Vec3>,
    pub opacity: F,
    /// Index into `Scene::textures` for the diffuse map.
    pub texture: Option<usize>,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            name: String::new(),
            diffuse: None,
            opacity: 1.,
            texture: None,
        }
    }
}

/// An already-encoded PNG image. `png: None` models a source image whose
/// pixels could not be read; such textures are omitted from the output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Texture {
    pub name: String,
    pub png: Option<Vec<u8>>,
}

/// A keyed channel named `"<bone>.<property>"` with parallel times and
/// values. Values are flattened: 3 per key for position/scale, 4 for
/// quaternion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Track {
    pub name: String,
    pub times: Vec<F>,
    pub values: Vec<F>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clip {
    pub name: String,
    pub duration: F,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub nodes: Vec<Node>,
    pub root_nodes: Vec<usize>,

    pub meshes: Vec<Mesh>,
    pub skeletons: Vec<Skeleton>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
}

impl Scene {
    /// Parent lookup over the flat node vector.
    pub(crate) fn parents(&self) -> Vec<Option<usize>> {
        let mut out = vec![None; self.nodes.len()];
        for (ni, n) in self.nodes.iter().enumerate() {
            for &c in &n.children {
                out[c] = Some(ni);
            }
        }
        out
    }
}
