use crate::export::ExportOptions;
use crate::scene::{NodeKind, Scene};
use crate::util::is_discard_name;
use crate::Mat4;

use std::collections::{HashMap, HashSet};

/// FBX model kind of an exported object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjKind {
    Null,
    Mesh,
    Limb,
}

impl ObjKind {
    pub(crate) fn class(self) -> &'static str {
        match self {
            ObjKind::Null => "Null",
            ObjKind::Mesh => "Mesh",
            ObjKind::Limb => "LimbNode",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ExportObject {
    pub node: usize,
    pub kind: ObjKind,
}

/// Flat partition of the scene produced by a single depth-first pass.
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub objects: Vec<ExportObject>,
    /// Node indices of meshes whose skin is exported.
    pub skinned: Vec<usize>,
    /// Material indices in first-use order.
    pub materials: Vec<usize>,
    /// Texture indices in first-use order.
    pub textures: Vec<usize>,
}

impl Collected {
    fn record_materials(&mut self, scene: &Scene, mesh: usize, opts: &ExportOptions) {
        if !opts.export_materials {
            return;
        }
        for &mi in &scene.meshes[mesh].materials {
            if !self.materials.contains(&mi) {
                self.materials.push(mi);
            }
            if let Some(ti) = scene.materials[mi].texture {
                if !self.textures.contains(&ti) {
                    self.textures.push(ti);
                }
            }
        }
    }
}

pub(crate) fn collect(scene: &Scene, opts: &ExportOptions) -> Collected {
    let mut out = Collected::default();
    for &r in &scene.root_nodes {
        visit(scene, r, opts, &mut out);
    }

    // bones referenced by the skinned meshes, de-duplicated, after
    // everything else
    let mut seen = HashSet::new();
    for &mesh_node in &out.skinned {
        let NodeKind::Mesh(mi) = scene.nodes[mesh_node].kind else {
            continue;
        };
        let Some(si) = scene.meshes[mi].skeleton else {
            continue;
        };
        for &b in &scene.skeletons[si].bones {
            if seen.insert(b) {
                out.objects.push(ExportObject {
                    node: b,
                    kind: ObjKind::Limb,
                });
            }
        }
    }
    out
}

fn visit(scene: &Scene, ni: usize, opts: &ExportOptions, out: &mut Collected) {
    let n = &scene.nodes[ni];
    // every skip below still descends into the subtree
    let skip = (opts.only_visible && !n.visible) || !n.export || n.helper;
    if !skip {
        match n.kind {
            NodeKind::Mesh(mi) => {
                let mesh = &scene.meshes[mi];
                if opts.export_skin && !mesh.v.is_empty() && mesh.skeleton.is_some() {
                    out.objects.push(ExportObject {
                        node: ni,
                        kind: ObjKind::Mesh,
                    });
                    out.skinned.push(ni);
                    out.record_materials(scene, mi, opts);
                } else if !is_discard_name(&n.name) {
                    out.objects.push(ExportObject {
                        node: ni,
                        kind: ObjKind::Mesh,
                    });
                    out.record_materials(scene, mi, opts);
                }
            }
            NodeKind::Empty => out.objects.push(ExportObject {
                node: ni,
                kind: ObjKind::Null,
            }),
            // bones enter through the skinned-mesh union instead
            NodeKind::Bone => {}
        }
    }
    for &c in &n.children {
        visit(scene, c, opts, out);
    }
}

/// Monotone 64-bit id allocator, one per export. Id 0 is the root.
pub(crate) struct IdGen {
    next: i64,
}

impl IdGen {
    pub fn new() -> Self {
        IdGen { next: 3333 }
    }

    pub fn next(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        assert_ne!(id, 0);
        id
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Armature {
    pub id: i64,
    pub world: Mat4,
}

/// Ids handed out during object emission, read back by the later stages
/// (parent edges, deformers, animation targets).
pub(crate) struct Registry {
    pub ids: IdGen,

    /// node index -> Model id
    pub models: HashMap<usize, i64>,
    /// mesh node index -> Geometry id
    pub geos: HashMap<usize, i64>,
    /// material index -> Material id
    pub mats: HashMap<usize, i64>,

    pub armature: Option<Armature>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            ids: IdGen::new(),
            models: HashMap::new(),
            geos: HashMap::new(),
            mats: HashMap::new(),
            armature: None,
        }
    }
}

/// An edge of the object graph, emitted into the `Connections` record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Connection {
    /// Object-to-object: child id, parent id.
    OO(i64, i64),
    /// Object-to-property: child id, parent id, property name.
    OP(i64, i64, &'static str),
}

#[test]
fn test_idgen_monotone() {
    let mut ids = IdGen::new();
    let a = ids.next();
    let b = ids.next();
    assert!(a > 0 && b == a + 1);
}
