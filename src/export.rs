use crate::scene::{Clip, Scene};
use crate::writer::{write_document, FbxNode};
use crate::{anim, build, collect, skin, F};

/// Knobs of a single export. All defaults match a plain
/// `ExportOptions::default()` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Include skin deformers, clusters, vertex groups and the bind pose.
    pub export_skin: bool,
    /// Include material nodes and material connections.
    pub export_materials: bool,
    /// Skip objects whose visible flag is false.
    pub only_visible: bool,
    /// Embed `Video` nodes with PNG content for each referenced texture.
    pub embed_images: bool,
    /// When embedding, downscale textures wider or taller than this.
    pub max_texture_size: Option<u32>,
    /// Multiplier applied to vertex positions and to the translation
    /// column of every exported matrix.
    pub scale: F,
    /// Clips to emit as animation stacks.
    pub animations: Vec<Clip>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            export_skin: true,
            export_materials: true,
            only_visible: true,
            embed_images: true,
            max_texture_size: None,
            scale: 100.,
            animations: vec![],
        }
    }
}

/// Encodes the scene as a binary FBX 7500 byte stream.
///
/// Recoverable input anomalies (unreadable textures, tracks addressing
/// unknown bones, meshes without skin attributes) are logged or skipped;
/// they never fail the export.
pub fn export_fbx(scene: &Scene, opts: &ExportOptions) -> Vec<u8> {
    let col = collect::collect(scene, opts);
    let mut reg = collect::Registry::new();

    let mut objects: Vec<FbxNode> = vec![];
    let mut conns: Vec<collect::Connection> = vec![];

    build::models(scene, opts, &col, &mut reg, &mut objects, &mut conns);
    build::geometries(scene, opts, &col, &mut reg, &mut objects, &mut conns);
    build::materials(scene, opts, &col, &mut reg, &mut objects, &mut conns);
    build::textures(scene, opts, &col, &mut reg, &mut objects, &mut conns);
    if opts.export_skin {
        skin::skins(scene, opts, &col, &mut reg, &mut objects, &mut conns);
    }
    anim::animations(scene, opts, &col, &mut reg, &mut objects, &mut conns);

    let definitions = build::definitions(&objects);

    let mut objects_node = FbxNode::leaf("Objects");
    objects_node.children = objects;

    let roots = [
        build::file_id(),
        build::creation_time(),
        build::creator(),
        build::header_extension(),
        build::global_settings(),
        build::documents(&mut reg),
        build::references(),
        definitions,
        objects_node,
        build::connections(&conns),
    ];
    write_document(&roots)
}
