//! Shared test fixture: a small articulated scene the runtime binds against.
//!
//! The rig is a named node hierarchy with a skeleton, two materials (one of
//! them multi-slot), a texture reachable through `.map`, morph target
//! influences with named targets, a boolean flag and a string-valued tag.
//! Dirty-flag bumps are counted so tests can assert that writes version the
//! host.

#![allow(dead_code)]

use keymix::{AnimationGraph, PropertyShape, Versioning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RigObj {
    Node(usize),
    Material(usize),
    Texture(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigProp {
    Position,
    Rotation,
    Scale,
    Visible,
    MorphWeights,
    Tag,
    Color,
    Opacity,
    Wireframe,
    Offset,
}

#[derive(Debug, Default)]
pub struct RigNode {
    pub name: String,
    pub children: Vec<usize>,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub visible: bool,
    pub morph_weights: Vec<f32>,
    pub morph_names: Vec<String>,
    pub tag: String,
    pub material: Option<usize>,
    pub material_slots: Vec<usize>,
    pub world_matrix_bumps: u32,
}

#[derive(Debug, Default)]
pub struct RigMaterial {
    pub name: String,
    pub color: [f32; 3],
    pub opacity: f32,
    pub wireframe: bool,
    pub map: Option<usize>,
    pub needs_update_bumps: u32,
}

#[derive(Debug, Default)]
pub struct RigTexture {
    pub offset: [f32; 2],
    pub needs_update_bumps: u32,
}

#[derive(Debug)]
pub struct Rig {
    pub nodes: Vec<RigNode>,
    pub materials: Vec<RigMaterial>,
    pub textures: Vec<RigTexture>,
    /// Skeleton bones, referenced by node index.
    pub bones: Vec<usize>,
}

impl Rig {
    /// The standard scene:
    ///
    /// ```text
    /// Root
    /// ├── Bip01
    /// │   ├── Bip01_Head   (material HeadMat, map → texture 0)
    /// │   └── LeftArm      (also bone 0)
    /// └── Mesh             (materials [BodyMat, HeadMat], morphs smile/frown)
    /// ```
    pub fn new() -> Self {
        let node = |name: &str, children: Vec<usize>| RigNode {
            name: name.to_string(),
            children,
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0, 1.0, 1.0],
            visible: true,
            ..RigNode::default()
        };

        let mut nodes = vec![
            node("Root", vec![1, 4]),
            node("Bip01", vec![2, 3]),
            node("Bip01_Head", vec![]),
            node("LeftArm", vec![]),
            node("Mesh", vec![]),
        ];
        nodes[0].tag = "idle".to_string();
        nodes[2].material = Some(0);
        nodes[4].material = Some(1);
        nodes[4].material_slots = vec![1, 0];
        nodes[4].morph_names = vec!["smile".to_string(), "frown".to_string()];
        nodes[4].morph_weights = vec![0.0, 0.0];

        let materials = vec![
            RigMaterial {
                name: "HeadMat".to_string(),
                color: [1.0, 1.0, 1.0],
                opacity: 1.0,
                map: Some(0),
                ..RigMaterial::default()
            },
            RigMaterial {
                name: "BodyMat".to_string(),
                color: [0.5, 0.5, 0.5],
                opacity: 1.0,
                ..RigMaterial::default()
            },
        ];

        Self {
            nodes,
            materials,
            textures: vec![RigTexture::default()],
            bones: vec![3],
        }
    }

    pub fn root(&self) -> RigObj {
        RigObj::Node(0)
    }

    pub fn node_named(&self, name: &str) -> RigObj {
        let index = self
            .nodes
            .iter()
            .position(|n| n.name == name)
            .unwrap_or_else(|| panic!("no node named '{name}'"));
        RigObj::Node(index)
    }

    pub fn node(&self, name: &str) -> &RigNode {
        let RigObj::Node(index) = self.node_named(name) else {
            unreachable!()
        };
        &self.nodes[index]
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_span(src: &[f32], out: &mut [f32]) {
    for (dst, &val) in out.iter_mut().zip(src) {
        *dst = val;
    }
}

impl AnimationGraph for Rig {
    type Obj = RigObj;
    type Prop = RigProp;

    fn name_of(&self, obj: RigObj) -> Option<&str> {
        match obj {
            RigObj::Node(i) => Some(&self.nodes[i].name),
            RigObj::Material(i) => Some(&self.materials[i].name),
            RigObj::Texture(_) => None,
        }
    }

    fn children_of(&self, obj: RigObj, out: &mut Vec<RigObj>) {
        if let RigObj::Node(i) = obj {
            out.extend(self.nodes[i].children.iter().map(|&c| RigObj::Node(c)));
        }
    }

    fn find_bone(&self, _root: RigObj, name: &str) -> Option<RigObj> {
        self.bones
            .iter()
            .copied()
            .find(|&b| self.nodes[b].name == name)
            .map(RigObj::Node)
    }

    fn material_of(&self, obj: RigObj) -> Option<RigObj> {
        if let RigObj::Node(i) = obj {
            self.nodes[i].material.map(RigObj::Material)
        } else {
            None
        }
    }

    fn material_in_slot(&self, obj: RigObj, index: usize) -> Option<RigObj> {
        if let RigObj::Node(i) = obj {
            self.nodes[i]
                .material_slots
                .get(index)
                .copied()
                .map(RigObj::Material)
        } else {
            None
        }
    }

    fn bone_at(&self, _obj: RigObj, index: usize) -> Option<RigObj> {
        self.bones.get(index).copied().map(RigObj::Node)
    }

    fn bone_index(&self, _obj: RigObj, name: &str) -> Option<usize> {
        self.bones.iter().position(|&b| self.nodes[b].name == name)
    }

    fn texture_map_of(&self, obj: RigObj) -> Option<RigObj> {
        let material = match obj {
            RigObj::Node(i) => self.nodes[i].material?,
            RigObj::Material(i) => i,
            RigObj::Texture(_) => return None,
        };
        self.materials[material].map.map(RigObj::Texture)
    }

    fn named_element_index(&self, obj: RigObj, property: &str, name: &str) -> Option<usize> {
        if property != "morphTargetInfluences" {
            return None;
        }
        if let RigObj::Node(i) = obj {
            self.nodes[i].morph_names.iter().position(|n| n == name)
        } else {
            None
        }
    }

    fn resolve_property(&self, obj: RigObj, name: &str) -> Option<(RigProp, PropertyShape)> {
        match obj {
            RigObj::Node(i) => match name {
                "position" => Some((RigProp::Position, PropertyShape::Convertible { size: 3 })),
                "quaternion" => Some((RigProp::Rotation, PropertyShape::Convertible { size: 4 })),
                "scale" => Some((RigProp::Scale, PropertyShape::Convertible { size: 3 })),
                "visible" => Some((RigProp::Visible, PropertyShape::Scalar)),
                "morphTargetInfluences" => Some((
                    RigProp::MorphWeights,
                    PropertyShape::Array {
                        len: self.nodes[i].morph_weights.len(),
                    },
                )),
                "tag" => Some((RigProp::Tag, PropertyShape::Text)),
                _ => None,
            },
            RigObj::Material(_) => match name {
                "color" => Some((RigProp::Color, PropertyShape::Convertible { size: 3 })),
                "opacity" => Some((RigProp::Opacity, PropertyShape::Scalar)),
                "wireframe" => Some((RigProp::Wireframe, PropertyShape::Scalar)),
                _ => None,
            },
            RigObj::Texture(_) => match name {
                "offset" => Some((RigProp::Offset, PropertyShape::Convertible { size: 2 })),
                _ => None,
            },
        }
    }

    fn read(&self, obj: RigObj, prop: RigProp, out: &mut [f32]) {
        match (obj, prop) {
            (RigObj::Node(i), RigProp::Position) => copy_span(&self.nodes[i].position, out),
            (RigObj::Node(i), RigProp::Rotation) => copy_span(&self.nodes[i].rotation, out),
            (RigObj::Node(i), RigProp::Scale) => copy_span(&self.nodes[i].scale, out),
            (RigObj::Node(i), RigProp::Visible) => {
                if let Some(slot) = out.first_mut() {
                    *slot = f32::from(self.nodes[i].visible);
                }
            }
            (RigObj::Node(i), RigProp::MorphWeights) => {
                copy_span(&self.nodes[i].morph_weights, out);
            }
            (RigObj::Material(i), RigProp::Color) => copy_span(&self.materials[i].color, out),
            (RigObj::Material(i), RigProp::Opacity) => {
                if let Some(slot) = out.first_mut() {
                    *slot = self.materials[i].opacity;
                }
            }
            (RigObj::Material(i), RigProp::Wireframe) => {
                if let Some(slot) = out.first_mut() {
                    *slot = f32::from(self.materials[i].wireframe);
                }
            }
            (RigObj::Texture(i), RigProp::Offset) => copy_span(&self.textures[i].offset, out),
            _ => {}
        }
    }

    fn write(&mut self, obj: RigObj, prop: RigProp, values: &[f32]) {
        match (obj, prop) {
            (RigObj::Node(i), RigProp::Position) => copy_span(values, &mut self.nodes[i].position),
            (RigObj::Node(i), RigProp::Rotation) => copy_span(values, &mut self.nodes[i].rotation),
            (RigObj::Node(i), RigProp::Scale) => copy_span(values, &mut self.nodes[i].scale),
            (RigObj::Node(i), RigProp::Visible) => {
                if let Some(&flag) = values.first() {
                    self.nodes[i].visible = flag != 0.0;
                }
            }
            (RigObj::Node(i), RigProp::MorphWeights) => {
                copy_span(values, &mut self.nodes[i].morph_weights);
            }
            (RigObj::Material(i), RigProp::Color) => copy_span(values, &mut self.materials[i].color),
            (RigObj::Material(i), RigProp::Opacity) => {
                if let Some(&opacity) = values.first() {
                    self.materials[i].opacity = opacity;
                }
            }
            (RigObj::Material(i), RigProp::Wireframe) => {
                if let Some(&flag) = values.first() {
                    self.materials[i].wireframe = flag != 0.0;
                }
            }
            (RigObj::Texture(i), RigProp::Offset) => {
                copy_span(values, &mut self.textures[i].offset);
            }
            _ => {}
        }
    }

    fn read_element(&self, obj: RigObj, prop: RigProp, index: usize) -> f32 {
        match (obj, prop) {
            (RigObj::Node(i), RigProp::MorphWeights) => {
                self.nodes[i].morph_weights.get(index).copied().unwrap_or(0.0)
            }
            (RigObj::Material(i), RigProp::Color) => {
                self.materials[i].color.get(index).copied().unwrap_or(0.0)
            }
            _ => 0.0,
        }
    }

    fn write_element(&mut self, obj: RigObj, prop: RigProp, index: usize, value: f32) {
        match (obj, prop) {
            (RigObj::Node(i), RigProp::MorphWeights) => {
                if let Some(slot) = self.nodes[i].morph_weights.get_mut(index) {
                    *slot = value;
                }
            }
            (RigObj::Material(i), RigProp::Color) => {
                if let Some(slot) = self.materials[i].color.get_mut(index) {
                    *slot = value;
                }
            }
            _ => {}
        }
    }

    fn read_text(&self, obj: RigObj, prop: RigProp, out: &mut String) {
        out.clear();
        if let (RigObj::Node(i), RigProp::Tag) = (obj, prop) {
            out.push_str(&self.nodes[i].tag);
        }
    }

    fn write_text(&mut self, obj: RigObj, prop: RigProp, value: &str) {
        if let (RigObj::Node(i), RigProp::Tag) = (obj, prop) {
            self.nodes[i].tag.clear();
            self.nodes[i].tag.push_str(value);
        }
    }

    fn versioning(&self, obj: RigObj) -> Versioning {
        match obj {
            RigObj::Node(_) => Versioning::WorldMatrix,
            RigObj::Material(_) | RigObj::Texture(_) => Versioning::NeedsUpdate,
        }
    }

    fn mark_needs_update(&mut self, obj: RigObj) {
        match obj {
            RigObj::Material(i) => self.materials[i].needs_update_bumps += 1,
            RigObj::Texture(i) => self.textures[i].needs_update_bumps += 1,
            RigObj::Node(_) => {}
        }
    }

    fn mark_world_matrix_dirty(&mut self, obj: RigObj) {
        if let RigObj::Node(i) = obj {
            self.nodes[i].world_matrix_bumps += 1;
        }
    }
}
