//! Layer builder: attribute interning and zigzag command encoding per the
//! MVT 2.1 spec.

use std::collections::HashMap;

use crate::vector_tile as vt;

pub const TILE_EXTENT: u32 = 4096;

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;

fn command(id: u32, count: u32) -> u32 {
    (id & 0x7) | (count << 3)
}

pub fn zigzag(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

pub fn unzigzag(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Builds one MVT layer, interning keys and string values as features are
/// added.
pub struct LayerBuilder {
    name: String,
    keys: Vec<String>,
    values: Vec<vt::Value>,
    key_index: HashMap<String, u32>,
    value_index: HashMap<String, u32>,
    features: Vec<vt::Feature>,
}

impl LayerBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            keys: Vec::new(),
            values: Vec::new(),
            key_index: HashMap::new(),
            value_index: HashMap::new(),
            features: Vec::new(),
        }
    }

    fn key_id(&mut self, key: &str) -> u32 {
        if let Some(&id) = self.key_index.get(key) {
            return id;
        }
        let id = self.keys.len() as u32;
        self.keys.push(key.to_string());
        self.key_index.insert(key.to_string(), id);
        id
    }

    fn value_id(&mut self, value: &str) -> u32 {
        if let Some(&id) = self.value_index.get(value) {
            return id;
        }
        let id = self.values.len() as u32;
        self.values.push(vt::Value {
            string_value: Some(value.to_string()),
            ..Default::default()
        });
        self.value_index.insert(value.to_string(), id);
        id
    }

    fn attr_tags<'a>(&mut self, attrs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<u32> {
        let mut tags = Vec::new();
        for (k, v) in attrs {
            tags.push(self.key_id(k));
            tags.push(self.value_id(v));
        }
        tags
    }

    /// Point feature at tile-local coordinates.
    pub fn add_point<'a>(
        &mut self,
        at: (i32, i32),
        attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        let tags = self.attr_tags(attrs);
        let geometry = vec![command(CMD_MOVE_TO, 1), zigzag(at.0), zigzag(at.1)];
        self.features.push(vt::Feature {
            id: None,
            tags,
            r#type: Some(vt::GeomType::Point as i32),
            geometry,
        });
    }

    /// Linestring feature through tile-local coordinates. Requires at
    /// least two points; consecutive duplicate points are collapsed.
    pub fn add_line<'a>(
        &mut self,
        points: &[(i32, i32)],
        attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        let mut pts: Vec<(i32, i32)> = Vec::with_capacity(points.len());
        for &p in points {
            if pts.last() != Some(&p) {
                pts.push(p);
            }
        }
        if pts.len() < 2 {
            return;
        }

        let tags = self.attr_tags(attrs);
        let mut geometry = Vec::with_capacity(2 + pts.len() * 2);
        geometry.push(command(CMD_MOVE_TO, 1));
        geometry.push(zigzag(pts[0].0));
        geometry.push(zigzag(pts[0].1));
        geometry.push(command(CMD_LINE_TO, (pts.len() - 1) as u32));
        let (mut cx, mut cy) = pts[0];
        for &(x, y) in &pts[1..] {
            geometry.push(zigzag(x - cx));
            geometry.push(zigzag(y - cy));
            (cx, cy) = (x, y);
        }

        self.features.push(vt::Feature {
            id: None,
            tags,
            r#type: Some(vt::GeomType::Linestring as i32),
            geometry,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn build(self) -> vt::Layer {
        vt::Layer {
            version: 2,
            name: self.name,
            features: self.features,
            keys: self.keys,
            values: self.values,
            extent: Some(TILE_EXTENT),
        }
    }
}
