//! Semantic document model.
//!
//! The extractor produces an immutable [`Diagram`] snapshot of the source
//! package; analysis passes (classification, layout) read it, while the
//! actual mutations are applied to the package XML. Serde layouts match the
//! intermediate JSON artifacts (`extract`, `extract-masters`, `map`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geom::{Point, Size, point, size};

/// Shape/connector identifier to target master display name.
pub type Mapping = IndexMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagram {
    pub filename: String,
    pub pages: Vec<Page>,
}

impl Diagram {
    /// Shapes of every page, flattened.
    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.pages.iter().flat_map(|p| p.shapes.iter())
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.pages.iter().flat_map(|p| p.connectors.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub name: String,
    pub width: f64,
    pub height: f64,
    pub shapes: Vec<Shape>,
    pub connectors: Vec<Connector>,
}

impl Page {
    pub fn shape(&self, id: &str) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub width: f64,
    pub height: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shape {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub master_name: Option<String>,
    pub master_id: Option<String>,
    pub position: Position,
    pub size: Extent,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Classification added by the layout pass; not part of the artifact.
    #[serde(skip)]
    pub tags: ShapeTags,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeTags {
    pub is_header: bool,
    pub is_container: bool,
    pub is_flow_node: bool,
    pub is_decision: bool,
}

impl Shape {
    pub fn center(&self) -> Point {
        point(self.position.x, self.position.y)
    }

    pub fn extent(&self) -> Size {
        size(self.size.width, self.size.height)
    }

    pub fn left(&self) -> f64 {
        self.position.x - self.size.width / 2.0
    }

    pub fn right(&self) -> f64 {
        self.position.x + self.size.width / 2.0
    }

    pub fn top(&self) -> f64 {
        self.position.y + self.size.height / 2.0
    }

    pub fn bottom(&self) -> f64 {
        self.position.y - self.size.height / 2.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub master_name: Option<String>,
    pub from_shape: Option<String>,
    pub to_shape: Option<String>,
    #[serde(default)]
    pub begin: Position,
    #[serde(default)]
    pub end: Position,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Connector {
    pub fn midpoint(&self) -> Point {
        point(
            (self.begin.x + self.end.x) / 2.0,
            (self.begin.y + self.end.y) / 2.0,
        )
    }
}

/// A master (style template) as listed in a package's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_master_dim")]
    pub width: f64,
    #[serde(default = "default_master_dim")]
    pub height: f64,
}

fn default_master_dim() -> f64 {
    1.0
}

/// Wrapper matching the `extract-masters` artifact: `{"masters": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterCatalog {
    pub masters: Vec<MasterInfo>,
}
