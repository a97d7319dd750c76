use crate::{catalog::CatalogItem, error::CharaError, race::Race};
use async_trait::async_trait;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Up to four bone influences per vertex, indices into [`Model::bones`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Vec3,
    #[serde(default)]
    pub bones: [u8; 4],
    #[serde(default)]
    pub weights: [f32; 4],
}

impl Vertex {
    pub fn influences(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.bones
            .iter()
            .zip(self.weights.iter())
            .filter(|(_, weight)| **weight > 0.0)
            .map(|(bone, weight)| (*bone as usize, *weight))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Index into [`Model::materials`].
    pub material: usize,
    pub vertices: Vec<Vertex>,
    #[serde(default)]
    pub indices: Vec<u16>,
}

/// Parsed model as handed over by the archive reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub bones: Vec<Box<str>>,
    /// Raw material references, in the order the model lists them.
    pub materials: Vec<Box<str>>,
    pub meshes: Vec<Mesh>,
}

impl Model {
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|mesh| mesh.vertices.len()).sum()
    }
}

/// Loads the model of an item as authored for one race.
#[async_trait]
pub trait ModelSource: Sync {
    /// `Ok(None)` when the item has no model data for `race`.
    async fn load_model(&self, item: &CatalogItem, race: Race)
        -> Result<Option<Model>, CharaError>;
}
