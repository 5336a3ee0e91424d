use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blend::Blending;
use crate::error::Result;
use crate::store::{LayerProperties, TileStore};

/// Persistent layer identifier, also the layer's directory name.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    pub fn generate() -> Self {
        Self(format!("layer-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for [`Canvas::add_layer`](super::Canvas::add_layer).
///
/// `None` fields fall back to: insert on top, name `"Layer N"`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLayer {
    pub insert_before: Option<usize>,
    pub name: Option<String>,
    pub blending: Blending,
    pub opacity: f32,
}

impl Default for NewLayer {
    fn default() -> Self {
        Self {
            insert_before: None,
            name: None,
            blending: Blending::PremultipliedSourceOver,
            opacity: 1.0,
        }
    }
}

/// One canvas layer: attributes plus its tile store.
pub struct Layer {
    id: LayerId,
    properties: LayerProperties,
    store: Box<dyn TileStore>,
}

impl Layer {
    pub(crate) fn new(id: LayerId, properties: LayerProperties, store: Box<dyn TileStore>) -> Self {
        Self { id, properties, store }
    }

    pub fn id(&self) -> &LayerId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.properties.name
    }

    pub fn blending(&self) -> Blending {
        self.properties.blending
    }

    pub fn opacity(&self) -> f32 {
        self.properties.opacity
    }

    pub fn properties(&self) -> &LayerProperties {
        &self.properties
    }

    pub fn store(&self) -> &dyn TileStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn TileStore {
        self.store.as_mut()
    }

    /// Applies `edit` and persists the result if anything changed.
    pub fn update(&mut self, edit: impl FnOnce(&mut LayerProperties)) -> Result<()> {
        let mut next = self.properties.clone();
        edit(&mut next);
        if next == self.properties {
            return Ok(());
        }

        self.store.write_properties(&next)?;
        self.properties = next;
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.update(|p| p.name = name)
    }

    pub fn set_blending(&mut self, blending: Blending) -> Result<()> {
        self.update(|p| p.blending = blending)
    }

    pub fn set_opacity(&mut self, opacity: f32) -> Result<()> {
        self.update(|p| p.opacity = opacity.clamp(0.0, 1.0))
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("properties", &self.properties)
            .field("tiles", &self.store.tiles().len())
            .finish()
    }
}
