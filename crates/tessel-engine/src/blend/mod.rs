//! Blending model shared by layer compositing and stroke rasterization.
//!
//! [`BlendEquation`] is the general fixed-function stage. [`Blending`] is the
//! small persisted enum a layer (or a brush call) selects from.

mod equation;

pub use equation::{BlendComponent, BlendEquation, BlendFactor, BlendOp};

use serde::{Deserialize, Serialize};

/// Named blending preset, stored in layer metadata.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Blending {
    /// Premultiplied source over destination. Used for tiles over the background.
    #[default]
    PremultipliedSourceOver,
    /// Straight-alpha source over a premultiplied destination. Used for brush output.
    StraightSourceOver,
}

impl Blending {
    pub fn equation(self) -> BlendEquation {
        match self {
            Blending::PremultipliedSourceOver => BlendEquation::PREMULTIPLIED_SOURCE_OVER,
            Blending::StraightSourceOver => BlendEquation::STRAIGHT_SOURCE_OVER,
        }
    }

    pub fn to_wgpu(self) -> wgpu::BlendState {
        self.equation().to_wgpu()
    }
}
