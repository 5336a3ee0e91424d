use serde::{Deserialize, Serialize};

use crate::coords::ColorRgba;

/// How weighted source and destination terms are combined.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Weight applied to the source or destination term before the [`BlendOp`].
///
/// `*Color` factors read the channel being blended; on the alpha channel they
/// read alpha.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    SrcAlpha,
    OneMinusSrcColor,
    OneMinusSrcAlpha,
    DstColor,
    DstAlpha,
    OneMinusDstColor,
    OneMinusDstAlpha,
    ConstColor,
    ConstAlpha,
    OneMinusConstColor,
    OneMinusConstAlpha,
}

impl BlendFactor {
    fn reads_const_color(self) -> bool {
        matches!(self, BlendFactor::ConstColor | BlendFactor::OneMinusConstColor)
    }

    fn reads_const_alpha(self) -> bool {
        matches!(self, BlendFactor::ConstAlpha | BlendFactor::OneMinusConstAlpha)
    }

    /// Factor value for channel `i` (0..=3, 3 is alpha).
    fn eval(self, i: usize, src: [f32; 4], dst: [f32; 4], constant: [f32; 4]) -> f32 {
        match self {
            BlendFactor::Zero => 0.0,
            BlendFactor::One => 1.0,
            BlendFactor::SrcColor => src[i],
            BlendFactor::SrcAlpha => src[3],
            BlendFactor::OneMinusSrcColor => 1.0 - src[i],
            BlendFactor::OneMinusSrcAlpha => 1.0 - src[3],
            BlendFactor::DstColor => dst[i],
            BlendFactor::DstAlpha => dst[3],
            BlendFactor::OneMinusDstColor => 1.0 - dst[i],
            BlendFactor::OneMinusDstAlpha => 1.0 - dst[3],
            BlendFactor::ConstColor => constant[i],
            BlendFactor::ConstAlpha => constant[3],
            BlendFactor::OneMinusConstColor => 1.0 - constant[i],
            BlendFactor::OneMinusConstAlpha => 1.0 - constant[3],
        }
    }

    fn to_wgpu(self, on_alpha: bool) -> wgpu::BlendFactor {
        match self {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::SrcColor if on_alpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::SrcColor => wgpu::BlendFactor::Src,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcColor if on_alpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            BlendFactor::DstColor if on_alpha => wgpu::BlendFactor::DstAlpha,
            BlendFactor::DstColor => wgpu::BlendFactor::Dst,
            BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
            BlendFactor::OneMinusDstColor if on_alpha => wgpu::BlendFactor::OneMinusDstAlpha,
            BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
            BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
            // wgpu has a single constant; const-alpha factors read a splatted constant.
            BlendFactor::ConstColor | BlendFactor::ConstAlpha => wgpu::BlendFactor::Constant,
            BlendFactor::OneMinusConstColor | BlendFactor::OneMinusConstAlpha => {
                wgpu::BlendFactor::OneMinusConstant
            }
        }
    }
}

/// One half (color or alpha) of a blend equation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlendComponent {
    pub op: BlendOp,
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendComponent {
    pub const fn new(op: BlendOp, src: BlendFactor, dst: BlendFactor) -> Self {
        Self { op, src, dst }
    }

    fn eval(self, i: usize, src: [f32; 4], dst: [f32; 4], constant: [f32; 4]) -> f32 {
        let s = src[i];
        let d = dst[i];
        match self.op {
            // Min/max ignore the factors, as fixed-function hardware does.
            BlendOp::Min => s.min(d),
            BlendOp::Max => s.max(d),
            op => {
                let ws = s * self.src.eval(i, src, dst, constant);
                let wd = d * self.dst.eval(i, src, dst, constant);
                match op {
                    BlendOp::Add => ws + wd,
                    BlendOp::Subtract => ws - wd,
                    BlendOp::ReverseSubtract => wd - ws,
                    BlendOp::Min | BlendOp::Max => unreachable!(),
                }
            }
        }
    }

    fn to_wgpu(self, on_alpha: bool) -> wgpu::BlendComponent {
        let operation = match self.op {
            BlendOp::Add => wgpu::BlendOperation::Add,
            BlendOp::Subtract => wgpu::BlendOperation::Subtract,
            BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
            BlendOp::Min => wgpu::BlendOperation::Min,
            BlendOp::Max => wgpu::BlendOperation::Max,
        };

        // wgpu validation requires One/One for min and max.
        let (src_factor, dst_factor) = match self.op {
            BlendOp::Min | BlendOp::Max => (wgpu::BlendFactor::One, wgpu::BlendFactor::One),
            _ => (self.src.to_wgpu(on_alpha), self.dst.to_wgpu(on_alpha)),
        };

        wgpu::BlendComponent { src_factor, dst_factor, operation }
    }
}

/// Fixed-function blend stage: separate color/alpha halves plus a constant color.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendEquation {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
    pub constant: ColorRgba,
}

impl BlendEquation {
    /// Source-over for premultiplied sources: `out = src + dst * (1 - src.a)`.
    pub const PREMULTIPLIED_SOURCE_OVER: Self = Self {
        color: BlendComponent::new(BlendOp::Add, BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
        alpha: BlendComponent::new(BlendOp::Add, BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
        constant: ColorRgba::transparent(),
    };

    /// Source-over for straight sources onto a premultiplied target.
    pub const STRAIGHT_SOURCE_OVER: Self = Self {
        color: BlendComponent::new(
            BlendOp::Add,
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
        ),
        alpha: BlendComponent::new(BlendOp::Add, BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
        constant: ColorRgba::transparent(),
    };

    /// Evaluates the equation on the CPU for one pixel (channels in `[0, 1]`).
    pub fn apply(&self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let constant = self.constant.to_array();
        [
            self.color.eval(0, src, dst, constant),
            self.color.eval(1, src, dst, constant),
            self.color.eval(2, src, dst, constant),
            self.alpha.eval(3, src, dst, constant),
        ]
    }

    pub fn to_wgpu(&self) -> wgpu::BlendState {
        wgpu::BlendState {
            color: self.color.to_wgpu(false),
            alpha: self.alpha.to_wgpu(true),
        }
    }

    /// Blend constant to set on the render pass.
    ///
    /// When only const-alpha factors are used the alpha is splatted into every
    /// channel. Mixing const-color and const-alpha factors on the color half
    /// is not expressible with a single constant; color wins.
    pub fn gpu_constant(&self) -> wgpu::Color {
        let color_half = [self.color.src, self.color.dst];
        let color_reads = color_half.iter().any(|f| f.reads_const_color());
        let alpha_reads = color_half.iter().any(|f| f.reads_const_alpha());

        if alpha_reads && !color_reads {
            let a = self.constant.a;
            ColorRgba::new(a, a, a, a).to_wgpu()
        } else {
            if alpha_reads {
                log::debug!("blend equation mixes constant color and alpha; using constant color");
            }
            self.constant.to_wgpu()
        }
    }

    /// Whether the pass must set a blend constant for this equation.
    pub fn uses_constant(&self) -> bool {
        [self.color.src, self.color.dst, self.alpha.src, self.alpha.dst]
            .iter()
            .any(|f| f.reads_const_color() || f.reads_const_alpha())
    }
}
