//! GPU device + surface management.
//!
//! [`Gpu`] owns the device, queue and the window surface. [`HeadlessGpu`] is
//! the same device setup without a surface.

mod frame;
mod gpu;
mod init;
mod surface;

pub use surface::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use gpu::{Gpu, HeadlessGpu};
pub use init::GpuInit;
