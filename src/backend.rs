//! Backend selected by cargo feature: `tch-gpu` takes precedence over `wgpu`, which takes
//! precedence over the default `ndarray`.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

pub type Element = f32;

#[cfg(all(feature = "ndarray", not(feature = "wgpu"), not(feature = "tch-gpu")))]
pub type MainBackend = burn::backend::NdArray<Element>;
#[cfg(all(feature = "wgpu", not(feature = "tch-gpu")))]
pub type MainBackend = burn::backend::wgpu::Wgpu<Element, i32>;
#[cfg(feature = "tch-gpu")]
pub type MainBackend = burn::backend::libtorch::LibTorch<Element>;

/// Device a run is placed on.
pub trait MainDevice: Backend {
    fn main_device() -> <Self as Backend>::Device {
        Default::default()
    }
}

#[cfg(not(feature = "tch-gpu"))]
impl MainDevice for MainBackend {}
#[cfg(all(feature = "tch-gpu", not(target_os = "macos")))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Cuda(0)
    }
}
#[cfg(all(feature = "tch-gpu", target_os = "macos"))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Mps
    }
}

pub type MainAutoBackend = burn::backend::Autodiff<MainBackend>;
impl MainDevice for MainAutoBackend {
    fn main_device() -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device()
    }
}
