//! Backend abstraction - Multi-backend support
//!
//! Supports both CUDA (GPU) and NdArray (CPU) backends, selected at compile time.

use std::panic::AssertUnwindSafe;

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use tracing::{info, warn};

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray")))]
compile_error!("At least one backend (cuda or ndarray) must be enabled!");

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as Backend>::Device {
    <DefaultBackend as Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}

/// Prepare the compute device before any tensor is allocated.
///
/// Burn's backends grow device memory on demand, so there is nothing to
/// toggle; this probes the device with a tiny allocation and reports what was
/// found. A failing probe is logged and training continues regardless.
pub fn configure_device<B: Backend>(device: &B::Device) {
    info!("Backend: {}", backend_name());

    let probe = std::panic::catch_unwind(AssertUnwindSafe(|| {
        burn::tensor::Tensor::<B, 1>::zeros([1], device).into_data()
    }));

    match probe {
        Ok(_) => info!("Device ready: {:?}", device),
        Err(_) => warn!("Device {:?} failed to initialise, continuing anyway", device),
    }
}
