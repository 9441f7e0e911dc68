//! Device abstraction and test utilities for the Ember rendering core.
//!
//! The main components are:
//!
//! - [`GraphicsDevice`] - Trait abstracting every GPU operation the core
//!   performs (resource creation, pass recording, draws, present)
//! - `MockDevice` - Call-recording implementation for testing (requires the
//!   `mock` feature)
//! - GPU handle wrappers (`GpuBuffer`, `GpuTexture`, ...) - Can be real or
//!   mock, and carry a process-unique id
//!
//! # Design
//!
//! All handle types are owned and cheap to clone (wgpu resources are
//! reference counted internally), so no lifetime parameters propagate
//! through the codebase. The trait takes `&self` everywhere; implementations
//! use interior mutability for the frame recording state. This keeps the
//! trait object-safe: the rendering core works against `&dyn GraphicsDevice`
//! and never touches the driver directly.

pub mod device;
pub mod gpu_types;
#[cfg(feature = "mock")]
pub mod mock_device;

pub use device::*;
pub use gpu_types::*;
#[cfg(feature = "mock")]
pub use mock_device::*;
