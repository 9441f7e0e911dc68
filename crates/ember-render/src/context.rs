//! The wgpu instance/adapter/device context and the presentation surface.

use ember_core::profiling::profile_function;

/// A globally shared graphics context.
pub struct GraphicsContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GraphicsContext {
    /// Creates a new graphics context synchronously.
    ///
    /// See [`GraphicsContext::new`] for the asynchronous version.
    pub fn new_sync() -> &'static Self {
        pollster::block_on(Self::new())
    }

    /// Creates a new graphics context asynchronously.
    ///
    /// This returns a static reference to simplify the public API and
    /// lifecycle; the context lives for the rest of the process.
    pub async fn new() -> &'static Self {
        profile_function!();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to find a suitable GPU adapter");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
                ..Default::default()
            })
            .await
            .expect("Failed to create device");

        tracing::info!(adapter = %adapter.get_info().name, "graphics context created");

        Box::leak(Box::new(Self {
            instance,
            adapter,
            device,
            queue,
        }))
    }
}

/// The presentation surface and its configuration.
///
/// The host owns the window and event loop; it hands over anything that
/// converts into a [`wgpu::SurfaceTarget`].
pub struct SurfaceContext {
    pub(crate) surface: wgpu::Surface<'static>,
    pub(crate) config: wgpu::SurfaceConfiguration,
}

impl SurfaceContext {
    /// Create and configure a surface for the given target.
    pub fn new(
        context: &'static GraphicsContext,
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Self {
        let surface = context
            .instance
            .create_surface(target)
            .expect("Failed to create surface");

        let config = surface
            .get_default_config(&context.adapter, width.max(1), height.max(1))
            .expect("Failed to get default surface configuration");

        surface.configure(&context.device, &config);

        Self { surface, config }
    }

    /// The configured surface format.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// The configured surface size.
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}
