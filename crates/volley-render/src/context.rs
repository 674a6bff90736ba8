use crate::capability::RenderCapability;
use crate::features::GpuFeatures;
use std::sync::Arc;

/// Errors raised while creating a [`GraphicsContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// No adapter matched the requested options
    NoAdapter,
    /// The adapter lacks required features
    MissingFeatures(GpuFeatures),
    /// `request_device` failed
    DeviceCreation(String),
}

impl std::fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "No suitable GPU adapter found"),
            Self::MissingFeatures(missing) => {
                write!(f, "Required GPU features are not supported: {:?}", missing)
            }
            Self::DeviceCreation(msg) => write!(f, "Failed to create device: {}", msg),
        }
    }
}

impl std::error::Error for GraphicsError {}

/// A shared graphics context.
///
/// Created once and handed to the command batcher as an
/// `Arc<dyn RenderContext>`:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use volley_render::{CommandSubsystem, CommandSubsystemDescriptor, GraphicsContext};
///
/// let ctx = GraphicsContext::new_owned_sync()?;
/// let subsystem = CommandSubsystem::new(ctx.clone(), CommandSubsystemDescriptor::default());
/// # Ok::<(), volley_render::GraphicsError>(())
/// ```
pub struct GraphicsContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// The GPU features that were enabled on this context.
    enabled_features: GpuFeatures,
}

impl GraphicsContext {
    /// Creates a new graphics context with default settings.
    pub async fn new_owned() -> Result<Arc<Self>, GraphicsError> {
        Self::new_owned_with_descriptor(GraphicsContextDescriptor::default()).await
    }

    /// Creates a new graphics context synchronously.
    ///
    /// This blocks the current thread until the context is created.
    pub fn new_owned_sync() -> Result<Arc<Self>, GraphicsError> {
        pollster::block_on(Self::new_owned())
    }

    /// Creates a new graphics context with a custom descriptor.
    pub async fn new_owned_with_descriptor(
        descriptor: GraphicsContextDescriptor,
    ) -> Result<Arc<Self>, GraphicsError> {
        let context = Self::create_context_internal(descriptor).await?;
        Ok(Arc::new(context))
    }

    async fn create_context_internal(
        descriptor: GraphicsContextDescriptor,
    ) -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: descriptor.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: descriptor.power_preference,
                compatible_surface: None,
                force_fallback_adapter: descriptor.force_fallback_adapter,
            })
            .await
            .map_err(|_| GraphicsError::NoAdapter)?;

        if let Some(missing) = descriptor.required_gpu_features.check_support(&adapter).missing() {
            tracing::error!(
                "Adapter {:?} lacks required features {:?}",
                adapter.get_info().name,
                missing
            );
            return Err(GraphicsError::MissingFeatures(missing));
        }

        let available_requested =
            descriptor.requested_gpu_features & GpuFeatures::from_wgpu(adapter.features());

        let unavailable_requested = descriptor.requested_gpu_features - available_requested;
        if !unavailable_requested.is_empty() {
            tracing::warn!(
                "Some requested GPU features are not available: {:?}",
                unavailable_requested
            );
        }

        let enabled_features = descriptor.required_gpu_features | available_requested;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: enabled_features.to_wgpu(),
                required_limits: descriptor.limits.clone(),
                label: descriptor.label,
                ..Default::default()
            })
            .await
            .map_err(|e| GraphicsError::DeviceCreation(e.to_string()))?;

        tracing::info!(
            "Created graphics context on {:?} with features: {:?}",
            adapter.get_info().name,
            enabled_features
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            enabled_features,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Get device info
    pub fn info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Get the enabled GPU features.
    pub fn gpu_features(&self) -> GpuFeatures {
        self.enabled_features
    }

    /// Check if a specific GPU feature is enabled.
    pub fn has_feature(&self, feature: GpuFeatures) -> bool {
        self.enabled_features.contains(feature)
    }
}

/// Descriptor for configuring graphics context creation.
pub struct GraphicsContextDescriptor {
    /// GPU backends to use
    pub backends: wgpu::Backends,
    /// Power preference for adapter selection
    pub power_preference: wgpu::PowerPreference,
    /// Whether to force fallback adapter
    pub force_fallback_adapter: bool,
    /// Required GPU features (creation fails if not available).
    pub required_gpu_features: GpuFeatures,
    /// Requested GPU features (best-effort, logs warning if unavailable).
    pub requested_gpu_features: GpuFeatures,
    /// Required device limits
    pub limits: wgpu::Limits,
    /// Optional label for debugging
    pub label: Option<&'static str>,
}

impl Default for GraphicsContextDescriptor {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_gpu_features: GpuFeatures::empty(),
            requested_gpu_features: GpuFeatures::empty(),
            limits: wgpu::Limits::default(),
            label: None,
        }
    }
}

impl GraphicsContextDescriptor {
    /// Create a new descriptor with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the requirements of a capability as hard requirements.
    pub fn require_capability<C: RenderCapability>(mut self) -> Self {
        let requirements = C::requirements();
        tracing::debug!("Requiring capability {}", C::name());
        self.required_gpu_features |=
            requirements.required_features | requirements.requested_features;
        self
    }

    /// Add the requirements of a capability, keeping its optional features optional.
    pub fn request_capability<C: RenderCapability>(mut self) -> Self {
        let requirements = C::requirements();
        tracing::debug!("Requesting capability {}", C::name());
        self.required_gpu_features |= requirements.required_features;
        self.requested_gpu_features |= requirements.requested_features;
        self
    }

    /// Add additional required features.
    pub fn with_required_features(mut self, features: GpuFeatures) -> Self {
        self.required_gpu_features |= features;
        self
    }

    /// Add additional requested features.
    pub fn with_requested_features(mut self, features: GpuFeatures) -> Self {
        self.requested_gpu_features |= features;
        self
    }

    /// Set the power preference.
    pub fn power_preference(mut self, preference: wgpu::PowerPreference) -> Self {
        self.power_preference = preference;
        self
    }

    /// Set the backends to use.
    pub fn backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }

    /// Set the device limits.
    pub fn limits(mut self, limits: wgpu::Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the debug label.
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }
}
