//! Preview surface registry.
//!
//! The host renders the live view from a texture it hands out by id. The
//! session creates one texture when it opens and releases it on dispose.

/// Opaque handle to the platform surface backing a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// A texture registered with the host renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceTexture {
    /// Texture id the host uses to display the preview.
    pub id: i64,
    /// Surface the camera renders preview frames into.
    pub handle: SurfaceHandle,
}

/// Host texture registry.
pub trait SurfaceRegistry: Send + Sync {
    /// Allocates a new texture and its backing surface.
    fn create_surface_texture(&self) -> SurfaceTexture;

    /// Releases a texture previously created by this registry.
    fn release(&self, id: i64);
}
