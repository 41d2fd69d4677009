//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`SslrError`] covers all failure modes including:
//! - Invalid effect configuration
//! - Degenerate working resolutions
//! - Render-target bookkeeping errors (unknown handles, invalid sizes)
//! - Shading-program failures (template rendering, pass execution)
//! - GPU initialization failures
//!
//! # Usage
//!
//! All fallible APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, SslrError>`.
//!
//! ```rust,ignore
//! use sslr::errors::{Result, SslrError};
//!
//! fn configure() -> Result<()> {
//!     let settings = sslr::SslrSettings::from_json_str("{}")?;
//!     settings.validate()
//! }
//! ```

use thiserror::Error;

use crate::program::PassId;

/// The main error type for the SSLR pipeline.
#[derive(Error, Debug)]
pub enum SslrError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A configuration value is outside its documented range.
    #[error("Invalid settings: {field} = {value} ({reason})")]
    InvalidSettings {
        /// Name of the offending field
        field: &'static str,
        /// The rejected value, formatted for display
        value: String,
        /// Expected range or constraint
        reason: &'static str,
    },

    /// Settings could not be parsed from JSON.
    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] serde_json::Error),

    /// The working resolution collapsed to zero in at least one axis.
    #[error(
        "Degenerate working resolution {width}x{height} \
         (camera {camera_width}x{camera_height}, scale {scale})"
    )]
    DegenerateResolution {
        width: u32,
        height: u32,
        camera_width: u32,
        camera_height: u32,
        scale: f32,
    },

    // ========================================================================
    // Render Target Errors
    // ========================================================================
    /// A texture handle does not refer to a live texture on the device.
    #[error("Unknown texture handle: {0}")]
    UnknownTexture(String),

    /// A texture was requested with a zero dimension.
    #[error("Invalid texture size {width}x{height} for '{label}'")]
    InvalidTextureSize {
        label: &'static str,
        width: u32,
        height: u32,
    },

    /// The backend cannot create or bind a texture of this format here.
    #[error("Unsupported texture format {0:?}")]
    UnsupportedFormat(wgpu::TextureFormat),

    // ========================================================================
    // Shading Program Errors
    // ========================================================================
    /// A pass of the shading program failed to execute.
    #[error("Pass {pass:?} failed: {reason}")]
    PassFailed {
        /// The pass that failed
        pass: PassId,
        /// Backend-specific description
        reason: String,
    },

    /// A frame was run with no shading program bound.
    #[error("No shading program bound")]
    ProgramNotBound,

    /// A WGSL template failed to render.
    #[error("Shader template error: {0}")]
    ShaderTemplate(#[from] minijinja::Error),

    // ========================================================================
    // GPU Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),
}

impl SslrError {
    /// Shorthand for building a [`SslrError::PassFailed`].
    pub fn pass_failed(pass: PassId, reason: impl Into<String>) -> Self {
        Self::PassFailed {
            pass,
            reason: reason.into(),
        }
    }
}

/// Alias for `Result<T, SslrError>`.
pub type Result<T> = std::result::Result<T, SslrError>;
