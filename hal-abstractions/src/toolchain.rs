//! Build and flash toolchain abstraction

/// Toolchain that turns an application directory into a running image
///
/// Implementors run the external build system. Both steps may take tens of
/// seconds; callers are expected to treat them as blocking operations.
///
/// # Example Implementation
/// ```ignore
/// struct Make { app_path: PathBuf, app_name: String }
///
/// impl Toolchain for Make {
///     type Error = ToolchainError;
///     async fn compile(&mut self) -> Result<(), Self::Error> {
///         // make <app> -j2
///     }
///     async fn flash(&mut self) -> Result<(), Self::Error> {
///         // make <app>.logatec3
///     }
/// }
/// ```
pub trait Toolchain {
    /// Error reported by a failed step
    type Error: core::fmt::Debug;

    /// Compile the experiment application
    async fn compile(&mut self) -> Result<(), Self::Error>;

    /// Flash the compiled image onto the microcontroller
    async fn flash(&mut self) -> Result<(), Self::Error>;
}
