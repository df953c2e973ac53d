//! Hardware reset line abstraction

/// Output line wired to the microcontroller's reset pin
pub trait ResetLine {
    /// Error reported when the line cannot be driven
    type Error: core::fmt::Debug;

    /// Pulse the reset line (drive low, then release high)
    async fn reset(&mut self) -> Result<(), Self::Error>;
}
