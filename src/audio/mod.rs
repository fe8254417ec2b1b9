#[cfg(feature = "cpal-audio")]
pub mod cpal_output;
pub mod output;
pub mod stretch;
pub mod wav;
