use crate::error::{Result, VoxError};
use crate::tts::device::ComputeDevice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Trait for text-to-speech synthesis.
///
/// This trait allows swapping implementations (external engine vs mock).
/// All methods are blocking; callers run them off the async threads.
pub trait Synthesizer: Send + Sync {
    /// Load the model on `device`.
    ///
    /// `progress` receives load progress as a percentage in `0.0..=100.0`.
    fn load(&self, device: ComputeDevice, progress: &dyn Fn(f32)) -> Result<()>;

    /// Synthesize one chunk of text.
    ///
    /// # Arguments
    /// * `text` - A single chunk, already bounded in size
    /// * `voice` - Voice identifier from the catalog
    ///
    /// # Returns
    /// Mono f32 samples at 24kHz
    fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<f32>>;

    /// Whether the accelerated backend can be used on this machine.
    fn supports_acceleration(&self) -> Result<bool>;

    /// Get the name of the backend
    fn name(&self) -> &str;
}

/// Implement Synthesizer for Arc<T> to allow sharing across tasks.
impl<T: Synthesizer> Synthesizer for Arc<T> {
    fn load(&self, device: ComputeDevice, progress: &dyn Fn(f32)) -> Result<()> {
        (**self).load(device, progress)
    }

    fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<f32>> {
        (**self).synthesize(text, voice)
    }

    fn supports_acceleration(&self) -> Result<bool> {
        (**self).supports_acceleration()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock synthesizer for testing and dry runs.
///
/// Produces a constant tone whose length is proportional to the text.
/// Clones share their counters.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    samples_per_char: usize,
    acceleration: bool,
    load_delay: Duration,
    synthesis_delay: Duration,
    failing_text: Option<String>,
    remaining_load_failures: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
    syntheses: Arc<AtomicUsize>,
    device: Arc<Mutex<Option<ComputeDevice>>>,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSynthesizer {
    /// Amplitude of the generated tone.
    pub const LEVEL: f32 = 0.25;

    /// Create a new mock synthesizer with default settings
    pub fn new() -> Self {
        Self {
            samples_per_char: 240,
            acceleration: true,
            load_delay: Duration::ZERO,
            synthesis_delay: Duration::ZERO,
            failing_text: None,
            remaining_load_failures: Arc::new(AtomicUsize::new(0)),
            loads: Arc::new(AtomicUsize::new(0)),
            syntheses: Arc::new(AtomicUsize::new(0)),
            device: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_samples_per_char(mut self, samples: usize) -> Self {
        self.samples_per_char = samples;
        self
    }

    /// Configure whether acceleration is reported as available
    pub fn with_acceleration(mut self, available: bool) -> Self {
        self.acceleration = available;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_synthesis_delay(mut self, delay: Duration) -> Self {
        self.synthesis_delay = delay;
        self
    }

    /// Fail the next `count` loads
    pub fn with_load_failures(self, count: usize) -> Self {
        self.remaining_load_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail synthesis of any chunk containing `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing_text = Some(needle.to_string());
        self
    }

    /// Number of load attempts so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of synthesis calls so far, failed ones included
    pub fn synthesis_count(&self) -> usize {
        self.syntheses.load(Ordering::SeqCst)
    }

    /// Device of the last successful load
    pub fn loaded_device(&self) -> Option<ComputeDevice> {
        self.device.lock().ok().and_then(|d| *d)
    }
}

impl Synthesizer for MockSynthesizer {
    fn load(&self, device: ComputeDevice, progress: &dyn Fn(f32)) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        progress(0.0);
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay / 2);
            progress(50.0);
            std::thread::sleep(self.load_delay / 2);
        }

        let failed = self
            .remaining_load_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(VoxError::ModelLoad {
                message: "mock load failure".to_string(),
            });
        }

        progress(100.0);
        if let Ok(mut slot) = self.device.lock() {
            *slot = Some(device);
        }
        Ok(())
    }

    fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<f32>> {
        self.syntheses.fetch_add(1, Ordering::SeqCst);
        if self.loaded_device().is_none() {
            return Err(VoxError::Synthesis {
                message: "model not loaded".to_string(),
            });
        }
        if !self.synthesis_delay.is_zero() {
            std::thread::sleep(self.synthesis_delay);
        }
        if let Some(needle) = &self.failing_text
            && text.contains(needle.as_str())
        {
            return Err(VoxError::Synthesis {
                message: format!("mock synthesis failure for '{}'", text),
            });
        }
        Ok(vec![Self::LEVEL; text.chars().count() * self.samples_per_char])
    }

    fn supports_acceleration(&self) -> Result<bool> {
        Ok(self.acceleration)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
