//! Sample Consumers

use ring_buffer::SampleBuffer;
use std::sync::Arc;
use telemetry_protocol::TelemetrySample;

/// Receives every valid sample, synchronously on the receive thread.
///
/// Implementations should return quickly; a slow consumer delays the next
/// datagram.
pub trait SampleConsumer: Send + Sync {
    fn on_sample(&self, sample: &TelemetrySample);
}

impl SampleConsumer for SampleBuffer {
    fn on_sample(&self, sample: &TelemetrySample) {
        self.append(sample);
    }
}

impl<T: SampleConsumer + ?Sized> SampleConsumer for Arc<T> {
    fn on_sample(&self, sample: &TelemetrySample) {
        (**self).on_sample(sample)
    }
}

impl<T: SampleConsumer + ?Sized> SampleConsumer for Box<T> {
    fn on_sample(&self, sample: &TelemetrySample) {
        (**self).on_sample(sample)
    }
}

/// Consumer backed by a closure, see [`from_fn`]
pub struct FnConsumer<F>(F);

impl<F> SampleConsumer for FnConsumer<F>
where
    F: Fn(&TelemetrySample) + Send + Sync,
{
    fn on_sample(&self, sample: &TelemetrySample) {
        (self.0)(sample)
    }
}

/// Wrap a closure as a consumer
pub fn from_fn<F>(f: F) -> FnConsumer<F>
where
    F: Fn(&TelemetrySample) + Send + Sync,
{
    FnConsumer(f)
}
