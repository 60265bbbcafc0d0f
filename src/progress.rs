//! Progress-callback trait for per-section generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the generator works through each section.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docregen::{GenerationProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_section_complete(&self, order_index: usize, total: usize, html_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Section {}/{} done ({} bytes)", order_index + 1, total, html_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the generation pipeline as it processes each section.
///
/// Sections are generated concurrently, so `on_section_start`,
/// `on_section_complete` and `on_section_fallback` may be called from
/// different tasks at the same time. All methods default to no-ops.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once before the first writer call.
    fn on_generation_start(&self, total_sections: usize) {
        let _ = total_sections;
    }

    /// Called before the first attempt on a section.
    ///
    /// `order_index` is the 0-based document position.
    fn on_section_start(&self, order_index: usize, total_sections: usize) {
        let _ = (order_index, total_sections);
    }

    /// Called when a section was regenerated and passed validation.
    fn on_section_complete(&self, order_index: usize, total_sections: usize, html_len: usize) {
        let _ = (order_index, total_sections, html_len);
    }

    /// Called when a section fell back to its original HTML.
    fn on_section_fallback(&self, order_index: usize, total_sections: usize, reason: &str) {
        let _ = (order_index, total_sections, reason);
    }

    /// Called once every section reached a terminal state.
    ///
    /// # Arguments
    /// * `total_sections` — sections in the document
    /// * `success_count`  — sections regenerated without fallback
    fn on_generation_complete(&self, total_sections: usize, success_count: usize) {
        let _ = (total_sections, success_count);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        fallbacks: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl GenerationProgressCallback for TrackingCallback {
        fn on_section_start(&self, _order_index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_section_complete(&self, _order_index: usize, _total: usize, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_section_fallback(&self, _order_index: usize, _total: usize, _reason: &str) {
            self.fallbacks.fetch_add(1, Ordering::SeqCst);
        }

        fn on_generation_complete(&self, _total: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_generation_start(5);
        cb.on_section_start(0, 5);
        cb.on_section_complete(0, 5, 42);
        cb.on_section_fallback(1, 5, "writer timed out");
        cb.on_generation_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_section_start(0, 2);
        tracker.on_section_complete(0, 2, 100);
        tracker.on_section_start(1, 2);
        tracker.on_section_fallback(1, 2, "invalid output");
        tracker.on_generation_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.fallbacks.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_generation_start(10);
        cb.on_section_complete(3, 10, 512);
    }
}
