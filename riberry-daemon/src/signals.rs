//! External signal state
//!
//! The bridge writes what it hears from the control system; the display
//! loop reads it once per iteration. Critical sections only copy or swap a
//! field, so neither side holds the lock across I/O.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbImage;

#[derive(Debug, Default)]
struct ExternalSignals {
    reachable: bool,
    pending_annotation: Option<String>,
    frame_source_active: bool,
    latest_frame: Option<Arc<RgbImage>>,
}

/// Handle to the state shared between the bridge and the display loop
#[derive(Debug, Clone, Default)]
pub struct SharedSignals {
    inner: Arc<Mutex<ExternalSignals>>,
}

impl SharedSignals {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ExternalSignals> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the control system is connected
    pub fn is_reachable(&self) -> bool {
        self.state().reachable
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state().reachable = reachable;
    }

    /// Replace the annotation with the latest text from the control system
    pub fn set_annotation(&self, text: String) {
        self.state().pending_annotation = Some(text);
    }

    /// Take the annotation for the next status page
    ///
    /// Annotations are shown once and only while the control system is
    /// connected; otherwise the text stays pending.
    pub fn take_annotation(&self) -> Option<String> {
        let mut state = self.state();
        if state.reachable {
            state.pending_annotation.take()
        } else {
            None
        }
    }

    /// A frame topic was subscribed
    pub fn begin_frame_source(&self) {
        self.state().frame_source_active = true;
    }

    /// The frame topic went away; the last frame goes with it
    pub fn end_frame_source(&self) {
        let mut state = self.state();
        state.frame_source_active = false;
        state.latest_frame = None;
    }

    /// Store a frame received from the active source
    pub fn push_frame(&self, frame: RgbImage) {
        self.state().latest_frame = Some(Arc::new(frame));
    }

    /// Forget `frame` unless a newer one has already replaced it
    pub fn discard_frame(&self, frame: &Arc<RgbImage>) {
        let mut state = self.state();
        if state
            .latest_frame
            .as_ref()
            .is_some_and(|latest| Arc::ptr_eq(latest, frame))
        {
            state.latest_frame = None;
        }
    }

    /// The frame to stream, if a source is active and has delivered one
    pub fn frame(&self) -> Option<Arc<RgbImage>> {
        let state = self.state();
        if state.frame_source_active {
            state.latest_frame.clone()
        } else {
            None
        }
    }

    /// A bridge session ended
    pub fn disconnect(&self) {
        let mut state = self.state();
        state.reachable = false;
        state.pending_annotation = None;
    }
}
