//! Frame source: the camera trait, a scoped frame guard and a replay camera
//! that serves stored frames with the driver's slot discipline.

use crate::error::CameraError;
use crate::models::{Frame, FrameBuf};
use crate::pgm;
use log::debug;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A camera that lends out frame buffers.
///
/// `acquire` blocks until a buffer slot is free. Every acquired buffer must be
/// handed back through `release`; [`FrameGuard`] does that on drop.
pub trait Camera: Send + Sync {
    fn acquire(&self) -> Result<FrameBuf, CameraError>;

    fn release(&self, frame: FrameBuf);
}

/// A borrowed camera frame, returned to its camera when dropped.
pub struct FrameGuard<'c, C: Camera + ?Sized> {
    camera: &'c C,
    frame: Option<FrameBuf>,
}

impl<'c, C: Camera + ?Sized> FrameGuard<'c, C> {
    /// Block until the camera lends a frame.
    pub fn acquire(camera: &'c C) -> Result<Self, CameraError> {
        let frame = camera.acquire()?;
        Ok(Self {
            camera,
            frame: Some(frame),
        })
    }

    pub fn frame(&self) -> Frame<'_> {
        match &self.frame {
            Some(frame) => frame.as_frame(),
            None => Frame::new(&[], 0, 0),
        }
    }

    /// Return the frame now rather than at scope exit.
    pub fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.camera.release(frame);
        }
    }
}

impl<C: Camera + ?Sized> Drop for FrameGuard<'_, C> {
    fn drop(&mut self) {
        self.give_back();
    }
}

struct SlotState {
    free: usize,
    next: usize,
    closed: bool,
}

/// Serves a fixed list of frames round-robin through a bounded number of
/// buffer slots.
pub struct ReplayCamera {
    frames: Vec<FrameBuf>,
    slots: usize,
    state: Mutex<SlotState>,
    returned: Condvar,
}

impl ReplayCamera {
    pub fn new(frames: Vec<FrameBuf>, slots: usize) -> Self {
        let slots = slots.max(1);
        Self {
            frames,
            slots,
            state: Mutex::new(SlotState {
                free: slots,
                next: 0,
                closed: false,
            }),
            returned: Condvar::new(),
        }
    }

    /// Replay the single frame stored in a `P5` container.
    pub fn from_container(raw: &[u8], slots: usize) -> Result<Self, CameraError> {
        let frame = pgm::parse(raw)?;
        Ok(Self::new(vec![frame.to_owned()], slots))
    }

    /// Wake every blocked `acquire`; later calls fail with [`CameraError::Closed`].
    pub fn close(&self) {
        self.lock().closed = true;
        self.returned.notify_all();
    }

    /// Slots currently available
    pub fn free_slots(&self) -> usize {
        self.lock().free
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Camera for ReplayCamera {
    fn acquire(&self) -> Result<FrameBuf, CameraError> {
        let mut state = self.lock();
        while state.free == 0 && !state.closed {
            state = self
                .returned
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return Err(CameraError::Closed);
        }
        if self.frames.is_empty() {
            return Err(CameraError::Unavailable);
        }

        let frame = self.frames[state.next % self.frames.len()].clone();
        state.next = state.next.wrapping_add(1);
        state.free -= 1;
        debug!("Frame lent out, {} slot(s) free", state.free);
        Ok(frame)
    }

    fn release(&self, frame: FrameBuf) {
        drop(frame);
        let mut state = self.lock();
        state.free = (state.free + 1).min(self.slots);
        self.returned.notify_one();
    }
}
