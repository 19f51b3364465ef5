use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    Linear,
    #[default]
    EaseOutSine,
    EaseInOutSine,
    EaseInQuint,
}

impl Easing {
    pub fn apply(self, p: f64) -> f64 {
        use std::f64::consts::PI;
        match self {
            Easing::Linear => p,
            Easing::EaseOutSine => (p * PI / 2.0).sin(),
            Easing::EaseInOutSine => -0.5 * ((PI * p).cos() - 1.0),
            Easing::EaseInQuint => p.powi(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown easing {0:?}")]
pub struct UnknownEasing(String);

impl FromStr for Easing {
    type Err = UnknownEasing;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "linear" => Ok(Easing::Linear),
            "easeoutsine" => Ok(Easing::EaseOutSine),
            "easeinoutsine" => Ok(Easing::EaseInOutSine),
            "easeinquint" => Ok(Easing::EaseInQuint),
            _ => Err(UnknownEasing(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle(pub u64);

pub trait FrameHost {
    fn request_frame(&self) -> FrameHandle;
    fn cancel_frame(&self, handle: FrameHandle);
}

#[derive(Debug, Default)]
pub struct ManualFrames {
    next: Cell<u64>,
    pending: Cell<Option<u64>>,
    requested: Cell<usize>,
    cancelled: Cell<usize>,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending.get().map(FrameHandle)
    }

    pub fn requested(&self) -> usize {
        self.requested.get()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.get()
    }
}

impl FrameHost for ManualFrames {
    fn request_frame(&self) -> FrameHandle {
        let id = self.next.get() + 1;
        self.next.set(id);
        self.pending.set(Some(id));
        self.requested.set(self.requested.get() + 1);
        FrameHandle(id)
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        if self.pending.get() == Some(handle.0) {
            self.pending.set(None);
        }
        self.cancelled.set(self.cancelled.get() + 1);
    }
}

pub struct Tween {
    start: f64,
    end: f64,
    duration: Duration,
    easing: Easing,
    on_update: Box<dyn FnMut(f64)>,
    on_complete: Option<Box<dyn FnOnce()>>,
}

impl Tween {
    pub fn new(
        start: f64,
        end: f64,
        duration: Duration,
        on_update: impl FnMut(f64) + 'static,
    ) -> Self {
        Self {
            start,
            end,
            duration,
            easing: Easing::Linear,
            on_update: Box::new(on_update),
            on_complete: None,
        }
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn on_complete(mut self, on_complete: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(on_complete));
        self
    }
}

impl fmt::Debug for Tween {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tween")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("duration", &self.duration)
            .field("easing", &self.easing)
            .finish_non_exhaustive()
    }
}

struct Running {
    tween: Tween,
    started: Instant,
}

impl Running {
    fn update(&mut self, now: Instant) -> bool {
        let tween = &mut self.tween;
        let elapsed = now.saturating_duration_since(self.started);
        let p = if tween.duration.is_zero() {
            1.0
        } else {
            elapsed.as_secs_f64() / tween.duration.as_secs_f64()
        };

        if p < 1.0 {
            let value = tween.start + (tween.end - tween.start) * tween.easing.apply(p);
            (tween.on_update)(value);
            false
        } else {
            (tween.on_update)(tween.end);
            if let Some(on_complete) = tween.on_complete.take() {
                on_complete();
            }
            true
        }
    }
}

#[derive(Default)]
struct Inner {
    running: Vec<Running>,
    frame: Option<FrameHandle>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<Inner>>,
    host: Rc<dyn FrameHost>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(host: Rc<dyn FrameHost>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::default())),
            host,
            clock,
        }
    }

    pub fn schedule(&self, tween: Tween) {
        let mut inner = self.inner.borrow_mut();
        inner.running.push(Running {
            tween,
            started: self.clock.now(),
        });
        if inner.frame.is_none() {
            inner.frame = Some(self.host.request_frame());
        }
    }

    /// Advances every running tween. Called by the host when a frame fires.
    ///
    /// Callbacks may schedule new tweens; those start on the next frame.
    pub fn tick(&self) {
        let now = self.clock.now();
        let mut running = {
            let mut inner = self.inner.borrow_mut();
            if inner.running.is_empty() && inner.frame.is_none() {
                return;
            }
            inner.frame = Some(self.host.request_frame());
            std::mem::take(&mut inner.running)
        };

        running.retain_mut(|animation| !animation.update(now));

        let mut inner = self.inner.borrow_mut();
        running.append(&mut inner.running);
        inner.running = running;
        if inner.running.is_empty() {
            if let Some(frame) = inner.frame.take() {
                self.host.cancel_frame(frame);
            }
        }
    }

    pub fn active(&self) -> usize {
        self.inner.borrow().running.len()
    }

    pub fn is_idle(&self) -> bool {
        let inner = self.inner.borrow();
        inner.running.is_empty() && inner.frame.is_none()
    }
}
