use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::animation::{Easing, Scheduler, Tween};
use crate::clock::Clock;
use crate::comments::{parse_comment_id, CommentId};
use crate::read_state::ReadState;
use crate::throttle::Throttle;

/// One pixel of slack so a scroll position rounded down still counts as
/// having reached its comment.
const ROUNDING_SLACK: f64 = 1.0;

pub trait Viewport {
    fn scroll_y(&self) -> f64;
    fn scroll_to(&self, y: f64);
    fn comment_offset(&self, id: CommentId) -> Option<f64>;
    fn header_height(&self) -> f64 {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigatorConfig {
    pub scroll_throttle: Duration,
    pub scroll_padding: f64,
    pub scroll_speed: f64,
    pub min_scroll: Duration,
    pub max_scroll: Duration,
    pub easing: Easing,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            scroll_throttle: Duration::from_millis(150),
            scroll_padding: 8.0,
            scroll_speed: 1600.0,
            min_scroll: Duration::from_millis(250),
            max_scroll: Duration::from_millis(750),
            easing: Easing::EaseOutSine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavStatus {
    pub unread_count: usize,
    pub current_index: Option<usize>,
}

impl NavStatus {
    pub fn remaining(&self) -> usize {
        match self.current_index {
            Some(idx) => self.unread_count.saturating_sub(idx + 1),
            None => self.unread_count,
        }
    }

    pub fn can_go_back(&self) -> bool {
        self.current_index.is_some_and(|idx| idx > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        self.remaining() > 0
    }
}

/// Index of the current comment for a scroll position: the comment just
/// before the first one whose top is still below `threshold`, or the last
/// comment when all of them are above it.
pub fn index_for_scroll(offsets: &[f64], threshold: f64) -> Option<usize> {
    match offsets.iter().position(|&offset| offset > threshold) {
        Some(first_below) => first_below.checked_sub(1),
        None => offsets.len().checked_sub(1),
    }
}

#[derive(Debug, Default)]
struct ScrollGuard {
    active: Cell<bool>,
    generation: Cell<u64>,
}

impl ScrollGuard {
    fn begin(&self) -> u64 {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.active.set(true);
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.get() == generation
    }

    fn finish(&self, generation: u64) {
        if self.is_current(generation) {
            self.active.set(false);
        }
    }
}

pub struct Navigator {
    config: NavigatorConfig,
    unread: Vec<CommentId>,
    current: Option<usize>,
    read_through: Option<usize>,
    read_state: ReadState,
    viewport: Rc<dyn Viewport>,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
    samples: Throttle<f64>,
    scroll: Rc<ScrollGuard>,
    listener: Option<Box<dyn FnMut(NavStatus)>>,
}

impl Navigator {
    pub fn new(
        unread: Vec<CommentId>,
        read_state: ReadState,
        viewport: Rc<dyn Viewport>,
        scheduler: Scheduler,
        clock: Arc<dyn Clock>,
        config: NavigatorConfig,
    ) -> Self {
        let samples = Throttle::new(config.scroll_throttle);
        Self {
            config,
            unread,
            current: None,
            read_through: None,
            read_state,
            viewport,
            scheduler,
            clock,
            samples,
            scroll: Rc::new(ScrollGuard::default()),
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: impl FnMut(NavStatus) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn status(&self) -> NavStatus {
        NavStatus {
            unread_count: self.unread.len(),
            current_index: self.current,
        }
    }

    pub fn unread(&self) -> &[CommentId] {
        &self.unread
    }

    pub fn current_comment(&self) -> Option<CommentId> {
        self.current.map(|idx| self.unread[idx])
    }

    pub fn is_scrolling(&self) -> bool {
        self.scroll.active.get()
    }

    pub fn read_state(&self) -> &ReadState {
        &self.read_state
    }

    pub fn start(&mut self, anchor: Option<&str>) -> bool {
        self.notify();
        let Some(id) = anchor.and_then(|anchor| parse_comment_id(anchor).ok()) else {
            return false;
        };
        self.scroll_to_comment(id)
    }

    pub fn advance(&mut self, direction: isize) -> NavStatus {
        let Some(last) = self.unread.len().checked_sub(1) else {
            return self.status();
        };
        let from = self.current.map_or(-1, |idx| idx as isize);
        let target = from.saturating_add(direction).clamp(0, last as isize) as usize;
        self.move_to(target);
        self.status()
    }

    pub fn jump_to_end(&mut self) -> NavStatus {
        if let Some(last) = self.unread.len().checked_sub(1) {
            self.move_to(last);
        }
        self.status()
    }

    pub fn on_scroll(&mut self, scroll_y: f64) {
        if self.is_scrolling() {
            return;
        }
        self.samples.call(self.clock.now(), scroll_y);
    }

    /// Applies the latest scroll sample once its throttle window has closed.
    /// Returns true if the index changed.
    pub fn poll(&mut self) -> bool {
        match self.samples.poll(self.clock.now()) {
            Some(scroll_y) => self.follow_scroll(scroll_y),
            None => false,
        }
    }

    fn follow_scroll(&mut self, scroll_y: f64) -> bool {
        if self.is_scrolling() {
            return false;
        }
        let threshold = scroll_y
            + self.viewport.header_height()
            + self.config.scroll_padding
            + ROUNDING_SLACK;
        let offsets: Vec<f64> = self
            .unread
            .iter()
            .map(|&id| self.viewport.comment_offset(id).unwrap_or(f64::INFINITY))
            .collect();

        let index = index_for_scroll(&offsets, threshold);
        if index == self.current {
            return false;
        }
        self.current = index;
        self.persist();
        self.notify();
        true
    }

    fn move_to(&mut self, target: usize) {
        if self.current == Some(target) {
            return;
        }
        self.current = Some(target);
        self.scroll_to_comment(self.unread[target]);
        self.persist();
        self.notify();
    }

    fn persist(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        if self.read_through.is_some_and(|through| through >= current) {
            return;
        }
        self.read_through = Some(current);
        self.read_state
            .set_read_comments(self.unread[..=current].to_vec());
    }

    fn notify(&mut self) {
        let status = self.status();
        if let Some(listener) = self.listener.as_mut() {
            listener(status);
        }
    }

    fn scroll_to_comment(&mut self, id: CommentId) -> bool {
        let Some(offset) = self.viewport.comment_offset(id) else {
            log::debug!("navigation: no position for comment {id}");
            return false;
        };
        let target = offset - self.viewport.header_height() - self.config.scroll_padding;
        self.animate_scroll(target.max(0.0));
        true
    }

    fn animate_scroll(&mut self, target: f64) {
        let from = self.viewport.scroll_y();
        let min = self.config.min_scroll.as_secs_f64();
        let max = self.config.max_scroll.as_secs_f64().max(min);
        let secs = (target - from).abs() / self.config.scroll_speed;
        let secs = if secs.is_finite() { secs.max(min).min(max) } else { min };

        let generation = self.scroll.begin();
        // a sample taken before this scroll would drag the index back
        self.samples.cancel();

        let viewport = self.viewport.clone();
        let guard = self.scroll.clone();
        let on_update = move |y: f64| {
            if guard.is_current(generation) {
                viewport.scroll_to(y.floor());
            }
        };
        let guard = self.scroll.clone();
        self.scheduler.schedule(
            Tween::new(from, target, Duration::from_secs_f64(secs), on_update)
                .easing(self.config.easing)
                .on_complete(move || guard.finish(generation)),
        );
    }
}
