use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use readmark::animation::{ManualFrames, Scheduler};
use readmark::clock::ManualClock;
use readmark::navigation::{NavStatus, NavigatorConfig, Viewport};
use readmark::session::{SessionContext, ThreadSession};
use readmark::snapshot::ThreadSnapshot;
use readmark::storage::MemoryArea;
use readmark::store::{Store, StoreOptions};

const THREAD: &str = r#"{
    "url": "https://housingbubble.blog/?p=55",
    "header_height": 60,
    "comments": [
        { "element_id": "comment-10", "author": "ann", "offset": 500 },
        { "element_id": "comment-11", "author": "bob", "offset": 900 },
        { "element_id": "comment-12", "author": "cat", "offset": 1400 },
        { "element_id": "comment-13", "author": "dan", "offset": 2100 }
    ]
}"#;

struct Tab {
    ctx: SessionContext,
    frames: Rc<ManualFrames>,
}

impl Tab {
    fn new(area: &Arc<MemoryArea>, clock: &Arc<ManualClock>) -> Self {
        let store = Arc::new(Store::open(
            area.clone(),
            clock.clone(),
            StoreOptions::default(),
        ));
        let frames = Rc::new(ManualFrames::new());
        Self {
            ctx: SessionContext {
                store,
                scheduler: Scheduler::new(frames.clone(), clock.clone()),
                clock: clock.clone(),
                navigation: NavigatorConfig::default(),
            },
            frames,
        }
    }

    fn open(&self) -> (ThreadSession, Rc<ThreadSnapshot>) {
        self.open_at(None)
    }

    fn open_at(&self, anchor: Option<&str>) -> (ThreadSession, Rc<ThreadSnapshot>) {
        let page = Rc::new(ThreadSnapshot::from_json(THREAD).unwrap());
        let session = ThreadSession::open(&self.ctx, "55", &*page, page.clone(), anchor).unwrap();
        (session, page)
    }

    /// Delivers frames until every animation has finished.
    fn run_frames(&self, clock: &ManualClock) {
        while self.frames.pending().is_some() {
            clock.advance(Duration::from_millis(16));
            self.ctx.scheduler.tick();
        }
    }
}

#[test]
fn keyboard_navigation_reaches_storage_after_throttle() {
    let area = Arc::new(MemoryArea::default());
    let clock = Arc::new(ManualClock::new());
    let tab = Tab::new(&area, &clock);
    let (mut session, page) = tab.open();

    let statuses: Rc<RefCell<Vec<NavStatus>>> = Rc::default();
    let sink = statuses.clone();
    let nav = session.navigator_mut();
    nav.set_listener(move |status| sink.borrow_mut().push(status));

    nav.advance(1);
    tab.run_frames(&clock);
    assert_eq!(page.scroll_y(), 500.0 - 60.0 - 8.0);
    nav.advance(1);
    tab.run_frames(&clock);
    assert_eq!(page.scroll_y(), 900.0 - 60.0 - 8.0);

    let indices: Vec<_> = statuses.borrow().iter().map(|s| s.current_index).collect();
    assert_eq!(indices, vec![Some(0), Some(1)]);

    // nothing written until the store's throttle window closes
    assert_eq!(area.write_count(), 0);
    clock.advance(Duration::from_secs(2));
    assert!(tab.ctx.store.tick());
    assert_eq!(area.write_count(), 1);
    assert!(area.get("p_55").unwrap().contains(r#""readComments":"10;1""#));
}

#[test]
fn scrolling_by_hand_marks_comments_read() {
    let area = Arc::new(MemoryArea::default());
    let clock = Arc::new(ManualClock::new());
    let tab = Tab::new(&area, &clock);
    let (mut session, page) = tab.open();
    let nav = session.navigator_mut();

    for y in [200.0, 600.0, 1000.0, 1400.0] {
        page.scroll_to(y);
        nav.on_scroll(y);
        clock.advance(Duration::from_millis(50));
        nav.poll();
    }
    clock.advance(Duration::from_millis(100));
    nav.poll();

    assert_eq!(nav.status().current_index, Some(2));
    assert_eq!(tab.ctx.store.read_comments("55"), vec![10, 11, 12]);
}

#[test]
fn second_tab_sees_first_tabs_progress() {
    let area = Arc::new(MemoryArea::default());
    let clock = Arc::new(ManualClock::new());
    let first = Tab::new(&area, &clock);
    let second = Tab::new(&area, &clock);

    let (mut session, _page) = first.open();
    session.navigator_mut().advance(2);
    assert!(first.ctx.store.flush());

    let (other, _page) = second.open();
    assert_eq!(other.navigator().unread(), &[12, 13]);
    assert_eq!(other.status().remaining(), 2);

    // a write still pending in the first tab is laid over the reload and wins
    let (mut other, _page) = second.open();
    other.navigator_mut().jump_to_end();
    session.navigator_mut().advance(1);
    assert!(second.ctx.store.flush());
    clock.advance(Duration::from_secs(2));
    assert!(first.ctx.store.tick());
    assert_eq!(second.ctx.store.read_comments("55"), vec![10, 11, 12]);

    let third = Tab::new(&area, &clock);
    assert_eq!(third.ctx.store.read_comments("55").len(), 3);
}

#[test]
fn link_to_comment_scrolls_there_on_open() {
    let area = Arc::new(MemoryArea::default());
    let clock = Arc::new(ManualClock::new());
    let tab = Tab::new(&area, &clock);
    let (mut session, page) = tab.open_at(Some("#comment-12"));
    assert!(session.navigator().is_scrolling());

    tab.run_frames(&clock);
    assert_eq!(page.scroll_y(), 1400.0 - 60.0 - 8.0);
    assert!(!session.navigator().is_scrolling());
    assert_eq!(session.status().current_index, None);

    // the anchor only moves the page; reading starts from the first comment
    assert_eq!(session.navigator_mut().advance(1).current_index, Some(0));
    clock.advance(Duration::from_secs(2));
    assert!(tab.ctx.store.tick());
    assert_eq!(tab.ctx.store.read_comments("55"), vec![10]);
}
