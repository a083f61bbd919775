//! Image preview carousel.
//!
//! The controller owns the selection and the rendered window of slots around
//! it. Renderers read [`Frame`]s and report back when an animation finishes;
//! no rendering engine is assumed.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::ops::Range;
use tracing::{debug, warn};

use crate::types::{Asset, Size};

pub const BROKEN_IMAGE: &str = "/images/broken-image.svg";
pub const DEFAULT_THUMBNAIL_STYLE: &str = "?imageMogr2/thumbnail/!30p";

const SMALL_SCREEN: f64 = 768.0;
const SIDE_GUTTER: f64 = 70.0;
const SLOT_NUDGE: f64 = 20.0;
const TRANSITION_SECS: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Before,
    Current,
    After,
}

pub fn classify(index: usize, selected: usize) -> Relation {
    match index.cmp(&selected) {
        std::cmp::Ordering::Less => Relation::Before,
        std::cmp::Ordering::Equal => Relation::Current,
        std::cmp::Ordering::Greater => Relation::After,
    }
}

/// Indices rendered around `selected`: the selection and one neighbour each side.
pub fn window(selected: usize, len: usize) -> Range<usize> {
    if len == 0 {
        return 0..0;
    }
    let selected = selected.min(len - 1);
    selected.saturating_sub(1)..(selected + 2).min(len)
}

/// Maps a slot position inside the window back to its list index.
pub fn real_index(selected: usize, slot: usize) -> usize {
    if selected == 0 {
        slot
    } else {
        selected - 1 + slot
    }
}

#[derive(Debug, Clone)]
pub struct AssetUrls {
    thumbnail_style: String,
}

impl Default for AssetUrls {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_STYLE)
    }
}

impl AssetUrls {
    pub fn new(thumbnail_style: impl Into<String>) -> Self {
        Self {
            thumbnail_style: thumbnail_style.into(),
        }
    }

    pub fn thumbnail(&self, asset: &Asset) -> String {
        format!("{}{}", asset.object_url, self.thumbnail_style)
    }

    pub fn original(&self, asset: &Asset) -> String {
        asset.object_url.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn is_small_screen(&self) -> bool {
        self.width < SMALL_SCREEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    FullWidth,
    FullHeight,
}

pub fn fit(size: Size, viewport: Viewport) -> Fit {
    let width = if viewport.is_small_screen() {
        viewport.width
    } else {
        viewport.width - SIDE_GUTTER * 2.0
    };
    if viewport.height / width > size.height / size.width {
        Fit::FullWidth
    } else {
        Fit::FullHeight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Entering,
    Visible,
    Exiting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Eased { duration: f64 },
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub opacity: f64,
    pub blur: f64,
    pub scale: f64,
    pub transition: Transition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Drag {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    ArrowLeft,
    ArrowRight,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub asset_id: i64,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadJob {
    pub ticket: Ticket,
    pub url: String,
}

#[async_trait]
pub trait Preloader: Send + Sync {
    async fn preload(&self, url: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSlot {
    pub asset: Asset,
    pub index: usize,
    pub src: String,
    pub loaded: bool,
    pub animated: bool,
    pub phase: Phase,
    generation: u64,
}

/// Preloads by fetching the image over HTTP.
pub struct HttpPreloader {
    client: reqwest::Client,
}

impl HttpPreloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Preloader for HttpPreloader {
    async fn preload(&self, url: &str) -> Result<()> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        response.bytes().await?;
        Ok(())
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

pub struct Carousel {
    assets: Vec<Asset>,
    urls: AssetUrls,
    viewport: Viewport,
    selected: Option<usize>,
    slots: Vec<ImageSlot>,
    drag: Option<Drag>,
    /// Pointer offset at the moment the preview started closing.
    exit_drag: Drag,
    closing: bool,
    generation: u64,
    pending: Vec<PreloadJob>,
    teardown: Option<Teardown>,
}

impl Carousel {
    pub fn new(assets: Vec<Asset>, urls: AssetUrls, viewport: Viewport) -> Self {
        Self {
            assets,
            urls,
            viewport,
            selected: None,
            slots: Vec::new(),
            drag: None,
            exit_drag: Drag::default(),
            closing: false,
            generation: 0,
            pending: Vec::new(),
            teardown: None,
        }
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn is_open(&self) -> bool {
        self.selected.is_some() && !self.closing
    }

    pub fn slots(&self) -> &[ImageSlot] {
        &self.slots
    }

    pub fn slot(&self, asset_id: i64) -> Option<&ImageSlot> {
        self.slots.iter().find(|s| s.asset.id == asset_id)
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Replaces the list, e.g. after the gallery loaded another page.
    pub fn set_assets(&mut self, assets: Vec<Asset>) {
        self.assets = assets;
        if let Some(selected) = self.selected {
            if self.assets.is_empty() {
                self.selected = None;
            } else {
                self.selected = Some(selected.min(self.assets.len() - 1));
            }
            self.sync_window();
        }
    }

    /// Opens the preview at `index`. `teardown` runs once the current image finished closing.
    pub fn open<F>(&mut self, index: usize, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if index >= self.assets.len() {
            warn!(
                "Ignoring preview of index {} out of {}",
                index,
                self.assets.len()
            );
            return;
        }
        if self.closing {
            self.finish_close();
        }
        self.teardown = Some(Box::new(teardown));
        self.selected = Some(index);
        self.sync_window();
    }

    pub fn select(&mut self, index: usize) -> bool {
        if self.closing || self.selected.is_none() || index >= self.assets.len() {
            return false;
        }
        if self.selected == Some(index) {
            return false;
        }
        self.selected = Some(index);
        self.sync_window();
        true
    }

    pub fn next(&mut self) -> bool {
        match self.selected {
            Some(i) => self.select(i + 1),
            None => false,
        }
    }

    pub fn prev(&mut self) -> bool {
        match self.selected {
            Some(i) if i > 0 => self.select(i - 1),
            _ => false,
        }
    }

    pub fn handle_key(&mut self, key: Key) -> bool {
        match key {
            Key::Escape if self.is_open() => {
                self.close();
                true
            }
            Key::ArrowLeft => self.prev(),
            Key::ArrowRight => self.next(),
            _ => false,
        }
    }

    /// Applies a continuous pointer offset. Frames stop easing until the drag ends.
    pub fn set_drag(&mut self, x: f64, y: f64) {
        if self.is_open() {
            self.drag = Some(Drag { x, y });
        }
    }

    /// Ends a drag; a horizontal swipe past a quarter of the viewport pages.
    pub fn end_drag(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let threshold = self.viewport.width / 4.0;
        if drag.x < -threshold {
            self.next();
        } else if drag.x > threshold {
            self.prev();
        }
    }

    pub fn close(&mut self) {
        if self.selected.is_none() || self.closing {
            return;
        }
        debug!("Closing preview at {:?}", self.selected);
        self.closing = true;
        self.exit_drag = self.drag.take().unwrap_or_default();
        for slot in &mut self.slots {
            slot.phase = Phase::Exiting;
        }
        if self.slots.is_empty() {
            self.finish_close();
        }
    }

    pub fn take_preloads(&mut self) -> Vec<PreloadJob> {
        std::mem::take(&mut self.pending)
    }

    /// Applies a preload outcome. Outcomes for slots that are gone are discarded.
    pub fn apply_preload(&mut self, ticket: Ticket, ok: bool) -> bool {
        let Some(slot) = self
            .slots
            .iter_mut()
            .filter(|s| s.phase != Phase::Exiting)
            .find(|s| s.asset.id == ticket.asset_id && s.generation == ticket.generation)
        else {
            debug!("Discarding stale preload for asset {}", ticket.asset_id);
            return false;
        };
        slot.loaded = true;
        if !ok {
            warn!("Failed to load asset {}, using placeholder", ticket.asset_id);
            slot.src = BROKEN_IMAGE.to_string();
        }
        let original = self.urls.original(&slot.asset);
        swap_to_original(slot, original);
        true
    }

    /// Runs every pending preload and applies the outcomes.
    pub async fn preload_pending<P>(&mut self, preloader: &P)
    where
        P: Preloader + ?Sized,
    {
        let jobs = self.take_preloads();
        let outcomes = join_all(jobs.iter().map(|job| preloader.preload(&job.url))).await;
        for (job, outcome) in jobs.into_iter().zip(outcomes) {
            self.apply_preload(job.ticket, outcome.is_ok());
        }
    }

    /// Reported by the renderer when a slot reached `phase`.
    pub fn animation_complete(&mut self, asset_id: i64, phase: Phase) {
        let Some(position) = self.slots.iter().position(|s| s.asset.id == asset_id) else {
            return;
        };
        match phase {
            Phase::Entering => {}
            Phase::Visible => {
                let slot = &mut self.slots[position];
                if slot.phase == Phase::Exiting {
                    return;
                }
                slot.phase = Phase::Visible;
                slot.animated = true;
                let original = self.urls.original(&slot.asset);
                swap_to_original(slot, original);
            }
            Phase::Exiting => {
                if self.slots[position].phase != Phase::Exiting {
                    return;
                }
                let slot = self.slots.remove(position);
                if self.closing && Some(slot.index) == self.selected {
                    self.finish_close();
                }
            }
        }
    }

    pub fn relation(&self, slot: &ImageSlot) -> Option<Relation> {
        self.selected.map(|selected| classify(slot.index, selected))
    }

    pub fn initial_frame(&self, slot: &ImageSlot) -> Frame {
        Frame {
            x: self.viewport.width * self.offset(slot),
            y: 0.0,
            opacity: 0.3,
            blur: 20.0,
            scale: 0.3,
            transition: Transition::Eased {
                duration: TRANSITION_SECS,
            },
        }
    }

    /// Frame the slot animates towards in its current phase.
    pub fn target_frame(&self, slot: &ImageSlot) -> Frame {
        let drag = self.drag.unwrap_or_default();
        let base_x = self.viewport.width * self.offset(slot);
        let eased = Transition::Eased {
            duration: TRANSITION_SECS,
        };

        if slot.phase == Phase::Exiting {
            let released = if self.closing { self.exit_drag } else { drag };
            return Frame {
                x: base_x,
                y: released.y,
                opacity: 0.0,
                blur: 0.0,
                scale: if released.y != 0.0 { 0.3 } else { 0.6 },
                transition: eased,
            };
        }

        let nudge = match self.relation(slot) {
            Some(Relation::Before) => -SLOT_NUDGE,
            Some(Relation::After) => SLOT_NUDGE,
            _ => 0.0,
        };
        Frame {
            x: base_x + drag.x + nudge,
            y: drag.y,
            opacity: 1.0,
            blur: if slot.loaded && slot.animated { 0.0 } else { 5.0 },
            scale: if drag.y != 0.0 {
                1.0 - drag.y / self.viewport.height
            } else {
                1.0
            },
            transition: if self.drag.is_some() {
                Transition::Immediate
            } else {
                eased
            },
        }
    }

    pub fn fit(&self, slot: &ImageSlot) -> Fit {
        fit(slot.asset.size, self.viewport)
    }

    fn offset(&self, slot: &ImageSlot) -> f64 {
        let selected = self.selected.unwrap_or(slot.index);
        slot.index as f64 - selected as f64
    }

    fn finish_close(&mut self) {
        self.slots.clear();
        self.pending.clear();
        self.selected = None;
        self.closing = false;
        self.exit_drag = Drag::default();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    fn sync_window(&mut self) {
        let Some(selected) = self.selected else {
            self.slots.clear();
            return;
        };
        let range = window(selected, self.assets.len());
        let shown: Vec<i64> = range.clone().map(|i| self.assets[i].id).collect();

        // neighbours leaving the window slide out before they are dropped
        for slot in &mut self.slots {
            if !shown.contains(&slot.asset.id) {
                slot.phase = Phase::Exiting;
            }
        }

        for index in range {
            let asset = &self.assets[index];
            if let Some(slot) = self.slots.iter_mut().find(|s| s.asset.id == asset.id) {
                slot.index = index;
                if slot.phase == Phase::Exiting {
                    slot.phase = Phase::Entering;
                    if !slot.loaded {
                        self.generation += 1;
                        slot.generation = self.generation;
                        self.pending.push(PreloadJob {
                            ticket: Ticket {
                                asset_id: asset.id,
                                generation: self.generation,
                            },
                            url: self.urls.original(asset),
                        });
                    }
                }
                continue;
            }
            self.generation += 1;
            let ticket = Ticket {
                asset_id: asset.id,
                generation: self.generation,
            };
            self.pending.push(PreloadJob {
                ticket,
                url: self.urls.original(asset),
            });
            self.slots.push(ImageSlot {
                asset: asset.clone(),
                index,
                src: self.urls.thumbnail(asset),
                loaded: false,
                animated: false,
                phase: Phase::Entering,
                generation: self.generation,
            });
        }
        self.slots.sort_by_key(|s| s.index);
    }
}

fn swap_to_original(slot: &mut ImageSlot, original: String) {
    if slot.loaded && slot.animated && slot.src != BROKEN_IMAGE {
        slot.src = original;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn asset(id: i64) -> Asset {
        Asset {
            id,
            object_url: format!("https://cos.example.com/{}.jpg", id),
            size: Size {
                width: 400.0,
                height: 300.0,
            },
            comment: None,
        }
    }

    fn carousel(n: i64) -> Carousel {
        Carousel::new(
            (1..=n).map(asset).collect(),
            AssetUrls::default(),
            Viewport {
                width: 1000.0,
                height: 800.0,
            },
        )
    }

    struct FailingPreloader;

    #[async_trait]
    impl Preloader for FailingPreloader {
        async fn preload(&self, url: &str) -> Result<()> {
            Err(anyhow::anyhow!("failed to load {}", url))
        }
    }

    struct OkPreloader;

    #[async_trait]
    impl Preloader for OkPreloader {
        async fn preload(&self, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn exactly_one_current() {
        for n in 1..6 {
            for selected in 0..n {
                let relations: Vec<_> = (0..n).map(|i| classify(i, selected)).collect();
                assert_eq!(
                    relations.iter().filter(|r| **r == Relation::Current).count(),
                    1
                );
                for (i, r) in relations.iter().enumerate() {
                    let expected = if i < selected {
                        Relation::Before
                    } else if i > selected {
                        Relation::After
                    } else {
                        Relation::Current
                    };
                    assert_eq!(*r, expected);
                }
            }
        }
    }

    #[test]
    fn window_clips_at_edges() {
        assert_eq!(window(0, 5), 0..2);
        assert_eq!(window(2, 5), 1..4);
        assert_eq!(window(4, 5), 3..5);
        assert_eq!(window(0, 0), 0..0);
        assert_eq!(real_index(0, 1), 1);
        assert_eq!(real_index(3, 0), 2);
    }

    #[test]
    fn opening_renders_neighbours_with_thumbnails() {
        let mut c = carousel(5);
        c.open(2, || {});

        let indices: Vec<_> = c.slots().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        let current = c.slot(3).unwrap();
        assert_eq!(current.src, "https://cos.example.com/3.jpg?imageMogr2/thumbnail/!30p");
        assert_eq!(c.take_preloads().len(), 3);
    }

    #[tokio::test]
    async fn preload_failure_shows_placeholder_and_marks_loaded() {
        let mut c = carousel(1);
        c.open(0, || {});
        c.preload_pending(&FailingPreloader).await;
        c.animation_complete(1, Phase::Visible);

        let slot = c.slot(1).unwrap();
        assert!(slot.loaded);
        assert_eq!(slot.src, BROKEN_IMAGE);
    }

    #[tokio::test]
    async fn original_replaces_thumbnail_after_load_and_animation() {
        let mut c = carousel(2);
        c.open(0, || {});
        c.preload_pending(&OkPreloader).await;

        let slot = c.slot(1).unwrap().clone();
        assert!(slot.loaded);
        assert!(slot.src.ends_with("!30p"));
        assert_eq!(c.target_frame(&slot).blur, 5.0);

        c.animation_complete(1, Phase::Visible);
        let slot = c.slot(1).unwrap().clone();
        assert_eq!(slot.src, "https://cos.example.com/1.jpg");
        assert_eq!(c.target_frame(&slot).blur, 0.0);
    }

    #[test]
    fn stale_preloads_are_discarded() {
        let mut c = carousel(5);
        c.open(0, || {});
        let jobs = c.take_preloads();

        c.select(3);
        let stale = jobs.iter().find(|j| j.ticket.asset_id == 1).unwrap();
        assert!(!c.apply_preload(stale.ticket, true));

        // asset 2 slid out and came back, so it preloads under a newer ticket
        c.select(1);
        let asset_two = jobs.iter().find(|j| j.ticket.asset_id == 2).unwrap();
        assert_eq!(c.slot(2).map(|s| s.phase), Some(Phase::Entering));
        assert!(c.take_preloads().iter().any(|j| j.ticket.asset_id == 2));
        assert!(!c.apply_preload(asset_two.ticket, true));
    }

    #[test]
    fn teardown_fires_once_when_current_finishes_exit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut c = carousel(3);
        c.open(1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(c.handle_key(Key::Escape));
        assert!(c.slots().iter().all(|s| s.phase == Phase::Exiting));

        c.animation_complete(1, Phase::Exiting);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        c.animation_complete(2, Phase::Exiting);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        c.animation_complete(3, Phase::Exiting);
        c.close();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.selected(), None);
    }

    #[test]
    fn dragging_disables_easing() {
        let mut c = carousel(3);
        c.open(1, || {});
        let slot = c.slot(2).unwrap().clone();
        assert!(matches!(c.target_frame(&slot).transition, Transition::Eased { .. }));

        c.set_drag(-50.0, 80.0);
        let frame = c.target_frame(&slot);
        assert_eq!(frame.transition, Transition::Immediate);
        assert_eq!(frame.x, -50.0);
        assert_eq!(frame.y, 80.0);
        assert!((frame.scale - 0.9).abs() < 1e-9);

        c.end_drag();
        assert_eq!(c.selected(), Some(1));
        assert!(matches!(c.target_frame(&slot).transition, Transition::Eased { .. }));
    }

    #[test]
    fn frames_follow_selection_offset() {
        let mut c = carousel(3);
        c.open(1, || {});
        let before = c.slot(1).unwrap().clone();
        let after = c.slot(3).unwrap().clone();

        assert_eq!(c.initial_frame(&before).x, -1000.0);
        assert_eq!(c.target_frame(&before).x, -1020.0);
        assert_eq!(c.target_frame(&after).x, 1020.0);

        c.close();
        let after = c.slot(3).unwrap().clone();
        let exit = c.target_frame(&after);
        assert_eq!(exit.x, 1000.0);
        assert_eq!(exit.opacity, 0.0);
        assert_eq!(exit.scale, 0.6);
    }

    #[test]
    fn reopening_while_closing_finishes_the_first_close() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut c = carousel(3);

        let counter = Arc::clone(&first);
        c.open(1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        c.close();

        let counter = Arc::clone(&second);
        c.open(1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert!(c.is_open());
        assert_eq!(c.slots().len(), 3);
        assert!(c.slots().iter().all(|s| s.phase == Phase::Entering));
        let current = c.slot(2).unwrap().clone();
        assert_eq!(c.target_frame(&current).opacity, 1.0);

        c.close();
        c.animation_complete(2, Phase::Exiting);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pull_down_close_exits_small_at_the_released_offset() {
        let mut c = carousel(3);
        c.open(1, || {});
        c.set_drag(0.0, 200.0);
        c.close();

        let current = c.slot(2).unwrap().clone();
        let exit = c.target_frame(&current);
        assert_eq!(exit.scale, 0.3);
        assert_eq!(exit.y, 200.0);
        assert_eq!(exit.opacity, 0.0);
    }

    #[test]
    fn neighbours_leaving_the_window_slide_out() {
        let mut c = carousel(5);
        c.open(1, || {});
        c.take_preloads();
        c.select(2);

        let leaving = c.slot(1).unwrap().clone();
        assert_eq!(leaving.phase, Phase::Exiting);
        let exit = c.target_frame(&leaving);
        assert_eq!(exit.x, -2000.0);
        assert_eq!(exit.opacity, 0.0);

        // still-rendered slots ignore a stray exit report
        c.animation_complete(3, Phase::Exiting);
        assert!(c.slot(3).is_some());

        c.animation_complete(1, Phase::Exiting);
        assert!(c.slot(1).is_none());
        let indices: Vec<_> = c.slots().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn swipe_past_threshold_pages() {
        let mut c = carousel(3);
        c.open(0, || {});
        c.set_drag(-300.0, 0.0);
        c.end_drag();
        assert_eq!(c.selected(), Some(1));
        assert!(c.handle_key(Key::ArrowLeft));
        assert_eq!(c.selected(), Some(0));
        assert!(!c.handle_key(Key::ArrowLeft));
    }

    #[test]
    fn fit_compares_aspect_ratios() {
        let wide = Size {
            width: 1600.0,
            height: 400.0,
        };
        let tall = Size {
            width: 400.0,
            height: 1600.0,
        };
        let desktop = Viewport {
            width: 1280.0,
            height: 800.0,
        };
        assert_eq!(fit(wide, desktop), Fit::FullWidth);
        assert_eq!(fit(tall, desktop), Fit::FullHeight);
    }
}
