//! Navigation and page-turn state
//!
//! Pure and synchronous: every change goes through [`NavigationState::apply`],
//! which returns the side effects the caller has to carry out. Nothing in
//! here renders, sleeps or spawns.

use std::fmt;

use super::spread::{self, Spread};
use super::types::{Bitmap, FlipDirection, PageNumber, ViewMode};

/// Frames the overlay stays in [`FlipPhase::Prep`] before rotating, so the
/// unrotated layout is committed before the transition starts
pub const PREP_FRAMES: u8 = 2;

/// Horizontal travel a touch gesture needs before it counts as a swipe
pub const SWIPE_THRESHOLD_PX: f32 = 50.0;

/// Identifies one desktop flip request
pub type Ticket = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipPhase {
    /// Overlay mounted, no rotation applied yet
    Prep,
    /// Rotation running
    Run,
}

/// Unique identity of one transition. A new key means fresh visual state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransitionKey {
    pub ticket: Ticket,
    pub direction: FlipDirection,
    pub from: usize,
    pub to: usize,
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}#{}",
            self.direction, self.from, self.to, self.ticket
        )
    }
}

/// The two spreads a flip moves between
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlipRequest {
    pub ticket: Ticket,
    pub direction: FlipDirection,
    pub from: Spread,
    pub to: Spread,
}

impl FlipRequest {
    /// from-left, from-right, to-left, to-right
    #[must_use]
    pub fn pages(&self) -> [Option<PageNumber>; 4] {
        [self.from.left, self.from.right, self.to.left, self.to.right]
    }
}

/// Bitmaps for the four pages of a [`FlipRequest`]
#[derive(Clone, Debug, Default)]
pub struct ResolvedPages {
    pub from_left: Option<Bitmap>,
    pub from_right: Option<Bitmap>,
    pub to_left: Option<Bitmap>,
    pub to_right: Option<Bitmap>,
}

impl ResolvedPages {
    /// Build from bitmaps in [`FlipRequest::pages`] order
    #[must_use]
    pub fn from_array([from_left, from_right, to_left, to_right]: [Option<Bitmap>; 4]) -> Self {
        Self {
            from_left,
            from_right,
            to_left,
            to_right,
        }
    }
}

/// A page slot on one of the layers. `page == None` means nothing goes there.
#[derive(Clone, Debug, Default)]
pub struct Face {
    pub page: Option<PageNumber>,
    pub bitmap: Option<Bitmap>,
}

impl Face {
    fn new(page: Option<PageNumber>, bitmap: Option<Bitmap>) -> Self {
        Self { page, bitmap }
    }
}

/// The sheet being turned
#[derive(Clone, Debug)]
pub struct TurningSheet {
    /// Page leaving view
    pub front: Face,
    /// Page arriving
    pub back: Face,
}

/// Static pages under the turning sheet
#[derive(Clone, Debug)]
pub struct UnderLayer {
    pub left: Face,
    pub right: Face,
}

/// An active page turn
#[derive(Clone, Debug)]
pub struct FlipTransition {
    pub key: TransitionKey,
    pub from: Spread,
    pub to: Spread,
    pub resolved: ResolvedPages,
    pub under: UnderLayer,
    pub sheet: TurningSheet,
    pub phase: FlipPhase,
    frames: u8,
}

impl FlipTransition {
    fn assemble(request: &FlipRequest, resolved: ResolvedPages) -> Self {
        let r = resolved.clone();
        let (from, to) = (request.from, request.to);
        let (under, sheet) = match request.direction {
            FlipDirection::Next => (
                UnderLayer {
                    left: Face::new(from.left, r.from_left),
                    right: Face::new(to.right, r.to_right),
                },
                TurningSheet {
                    front: Face::new(from.right, r.from_right),
                    back: Face::new(to.left, r.to_left),
                },
            ),
            FlipDirection::Prev => (
                UnderLayer {
                    left: Face::new(to.left, r.to_left),
                    right: Face::new(from.right, r.from_right),
                },
                TurningSheet {
                    front: Face::new(from.left, r.from_left),
                    back: Face::new(to.right, r.to_right),
                },
            ),
        };

        Self {
            key: TransitionKey {
                ticket: request.ticket,
                direction: request.direction,
                from: from.index,
                to: to.index,
            },
            from,
            to,
            resolved,
            under,
            sheet,
            phase: FlipPhase::Prep,
            frames: 0,
        }
    }

    #[must_use]
    pub fn direction(&self) -> FlipDirection {
        self.key.direction
    }
}

#[derive(Clone, Debug, Default)]
pub enum FlipState {
    #[default]
    Idle,
    Transitioning(Box<FlipTransition>),
}

impl FlipState {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, FlipState::Transitioning(_))
    }

    #[must_use]
    pub fn transition(&self) -> Option<&FlipTransition> {
        match self {
            FlipState::Idle => None,
            FlipState::Transitioning(t) => Some(t),
        }
    }
}

/// Navigation state of one viewer
#[derive(Clone, Debug)]
pub struct NavigationState {
    /// A document is open and its page count known
    pub ready: bool,
    pub page_count: u32,
    pub mode: ViewMode,
    /// Committed desktop spread
    pub spread_index: usize,
    /// Visible page in mobile mode (1-indexed)
    pub mobile_page: PageNumber,
    /// Held from the moment a desktop flip is requested until it settles or fails
    pub nav_lock: bool,
    pub flip: FlipState,
    pending: Option<FlipRequest>,
    last_ticket: Ticket,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: false,
            page_count: 0,
            mode: ViewMode::Desktop,
            spread_index: 0,
            mobile_page: 1,
            nav_lock: false,
            flip: FlipState::Idle,
            pending: None,
            last_ticket: 0,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::Load { page_count } => {
                self.reset();
                self.ready = true;
                self.page_count = page_count;
                vec![]
            }

            Command::Unload => {
                self.reset();
                vec![]
            }

            Command::SetMobile(mobile) => {
                self.mode = if mobile {
                    ViewMode::Mobile
                } else {
                    ViewMode::Desktop
                };
                vec![]
            }

            Command::RequestFlip(direction) => self.request_flip(direction),

            Command::PagesResolved { ticket, pages } => {
                let Some(request) = self.take_pending(ticket) else {
                    return vec![];
                };
                let transition = FlipTransition::assemble(&request, pages);
                let key = transition.key;
                self.flip = FlipState::Transitioning(Box::new(transition));
                vec![Effect::MountOverlay(key)]
            }

            Command::ResolveFailed { ticket } => {
                if self.take_pending(ticket).is_none() {
                    return vec![];
                }
                self.nav_lock = false;
                vec![Effect::ReleaseLock]
            }

            Command::AnimationFrame => {
                let FlipState::Transitioning(t) = &mut self.flip else {
                    return vec![];
                };
                if t.phase != FlipPhase::Prep {
                    return vec![];
                }
                t.frames += 1;
                if t.frames < PREP_FRAMES {
                    return vec![];
                }
                t.phase = FlipPhase::Run;
                vec![Effect::StartRotation(t.key)]
            }

            Command::TransitionSettled => {
                let FlipState::Transitioning(t) = &self.flip else {
                    return vec![];
                };
                if t.phase != FlipPhase::Run {
                    return vec![];
                }
                let last = self.spread_count().saturating_sub(1);
                let committed = t.to.index.min(last);
                self.spread_index = committed;
                self.flip = FlipState::Idle;
                self.nav_lock = false;
                vec![Effect::CommitSpread(committed), Effect::ReleaseLock]
            }
        }
    }

    fn request_flip(&mut self, direction: FlipDirection) -> Vec<Effect> {
        if !self.ready || self.nav_lock || self.flip.is_active() {
            return vec![];
        }

        if self.mode == ViewMode::Mobile {
            let last = self.page_count.max(1);
            let target = match direction {
                FlipDirection::Next => self.mobile_page.saturating_add(1),
                FlipDirection::Prev => self.mobile_page.saturating_sub(1),
            }
            .clamp(1, last);
            if target == self.mobile_page {
                return vec![];
            }
            self.mobile_page = target;
            return vec![Effect::ShowMobilePage(target)];
        }

        let from = self.spread_index;
        let to = match direction {
            FlipDirection::Next => from + 1,
            FlipDirection::Prev => match from.checked_sub(1) {
                Some(to) => to,
                None => return vec![],
            },
        };
        if to >= self.spread_count() {
            return vec![];
        }

        self.nav_lock = true;
        self.last_ticket += 1;
        let request = FlipRequest {
            ticket: self.last_ticket,
            direction,
            from: spread::pages_of(self.page_count, from),
            to: spread::pages_of(self.page_count, to),
        };
        self.pending = Some(request);
        vec![Effect::ResolvePages(request)]
    }

    fn take_pending(&mut self, ticket: Ticket) -> Option<FlipRequest> {
        match self.pending {
            Some(request) if request.ticket == ticket => self.pending.take(),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.ready = false;
        self.page_count = 0;
        self.spread_index = 0;
        self.mobile_page = 1;
        self.nav_lock = false;
        self.flip = FlipState::Idle;
        self.pending = None;
    }

    #[must_use]
    pub fn spread_count(&self) -> usize {
        spread::spread_count(self.page_count)
    }

    #[must_use]
    pub fn current_spread(&self) -> Spread {
        spread::pages_of(self.page_count, self.spread_index)
    }

    /// Visible mobile page, `None` when there is no document
    #[must_use]
    pub fn visible_mobile_page(&self) -> Option<PageNumber> {
        (self.page_count > 0).then(|| self.mobile_page.clamp(1, self.page_count))
    }

    #[must_use]
    pub fn is_resolving(&self) -> bool {
        self.pending.is_some()
    }

    fn navigation_open(&self) -> bool {
        self.ready && !self.nav_lock && !self.flip.is_active()
    }

    #[must_use]
    pub fn can_go_prev(&self) -> bool {
        if !self.navigation_open() {
            return false;
        }
        match self.mode {
            ViewMode::Mobile => self.visible_mobile_page().is_some_and(|p| p > 1),
            ViewMode::Desktop => self.spread_index > 0,
        }
    }

    #[must_use]
    pub fn can_go_next(&self) -> bool {
        if !self.navigation_open() {
            return false;
        }
        match self.mode {
            ViewMode::Mobile => self
                .visible_mobile_page()
                .is_some_and(|p| p < self.page_count),
            ViewMode::Desktop => {
                let count = self.spread_count();
                count > 0 && self.spread_index < count - 1
            }
        }
    }

    /// Human readable position, e.g. "Pages 2–3 of 12"
    #[must_use]
    pub fn label(&self) -> String {
        let total = self.page_count;
        if total == 0 {
            return "—".to_string();
        }

        if self.mode == ViewMode::Mobile {
            let page = self.visible_mobile_page().unwrap_or(1);
            return format!("Page {page} of {total}");
        }

        match (self.current_spread().left, self.current_spread().right) {
            (Some(l), Some(r)) => format!("Pages {l}–{r} of {total}"),
            (None, Some(r)) => format!("Cover (page {r} of {total})"),
            (Some(l), None) => format!("Back cover (page {l} of {total})"),
            (None, None) => format!("Page — of {total}"),
        }
    }

    /// Turn a click on the stage into a page turn. The left half goes back,
    /// the midpoint and the right half go forward.
    #[must_use]
    pub fn intent_for_click(&self, x: f32, width: f32) -> Option<FlipDirection> {
        if !(width.is_finite() && width > 0.0) || !x.is_finite() {
            return None;
        }
        let direction = if x < width / 2.0 {
            FlipDirection::Prev
        } else {
            FlipDirection::Next
        };
        self.gate(direction)
    }

    /// Turn a finished touch gesture into a page turn. Only mobile layout
    /// swipes; the gesture has to travel more than [`SWIPE_THRESHOLD_PX`]
    /// horizontally and more horizontally than vertically. Swiping right
    /// goes back.
    #[must_use]
    pub fn intent_for_swipe(&self, dx: f32, dy: f32) -> Option<FlipDirection> {
        if self.mode != ViewMode::Mobile {
            return None;
        }
        let (adx, ady) = (dx.abs(), dy.abs());
        if !(adx > SWIPE_THRESHOLD_PX && adx > ady) {
            return None;
        }
        let direction = if dx > 0.0 {
            FlipDirection::Prev
        } else {
            FlipDirection::Next
        };
        self.gate(direction)
    }

    fn gate(&self, direction: FlipDirection) -> Option<FlipDirection> {
        let open = match direction {
            FlipDirection::Prev => self.can_go_prev(),
            FlipDirection::Next => self.can_go_next(),
        };
        open.then_some(direction)
    }
}

/// Commands that modify navigation state
#[derive(Clone, Debug)]
pub enum Command {
    /// A document with this many pages is ready
    Load { page_count: u32 },
    /// The document went away
    Unload,
    /// The shell switched between single-page and spread layout
    SetMobile(bool),
    /// User asked to turn the page
    RequestFlip(FlipDirection),
    /// All bitmaps of a flip request are ready
    PagesResolved { ticket: Ticket, pages: ResolvedPages },
    /// A bitmap of a flip request could not be produced
    ResolveFailed { ticket: Ticket },
    /// The shell rendered a frame
    AnimationFrame,
    /// The turning sheet finished its rotation
    TransitionSettled,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Resolve the bitmaps of these spreads
    ResolvePages(FlipRequest),
    /// Show this page in mobile mode
    ShowMobilePage(PageNumber),
    /// Mount the unrotated overlay
    MountOverlay(TransitionKey),
    /// Start rotating the sheet
    StartRotation(TransitionKey),
    /// New committed spread
    CommitSpread(usize),
    /// Navigation lock released
    ReleaseLock,
}
