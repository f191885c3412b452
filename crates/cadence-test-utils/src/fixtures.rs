//! Reusable game fixtures.
//!
//! [`RecordingGame`] logs every callback the loop makes, in order, so tests
//! can assert on update/draw interleaving and on the time context each call
//! received.

use cadence_core::{FrameTime, Game};

/// One recorded callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameEvent {
    Update(FrameTime),
    SuspendedUpdate(FrameTime),
    Draw(FrameTime),
}

impl GameEvent {
    /// The time context the callback received.
    pub fn time(&self) -> &FrameTime {
        match self {
            Self::Update(t) | Self::SuspendedUpdate(t) | Self::Draw(t) => t,
        }
    }

    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw(_))
    }
}

type UpdateHook = Box<dyn FnMut(&FrameTime)>;

/// Records every update, suspended update, and draw.
///
/// An optional hook runs inside each update (normal or suspended), after
/// the event is recorded. Use it to spawn work or post continuations from
/// "inside" a frame.
#[derive(Default)]
pub struct RecordingGame {
    events: Vec<GameEvent>,
    on_update: Option<UpdateHook>,
}

impl RecordingGame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update_hook(hook: impl FnMut(&FrameTime) + 'static) -> Self {
        Self {
            events: Vec::new(),
            on_update: Some(Box::new(hook)),
        }
    }

    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    pub fn update_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, GameEvent::Update(_)))
            .count()
    }

    pub fn suspended_update_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, GameEvent::SuspendedUpdate(_)))
            .count()
    }

    pub fn draw_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_draw()).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn run_hook(&mut self, time: &FrameTime) {
        if let Some(hook) = self.on_update.as_mut() {
            hook(time);
        }
    }
}

impl Game for RecordingGame {
    fn update(&mut self, time: &FrameTime) {
        self.events.push(GameEvent::Update(*time));
        self.run_hook(time);
    }

    fn draw(&mut self, time: &FrameTime) {
        self.events.push(GameEvent::Draw(*time));
    }

    fn update_suspended(&mut self, time: &FrameTime) {
        self.events.push(GameEvent::SuspendedUpdate(*time));
        self.run_hook(time);
    }
}
