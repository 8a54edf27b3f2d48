//! Gesture / attack trigger
//!
//! Сырые touch события → сигналы для игрока:
//! - Began → `Move(location)` (если игрок может двигаться)
//! - Moved → первый move запоминает начало свайпа и заводит swipe timer;
//!   move после истечения таймера даёт `Swing { from, to }` и перевзводит жест
//! - Ended/Cancelled → сброс свайпа без атаки
//!
//! Таймер свайпа тикает снаружи (`tick`), раз в gameplay tick.

use std::time::Duration;

use bevy::math::Vec2;
use bevy::time::{Timer, TimerMode};

use crate::config::GestureConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchPhase {
    Began,
    Moved,
    Ended,
    Cancelled,
}

/// Touch событие в экранных координатах (пиксели)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub location: Vec2,
    pub previous_location: Vec2,
}

impl TouchEvent {
    pub fn new(phase: TouchPhase, location: Vec2, previous_location: Vec2) -> Self {
        Self {
            phase,
            location,
            previous_location,
        }
    }
}

/// Результат разбора жеста
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureSignal {
    /// Тянуть игрока к точке (экранные координаты)
    Move(Vec2),
    /// Взмах оружием от начала свайпа к текущей точке
    Swing { from: Vec2, to: Vec2 },
    /// Ничего не делать
    Idle,
}

#[derive(Debug, Clone)]
pub struct SwipeTracker {
    swipe_secs: f32,
    swipe_timer: Option<Timer>,
    begin_location: Vec2,
    is_swiping: bool,
    touches: u32,
    touch_locations: Vec<Vec2>,
}

impl Default for SwipeTracker {
    fn default() -> Self {
        Self::new(&GestureConfig::default())
    }
}

impl SwipeTracker {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            swipe_secs: config.swipe_secs,
            swipe_timer: None,
            begin_location: Vec2::ZERO,
            is_swiping: false,
            touches: 0,
            touch_locations: Vec::new(),
        }
    }

    pub fn tick(&mut self, delta: Duration) {
        if let Some(timer) = self.swipe_timer.as_mut() {
            timer.tick(delta);
        }
    }

    /// `player_can_move`: игрок жив и не ждёт уничтожения
    pub fn handle(&mut self, event: &TouchEvent, player_can_move: bool) -> GestureSignal {
        match event.phase {
            TouchPhase::Began => {
                if !player_can_move {
                    return GestureSignal::Idle;
                }
                self.is_swiping = false;
                self.touch_locations.push(event.location);
                self.touches += 1;
                GestureSignal::Move(event.location)
            }
            TouchPhase::Moved => {
                self.is_swiping = true;
                match self.swipe_timer.as_ref().map(Timer::finished) {
                    None => {
                        self.begin_location = event.previous_location;
                        self.swipe_timer = Some(Timer::from_seconds(self.swipe_secs, TimerMode::Once));
                        GestureSignal::Idle
                    }
                    Some(true) => {
                        self.swipe_timer = None;
                        GestureSignal::Swing {
                            from: self.begin_location,
                            to: event.location,
                        }
                    }
                    Some(false) => GestureSignal::Idle,
                }
            }
            TouchPhase::Ended => {
                self.touches = self.touches.saturating_sub(1);
                self.touch_locations.clear();
                if self.is_swiping {
                    self.swipe_timer = None;
                    self.is_swiping = false;
                }
                GestureSignal::Idle
            }
            TouchPhase::Cancelled => {
                self.touch_locations.clear();
                self.swipe_timer = None;
                self.is_swiping = false;
                self.touches = self.touches.saturating_sub(1);
                GestureSignal::Idle
            }
        }
    }

    pub fn is_swiping(&self) -> bool {
        self.is_swiping
    }

    /// Свайп взведён (таймер идёт или истёк, но swing ещё не выдан)
    pub fn swipe_armed(&self) -> bool {
        self.swipe_timer.is_some()
    }

    pub fn touch_count(&self) -> u32 {
        self.touches
    }

    pub fn touch_locations(&self) -> &[Vec2] {
        &self.touch_locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(phase: TouchPhase, location: (f32, f32), previous: (f32, f32)) -> TouchEvent {
        TouchEvent::new(phase, Vec2::new(location.0, location.1), Vec2::new(previous.0, previous.1))
    }

    #[test]
    fn test_began_moves_only_when_player_ready() {
        let mut tracker = SwipeTracker::default();
        let down = event(TouchPhase::Began, (10.0, 20.0), (10.0, 20.0));

        assert_eq!(tracker.handle(&down, false), GestureSignal::Idle);
        assert_eq!(tracker.touch_count(), 0);

        assert_eq!(tracker.handle(&down, true), GestureSignal::Move(Vec2::new(10.0, 20.0)));
        assert_eq!(tracker.touch_count(), 1);
        assert_eq!(tracker.touch_locations(), &[Vec2::new(10.0, 20.0)]);
    }

    #[test]
    fn test_swipe_commits_after_timer() {
        let mut tracker = SwipeTracker::default();
        tracker.handle(&event(TouchPhase::Began, (0.0, 0.0), (0.0, 0.0)), true);

        // Первый move взводит таймер и запоминает previous location
        assert_eq!(
            tracker.handle(&event(TouchPhase::Moved, (5.0, 0.0), (1.0, 0.0)), true),
            GestureSignal::Idle
        );
        assert!(tracker.swipe_armed());

        // Таймер ещё идёт
        tracker.tick(Duration::from_millis(50));
        assert_eq!(
            tracker.handle(&event(TouchPhase::Moved, (8.0, 0.0), (5.0, 0.0)), true),
            GestureSignal::Idle
        );

        tracker.tick(Duration::from_millis(60));
        assert_eq!(
            tracker.handle(&event(TouchPhase::Moved, (30.0, 4.0), (8.0, 0.0)), true),
            GestureSignal::Swing {
                from: Vec2::new(1.0, 0.0),
                to: Vec2::new(30.0, 4.0)
            }
        );
        assert!(!tracker.swipe_armed());

        // Следующий move перевзводит жест
        tracker.handle(&event(TouchPhase::Moved, (31.0, 4.0), (30.0, 4.0)), true);
        assert!(tracker.swipe_armed());
    }

    #[test]
    fn test_touch_up_cancels_swipe_without_attack() {
        let mut tracker = SwipeTracker::default();
        tracker.handle(&event(TouchPhase::Began, (0.0, 0.0), (0.0, 0.0)), true);
        tracker.handle(&event(TouchPhase::Moved, (5.0, 0.0), (0.0, 0.0)), true);
        tracker.tick(Duration::from_millis(200));

        assert_eq!(
            tracker.handle(&event(TouchPhase::Ended, (5.0, 0.0), (5.0, 0.0)), true),
            GestureSignal::Idle
        );
        assert!(!tracker.swipe_armed());
        assert!(!tracker.is_swiping());
        assert_eq!(tracker.touch_count(), 0);
        assert!(tracker.touch_locations().is_empty());
    }

    #[test]
    fn test_cancel_never_underflows() {
        let mut tracker = SwipeTracker::default();
        tracker.handle(&event(TouchPhase::Cancelled, (0.0, 0.0), (0.0, 0.0)), true);
        tracker.handle(&event(TouchPhase::Ended, (0.0, 0.0), (0.0, 0.0)), true);
        assert_eq!(tracker.touch_count(), 0);
    }
}
