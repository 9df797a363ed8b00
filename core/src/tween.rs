//! Handle-managed tweens advanced by the fixed simulation delta
//!
//! A tween interpolates a scalar from `from` to `to` over a duration of
//! simulated time through an easing function. Completed tweens hold their
//! end value until stopped, so game logic can read them in the same tick it
//! receives the completion event.

use crate::handle::{HandleTable, Token};

/// Easing curve mapping normalized time `0..=1` to progress.
pub type Easing = fn(f32) -> f32;

pub fn linear(t: f32) -> f32 {
    t
}

pub fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

pub fn ease_in_quad(t: f32) -> f32 {
    t * t
}

pub fn ease_out_quad(t: f32) -> f32 {
    t * (2.0 - t)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TweenId(Token);

#[derive(Debug)]
struct Tween {
    token: Token,
    from: f32,
    to: f32,
    duration: f32,
    elapsed: f32,
    easing: Easing,
    finished: bool,
}

impl Tween {
    fn value(&self) -> f32 {
        let t = if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        };
        self.from + (self.to - self.from) * (self.easing)(t)
    }
}

#[derive(Debug, Default)]
pub struct Tweens {
    handles: HandleTable,
    active: Vec<Tween>,
}

impl Tweens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, from: f32, to: f32, seconds: f32, easing: Easing) -> TweenId {
        let id = self.handles.alloc(self.active.len() as u32);
        let token = self.handles.to_token(id);
        self.active.push(Tween {
            token,
            from,
            to,
            duration: seconds.max(0.0),
            elapsed: 0.0,
            easing,
            finished: false,
        });
        TweenId(token)
    }

    fn get(&self, id: TweenId) -> Option<&Tween> {
        let index = self.handles.resolve(id.0)?;
        self.active.get(index as usize)
    }

    /// Current value, or `None` if the tween was stopped.
    pub fn value(&self, id: TweenId) -> Option<f32> {
        self.get(id).map(Tween::value)
    }

    pub fn is_finished(&self, id: TweenId) -> bool {
        self.get(id).is_none_or(|t| t.finished)
    }

    /// Stop and forget a tween. Returns `false` if it was already gone.
    pub fn stop(&mut self, id: TweenId) -> bool {
        let Some(handle) = self.handles.from_token(id.0) else {
            return false;
        };
        let Some(index) = self.handles.index_of(handle) else {
            return false;
        };
        let index = index as usize;
        self.active.swap_remove(index);
        if let Some(moved) = self.active.get(index)
            && let Some(moved_handle) = self.handles.from_token(moved.token)
        {
            self.handles.update_index(moved_handle, index as u32);
        }
        self.handles.release(handle);
        true
    }

    pub fn stop_all(&mut self) {
        self.active.clear();
        self.handles.clear();
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Advance every running tween by `dt` seconds, reporting those that
    /// completed during this step.
    pub fn advance(&mut self, dt: f32, finished: &mut Vec<TweenId>) {
        for tween in self.active.iter_mut().filter(|t| !t.finished) {
            tween.elapsed += dt;
            if tween.elapsed >= tween.duration {
                tween.elapsed = tween.duration;
                tween.finished = true;
                finished.push(TweenId(tween.token));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_linear_tween_reaches_end_in_duration() {
        let mut tweens = Tweens::new();
        let id = tweens.start(0.0, 60.0, 1.0, linear);
        let mut done = Vec::new();
        for _ in 0..30 {
            tweens.advance(DT, &mut done);
        }
        assert!((tweens.value(id).unwrap() - 30.0).abs() < 1e-3);
        assert!(done.is_empty());

        for _ in 0..31 {
            tweens.advance(DT, &mut done);
        }
        assert_eq!(done, vec![id]);
        assert_eq!(tweens.value(id), Some(60.0));
        assert!(tweens.is_finished(id));
    }

    #[test]
    fn test_easing_shapes_progress() {
        let mut tweens = Tweens::new();
        let eased = tweens.start(0.0, 1.0, 1.0, ease_in_quad);
        let mut done = Vec::new();
        for _ in 0..30 {
            tweens.advance(DT, &mut done);
        }
        assert!((tweens.value(eased).unwrap() - 0.25).abs() < 1e-3);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(ease_out_quad(1.0), 1.0);
    }

    #[test]
    fn test_stop_invalidates_only_target() {
        let mut tweens = Tweens::new();
        let a = tweens.start(0.0, 1.0, 1.0, linear);
        let b = tweens.start(5.0, 6.0, 1.0, linear);
        let c = tweens.start(7.0, 8.0, 1.0, linear);
        assert!(tweens.stop(a));
        assert!(!tweens.stop(a));
        assert_eq!(tweens.value(a), None);
        assert_eq!(tweens.value(b), Some(5.0));
        assert_eq!(tweens.value(c), Some(7.0));
        assert!(tweens.is_finished(a));
    }

    #[test]
    fn test_stop_all_clears() {
        let mut tweens = Tweens::new();
        let ids: Vec<_> = (0..4).map(|_| tweens.start(0.0, 1.0, 0.5, linear)).collect();
        tweens.stop_all();
        assert!(tweens.is_empty());
        assert!(ids.iter().all(|id| tweens.value(*id).is_none()));
    }

    #[test]
    fn test_zero_duration_finishes_on_first_step() {
        let mut tweens = Tweens::new();
        let id = tweens.start(1.0, 2.0, 0.0, linear);
        assert_eq!(tweens.value(id), Some(2.0));
        let mut done = Vec::new();
        tweens.advance(DT, &mut done);
        assert_eq!(done, vec![id]);
    }
}
