//! Frame-stepped position animation with cooperative cancellation.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval, sleep},
};

use super::sink::MotionSink;

/// Time between two rendered frames.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// CSS-style cubic Bézier timing curve through `(0,0)`, `(x1,y1)`, `(x2,y2)`, `(1,1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl CubicBezier {
    /// Curve from its two control points; `x` values must lie in `[0, 1]`.
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Eased progress for a linear progress `t` in `[0, 1]`.
    pub fn solve(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }

        // Newton first, bisection when the slope is too flat.
        let mut s = t;
        for _ in 0..8 {
            let error = bezier(self.x1, self.x2, s) - t;
            if error.abs() < 1e-7 {
                return bezier(self.y1, self.y2, s);
            }
            let slope = bezier_slope(self.x1, self.x2, s);
            if slope.abs() < 1e-6 {
                break;
            }
            s = (s - error / slope).clamp(0.0, 1.0);
        }

        let (mut lo, mut hi) = (0.0, 1.0);
        s = t;
        for _ in 0..40 {
            let x = bezier(self.x1, self.x2, s);
            if (x - t).abs() < 1e-7 {
                break;
            }
            if x < t {
                lo = s;
            } else {
                hi = s;
            }
            s = (lo + hi) / 2.0;
        }
        bezier(self.y1, self.y2, s)
    }
}

fn bezier(a1: f64, a2: f64, s: f64) -> f64 {
    let inv = 1.0 - s;
    3.0 * inv * inv * s * a1 + 3.0 * inv * s * s * a2 + s * s * s
}

fn bezier_slope(a1: f64, a2: f64, s: f64) -> f64 {
    let inv = 1.0 - s;
    3.0 * inv * inv * a1 + 6.0 * inv * s * (a2 - a1) + 3.0 * s * s * (1.0 - a2)
}

/// Timing function of a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Easing {
    /// Constant speed.
    Linear,
    /// Cubic Bézier curve.
    Curve(CubicBezier),
}

impl Easing {
    /// CSS `ease`.
    pub const EASE: Easing = Easing::Curve(CubicBezier::new(0.25, 0.1, 0.25, 1.0));
    /// CSS `ease-in-out`.
    pub const EASE_IN_OUT: Easing = Easing::Curve(CubicBezier::new(0.42, 0.0, 0.58, 1.0));
    /// Short shake used by the breakdown jitter.
    pub const JOLT: Easing = Easing::Curve(CubicBezier::new(0.36, 0.07, 0.19, 0.97));
    /// Fast start, long tail.
    pub const SETTLE: Easing = Easing::Curve(CubicBezier::new(0.25, 1.0, 0.5, 1.0));
    /// Slight overshoot past the target before coming back.
    pub const SPRING: Easing = Easing::Curve(CubicBezier::new(0.34, 1.56, 0.64, 1.0));

    /// Eased progress for a linear progress `t`.
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::Curve(curve) => curve.solve(t),
        }
    }
}

/// Position between `from` and `to` after `ratio` of the segment elapsed.
pub fn interpolate(from: f64, to: f64, ratio: f64, easing: Easing) -> f64 {
    from + (to - from) * easing.apply(ratio)
}

/// One leg of an animation: wait `delay`, then move to `to` over `duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Target offset.
    pub to: f64,
    /// Travel time; zero jumps straight to `to`.
    pub duration: Duration,
    /// Timing function.
    pub easing: Easing,
    /// Pause before the segment starts.
    pub delay: Duration,
}

impl Segment {
    /// Animated move to `to`.
    pub fn new(to: f64, duration: Duration, easing: Easing) -> Self {
        Self {
            to,
            duration,
            easing,
            delay: Duration::ZERO,
        }
    }

    /// Immediate jump to `to`.
    pub fn jump(to: f64) -> Self {
        Self::new(to, Duration::ZERO, Easing::Linear)
    }

    /// Same segment, started after `delay`.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Handle on a running playback.
pub struct Playback {
    handle: JoinHandle<bool>,
}

impl Playback {
    /// Wait for the playback; `false` when it was cancelled before its last frame.
    pub async fn finished(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}

/// Drives a sink through segments, one playback at a time.
///
/// Starting a playback or snapping bumps the epoch; a loop whose epoch is stale
/// stops before drawing its next frame.
#[derive(Clone)]
pub struct Animator {
    sink: Arc<dyn MotionSink>,
    epoch: Arc<AtomicU64>,
    frame: Arc<Mutex<()>>,
}

impl Animator {
    /// Animator drawing into `sink`.
    pub fn new(sink: Arc<dyn MotionSink>) -> Self {
        Self {
            sink,
            epoch: Arc::new(AtomicU64::new(0)),
            frame: Arc::new(Mutex::new(())),
        }
    }

    /// Sink the animator draws into.
    pub fn sink(&self) -> &Arc<dyn MotionSink> {
        &self.sink
    }

    /// Cancel the current playback and start `segments` from the drawn position.
    pub fn play(&self, segments: Vec<Segment>) -> Playback {
        let token = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let animator = self.clone();
        let handle = tokio::spawn(async move { animator.run(token, segments).await });
        Playback { handle }
    }

    /// Cancel the current playback and draw the car at `offset` at once.
    pub fn snap(&self, offset: f64) {
        let _frame = self.frame.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.sink.render(offset);
    }

    /// Draw a frame unless playback `token` was cancelled; returns whether it drew.
    fn draw(&self, token: u64, offset: f64) -> bool {
        let _frame = self.frame.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.epoch.load(Ordering::SeqCst) != token {
            return false;
        }
        self.sink.render(offset);
        true
    }

    fn is_current(&self, token: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == token
    }

    async fn run(&self, token: u64, segments: Vec<Segment>) -> bool {
        let mut ticker = interval(FRAME_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut from = self.sink.position();

        for segment in segments {
            if !segment.delay.is_zero() {
                sleep(segment.delay).await;
                if !self.is_current(token) {
                    return false;
                }
            }

            if segment.duration.is_zero() {
                if !self.draw(token, segment.to) {
                    return false;
                }
                from = segment.to;
                continue;
            }

            let started = Instant::now();
            let total = segment.duration.as_secs_f64();
            loop {
                ticker.tick().await;
                let ratio = (started.elapsed().as_secs_f64() / total).min(1.0);
                if !self.draw(token, interpolate(from, segment.to, ratio, segment.easing)) {
                    return false;
                }
                if ratio >= 1.0 {
                    break;
                }
            }
            from = segment.to;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::motion::sink::{HeadlessSink, TrackGeometry};

    #[test]
    fn interpolate_hits_both_ends() {
        for easing in [Easing::Linear, Easing::EASE, Easing::SPRING] {
            assert_eq!(interpolate(10.0, 110.0, 0.0, easing), 10.0);
            assert_eq!(interpolate(10.0, 110.0, 1.0, easing), 110.0);
        }
        assert_eq!(interpolate(0.0, 100.0, 0.25, Easing::Linear), 25.0);
        assert_eq!(interpolate(0.0, 100.0, 7.0, Easing::Linear), 100.0);
    }

    #[test]
    fn ease_in_out_is_symmetric() {
        let mid = Easing::EASE_IN_OUT.apply(0.5);
        assert!((mid - 0.5).abs() < 1e-4);
        let early = Easing::EASE_IN_OUT.apply(0.2);
        let late = Easing::EASE_IN_OUT.apply(0.8);
        assert!((early + late - 1.0).abs() < 1e-4);
    }

    #[test]
    fn spring_overshoots_before_settling() {
        let peak = (1..100)
            .map(|step| Easing::SPRING.apply(step as f64 / 100.0))
            .fold(f64::MIN, f64::max);
        assert!(peak > 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn playback_reaches_the_last_target() {
        let sink = Arc::new(HeadlessSink::new(TrackGeometry::default()));
        let animator = Animator::new(sink.clone());

        let done = animator
            .play(vec![
                Segment::new(200.0, Duration::from_millis(500), Easing::EASE),
                Segment::new(150.0, Duration::from_millis(100), Easing::Linear)
                    .after(Duration::from_millis(50)),
            ])
            .finished()
            .await;

        assert!(done);
        assert_eq!(sink.position(), 150.0);
        assert!(sink.frames() > 10);
    }

    #[tokio::test(start_paused = true)]
    async fn new_playback_cancels_the_previous_one() {
        let sink = Arc::new(HeadlessSink::new(TrackGeometry::default()));
        let animator = Animator::new(sink.clone());

        let first = animator.play(vec![Segment::new(
            900.0,
            Duration::from_secs(10),
            Easing::Linear,
        )]);
        sleep(Duration::from_millis(200)).await;
        let second = animator.play(vec![Segment::jump(42.0)]);

        assert!(!first.finished().await);
        assert!(second.finished().await);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.position(), 42.0);
    }

    #[tokio::test(start_paused = true)]
    async fn snap_stops_drawing_immediately() {
        let sink = Arc::new(HeadlessSink::new(TrackGeometry::default()));
        let animator = Animator::new(sink.clone());

        let playback = animator.play(vec![Segment::new(
            500.0,
            Duration::from_secs(2),
            Easing::Linear,
        )]);
        sleep(Duration::from_millis(300)).await;
        animator.snap(0.0);
        let frames = sink.frames();

        assert!(!playback.finished().await);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(sink.position(), 0.0);
        assert_eq!(sink.frames(), frames);
    }
}
