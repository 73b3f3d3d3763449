/// Rotating-frame animation loop
///
/// Each overlay owns its `AnimationState`; speed depends on wall time only, so the
/// redraw interval changes smoothness but never the rotation speed.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::page::{FramePlacement, Page};
use super::frame::{place_rotating_frame, RotatingFrame};

/// Overlay id used for the frame drawn over the result image
pub const RESULT_FRAME_ID: &str = "imgResult-frame";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationState {
    /// Position of the band in [0, 1)
    pub fraction_rotate: f64,
    pub last_timestamp: Option<Instant>,
}

impl AnimationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// First call only records the timestamp, later calls advance by elapsed / period.
    pub fn advance(&mut self, now: Instant, loop_period: Duration) -> f64 {
        if let Some(last) = self.last_timestamp {
            let elapsed = now.saturating_duration_since(last);
            if !loop_period.is_zero() {
                let increment = elapsed.as_secs_f64() / loop_period.as_secs_f64();
                self.fraction_rotate = wrap_fraction(self.fraction_rotate + increment);
            }
        }
        self.last_timestamp = Some(now);
        self.fraction_rotate
    }
}

/// Wraps by subtracting one so the sub-1.0 remainder is kept. Only a stall longer than a
/// whole period needs the fractional part.
pub fn wrap_fraction(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        return 0.0;
    }
    let mut wrapped = value;
    if wrapped >= 1.0 {
        wrapped -= 1.0;
    }
    if wrapped >= 1.0 {
        wrapped = wrapped.fract();
    }
    wrapped
}

/// Running animation attached to a page overlay. Dropping the handle stops the loop and
/// removes the overlay, unless a later attach has already replaced it.
pub struct FrameOverlayHandle {
    id: String,
    owner: u64,
    page: Arc<Mutex<Page>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    fraction: watch::Receiver<f64>,
}

impl FrameOverlayHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fraction used by the most recent redraw
    pub fn fraction(&self) -> f64 {
        *self.fraction.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stops the loop and waits for it before removing the overlay
    pub async fn detach(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("Frame loop for '{}' ended abnormally: {}", self.id, e);
            }
        }
        // Drop removes the overlay
    }
}

impl Drop for FrameOverlayHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Ok(mut page) = self.page.lock() {
            page.remove_owned_overlay(&self.id, self.owner);
        }
    }
}

/// Adds a frame overlay to the page and starts redrawing it every `frame_interval`.
/// Must be called inside a tokio runtime.
pub fn attach_rotating_frame(
    page: Arc<Mutex<Page>>,
    id: &str,
    placement: FramePlacement,
    frame: RotatingFrame,
    loop_period: Duration,
    frame_interval: Duration,
) -> FrameOverlayHandle {
    let owner = page.lock().unwrap().set_overlay(id, placement);

    let cancel = CancellationToken::new();
    let (fraction_tx, fraction_rx) = watch::channel(0.0);

    let task = tokio::spawn(run_frame_loop(
        Arc::clone(&page),
        id.to_string(),
        owner,
        frame,
        loop_period,
        frame_interval,
        cancel.clone(),
        fraction_tx,
    ));

    debug!("Attached rotating frame '{}' ({}x{})", id, placement.width, placement.height);

    FrameOverlayHandle {
        id: id.to_string(),
        owner,
        page,
        cancel,
        task: Some(task),
        fraction: fraction_rx,
    }
}

async fn run_frame_loop(
    page: Arc<Mutex<Page>>,
    id: String,
    owner: u64,
    frame: RotatingFrame,
    loop_period: Duration,
    frame_interval: Duration,
    cancel: CancellationToken,
    fraction_tx: watch::Sender<f64>,
) {
    let mut state = AnimationState::new();
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let markup = frame.svg(state.fraction_rotate);
                let attached = page.lock().unwrap().update_overlay(&id, owner, markup);
                if !attached {
                    debug!("Overlay '{}' removed or replaced, stopping frame loop", id);
                    break;
                }

                let now = tokio::time::Instant::now().into_std();
                let fraction = state.advance(now, loop_period);
                let _ = fraction_tx.send(fraction);
            }
        }
    }
}

/// Shows `image_src` in the result image and animates a frame around the
/// `[left, top, right, bottom]` box, in displayed pixels.
pub fn draw_image_with_rotating_bounding_box(
    page: &Arc<Mutex<Page>>,
    image_src: &str,
    bbox: [f64; 4],
    config: &Config,
) -> Result<FrameOverlayHandle, String> {
    let [left, top, right, bottom] = bbox;
    let frame = RotatingFrame::new(right - left, bottom - top);

    let placement = {
        let mut page = page.lock().unwrap();
        let image = page.result_image.as_mut()
            .ok_or_else(|| "No result image to draw on".to_string())?;
        if !image.is_laid_out() {
            return Err("Result image is not laid out".to_string());
        }
        image.src = image_src.to_string();
        image.visible = true;
        place_rotating_frame(image, bbox, frame.line_width)
    };

    Ok(attach_rotating_frame(
        Arc::clone(page),
        RESULT_FRAME_ID,
        placement,
        frame,
        config.animation_loop,
        config.frame_interval,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ImageElement;

    const LOOP: Duration = Duration::from_millis(5000);

    fn placement() -> FramePlacement {
        FramePlacement { top: 0.0, right: 0.0, width: 100.0, height: 100.0 }
    }

    #[test]
    fn test_wrap_keeps_remainder() {
        let mut state = AnimationState { fraction_rotate: 0.9, last_timestamp: None };
        let start = Instant::now();
        assert_eq!(state.advance(start, LOOP), 0.9);

        let fraction = state.advance(start + Duration::from_millis(1500), LOOP);
        assert!((fraction - 0.2).abs() < 1e-9, "got {fraction}");
    }

    #[test]
    fn test_long_stall_stays_in_range() {
        assert!((wrap_fraction(3.25) - 0.25).abs() < 1e-9);
        assert_eq!(wrap_fraction(1.0), 0.0);
        assert_eq!(wrap_fraction(f64::NAN), 0.0);
    }

    #[test]
    fn test_speed_independent_of_step() {
        let start = Instant::now();
        let mut fast = AnimationState::new();
        let mut slow = AnimationState::new();
        fast.advance(start, LOOP);
        slow.advance(start, LOOP);

        for i in 1..=20 {
            fast.advance(start + Duration::from_millis(50 * i), LOOP);
        }
        for i in 1..=10 {
            slow.advance(start + Duration::from_millis(100 * i), LOOP);
        }
        assert!((fast.fraction_rotate - slow.fraction_rotate).abs() < 1e-9);
        assert!((fast.fraction_rotate - 0.2).abs() < 1e-9);
    }

    async fn fraction_after(frame_interval: Duration, elapsed: Duration) -> f64 {
        let page = Arc::new(Mutex::new(Page::new()));
        let handle = attach_rotating_frame(
            Arc::clone(&page), "frame", placement(), RotatingFrame::new(100.0, 100.0), LOOP, frame_interval);
        tokio::time::sleep(elapsed).await;
        let fraction = handle.fraction();
        handle.detach().await;
        fraction
    }

    #[tokio::test(start_paused = true)]
    async fn test_halving_tick_rate_keeps_angular_speed() {
        let fast = fraction_after(Duration::from_millis(50), Duration::from_millis(1025)).await;
        let slow = fraction_after(Duration::from_millis(100), Duration::from_millis(1025)).await;
        assert!((fast - 0.2).abs() < 1e-9, "fast {fast}");
        assert!((slow - 0.2).abs() < 1e-9, "slow {slow}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlays_do_not_share_state() {
        let page = Arc::new(Mutex::new(Page::new()));
        let interval = Duration::from_millis(50);
        let first = attach_rotating_frame(
            Arc::clone(&page), "a", placement(), RotatingFrame::new(100.0, 100.0), LOOP, interval);
        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = attach_rotating_frame(
            Arc::clone(&page), "b", placement(), RotatingFrame::new(100.0, 100.0), LOOP, interval);
        tokio::time::sleep(Duration::from_millis(525)).await;

        assert!((first.fraction() - 0.2).abs() < 1e-9);
        assert!((second.fraction() - 0.1).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_removes_overlay() {
        let page = Arc::new(Mutex::new(Page::new()));
        let handle = attach_rotating_frame(
            Arc::clone(&page), "frame", placement(), RotatingFrame::new(100.0, 100.0), LOOP, Duration::from_millis(16));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_running());
        assert!(page.lock().unwrap().overlay("frame").unwrap().markup.starts_with("<svg"));

        handle.detach().await;
        assert!(page.lock().unwrap().overlay("frame").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_when_overlay_removed() {
        let page = Arc::new(Mutex::new(Page::new()));
        let handle = attach_rotating_frame(
            Arc::clone(&page), "frame", placement(), RotatingFrame::new(100.0, 100.0), LOOP, Duration::from_millis(16));
        page.lock().unwrap().remove_overlay("frame");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_draw_requires_laid_out_image() {
        let page = Arc::new(Mutex::new(Page::new()));
        let config = Config::default();
        assert!(draw_image_with_rotating_bounding_box(&page, "a.png", [0.0, 0.0, 10.0, 10.0], &config).is_err());

        let mut hidden = ImageElement::new("old.png", 0.0, 0.0, 640.0, 480.0);
        hidden.visible = false;
        page.lock().unwrap().result_image = Some(hidden.clone());
        assert!(draw_image_with_rotating_bounding_box(&page, "a.png", [0.0, 0.0, 10.0, 10.0], &config).is_err());
        assert_eq!(page.lock().unwrap().result_image, Some(hidden));

        page.lock().unwrap().result_image = Some(ImageElement::new("old.png", 640.0, 480.0, 640.0, 480.0));
        let handle = draw_image_with_rotating_bounding_box(&page, "a.png", [10.0, 20.0, 110.0, 220.0], &config).unwrap();
        {
            let page = page.lock().unwrap();
            assert_eq!(page.result_image.as_ref().unwrap().src, "a.png");
            let overlay = page.overlay(RESULT_FRAME_ID).unwrap();
            assert_eq!(overlay.placement.right, 640.0 - 110.0 - 20.0);
        }
        handle.detach().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_redraw_supersedes_previous_frame() {
        let page = Arc::new(Mutex::new(Page::new()));
        page.lock().unwrap().result_image = Some(ImageElement::new("old.png", 640.0, 480.0, 640.0, 480.0));
        let config = Config::default();

        let first = draw_image_with_rotating_bounding_box(&page, "a.png", [0.0, 0.0, 100.0, 100.0], &config).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let second = draw_image_with_rotating_bounding_box(&page, "b.png", [0.0, 0.0, 100.0, 100.0], &config).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!first.is_running());
        assert!(second.is_running());

        drop(first);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(page.lock().unwrap().overlay(RESULT_FRAME_ID).is_some());
        assert!(second.is_running());
        assert!(second.fraction() > 0.0);

        second.detach().await;
        assert!(page.lock().unwrap().overlay(RESULT_FRAME_ID).is_none());
    }
}
