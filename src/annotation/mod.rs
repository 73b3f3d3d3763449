pub mod svg;
pub mod mask;
pub mod frame;
pub mod animation;

pub use mask::{build_mask_svg, show_results_bounding_boxes};
pub use frame::{place_rotating_frame, RotatingFrame};
pub use animation::{
    attach_rotating_frame, draw_image_with_rotating_bounding_box, AnimationState, FrameOverlayHandle,
};
