//! Terminal user interface: view state, key bindings, frame rendering and
//! the loop tying them together.

pub mod downsample;
pub mod editor;
pub mod input;
pub mod monitor;
pub mod render;
pub mod view;

pub use input::{map_event, Action};
pub use monitor::{run, ChannelEvents, EventSource};
pub use render::{draw, FrameData, RenderError};
pub use view::{Control, PausePoint, ViewContext, ViewState};
