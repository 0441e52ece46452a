pub mod gesture;
pub mod input;
pub mod session;

pub use gesture::{DragAction, DragConfig, DragPhase, DragStateMachine, ViewSize};
pub use input::{InputEvent, PointerButton};
pub use session::Session;
