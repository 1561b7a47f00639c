//! Connection state machine and the dispatcher that drives it

mod handle;
mod machine;
mod state;

pub use handle::ClientHandle;
pub use machine::{ClientParts, VoiceClient};
pub use state::{ClientStatus, ConnectionState, RenderEvent};
