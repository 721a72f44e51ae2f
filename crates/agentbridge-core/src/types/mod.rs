//! Wire types shared by the engine and the HTTP gateway.

mod event;
mod session;

pub use event::*;
pub use session::*;
