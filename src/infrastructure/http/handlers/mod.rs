//! HTTP Handlers

mod blueprint;
mod chapter;
mod generation;
mod ping;
mod session;
mod websocket;

pub use blueprint::*;
pub use chapter::*;
pub use generation::*;
pub use ping::*;
pub use session::*;
pub use websocket::*;
