pub mod config;
pub mod draft;
pub mod error;
pub mod events;
pub mod types;

pub use config::ConciergeConfig;
pub use draft::DraftText;
pub use error::{ConciergeError, Result};
pub use events::{EventBus, SessionEvent};
pub use types::*;
