pub mod acquire;
pub mod error;
pub mod plaintext;
pub mod simple_serial;
pub mod trace;

pub use acquire::{AcquireConfig, CaptureSettings, acquire, capture};
pub use error::{CaptureError, ParseError, SaveError};
pub use plaintext::random_plaintext;
pub use trace::{Capture, Trace};
