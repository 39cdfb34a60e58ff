//! Rate limiting logic.

mod backend;
mod clock;
mod factory;
mod sliding_window;
mod window;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use factory::build_limiter;
pub use sliding_window::{Admission, SlidingWindowLimiter};
pub use window::{
    BucketKey, WindowConfig, DEFAULT_LIMIT, DEFAULT_WINDOW_SIZE_SECS, KEY_SEPARATOR,
    MAX_WINDOW_SIZE_SECS,
};
