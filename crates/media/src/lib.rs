//! `sv-media` - media capability providers for Surveyor.
//!
//! Provides the [`MediaProvider`] trait (one search backend), the
//! Unsplash image and Pexels video implementations, and [`MediaLookup`],
//! the timeout-bounded set the tool processor calls. A lookup never
//! fails; anything short of a result is "no media".
//!
//! | Kind    | Backend  | Credential                  |
//! |---------|----------|-----------------------------|
//! | `image` | Unsplash | `UNSPLASH_ACCESS_KEY`       |
//! | `video` | Pexels   | `PEXELS_API_KEY`            |

pub mod lookup;
pub mod pexels;
pub mod provider;
pub mod unsplash;

pub use lookup::MediaLookup;
pub use pexels::PexelsProvider;
pub use provider::{MediaProvider, Unconfigured};
pub use unsplash::UnsplashProvider;

use sv_domain::error::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
