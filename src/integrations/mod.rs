//! Upstream service integrations.

pub mod fetcher {
    pub use crate::fetcher::*;
}

pub mod geocoding {
    pub use crate::geocoding::*;
}

pub mod score {
    pub use crate::score::*;
}

pub mod features {
    pub use crate::features::*;
}
