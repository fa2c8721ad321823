//! Shared plumbing for the EASM client: local key/value persistence,
//! connection resolution, and failure normalization.

pub mod connect;
pub mod error;
pub mod store;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }
}
