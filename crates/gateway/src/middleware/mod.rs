//! Request middleware: sessions, the subscription gate, rate limiting and metrics

pub mod metrics;
pub mod rate_limit;
pub mod session;
pub mod subscription;

pub use session::CurrentAccount;

/// JSON API paths answer with status codes; everything else is a page
pub(crate) fn is_api_path(path: &str) -> bool {
    path.starts_with("/api/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_api_path() {
        assert!(is_api_path("/api/ai-assist"));
        assert!(!is_api_path("/dashboard"));
        assert!(!is_api_path("/apinotes"));
    }
}
