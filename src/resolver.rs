use crate::error::Result;
use url::Url;

/// DestinationResolver tells an HTTP client which proxy to use for a destination
pub trait DestinationResolver {
    /// resolve returns the proxy URL that requests for `destination` should go through
    fn resolve(&self, destination: &Url) -> Result<Url>;

    /// is_bypassed reports whether `host` should be reached directly instead
    fn is_bypassed(&self, host: &Url) -> bool;
}
