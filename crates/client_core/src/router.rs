use shared::protocol::Route;
use tracing::debug;

/// Monotonic tag on every navigation; only the latest one may update the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NavigationToken(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub token: NavigationToken,
    pub route: Route,
}

#[derive(Debug, Default)]
pub struct Router {
    latest: u64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a location fragment to a route and tags it. Re-entering the same
    /// fragment issues a fresh request.
    pub fn issue(&mut self, fragment: &str) -> RouteRequest {
        self.latest += 1;
        let request = RouteRequest {
            token: NavigationToken(self.latest),
            route: Route::from_fragment(fragment),
        };
        debug!(token = self.latest, route = ?request.route, "issued navigation");
        request
    }

    pub fn is_current(&self, token: NavigationToken) -> bool {
        token.0 == self.latest
    }
}
