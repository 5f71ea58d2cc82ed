//! Static text routes.

/// GET / - Home page.
pub async fn home() -> &'static str {
    "home page"
}

/// GET /api - API root.
pub async fn api_root() -> &'static str {
    "api"
}
