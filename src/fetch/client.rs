use async_trait::async_trait;
use reqwest::{Request, Response};

/// The HTTP seam: anything that can execute a prepared request.
///
/// Wrappers such as [`crate::fetch::auth::UrlParam`] decorate an inner client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
