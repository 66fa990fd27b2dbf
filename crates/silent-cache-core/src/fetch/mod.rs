//! Fetchers: the asynchronous operations a query revalidates with.
//!
//! Any `Fn() -> impl Future<Output = Result<T, FetchError>>` closure is a
//! fetcher. [`JsonFetcher`] covers the common case of a JSON REST endpoint.

mod http;

pub use http::JsonFetcher;

use crate::error::FetchError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;

/// A zero-argument asynchronous operation producing a value of type `T`.
pub trait Fetcher<T>: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'static, Result<T, FetchError>>;
}

impl<T, F, Fut> Fetcher<T> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    fn fetch(&self) -> BoxFuture<'static, Result<T, FetchError>> {
        (self)().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_is_fetcher() {
        let fetcher = || async { Ok::<_, FetchError>(vec![1, 2, 3]) };
        assert_eq!(fetcher.fetch().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failing_closure() {
        let fetcher = || async { Err::<u8, _>(FetchError::network("network error")) };
        let err = fetcher.fetch().await.unwrap_err();
        assert_eq!(err.to_string(), "network error");
    }
}
