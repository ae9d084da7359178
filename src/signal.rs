use tracing::warn;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SignalTo {
    /// Stop issuing writes and let in-flight reconciles finish.
    Shutdown,
    /// Shutdown process immediately.
    Quit,
}

/// Resolves with the first termination signal the process receives.
#[cfg(unix)]
pub async fn signal() -> SignalTo {
    use futures::{
        FutureExt,
        future::{BoxFuture, select_all},
    };
    use tokio::signal::unix::{SignalKind, signal};

    let mut set: Vec<BoxFuture<'static, SignalTo>> = Vec::new();
    for (kind, to) in [
        (SignalKind::interrupt(), SignalTo::Shutdown),
        (SignalKind::terminate(), SignalTo::Shutdown),
        (SignalKind::quit(), SignalTo::Quit),
    ] {
        match signal(kind) {
            Ok(mut stream) => set.push(Box::pin(async move { stream.recv().map(|_| to).await })),
            Err(error) => warn!(message = "Could not install signal handler.", %error),
        }
    }
    if set.is_empty() {
        return futures::future::pending().await;
    }
    select_all(set).map(|(to, _, _)| to).await
}

#[cfg(not(unix))]
pub async fn signal() -> SignalTo {
    match tokio::signal::ctrl_c().await {
        Ok(()) => SignalTo::Shutdown,
        Err(error) => {
            warn!(message = "Could not install signal handler.", %error);
            futures::future::pending().await
        }
    }
}
