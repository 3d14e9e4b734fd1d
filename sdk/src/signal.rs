use {
    anyhow::{Context, Result},
    derive_more::Display,
    futures::{FutureExt, future::select},
    std::{future::Future, pin::pin},
    tokio_util::sync::CancellationToken,
    tracing::info,
};

#[derive(Debug, Display)]
pub enum ShutdownSignal {
    Sigint,
    Sigterm,
}

/// Installs SIGINT and SIGTERM handlers.
///
/// The returned future resolves when the process receives either signal.
#[inline]
pub fn shutdown_signal() -> Result<impl Future<Output = ShutdownSignal>> {
    let sigint = sigint().context("failed to install sigint signal handler")?;
    let sigterm = sigterm().context("failed to install sigterm signal handler")?;
    Ok(async move {
        let sigint = pin!(sigint.map(|()| ShutdownSignal::Sigint));
        let sigterm = pin!(sigterm.map(|()| ShutdownSignal::Sigterm));
        let (signal, _unfired_signal) = select(sigint, sigterm).await.factor_first();
        signal
    })
}

/// Cancels `token` on the first shutdown signal.
///
/// Handlers are installed before this returns. Waiting happens in a
/// background task that also ends once `token` is cancelled elsewhere.
#[inline]
pub fn cancel_on_shutdown(token: CancellationToken) -> Result<()> {
    let signal = shutdown_signal()?;
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            signal = signal => {
                info!(%signal, "shutting down");
                token.cancel();
            }
        }
    });
    Ok(())
}

#[cfg(target_family = "unix")]
fn sigint() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        sigint.recv().await;
    })
}

#[cfg(target_family = "windows")]
fn sigint() -> Result<impl Future<Output = ()>> {
    let mut sigint = tokio::signal::windows::ctrl_c()?;
    Ok(async move {
        sigint.recv().await;
    })
}

fn sigterm() -> Result<impl Future<Output = ()>> {
    #[cfg(target_family = "unix")]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        Ok(async move {
            sigterm.recv().await;
        })
    }

    #[cfg(not(target_family = "unix"))]
    Ok(std::future::pending())
}

#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration, tokio::time::sleep};

    #[tokio::test]
    async fn handlers_install_without_cancelling() {
        let token = CancellationToken::new();
        cancel_on_shutdown(token.clone()).unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled());
        token.cancel();
    }
}
