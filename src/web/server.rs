//! hyper accept loop.

use super::{handle, AppContext};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Serve connections from `listener` until `shutdown` resolves.
///
/// Each connection runs on its own task; a failing connection is logged and
/// does not affect the others. Accept errors are logged and the loop keeps
/// going.
pub async fn serve(listener: TcpListener, ctx: Arc<AppContext>, shutdown: impl Future<Output = ()>) {
    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    log::warn!("accept failed: {}", e);
                    continue;
                },
            },
            _ = &mut shutdown => {
                log::info!("shutting down");
                return;
            },
        };

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let ctx = Arc::clone(&ctx);
                async move { Ok::<_, Infallible>(handle(ctx, req).await) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                log::debug!("connection from {} ended with error: {}", peer, e);
            }
        });
    }
}
