use std::net::SocketAddr;
use std::sync::Arc;

use pith_core::Runtime;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes::router;
use crate::state::ApiState;

/// Binds `bind_addr` and serves the API until the process is killed.
pub async fn serve(bind_addr: &str, runtime: Arc<Runtime>) -> anyhow::Result<()> {
    let state = ApiState::new(runtime);
    let app = router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "pith-api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
