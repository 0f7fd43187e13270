//! Stdio transport: one MCP session for the lifetime of the process.

use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::{error, info};

use crate::errors::GatewayError;
use crate::session::mcp::ProfileMcpHandler;

/// Serve a single profile over stdin/stdout until the peer closes the
/// stream. Logging must already be routed to stderr.
pub async fn serve(handler: ProfileMcpHandler) -> Result<(), GatewayError> {
    info!("starting MCP session on stdio");
    let service = handler
        .serve(stdio())
        .await
        .inspect_err(|e| error!("stdio serving error: {e:?}"))
        .map_err(|e| GatewayError::Internal(format!("failed to start stdio session: {e}")))?;
    service
        .waiting()
        .await
        .map_err(|e| GatewayError::Internal(format!("stdio session failed: {e}")))?;
    Ok(())
}
