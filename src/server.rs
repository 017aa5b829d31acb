//! The MCP surface: registers the tools and serves them over stdio.

use log::{error, info};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::schemars::{self, JsonSchema};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use serde::Deserialize;
use serde::Serialize;

use crate::client::{HttpTransport, TransportError};
use crate::config::CubeApiConfig;
use crate::error::ToolError;
use crate::query::FilterInput;
use crate::tools::CubeService;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryCubeParams {
    /// Name of the cube to query, as reported by list_cubes.
    pub cube: String,
    /// Fully qualified measure names, e.g. "Orders.count".
    #[serde(default)]
    pub measures: Vec<String>,
    /// Fully qualified dimension names to group by, e.g. "Orders.status".
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Filter clauses of the form "<member> <op> <value>", e.g.
    /// "Orders.status = shipped". Operators: = != > < >= <= contains in.
    /// An "in" value is a comma-separated list.
    #[serde(default)]
    pub filters: Option<Vec<String>>,
}

impl QueryCubeParams {
    fn filter_inputs(&self) -> Vec<FilterInput> {
        self.filters
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(FilterInput::Raw)
            .collect()
    }
}

/// Serialize an outcome into the tool result the client sees. Successes are
/// pretty-printed JSON; failures carry the serialized classification so the
/// client can read the kind and the retryable hint.
fn tool_result<T: Serialize>(outcome: Result<T, ToolError>) -> CallToolResult {
    match outcome {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => CallToolResult::success(vec![Content::text(text)]),
            Err(e) => CallToolResult::error(vec![Content::text(format!(
                "failed to serialize the result: {e}"
            ))]),
        },
        Err(tool_error) => {
            let text = serde_json::to_string_pretty(&tool_error)
                .unwrap_or_else(|_| tool_error.to_string());
            CallToolResult::error(vec![Content::text(text)])
        }
    }
}

pub struct CubeMcpServer {
    service: CubeService<HttpTransport>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CubeMcpServer {
    pub fn new(config: &CubeApiConfig) -> Result<Self, TransportError> {
        let token_configured = config.api_token.is_some();
        let transport = HttpTransport::new(config)?;

        Ok(Self {
            service: CubeService::new(transport, token_configured),
            tool_router: Self::tool_router(),
        })
    }

    #[tool(
        description = "List every cube in the Cube.js schema with its measures, dimensions, and segments. Member names are fully qualified as <Cube>.<field>."
    )]
    async fn list_cubes(&self) -> Result<CallToolResult, McpError> {
        Ok(tool_result(self.service.list_cubes().await))
    }

    #[tool(
        description = "Run an aggregation query against one cube. Returns the result rows plus an annotation describing each returned member."
    )]
    async fn query_cube(
        &self,
        params: Parameters<QueryCubeParams>,
    ) -> Result<CallToolResult, McpError> {
        let Parameters(params) = params;
        let filters = params.filter_inputs();
        Ok(tool_result(
            self.service
                .query_cube(&params.cube, params.measures, params.dimensions, filters)
                .await,
        ))
    }

    #[tool(
        description = "Return the SQL that Cube.js would generate for a query, without executing it."
    )]
    async fn get_sql(
        &self,
        params: Parameters<QueryCubeParams>,
    ) -> Result<CallToolResult, McpError> {
        let Parameters(params) = params;
        let filters = params.filter_inputs();
        Ok(tool_result(
            self.service
                .sql(&params.cube, params.measures, params.dimensions, filters)
                .await,
        ))
    }

    #[tool(description = "Check whether the Cube.js deployment is up and ready to serve queries.")]
    async fn check_health(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            self.service.health().await,
        )]))
    }
}

#[tool_handler]
impl ServerHandler for CubeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Query a Cube.js analytics deployment. Call list_cubes first to discover \
                 the schema, then query_cube with fully qualified member names."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

impl CubeMcpServer {
    /// Serve the tools over stdio until the client disconnects.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Serving Cube.js tools over stdio");

        let service = self.serve(rmcp::transport::stdio()).await.map_err(|e| {
            error!("Failed to start serving: {}", e);
            e
        })?;
        service.waiting().await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn success_result_is_pretty_json_text() {
        let result = tool_result(Ok(serde_json::json!({"name": "Orders"})));
        assert_ne!(result.is_error, Some(true));
    }

    #[test]
    fn failure_result_carries_the_classification() {
        let result = tool_result::<()>(Err(ToolError::invalid_query(
            "cube name must not be empty",
        )));
        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn filters_default_to_empty() {
        let params: QueryCubeParams =
            serde_json::from_str(r#"{"cube": "Orders", "measures": ["Orders.count"]}"#).unwrap();
        assert!(params.filter_inputs().is_empty());
        assert!(params.dimensions.is_empty());
    }
}
