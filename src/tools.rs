//! Tool entry points: the operations exposed to the tool-calling client.

use log::debug;
use serde_json::Value;

use crate::client::{ApiRequest, ApiResponse, CubeTransport};
use crate::error::{classify_response, classify_transport, ErrorKind, ToolError};
use crate::meta::{parse_meta, CubeDescriptor};
use crate::query::{build_query, parse_load_response, FilterInput, QueryResult};

/// The analytics operations, generic over the transport so tests can
/// substitute a spy for the HTTP client.
pub struct CubeService<T> {
    transport: T,
    token_configured: bool,
}

impl<T: CubeTransport> CubeService<T> {
    pub fn new(transport: T, token_configured: bool) -> Self {
        Self {
            transport,
            token_configured,
        }
    }

    /// Fetch the remote schema and reshape it into cube descriptors.
    pub async fn list_cubes(&self) -> Result<Vec<CubeDescriptor>, ToolError> {
        let response = self.call(ApiRequest::get("meta")).await?;
        parse_meta(&response.body)
    }

    /// Run an aggregation query against one cube.
    pub async fn query_cube(
        &self,
        cube_name: &str,
        measures: Vec<String>,
        dimensions: Vec<String>,
        filters: Vec<FilterInput>,
    ) -> Result<QueryResult, ToolError> {
        let query = build_query(cube_name, measures, dimensions, filters)?;
        debug!("running query against cube {}", query.cube_name);

        let request = ApiRequest::get("load").with_query("query", query.encode()?);
        let response = self.call(request).await?;
        parse_load_response(&response.body)
    }

    /// Return the SQL Cube.js would generate for a query, without running it.
    pub async fn sql(
        &self,
        cube_name: &str,
        measures: Vec<String>,
        dimensions: Vec<String>,
        filters: Vec<FilterInput>,
    ) -> Result<Value, ToolError> {
        let query = build_query(cube_name, measures, dimensions, filters)?;
        debug!("requesting generated SQL for cube {}", query.cube_name);

        let request = ApiRequest::get("sql").with_query("query", query.encode()?);
        let response = self.call(request).await?;
        serde_json::from_str(&response.body).map_err(|e| {
            ToolError::new(
                ErrorKind::UnexpectedResponse,
                format!("could not parse the Cube.js sql response: {e}"),
            )
        })
    }

    /// Probe the deployment's readiness endpoint. Reports a status string
    /// rather than failing, so an unreachable server is still an answer.
    pub async fn health(&self) -> String {
        match self.transport.health().await {
            Ok(response) if response.status == 200 => "OK".to_string(),
            Ok(response) => format!("Unhealthy: {}", response.status),
            Err(err) => format!("Unreachable: {err}"),
        }
    }

    async fn call(&self, request: ApiRequest) -> Result<ApiResponse, ToolError> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| classify_transport(&e))?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(classify_response(&response, self.token_configured))
        }
    }
}
