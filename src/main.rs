use cubejs_mcp::config::CubeApiConfig;
use cubejs_mcp::CubeMcpServer;
use log::error;

#[tokio::main]
pub async fn main() {
    env_logger::init();
    let config = CubeApiConfig::new()
        .map_err(|e| {
            error!("Failed to initialize config: {}", e);
            e
        })
        .unwrap();
    let server = CubeMcpServer::new(&config)
        .map_err(|e| {
            error!("Failed to create the Cube.js transport: {}", e);
            e
        })
        .unwrap();
    if let Err(e) = server.run().await {
        error!("Server terminated with an error: {}", e);
        std::process::exit(1);
    }
}
