//! Start every server and print the catalog.

use toolbridge_core::Tool;
use toolbridge_mcp::ClientRegistry;

use crate::AppContext;

pub async fn run(ctx: &AppContext, schema: bool) -> anyhow::Result<()> {
    let registry = ClientRegistry::from_config(&ctx.config);
    let catalog = registry.start().await;

    if catalog.is_empty() {
        println!("No tools available.");
    }
    for tool in &catalog {
        println!("{} ({})", tool.name(), tool.server_name());
        println!("  {}", tool.description());
        if schema {
            let rendered = serde_json::to_string_pretty(tool.input_schema())
                .unwrap_or_else(|_| tool.input_schema().to_string());
            for line in rendered.lines() {
                println!("    {}", line);
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}
