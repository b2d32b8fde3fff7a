//! Call a single tool.

use serde_json::Value;
use toolbridge_core::error::format_error_with_suggestion;
use toolbridge_core::{Error, Tool};
use toolbridge_mcp::{ClientRegistry, ToolAdapter};

use crate::AppContext;

/// Parse the optional JSON argument string; no arguments means `{}`.
fn parse_arguments(args: Option<&str>) -> Result<Value, Error> {
    let value: Value = match args {
        Some(args) if !args.trim().is_empty() => serde_json::from_str(args)?,
        _ => return Ok(Value::Object(Default::default())),
    };
    if !value.is_object() {
        return Err(Error::Tool("arguments must be a JSON object".to_string()));
    }
    Ok(value)
}

fn find<'a>(catalog: &'a [ToolAdapter], tool: &str, server: Option<&str>) -> Option<&'a ToolAdapter> {
    catalog
        .iter()
        .find(|t| t.name() == tool && server.map_or(true, |s| t.server_name() == s))
}

pub async fn run(
    ctx: &AppContext,
    tool: &str,
    args: Option<&str>,
    server: Option<&str>,
) -> anyhow::Result<()> {
    let arguments = parse_arguments(args)
        .map_err(|e| anyhow::anyhow!(format_error_with_suggestion(&e)))?;

    let registry = ClientRegistry::from_config(&ctx.config);
    let catalog = registry.start().await;

    let output = match find(&catalog, tool, server) {
        Some(adapter) => Ok(adapter.invoke(arguments).await),
        None => Err(Error::NotFound(tool.to_string())),
    };

    // Always release the servers before reporting
    registry.shutdown().await;

    let output = output.map_err(|e| anyhow::anyhow!(format_error_with_suggestion(&e)))?;
    let failed = output.is_error();
    println!("{}", serde_json::to_string_pretty(&output.into_value())?);

    if failed {
        anyhow::bail!("Tool call failed");
    }
    Ok(())
}
