//! List configured MCP servers.

use toolbridge_mcp::ServerConfigSet;

use crate::AppContext;

pub fn run(ctx: &AppContext) -> anyhow::Result<()> {
    let path = ctx.config.servers_file();
    let set = ServerConfigSet::load(&path);

    println!("MCP servers ({}):", path.display());
    if set.is_empty() {
        println!("  (none)");
    }
    for server in set.servers() {
        let status = if server.disabled { " [disabled]" } else { "" };
        if server.args.is_empty() {
            println!("  {}{}: {}", server.name, status, server.command);
        } else {
            println!(
                "  {}{}: {} {}",
                server.name,
                status,
                server.command,
                server.args.join(" ")
            );
        }
        if !server.env.is_empty() {
            let mut keys: Vec<&str> = server.env.keys().map(String::as_str).collect();
            keys.sort_unstable();
            println!("    env: {}", keys.join(", "));
        }
    }

    if !set.rejected().is_empty() {
        println!("\nRejected:");
        for error in set.rejected() {
            println!("  ✗ {}", error);
        }
    }

    Ok(())
}
