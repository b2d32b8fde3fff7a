//! Diagnostic command to check the configuration.

use toolbridge_core::Config;
use toolbridge_mcp::transport::resolve_command;
use toolbridge_mcp::ServerConfigSet;

use crate::AppContext;

pub fn run(ctx: &AppContext) -> anyhow::Result<()> {
    println!("Running diagnostics...\n");

    // Check config directory
    let config_dir = Config::config_dir();
    println!("Config directory: {:?}", config_dir);
    if config_dir.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist");
    }

    // Check settings
    println!("\nSettings:");
    if !ctx.config.client.enabled {
        println!("  ✗ MCP client is disabled (client.enabled = false)");
    }
    let validation = ctx.config.validate();
    if validation.issues.is_empty() {
        println!("  ✓ No issues");
    }
    for issue in validation.errors() {
        println!("  ✗ {}: {}", issue.field, issue.message);
    }
    for issue in validation.warnings() {
        println!("  ! {}: {}", issue.field, issue.message);
    }
    println!(
        "  Timeouts: handshake {}s, call {}, shutdown grace {}s",
        ctx.config.timeouts.handshake_secs,
        match ctx.config.timeouts.call_secs {
            0 => "disabled".to_string(),
            secs => format!("{}s", secs),
        },
        ctx.config.timeouts.shutdown_grace_secs
    );

    println!("\nEffective settings:");
    for line in ctx.config.to_toml()?.lines() {
        println!("  {}", line);
    }

    // Check servers file
    let path = ctx.config.servers_file();
    println!("\nServers file: {:?}", path);
    if path.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist (no servers will be started)");
    }

    let set = ServerConfigSet::load(&path);
    for error in set.rejected() {
        println!("  ✗ {}", error);
    }

    // Check that every command resolves, without spawning anything
    println!("\nServers:");
    if set.is_empty() {
        println!("  ✗ No servers configured");
    }
    for server in set.servers() {
        if server.disabled {
            println!("  - {} (disabled)", server.name);
            continue;
        }
        match resolve_command(&server.command, &server.env) {
            Ok(program) => println!("  ✓ {}: {}", server.name, program.display()),
            Err(e) => println!("  ✗ {}: {}", server.name, e),
        }
        if let Some(ref cwd) = server.cwd {
            if !cwd.is_dir() {
                println!("    ✗ working directory {:?} does not exist", cwd);
            }
        }
    }

    println!("\nDiagnostics complete.");
    Ok(())
}
