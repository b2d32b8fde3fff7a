//! Minimal MCP server speaking newline-delimited JSON-RPC on stdio.
//!
//! Tools:
//! - `echo {text}`: returns the text, after emitting a log notification
//! - `add {a, b}`: returns the sum; non-numeric arguments are rejected
//! - `sleep {ms}`: waits, then returns "slept"
//! - `env {name}`: returns the value of an environment variable
//!
//! Flags change its behaviour for failure scenarios:
//! `--no-tools`, `--fail-handshake`, `--hang-handshake`, `--exit-on-start`,
//! `--fail-list`, `--page-size N`, `--pid-file PATH`.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use serde_json::{json, Value};

#[derive(Default)]
struct Options {
    no_tools: bool,
    fail_handshake: bool,
    hang_handshake: bool,
    exit_on_start: bool,
    fail_list: bool,
    page_size: Option<usize>,
    pid_file: Option<String>,
}

impl Options {
    fn from_args() -> Self {
        let mut options = Self::default();
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--no-tools" => options.no_tools = true,
                "--fail-handshake" => options.fail_handshake = true,
                "--hang-handshake" => options.hang_handshake = true,
                "--exit-on-start" => options.exit_on_start = true,
                "--fail-list" => options.fail_list = true,
                "--page-size" => options.page_size = args.next().and_then(|n| n.parse().ok()),
                "--pid-file" => options.pid_file = args.next(),
                other => eprintln!("echo-server: ignoring unknown flag {}", other),
            }
        }
        options
    }
}

fn tools() -> Vec<Value> {
    vec![
        json!({
            "name": "echo",
            "description": "Echo the given text",
            "inputSchema": {
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }
        }),
        json!({
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }
        }),
        json!({
            "name": "sleep",
            "inputSchema": {
                "type": "object",
                "properties": {"ms": {"type": "integer"}}
            }
        }),
        json!({
            "name": "env",
            "description": "",
            "inputSchema": {
                "type": "object",
                "properties": {"name": {"type": "string"}}
            }
        }),
    ]
}

fn text_result(text: impl Into<String>, is_error: bool) -> Value {
    json!({"content": [{"type": "text", "text": text.into()}], "isError": is_error})
}

fn invalid_params(message: &str) -> Result<Value, (i64, String)> {
    Err((-32602, format!("Invalid params: {}", message)))
}

fn list_tools(options: &Options, params: &Value) -> Result<Value, (i64, String)> {
    if options.fail_list {
        return Err((-32603, "tool listing is broken".to_string()));
    }
    let all = if options.no_tools { Vec::new() } else { tools() };

    let Some(page_size) = options.page_size.filter(|n| *n > 0) else {
        return Ok(json!({"tools": all}));
    };
    let start: usize = params["cursor"]
        .as_str()
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let end = (start + page_size).min(all.len());
    let page: Vec<Value> = all.get(start..end).map(<[Value]>::to_vec).unwrap_or_default();

    if end < all.len() {
        Ok(json!({"tools": page, "nextCursor": end.to_string()}))
    } else {
        Ok(json!({"tools": page}))
    }
}

fn call_tool(params: &Value, out: &mut impl Write) -> io::Result<Result<Value, (i64, String)>> {
    let arguments = &params["arguments"];
    let result = match params["name"].as_str() {
        Some("echo") => match arguments["text"].as_str() {
            Some(text) => {
                send(
                    out,
                    &json!({
                        "jsonrpc": "2.0",
                        "method": "notifications/message",
                        "params": {"level": "info", "data": "echoing"}
                    }),
                )?;
                Ok(text_result(text, false))
            }
            None => invalid_params("'text' must be a string"),
        },
        Some("add") => match (arguments["a"].as_f64(), arguments["b"].as_f64()) {
            (Some(a), Some(b)) => Ok(text_result((a + b).to_string(), false)),
            _ => invalid_params("'a' and 'b' must be numbers"),
        },
        Some("sleep") => {
            let ms = arguments["ms"].as_u64().unwrap_or(0);
            std::thread::sleep(Duration::from_millis(ms));
            Ok(text_result("slept", false))
        }
        Some("env") => {
            let name = arguments["name"].as_str().unwrap_or_default();
            match std::env::var(name) {
                Ok(value) => Ok(text_result(value, false)),
                Err(_) => Ok(text_result(format!("{} is not set", name), true)),
            }
        }
        Some(other) => Err((-32602, format!("Unknown tool: {}", other))),
        None => invalid_params("missing tool name"),
    };
    Ok(result)
}

fn send(out: &mut impl Write, message: &Value) -> io::Result<()> {
    writeln!(out, "{}", message)?;
    out.flush()
}

fn main() -> io::Result<()> {
    let options = Options::from_args();

    if let Some(path) = &options.pid_file {
        std::fs::write(path, std::process::id().to_string())?;
    }
    if options.exit_on_start {
        return Ok(());
    }

    let stdin = io::stdin();
    let mut out = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            eprintln!("echo-server: unparseable line");
            continue;
        };
        // Notifications and replies to our own messages need no answer
        let (Some(id), Some(method)) = (message.get("id").cloned(), message["method"].as_str())
        else {
            continue;
        };

        let params = &message["params"];
        let result = match method {
            "initialize" if options.hang_handshake => continue,
            "initialize" if options.fail_handshake => {
                Err((-32603, "handshake refused".to_string()))
            }
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "echo-server", "version": "0.1.0"}
            })),
            "tools/list" => list_tools(&options, params),
            "tools/call" => call_tool(params, &mut out)?,
            "ping" => Ok(json!({})),
            other => Err((-32601, format!("Method not found: {}", other))),
        };

        let reply = match result {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err((code, message)) => {
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
            }
        };
        send(&mut out, &reply)?;
    }

    Ok(())
}
