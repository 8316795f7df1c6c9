//! The interactive client: a small REPL that asks the name service for
//! metadata and moves block bytes directly to and from data nodes.

mod api_client;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Parser;
use common::message::{Action, ClientResponse, NodeAddr};
use common::settings::ClusterSettings;

const USAGE: &str = "mkdir <path>\nrmdir <path>\nrm <path>\nins <outside_path> <fs_path>\ncat <path>\nls <path>\nhelp\nexit";

#[derive(Parser)]
struct Args {
    /// Name service address as host:port, overriding the cluster default.
    #[arg(long)]
    namenode: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = ClusterSettings::default();
    let namenode = match args.namenode {
        Some(spec) => parse_addr(&spec)?,
        None => settings.namenode_addr.clone(),
    };

    let stdin = io::stdin();
    loop {
        print!("$ ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            println!("Error: no command");
            continue;
        }
        match words[0] {
            "exit" => break,
            "help" => println!("{USAGE}"),
            "mkdir" | "rmdir" | "rm" => {
                if words.len() < 2 {
                    println!("Usage: {} <path>", words[0]);
                    continue;
                }
                let action = match words[0] {
                    "mkdir" => Action::Mkdir,
                    "rmdir" => Action::Rmdir,
                    _ => Action::Rm,
                };
                mutate(&namenode, action, words[1], &settings).await;
            }
            "ins" => {
                if words.len() < 3 {
                    println!("Usage: ins <outside_path> <fs_path>");
                    continue;
                }
                ins(&namenode, words[1], words[2], &settings).await;
            }
            "ls" => {
                if words.len() < 2 {
                    println!("Usage: ls <path>");
                    continue;
                }
                ls(&namenode, words[1], &settings).await;
            }
            "cat" => {
                if words.len() < 2 {
                    println!("Usage: cat <path>");
                    continue;
                }
                cat(&namenode, words[1], &settings).await;
            }
            unknown => println!("Unknown command: {unknown}"),
        }
    }
    Ok(())
}

/// One round trip for the commands that only touch the namespace.
async fn mutate(namenode: &NodeAddr, action: Action, path: &str, settings: &ClusterSettings) {
    match api_client::name_command(namenode, action, path, settings.idle_timeout).await {
        Ok(response) if response.success => println!("Success"),
        Ok(response) => print_failure(&response),
        Err(e) => println!("{e}"),
    }
}

/// Reads a local file and pushes it into the cluster: the name service
/// assigns the block and the pipeline, the client feeds the first node.
async fn ins(namenode: &NodeAddr, outside_path: &str, fs_path: &str, settings: &ClusterSettings) {
    let bytes = match std::fs::read(outside_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("{outside_path}: {e}");
            return;
        }
    };
    let response =
        match api_client::name_command(namenode, Action::Ins, fs_path, settings.idle_timeout).await
        {
            Ok(response) => response,
            Err(e) => {
                println!("{e}");
                return;
            }
        };
    if !response.success {
        print_failure(&response);
        return;
    }
    let (Some(block_id), Some(datanodes)) = (response.block_id, response.datanodes) else {
        println!("Error: malformed ins response");
        return;
    };
    let Some((first, rest)) = datanodes.split_first() else {
        println!("Error: no datanodes returned");
        return;
    };
    match api_client::push_block(first, &block_id, rest, &bytes, settings.idle_timeout).await {
        Ok(()) => println!("Successfully written"),
        Err(e) => println!("{e}"),
    }
}

async fn ls(namenode: &NodeAddr, path: &str, settings: &ClusterSettings) {
    match api_client::name_command(namenode, Action::Ls, path, settings.idle_timeout).await {
        Ok(response) if response.success => {
            for (name, kind) in response.contents.unwrap_or_default() {
                println!("  {kind} {name}");
            }
        }
        Ok(response) => print_failure(&response),
        Err(e) => println!("{e}"),
    }
}

/// Locates the block, then tries each reported node in turn. A refused
/// connection or a miss moves on to the next candidate.
async fn cat(namenode: &NodeAddr, path: &str, settings: &ClusterSettings) {
    let response =
        match api_client::name_command(namenode, Action::Cat, path, settings.idle_timeout).await {
            Ok(response) => response,
            Err(e) => {
                println!("{e}");
                return;
            }
        };
    if !response.success {
        print_failure(&response);
        return;
    }
    let (Some(block_id), Some(addrs)) = (response.block_id, response.datanode_addrs) else {
        println!("Error: malformed cat response");
        return;
    };
    for addr in &addrs {
        match api_client::fetch_block(addr, &block_id, settings.idle_timeout).await {
            Ok(Some(bytes)) => {
                println!("{}", String::from_utf8_lossy(&bytes));
                return;
            }
            Ok(None) | Err(_) => continue,
        }
    }
    println!("Error: couldn't locate file block");
}

fn print_failure(response: &ClientResponse) {
    match &response.message {
        Some(message) => println!("{message}"),
        None => println!("Error: request failed"),
    }
}

fn parse_addr(spec: &str) -> anyhow::Result<NodeAddr> {
    let (host, port) = spec
        .rsplit_once(':')
        .with_context(|| format!("expected host:port, got {spec}"))?;
    Ok((host.to_string(), port.parse()?))
}
