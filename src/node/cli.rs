use crate::codec::{from_json, Value};
use crate::crypto::Keypair;
use crate::node::config::NodeConfig;
use crate::node::node::{open_interface, Node};
use crate::runtime::{make_tx, CallArgs};
use crate::storage::StorageEngine;
use crate::utils::init_logging;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};

/// CLI for the contract engine.
#[derive(Parser)]
#[clap(name = "stampchain", version)]
pub struct Cli {
    /// TOML config file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[clap(long)]
    pub data_dir: Option<PathBuf>,

    /// memory, fs or rocksdb
    #[clap(long)]
    pub storage: Option<StorageEngine>,

    /// Do not keep finalized transactions in block storage
    #[clap(long)]
    pub no_blocks: bool,

    /// Charge stamps for execution
    #[clap(long)]
    pub metering: bool,

    #[clap(long)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Serve commands over the line relay until ctrl-c
    Serve {
        /// relay bind address (host:port)
        #[clap(long)]
        rpc: Option<String>,
    },
    /// Execute one transaction from a JSON file
    Run {
        #[clap(long)]
        tx: PathBuf,
    },
    /// Execute a JSON list of transactions as one batch
    RunAll {
        #[clap(long)]
        txs: PathBuf,
    },
    /// Report lint violations for a contract source file
    Lint {
        #[clap(long)]
        path: PathBuf,
    },
    /// Compile a contract source file to hex bytecode
    Compile {
        #[clap(long)]
        path: PathBuf,
        #[clap(long)]
        name: String,
    },
    GetContract {
        #[clap(long)]
        name: String,
    },
    GetVar {
        #[clap(long)]
        contract: String,
        #[clap(long)]
        variable: String,
        /// key parts; JSON literals are decoded, anything else is a string
        #[clap(long)]
        key: Vec<String>,
    },
    /// Print a fresh ed25519 key pair
    Keygen,
    /// Build a signed transaction
    Sign {
        /// hex secret key
        #[clap(long)]
        secret: String,
        #[clap(long)]
        contract: String,
        #[clap(long)]
        function: String,
        /// JSON object of named arguments
        #[clap(long, default_value = "{}")]
        args: String,
        #[clap(long)]
        stamps: Option<u64>,
        #[clap(long)]
        timestamp: Option<i64>,
    },
}

impl Cli {
    /// Config file (or defaults) with the command-line flags applied on top.
    pub fn node_config(&self) -> Result<NodeConfig> {
        let mut cfg = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(storage) = self.storage {
            cfg.storage = storage;
        }
        if self.no_blocks {
            cfg.blocks = false;
        }
        if self.metering {
            cfg.engine.metering = true;
        }
        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn key_part(raw: &str) -> Result<Value> {
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(v) => Ok(from_json(&v)?),
        Err(_) => Ok(Value::str(raw)),
    }
}

fn call_args(raw: &str) -> Result<CallArgs> {
    let parsed: JsonValue = serde_json::from_str(raw).context("--args must be JSON")?;
    let obj = parsed.as_object().ok_or_else(|| anyhow!("--args must be a JSON object"))?;
    let mut args = CallArgs::new();
    for (k, v) in obj {
        args.insert(k.clone(), from_json(v)?);
    }
    Ok(args)
}

fn print_json(v: &JsonValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let cfg = cli.node_config()?;
    init_logging(&cfg.log_level);

    match cli.cmd {
        Cmd::Serve { rpc } => {
            let mut cfg = cfg;
            if let Some(rpc) = rpc {
                cfg.rpc_addr = rpc;
            }
            let node = Node::new(cfg);
            let (svc, addr) = node.start().await?;
            println!("serving on {}", addr);
            // Wait for Ctrl+C
            tokio::signal::ctrl_c().await?;
            println!("Shutting down...");
            svc.shutdown().await?;
            println!("stopped");
            Ok(())
        }
        Cmd::Run { tx } => {
            let tx = read_json(&tx)?;
            let mut iface = open_interface(&cfg)?;
            print_json(&iface.run(tx)?)
        }
        Cmd::RunAll { txs } => {
            let txs = match read_json(&txs)? {
                JsonValue::Array(txs) => txs,
                _ => bail!("expected a JSON list of transactions"),
            };
            let mut iface = open_interface(&cfg)?;
            print_json(&iface.run_all(txs)?)
        }
        Cmd::Lint { path } => {
            let code = std::fs::read_to_string(&path)?;
            let violations = crate::compiler::lint(&code);
            print_json(&json!(violations))?;
            if !violations.is_empty() {
                bail!("{} violation(s)", violations.len());
            }
            Ok(())
        }
        Cmd::Compile { path, name } => {
            let code = std::fs::read_to_string(&path)?;
            let unit = crate::compiler::compile(&name, &code)?;
            println!("{}", hex::encode(unit.to_bytes()?));
            Ok(())
        }
        Cmd::GetContract { name } => {
            let iface = open_interface(&cfg)?;
            print_json(&iface.get_contract(&name)?)
        }
        Cmd::GetVar { contract, variable, key } => {
            let parts = key.iter().map(|k| key_part(k)).collect::<Result<Vec<_>>>()?;
            let iface = open_interface(&cfg)?;
            print_json(&iface.get_var(&contract, &variable, &parts)?)
        }
        Cmd::Keygen => {
            let kp = Keypair::generate();
            print_json(&json!({
                "secret": hex::encode(kp.secret_bytes()),
                "public": kp.public_hex(),
            }))
        }
        Cmd::Sign { secret, contract, function, args, stamps, timestamp } => {
            let kp = Keypair::from_hex(&secret)?;
            let args = call_args(&args)?;
            print_json(&make_tx(&kp, &contract, &function, &args, stamps, timestamp))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from(["stampchain", "--storage", "fs", "--no-blocks", "--metering", "keygen"]);
        let cfg = cli.node_config().unwrap();
        assert_eq!(cfg.storage, StorageEngine::Fs);
        assert!(!cfg.blocks);
        assert!(cfg.engine.metering);
    }

    #[test]
    fn test_key_parts() {
        assert_eq!(key_part("alice").unwrap(), Value::str("alice"));
        assert_eq!(key_part("5").unwrap(), Value::Int(5));
        assert_eq!(key_part("\"5\"").unwrap(), Value::str("5"));
    }

    #[test]
    fn test_call_args() {
        let args = call_args(r#"{"to": "bob", "amount": 3}"#).unwrap();
        assert_eq!(args.get("amount"), Some(&Value::Int(3)));
        assert!(call_args("[1]").is_err());
    }
}
