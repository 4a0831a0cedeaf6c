//! lightkeeper CLI - inspect keys, payment inputs and the chain backend
//!
//!   lightkeeper derive --index 3 --type p2wpkh --network testnet
//!   lightkeeper decode lightning:lnbc...
//!   lightkeeper tip --network signet
//!   lightkeeper watch --network bitcoin --electrum ssl://electrum.blockstream.info:50002
//!
//! Output is JSON (pretty on a tty).

use anyhow::{anyhow, Context, Result};
use lightkeeper::keys::{derive_address, receive_path, AddressType, WalletSeed};
use lightkeeper::logging::init_logging;
use lightkeeper::payment::{classify, decode_bolt11, lnurl, PaymentInput};
use lightkeeper::storage::{FileKeychain, VerifiedStorage};
use lightkeeper::Network;
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::debug;

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }
    if opts.version {
        println!("lightkeeper {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("derive") => cmd_derive(&opts),
        Some("decode") => cmd_decode(&opts),
        #[cfg(feature = "electrum")]
        Some("tip") => cmd_tip(&opts),
        #[cfg(feature = "electrum")]
        Some("watch") => cmd_watch(&opts),
        Some(cmd) => Err(anyhow!("Unknown command: {cmd}")),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = opts.pretty || std::io::stdout().is_terminal();
    match result {
        Ok(Value::Null) => {}
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{e:#}")}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    input: Option<String>,
    network: Option<String>,
    electrum: Option<String>,
    mnemonic: Option<String>,
    passphrase: Option<String>,
    address_type: Option<String>,
    index: Option<u32>,
    count: Option<u32>,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        load_dotenv();

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            let mut take = |slot: &mut Option<String>| {
                if value.is_some() {
                    *slot = value.clone();
                    i += 1;
                }
            };
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--pretty" => opts.pretty = true,
                "--network" | "-n" => take(&mut opts.network),
                "--electrum" | "-e" => take(&mut opts.electrum),
                "--mnemonic" | "-m" => take(&mut opts.mnemonic),
                "--passphrase" => take(&mut opts.passphrase),
                "--type" | "-t" => take(&mut opts.address_type),
                "--index" | "-i" => {
                    let mut raw = None;
                    take(&mut raw);
                    opts.index = raw.and_then(|v| v.parse().ok());
                }
                "--count" | "-c" => {
                    let mut raw = None;
                    take(&mut raw);
                    opts.count = raw.and_then(|v| v.parse().ok());
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {}
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        if !positional.is_empty() {
            opts.input = Some(positional.join(" "));
        }

        // Environment is lower priority than flags
        if opts.network.is_none() {
            opts.network = env::var("LIGHTKEEPER_NETWORK").ok();
        }
        if opts.electrum.is_none() {
            opts.electrum = env::var("LIGHTKEEPER_ELECTRUM").ok();
        }
        if opts.mnemonic.is_none() {
            opts.mnemonic = env::var("LIGHTKEEPER_MNEMONIC").ok();
        }
        opts
    }

    fn network(&self) -> Result<Network> {
        Ok(self.network.as_deref().unwrap_or("bitcoin").parse()?)
    }
}

fn load_dotenv() {
    let Ok(contents) = std::fs::read_to_string(".env") else { return };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && env::var(key.trim()).is_err() {
                env::set_var(key.trim(), value);
            }
        }
    }
}

fn cmd_derive(opts: &ParsedArgs) -> Result<Value> {
    let network = opts.network()?;
    let address_type: AddressType = opts.address_type.as_deref().unwrap_or("p2wpkh").parse()?;
    let seed = match &opts.mnemonic {
        Some(m) => WalletSeed::from_mnemonic(m, opts.passphrase.as_deref().unwrap_or(""))?,
        None => {
            let keychain = FileKeychain::open("cli").context("opening keychain")?;
            debug!(path = %keychain.path().display(), "using keychain seed");
            WalletSeed::load_or_create(&VerifiedStorage::new(Arc::new(keychain)))?
        }
    };

    let start = opts.index.unwrap_or(0);
    let count = opts.count.unwrap_or(1).max(1);
    let mut addresses = Vec::with_capacity(count as usize);
    for index in start..start.saturating_add(count) {
        let path = receive_path(address_type, network, index);
        let derived = derive_address(seed.mnemonic(), seed.passphrase(), &path, address_type, network)?;
        addresses.push(json!({"index": index, "address": derived.address, "path": derived.path, "public_key": derived.public_key}));
    }
    Ok(if addresses.len() == 1 { addresses.remove(0) } else { Value::Array(addresses) })
}

fn cmd_decode(opts: &ParsedArgs) -> Result<Value> {
    let input = opts.input.as_deref().ok_or_else(|| anyhow!("decode needs an input"))?;
    Ok(match classify(input)? {
        PaymentInput::Bolt11(invoice) => json!({"kind": "bolt11", "invoice": decode_bolt11(&invoice)?}),
        PaymentInput::NodeUri(peer) => json!({"kind": "node_uri", "peer": peer, "onion": peer.is_onion()}),
        PaymentInput::Lnurl(encoded) => json!({"kind": "lnurl", "url": lnurl::decode_lnurl(&encoded)?}),
    })
}

#[cfg(feature = "electrum")]
fn connect_watcher(opts: &ParsedArgs) -> Result<(tokio::runtime::Runtime, Arc<lightkeeper::chain::ChainWatcher>)> {
    use lightkeeper::chain::{ChainWatcher, ElectrumBackend};
    use lightkeeper::types::ElectrumPeer;

    let network = opts.network()?;
    let peers = match &opts.electrum {
        Some(url) => vec![ElectrumPeer::parse(url)?],
        None => Vec::new(),
    };
    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    let watcher = Arc::new(ChainWatcher::new(Arc::new(ElectrumBackend::new()), network));
    runtime.block_on(watcher.connect(&peers))?;
    Ok((runtime, watcher))
}

#[cfg(feature = "electrum")]
fn cmd_tip(opts: &ParsedArgs) -> Result<Value> {
    let (runtime, watcher) = connect_watcher(opts)?;
    runtime.block_on(async {
        let header = watcher.get_best_block().await?;
        let fees = watcher.get_fees().await;
        Ok(json!({
            "network": watcher.network(),
            "peer": watcher.connected_peer().await,
            "header": {"height": header.height, "hash": header.hash},
            "fees": fees,
        }))
    })
}

#[cfg(feature = "electrum")]
fn cmd_watch(opts: &ParsedArgs) -> Result<Value> {
    use lightkeeper::runtime::install_signal_handlers;
    use std::time::Duration;

    let (runtime, watcher) = connect_watcher(opts)?;
    let pretty = opts.pretty;
    runtime.block_on(async {
        let print: lightkeeper::chain::HeaderCallback = Arc::new(move |h| {
            println!("{}", render(&json!({"height": h.height, "hash": h.hash}), pretty));
        });
        let tip = watcher.subscribe_headers(print.clone()).await?;
        print(&tip);

        let shutdown = install_signal_handlers();
        let listener = watcher.clone().spawn_listener(Duration::from_secs(5), &shutdown);
        let _ = listener.await;
        Ok::<_, anyhow::Error>(())
    })?;
    Ok(Value::Null)
}

fn print_usage() {
    println!(
        r#"lightkeeper - Lightning node lifecycle & chain-sync toolkit

USAGE:
    lightkeeper <command> [input] [options]

COMMANDS:
    derive                  Derive receive addresses
    decode <input>          Classify and decode an invoice, node URI or LNURL
    tip                     Connect to Electrum and print the chain tip and fees
    watch                   Print every new block until Ctrl+C

OPTIONS:
    --network, -n <net>     bitcoin|testnet|signet|regtest (env: LIGHTKEEPER_NETWORK)
    --electrum, -e <url>    ssl://host:port or tcp://host:port (env: LIGHTKEEPER_ELECTRUM)
    --mnemonic, -m <words>  BIP39 mnemonic (env: LIGHTKEEPER_MNEMONIC, else keychain)
    --passphrase <text>     BIP39 passphrase
    --type, -t <type>       p2wpkh|p2sh-p2wpkh|p2pkh
    --index, -i <n>         First address index (default 0)
    --count, -c <n>         Number of addresses (default 1)
    --pretty                Pretty-print JSON
    --help, -h              Show this help
    --version, -V           Show version
"#
    );
}
