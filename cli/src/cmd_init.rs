//! The `init` command: scaffold a commented sample config.

use anyhow::Result;

const SAMPLE_CONFIG: &str = r#"version: 1

global:
  db_path: ./chainwatch.db
  confirmations:
    evm: 12
    algorand: 2

sources:
  - id: evm_main
    type: evm
    rpc_url: ${EVM_RPC_URL}
    # "0", an absolute height, or "latest-N"
    start_block: "latest-100"
    abi_dirs: []

  - id: algo_main
    type: algorand
    algod_url: ${ALGOD_URL}
    indexer_url: ${ALGOD_INDEXER_URL}
    start_round: "latest-100"

rules:
  - id: usdc-whale
    source: evm_main
    match:
      type: log
      contract: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
      event: "Transfer(address,address,uint256)"
      where:
        - "value >= 1_000_000 * 1e6"
    sinks: [ops-slack]
    dedupe:
      key: txhash
      ttl: 1h
    rate_limit:
      capacity: 5
      rate: 0.5

  - id: app-activity
    source: algo_main
    match:
      type: app_call
      app_id: 123
    sinks: [ops-slack]

sinks:
  - id: ops-slack
    type: slack
    webhook_url: ${SLACK_WEBHOOK_URL}
    template: "ALERT {{rule_id}} on {{chain}} at {{height}}: {{tx_hash}}"
"#;

pub fn run(path: &str, force: bool) -> Result<()> {
    if std::path::Path::new(path).exists() && !force {
        anyhow::bail!("{path} already exists (use --force to overwrite)");
    }
    std::fs::write(path, SAMPLE_CONFIG)?;
    println!("wrote sample config to {path}");
    Ok(())
}
