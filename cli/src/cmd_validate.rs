//! The `validate` command: parse the config and ping every endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;

const HTTP_TIMEOUT: Duration = Duration::from_secs(8);

pub async fn run(config_path: &str) -> Result<()> {
    let cfg = chainwatch_config::load(config_path).context("config invalid")?;
    println!("config OK (version {})", cfg.version);

    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("build http client")?;

    let mut failures = 0usize;
    for src in &cfg.sources {
        match src.kind.to_ascii_lowercase().as_str() {
            "evm" => match ping_evm(&client, &src.rpc_url).await {
                Ok(chain_id) => println!("- source {} (evm): chainId {chain_id} OK", src.id),
                Err(e) => {
                    failures += 1;
                    println!("- source {} (evm): ERROR {e:#}", src.id);
                }
            },
            "algorand" => {
                let algod = ping_algod(&client, &src.algod_url).await;
                let indexer = ping_algod(&client, &src.indexer_url).await;
                match (&algod, &indexer) {
                    (Ok(a), Ok(i)) => {
                        println!("- source {} (algorand): algod {a}, indexer {i} OK", src.id)
                    }
                    _ => {
                        failures += 1;
                        println!(
                            "- source {} (algorand): algod {:?} indexer {:?}",
                            src.id,
                            algod.err().map(|e| e.to_string()),
                            indexer.err().map(|e| e.to_string()),
                        );
                    }
                }
            }
            other => {
                failures += 1;
                println!("- source {}: unsupported type {other:?}", src.id);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("validate: {failures} source(s) failed connectivity");
    }
    println!("validate: success");
    Ok(())
}

async fn ping_evm(client: &reqwest::Client, url: &str) -> Result<String> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_chainId",
        "params": [],
    });
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .context("call eth_chainId")?;
    anyhow::ensure!(resp.status().is_success(), "rpc status {}", resp.status());

    let envelope: serde_json::Value = resp.json().await.context("decode rpc response")?;
    if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
        anyhow::bail!("rpc error: {err}");
    }
    let chain_id = envelope["result"]
        .as_str()
        .filter(|s| !s.is_empty())
        .context("empty chainId result")?;
    Ok(chain_id.to_string())
}

async fn ping_algod(client: &reqwest::Client, base_url: &str) -> Result<String> {
    let url = format!("{}/versions", base_url.trim_end_matches('/'));
    let resp = client.get(&url).send().await.context("call versions")?;
    anyhow::ensure!(resp.status().is_success(), "status {}", resp.status());

    let body: serde_json::Value = resp.json().await.context("decode response")?;
    let version = body["versions"]
        .as_array()
        .and_then(|v| v.first())
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    Ok(version.to_string())
}
