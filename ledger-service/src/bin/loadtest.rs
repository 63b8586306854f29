use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{seq::SliceRandom, thread_rng};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;

/// Casts one ballot per credential `{CREDENTIAL_PREFIX}{0..VOTERS}` against a
/// running service, then audits the resulting chain.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_url = std::env::var("BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let election_id = std::env::var("ELECTION_ID").unwrap_or_else(|_| "E1".to_string());
    let prefix = std::env::var("CREDENTIAL_PREFIX").unwrap_or_else(|_| "voter-".to_string());
    let voters: usize = std::env::var("VOTERS").ok().and_then(|v| v.parse().ok()).unwrap_or(200);
    let concurrency: usize = std::env::var("CONCURRENCY").ok().and_then(|v| v.parse().ok()).unwrap_or(32);
    let api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());

    println!("BASE_URL={}", base_url);
    println!("ELECTION_ID={} VOTERS={} CONCURRENCY={}", election_id, voters, concurrency);

    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_nodelay(true)
        .timeout(Duration::from_secs(15))
        .build()?;

    let detail: Value = client
        .get(format!("{}/election/{}", base_url, election_id))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let positions: Vec<(String, Vec<String>)> = detail["positions_json"]
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(position, candidates)| {
                    let names = candidates
                        .as_array()
                        .map(|c| c.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                        .unwrap_or_default();
                    (position.clone(), names)
                })
                .collect()
        })
        .unwrap_or_default();
    if positions.is_empty() {
        anyhow::bail!("Election {} declares no positions", election_id);
    }
    println!("Loaded {} positions for {}", positions.len(), detail["name"]);

    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(Option<StatusCode>, u128)>();
    let start_at = Instant::now();

    let stats_handle = tokio::spawn(async move {
        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        let mut latencies_ms: Vec<u128> = Vec::new();
        while let Some((status, ms)) = rx.recv().await {
            let label = status.map(|s| s.as_u16().to_string()).unwrap_or_else(|| "transport".into());
            *by_status.entry(label).or_default() += 1;
            latencies_ms.push(ms);
        }
        latencies_ms.sort_unstable();
        let p = |q: f64| -> u128 {
            if latencies_ms.is_empty() {
                return 0;
            }
            let idx = ((latencies_ms.len() as f64 - 1.0) * q).round() as usize;
            latencies_ms[idx]
        };
        let elapsed = start_at.elapsed().as_secs_f64();
        let completed = latencies_ms.len();
        let rate = if elapsed > 0.0 { completed as f64 / elapsed } else { 0.0 };
        println!(
            "Summary: completed={} p50={}ms p90={}ms p99={}ms casts/s={:.1}",
            completed,
            p(0.50),
            p(0.90),
            p(0.99),
            rate
        );
        for (status, count) in &by_status {
            println!("  status {}: {}", status, count);
        }
    });

    let mut rng = thread_rng();
    let mut tasks = Vec::with_capacity(voters);
    for i in 0..voters {
        let permit = sem.clone().acquire_owned().await?;
        let mut votes = Map::new();
        for (position, candidates) in &positions {
            if let Some(candidate) = candidates.choose(&mut rng) {
                votes.insert(position.clone(), Value::String(candidate.clone()));
            }
        }
        let body = json!({
            "election_id": election_id,
            "voter_credential": format!("{}{}", prefix, i),
            "votes": votes,
        });
        let mut request = client.post(format!("{}/vote/cast", base_url)).json(&body);
        if let Some(key) = &api_key {
            request = request.header("x-api-key", key);
        }
        let tx = tx.clone();
        tasks.push(tokio::spawn(async move {
            let t0 = Instant::now();
            let status = request.send().await.ok().map(|r| r.status());
            let _ = tx.send((status, t0.elapsed().as_millis()));
            drop(permit);
        }));
    }
    drop(tx);

    for task in tasks {
        let _ = task.await;
    }
    let _ = stats_handle.await;

    let audit: Value = client
        .get(format!("{}/audit/{}", base_url, election_id))
        .send()
        .await?
        .json()
        .await?;
    println!("Audit: {}", serde_json::to_string_pretty(&audit)?);
    if audit["valid"] != Value::Bool(true) {
        anyhow::bail!("Chain for {} failed verification", election_id);
    }

    Ok(())
}
