/*
    Ben-Or's protocol reaches agreement on a single bit among n
    asynchronous processes of which up to f may crash, provided n > 3f.
    Deterministic protocols cannot do this [FLP]; Ben-Or escapes the
    impossibility result by letting undecided processes flip a coin, so
    that termination holds with probability 1.
*/

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ben_or::common::{ConsensusConfig, ConsensusError, Result};
use ben_or::consensus::Value;
use ben_or::network::Network;

#[derive(Parser, Debug)]
#[command(name = "ben-or", about = "Run a Ben-Or binary consensus network in-process")]
struct Args {
    /// Initial value of every node, comma separated (0 or 1).
    #[arg(long, value_delimiter = ',', default_value = "1,1,1,1,1,1,1,1,1,1")]
    values: Vec<u8>,

    /// Ids of the nodes that are faulty, comma separated.
    #[arg(long, value_delimiter = ',')]
    faulty: Vec<usize>,

    /// JSON file with node parameters, durations in milliseconds.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Length of each collection window in milliseconds. Overrides the config file.
    #[arg(long)]
    window_ms: Option<u64>,

    /// How long to wait for every healthy node to decide.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Seed the nodes' coins for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let values = args
        .values
        .iter()
        .map(|bit| match bit {
            0 => Ok(Value::Zero),
            1 => Ok(Value::One),
            other => Err(ConsensusError::Config(format!("initial value must be 0 or 1, got {other}"))),
        })
        .collect::<Result<Vec<_>>>()?;

    let n = values.len();
    let mut faulty = vec![false; n];
    for id in &args.faulty {
        let flag = faulty
            .get_mut(*id)
            .ok_or_else(|| ConsensusError::Config(format!("faulty node {id} is not in 0..{n}")))?;
        *flag = true;
    }
    let f = faulty.iter().filter(|flag| **flag).count();

    let mut config = match &args.config {
        Some(path) => ConsensusConfig::load(path)?,
        None => ConsensusConfig::default(),
    };
    if let Some(window_ms) = args.window_ms {
        config = config.with_windows(Duration::from_millis(window_ms));
    }
    let network = match args.seed {
        Some(seed) => Network::launch_seeded(n, f, &values, &faulty, config, seed).await?,
        None => Network::launch(n, f, &values, &faulty, config).await?,
    };

    network.start_all().await?;
    let states = network
        .wait_for_finality(Duration::from_millis(args.timeout_ms))
        .await?;
    network.shutdown().await?;

    if ben_or::network::reached_finality(&states) {
        info!("every healthy node decided");
    } else {
        warn!("no global decision within {} ms", args.timeout_ms);
    }

    for (id, state) in states.iter().enumerate() {
        let line = serde_json::to_string(state).unwrap_or_else(|_| format!("{state:?}"));
        println!("node {id}: {line}");
    }

    Ok(())
}
