use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::{error, info, warn};
use std::fs;
use std::path::PathBuf;
use votechain_cli::{
    compute_hash, format_timestamp, utils::*, BallotData, BallotSchema, Snapshot,
};

#[derive(Clone, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Clone)]
pub enum Commands {
    /// Replay every hash of an exported dashboard snapshot
    Verify {
        #[arg(long, help = "Path to the snapshot JSON (or gzip archive)")]
        read_path: PathBuf,

        #[arg(long, env, help = "Election slug the snapshot was exported from")]
        election_id: String,

        #[arg(long, help = "Ballot schema JSON file; enables tally recount")]
        schema: Option<PathBuf>,

        #[arg(long, default_value = "false")]
        is_compressed: bool,
    },
    /// Print the digest for one set of entry fields
    HashEntry {
        #[arg(long, env)]
        election_id: String,

        #[arg(long, value_parser = parse_ballot, help = "Ballot as a JSON object")]
        ballot: BallotData,

        #[arg(long, value_parser = parse_utc)]
        timestamp: DateTime<Utc>,

        #[arg(long, value_parser = parse_hex_digest)]
        previous_hash: String,
    },
    /// Verify a snapshot and store it as a gzip archive
    Archive {
        #[arg(long, help = "Path to the snapshot JSON")]
        read_path: PathBuf,

        #[arg(long, env)]
        election_id: String,

        #[arg(long, help = "Path to write the archive to")]
        save_path: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(false)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            read_path,
            election_id,
            schema,
            is_compressed,
        } => {
            info!("Verifying snapshot {:?} for election {}", read_path, election_id);
            let snapshot = Snapshot::read(read_path, is_compressed)?;
            let schema = schema
                .map(|path| -> Result<BallotSchema> {
                    Ok(BallotSchema::from_json(&fs::read_to_string(path)?)?)
                })
                .transpose()?;

            let audit = snapshot.audit(&election_id, schema.as_ref());
            println!("{}", serde_json::to_string_pretty(&audit)?);

            match (&audit.chain.fault, audit.tally_matches) {
                (Some(fault), _) => {
                    error!(
                        "Chain invalid at vote_id {:?}: {}",
                        audit.chain.first_invalid_entry, fault
                    );
                    return Err(anyhow!("chain verification failed"));
                }
                (None, Some(false)) => {
                    error!("Published tally does not match a recount of the ledger");
                    return Err(anyhow!("tally verification failed"));
                }
                (None, None) => {
                    warn!("No schema supplied, tally was not recounted");
                }
                (None, Some(true)) => {}
            }
            info!(
                "== Chain of {} entries verified ==",
                audit.chain.total_entries
            );
        }
        Commands::HashEntry {
            election_id,
            ballot,
            timestamp,
            previous_hash,
        } => {
            info!(
                "Hashing entry for {} at {}",
                election_id,
                format_timestamp(&timestamp)
            );
            println!(
                "{}",
                compute_hash(&election_id, &ballot, &timestamp, &previous_hash)
            );
        }
        Commands::Archive {
            read_path,
            election_id,
            save_path,
        } => {
            let snapshot = Snapshot::read(read_path, false)?;
            let audit = snapshot.audit(&election_id, None);
            if let Some(fault) = audit.chain.fault {
                return Err(anyhow!("refusing to archive an invalid chain: {}", fault));
            }

            let start = std::time::Instant::now();
            snapshot.save_compressed(save_path.clone())?;
            info!(
                "Saved archive of {} entries to {:?} (took {:?})",
                snapshot.ballot_count(),
                save_path,
                start.elapsed()
            );
        }
    }
    Ok(())
}
