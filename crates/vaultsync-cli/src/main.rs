mod state;
mod telemetry;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use state::StateFile;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use vaultsync_core::ReconciliationEngine;
use vaultsync_spec::{
    Cipher, CiphertextMap, KvApi, SecretLifecycle, SecretRecord, requires_replacement,
};
use vaultsync_vault::{ProviderConfig, VaultEngine, build_engine};

#[derive(Parser)]
#[command(
    name = "vaultsync",
    version,
    about = "Reconcile encrypted secret declarations with Vault KV"
)]
struct Cli {
    /// Provider configuration (TOML, or JSON by extension).
    #[arg(long, global = true, default_value = "vaultsync.toml")]
    config: PathBuf,
    /// JSON state file holding the managed records.
    #[arg(long, global = true, default_value = "vaultsync.state.json")]
    state: PathBuf,
    /// Emit logs as JSON on stderr.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a new managed path from declared ciphertexts.
    Create(WriteArgs),
    /// Replace the secrets of a managed path.
    Update(UpdateArgs),
    /// Reconcile one record with the live value.
    Read(PathArgs),
    /// Reconcile every record in state.
    Refresh,
    /// Hard-delete a managed path.
    Destroy(PathArgs),
    /// Claim an existing path without touching its data.
    Import(PathArgs),
    /// Encrypt a plaintext with the configured transit key.
    Encrypt {
        #[arg(long)]
        value: String,
    },
    /// Print the state file.
    Show,
}

#[derive(Args)]
struct PathArgs {
    #[arg(long)]
    path: String,
}

#[derive(Args)]
struct WriteArgs {
    #[arg(long)]
    path: String,
    /// `KEY=CIPHERTEXT`, repeatable.
    #[arg(long = "secret", value_name = "KEY=CIPHERTEXT")]
    secrets: Vec<String>,
    /// JSON object of key to ciphertext, merged under the `--secret` pairs.
    #[arg(long)]
    from_file: Option<PathBuf>,
}

#[derive(Args)]
struct UpdateArgs {
    #[command(flatten)]
    write: WriteArgs,
    /// Move the record: destroy the old path and create this one.
    #[arg(long)]
    new_path: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_json)?;

    let mut state = StateFile::load(&cli.state)?;
    match &cli.command {
        Command::Create(args) => handle_create(&cli, &mut state, args)?,
        Command::Update(args) => handle_update(&cli, &mut state, args)?,
        Command::Read(args) => handle_read(&cli, &mut state, &args.path)?,
        Command::Refresh => handle_refresh(&cli, &mut state)?,
        Command::Destroy(args) => handle_destroy(&cli, &mut state, &args.path)?,
        Command::Import(args) => handle_import(&cli, &mut state, &args.path)?,
        Command::Encrypt { value } => {
            let engine = connect(&cli.config)?;
            println!("{}", engine.cipher().encrypt(value)?);
        }
        Command::Show => {
            let records: Vec<&SecretRecord> = state.records().collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}

fn connect(config: &Path) -> Result<VaultEngine> {
    let config = ProviderConfig::load(config)?;
    build_engine(&config)
}

fn handle_create(cli: &Cli, state: &mut StateFile, args: &WriteArgs) -> Result<()> {
    if state.contains(&args.path) {
        bail!("{} is already managed; use update to change it", args.path);
    }
    let declared = parse_secrets(args)?;
    let engine = connect(&cli.config)?;
    create(&engine, state, &args.path, &declared)?;
    state.save(&cli.state)?;
    println!("created {} ({} secrets)", args.path, declared.len());
    Ok(())
}

fn handle_update(cli: &Cli, state: &mut StateFile, args: &UpdateArgs) -> Result<()> {
    let declared = parse_secrets(&args.write)?;
    let path = &args.write.path;

    let Some(prior) = state.get(path).cloned() else {
        if let Some(new_path) = &args.new_path {
            bail!("{path} is not in state; cannot move it to {new_path}");
        }
        let engine = connect(&cli.config)?;
        create(&engine, state, path, &declared)?;
        state.save(&cli.state)?;
        println!("created {path} ({} secrets)", declared.len());
        return Ok(());
    };

    let desired = SecretRecord::new(
        args.new_path.clone().unwrap_or_else(|| path.clone()),
        declared,
    );
    let engine = connect(&cli.config)?;
    if requires_replacement(&prior, &desired) {
        move_record(&engine, state, &cli.state, &prior, &desired)?;
        println!("replaced {} with {}", prior.path, desired.path);
    } else {
        let stored = engine.update(path, &desired.encrypted_secrets)?;
        state.upsert(SecretRecord::new(path.clone(), stored));
        state.save(&cli.state)?;
        println!("updated {path} ({} secrets)", desired.encrypted_secrets.len());
    }
    Ok(())
}

/// Destroy `prior` and create `desired`. Everything that can be checked up
/// front is checked before the destroy, and state is saved after each step.
fn move_record<C: Cipher, K: KvApi>(
    engine: &ReconciliationEngine<C, K>,
    state: &mut StateFile,
    state_path: &Path,
    prior: &SecretRecord,
    desired: &SecretRecord,
) -> Result<()> {
    if state.contains(&desired.path) {
        bail!("{} is already managed", desired.path);
    }
    engine
        .check_write(&desired.path, &desired.encrypted_secrets)
        .with_context(|| format!("cannot move {} to {}", prior.path, desired.path))?;

    engine.destroy(&prior.path)?;
    state.remove(&prior.path);
    state.save(state_path)?;

    create(engine, state, &desired.path, &desired.encrypted_secrets)?;
    state.save(state_path)
}

fn create<C: Cipher, K: KvApi>(
    engine: &ReconciliationEngine<C, K>,
    state: &mut StateFile,
    path: &str,
    declared: &CiphertextMap,
) -> Result<()> {
    let stored = engine.create(path, declared)?;
    state.upsert(SecretRecord::new(path, stored));
    Ok(())
}

fn handle_read(cli: &Cli, state: &mut StateFile, path: &str) -> Result<()> {
    let record = state
        .get(path)
        .cloned()
        .ok_or_else(|| anyhow!("{path} is not in state; import it first"))?;
    let engine = connect(&cli.config)?;
    reconcile(&engine, state, &record)?;
    state.save(&cli.state)
}

fn handle_refresh(cli: &Cli, state: &mut StateFile) -> Result<()> {
    if state.is_empty() {
        println!("nothing to refresh");
        return Ok(());
    }
    let engine = connect(&cli.config)?;
    let records: Vec<SecretRecord> = state.records().cloned().collect();
    let mut failed = Vec::new();
    for record in &records {
        if let Err(err) = reconcile(&engine, state, record) {
            warn!(path = %record.path, error = %err, "refresh failed");
            eprintln!("{}: {err:#}", record.path);
            failed.push(record.path.clone());
        }
    }
    state.save(&cli.state)?;
    if !failed.is_empty() {
        bail!("{} of {} records failed to refresh", failed.len(), records.len());
    }
    Ok(())
}

/// Rebuild one record from the live value. A vanished path leaves state.
fn reconcile(engine: &VaultEngine, state: &mut StateFile, record: &SecretRecord) -> Result<()> {
    let report = match engine.reconcile(&record.path, &record.encrypted_secrets) {
        Ok(report) => report,
        Err(err) if err.is_not_found() => {
            state.remove(&record.path);
            println!("{}: gone from vault, removed from state", record.path);
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    if report.has_drift() {
        println!(
            "{}: {} changed, {} removed",
            record.path,
            report.changed.len(),
            report.removed.len()
        );
    } else {
        println!("{}: in sync", record.path);
    }
    state.upsert(SecretRecord::new(record.path.clone(), report.secrets));
    Ok(())
}

fn handle_destroy(cli: &Cli, state: &mut StateFile, path: &str) -> Result<()> {
    let engine = connect(&cli.config)?;
    engine.destroy(path)?;
    state.remove(path);
    state.save(&cli.state)?;
    println!("destroyed {path}");
    Ok(())
}

fn handle_import(cli: &Cli, state: &mut StateFile, path: &str) -> Result<()> {
    let engine = connect(&cli.config)?;
    let record = engine.import(path)?;
    state.upsert(record);
    state.save(&cli.state)?;
    println!("imported {path}; run `vaultsync read --path {path}` to cache its secrets");
    Ok(())
}

fn parse_secrets(args: &WriteArgs) -> Result<CiphertextMap> {
    let mut secrets = match &args.from_file {
        Some(file) => read_secrets_file(file)?,
        None => CiphertextMap::new(),
    };
    for pair in &args.secrets {
        let (key, ciphertext) = parse_pair(pair)?;
        secrets.insert(key, ciphertext);
    }
    Ok(secrets)
}

fn read_secrets_file(file: &Path) -> Result<CiphertextMap> {
    let data = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    serde_json::from_str(&data).with_context(|| {
        format!(
            "{} must be a JSON object of key to ciphertext strings",
            file.display()
        )
    })
}

fn parse_pair(pair: &str) -> Result<(String, String)> {
    let (key, ciphertext) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("--secret expects KEY=CIPHERTEXT, got {pair:?}"))?;
    if key.trim().is_empty() {
        bail!("--secret key must not be empty in {pair:?}");
    }
    Ok((key.trim().to_string(), ciphertext.to_string()))
}
