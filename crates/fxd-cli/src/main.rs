//! FxDesk operator CLI.
//!
//! `fxd db status`    — connectivity + schema presence.
//! `fxd db migrate`   — apply embedded migrations. Guardrail: refuses while
//!                      approval requests are pending unless --yes.
//! `fxd ledger verify` — replay every account's transaction log and report
//!                      drift against the stored balance.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fxd")]
#[command(about = "FxDesk back-office CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Ledger integrity utilities
    Ledger {
        #[command(subcommand)]
        cmd: LedgerCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses when approval requests are
    /// pending unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with in-flight approvals.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum LedgerCmd {
    /// Recompute every account balance from its transaction log and report
    /// drift. Exits non-zero on any mismatch.
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => db_status().await,
            DbCmd::Migrate { yes } => db_migrate(yes).await,
        },
        Commands::Ledger { cmd } => match cmd {
            LedgerCmd::Verify => ledger_verify().await,
        },
    }
}

async fn db_status() -> Result<()> {
    let pool = fxd_db::connect_from_env().await?;
    let st = fxd_db::status(&pool).await?;
    println!("connectivity: {}", if st.ok { "ok" } else { "FAILED" });
    println!(
        "schema:       {}",
        if st.has_orders_table {
            "present"
        } else {
            "missing (run `fxd db migrate`)"
        }
    );
    Ok(())
}

async fn db_migrate(yes: bool) -> Result<()> {
    let pool = fxd_db::connect_from_env().await?;

    let pending = fxd_db::count_pending_approvals(&pool).await?;
    if pending > 0 && !yes {
        bail!(
            "{pending} approval request(s) are pending; migrating now may strand them. \
             Re-run with --yes to proceed."
        );
    }

    fxd_db::migrate(&pool).await?;
    println!("migrations applied");
    Ok(())
}

async fn ledger_verify() -> Result<()> {
    let pool = fxd_db::connect_from_env().await?;
    let mut conn = pool.acquire().await?;

    let accounts = fxd_db::accounts::list_accounts(&mut conn).await?;
    let mut drifted = 0usize;

    for account in &accounts {
        let check = fxd_ledger::recompute_balance(&mut conn, account.id).await?;
        if check.is_consistent() {
            println!("ok    {} ({})", account.name, account.currency_code);
        } else {
            drifted += 1;
            println!(
                "DRIFT {} ({}): stored {} replayed {} (drift {})",
                account.name,
                account.currency_code,
                check.stored_balance,
                check.replayed_balance,
                check.drift()
            );
        }
    }

    if drifted > 0 {
        bail!("{drifted} account(s) drifted from their transaction log");
    }
    println!("{} account(s) verified", accounts.len());
    Ok(())
}
