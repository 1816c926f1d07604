// Command line flags - select migrations and tune the run

use clap::Parser;

use crate::migration::{AttachmentPolicy, MigrationOptions, MigrationPlan, ReplicatorOptions, RunQuery};
use crate::models::LogSubtype;

#[derive(Parser, Debug, Clone)]
#[command(name = "logbook-migrate")]
#[command(
    about = "Migrate the legacy logbook into the bookkeeping service",
    long_about = "Migrate the legacy logbook into the bookkeeping service.\n\n\
                  Flags take the double-dash form (--rlimit, --mcomments, ...); \
                  single-dash spellings such as -rlimit are not accepted."
)]
pub struct Args {
    /// Maximum number of runs to migrate
    #[arg(long, default_value_t = 10)]
    pub rlimit: i64,

    /// Lowest run number to migrate
    #[arg(long, default_value_t = 500)]
    pub rmin: i64,

    /// Highest run number to migrate
    #[arg(long, default_value_t = 9_999_999)]
    pub rmax: i64,

    /// Replicate comment threads concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Only check database and API connectivity
    #[arg(long)]
    pub check: bool,

    /// Migrate subsystems
    #[arg(long)]
    pub msubsystems: bool,

    /// Migrate users
    #[arg(long)]
    pub musers: bool,

    /// Migrate comments
    #[arg(long)]
    pub mcomments: bool,

    /// Migrate runs
    #[arg(long)]
    pub mruns: bool,

    /// Reserved identifier offset, currently not applied
    #[arg(long, default_value_t = 1_000_000_000)]
    pub idoffset: i64,

    /// Skip TLS certificate verification for the API
    #[arg(long)]
    pub tlsskipverify: bool,

    /// Subtype of top-level log entries created from thread roots
    #[arg(long, value_enum, default_value_t = LogSubtype::Run)]
    pub root_subtype: LogSubtype,

    /// Read the logbook but replay against in-memory target and API
    #[arg(long)]
    pub dry_run: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn plan(&self) -> MigrationPlan {
        MigrationPlan {
            check: self.check,
            subsystems: self.msubsystems,
            users: self.musers,
            comments: self.mcomments,
            runs: self.mruns,
        }
    }

    pub fn options(&self) -> MigrationOptions {
        MigrationOptions {
            parallel: self.parallel,
            replicator: ReplicatorOptions {
                root_subtype: self.root_subtype,
                attachments: AttachmentPolicy::default(),
            },
            run_query: RunQuery {
                min_run: self.rmin,
                max_run: self.rmax,
                limit: self.rlimit,
            },
            id_offset: self.idoffset,
            ..MigrationOptions::default()
        }
    }
}
