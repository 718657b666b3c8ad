use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "lms-cleanup")]
#[command(about = "Data retention and storage reclamation for a learning platform", long_about = None)]
pub struct Cli {
    /// Configuration file to load instead of ./Config.*
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan the content store for files without a record
    Scan,
    /// Run the database and disk clean-up steps
    Cleanup,
    /// List stray files found by the last scan, largest first
    StrayFiles {
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: usize,
        /// Write every candidate to this CSV file instead
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Search file records
    FindFiles {
        /// Only files larger than this many megabytes
        #[arg(long, default_value_t = 50)]
        min_size_mb: i64,
        #[arg(long)]
        name: Option<String>,
        /// Owner name (either order) or author
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        component: Option<String>,
        /// Only files owned by deleted users
        #[arg(long)]
        user_deleted: bool,
        /// Restrict to one owner's files
        #[arg(long)]
        owner: Option<i64>,
        #[arg(long, default_value_t = 0)]
        page: usize,
    },
    /// Print file and history table statistics
    Stats,
    /// Remove one file's content and all records sharing it
    RemoveFile {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Remove old assignment submission file records
    BatchRemove {
        #[arg(long, default_value = "assignsubmission_file")]
        component: String,
        /// Records created before this date (YYYY-MM-DD), at least one year ago
        #[arg(long)]
        until: String,
        #[arg(long, short)]
        yes: bool,
    },
    /// Requeue course module deletion tasks from the modules flagged for deletion
    ReinitModuleCleanup {
        #[arg(long, short)]
        force: bool,
        /// User the requeued tasks run as
        #[arg(long, default_value_t = 2)]
        admin_id: i64,
    },
    /// Print configuration values
    PrintConfig,
}
