use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gembak",
    version,
    about = "Timestamped backup, restore and prune for the Gemini CLI configuration directory",
    after_help = "\
Environment variables:
  GEMBAK_B2_KEY_ID    Backblaze B2 key id (overridden by --key-id)
  GEMBAK_B2_APP_KEY   Backblaze B2 application key (overridden by --app-key)
  GEMBAK_B2_BUCKET    Backblaze B2 bucket name (overridden by --bucket)
  GEMBAK_LOCK_FILE    Lock file path (defaults to the system lock directory)

Exit codes:
  0  success
  1  precondition failure (missing source, no backups, credentials)
  2  another backup/restore holds the lock
  3  pre-install verification failed
  4  post-install verification failed (rollback attempted)"
)]
pub(crate) struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Cloud credential flags shared by every cloud-touching command.
#[derive(Args)]
pub(crate) struct CloudOpts {
    /// B2 bucket name
    #[arg(long)]
    pub bucket: Option<String>,

    /// B2 key id
    #[arg(long)]
    pub key_id: Option<String>,

    /// B2 application key
    #[arg(long)]
    pub app_key: Option<String>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Create a verified, timestamped backup of the configuration directory
    Backup {
        /// Source directory (default ~/.gemini)
        #[arg(long)]
        src: Option<String>,

        /// Directory receiving tar.gz archives (default ~/gembak-backups)
        #[arg(long)]
        archive_dir: Option<String>,

        /// Parent directory for installed tree backups (default ~/gembak-backups)
        #[arg(long)]
        dest_parent: Option<String>,

        /// Report the plan without performing destructive steps
        #[arg(long)]
        dry_run: bool,

        /// Upload the archive to the cloud after a successful local backup
        #[arg(long)]
        cloud: bool,

        #[command(flatten)]
        cloud_opts: CloudOpts,
    },

    /// Restore the configuration directory from a backup
    Restore {
        /// Directory backup to restore from
        #[arg(long)]
        from_dir: Option<String>,

        /// Archive to restore from (a cloud object name with --cloud)
        #[arg(long)]
        from_archive: Option<String>,

        /// Directory searched for the oldest archive when no source is given
        #[arg(long)]
        search_dir: Option<String>,

        /// Destination directory (default ~/.gemini)
        #[arg(long)]
        dest: Option<String>,

        /// Replace the destination without keeping a .bak copy
        #[arg(long)]
        force: bool,

        /// Report what would happen without touching the filesystem
        #[arg(long)]
        dry_run: bool,

        /// Restore from the cloud bucket instead of the local search dir
        #[arg(long)]
        cloud: bool,

        #[command(flatten)]
        cloud_opts: CloudOpts,
    },

    /// Compare the live configuration against the newest installed backup
    CheckIntegrity {
        /// Source directory (default ~/.gemini)
        #[arg(long)]
        src: Option<String>,

        /// Directory searched for installed backups (default ~/gembak-backups)
        #[arg(long)]
        search_dir: Option<String>,
    },

    /// List available backups
    List {
        /// Directory searched for backups (default ~/gembak-backups)
        #[arg(long)]
        search_dir: Option<String>,

        /// List the cloud bucket instead
        #[arg(long)]
        cloud: bool,

        #[command(flatten)]
        cloud_opts: CloudOpts,
    },

    /// Delete all but the N most recent archives
    Prune {
        /// Number of recent archives to keep
        #[arg(long, default_value_t = 5)]
        keep: usize,

        /// Local backup directory (default ~/gembak-backups)
        #[arg(long)]
        backup_dir: Option<String>,

        /// Also prune the cloud bucket
        #[arg(long)]
        cloud: bool,

        /// Prune only the cloud bucket
        #[arg(long)]
        cloud_only: bool,

        /// List deletions without performing them
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        cloud_opts: CloudOpts,
    },

    /// Verify cloud credentials and bucket access
    CloudCheck {
        #[command(flatten)]
        cloud_opts: CloudOpts,
    },

    /// Upload local archives missing from the cloud bucket
    CloudSync {
        /// Local backup directory (default ~/gembak-backups)
        #[arg(long)]
        backup_dir: Option<String>,

        #[command(flatten)]
        cloud_opts: CloudOpts,
    },

    /// Download cloud archives missing locally
    LocalSync {
        /// Local backup directory (default ~/gembak-backups)
        #[arg(long)]
        backup_dir: Option<String>,

        #[command(flatten)]
        cloud_opts: CloudOpts,
    },
}
