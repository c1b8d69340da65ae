use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sync engine over the configured mappings
    Sync {
        #[arg(long, help = "Sync every configured mapping")]
        all: bool,

        #[arg(long = "mapping", help = "Mapping id to sync; repeatable")]
        mapping: Vec<String>,

        #[arg(long, help = "Extract and serialize, but skip every upload")]
        dry_run: bool,

        #[arg(long, help = "Reset the selected mappings' watermarks first")]
        force: bool,

        #[arg(long, conflicts_with = "parallel", help = "One mapping at a time")]
        sequential: bool,

        #[arg(long, help = "Run mappings concurrently (the default)")]
        parallel: bool,

        #[arg(long, help = "Worker pool size")]
        workers: Option<usize>,

        #[arg(long, help = "Override every mapping's batch size")]
        batch_size: Option<usize>,

        #[arg(long, help = "Print per-mapping state instead of syncing")]
        status: bool,
    },

    /// Print per-mapping sync state
    Status {
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },

    /// Resolve a mapping's source and verify it is reachable
    TestConn {
        #[arg(long, help = "Mapping id to probe")]
        mapping: String,
    },
}
