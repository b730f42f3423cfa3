use clap::Parser;

use crate::utils::version;

#[derive(Parser, Debug)]
#[command(author, version = version(), about)]
pub struct Cli {
    #[arg(
        short,
        long,
        value_name = "COUNT",
        help = "Messages seeded into each demo conversation",
        default_value_t = 1_000
    )]
    pub messages: usize,

    #[arg(
        short,
        long,
        value_name = "MS",
        help = "Simulated store latency in milliseconds",
        default_value_t = 20
    )]
    pub latency_ms: u64,

    #[arg(
        short,
        long,
        value_name = "COUNT",
        help = "Scroll steps simulated towards older messages",
        default_value_t = 30
    )]
    pub steps: usize,

    #[arg(long, value_name = "COUNT", help = "Override pager.page_size")]
    pub page_size: Option<usize>,

    #[arg(long, value_name = "COUNT", help = "Override pager.cache_size")]
    pub cache_size: Option<usize>,

    #[arg(long, help = "Print the summary as JSON")]
    pub json: bool,
}
