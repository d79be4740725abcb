use std::path::PathBuf;
use std::time::Duration;

use acadio::{Argument, Config, ConfigOverrides, PLOT_TO_PDF, PollPolicy, SAMPLE_DRAWING, WorkItem};
use clap::Parser;

/// Submit an AutoCAD I/O work item, wait for it and download its output.
#[derive(Debug, Parser)]
#[command(name = "acadio", version, about)]
pub struct Cli {
    /// Drawing the activity runs on (`HostDwg` input).
    #[arg(long, default_value = SAMPLE_DRAWING)]
    pub input: String,

    /// Activity to run.
    #[arg(long, default_value = PLOT_TO_PDF)]
    pub activity: String,

    /// Upload the result here instead of the service's own storage.
    #[arg(long)]
    pub result_url: Option<String>,

    /// Where to write the result.
    #[arg(long, short, default_value = "result.pdf")]
    pub output: PathBuf,

    /// Where to write the status report.
    #[arg(long, default_value = "report.txt")]
    pub report: PathBuf,

    /// Seconds between status checks.
    #[arg(long, default_value_t = 2)]
    pub poll_interval: u64,

    /// Give up after this many status checks.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_polls: Option<u32>,

    /// Give up after this many seconds of polling.
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Don't show download progress.
    #[arg(long)]
    pub no_progress: bool,

    /// Skip TLS certificate verification.
    #[arg(long)]
    pub insecure: bool,

    /// Consumer key (overrides ACADIO_CONSUMER_KEY and .acadiorc).
    #[arg(long)]
    pub key: Option<String>,

    /// Consumer secret (overrides ACADIO_CONSUMER_SECRET and .acadiorc).
    #[arg(long)]
    pub secret: Option<String>,

    #[arg(long)]
    pub auth_url: Option<String>,

    #[arg(long)]
    pub api_url: Option<String>,
}

impl Cli {
    pub fn config(&self) -> anyhow::Result<Config> {
        let overrides = ConfigOverrides {
            consumer_key: self.key.clone(),
            consumer_secret: self.secret.clone(),
            auth_url: self.auth_url.clone(),
            api_url: self.api_url.clone(),
            verify: self.insecure.then_some(false),
        };

        Ok(Config::load(overrides)?
            .with_output_path(&self.output)
            .with_report_path(&self.report)
            .with_poll(PollPolicy {
                interval: Duration::from_secs(self.poll_interval),
                max_attempts: self.max_polls,
                deadline: self.deadline.map(Duration::from_secs),
            })
            .with_timeout(Duration::from_secs(self.timeout))
            .with_progress(!self.no_progress))
    }

    pub fn work_item(&self) -> WorkItem {
        WorkItem::new(
            self.activity.clone(),
            vec![Argument::input("HostDwg", self.input.clone())],
            vec![Argument::output("Result", self.result_url.clone())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn defaults_plot_the_sample_drawing() {
        let cli = Cli::parse_from(["acadio"]);
        assert_eq!(cli.work_item(), WorkItem::plot_to_pdf(SAMPLE_DRAWING));
        assert_eq!(cli.output, PathBuf::from("result.pdf"));
        assert_eq!(cli.report, PathBuf::from("report.txt"));
        assert_eq!(cli.poll_interval, 2);
        assert!(cli.max_polls.is_none());
    }

    #[test]
    fn parses_poll_bounds_and_paths() {
        let cli = Cli::parse_from([
            "acadio",
            "--input",
            "https://files/plan.dwg",
            "--result-url",
            "https://bucket/plan.pdf",
            "-o",
            "out/plan.pdf",
            "--max-polls",
            "30",
            "--deadline",
            "600",
            "--insecure",
        ]);
        assert_eq!(cli.max_polls, Some(30));
        assert_eq!(cli.deadline, Some(600));
        assert!(cli.insecure);
        assert_eq!(cli.output, PathBuf::from("out/plan.pdf"));

        let item = cli.work_item();
        assert_eq!(
            item.arguments.input_arguments[0].resource.as_deref(),
            Some("https://files/plan.dwg")
        );
        assert_eq!(
            item.arguments.output_arguments[0].resource.as_deref(),
            Some("https://bucket/plan.pdf")
        );
    }

    #[test]
    fn config_applies_cli_settings() {
        let cli = Cli::parse_from([
            "acadio",
            "--key",
            "k",
            "--secret",
            "s",
            "--api-url",
            "http://localhost:1234/v2",
            "--poll-interval",
            "5",
            "--timeout",
            "15",
            "--no-progress",
        ]);
        let cfg = cli.config().unwrap();
        assert_eq!(cfg.credentials.consumer_key, "k");
        assert_eq!(cfg.api_url, "http://localhost:1234/v2");
        assert_eq!(cfg.poll.interval, Duration::from_secs(5));
        assert_eq!(cfg.timeout, Duration::from_secs(15));
        assert!(!cfg.progress);
    }

    #[test]
    fn max_polls_must_allow_at_least_one_check() {
        assert!(Cli::try_parse_from(["acadio", "--max-polls", "0"]).is_err());
        let cli = Cli::try_parse_from(["acadio", "--max-polls", "1"]).unwrap();
        assert_eq!(cli.max_polls, Some(1));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
