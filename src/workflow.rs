//! The authenticate → submit → poll → download sequence.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::Token;
use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::poll::{Clock, wait_for_completion};
use crate::workitem::{JobId, JobResult, JobStatus, WorkItem};

/// The service calls the workflow is built from. [`Client`](crate::Client)
/// is the HTTP implementation.
pub trait WorkItemApi {
    fn authenticate(&self, credentials: &Credentials) -> Result<Token>;
    fn submit(&self, token: &Token, item: &WorkItem) -> Result<JobId>;
    fn status(&self, token: &Token, id: &JobId) -> Result<JobStatus>;
    fn fetch_results(&self, token: &Token, id: &JobId) -> Result<JobResult>;
    fn download(&self, url: &str, target: &Path) -> Result<PathBuf>;
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The work item succeeded and both files were written.
    Downloaded {
        id: JobId,
        output: PathBuf,
        report: PathBuf,
    },
    /// The work item ended in another terminal state; nothing was downloaded.
    Finished { id: JobId, status: JobStatus },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Downloaded { .. })
    }
}

/// Runs one work item from authentication to downloaded results.
pub fn run<A>(
    api: &A,
    config: &Config,
    item: &WorkItem,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> Result<Outcome>
where
    A: WorkItemApi + ?Sized,
{
    let token = api.authenticate(&config.credentials)?;
    ensure_active(cancel)?;

    let id = api.submit(&token, item)?;
    ensure_active(cancel)?;

    let status = wait_for_completion(&config.poll, clock, cancel, || api.status(&token, &id))?;
    if status != JobStatus::Succeeded {
        warn!(%id, %status, "work item did not succeed, nothing to download");
        return Ok(Outcome::Finished { id, status });
    }

    let result = api.fetch_results(&token, &id)?;
    ensure_active(cancel)?;
    let output = api.download(&result.output_url, &config.output_path)?;
    ensure_active(cancel)?;
    let report = api.download(&result.report_url, &config.report_path)?;

    info!(%id, output = %output.display(), report = %report.display(), "work item complete");
    Ok(Outcome::Downloaded { id, output, report })
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::ManualClock;
    use std::cell::RefCell;

    /// Scripted service recording every call.
    struct FakeApi {
        statuses: RefCell<Vec<&'static str>>,
        calls: RefCell<Vec<String>>,
        cancel_on_submit: Option<CancellationToken>,
    }

    impl FakeApi {
        fn new(statuses: &[&'static str]) -> Self {
            Self {
                statuses: RefCell::new(statuses.iter().rev().copied().collect()),
                calls: RefCell::new(Vec::new()),
                cancel_on_submit: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    impl WorkItemApi for FakeApi {
        fn authenticate(&self, credentials: &Credentials) -> Result<Token> {
            self.calls
                .borrow_mut()
                .push(format!("authenticate {}", credentials.consumer_key));
            Ok(Token::new("Bearer", "abc"))
        }

        fn submit(&self, _token: &Token, item: &WorkItem) -> Result<JobId> {
            self.calls
                .borrow_mut()
                .push(format!("submit {}", item.activity_id));
            if let Some(cancel) = &self.cancel_on_submit {
                cancel.cancel();
            }
            JobId::new("job-1")
        }

        fn status(&self, _token: &Token, id: &JobId) -> Result<JobStatus> {
            self.calls.borrow_mut().push(format!("status {id}"));
            let next = self
                .statuses
                .borrow_mut()
                .pop()
                .ok_or(Error::MissingField("value"))?;
            Ok(JobStatus::from(next))
        }

        fn fetch_results(&self, _token: &Token, id: &JobId) -> Result<JobResult> {
            self.calls.borrow_mut().push(format!("fetch {id}"));
            Ok(JobResult {
                output_url: "http://x/out.pdf".into(),
                report_url: "http://x/report.txt".into(),
            })
        }

        fn download(&self, url: &str, target: &Path) -> Result<PathBuf> {
            self.calls
                .borrow_mut()
                .push(format!("download {url} -> {}", target.display()));
            Ok(target.to_path_buf())
        }
    }

    fn config() -> Config {
        Config::new(Credentials::new("key", "secret"))
            .with_output_path("out/result.pdf")
            .with_report_path("out/report.txt")
    }

    #[test]
    fn succeeded_job_is_downloaded() {
        let api = FakeApi::new(&["Pending", "InProgress", "Succeeded"]);
        let clock = ManualClock::new();
        let item = WorkItem::plot_to_pdf("http://x/in.dwg");

        let outcome = run(&api, &config(), &item, &clock, &CancellationToken::new()).unwrap();

        assert_eq!(api.count("status"), 3);
        assert_eq!(
            api.calls(),
            vec![
                "authenticate key",
                "submit PlotToPDF",
                "status job-1",
                "status job-1",
                "status job-1",
                "fetch job-1",
                "download http://x/out.pdf -> out/result.pdf",
                "download http://x/report.txt -> out/report.txt",
            ]
        );
        assert_eq!(
            outcome,
            Outcome::Downloaded {
                id: JobId::new("job-1").unwrap(),
                output: PathBuf::from("out/result.pdf"),
                report: PathBuf::from("out/report.txt"),
            }
        );
        assert!(outcome.is_success());
    }

    #[test]
    fn failed_job_is_not_downloaded() {
        let api = FakeApi::new(&["Pending", "Failed"]);
        let clock = ManualClock::new();
        let item = WorkItem::plot_to_pdf("http://x/in.dwg");

        let outcome = run(&api, &config(), &item, &clock, &CancellationToken::new()).unwrap();

        assert_eq!(api.count("status"), 2);
        assert_eq!(api.count("fetch"), 0);
        assert_eq!(api.count("download"), 0);
        assert_eq!(
            outcome,
            Outcome::Finished {
                id: JobId::new("job-1").unwrap(),
                status: JobStatus::Failed("Failed".into()),
            }
        );
        assert!(!outcome.is_success());
    }

    #[test]
    fn poll_limit_stops_the_run() {
        let api = FakeApi::new(&["Pending", "Pending", "Pending", "Succeeded"]);
        let clock = ManualClock::new();
        let mut cfg = config();
        cfg.poll.max_attempts = Some(2);

        let err = run(
            &api,
            &cfg,
            &WorkItem::plot_to_pdf("http://x/in.dwg"),
            &clock,
            &CancellationToken::new(),
        )
        .unwrap_err();

        assert!(matches!(err, Error::PollLimit { attempts: 2 }));
        assert_eq!(api.count("download"), 0);
    }

    #[test]
    fn cancellation_after_submit_skips_polling() {
        let cancel = CancellationToken::new();
        let mut api = FakeApi::new(&["Succeeded"]);
        api.cancel_on_submit = Some(cancel.clone());

        let err = run(
            &api,
            &config(),
            &WorkItem::plot_to_pdf("http://x/in.dwg"),
            &ManualClock::new(),
            &cancel,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(api.count("status"), 0);
    }
}
