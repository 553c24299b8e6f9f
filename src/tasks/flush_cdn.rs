use crate::cdn::{
    CdnCache, CdnRecord, DryRunPurgeClient, FastPurgeArgs, FastPurgeSettings, PurgeClient,
};
use crate::define_step;
use crate::error::TaskError;
use crate::step::StepOutput;
use crate::task::{ArgContributor, Task, TaskBase, TaskBaseBuilder};
use async_trait::async_trait;
use clap::{Args, Command, FromArgMatches};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

const DOC: &str = "Flush CDN caches for repositories

    Every repository given with --repo or listed in --repos-file has its
    mutable paths purged from the CDN. Repositories without a relative URL
    are ignored.

    Purging is disabled unless --fastpurge-root-url is set.
";

/// Mutable path flushed for repositories given with `--repo`, unless
/// `--mutable-url` says otherwise.
pub const DEFAULT_MUTABLE_URL: &str = "repodata/repomd.xml";

/// A published repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub id: String,
    #[serde(default)]
    pub relative_url: String,
    #[serde(default = "default_mutable_urls")]
    pub mutable_urls: Vec<String>,
}

fn default_mutable_urls() -> Vec<String> {
    vec![DEFAULT_MUTABLE_URL.to_string()]
}

impl CdnRecord for RepoRecord {
    fn relative_url(&self) -> &str {
        &self.relative_url
    }

    fn mutable_urls(&self) -> &[String] {
        &self.mutable_urls
    }
}

/// Builds the purge client once CDN settings are known.
pub type ClientFactory = Box<dyn Fn(&FastPurgeSettings) -> Arc<dyn PurgeClient> + Send + Sync>;

define_step! {
    static LOAD_REPOS("Load repos"): fn(&FlushCdnTask, ()) -> Vec<RepoRecord> = FlushCdnTask::load_repos_now;
}

define_step! {
    static FLUSH_CDN("Flush CDN cache"): fn(&FlushCdnTask, &[RepoRecord]) -> RepoRecord = FlushCdnTask::flush_cdn_now;
}

#[derive(Debug, Clone, Default, Args)]
struct FlushCdnArgs {
    /// relative URL of a repository to flush
    #[arg(long = "repo", value_name = "RELATIVE_URL")]
    repo: Vec<String>,

    /// path under each --repo to flush
    #[arg(long = "mutable-url", value_name = "PATH", default_value = DEFAULT_MUTABLE_URL)]
    mutable_url: Vec<String>,

    /// YAML list of repositories (id, relative_url, mutable_urls)
    #[arg(long = "repos-file", value_name = "PATH")]
    repos_file: Option<PathBuf>,
}

impl ArgContributor for FlushCdnArgs {
    fn add_args(&self, command: Command) -> Command {
        <Self as Args>::augment_args(command)
    }
}

/// Flushes CDN caches for a set of repositories.
pub struct FlushCdnTask {
    base: TaskBase,
    client_factory: ClientFactory,
    cdn: OnceLock<CdnCache>,
}

impl FlushCdnTask {
    /// Task reading the process arguments, purging through
    /// [`DryRunPurgeClient`].
    pub fn new() -> Self {
        Self::from_builder(Self::builder())
    }

    /// Task parsing `argv` (program name first).
    pub fn with_argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self::from_builder(Self::builder().argv(argv))
    }

    /// Replaces the purge client used once a CDN root URL is configured.
    pub fn with_client_factory(mut self, factory: ClientFactory) -> Self {
        self.client_factory = factory;
        self
    }

    fn builder() -> TaskBaseBuilder {
        TaskBase::builder("flush-cdn", DOC)
            .contributor(FlushCdnArgs::default())
            .contributor(FastPurgeArgs::default())
            .step(&LOAD_REPOS)
            .step(&FLUSH_CDN)
    }

    fn from_builder(builder: TaskBaseBuilder) -> Self {
        Self {
            base: builder.build(),
            client_factory: Box::new(
                |settings: &FastPurgeSettings| -> Arc<dyn PurgeClient> {
                    Arc::new(DryRunPurgeClient::new(settings.root_url.clone()))
                },
            ),
            cdn: OnceLock::new(),
        }
    }

    /// Collects the repositories to flush.
    pub fn load_repos(&self) -> Result<StepOutput<Vec<RepoRecord>>, TaskError> {
        self.base.step(&LOAD_REPOS, self, ())
    }

    /// Starts one purge per published repository.
    pub fn flush_cdn(&self, repos: &[RepoRecord]) -> Result<StepOutput<RepoRecord>, TaskError> {
        self.base.step(&FLUSH_CDN, self, repos)
    }

    fn load_repos_now(&self, _: ()) -> Result<StepOutput<Vec<RepoRecord>>, TaskError> {
        let args = FlushCdnArgs::from_arg_matches(self.base.args()?)
            .map_err(|e| TaskError::Arguments(e.to_string().trim().to_string()))?;
        let mut repos = Vec::new();

        if let Some(path) = &args.repos_file {
            repos.extend(load_repos_file(path)?);
        }

        repos.extend(args.repo.iter().map(|relative_url| RepoRecord {
            id: relative_url.clone(),
            relative_url: relative_url.clone(),
            mutable_urls: args.mutable_url.clone(),
        }));

        if repos.is_empty() {
            return Err(TaskError::step(LOAD_REPOS.name(), "No repo(s) given to flush"));
        }
        debug!("Loaded {} repo(s)", repos.len());
        Ok(StepOutput::Value(repos))
    }

    fn flush_cdn_now(&self, repos: &[RepoRecord]) -> Result<StepOutput<RepoRecord>, TaskError> {
        Ok(StepOutput::Handles(self.cdn()?.flush(repos)))
    }

    fn cdn(&self) -> Result<&CdnCache, TaskError> {
        if let Some(cdn) = self.cdn.get() {
            return Ok(cdn);
        }
        let settings = FastPurgeSettings::from_matches(self.base.args()?);
        let cdn = CdnCache::new(settings.map(|settings| (self.client_factory)(&settings)));
        Ok(self.cdn.get_or_init(|| cdn))
    }
}

impl Default for FlushCdnTask {
    fn default() -> Self {
        Self::new()
    }
}

fn load_repos_file(path: &Path) -> Result<Vec<RepoRecord>, TaskError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| TaskError::Configuration(format!("{}: {}", path.display(), e)))?;
    serde_yaml::from_str(&content)
        .map_err(|e| TaskError::Configuration(format!("{}: {}", path.display(), e)))
}

#[async_trait]
impl Task for FlushCdnTask {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    async fn run(&self) -> Result<(), TaskError> {
        info!("run flush-cdn");

        let repos = self.load_repos()?.into_value().unwrap_or_default();
        let handles = self.flush_cdn(&repos)?.into_handles();
        let total = handles.len();

        let mut failures = Vec::new();
        for result in join_all(handles).await {
            match result {
                Ok(repo) => info!("Flushed CDN cache for {}", repo.id),
                Err(e) => {
                    error!("CDN cache flush failed: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        if !failures.is_empty() {
            return Err(TaskError::Purge(format!(
                "{} of {} flush(es) failed: {}",
                failures.len(),
                total,
                failures.join("; ")
            )));
        }

        info!("Flushing CDN caches completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ResultHandle;
    use crate::step::StepName;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    const ROOT: &str = "https://cdn.example.com/";

    struct RejectingClient;

    impl PurgeClient for RejectingClient {
        fn root_url(&self) -> &str {
            ROOT
        }

        fn purge_by_url(&self, urls: Vec<String>) -> ResultHandle<crate::cdn::PurgeReceipt> {
            ResultHandle::ready(Err(TaskError::Purge(format!("403 for {}", urls.join(" ")))))
        }
    }

    fn task_with(args: &[&str]) -> (FlushCdnTask, DryRunPurgeClient) {
        let client = DryRunPurgeClient::new(ROOT);
        let shared = client.clone();
        let argv = std::iter::once("flush-cdn").chain(args.iter().copied());
        let task = FlushCdnTask::with_argv(argv).with_client_factory(Box::new(
            move |_: &FastPurgeSettings| -> Arc<dyn PurgeClient> { Arc::new(shared.clone()) },
        ));
        (task, client)
    }

    #[tokio::test]
    async fn test_flushes_every_repo() {
        let (task, client) = task_with(&[
            "--fastpurge-root-url",
            ROOT,
            "--repo",
            "content/a",
            "--repo",
            "content/b",
        ]);

        assert_eq!(assert_ok!(task.main().await), 0);
        assert_eq!(client.issued(), 2);
    }

    #[tokio::test]
    async fn test_flush_step_resolves_to_repos() {
        let (task, _client) = task_with(&["--fastpurge-root-url", ROOT, "--repo", "content/a"]);

        let repos = assert_ok!(task.load_repos()).into_value().unwrap_or_default();
        let handles = assert_ok!(task.flush_cdn(&repos)).into_handles();
        let flushed = assert_ok!(ResultHandle::sequence(handles).await);

        assert_eq!(
            flushed,
            vec![RepoRecord {
                id: "content/a".to_string(),
                relative_url: "content/a".to_string(),
                mutable_urls: vec![DEFAULT_MUTABLE_URL.to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_skip_flush_step() {
        let (task, client) = task_with(&[
            "--fastpurge-root-url",
            ROOT,
            "--repo",
            "content/a",
            "--skip",
            "flush-cdn-cache",
        ]);

        assert_eq!(assert_ok!(task.main().await), 0);
        assert_eq!(client.issued(), 0);
    }

    #[tokio::test]
    async fn test_no_root_url_disables_flush() {
        std::env::remove_var("FASTPURGE_ROOT_URL");
        let (task, client) = task_with(&["--repo", "content/a"]);

        assert_eq!(assert_ok!(task.main().await), 0);
        assert_eq!(client.issued(), 0);
    }

    #[tokio::test]
    async fn test_no_repos_fails_load_step() {
        let (task, _client) = task_with(&["--fastpurge-root-url", ROOT]);

        match assert_err!(task.main().await) {
            TaskError::StepFailed { step_name, details } => {
                assert_eq!(step_name, StepName::new("Load repos"));
                assert_eq!(details, "No repo(s) given to flush");
            }
            other => panic!("Unexpected error type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_flush_fails_run() {
        let task = FlushCdnTask::with_argv([
            "flush-cdn",
            "--fastpurge-root-url",
            ROOT,
            "--repo",
            "content/a",
            "--repo",
            "content/b",
        ])
        .with_client_factory(Box::new(
            |_: &FastPurgeSettings| -> Arc<dyn PurgeClient> { Arc::new(RejectingClient) },
        ));

        match assert_err!(task.main().await) {
            TaskError::Purge(msg) => assert!(msg.starts_with("2 of 2 flush(es) failed")),
            other => panic!("Unexpected error type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repos_file() {
        let mut file = assert_ok!(tempfile::NamedTempFile::new());
        assert_ok!(writeln!(
            file,
            "- id: rhel-8\n  relative_url: content/dist/rhel8\n  mutable_urls: [repodata/repomd.xml, PULP_MANIFEST]\n\
             - id: unpublished\n\
             - id: rhel-9\n  relative_url: content/dist/rhel9"
        ));
        let path = file.path().to_string_lossy().to_string();
        let (task, client) = task_with(&["--fastpurge-root-url", ROOT, "--repos-file", &path]);

        let repos = assert_ok!(task.load_repos()).into_value().unwrap_or_default();
        assert_eq!(repos.len(), 3);
        assert_eq!(repos[0].mutable_urls.len(), 2);
        assert_eq!(repos[1].relative_url, "");
        assert_eq!(repos[2].mutable_urls, vec![DEFAULT_MUTABLE_URL.to_string()]);

        assert_eq!(assert_ok!(task.main().await), 0);
        assert_eq!(client.issued(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_repos_file() {
        let (task, _client) = task_with(&["--repos-file", "/nonexistent/repos.yaml"]);

        match assert_err!(task.load_repos()) {
            TaskError::Configuration(msg) => assert!(msg.contains("/nonexistent/repos.yaml")),
            other => panic!("Unexpected error type: {:?}", other),
        }
    }

    #[test]
    fn test_help_lists_every_option() {
        let (task, _client) = task_with(&[]);
        let help = task.base().render_help();

        for option in [
            "--verbose",
            "--debug",
            "--skip",
            "--repo",
            "--mutable-url",
            "--repos-file",
            "--fastpurge-root-url",
            "load-repos, flush-cdn-cache",
        ] {
            assert!(help.contains(option), "help is missing {}", option);
        }
        assert!(task
            .base()
            .description()
            .starts_with("Flush CDN caches for repositories\n\nEvery repository"));
    }
}
