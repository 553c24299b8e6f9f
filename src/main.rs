use steptask::tasks::FlushCdnTask;
use steptask::Task;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let task = FlushCdnTask::new();
    let code = task.main().await?;
    std::process::exit(code)
}
