use std::sync::Arc;

use anyhow::Result;
use baton_persist::{MemoryStore, RunStore};
use baton_runs::RunLifecycle;
use baton_types::{NewThread, RunOutcome, StartRunInput, StartRunResult};
use tracing_subscriber::EnvFilter;

const CALLERS: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("Run Lock Contention Demo");
    println!("========================");
    println!();

    let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
    let lifecycle = Arc::new(RunLifecycle::new(store.clone()));
    let thread = store
        .create_thread(NewThread::new("demo-user").with_title("Contention demo"))
        .await?;
    println!("✓ Created thread: {}", thread.id);
    println!();

    println!("Starting {} runs at once on the same thread...", CALLERS);
    let attempts = (0..CALLERS).map(|_| {
        let lifecycle = Arc::clone(&lifecycle);
        let thread_id = thread.id.clone();
        tokio::spawn(async move { lifecycle.start_run(&thread_id, StartRunInput::new()).await })
    });
    let results = futures::future::join_all(attempts).await;

    let mut winner = None;
    for (caller, result) in results.into_iter().enumerate() {
        match result?? {
            StartRunResult::Started(started) => {
                println!("  caller {}: started run {}", caller, started.run_id);
                winner = Some(started.run_id);
            }
            StartRunResult::Rejected(rejection) => {
                println!("  caller {}: rejected ({})", caller, rejection.reason());
            }
        }
    }
    println!();

    let run_id = winner.ok_or_else(|| anyhow::anyhow!("no caller acquired the lock"))?;

    print!("Streaming and completing {}... ", run_id);
    lifecycle.advance(&run_id).await?;
    lifecycle
        .complete_run(&thread.id, &run_id, RunOutcome::success())
        .await?;
    println!("✓");

    print!("Late cancel of the same run... ");
    let report = lifecycle.cancel_run(&thread.id, &run_id).await?;
    println!("no-op: {}", report.is_noop());

    let thread = store
        .get_thread(&thread.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("thread disappeared"))?;
    println!();
    println!("Thread run status:     {}", thread.run_status);
    println!("Last completed run:    {:?}", thread.last_completed_run_id);
    println!("Last run cancelled:    {:?}", thread.last_run_cancelled);

    Ok(())
}
