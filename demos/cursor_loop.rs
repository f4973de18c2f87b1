//! A complete example of driving an execution from the outside with Ceaseless.
//!
//! This example demonstrates:
//! - Creating an execution from the registry
//! - Subscribing to its output batches
//! - Steering it with pause, resume, custom and stop signals
//! - Reading the final result once it terminates
//!
//! Run with `RUST_LOG=debug cargo run --example cursor_loop` to see the
//! controller's own logging.

use ceaseless::prelude::*;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ExecutionError> {
    env_logger::init();

    // ============================================================================
    // Step 1: Create the execution
    // ============================================================================

    let registry = ExecutionRegistry::with_builtins();
    println!("Available executions: {:?}", registry.ids());

    let params = Params::new().with("length", 5).with("interval", 0.1);
    let (controller, handle) =
        registry.create("cursor_loop", params, ExecutionConfig::default())?;
    println!("Created execution {}", handle.id());

    // ============================================================================
    // Step 2: Watch its outputs on a separate task
    // ============================================================================

    let mut outputs = handle.subscribe()?;
    let watcher = tokio::spawn(async move {
        while let Some(batch) = outputs.next_batch().await {
            for record in &batch.records {
                println!(
                    "  #{:<3} {:<10} = {:?} (v{})",
                    batch.sequence, record.key, record.value, record.version
                );
            }
        }
        println!("Output stream closed");
    });

    // ============================================================================
    // Step 3: Run it and steer it
    // ============================================================================

    let task = controller.spawn();

    tokio::time::sleep(Duration::from_millis(450)).await;
    println!("Reversing direction");
    handle.send(Signal::custom("direction"));

    tokio::time::sleep(Duration::from_millis(450)).await;
    println!("Pausing");
    handle.pause();
    handle.wait_for_state(ExecutionState::Paused).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("Resuming");
    handle.resume();

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("Stopping");
    handle.stop();

    // ============================================================================
    // Step 4: Collect the result
    // ============================================================================

    let termination = task
        .await
        .map_err(|e| ExecutionError::internal(e.to_string()))?;
    let _ = watcher.await;

    match termination {
        Termination::Completed(result) => {
            for (key, value) in result.records() {
                println!("Result {} = {:?}", key, value);
            }
        }
        Termination::Failed(err) => println!("Execution failed: {}", err),
    }
    Ok(())
}
